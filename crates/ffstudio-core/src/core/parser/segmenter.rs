//! Command segmenter
//!
//! Separates a token stream into input slices, output slices and the parsed
//! `-filter_complex` graph.

use serde::{Deserialize, Serialize};

use super::filter_graph::{parse_filter_complex, FilterDescriptor};

/// Characters that never appear in a bare output filename
const NON_FILENAME_CHARS: &[char] = &['<', '>', '"', '/', '\\', '|', '?', '*', '\0'];

/// One pipeline stage split into its structural parts
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCommand {
    /// One slice per `-i <path>`, ending with that pair
    pub inputs: Vec<Vec<String>>,
    /// One slice per output file, ending with the filename token
    pub outputs: Vec<Vec<String>>,
    pub filters: Vec<FilterDescriptor>,
    /// Tokens after the last recognized boundary
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unassigned: Vec<String>,
}

/// Returns true if `arg` looks like an output filename.
///
/// Accepts `-`, `pipe:N` and names with a 2 to 5 character alphanumeric
/// extension. Anything containing a path separator is rejected, so absolute
/// or relative paths with directories are not recognized.
pub fn is_filename(arg: &str) -> bool {
    let arg = strip_outer_quotes(arg);
    if arg.is_empty() || arg.contains(NON_FILENAME_CHARS) {
        return false;
    }
    if arg == "-" {
        return true;
    }
    if let Some(fd) = arg.strip_prefix("pipe:") {
        if !fd.is_empty() && fd.chars().all(|c| c.is_ascii_digit()) {
            return true;
        }
    }
    has_short_extension(arg)
}

/// Returns true if `name` ends in `.ext` with a 2 to 5 character alphanumeric `ext`.
pub fn has_short_extension(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((_, ext)) => (2..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric()),
        None => false,
    }
}

fn strip_outer_quotes(arg: &str) -> &str {
    let arg = arg.strip_prefix(['\'', '"']).unwrap_or(arg);
    arg.strip_suffix(['\'', '"']).unwrap_or(arg)
}

/// Splits tokenized arguments into inputs, outputs and filters.
///
/// The program name must already be removed.
pub fn split_ffmpeg_args<S: AsRef<str>>(args: &[S]) -> ParsedCommand {
    let mut parsed = ParsedCommand::default();
    let mut buffer: Vec<String> = Vec::new();
    let mut i = 0;

    while i < args.len() {
        let arg = args[i].as_ref();

        if arg == "-filter_complex" {
            match args.get(i + 1) {
                Some(expr) => {
                    parsed.filters.extend(parse_filter_complex(expr.as_ref()));
                    i += 2;
                }
                None => {
                    tracing::warn!("-filter_complex without an expression, ignoring");
                    i += 1;
                }
            }
            continue;
        }

        buffer.push(arg.to_string());

        if arg == "-i" {
            if let Some(path) = args.get(i + 1) {
                buffer.push(path.as_ref().to_string());
                parsed.inputs.push(std::mem::take(&mut buffer));
                i += 2;
                continue;
            }
        }

        if is_filename(arg) {
            parsed.outputs.push(std::mem::take(&mut buffer));
        }
        i += 1;
    }

    if !buffer.is_empty() {
        tracing::debug!(tokens = ?buffer, "trailing arguments not attached to any input or output");
        parsed.unassigned = buffer;
    }
    parsed
}
