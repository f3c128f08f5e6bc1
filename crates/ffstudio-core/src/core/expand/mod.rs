//! Wildcard and Template Expansion
//!
//! Expands one templated command into many concrete ones: each `-i` argument
//! containing `*` is resolved to a file list, and output arguments receive a
//! per-combination injection token through `*`, `{name}`, `{hash}` or
//! `{index}`.

mod resolver;

pub use resolver::{GlobPathResolver, PathResolver};

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::parser::{has_short_extension, quote_arg, tokenize};
use crate::core::{CoreError, CoreResult};

// =============================================================================
// Options & Results
// =============================================================================

pub const DEFAULT_HASH_LENGTH: usize = 8;
pub const DEFAULT_INDEX_PADDING: usize = 0;

const INDEX_PLACEHOLDER: &str = "{index}";

/// Flags whose value is a filter expression, where `*` is arithmetic
const FILTER_FLAGS: &[&str] = &["-filter_complex", "-lavfi", "-vf", "-af", "-filter"];

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{(name|hash|index)\}").expect("placeholder pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandOptions {
    /// Hex characters kept from the SHA-256 digest
    pub hash_length: usize,
    /// Zero padding width of `{index}`
    pub index_padding: usize,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            hash_length: DEFAULT_HASH_LENGTH,
            index_padding: DEFAULT_INDEX_PADDING,
        }
    }
}

impl ExpandOptions {
    pub fn with_hash_length(mut self, length: usize) -> Self {
        self.hash_length = length;
        self
    }

    pub fn with_index_padding(mut self, padding: usize) -> Self {
        self.index_padding = padding;
        self
    }
}

/// Concrete commands plus non-fatal warnings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandedCommands {
    pub commands: Vec<String>,
    pub warnings: Vec<String>,
}

/// Token injected where an output has `*` or no placeholder at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionMode {
    Index,
    Name,
    Hash,
}

/// Injection values of one combination
#[derive(Debug, Clone, PartialEq, Eq)]
struct Tokens {
    name: String,
    hash: String,
    index: String,
}

impl Tokens {
    fn pick(&self, mode: InjectionMode) -> &str {
        match mode {
            InjectionMode::Index => &self.index,
            InjectionMode::Name => &self.name,
            InjectionMode::Hash => &self.hash,
        }
    }
}

// =============================================================================
// Expander
// =============================================================================

/// Expands templated commands against a [`PathResolver`]
pub struct Expander<R: PathResolver> {
    resolver: R,
    options: ExpandOptions,
}

impl<R: PathResolver> Expander<R> {
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            options: ExpandOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExpandOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ExpandOptions {
        &self.options
    }

    /// Expands `command` into one command per wildcard combination.
    ///
    /// A command without input wildcards or output templates comes back
    /// unchanged as the only element. Any wildcard matching no file fails
    /// the whole call with [`CoreError::EmptyExpansion`].
    pub async fn expand(&self, command: &str) -> CoreResult<ExpandedCommands> {
        let tokens = tokenize(command);
        let wildcards = input_wildcards(&tokens);
        let templates = output_templates(&tokens);

        if wildcards.is_empty() && templates.is_empty() {
            return Ok(ExpandedCommands {
                commands: vec![command.to_string()],
                warnings: Vec::new(),
            });
        }

        let mut warnings = Vec::new();

        let mut resolved = Vec::with_capacity(wildcards.len());
        for &position in &wildcards {
            let pattern = &tokens[position];
            let paths = self.resolver.resolve(pattern).await?;
            if paths.is_empty() {
                tracing::warn!(pattern = %pattern, "wildcard matched no files");
                return Err(CoreError::EmptyExpansion {
                    pattern: pattern.clone(),
                });
            }
            resolved.push(paths);
        }

        let count = resolved.iter().map(Vec::len).min().unwrap_or(1);
        if resolved.iter().any(|paths| paths.len() != count) {
            let lengths: Vec<String> = resolved.iter().map(|p| p.len().to_string()).collect();
            let warning = format!(
                "wildcards matched different file counts ({}); using the first {count} of each",
                lengths.join(", ")
            );
            tracing::warn!(%warning);
            warnings.push(warning);
        }

        let outputs = if templates.is_empty() {
            output_candidates(&tokens)
        } else {
            templates
        };
        if outputs.len() > 1 && outputs.iter().all(|&p| !is_template(&tokens[p])) {
            let warning = format!(
                "{} outputs without placeholders are left unchanged in every command",
                outputs.len()
            );
            tracing::warn!(%warning);
            warnings.push(warning);
        }

        let mode = injection_mode(&tokens, &outputs, !wildcards.is_empty());
        tracing::debug!(combinations = count, ?mode, "expanding command");

        let mut commands = Vec::with_capacity(count);
        for i in 0..count {
            let inputs: Vec<&str> = resolved.iter().map(|paths| paths[i].as_str()).collect();
            let values = self.tokens_for(command, &inputs, i);

            let mut argv = tokens.clone();
            for (k, &position) in wildcards.iter().enumerate() {
                argv[position] = inputs[k].to_string();
            }
            let single = outputs.len() == 1;
            for &position in &outputs {
                argv[position] = render_output(&tokens[position], &values, mode, single);
            }

            let line: Vec<String> = argv.iter().map(|arg| quote_arg(arg)).collect();
            commands.push(line.join(" "));
        }

        Ok(ExpandedCommands { commands, warnings })
    }

    fn tokens_for(&self, command: &str, inputs: &[&str], i: usize) -> Tokens {
        let seed = if inputs.is_empty() {
            format!("{command}{i}")
        } else {
            inputs.join("|")
        };
        let hash = short_hash(&seed, self.options.hash_length);
        let name = if inputs.is_empty() {
            hash.clone()
        } else {
            inputs
                .iter()
                .map(|path| file_stem(path))
                .collect::<Vec<_>>()
                .join("_")
        };
        let index = format!("{i:0width$}", width = self.options.index_padding);
        Tokens { name, hash, index }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Hex SHA-256 of `seed`, truncated to `length` characters.
pub fn short_hash(seed: &str, length: usize) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    let mut hex = format!("{digest:x}");
    hex.truncate(length);
    hex
}

fn file_stem(path: &str) -> &str {
    let base = path.rsplit(['/', '\\']).next().unwrap_or(path);
    match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base,
    }
}

fn has_placeholder(arg: &str) -> bool {
    PLACEHOLDER.is_match(arg)
}

fn is_template(arg: &str) -> bool {
    arg.contains('*') || has_placeholder(arg)
}

fn is_flag(arg: &str) -> bool {
    arg.starts_with('-') && arg.len() > 1
}

/// Token positions of `-i` values containing `*`.
fn input_wildcards(tokens: &[String]) -> Vec<usize> {
    tokens
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| pair[0] == "-i" && pair[1].contains('*'))
        .map(|(i, _)| i + 1)
        .collect()
}

/// First token position after the last `-i` value.
fn outputs_start(tokens: &[String]) -> usize {
    tokens
        .iter()
        .rposition(|t| t == "-i")
        .map(|i| i + 2)
        .unwrap_or(0)
}

/// Non-flag tokens after the last input carrying `*` or a placeholder.
fn output_templates(tokens: &[String]) -> Vec<usize> {
    let start = outputs_start(tokens);
    (start..tokens.len())
        .filter(|&i| !is_flag(&tokens[i]) && is_template(&tokens[i]))
        .filter(|&i| i == 0 || !FILTER_FLAGS.contains(&tokens[i - 1].as_str()))
        .collect()
}

/// Filename-looking tokens after the last input that are not flag values.
fn output_candidates(tokens: &[String]) -> Vec<usize> {
    let start = outputs_start(tokens);
    let last = tokens.len().saturating_sub(1);
    (start..tokens.len())
        .filter(|&i| !tokens[i].starts_with('-') && has_short_extension(&tokens[i]))
        .filter(|&i| i == last || i == 0 || !is_flag(&tokens[i - 1]))
        .collect()
}

fn injection_mode(tokens: &[String], outputs: &[usize], has_wildcards: bool) -> InjectionMode {
    if outputs
        .iter()
        .any(|&p| tokens[p].contains(INDEX_PLACEHOLDER))
    {
        InjectionMode::Index
    } else if has_wildcards {
        InjectionMode::Name
    } else {
        InjectionMode::Hash
    }
}

/// Builds one concrete output argument.
///
/// `*` takes the mode's token; placeholders are replaced independently; a
/// sole output without either gets `_<token>` before its extension.
fn render_output(pattern: &str, values: &Tokens, mode: InjectionMode, single: bool) -> String {
    if pattern.contains('*') {
        return pattern.replace('*', values.pick(mode));
    }
    if has_placeholder(pattern) {
        return PLACEHOLDER
            .replace_all(pattern, |caps: &Captures| match &caps[1] {
                "hash" => values.hash.clone(),
                "name" => values.name.clone(),
                _ => values.index.clone(),
            })
            .into_owned();
    }
    if !single {
        return pattern.to_string();
    }

    let token = values.pick(mode);
    let dir_end = pattern.rfind(['/', '\\']).map(|i| i + 1).unwrap_or(0);
    match pattern[dir_end..].rfind('.') {
        Some(dot) if dot > 0 => {
            let dot = dir_end + dot;
            format!("{}_{}{}", &pattern[..dot], token, &pattern[dot..])
        }
        _ => format!("{pattern}_{token}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Resolver answering from a fixed table and recording queries
    #[derive(Default)]
    struct FixedResolver {
        table: HashMap<String, Vec<String>>,
        queries: Mutex<Vec<String>>,
    }

    impl FixedResolver {
        fn with(mut self, pattern: &str, paths: &[&str]) -> Self {
            self.table.insert(
                pattern.to_string(),
                paths.iter().map(|p| p.to_string()).collect(),
            );
            self
        }
    }

    #[async_trait]
    impl PathResolver for FixedResolver {
        async fn resolve(&self, pattern: &str) -> CoreResult<Vec<String>> {
            self.queries.lock().unwrap().push(pattern.to_string());
            Ok(self.table.get(pattern).cloned().unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn test_name_placeholder_per_input() {
        let resolver = FixedResolver::default().with("clip*.mp4", &["clip1.mp4", "clip2.mp4"]);
        let expander = Expander::new(resolver);
        let result = expander
            .expand("ffmpeg -i \"clip*.mp4\" out_{name}.mp4")
            .await
            .unwrap();
        assert_eq!(
            result.commands,
            vec![
                "ffmpeg -i clip1.mp4 out_clip1.mp4",
                "ffmpeg -i clip2.mp4 out_clip2.mp4",
            ]
        );
        assert!(result.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_plain_command_is_unchanged() {
        let expander = Expander::new(FixedResolver::default());
        let command = "ffmpeg -i  in.mp4 -c:v libx264 out.mp4";
        let result = expander.expand(command).await.unwrap();
        assert_eq!(result.commands, vec![command]);
        assert!(expander.resolver.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_wildcard_fails() {
        let expander = Expander::new(FixedResolver::default());
        let err = expander
            .expand("ffmpeg -i raw/*.mov out_*.mp4")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::EmptyExpansion { pattern } if pattern == "raw/*.mov"));
    }

    #[tokio::test]
    async fn test_mismatched_lengths_use_minimum() {
        let resolver = FixedResolver::default()
            .with("v/*.mp4", &["v/a.mp4", "v/b.mp4", "v/c.mp4"])
            .with("a/*.wav", &["a/x.wav", "a/y.wav"]);
        let expander = Expander::new(resolver);
        let result = expander
            .expand("ffmpeg -i v/*.mp4 -i a/*.wav -shortest mux_*.mkv")
            .await
            .unwrap();
        assert_eq!(
            result.commands,
            vec![
                "ffmpeg -i v/a.mp4 -i a/x.wav -shortest mux_a_x.mkv",
                "ffmpeg -i v/b.mp4 -i a/y.wav -shortest mux_b_y.mkv",
            ]
        );
        assert_eq!(result.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_index_mode_with_padding() {
        let resolver = FixedResolver::default().with("*.png", &["b.png", "a.png"]);
        let expander =
            Expander::new(resolver).with_options(ExpandOptions::default().with_index_padding(3));
        let result = expander
            .expand("ffmpeg -i *.png frame_{index}.jpg thumb_*.jpg")
            .await
            .unwrap();
        assert_eq!(
            result.commands,
            vec![
                "ffmpeg -i b.png frame_000.jpg thumb_000.jpg",
                "ffmpeg -i a.png frame_001.jpg thumb_001.jpg",
            ]
        );
    }

    #[tokio::test]
    async fn test_hash_without_inputs_is_distinct() {
        let expander =
            Expander::new(FixedResolver::default()).with_options(ExpandOptions::default());
        let command = "ffmpeg -f lavfi -i testsrc out_{hash}_{name}.mp4";
        let result = expander.expand(command).await.unwrap();
        assert_eq!(result.commands.len(), 1);

        let hash = short_hash(&format!("{command}0"), 8);
        assert_eq!(
            result.commands[0],
            format!("ffmpeg -f lavfi -i testsrc out_{hash}_{hash}.mp4")
        );
    }

    #[tokio::test]
    async fn test_sole_output_without_placeholder_gets_name() {
        let resolver =
            FixedResolver::default().with("in dir/*.mp4", &["in dir/one.mp4", "in dir/two.mp4"]);
        let expander = Expander::new(resolver);
        let result = expander
            .expand("ffmpeg -i \"in dir/*.mp4\" -c:v libx264 -crf 23 renders/final.mp4")
            .await
            .unwrap();
        assert_eq!(
            result.commands,
            vec![
                "ffmpeg -i \"in dir/one.mp4\" -c:v libx264 -crf 23 renders/final_one.mp4",
                "ffmpeg -i \"in dir/two.mp4\" -c:v libx264 -crf 23 renders/final_two.mp4",
            ]
        );
    }

    #[tokio::test]
    async fn test_multiple_plain_outputs_are_left_unchanged() {
        let resolver = FixedResolver::default().with("*.mp4", &["a.mp4", "b.mp4"]);
        let expander = Expander::new(resolver);
        let result = expander
            .expand("ffmpeg -i *.mp4 -map 0:v v.mkv -map 0:a a.m4a")
            .await
            .unwrap();
        assert_eq!(result.commands.len(), 2);
        assert!(result.commands[0].ends_with("-map 0:v v.mkv -map 0:a a.m4a"));
        assert_eq!(result.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_filter_expression_star_is_not_a_template() {
        let resolver = FixedResolver::default().with("*.mp4", &["a.mp4"]);
        let expander = Expander::new(resolver);
        let result = expander
            .expand("ffmpeg -i *.mp4 -vf scale=iw*2:ih out.mp4")
            .await
            .unwrap();
        assert_eq!(
            result.commands,
            vec!["ffmpeg -i a.mp4 -vf scale=iw*2:ih out_a.mp4"]
        );
    }

    #[test]
    fn test_short_hash_length() {
        let hash = short_hash("a.mp4|b.mp4", 8);
        assert_eq!(hash.len(), 8);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(short_hash("abc", 8), "ba7816bf");
        assert_eq!(short_hash("abc", 100).len(), 64);
    }

    #[test]
    fn test_render_output_without_extension() {
        let values = Tokens {
            name: "clip".to_string(),
            hash: "deadbeef".to_string(),
            index: "0".to_string(),
        };
        assert_eq!(
            render_output("out", &values, InjectionMode::Name, true),
            "out_clip"
        );
        assert_eq!(
            render_output("dir.v2/out", &values, InjectionMode::Hash, true),
            "dir.v2/out_deadbeef"
        );
    }

    #[test]
    fn test_placeholders_replaced_in_one_pass() {
        let values = Tokens {
            name: "take{index}".to_string(),
            hash: "deadbeef".to_string(),
            index: "3".to_string(),
        };
        assert_eq!(
            render_output("{name}_{index}_{hash}.mp4", &values, InjectionMode::Index, false),
            "take{index}_3_deadbeef.mp4"
        );
    }
}
