//! `-filter_complex` expression parser
//!
//! Parses a filtergraph such as `[0:v]scale=640:480,format=yuv420p[out]` into
//! an ordered list of [`FilterDescriptor`]s. Comma-chained filters are split
//! into separate descriptors joined by synthetic pad labels.

use std::collections::HashSet;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Length of generated synthetic pad labels
const SYNTHETIC_LABEL_LEN: usize = 6;

const LABEL_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

// =============================================================================
// Types
// =============================================================================

/// One filter option, either `name=value` or a positional value
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOption {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "val")]
    pub value: String,
}

impl FilterOption {
    pub fn named(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            value: value.into(),
        }
    }

    pub fn positional(value: impl Into<String>) -> Self {
        Self {
            name: None,
            value: value.into(),
        }
    }
}

/// A single filter instance within a filtergraph
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDescriptor {
    /// Input pad labels, without brackets
    pub inputs: Vec<String>,
    /// Filter name (may be empty for malformed specs)
    pub filter: String,
    pub options: Vec<FilterOption>,
    /// Output pad labels, without brackets
    pub outputs: Vec<String>,
    /// Instance id from `name@id`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

// =============================================================================
// Parsing
// =============================================================================

/// Parses a `-filter_complex` expression.
pub fn parse_filter_complex(expr: &str) -> Vec<FilterDescriptor> {
    parse_filter_complex_with_rng(expr, &mut rand::thread_rng())
}

/// Parses a `-filter_complex` expression using `rng` for synthetic labels.
pub fn parse_filter_complex_with_rng<R: Rng + ?Sized>(
    expr: &str,
    rng: &mut R,
) -> Vec<FilterDescriptor> {
    let rewritten = split_comma_chains(expr, rng);

    rewritten
        .split(';')
        .filter(|chain| !chain.trim().is_empty())
        .map(parse_chain)
        .collect()
}

/// Rewrites every top-level `,` into `[x];[x]` with a fresh label `x`.
fn split_comma_chains<R: Rng + ?Sized>(expr: &str, rng: &mut R) -> String {
    let existing = collect_labels(expr);
    let mut used: HashSet<String> = HashSet::new();
    let mut out = String::with_capacity(expr.len());
    let mut in_single = false;
    let mut in_double = false;
    let mut in_bracket = false;
    let mut paren_depth: i32 = 0;
    let mut chars = expr.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            out.push(c);
            if let Some(next) = chars.next() {
                out.push(next);
            }
            continue;
        }

        match c {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            _ => {}
        }
        if !in_single && !in_double {
            match c {
                '[' => in_bracket = true,
                ']' => in_bracket = false,
                '(' => paren_depth += 1,
                ')' => paren_depth -= 1,
                _ => {}
            }
        }

        if c == ',' && !in_single && !in_double && !in_bracket && paren_depth == 0 {
            let label = loop {
                let candidate = synthetic_label(rng);
                if !existing.contains(&candidate) && used.insert(candidate.clone()) {
                    break candidate;
                }
            };
            out.push_str(&format!("[{label}];[{label}]"));
        } else {
            out.push(c);
        }
    }
    out
}

fn synthetic_label<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..SYNTHETIC_LABEL_LEN)
        .map(|_| LABEL_ALPHABET[rng.gen_range(0..LABEL_ALPHABET.len())] as char)
        .collect()
}

fn collect_labels(expr: &str) -> HashSet<String> {
    let mut labels = HashSet::new();
    let mut rest = expr;
    while let Some(start) = rest.find('[') {
        let after = &rest[start + 1..];
        match after.find(']') {
            Some(end) => {
                labels.insert(after[..end].to_string());
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    labels
}

/// Strips a leading `[label]`, returning the label and the remainder.
fn take_leading_label(text: &str) -> Option<(&str, &str)> {
    let inner = text.strip_prefix('[')?;
    let end = inner.find(']')?;
    if end == 0 {
        return None;
    }
    Some((&inner[..end], &inner[end + 1..]))
}

fn parse_chain(chain: &str) -> FilterDescriptor {
    let mut descriptor = FilterDescriptor::default();
    let mut current = chain.trim();

    while let Some((label, rest)) = take_leading_label(current) {
        descriptor.inputs.push(label.to_string());
        current = rest.trim();
    }

    let filter_end = current.find('[').unwrap_or(current.len());
    let (filter_part, mut remaining) = current.split_at(filter_end);
    let filter_part = filter_part.trim();

    if !filter_part.is_empty() {
        let spec = match split_instance_id(filter_part) {
            Some((name, id, rest)) => {
                descriptor.id = Some(id.trim().to_string());
                format!("{name}{rest}")
            }
            None => filter_part.to_string(),
        };

        match spec.split_once('=') {
            Some((name, opts)) => {
                descriptor.filter = name.trim().to_string();
                descriptor.options = parse_filter_options(opts);
            }
            None => descriptor.filter = spec.trim().to_string(),
        }
    }

    while let Some(start) = remaining.find('[') {
        let after = &remaining[start + 1..];
        match after.find(']') {
            Some(end) if end > 0 => {
                descriptor.outputs.push(after[..end].to_string());
                remaining = &after[end + 1..];
            }
            _ => break,
        }
    }

    descriptor
}

/// Splits `name@id<rest>` where neither `name` nor `id` contain `=`.
fn split_instance_id(spec: &str) -> Option<(&str, &str, &str)> {
    let at = spec.find('@')?;
    let name = &spec[..at];
    if name.is_empty() || name.contains('=') {
        return None;
    }
    let after = &spec[at + 1..];
    let id_end = after.find('=').unwrap_or(after.len());
    if id_end == 0 {
        return None;
    }
    Some((name, &after[..id_end], &after[id_end..]))
}

/// Splits option text on `:` outside quotes and parentheses.
///
/// Escapes are preserved verbatim; empty values are dropped.
pub fn parse_filter_options(opts: &str) -> Vec<FilterOption> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut paren_depth: i32 = 0;
    let mut chars = opts.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '\'' if !in_double => {
                in_single = !in_single;
                current.push(c);
            }
            '"' if !in_single => {
                in_double = !in_double;
                current.push(c);
            }
            ':' if !in_single && !in_double && paren_depth == 0 => {
                pieces.push(std::mem::take(&mut current));
            }
            _ => {
                if !in_single && !in_double {
                    if c == '(' {
                        paren_depth += 1;
                    } else if c == ')' {
                        paren_depth -= 1;
                    }
                }
                current.push(c);
            }
        }
    }
    pieces.push(current);

    pieces
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .filter_map(|piece| match piece.split_once('=') {
            Some((name, value)) => {
                let (name, value) = (name.trim(), value.trim());
                match (name.is_empty(), value.is_empty()) {
                    (_, true) => None,
                    (true, false) => Some(FilterOption::positional(value)),
                    (false, false) => Some(FilterOption::named(name, value)),
                }
            }
            None => Some(FilterOption::positional(piece)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_filter_with_positional_options() {
        let filters = parse_filter_complex("[0:v]scale=640:480[out]");
        assert_eq!(filters.len(), 1);
        let f = &filters[0];
        assert_eq!(f.inputs, vec!["0:v"]);
        assert_eq!(f.filter, "scale");
        assert_eq!(
            f.options,
            vec![FilterOption::positional("640"), FilterOption::positional("480")]
        );
        assert_eq!(f.outputs, vec!["out"]);
        assert_eq!(f.id, None);
    }

    #[test]
    fn test_pad_labels_link_segments() {
        let filters = parse_filter_complex("[0:v]split[a][b];[a]scale=100:100[x]");
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].filter, "split");
        assert_eq!(filters[0].outputs, vec!["a", "b"]);
        assert_eq!(filters[1].inputs, vec!["a"]);
        assert_eq!(filters[1].outputs, vec!["x"]);
    }

    #[test]
    fn test_comma_chain_gets_synthetic_label() {
        let filters = parse_filter_complex("[0:v]scale=320:-1,format=yuv420p[v]");
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].outputs.len(), 1);
        let link = &filters[0].outputs[0];
        assert_eq!(link.len(), SYNTHETIC_LABEL_LEN);
        assert_eq!(&filters[1].inputs, &vec![link.clone()]);
        assert_eq!(filters[1].filter, "format");
        assert_eq!(filters[1].outputs, vec!["v"]);
    }

    #[test]
    fn test_commas_inside_parens_and_quotes_are_kept() {
        let filters = parse_filter_complex(
            "[0:v]select='eq(n,0)+eq(n,10)',drawtext=text='a,b':x=(w-tw)/2[v]",
        );
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].filter, "select");
        assert_eq!(filters[0].options[0].value, "'eq(n,0)+eq(n,10)'");
        assert_eq!(filters[1].filter, "drawtext");
        assert_eq!(filters[1].options[0], FilterOption::named("text", "'a,b'"));
        assert_eq!(filters[1].options[1], FilterOption::named("x", "(w-tw)/2"));
    }

    #[test]
    fn test_named_options_and_colons_in_quotes() {
        let filters = parse_filter_complex("[0:v]drawtext=text='12:30':fontsize=24[v]");
        assert_eq!(
            filters[0].options,
            vec![
                FilterOption::named("text", "'12:30'"),
                FilterOption::named("fontsize", "24"),
            ]
        );
    }

    #[test]
    fn test_escaped_colon_is_not_a_separator() {
        let opts = parse_filter_options(r"text=a\:b:x=1");
        assert_eq!(opts[0], FilterOption::named("text", r"a\:b"));
        assert_eq!(opts[1], FilterOption::named("x", "1"));
    }

    #[test]
    fn test_empty_values_are_dropped() {
        let opts = parse_filter_options("w=:h=480::");
        assert_eq!(opts, vec![FilterOption::named("h", "480")]);
    }

    #[test]
    fn test_filter_instance_id() {
        let filters = parse_filter_complex("[in]scale@main=w=1280:h=720[out]");
        assert_eq!(filters[0].filter, "scale");
        assert_eq!(filters[0].id.as_deref(), Some("main"));
        assert_eq!(filters[0].options[0], FilterOption::named("w", "1280"));
    }

    #[test]
    fn test_filter_without_options() {
        let filters = parse_filter_complex("[0:v][1:v]overlay[v]");
        assert_eq!(filters[0].inputs, vec!["0:v", "1:v"]);
        assert_eq!(filters[0].filter, "overlay");
        assert!(filters[0].options.is_empty());
    }

    #[test]
    fn test_malformed_spec_is_retained() {
        let filters = parse_filter_complex("[a][b];;  ;[c]=x=1[d]");
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].filter, "");
        assert_eq!(filters[0].inputs, vec!["a", "b"]);
        assert_eq!(filters[1].filter, "");
        assert_eq!(filters[1].outputs, vec!["d"]);
    }

    #[test]
    fn test_synthetic_labels_do_not_collide_with_user_labels() {
        let mut rng = rand::thread_rng();
        let filters = parse_filter_complex_with_rng("[0:a]volume=2,aresample=48000,anull[a]", &mut rng);
        assert_eq!(filters.len(), 3);
        assert_ne!(filters[0].outputs[0], filters[1].outputs[0]);
        assert_eq!(filters[0].outputs[0], filters[1].inputs[0]);
        assert_eq!(filters[1].outputs[0], filters[2].inputs[0]);
    }
}
