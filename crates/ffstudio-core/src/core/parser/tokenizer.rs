//! Shell-like argument tokenizer
//!
//! Splits command text into arguments honoring single/double quotes,
//! backslash escapes and line continuations, and splits piped commands
//! into pipeline stages.

use std::sync::LazyLock;

use regex::Regex;

/// Backslash followed by a line break, with any surrounding whitespace.
static LINE_CONTINUATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\\s*[\r\n]+\s*").expect("line continuation pattern is valid")
});

/// Quote state while scanning command text
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct QuoteState {
    single: bool,
    double: bool,
}

impl QuoteState {
    /// Updates the state for `c`, returning true if `c` was a quote toggle.
    fn toggle(&mut self, c: char) -> bool {
        match c {
            '"' if !self.single => {
                self.double = !self.double;
                true
            }
            '\'' if !self.double => {
                self.single = !self.single;
                true
            }
            _ => false,
        }
    }

    fn is_quoted(&self) -> bool {
        self.single || self.double
    }
}

/// Collapses `\`-newline line continuations into a single space.
pub fn join_line_continuations(text: &str) -> String {
    LINE_CONTINUATION.replace_all(text, " ").into_owned()
}

/// Splits command text into arguments.
///
/// Quotes are removed, escapes are resolved and empty tokens are dropped.
/// An unterminated quote is closed silently at end of input.
pub fn tokenize(command: &str) -> Vec<String> {
    let text = join_line_continuations(command);
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quotes = QuoteState::default();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' && !quotes.single {
            match chars.peek() {
                Some(&next @ ('"' | '\'' | '\\' | ' ')) => {
                    current.push(next);
                    chars.next();
                }
                _ => current.push(c),
            }
            continue;
        }

        if quotes.toggle(c) {
            continue;
        }

        if !quotes.is_quoted() && matches!(c, ' ' | '\t' | '\r' | '\n') {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            continue;
        }

        current.push(c);
    }

    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Splits a piped command into its stages on top-level `|`.
///
/// Stage text is returned trimmed, with quoting left intact for [`tokenize`].
pub fn split_pipe(command: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quotes = QuoteState::default();

    for c in command.chars() {
        quotes.toggle(c);
        if c == '|' && !quotes.is_quoted() {
            segments.push(std::mem::take(&mut current).trim().to_string());
            continue;
        }
        current.push(c);
    }
    segments.push(current.trim().to_string());

    segments.retain(|s| !s.is_empty());
    segments
}

/// Quotes an argument for display if it contains whitespace or quotes.
pub fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "\"\"".to_string();
    }
    if arg.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'') {
        let escaped = arg.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{escaped}\"")
    } else {
        arg.to_string()
    }
}
