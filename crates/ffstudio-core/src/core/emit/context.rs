//! Emission context
//!
//! Per-call accumulator for one command emission. Created fresh for every
//! [`CommandEmitter::emit`](super::CommandEmitter::emit) call and consumed
//! when the command string is assembled.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::core::graph::Graph;
use crate::core::{NodeId, SlotIndex};

/// Stream produced by an input or a filter, by position in its fragment list
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamRef {
    Input(usize),
    Filter(usize),
}

/// Value a node publishes on its output port
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PortValue {
    /// Streams of an input or filter
    Stream(StreamRef),
    /// A resolved stream specifier; `processed` marks filter pad labels
    Selected { data: String, processed: bool },
    /// A command fragment: codec, format or option chain
    Text(String),
}

/// Accumulated fragments and values of one emission pass
#[derive(Debug, Default)]
pub struct EmissionContext {
    pub selected_only: bool,
    pub inputs: Vec<String>,
    pub filters: Vec<String>,
    pub outputs: Vec<String>,
    pub variables: BTreeMap<String, String>,
    pub diagnostics: Vec<String>,
    values: HashMap<NodeId, PortValue>,
}

impl EmissionContext {
    pub fn new(selected_only: bool, variables: BTreeMap<String, String>) -> Self {
        Self {
            selected_only,
            variables,
            ..Self::default()
        }
    }

    pub fn publish(&mut self, id: NodeId, value: PortValue) {
        self.values.insert(id, value);
    }

    #[cfg(test)]
    pub(crate) fn value_of(&self, id: NodeId) -> Option<&PortValue> {
        self.values.get(&id)
    }

    /// Value arriving at input `slot` of node `id`, if connected and produced.
    pub fn input_value(&self, graph: &Graph, id: NodeId, slot: SlotIndex) -> Option<&PortValue> {
        let link = graph.input_link(id, slot)?;
        self.values.get(&link.origin_id)
    }

    /// Text arriving at input `slot`; empty when unconnected or not text.
    pub fn input_text(&self, graph: &Graph, id: NodeId, slot: Option<SlotIndex>) -> &str {
        match slot.and_then(|s| self.input_value(graph, id, s)) {
            Some(PortValue::Text(text)) => text,
            _ => "",
        }
    }

    /// Sets a variable unless the caller already supplied it.
    pub fn publish_variable(&mut self, name: String, value: &str) {
        self.variables
            .entry(name)
            .or_insert_with(|| value.to_string());
    }

    /// Records a usage error; emission continues.
    pub fn usage_error(&mut self, id: NodeId, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(node_id = id, %message, "graph usage error");
        self.diagnostics.push(format!("node {id}: {message}"));
    }
}

/// Joins non-empty fragments with single spaces.
pub fn join_fragments<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{([^{}]+)\}\}").expect("variable pattern is valid")
});

/// Replaces every `{{name}}` with its value; unknown placeholders stay verbatim.
///
/// Substituted values are not scanned again.
pub fn substitute_variables(text: &str, variables: &BTreeMap<String, String>) -> String {
    VARIABLE
        .replace_all(text, |caps: &Captures| match variables.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_fragments_skips_empty() {
        assert_eq!(join_fragments(["-c:v x", "", "  ", "-i a.mp4"]), "-c:v x -i a.mp4");
        assert_eq!(join_fragments(Vec::<&str>::new()), "");
    }

    #[test]
    fn test_substitute_variables() {
        let mut vars = BTreeMap::new();
        vars.insert("crf".to_string(), "23".to_string());
        vars.insert("Out".to_string(), "final.mp4".to_string());

        assert_eq!(
            substitute_variables("-crf {{crf}} {{crf}} {{Out}} {{out}} {{missing}}", &vars),
            "-crf 23 23 final.mp4 {{out}} {{missing}}"
        );
    }

    #[test]
    fn test_substituted_values_are_not_expanded_again() {
        let mut vars = BTreeMap::new();
        vars.insert("a".to_string(), "{{b}}".to_string());
        vars.insert("b".to_string(), "x".to_string());
        assert_eq!(substitute_variables("{{a}}-{{b}}", &vars), "{{b}}-x");
    }

    #[test]
    fn test_publish_variable_keeps_caller_value() {
        let mut vars = BTreeMap::new();
        vars.insert("input_0".to_string(), "override.mp4".to_string());
        let mut ctx = EmissionContext::new(false, vars);
        ctx.publish_variable("input_0".to_string(), "a.mp4");
        ctx.publish_variable("output_0".to_string(), "b.mp4");
        assert_eq!(ctx.variables["input_0"], "override.mp4");
        assert_eq!(ctx.variables["output_0"], "b.mp4");
    }
}
