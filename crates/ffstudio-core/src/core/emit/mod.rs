//! Command Emission
//!
//! Walks a node graph in execution order and assembles the FFmpeg command
//! line it describes: inputs, then the `-filter_complex` graph, then outputs,
//! with `{{var}}` placeholders substituted at the end.

mod context;
mod nodes;

pub use context::{join_fragments, substitute_variables, EmissionContext, PortValue, StreamRef};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::graph::Graph;
use crate::core::{CoreError, CoreResult};

/// Options for one emission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmitOptions {
    /// Emit only selected nodes
    pub selected_only: bool,
    /// Variables overriding the graph's own
    pub variables: BTreeMap<String, String>,
}

impl EmitOptions {
    pub fn selected_only() -> Self {
        Self {
            selected_only: true,
            ..Self::default()
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }
}

/// An emitted command and the usage errors met while producing it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emission {
    /// Arguments after the program name
    pub command: String,
    pub diagnostics: Vec<String>,
}

/// Generates FFmpeg command lines from graphs
#[derive(Debug, Clone)]
pub struct CommandEmitter {
    quote_filter_complex: bool,
}

impl Default for CommandEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandEmitter {
    pub fn new() -> Self {
        Self {
            quote_filter_complex: true,
        }
    }

    /// Sets whether the `-filter_complex` argument is wrapped in double quotes.
    pub fn with_quoted_filter_complex(mut self, quoted: bool) -> Self {
        self.quote_filter_complex = quoted;
        self
    }

    /// Emits the command for `graph`.
    ///
    /// Fails with [`CoreError::MissingOutput`] when no output node ran.
    pub fn emit(&self, graph: &Graph, options: &EmitOptions) -> CoreResult<Emission> {
        let mut variables = graph.variables.clone();
        variables.extend(options.variables.clone());
        let mut ctx = EmissionContext::new(options.selected_only, variables);

        for id in graph.execution_order() {
            if let Some(node) = graph.node(id) {
                nodes::execute(graph, node, &mut ctx);
            }
        }

        if ctx.outputs.is_empty() {
            tracing::error!(
                nodes = graph.nodes().len(),
                selected_only = options.selected_only,
                "no output node produced a fragment"
            );
            return Err(CoreError::MissingOutput);
        }

        let command = substitute_variables(&self.assemble(&ctx), &ctx.variables);
        tracing::debug!(%command, diagnostics = ctx.diagnostics.len(), "emitted command");
        Ok(Emission {
            command,
            diagnostics: ctx.diagnostics,
        })
    }

    fn assemble(&self, ctx: &EmissionContext) -> String {
        let filter_graph = if ctx.filters.is_empty() {
            String::new()
        } else if self.quote_filter_complex {
            format!("-filter_complex \"{}\"", ctx.filters.join(";"))
        } else {
            format!("-filter_complex {}", ctx.filters.join(";"))
        };

        let mut parts: Vec<&str> = ctx.inputs.iter().map(String::as_str).collect();
        parts.push(&filter_graph);
        parts.extend(ctx.outputs.iter().map(String::as_str));
        join_fragments(parts)
    }
}

/// Emits the full-graph command with default options.
pub fn emit_command(graph: &Graph) -> CoreResult<String> {
    CommandEmitter::new()
        .emit(graph, &EmitOptions::default())
        .map(|e| e.command)
}
