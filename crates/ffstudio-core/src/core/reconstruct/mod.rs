//! Graph Reconstruction
//!
//! Rebuilds a wired node graph from FFmpeg command text. Each pipeline
//! segment is tokenized, split into inputs/filters/outputs and built into the
//! target graph next to any nodes already present. Reconstruction prefers
//! partial results: anything that cannot be modeled is reported as a
//! diagnostic instead of failing the import.

mod builder;

pub use builder::SegmentReport;

use serde::{Deserialize, Serialize};

use crate::core::graph::{place_in_grid, Graph};
use crate::core::parser::{split_ffmpeg_args, split_pipe, tokenize, ParsedCommand};
use crate::core::registry::NodeRegistry;
use crate::core::{CoreResult, NodeId};

use builder::SegmentBuilder;

/// Horizontal distance between the grids of consecutive segments
pub const DEFAULT_SEGMENT_SPACING: f64 = 800.0;

/// Program token stripped from the start of each segment
pub const PROGRAM_NAME: &str = "ffmpeg";

/// Result of importing command text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseReport {
    /// Created node ids, segment by segment
    pub nodes: Vec<NodeId>,
    /// Number of pipeline segments imported
    pub segments: usize,
    /// Best-effort fallbacks taken while rebuilding
    pub diagnostics: Vec<String>,
}

/// Returns true if `text` looks like an FFmpeg invocation.
pub fn is_ffmpeg_command(text: &str) -> bool {
    let text = text.trim_start();
    text.starts_with(PROGRAM_NAME) || text.contains("-i ")
}

/// Builds the nodes for one parsed segment into `graph`.
pub fn build_graph(
    parsed: &ParsedCommand,
    registry: &NodeRegistry,
    graph: &mut Graph,
) -> CoreResult<SegmentReport> {
    SegmentBuilder::new(registry, graph).build(parsed)
}

/// Imports command text into a graph
#[derive(Debug, Clone)]
pub struct GraphReconstructor<'a> {
    registry: &'a NodeRegistry,
    segment_spacing: f64,
}

impl<'a> GraphReconstructor<'a> {
    pub fn new(registry: &'a NodeRegistry) -> Self {
        Self {
            registry,
            segment_spacing: DEFAULT_SEGMENT_SPACING,
        }
    }

    pub fn with_segment_spacing(mut self, spacing: f64) -> Self {
        self.segment_spacing = spacing;
        self
    }

    /// Rebuilds every pipeline segment of `text` into `graph`.
    ///
    /// Existing nodes are kept. Each segment's nodes are placed on their own
    /// grid, offset horizontally by the segment spacing.
    pub fn import(&self, text: &str, graph: &mut Graph) -> CoreResult<ParseReport> {
        let mut report = ParseReport::default();

        for (index, segment) in split_pipe(text).iter().enumerate() {
            let mut args = tokenize(segment);
            if args.first().is_some_and(|a| a == PROGRAM_NAME) {
                args.remove(0);
            }
            if args.is_empty() {
                continue;
            }

            let parsed = split_ffmpeg_args(&args);
            let built = build_graph(&parsed, self.registry, graph)?;
            place_in_grid(graph, &built.nodes, index as f64 * self.segment_spacing);

            tracing::debug!(
                segment = index,
                nodes = built.nodes.len(),
                diagnostics = built.diagnostics.len(),
                "reconstructed command segment"
            );
            report.nodes.extend(built.nodes);
            report.diagnostics.extend(built.diagnostics);
            report.segments += 1;
        }

        Ok(report)
    }
}

/// Rebuilds `text` into `graph` with default placement.
pub fn parse_ffmpeg_command(
    text: &str,
    registry: &NodeRegistry,
    graph: &mut Graph,
) -> CoreResult<ParseReport> {
    GraphReconstructor::new(registry).import(text, graph)
}
