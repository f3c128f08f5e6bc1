//! FFmpeg Command Parsing
//!
//! Turns command text into structured pieces:
//! shell-like tokens, pipeline stages, `-filter_complex` descriptors and
//! input/output argument slices.

mod filter_graph;
mod segmenter;
mod tokenizer;

pub use filter_graph::*;
pub use segmenter::*;
pub use tokenizer::*;
