//! FFStudio Core Library
//!
//! Bidirectional translation between FFmpeg command lines and typed node graphs.
//! Provides the tokenizer, filter-graph parser, command segmenter, node registry,
//! graph reconstructor, command emitter, wildcard expander and undo history.

pub mod core;

pub use crate::core::{CoreError, CoreResult};
