//! FFStudio Core Engine
//!
//! Core translation engine module.
//! Handles command parsing, graph reconstruction, command emission, template
//! expansion, editing history and settings.

pub mod emit;
pub mod expand;
pub mod fs;
pub mod graph;
pub mod history;
pub mod parser;
pub mod reconstruct;
pub mod registry;
pub mod settings;

// Re-export common types
mod types;
pub use types::*;

mod error;
pub use error::*;

#[cfg(test)]
mod tests_roundtrip;
