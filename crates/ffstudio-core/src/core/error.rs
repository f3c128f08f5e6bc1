//! FFStudio Error Definitions
//!
//! Defines error types used throughout the project.

use thiserror::Error;

use super::{LinkId, NodeId};

/// Core engine error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Graph Errors
    // =========================================================================
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Link not found: {0}")]
    LinkNotFound(LinkId),

    #[error("Slot {slot} not found on node {node_id}")]
    SlotNotFound { node_id: NodeId, slot: usize },

    #[error("Incompatible ports: cannot connect {origin} output to {target} input")]
    IncompatiblePorts { origin: String, target: String },

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    // =========================================================================
    // Registry Errors
    // =========================================================================
    #[error("Invalid capability manifest: {0}")]
    InvalidManifest(String),

    // =========================================================================
    // Emission Errors
    // =========================================================================
    #[error("No output node: add an Output node to generate a command")]
    MissingOutput,

    // =========================================================================
    // Expansion Errors
    // =========================================================================
    #[error("Wildcard matched no files: {pattern}")]
    EmptyExpansion { pattern: String },

    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidGlob { pattern: String, reason: String },

    // =========================================================================
    // History Errors
    // =========================================================================
    #[error("Stale snapshot: {0}")]
    StaleSnapshot(String),

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Core engine result type
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Returns true for errors caused by user input rather than engine faults.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            CoreError::MissingOutput
                | CoreError::EmptyExpansion { .. }
                | CoreError::InvalidGlob { .. }
                | CoreError::IncompatiblePorts { .. }
                | CoreError::ValidationError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_output_message() {
        let err = CoreError::MissingOutput;
        assert!(err.to_string().contains("Output node"));
        assert!(err.is_user_facing());
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: CoreError = io.into();
        assert!(matches!(err, CoreError::IoError(_)));
        assert!(!err.is_user_facing());
    }
}
