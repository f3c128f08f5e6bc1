//! FFStudio Core Type Definitions
//!
//! Defines fundamental types used throughout the project.

use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Graph-scoped node identifier (monotonically increasing)
pub type NodeId = u32;

/// Graph-scoped link identifier (monotonically increasing)
pub type LinkId = u32;

/// Index of an input or output slot on a node
pub type SlotIndex = usize;

// =============================================================================
// Geometry Types
// =============================================================================

/// Canvas position, serialized as `[x, y]`
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position(pub f64, pub f64);

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self(x, y)
    }

    pub fn x(&self) -> f64 {
        self.0
    }

    pub fn y(&self) -> f64 {
        self.1
    }

    /// Returns this position shifted by the given offsets
    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self(self.0 + dx, self.1 + dy)
    }
}
