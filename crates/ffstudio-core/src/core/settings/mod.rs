//! Settings Persistence
//!
//! Tool settings stored as camelCase JSON:
//! - Every field defaulted, so partial files load
//! - `normalize()` clamps out-of-range values instead of failing
//! - Atomic writes through [`crate::core::fs`]

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::emit::CommandEmitter;
use crate::core::expand::{ExpandOptions, DEFAULT_HASH_LENGTH, DEFAULT_INDEX_PADDING};
use crate::core::fs::{atomic_write_json_pretty, read_json_file};
use crate::core::graph::Graph;
use crate::core::history::{GraphHistory, DEFAULT_MAX_HISTORY};
use crate::core::reconstruct::{DEFAULT_SEGMENT_SPACING, PROGRAM_NAME};
use crate::core::CoreResult;

/// Settings schema version
pub const SETTINGS_VERSION: u32 = 1;

/// Default settings file name
pub const SETTINGS_FILE: &str = "ffstudio.json";

/// Tool settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudioSettings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub emitter: EmitterSettings,

    #[serde(default)]
    pub expander: ExpanderSettings,

    #[serde(default)]
    pub history: HistorySettings,

    #[serde(default)]
    pub layout: LayoutSettings,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

impl Default for StudioSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            emitter: EmitterSettings::default(),
            expander: ExpanderSettings::default(),
            history: HistorySettings::default(),
            layout: LayoutSettings::default(),
        }
    }
}

impl StudioSettings {
    /// Clamps every value into its valid range.
    pub fn normalize(&mut self) {
        self.version = SETTINGS_VERSION;

        if self.emitter.ffmpeg_binary.trim().is_empty() {
            self.emitter.ffmpeg_binary = default_ffmpeg_binary();
        }

        self.expander.hash_length = self.expander.hash_length.clamp(4, 64);
        self.expander.index_padding = self.expander.index_padding.min(12);

        self.history.max_history = self.history.max_history.clamp(1, 500);
        self.history.debounce_ms = self.history.debounce_ms.min(10_000);

        self.layout.merge_jitter = clamp_f64(self.layout.merge_jitter, 0.0, 2000.0);
        self.layout.segment_spacing = clamp_f64(self.layout.segment_spacing, 100.0, 10_000.0);
    }

    /// Loads settings from `path`.
    ///
    /// A missing file yields defaults. An unreadable or unparsable file is
    /// logged and also yields defaults.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            info!(path = %path.display(), "Settings file not found, using defaults");
            return Self::default();
        }

        match read_json_file::<StudioSettings>(path) {
            Ok(mut settings) => {
                settings.normalize();
                settings
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load settings, using defaults");
                Self::default()
            }
        }
    }

    /// Normalizes and writes the settings atomically; returns what was written.
    pub fn save(&self, path: &Path) -> CoreResult<Self> {
        let mut normalized = self.clone();
        normalized.normalize();
        atomic_write_json_pretty(path, &normalized)?;
        info!(path = %path.display(), "Settings saved");
        Ok(normalized)
    }

    pub fn expand_options(&self) -> ExpandOptions {
        ExpandOptions::default()
            .with_hash_length(self.expander.hash_length)
            .with_index_padding(self.expander.index_padding)
    }

    pub fn command_emitter(&self) -> CommandEmitter {
        CommandEmitter::new().with_quoted_filter_complex(self.emitter.quote_filter_complex)
    }

    /// History seeded from `graph` with the configured cap and debounce.
    pub fn graph_history(&self, graph: &Graph) -> CoreResult<GraphHistory> {
        Ok(GraphHistory::new(graph)?
            .with_max_history(self.history.max_history)
            .with_debounce(Duration::from_millis(self.history.debounce_ms)))
    }
}

fn clamp_f64(value: f64, min: f64, max: f64) -> f64 {
    if !value.is_finite() {
        return min;
    }
    value.clamp(min, max)
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmitterSettings {
    /// Program name printed before emitted arguments
    #[serde(default = "default_ffmpeg_binary")]
    pub ffmpeg_binary: String,

    #[serde(default = "default_true")]
    pub quote_filter_complex: bool,
}

impl Default for EmitterSettings {
    fn default() -> Self {
        Self {
            ffmpeg_binary: default_ffmpeg_binary(),
            quote_filter_complex: true,
        }
    }
}

fn default_ffmpeg_binary() -> String {
    PROGRAM_NAME.to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExpanderSettings {
    #[serde(default = "default_hash_length")]
    pub hash_length: usize,

    #[serde(default)]
    pub index_padding: usize,
}

impl Default for ExpanderSettings {
    fn default() -> Self {
        Self {
            hash_length: default_hash_length(),
            index_padding: DEFAULT_INDEX_PADDING,
        }
    }
}

fn default_hash_length() -> usize {
    DEFAULT_HASH_LENGTH
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistorySettings {
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_max_history() -> usize {
    DEFAULT_MAX_HISTORY
}

fn default_debounce_ms() -> u64 {
    250
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LayoutSettings {
    /// Maximum random offset applied to merged nodes, in pixels
    #[serde(default = "default_merge_jitter")]
    pub merge_jitter: f64,

    /// Horizontal distance between imported pipeline segments
    #[serde(default = "default_segment_spacing")]
    pub segment_spacing: f64,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            merge_jitter: default_merge_jitter(),
            segment_spacing: default_segment_spacing(),
        }
    }
}

fn default_merge_jitter() -> f64 {
    200.0
}

fn default_segment_spacing() -> f64 {
    DEFAULT_SEGMENT_SPACING
}
