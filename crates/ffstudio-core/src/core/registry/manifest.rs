//! Capability Manifest
//!
//! Describes the codecs, formats, filters and general flags an FFmpeg build
//! supports, as probed from its help output. Each AV entry becomes one node
//! type; each option of a non-AV entry becomes one flag node type.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{CoreError, CoreResult};

/// One option of a manifest entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestOption {
    /// Option flag as printed by FFmpeg (`-crf`, `w`, `-ss`)
    pub flag: String,

    /// Value type tag such as `<int>` or `<string>`
    #[serde(rename = "type", default)]
    pub value_type: Option<String>,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub desc: Option<String>,

    #[serde(default)]
    pub enum_vals: Vec<String>,

    /// Flag takes no value (`-y`, `-an`)
    #[serde(default)]
    pub no_args: bool,
}

/// One capability or option group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,

    /// True for codecs/formats/filters, false for general option groups
    #[serde(default)]
    pub is_av_option: bool,

    /// Capability flags such as `V`, `A`, `VA`, `S`, `E`, `D`
    #[serde(default)]
    pub category: String,

    /// Parent category: `encoders`, `decoders`, `filters`, `muxers`, `demuxers`
    #[serde(default)]
    pub pcategory: String,

    #[serde(default)]
    pub desc: String,

    #[serde(default)]
    pub full_desc: Vec<String>,

    #[serde(default)]
    pub options: Vec<ManifestOption>,
}

impl ManifestEntry {
    /// Node type path for an AV entry.
    ///
    /// `ffmpeg/<pcategory>/[subtitles/][all|video|audio/]<name>`
    pub fn av_path(&self) -> String {
        let mut path = String::from("ffmpeg/");
        if !self.pcategory.is_empty() {
            path.push_str(&self.pcategory);
            path.push('/');
        }
        let cat = self.category.as_str();
        if cat.contains('S') {
            path.push_str("subtitles/");
        }
        if cat.contains("VA") {
            path.push_str("all/");
        } else if cat.contains('V') {
            path.push_str("video/");
        } else if cat.contains('A') {
            path.push_str("audio/");
        } else if cat.contains('E') || cat.contains('D') {
            path.push_str("all/");
        }
        path.push_str(&self.name);
        path
    }

    /// Node type path for one option of a general entry.
    pub fn flag_path(&self, option: &ManifestOption) -> String {
        format!("ffmpeg/general/{}/{}", self.name, option.flag)
    }

    fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::InvalidManifest("entry with empty name".to_string()));
        }
        if self.is_av_option && self.pcategory.trim().is_empty() {
            return Err(CoreError::InvalidManifest(format!(
                "AV entry '{}' has no pcategory",
                self.name
            )));
        }
        Ok(())
    }
}

/// A full capability manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses a manifest from a JSON array of entries.
    pub fn parse(json: &str) -> CoreResult<Self> {
        let manifest: Self = serde_json::from_str(json)
            .map_err(|e| CoreError::InvalidManifest(format!("invalid JSON: {e}")))?;
        for entry in &manifest.entries {
            entry.validate()?;
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, category: &str, pcategory: &str) -> ManifestEntry {
        ManifestEntry {
            name: name.to_string(),
            is_av_option: true,
            category: category.to_string(),
            pcategory: pcategory.to_string(),
            desc: String::new(),
            full_desc: Vec::new(),
            options: Vec::new(),
        }
    }

    #[test]
    fn test_av_paths() {
        assert_eq!(entry("scale", "V", "filters").av_path(), "ffmpeg/filters/video/scale");
        assert_eq!(entry("aac", "A", "encoders").av_path(), "ffmpeg/encoders/audio/aac");
        assert_eq!(entry("concat", "VA", "filters").av_path(), "ffmpeg/filters/all/concat");
        assert_eq!(entry("srt", "S", "decoders").av_path(), "ffmpeg/decoders/subtitles/srt");
        assert_eq!(entry("mp4", "E", "muxers").av_path(), "ffmpeg/muxers/all/mp4");
        assert_eq!(entry("mov", "", "demuxers").av_path(), "ffmpeg/demuxers/mov");
    }

    #[test]
    fn test_parse_with_defaults() {
        let json = r#"[
            {"name": "main options", "options": [{"flag": "-y", "no_args": true}]},
            {"name": "libx264", "is_av_option": true, "category": "V", "pcategory": "encoders",
             "options": [{"flag": "-crf", "type": "<float>"}]}
        ]"#;
        let manifest = Manifest::parse(json).unwrap();
        assert_eq!(manifest.entries.len(), 2);
        let general = &manifest.entries[0];
        assert!(!general.is_av_option);
        assert_eq!(general.flag_path(&general.options[0]), "ffmpeg/general/main options/-y");
        assert_eq!(manifest.entries[1].options[0].value_type.as_deref(), Some("<float>"));
    }

    #[test]
    fn test_parse_rejects_invalid_entries() {
        let err = Manifest::parse(r#"[{"name": "x", "is_av_option": true}]"#).unwrap_err();
        assert!(matches!(err, CoreError::InvalidManifest(_)));
        assert!(Manifest::parse("{not json").is_err());
    }
}
