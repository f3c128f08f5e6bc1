//! Node Registry
//!
//! Catalog of node types keyed by type path. The reconstructor queries it by
//! exact path membership to decide which node to create for a codec, format,
//! filter or flag name.

mod manifest;
mod schema;

pub use manifest::*;
pub use schema::*;

use std::collections::HashMap;
use std::path::Path;

use crate::core::graph::{Node, NodeKind, StreamSelection, SELECTOR_NODE_TYPE};
use crate::core::{CoreError, CoreResult};

/// Baseline manifest shipped with the library
const BUILTIN_MANIFEST: &str = include_str!("../../../resources/builtin_manifest.json");

/// Media sub-paths searched for codecs and filters, in order
const MEDIA_SEGMENTS: [&str; 3] = ["video/", "audio/", "all/"];

/// Registry of node schemas by type path
#[derive(Debug, Clone)]
pub struct NodeRegistry {
    schemas: Vec<NodeSchema>,
    index: HashMap<String, usize>,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeRegistry {
    /// Creates a registry holding only the input, output and selector types.
    pub fn new() -> Self {
        let mut registry = Self {
            schemas: Vec::new(),
            index: HashMap::new(),
        };
        for schema in NodeSchema::builtin_io() {
            registry.register(schema);
        }
        registry
    }

    /// Creates a registry from the bundled baseline manifest.
    pub fn builtin() -> CoreResult<Self> {
        let manifest = Manifest::parse(BUILTIN_MANIFEST)?;
        Ok(Self::from_manifest(&manifest))
    }

    pub fn from_manifest(manifest: &Manifest) -> Self {
        let mut registry = Self::new();
        registry.register_manifest(manifest);
        registry
    }

    pub fn load_manifest_file(path: &Path) -> CoreResult<Self> {
        let manifest = Manifest::load_from_file(path)?;
        Ok(Self::from_manifest(&manifest))
    }

    /// Registers every entry of `manifest`, returning the number of node types added.
    pub fn register_manifest(&mut self, manifest: &Manifest) -> usize {
        let before = self.schemas.len();
        for entry in &manifest.entries {
            if entry.is_av_option {
                match NodeSchema::from_av_entry(entry) {
                    Some(schema) => self.register(schema),
                    None => tracing::debug!(
                        name = %entry.name,
                        pcategory = %entry.pcategory,
                        "skipping manifest entry with unsupported category"
                    ),
                }
            } else {
                for option in &entry.options {
                    self.register(NodeSchema::from_flag(entry, option));
                }
            }
        }
        let added = self.schemas.len() - before;
        tracing::debug!(added, total = self.schemas.len(), "registered manifest node types");
        added
    }

    /// Registers a schema, replacing any schema with the same path.
    pub fn register(&mut self, schema: NodeSchema) {
        match self.index.get(&schema.path) {
            Some(&i) => self.schemas[i] = schema,
            None => {
                self.index.insert(schema.path.clone(), self.schemas.len());
                self.schemas.push(schema);
            }
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<&NodeSchema> {
        self.index.get(path).map(|&i| &self.schemas[i])
    }

    /// Schemas in registration order
    pub fn schemas(&self) -> &[NodeSchema] {
        &self.schemas
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    fn first_registered<I: IntoIterator<Item = String>>(&self, paths: I) -> Option<&NodeSchema> {
        paths.into_iter().find_map(|p| self.get(&p))
    }

    /// Finds a codec by name under `encoders` or `decoders`.
    pub fn find_codec(&self, name: &str, kind: NodeKind) -> Option<&NodeSchema> {
        let category = match kind {
            NodeKind::Encoder => "encoders",
            NodeKind::Decoder => "decoders",
            _ => return None,
        };
        self.first_registered(media_paths(category, name, false))
    }

    /// Finds a format by name under `muxers` or `demuxers`.
    pub fn find_format(&self, name: &str, kind: NodeKind) -> Option<&NodeSchema> {
        let category = match kind {
            NodeKind::Muxer => "muxers",
            NodeKind::Demuxer => "demuxers",
            _ => return None,
        };
        self.first_registered(media_paths(category, name, true))
    }

    pub fn find_filter(&self, name: &str) -> Option<&NodeSchema> {
        if name.is_empty() {
            return None;
        }
        self.first_registered(media_paths("filters", name, false))
    }

    /// Finds the first registered flag node whose path ends in `/<flag>`.
    pub fn find_flag(&self, flag: &str) -> Option<&NodeSchema> {
        let suffix = format!("/{flag}");
        self.schemas
            .iter()
            .find(|s| s.kind == NodeKind::GenericFlag && s.path.ends_with(&suffix))
    }

    // =========================================================================
    // Instantiation
    // =========================================================================

    pub fn instantiate(&self, path: &str) -> CoreResult<Node> {
        self.get(path)
            .map(NodeSchema::instantiate)
            .ok_or_else(|| CoreError::UnknownNodeType(path.to_string()))
    }

    /// Creates a stream selector node configured for `selection`.
    pub fn instantiate_selector(&self, selection: &StreamSelection) -> CoreResult<Node> {
        let mut node = self.instantiate(SELECTOR_NODE_TYPE)?;
        node.properties = selection.to_properties();
        Ok(node)
    }
}

/// Candidate paths for `name` under `category`.
///
/// Formats try the bare path first; codecs and filters try it after the
/// media sub-paths. Subtitle paths come last.
fn media_paths(category: &str, name: &str, bare_first: bool) -> Vec<String> {
    let bare = format!("ffmpeg/{category}/{name}");
    let mut paths = Vec::with_capacity(MEDIA_SEGMENTS.len() + 2);
    if bare_first {
        paths.push(bare.clone());
    }
    paths.extend(
        MEDIA_SEGMENTS
            .iter()
            .map(|segment| format!("ffmpeg/{category}/{segment}{name}")),
    );
    if !bare_first {
        paths.push(bare);
    }
    paths.push(format!("ffmpeg/{category}/subtitles/{name}"));
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::{MediaType, SelectBy, SELECT_BY_KEY};

    #[test]
    fn test_builtin_registry_loads() {
        let registry = NodeRegistry::builtin().unwrap();
        assert!(registry.contains("ffmpeg/input"));
        assert!(registry.contains("ffmpeg/output"));
        assert!(registry.contains("ffmpeg/stream selector"));
        assert!(registry.len() > 20);
    }

    #[test]
    fn test_find_capabilities() {
        let registry = NodeRegistry::builtin().unwrap();
        let enc = registry.find_codec("libx264", NodeKind::Encoder).unwrap();
        assert_eq!(enc.path, "ffmpeg/encoders/video/libx264");
        assert!(registry.find_codec("libx264", NodeKind::Decoder).is_none());
        assert!(registry.find_codec("libx264", NodeKind::Filter).is_none());

        let filter = registry.find_filter("scale").unwrap();
        assert_eq!(filter.kind, NodeKind::Filter);
        assert!(registry.find_filter("").is_none());
        assert!(registry.find_filter("nonexistent_filter").is_none());

        let muxer = registry.find_format("mp4", NodeKind::Muxer).unwrap();
        assert_eq!(muxer.kind, NodeKind::Muxer);
    }

    #[test]
    fn test_find_flag_by_suffix() {
        let registry = NodeRegistry::builtin().unwrap();
        let ss = registry.find_flag("-ss").unwrap();
        assert!(ss.path.starts_with("ffmpeg/general/"));
        assert!(ss.path.ends_with("/-ss"));
        assert!(registry.find_flag("-y").unwrap().no_args);
        assert!(registry.find_flag("-definitely-not-a-flag").is_none());
    }

    #[test]
    fn test_register_replaces_same_path() {
        let mut registry = NodeRegistry::new();
        let before = registry.len();
        let [input, ..] = NodeSchema::builtin_io();
        registry.register(input);
        assert_eq!(registry.len(), before);
    }

    #[test]
    fn test_instantiate_unknown_path() {
        let registry = NodeRegistry::new();
        let err = registry.instantiate("ffmpeg/filters/video/scale").unwrap_err();
        assert!(matches!(err, CoreError::UnknownNodeType(_)));
    }

    #[test]
    fn test_instantiate_selector() {
        let registry = NodeRegistry::new();
        let node = registry
            .instantiate_selector(&StreamSelection::Type {
                media: MediaType::Audio,
                index: None,
            })
            .unwrap();
        assert_eq!(node.properties.get(SELECT_BY_KEY), Some(SelectBy::Type.as_str()));
        assert_eq!(node.kind(), Some(NodeKind::StreamSelector));
    }

    #[test]
    fn test_media_path_order() {
        let codec = media_paths("encoders", "aac", false);
        assert_eq!(codec[0], "ffmpeg/encoders/video/aac");
        assert_eq!(codec[3], "ffmpeg/encoders/aac");
        let format = media_paths("muxers", "mp4", true);
        assert_eq!(format[0], "ffmpeg/muxers/mp4");
        assert_eq!(format[3], "ffmpeg/muxers/all/mp4");
    }
}
