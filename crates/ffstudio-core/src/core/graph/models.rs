//! Graph Node Models
//!
//! Port types, node kinds, slots, links and nodes. Nodes never reference
//! each other directly; every connection goes through the graph's link table.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::properties::PropertyBag;
use crate::core::{LinkId, NodeId, Position, SlotIndex};

// =============================================================================
// Node Type Paths
// =============================================================================

pub const INPUT_NODE_TYPE: &str = "ffmpeg/input";
pub const OUTPUT_NODE_TYPE: &str = "ffmpeg/output";
pub const SELECTOR_NODE_TYPE: &str = "ffmpeg/stream selector";

// =============================================================================
// Slot & Property Names
// =============================================================================

/// Slot name for the map-stream inputs of filters and outputs
pub const STREAM_SLOT: &str = "stream";
pub const GLOBALS_SLOT: &str = "globals";
pub const N_STREAMS_SLOT: &str = "n-streams";
pub const CODEC_SLOT: &str = "codec";
pub const DECODER_V_SLOT: &str = "dec:v";
pub const DECODER_A_SLOT: &str = "dec:a";
pub const DEMUXER_SLOT: &str = "demuxer";
pub const ENCODER_V_SLOT: &str = "enc:v";
pub const ENCODER_A_SLOT: &str = "enc:a";
pub const MUXER_SLOT: &str = "muxer";

pub const SRC_PATH_KEY: &str = "src_path";
pub const DST_PATH_KEY: &str = "dst_path";

/// Comma-separated slot names of an input or output, in the order their
/// options appeared in the imported command
pub const ARG_ORDER_KEY: &str = "arg_order";

// =============================================================================
// Port Types
// =============================================================================

/// Semantic type tag of a port; only ports of equal type connect
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortType {
    #[serde(rename = "fmt")]
    Format,
    #[serde(rename = "ioopt")]
    IoOption,
    #[serde(rename = "streams")]
    Streams,
    #[serde(rename = "maps")]
    MapStream,
    #[serde(rename = "dec")]
    Decoder,
    #[serde(rename = "enc")]
    Encoder,
}

impl PortType {
    pub fn tag(&self) -> &'static str {
        match self {
            PortType::Format => "fmt",
            PortType::IoOption => "ioopt",
            PortType::Streams => "streams",
            PortType::MapStream => "maps",
            PortType::Decoder => "dec",
            PortType::Encoder => "enc",
        }
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// =============================================================================
// Node Kinds
// =============================================================================

/// Closed set of node variants, derived from the node type path
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Input,
    Output,
    StreamSelector,
    Filter,
    Encoder,
    Decoder,
    Muxer,
    Demuxer,
    GenericFlag,
}

impl NodeKind {
    /// Resolves the kind from a type path such as `ffmpeg/filters/video/scale`.
    pub fn from_type_path(path: &str) -> Option<Self> {
        match path {
            INPUT_NODE_TYPE => return Some(NodeKind::Input),
            OUTPUT_NODE_TYPE => return Some(NodeKind::Output),
            SELECTOR_NODE_TYPE => return Some(NodeKind::StreamSelector),
            _ => {}
        }

        let mut parts = path.split('/');
        if parts.next() != Some("ffmpeg") {
            return None;
        }
        let kind = match parts.next()? {
            "filters" => NodeKind::Filter,
            "encoders" => NodeKind::Encoder,
            "decoders" => NodeKind::Decoder,
            "muxers" => NodeKind::Muxer,
            "demuxers" => NodeKind::Demuxer,
            "general" => NodeKind::GenericFlag,
            _ => return None,
        };
        // Capability kinds need at least a name segment.
        parts.next().filter(|s| !s.is_empty())?;
        Some(kind)
    }

    /// Category segment used in type paths (`filters`, `encoders`, ...)
    pub fn category(&self) -> Option<&'static str> {
        match self {
            NodeKind::Filter => Some("filters"),
            NodeKind::Encoder => Some("encoders"),
            NodeKind::Decoder => Some("decoders"),
            NodeKind::Muxer => Some("muxers"),
            NodeKind::Demuxer => Some("demuxers"),
            NodeKind::GenericFlag => Some("general"),
            NodeKind::Input | NodeKind::Output | NodeKind::StreamSelector => None,
        }
    }

    /// Returns true for kinds that keep one spare map-stream input slot.
    pub fn grows_stream_slots(&self) -> bool {
        matches!(self, NodeKind::Filter | NodeKind::Output)
    }
}

// =============================================================================
// Slots & Links
// =============================================================================

/// Input port; holds at most one link
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputSlot {
    pub name: String,
    #[serde(rename = "type")]
    pub port_type: PortType,
    #[serde(default)]
    pub link: Option<LinkId>,
}

impl InputSlot {
    pub fn new(name: impl Into<String>, port_type: PortType) -> Self {
        Self {
            name: name.into(),
            port_type,
            link: None,
        }
    }

    pub fn is_free(&self) -> bool {
        self.link.is_none()
    }
}

/// Output port; may fan out to many links
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputSlot {
    pub name: String,
    #[serde(rename = "type")]
    pub port_type: PortType,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub links: Vec<LinkId>,
}

impl OutputSlot {
    pub fn new(name: impl Into<String>, port_type: PortType) -> Self {
        Self {
            name: name.into(),
            port_type,
            links: Vec::new(),
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<LinkId>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<LinkId>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Directed connection from an output slot to an input slot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    pub id: LinkId,
    pub origin_id: NodeId,
    pub origin_slot: SlotIndex,
    pub target_id: NodeId,
    pub target_slot: SlotIndex,
    pub port_type: PortType,
}

// =============================================================================
// Node
// =============================================================================

/// A graph node: type path, ports and a property bag
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub pos: Position,
    #[serde(default)]
    pub properties: PropertyBag,
    #[serde(default)]
    pub inputs: Vec<InputSlot>,
    #[serde(default)]
    pub outputs: Vec<OutputSlot>,
    /// Session-only selection state for partial emission
    #[serde(skip)]
    pub selected: bool,
}

impl Node {
    /// Creates a node without ports; the graph assigns the id when added.
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            id: 0,
            node_type: node_type.into(),
            pos: Position::default(),
            properties: PropertyBag::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            selected: false,
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, port_type: PortType) -> Self {
        self.inputs.push(InputSlot::new(name, port_type));
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, port_type: PortType) -> Self {
        self.outputs.push(OutputSlot::new(name, port_type));
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.set(key, value);
        self
    }

    pub fn kind(&self) -> Option<NodeKind> {
        NodeKind::from_type_path(&self.node_type)
    }

    /// Capability or flag name: the last segment of the type path.
    pub fn name(&self) -> &str {
        self.node_type
            .rsplit('/')
            .next()
            .unwrap_or(self.node_type.as_str())
    }

    /// Index of the first input slot called `name`.
    pub fn input_index(&self, name: &str) -> Option<SlotIndex> {
        self.inputs.iter().position(|slot| slot.name == name)
    }

    /// Index of the first unlinked input slot of `port_type`.
    pub fn free_input(&self, port_type: PortType) -> Option<SlotIndex> {
        self.inputs
            .iter()
            .position(|slot| slot.port_type == port_type && slot.is_free())
    }

    pub fn count_free_inputs(&self, port_type: PortType) -> usize {
        self.inputs
            .iter()
            .filter(|slot| slot.port_type == port_type && slot.is_free())
            .count()
    }

    pub fn has_output_links(&self) -> bool {
        self.outputs.iter().any(|slot| !slot.links.is_empty())
    }
}
