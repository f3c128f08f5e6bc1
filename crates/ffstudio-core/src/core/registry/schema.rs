//! Node schemas
//!
//! Data-driven description of one node type: its kind, option names, value
//! types and choices. Instantiating a schema yields a node with the port
//! layout of its kind and one empty property per option.

use serde::{Deserialize, Serialize};

use super::manifest::{ManifestEntry, ManifestOption};
use crate::core::graph::{
    Node, NodeKind, PortType, StreamSelection, CODEC_SLOT, DECODER_A_SLOT, DECODER_V_SLOT,
    DEMUXER_SLOT, DST_PATH_KEY, ENCODER_A_SLOT, ENCODER_V_SLOT, GLOBALS_SLOT, INPUT_NODE_TYPE,
    MUXER_SLOT, N_STREAMS_SLOT, OUTPUT_NODE_TYPE, SELECTOR_NODE_TYPE, SRC_PATH_KEY, STREAM_SLOT,
};

/// Value type of an option, from the manifest's `<type>` tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Text,
    Int,
    Float,
    Bool,
    Flags,
}

impl ValueType {
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag.unwrap_or_default() {
            "<int>" | "<int64>" | "<uint64>" => ValueType::Int,
            "<float>" | "<double>" => ValueType::Float,
            "<bool>" | "<boolean>" => ValueType::Bool,
            "<flags>" => ValueType::Flags,
            _ => ValueType::Text,
        }
    }
}

/// One settable option of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSchema {
    pub flag: String,
    pub value_type: ValueType,
    /// Allowed values; empty means free-form
    pub choices: Vec<String>,
}

impl OptionSchema {
    fn from_manifest(option: &ManifestOption) -> Self {
        Self {
            flag: option.flag.clone(),
            value_type: ValueType::from_tag(option.value_type.as_deref()),
            choices: option.enum_vals.clone(),
        }
    }

    /// Returns false for values outside the declared choices or boolean set.
    ///
    /// Numeric options are not checked: FFmpeg accepts expressions and
    /// suffixed values (`2M`, `iw/2`) there.
    pub fn accepts(&self, value: &str) -> bool {
        if value.is_empty() {
            return true;
        }
        if !self.choices.is_empty() {
            return self.choices.iter().any(|c| c == value);
        }
        match self.value_type {
            ValueType::Bool => matches!(value, "true" | "false" | "1" | "0"),
            _ => true,
        }
    }
}

/// Schema of one registered node type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSchema {
    /// Type path, e.g. `ffmpeg/encoders/video/libx264`
    pub path: String,
    pub kind: NodeKind,
    pub desc: String,
    pub options: Vec<OptionSchema>,
    /// Flag nodes only: the flag takes no value
    pub no_args: bool,
}

impl NodeSchema {
    /// Schema for an AV manifest entry; `None` for unknown parent categories.
    pub fn from_av_entry(entry: &ManifestEntry) -> Option<Self> {
        let path = entry.av_path();
        let kind = NodeKind::from_type_path(&path)?;
        if kind == NodeKind::GenericFlag {
            return None;
        }
        Some(Self {
            path,
            kind,
            desc: entry.full_desc.join("\n"),
            options: entry.options.iter().map(OptionSchema::from_manifest).collect(),
            no_args: false,
        })
    }

    /// Schema for one option of a general (non-AV) manifest entry.
    pub fn from_flag(entry: &ManifestEntry, option: &ManifestOption) -> Self {
        Self {
            path: entry.flag_path(option),
            kind: NodeKind::GenericFlag,
            desc: option.desc.clone().unwrap_or_default(),
            options: vec![OptionSchema::from_manifest(option)],
            no_args: option.no_args,
        }
    }

    fn io(path: &str, kind: NodeKind, desc: &str) -> Self {
        Self {
            path: path.to_string(),
            kind,
            desc: desc.to_string(),
            options: Vec::new(),
            no_args: false,
        }
    }

    /// Schemas of the three built-in node types.
    pub fn builtin_io() -> [Self; 3] {
        [
            Self::io(INPUT_NODE_TYPE, NodeKind::Input, "Input source (-i)"),
            Self::io(OUTPUT_NODE_TYPE, NodeKind::Output, "Output destination"),
            Self::io(
                SELECTOR_NODE_TYPE,
                NodeKind::StreamSelector,
                "Selects streams from inputs or names filter pads",
            ),
        ]
    }

    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(self.path.as_str())
    }

    pub fn option(&self, flag: &str) -> Option<&OptionSchema> {
        self.options.iter().find(|o| o.flag == flag)
    }

    /// Creates a node with this schema's ports and empty option properties.
    pub fn instantiate(&self) -> Node {
        let node = Node::new(self.path.clone());
        let node = match self.kind {
            NodeKind::Input => node
                .with_input(GLOBALS_SLOT, PortType::IoOption)
                .with_input(DECODER_V_SLOT, PortType::Decoder)
                .with_input(DECODER_A_SLOT, PortType::Decoder)
                .with_input(DEMUXER_SLOT, PortType::Format)
                .with_output(N_STREAMS_SLOT, PortType::Streams)
                .with_property(SRC_PATH_KEY, ""),
            NodeKind::Output => node
                .with_input(GLOBALS_SLOT, PortType::IoOption)
                .with_input(ENCODER_V_SLOT, PortType::Encoder)
                .with_input(ENCODER_A_SLOT, PortType::Encoder)
                .with_input(MUXER_SLOT, PortType::Format)
                .with_input(STREAM_SLOT, PortType::MapStream)
                .with_property(DST_PATH_KEY, ""),
            NodeKind::StreamSelector => {
                let mut node = node
                    .with_input(N_STREAMS_SLOT, PortType::Streams)
                    .with_output(STREAM_SLOT, PortType::MapStream);
                node.properties = StreamSelection::default().to_properties();
                node
            }
            NodeKind::Filter => node
                .with_input(STREAM_SLOT, PortType::MapStream)
                .with_output(N_STREAMS_SLOT, PortType::Streams),
            NodeKind::Encoder => node.with_output(CODEC_SLOT, PortType::Encoder),
            NodeKind::Decoder => node.with_output(CODEC_SLOT, PortType::Decoder),
            NodeKind::Muxer => node.with_output(MUXER_SLOT, PortType::Format),
            NodeKind::Demuxer => node.with_output(DEMUXER_SLOT, PortType::Format),
            NodeKind::GenericFlag => {
                let node = node.with_input(GLOBALS_SLOT, PortType::IoOption);
                let node = if self.no_args {
                    node
                } else {
                    node.with_input(STREAM_SLOT, PortType::MapStream)
                };
                node.with_output(GLOBALS_SLOT, PortType::IoOption)
            }
        };

        let mut node = node;
        for option in &self.options {
            node.properties.set(option.flag.clone(), "");
        }
        node
    }
}
