//! Graph serialization
//!
//! The serialized document is the exchange format for clipboard, `.ffgraph`
//! files and undo snapshots:
//!
//! ```json
//! { "nodes": [...], "links": [[id, origin, slot, target, slot, "maps"]],
//!   "last_node_id": 7, "last_link_id": 9, "extra": { "variables": {} } }
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::models::{Link, Node, NodeKind, PortType};
use super::store::Graph;
use crate::core::fs::{atomic_write_json_pretty, read_json_file};
use crate::core::{CoreError, CoreResult, LinkId, NodeId, SlotIndex};

/// Link record: `[id, origin_id, origin_slot, target_id, target_slot, type]`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedLink(
    pub LinkId,
    pub NodeId,
    pub SlotIndex,
    pub NodeId,
    pub SlotIndex,
    pub PortType,
);

impl SerializedLink {
    pub fn id(&self) -> LinkId {
        self.0
    }
}

impl From<&Link> for SerializedLink {
    fn from(link: &Link) -> Self {
        SerializedLink(
            link.id,
            link.origin_id,
            link.origin_slot,
            link.target_id,
            link.target_slot,
            link.port_type,
        )
    }
}

/// Graph-level data outside nodes and links
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphExtra {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
}

/// Serialized graph document
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SerializedGraph {
    #[serde(default)]
    pub last_node_id: NodeId,
    #[serde(default)]
    pub last_link_id: LinkId,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub links: Vec<SerializedLink>,
    #[serde(default)]
    pub extra: GraphExtra,
}

impl SerializedGraph {
    pub fn from_json(json: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn load(path: &Path) -> CoreResult<Self> {
        read_json_file(path)
    }

    pub fn save(&self, path: &Path) -> CoreResult<()> {
        atomic_write_json_pretty(path, self)
    }
}

impl Graph {
    /// Captures the full graph state. Selection is not included.
    pub fn serialize(&self) -> SerializedGraph {
        SerializedGraph {
            last_node_id: self.last_node_id,
            last_link_id: self.last_link_id,
            nodes: self.nodes.clone(),
            links: self.links.values().map(SerializedLink::from).collect(),
            extra: GraphExtra {
                variables: self.variables.clone(),
            },
        }
    }

    /// Replaces the graph state with `doc`.
    ///
    /// Inline slot link fields are rebuilt from the link table; links whose
    /// endpoints or slots do not exist are dropped.
    pub fn configure(&mut self, doc: &SerializedGraph) -> CoreResult<()> {
        let mut seen = HashSet::new();
        for node in &doc.nodes {
            if node.kind().is_none() {
                return Err(CoreError::UnknownNodeType(node.node_type.clone()));
            }
            if !seen.insert(node.id) {
                return Err(CoreError::ValidationError(format!(
                    "duplicate node id {}",
                    node.id
                )));
            }
        }

        let mut next = Graph {
            nodes: doc.nodes.clone(),
            variables: doc.extra.variables.clone(),
            ..Graph::default()
        };
        for node in &mut next.nodes {
            node.selected = false;
        }

        for record in &doc.links {
            let link = Link {
                id: record.0,
                origin_id: record.1,
                origin_slot: record.2,
                target_id: record.3,
                target_slot: record.4,
                port_type: record.5,
            };
            let origin_ok = next
                .node(link.origin_id)
                .is_some_and(|n| link.origin_slot < n.outputs.len());
            let target_ok = next
                .node(link.target_id)
                .is_some_and(|n| link.target_slot < n.inputs.len());
            if !origin_ok || !target_ok {
                tracing::warn!(link_id = link.id, "dropping link with missing endpoint");
                continue;
            }
            next.links.insert(link.id, link);
        }
        next.rebuild_slot_links();

        let max_node = next.nodes.iter().map(|n| n.id).max().unwrap_or(0);
        let max_link = next.links.keys().next_back().copied().unwrap_or(0);
        next.last_node_id = doc.last_node_id.max(max_node);
        next.last_link_id = doc.last_link_id.max(max_link);

        *self = next;
        Ok(())
    }

    pub fn from_serialized(doc: &SerializedGraph) -> CoreResult<Self> {
        let mut graph = Graph::new();
        graph.configure(doc)?;
        Ok(graph)
    }

    pub fn load_file(path: &Path) -> CoreResult<Self> {
        Self::from_serialized(&SerializedGraph::load(path)?)
    }

    pub fn save_file(&self, path: &Path) -> CoreResult<()> {
        self.serialize().save(path)
    }
}

// =============================================================================
// Merge
// =============================================================================

/// Appends graph `b` into graph `a`, remapping `b`'s ids above `a`'s.
pub fn merge_graphs(a: &SerializedGraph, b: &SerializedGraph, jitter: f64) -> SerializedGraph {
    merge_graphs_with_rng(a, b, jitter, &mut rand::thread_rng())
}

/// [`merge_graphs`] with an explicit random source for the position offset.
pub fn merge_graphs_with_rng<R: Rng + ?Sized>(
    a: &SerializedGraph,
    b: &SerializedGraph,
    jitter: f64,
    rng: &mut R,
) -> SerializedGraph {
    let (dx, dy) = if jitter > 0.0 {
        (
            rng.gen_range(0.0..jitter).floor(),
            rng.gen_range(0.0..jitter).floor(),
        )
    } else {
        (0.0, 0.0)
    };

    let max_node = a.nodes.iter().map(|n| n.id).max().unwrap_or(0);
    let max_link = a.links.iter().map(SerializedLink::id).max().unwrap_or(0);
    let mut next_node = a.last_node_id.max(max_node) + 1;
    let mut next_link = a.last_link_id.max(max_link) + 1;

    let mut id_map: HashMap<NodeId, NodeId> = HashMap::with_capacity(b.nodes.len());
    let mut merged_nodes: Vec<Node> = Vec::with_capacity(b.nodes.len());
    for node in &b.nodes {
        let mut copy = node.clone();
        id_map.insert(node.id, next_node);
        copy.id = next_node;
        next_node += 1;
        copy.pos = copy.pos.offset(dx, dy);
        for slot in &mut copy.inputs {
            slot.link = None;
        }
        for slot in &mut copy.outputs {
            slot.links.clear();
        }
        merged_nodes.push(copy);
    }

    let mut merged_links = Vec::with_capacity(b.links.len());
    for SerializedLink(old_id, origin, origin_slot, target, target_slot, port_type) in &b.links {
        let (Some(&origin), Some(&target)) = (id_map.get(origin), id_map.get(target)) else {
            tracing::warn!(link_id = old_id, "dropping merged link with missing endpoint");
            continue;
        };
        let link = SerializedLink(next_link, origin, *origin_slot, target, *target_slot, *port_type);
        next_link += 1;

        if let Some(slot) = merged_nodes
            .iter_mut()
            .find(|n| n.id == origin)
            .and_then(|n| n.outputs.get_mut(*origin_slot))
        {
            slot.links.push(link.0);
        }
        if let Some(slot) = merged_nodes
            .iter_mut()
            .find(|n| n.id == target)
            .and_then(|n| n.inputs.get_mut(*target_slot))
        {
            slot.link = Some(link.0);
        }
        merged_links.push(link);
    }

    let mut variables = b.extra.variables.clone();
    variables.extend(a.extra.variables.clone());

    let mut nodes = a.nodes.clone();
    nodes.extend(merged_nodes);
    let mut links = a.links.clone();
    links.extend(merged_links);

    SerializedGraph {
        last_node_id: next_node - 1,
        last_link_id: next_link - 1,
        nodes,
        links,
        extra: GraphExtra { variables },
    }
}

/// Counts nodes of `kind` in a serialized document.
pub fn count_kind(doc: &SerializedGraph, kind: NodeKind) -> usize {
    doc.nodes.iter().filter(|n| n.kind() == Some(kind)).count()
}
