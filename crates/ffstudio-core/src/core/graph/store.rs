//! Graph store
//!
//! Owns the node list and the link table, and keeps each node's inline slot
//! link fields consistent with that table.

use std::collections::BTreeMap;

use super::models::{InputSlot, Link, Node, NodeKind, PortType, STREAM_SLOT};
use crate::core::{CoreError, CoreResult, LinkId, NodeId, SlotIndex};

/// A node graph for one editing session
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Graph {
    pub(crate) nodes: Vec<Node>,
    pub(crate) links: BTreeMap<LinkId, Link>,
    pub(crate) last_node_id: NodeId,
    pub(crate) last_link_id: LinkId,
    /// User-defined `{{name}}` substitutions
    pub variables: BTreeMap<String, String>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Nodes in insertion order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(&id)
    }

    pub fn last_node_id(&self) -> NodeId {
        self.last_node_id
    }

    pub fn last_link_id(&self) -> LinkId {
        self.last_link_id
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Link feeding `slot` of node `id`, if connected.
    pub fn input_link(&self, id: NodeId, slot: SlotIndex) -> Option<&Link> {
        let link_id = self.node(id)?.inputs.get(slot)?.link?;
        self.links.get(&link_id)
    }

    /// Node connected upstream of `slot` on node `id`.
    pub fn upstream(&self, id: NodeId, slot: SlotIndex) -> Option<&Node> {
        let link = self.input_link(id, slot)?;
        self.node(link.origin_id)
    }

    /// Ids of nodes consuming any output of node `id`, in link order.
    pub fn downstream(&self, id: NodeId) -> Vec<NodeId> {
        self.links
            .values()
            .filter(|l| l.origin_id == id)
            .map(|l| l.target_id)
            .collect()
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Adds a node, assigning the next node id.
    pub fn add_node(&mut self, mut node: Node) -> NodeId {
        self.last_node_id += 1;
        node.id = self.last_node_id;
        for slot in &mut node.inputs {
            slot.link = None;
        }
        for slot in &mut node.outputs {
            slot.links.clear();
        }
        self.nodes.push(node);
        self.last_node_id
    }

    /// Removes a node and every link attached to it.
    pub fn remove_node(&mut self, id: NodeId) -> CoreResult<Node> {
        let index = self
            .nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or(CoreError::NodeNotFound(id))?;

        let attached: Vec<LinkId> = self
            .links
            .values()
            .filter(|l| l.origin_id == id || l.target_id == id)
            .map(|l| l.id)
            .collect();
        for link_id in attached {
            self.remove_link(link_id);
        }

        Ok(self.nodes.remove(index))
    }

    /// Connects `origin`'s output `origin_slot` to `target`'s input `target_slot`.
    ///
    /// Port types must match. A link already occupying the target slot is
    /// replaced; the origin slot fans out.
    pub fn connect(
        &mut self,
        origin: NodeId,
        origin_slot: SlotIndex,
        target: NodeId,
        target_slot: SlotIndex,
    ) -> CoreResult<LinkId> {
        let origin_node = self.node(origin).ok_or(CoreError::NodeNotFound(origin))?;
        let origin_type = origin_node
            .outputs
            .get(origin_slot)
            .ok_or(CoreError::SlotNotFound {
                node_id: origin,
                slot: origin_slot,
            })?
            .port_type;
        let target_node = self.node(target).ok_or(CoreError::NodeNotFound(target))?;
        let target_input = target_node
            .inputs
            .get(target_slot)
            .ok_or(CoreError::SlotNotFound {
                node_id: target,
                slot: target_slot,
            })?;

        if origin_type != target_input.port_type {
            return Err(CoreError::IncompatiblePorts {
                origin: origin_type.to_string(),
                target: target_input.port_type.to_string(),
            });
        }

        if let Some(existing) = target_input.link {
            self.remove_link(existing);
        }

        self.last_link_id += 1;
        let link = Link {
            id: self.last_link_id,
            origin_id: origin,
            origin_slot,
            target_id: target,
            target_slot,
            port_type: origin_type,
        };
        self.attach(&link);
        self.links.insert(link.id, link);
        Ok(self.last_link_id)
    }

    /// Connects into the first free input of `port_type`, appending a slot if none is free.
    pub fn connect_to_free_slot(
        &mut self,
        origin: NodeId,
        origin_slot: SlotIndex,
        target: NodeId,
        slot_name: &str,
        port_type: PortType,
    ) -> CoreResult<LinkId> {
        let target_node = self
            .node_mut(target)
            .ok_or(CoreError::NodeNotFound(target))?;
        let slot = match target_node.free_input(port_type) {
            Some(slot) => slot,
            None => {
                target_node.inputs.push(InputSlot::new(slot_name, port_type));
                target_node.inputs.len() - 1
            }
        };
        self.connect(origin, origin_slot, target, slot)
    }

    /// Drops the link feeding `slot` on node `id`, if any.
    pub fn disconnect_input(&mut self, id: NodeId, slot: SlotIndex) -> Option<Link> {
        let link_id = self.node(id)?.inputs.get(slot)?.link?;
        self.remove_link(link_id)
    }

    /// Removes a link from the table and from both endpoints' slots.
    pub fn remove_link(&mut self, link_id: LinkId) -> Option<Link> {
        let link = self.links.remove(&link_id)?;
        if let Some(origin) = self.node_mut(link.origin_id) {
            if let Some(slot) = origin.outputs.get_mut(link.origin_slot) {
                slot.links.retain(|id| *id != link_id);
            }
        }
        if let Some(target) = self.node_mut(link.target_id) {
            if let Some(slot) = target.inputs.get_mut(link.target_slot) {
                if slot.link == Some(link_id) {
                    slot.link = None;
                }
            }
        }
        Some(link)
    }

    /// Removes input slot `slot`, re-indexing links on later slots.
    pub fn remove_input_slot(&mut self, id: NodeId, slot: SlotIndex) -> CoreResult<()> {
        let len = self
            .node(id)
            .ok_or(CoreError::NodeNotFound(id))?
            .inputs
            .len();
        if slot >= len {
            return Err(CoreError::SlotNotFound { node_id: id, slot });
        }

        self.disconnect_input(id, slot);
        if let Some(node) = self.node_mut(id) {
            node.inputs.remove(slot);
        }
        for link in self.links.values_mut() {
            if link.target_id == id && link.target_slot > slot {
                link.target_slot -= 1;
            }
        }
        Ok(())
    }

    /// Keeps exactly one free map-stream slot on filter and output nodes.
    ///
    /// Surplus free slots are removed from the back; a slot is appended when
    /// none is free.
    pub fn refresh_stream_slots(&mut self, id: NodeId) -> CoreResult<()> {
        let node = self.node(id).ok_or(CoreError::NodeNotFound(id))?;
        if !node.kind().is_some_and(|k| k.grows_stream_slots()) {
            return Ok(());
        }

        let mut surplus = node.count_free_inputs(PortType::MapStream) as isize - 1;
        if surplus < 0 {
            if let Some(node) = self.node_mut(id) {
                node.inputs.push(InputSlot::new(STREAM_SLOT, PortType::MapStream));
            }
            return Ok(());
        }

        while surplus > 0 {
            let Some(slot) = self.node(id).and_then(|n| {
                n.inputs
                    .iter()
                    .rposition(|s| s.port_type == PortType::MapStream && s.is_free())
            }) else {
                break;
            };
            self.remove_input_slot(id, slot)?;
            surplus -= 1;
        }
        Ok(())
    }

    /// Runs [`Graph::refresh_stream_slots`] on every node that grows slots.
    pub fn refresh_all_stream_slots(&mut self) -> CoreResult<()> {
        let ids: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|n| n.kind().is_some_and(|k| k.grows_stream_slots()))
            .map(|n| n.id)
            .collect();
        for id in ids {
            self.refresh_stream_slots(id)?;
        }
        Ok(())
    }

    pub fn set_selected(&mut self, id: NodeId, selected: bool) -> CoreResult<()> {
        let node = self.node_mut(id).ok_or(CoreError::NodeNotFound(id))?;
        node.selected = selected;
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        for node in &mut self.nodes {
            node.selected = false;
        }
    }

    /// Removes all nodes, links and variables and resets id counters.
    pub fn clear(&mut self) {
        *self = Graph::default();
    }

    /// Ids of nodes whose kind is `kind`, in list order.
    pub fn ids_of_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.kind() == Some(kind))
            .map(|n| n.id)
            .collect()
    }

    fn attach(&mut self, link: &Link) {
        if let Some(origin) = self.node_mut(link.origin_id) {
            if let Some(slot) = origin.outputs.get_mut(link.origin_slot) {
                slot.links.push(link.id);
            }
        }
        if let Some(target) = self.node_mut(link.target_id) {
            if let Some(slot) = target.inputs.get_mut(link.target_slot) {
                slot.link = Some(link.id);
            }
        }
    }

    /// Re-derives every inline slot link field from the link table.
    pub(crate) fn rebuild_slot_links(&mut self) {
        for node in &mut self.nodes {
            for slot in &mut node.inputs {
                slot.link = None;
            }
            for slot in &mut node.outputs {
                slot.links.clear();
            }
        }
        let links: Vec<Link> = self.links.values().cloned().collect();
        for link in &links {
            self.attach(link);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::models::{OUTPUT_NODE_TYPE, SELECTOR_NODE_TYPE};

    fn selector() -> Node {
        Node::new(SELECTOR_NODE_TYPE)
            .with_input("n-streams", PortType::Streams)
            .with_output("stream", PortType::MapStream)
    }

    fn output() -> Node {
        Node::new(OUTPUT_NODE_TYPE)
            .with_input("globals", PortType::IoOption)
            .with_input(STREAM_SLOT, PortType::MapStream)
    }

    #[test]
    fn test_add_node_assigns_monotonic_ids() {
        let mut graph = Graph::new();
        let a = graph.add_node(selector());
        let b = graph.add_node(selector());
        assert_eq!((a, b), (1, 2));
        graph.remove_node(b).unwrap();
        assert_eq!(graph.add_node(selector()), 3);
    }

    #[test]
    fn test_connect_rejects_incompatible_ports() {
        let mut graph = Graph::new();
        let sel = graph.add_node(selector());
        let out = graph.add_node(output());
        let err = graph.connect(sel, 0, out, 0).unwrap_err();
        assert!(matches!(err, CoreError::IncompatiblePorts { .. }));
        assert!(graph.links().next().is_none());
    }

    #[test]
    fn test_connect_replaces_target_link_and_fans_out() {
        let mut graph = Graph::new();
        let a = graph.add_node(selector());
        let b = graph.add_node(selector());
        let out1 = graph.add_node(output());
        let out2 = graph.add_node(output());

        let first = graph.connect(a, 0, out1, 1).unwrap();
        let second = graph.connect(b, 0, out1, 1).unwrap();
        assert!(graph.link(first).is_none());
        assert_eq!(graph.node(out1).unwrap().inputs[1].link, Some(second));
        assert!(graph.node(a).unwrap().outputs[0].links.is_empty());

        graph.connect(b, 0, out2, 1).unwrap();
        assert_eq!(graph.node(b).unwrap().outputs[0].links.len(), 2);
        assert_eq!(graph.downstream(b), vec![out1, out2]);
    }

    #[test]
    fn test_remove_node_drops_links() {
        let mut graph = Graph::new();
        let a = graph.add_node(selector());
        let out = graph.add_node(output());
        graph.connect(a, 0, out, 1).unwrap();

        graph.remove_node(a).unwrap();
        assert!(graph.links().next().is_none());
        assert_eq!(graph.node(out).unwrap().inputs[1].link, None);
    }

    #[test]
    fn test_refresh_stream_slots_keeps_one_spare() {
        let mut graph = Graph::new();
        let out = graph.add_node(output());
        let a = graph.add_node(selector());
        let b = graph.add_node(selector());

        graph.connect(a, 0, out, 1).unwrap();
        graph.refresh_stream_slots(out).unwrap();
        assert_eq!(graph.node(out).unwrap().inputs.len(), 3);

        graph.connect_to_free_slot(b, 0, out, STREAM_SLOT, PortType::MapStream).unwrap();
        graph.refresh_stream_slots(out).unwrap();
        assert_eq!(graph.node(out).unwrap().inputs.len(), 4);

        // Disconnecting the first stream leaves two spares; the last is removed.
        graph.disconnect_input(out, 1);
        graph.refresh_stream_slots(out).unwrap();
        let node = graph.node(out).unwrap();
        assert_eq!(node.count_free_inputs(PortType::MapStream), 1);
        assert_eq!(node.inputs.len(), 3);
        let link = graph.input_link(out, 2).unwrap();
        assert_eq!(link.origin_id, b);
    }

    #[test]
    fn test_remove_input_slot_reindexes_links() {
        let mut graph = Graph::new();
        let out = graph.add_node(output().with_input(STREAM_SLOT, PortType::MapStream));
        let a = graph.add_node(selector());
        let link = graph.connect(a, 0, out, 2).unwrap();

        graph.remove_input_slot(out, 1).unwrap();
        assert_eq!(graph.link(link).unwrap().target_slot, 1);
        assert_eq!(graph.node(out).unwrap().inputs[1].link, Some(link));
        assert!(graph.remove_input_slot(out, 9).is_err());
    }
}
