//! Execution order
//!
//! Depth-first post-order over input links: every node runs after the nodes
//! feeding it, and unrelated nodes keep their list order.

use std::collections::HashMap;

use super::store::Graph;
use crate::core::NodeId;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

impl Graph {
    /// Returns node ids so that each node follows all of its upstream nodes.
    ///
    /// Links that would close a cycle are ignored and logged.
    pub fn execution_order(&self) -> Vec<NodeId> {
        let mut marks: HashMap<NodeId, Mark> = HashMap::with_capacity(self.nodes.len());
        let mut order = Vec::with_capacity(self.nodes.len());

        for root in &self.nodes {
            if marks.contains_key(&root.id) {
                continue;
            }

            // (node, next input slot to inspect)
            let mut stack: Vec<(NodeId, usize)> = vec![(root.id, 0)];
            marks.insert(root.id, Mark::Visiting);

            while let Some((id, slot)) = stack.pop() {
                let Some(node) = self.node(id) else {
                    continue;
                };

                if slot >= node.inputs.len() {
                    marks.insert(id, Mark::Done);
                    order.push(id);
                    continue;
                }
                stack.push((id, slot + 1));

                let Some(origin) = self.input_link(id, slot).map(|l| l.origin_id) else {
                    continue;
                };
                match marks.get(&origin) {
                    Some(Mark::Done) => {}
                    Some(Mark::Visiting) => {
                        tracing::warn!(from = origin, to = id, "cycle in graph, link ignored");
                    }
                    None => {
                        if self.node(origin).is_some() {
                            marks.insert(origin, Mark::Visiting);
                            stack.push((origin, 0));
                        }
                    }
                }
            }
        }

        order
    }
}
