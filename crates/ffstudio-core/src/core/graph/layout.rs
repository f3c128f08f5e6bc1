//! Node placement
//!
//! Visual placement only; positions never affect emission.

use std::collections::{HashMap, HashSet, VecDeque};

use super::store::Graph;
use crate::core::{NodeId, Position};

const NODE_WIDTH: f64 = 210.0;
const NODE_HEIGHT: f64 = 100.0;
const HORIZONTAL_SPACING: f64 = 250.0;
const VERTICAL_SPACING: f64 = 150.0;
const MARGIN: f64 = 50.0;

const GRID_COLUMNS: usize = 4;
const GRID_CELL_WIDTH: f64 = 200.0;
const GRID_CELL_HEIGHT: f64 = 150.0;
const GRID_GAP: f64 = 50.0;
const GRID_TOP: f64 = 50.0;

/// Places `ids` on a 4-column grid starting at `origin_x`.
///
/// Used for freshly reconstructed command segments.
pub fn place_in_grid(graph: &mut Graph, ids: &[NodeId], origin_x: f64) {
    for (index, id) in ids.iter().enumerate() {
        let row = (index / GRID_COLUMNS) as f64;
        let col = (index % GRID_COLUMNS) as f64;
        if let Some(node) = graph.node_mut(*id) {
            node.pos = Position::new(
                origin_x + col * (GRID_CELL_WIDTH + GRID_GAP),
                GRID_TOP + row * (GRID_CELL_HEIGHT + GRID_GAP),
            );
        }
    }
}

/// Arranges the whole graph left-to-right by dependency level.
///
/// Each connected component is laid out in its own horizontal band; within a
/// component a node's column is its longest distance from a source node.
pub fn arrange(graph: &mut Graph) {
    let order: HashMap<NodeId, usize> = graph
        .nodes()
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id, i))
        .collect();

    let mut neighbors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    let mut children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for link in graph.links() {
        if !order.contains_key(&link.origin_id) || !order.contains_key(&link.target_id) {
            continue;
        }
        neighbors.entry(link.origin_id).or_default().push(link.target_id);
        neighbors.entry(link.target_id).or_default().push(link.origin_id);
        children.entry(link.origin_id).or_default().push(link.target_id);
    }

    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut components: Vec<Vec<NodeId>> = Vec::new();
    for node in graph.nodes() {
        if visited.contains(&node.id) {
            continue;
        }
        let mut component = Vec::new();
        let mut stack = vec![node.id];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            component.push(id);
            if let Some(next) = neighbors.get(&id) {
                stack.extend(next.iter().filter(|n| !visited.contains(*n)));
            }
        }
        component.sort_by_key(|id| order[id]);
        components.push(component);
    }

    let mut band_top = MARGIN;
    for component in components {
        let levels = longest_path_levels(graph, &component, &children);

        let mut by_level: Vec<Vec<NodeId>> = Vec::new();
        for id in &component {
            let level = levels.get(id).copied().unwrap_or(0);
            if by_level.len() <= level {
                by_level.resize_with(level + 1, Vec::new);
            }
            by_level[level].push(*id);
        }

        let band_height = by_level
            .iter()
            .map(|ids| ids.len() as f64 * (NODE_HEIGHT + VERTICAL_SPACING))
            .fold(0.0, f64::max);

        for (level, ids) in by_level.iter().enumerate() {
            let x = MARGIN + level as f64 * (NODE_WIDTH + HORIZONTAL_SPACING);
            let column_height = ids.len() as f64 * (NODE_HEIGHT + VERTICAL_SPACING) - VERTICAL_SPACING;
            let mut y = band_top + (band_height - column_height) / 2.0;
            for id in ids {
                if let Some(node) = graph.node_mut(*id) {
                    node.pos = Position::new(x, y);
                }
                y += NODE_HEIGHT + VERTICAL_SPACING;
            }
        }

        band_top += band_height + MARGIN;
    }
}

/// Longest distance from any source (a node with no linked inputs).
///
/// Levels are capped at the component size so cycles terminate.
fn longest_path_levels(
    graph: &Graph,
    component: &[NodeId],
    children: &HashMap<NodeId, Vec<NodeId>>,
) -> HashMap<NodeId, usize> {
    let members: HashSet<NodeId> = component.iter().copied().collect();
    let cap = component.len().saturating_sub(1);
    let mut levels: HashMap<NodeId, usize> = HashMap::new();
    let mut queue: VecDeque<NodeId> = VecDeque::new();

    for id in component {
        let is_source = graph
            .node(*id)
            .is_some_and(|n| n.inputs.iter().all(|slot| slot.link.is_none()));
        if is_source {
            levels.insert(*id, 0);
            queue.push_back(*id);
        }
    }

    while let Some(id) = queue.pop_front() {
        let next_level = (levels[&id] + 1).min(cap);
        for child in children.get(&id).into_iter().flatten() {
            if !members.contains(child) {
                continue;
            }
            if levels.get(child).map_or(true, |l| *l < next_level) {
                levels.insert(*child, next_level);
                queue.push_back(*child);
            }
        }
    }
    levels
}
