//! Activation propagation.
//!
//! [`Traversal`] holds the derived liveness of every node and answers
//! whether an edge (or the bus medium) may carry packets. It is recomputed
//! after graph mutations only; the per-frame path reads it.

use slotmap::SecondaryMap;

use crate::graph::{Endpoints, TopologyGraph};
use crate::id::{EdgeId, NodeId};
use crate::topology::ActivationRule;

/// Derived node liveness plus the cached `all_active` predicate.
#[derive(Debug, Clone)]
pub struct Traversal {
    rule: ActivationRule,
    active: SecondaryMap<NodeId, bool>,
    all_active: bool,
}

impl Traversal {
    pub fn new(rule: ActivationRule) -> Self {
        Self {
            rule,
            active: SecondaryMap::new(),
            all_active: true,
        }
    }

    pub fn rule(&self) -> ActivationRule {
        self.rule
    }

    /// Recompute every node's derived state from scratch. Returns the nodes
    /// whose derived state changed, in graph order.
    pub fn propagate(&mut self, graph: &TopologyGraph) -> Vec<NodeId> {
        let mut next: SecondaryMap<NodeId, bool> = SecondaryMap::new();
        match self.rule {
            ActivationRule::Direct | ActivationRule::SharedMedium => {
                for (id, node) in graph.nodes() {
                    next.insert(id, node.enabled);
                }
            }
            ActivationRule::Inherited => {
                let roots: Vec<NodeId> = graph
                    .nodes()
                    .filter(|(_, n)| n.parent.is_none())
                    .map(|(id, _)| id)
                    .collect();
                for root in roots {
                    walk_down(graph, root, true, |id, active| {
                        next.insert(id, active);
                    });
                }
            }
        }

        let changed = graph
            .order()
            .iter()
            .copied()
            .filter(|&id| self.active.get(id).copied() != next.get(id).copied())
            .collect();
        self.active = next;
        self.refresh_all_active(graph);
        changed
    }

    /// Re-derive the subtree under `from` after its toggle changed. Returns
    /// the nodes whose derived state changed, `from` first, then descendants
    /// depth-first.
    ///
    /// Outside the inherited rule only `from` itself is affected.
    pub fn cascade(&mut self, graph: &TopologyGraph, from: NodeId) -> Vec<NodeId> {
        let Some(node) = graph.node(from) else {
            return Vec::new();
        };
        let mut changed = Vec::new();
        match self.rule {
            ActivationRule::Direct | ActivationRule::SharedMedium => {
                if self.active.insert(from, node.enabled) != Some(node.enabled) {
                    changed.push(from);
                }
            }
            ActivationRule::Inherited => {
                let parent_active = node.parent.map_or(true, |p| self.node_active(p));
                let active = &mut self.active;
                walk_down(graph, from, parent_active, |id, state| {
                    if active.insert(id, state) != Some(state) {
                        changed.push(id);
                    }
                });
            }
        }
        self.refresh_all_active(graph);
        changed
    }

    /// Derived liveness. Unknown nodes are inactive.
    pub fn node_active(&self, id: NodeId) -> bool {
        self.active.get(id).copied().unwrap_or(false)
    }

    /// Whether a packet may travel along an edge right now.
    pub fn edge_traversable(&self, graph: &TopologyGraph, id: EdgeId) -> bool {
        let Some(edge) = graph.edge(id) else {
            return false;
        };
        if !edge.active {
            return false;
        }
        match edge.ends {
            Endpoints::Pair { from, to } => self.node_active(from) && self.node_active(to),
            Endpoints::Medium(node) => !graph.is_bus_cut() && self.node_active(node),
        }
    }

    /// Whether the shared medium carries traffic. False when there is none.
    pub fn medium_traversable(&self, graph: &TopologyGraph) -> bool {
        graph.medium().is_some() && !graph.is_bus_cut()
    }

    /// Every node active, every edge active, medium intact.
    pub fn all_active(&self) -> bool {
        self.all_active
    }

    fn refresh_all_active(&mut self, graph: &TopologyGraph) {
        self.all_active = !graph.is_bus_cut()
            && graph.order().iter().all(|&id| self.node_active(id))
            && graph.edges().all(|(_, e)| e.active);
    }
}

/// Depth-first walk from `start`, reporting each node's derived state under
/// the inherited rule.
fn walk_down(
    graph: &TopologyGraph,
    start: NodeId,
    parent_active: bool,
    mut visit: impl FnMut(NodeId, bool),
) {
    let mut stack = vec![(start, parent_active)];
    while let Some((id, inherited)) = stack.pop() {
        let Some(node) = graph.node(id) else {
            continue;
        };
        let active = inherited && node.enabled;
        visit(id, active);
        stack.extend(graph.children(id).iter().rev().map(|&c| (c, active)));
    }
}
