//! The topology graph: nodes, the edges derived from them, and the shared
//! bus medium.
//!
//! Nodes live in a slotmap and keep their insertion `order` (cyclic order for
//! rings). Edges are never edited directly: after every node add or remove
//! they are regenerated from the graph's [`EdgeRule`], and an edge whose
//! endpoint pair survives keeps its id and active flag. Positions are clamped
//! into the configured [`Bounds`].

use crate::config::Bounds;
use crate::geom::{Point3, project_onto_segment};
use crate::id::*;
use crate::topology::EdgeRule;
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Core data structures
// ---------------------------------------------------------------------------

/// The part a node plays in its topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// Star center.
    Hub,
    /// Ordinary station (star rim, ring, bus, mesh).
    Peer,
    /// Upper-tier tree node. Can be toggled by the user.
    Parent,
    /// Lower-tier tree node.
    Child,
}

/// Per-node data stored in the topology graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    pub position: Point3,
    pub role: NodeRole,
    /// The node's own toggle. Effective liveness may also depend on
    /// ancestors; see [`crate::propagate`].
    pub enabled: bool,
    /// Tree parent. `None` for roots and for every non-tree node.
    pub parent: Option<NodeId>,
}

/// What an edge connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endpoints {
    /// Two nodes. Ordered hub→peer for star spokes and parent→child for
    /// tree links; ring and mesh links treat the order as incidental.
    Pair { from: NodeId, to: NodeId },
    /// A bus connector joining a node to the shared medium.
    Medium(NodeId),
}

/// Order-insensitive identity of an edge, used to keep edge ids stable when
/// the edge set is regenerated.
type EdgeKey = (NodeId, Option<NodeId>);

impl Endpoints {
    pub fn contains(&self, node: NodeId) -> bool {
        match *self {
            Endpoints::Pair { from, to } => from == node || to == node,
            Endpoints::Medium(n) => n == node,
        }
    }

    /// The nodes this edge touches (one for a bus connector).
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> {
        let (a, b) = match *self {
            Endpoints::Pair { from, to } => (from, Some(to)),
            Endpoints::Medium(n) => (n, None),
        };
        std::iter::once(a).chain(b)
    }

    /// The endpoint opposite `node`, for pair edges.
    pub fn other(&self, node: NodeId) -> Option<NodeId> {
        match *self {
            Endpoints::Pair { from, to } if from == node => Some(to),
            Endpoints::Pair { from, to } if to == node => Some(from),
            _ => None,
        }
    }

    fn key(&self) -> EdgeKey {
        match *self {
            Endpoints::Pair { from, to } => (from.min(to), Some(from.max(to))),
            Endpoints::Medium(n) => (n, None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Spoke,
    RingLink,
    Tap,
    Hierarchy,
    MeshLink,
}

/// Per-edge data stored in the topology graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeData {
    pub ends: Endpoints,
    pub kind: EdgeKind,
    pub active: bool,
}

// ---------------------------------------------------------------------------
// TopologyGraph
// ---------------------------------------------------------------------------

/// Nodes, edges, and activation flags for one topology.
///
/// The edge set is never edited directly: it is regenerated from the
/// [`EdgeRule`] whenever a node is added or removed. Regeneration keeps the
/// id and active flag of every edge whose endpoint pair survives.
///
/// All mutators are total. An unknown id is a no-op and positions are
/// clamped to the topology [`Bounds`].
#[derive(Debug, Clone)]
pub struct TopologyGraph {
    rule: EdgeRule,
    bounds: Bounds,
    nodes: SlotMap<NodeId, NodeData>,
    edges: SlotMap<EdgeId, EdgeData>,
    adjacency: SecondaryMap<NodeId, Vec<EdgeId>>,
    /// Children by parent, in insertion order.
    children: SecondaryMap<NodeId, Vec<NodeId>>,
    /// Node order. For a ring this is the cycle order.
    order: Vec<NodeId>,
    /// Edge order as produced by the edge rule.
    edge_order: Vec<EdgeId>,
    bus_cut: bool,
}

impl TopologyGraph {
    /// Create an empty graph.
    pub fn new(rule: EdgeRule, bounds: Bounds) -> Self {
        Self {
            rule,
            bounds,
            nodes: SlotMap::with_key(),
            edges: SlotMap::with_key(),
            adjacency: SecondaryMap::new(),
            children: SecondaryMap::new(),
            order: Vec::new(),
            edge_order: Vec::new(),
            bus_cut: false,
        }
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Add a node. Returns `None` when `parent` names a node that does not
    /// exist.
    pub fn add_node(
        &mut self,
        position: Point3,
        role: NodeRole,
        parent: Option<NodeId>,
    ) -> Option<NodeId> {
        if let Some(p) = parent {
            if !self.nodes.contains_key(p) {
                return None;
            }
        }
        let position = self.bounds.clamp(position);
        let id = self.nodes.insert(NodeData {
            position,
            role,
            enabled: true,
            parent,
        });
        self.adjacency.insert(id, Vec::new());
        self.children.insert(id, Vec::new());
        if let Some(kids) = parent.and_then(|p| self.children.get_mut(p)) {
            kids.push(id);
        }

        if self.rule == EdgeRule::Cycle {
            let angle = position.planar_angle();
            let slot = self
                .order
                .iter()
                .position(|&n| {
                    self.nodes
                        .get(n)
                        .is_some_and(|d| d.position.planar_angle() > angle)
                })
                .unwrap_or(self.order.len());
            self.order.insert(slot, id);
        } else {
            self.order.push(id);
        }

        self.rebuild_edges();
        Some(id)
    }

    /// Remove a node together with its descendants. Returns every removed
    /// node, the target first, then descendants in depth-first order. Empty
    /// when the id is unknown.
    pub fn remove_node(&mut self, id: NodeId) -> Vec<NodeId> {
        if !self.nodes.contains_key(id) {
            return Vec::new();
        }
        let mut removed = vec![id];
        removed.extend(self.descendants(id));

        if let Some(parent) = self.nodes.get(id).and_then(|n| n.parent) {
            if let Some(kids) = self.children.get_mut(parent) {
                kids.retain(|&k| k != id);
            }
        }
        for &n in &removed {
            self.nodes.remove(n);
            self.adjacency.remove(n);
            self.children.remove(n);
        }
        self.order.retain(|n| self.nodes.contains_key(*n));

        self.rebuild_edges();
        removed
    }

    /// Move a node, clamped to the topology bounds. Returns `false` for an
    /// unknown id.
    pub fn move_node(&mut self, id: NodeId, position: Point3) -> bool {
        let bounds = self.bounds;
        match self.nodes.get_mut(id) {
            Some(node) => {
                node.position = bounds.clamp_move(node.position, position);
                true
            }
            None => false,
        }
    }

    /// Set a node's own toggle. Returns `true` if the flag changed.
    pub fn set_node_active(&mut self, id: NodeId, active: bool) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) if node.enabled != active => {
                node.enabled = active;
                true
            }
            _ => false,
        }
    }

    /// Set an edge's active flag. Returns `true` if the flag changed.
    pub fn set_edge_active(&mut self, id: EdgeId, active: bool) -> bool {
        match self.edges.get_mut(id) {
            Some(edge) if edge.active != active => {
                edge.active = active;
                true
            }
            _ => false,
        }
    }

    /// Cut or restore the shared medium. No-op without a medium. Returns
    /// `true` if the flag changed.
    pub fn set_bus_cut(&mut self, cut: bool) -> bool {
        if self.medium().is_none() || self.bus_cut == cut {
            return false;
        }
        self.bus_cut = cut;
        true
    }

    // -----------------------------------------------------------------------
    // Edge generation
    // -----------------------------------------------------------------------

    fn desired_edges(&self) -> Vec<(Endpoints, EdgeKind)> {
        let order = &self.order;
        match self.rule {
            EdgeRule::Spokes => match self.hub() {
                Some(hub) => order
                    .iter()
                    .filter(|&&n| n != hub)
                    .map(|&n| (Endpoints::Pair { from: hub, to: n }, EdgeKind::Spoke))
                    .collect(),
                None => Vec::new(),
            },
            EdgeRule::Cycle => {
                let n = order.len();
                match n {
                    0 | 1 => Vec::new(),
                    2 => vec![(
                        Endpoints::Pair {
                            from: order[0],
                            to: order[1],
                        },
                        EdgeKind::RingLink,
                    )],
                    _ => (0..n)
                        .map(|i| {
                            (
                                Endpoints::Pair {
                                    from: order[i],
                                    to: order[(i + 1) % n],
                                },
                                EdgeKind::RingLink,
                            )
                        })
                        .collect(),
                }
            }
            EdgeRule::Taps => order
                .iter()
                .map(|&n| (Endpoints::Medium(n), EdgeKind::Tap))
                .collect(),
            EdgeRule::ParentChild => order
                .iter()
                .filter_map(|&n| {
                    self.nodes
                        .get(n)
                        .and_then(|d| d.parent)
                        .map(|p| (Endpoints::Pair { from: p, to: n }, EdgeKind::Hierarchy))
                })
                .collect(),
            EdgeRule::Complete => {
                let mut out = Vec::with_capacity(order.len() * order.len().saturating_sub(1) / 2);
                for i in 0..order.len() {
                    for j in (i + 1)..order.len() {
                        out.push((
                            Endpoints::Pair {
                                from: order[i],
                                to: order[j],
                            },
                            EdgeKind::MeshLink,
                        ));
                    }
                }
                out
            }
        }
    }

    /// Regenerate the edge set from the edge rule, reusing surviving edges.
    fn rebuild_edges(&mut self) {
        let desired = self.desired_edges();
        // BTreeMap so stale edges are freed in a deterministic order, which
        // keeps slot reuse (and therefore ids) reproducible.
        let mut existing: BTreeMap<EdgeKey, EdgeId> = self
            .edges
            .iter()
            .map(|(id, e)| (e.ends.key(), id))
            .collect();

        let mut next_order = Vec::with_capacity(desired.len());
        for (ends, kind) in desired {
            let id = match existing.remove(&ends.key()) {
                Some(id) => {
                    if let Some(edge) = self.edges.get_mut(id) {
                        edge.ends = ends;
                        edge.kind = kind;
                    }
                    id
                }
                None => self.edges.insert(EdgeData {
                    ends,
                    kind,
                    active: true,
                }),
            };
            next_order.push(id);
        }
        for (_, stale) in existing {
            self.edges.remove(stale);
        }
        self.edge_order = next_order;

        for (_, adj) in self.adjacency.iter_mut() {
            adj.clear();
        }
        for &id in &self.edge_order {
            let Some(edge) = self.edges.get(id) else {
                continue;
            };
            for n in edge.ends.nodes() {
                if let Some(adj) = self.adjacency.get_mut(n) {
                    adj.push(id);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn rule(&self) -> EdgeRule {
        self.rule
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&EdgeData> {
        self.edges.get(id)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn contains_edge(&self, id: EdgeId) -> bool {
        self.edges.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Node ids in graph order (cycle order for a ring).
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    /// Nodes in graph order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &NodeData)> {
        self.order
            .iter()
            .filter_map(|&id| self.nodes.get(id).map(|n| (id, n)))
    }

    /// Edges in the order the edge rule produced them.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &EdgeData)> {
        self.edge_order
            .iter()
            .filter_map(|&id| self.edges.get(id).map(|e| (id, e)))
    }

    /// Position of a node in graph order.
    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        self.order.iter().position(|&n| n == id)
    }

    /// Edges touching a node.
    pub fn incident_edges(&self, id: NodeId) -> &[EdgeId] {
        self.adjacency.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// The pair edge joining `a` and `b`, in either direction.
    pub fn edge_between(&self, a: NodeId, b: NodeId) -> Option<EdgeId> {
        self.incident_edges(a)
            .iter()
            .copied()
            .find(|&e| self.edges[e].ends.other(a) == Some(b))
    }

    /// Direct children of a tree node.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.children.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// All descendants of a node in depth-first pre-order, not including the
    /// node itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.children(n).iter().rev());
        }
        out
    }

    /// The first hub in graph order.
    pub fn hub(&self) -> Option<NodeId> {
        self.nodes().find(|(_, n)| n.role == NodeRole::Hub).map(|(id, _)| id)
    }

    /// The shared medium line, when the topology has one.
    pub fn medium(&self) -> Option<(Point3, Point3)> {
        self.bounds.medium()
    }

    pub fn is_bus_cut(&self) -> bool {
        self.bus_cut
    }

    /// Where a node's connector meets the shared medium.
    pub fn tap_point(&self, id: NodeId) -> Option<Point3> {
        let (a, b) = self.medium()?;
        let node = self.nodes.get(id)?;
        Some(project_onto_segment(node.position, a, b))
    }

    /// Start and end positions of an edge. Bus connectors run from the
    /// medium to the node.
    pub fn edge_positions(&self, id: EdgeId) -> Option<(Point3, Point3)> {
        match self.edges.get(id)?.ends {
            Endpoints::Pair { from, to } => {
                Some((self.nodes.get(from)?.position, self.nodes.get(to)?.position))
            }
            Endpoints::Medium(n) => Some((self.tap_point(n)?, self.nodes.get(n)?.position)),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
