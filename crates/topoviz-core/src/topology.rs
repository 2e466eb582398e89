//! Topology strategies.
//!
//! The five canonical topologies share one engine. What differs between them
//! is captured by a [`TopologyStrategy`], a bundle of small rule enums chosen
//! at engine construction:
//!
//! | Kind | Edges | Activation | Packet path | Spawn |
//! |------|-------|------------|-------------|-------|
//! | Star | hub→peer spokes | direct | segment | ambient loop per spoke |
//! | Ring | closed cycle | direct | cycle chain | ambient loop |
//! | Bus  | node→medium taps | shared medium | two-phase | ambient trunks |
//! | Tree | parent→child | inherited | segment | periodic, per parent |
//! | Mesh | all pairs | direct | segment | periodic, per edge |

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::graph::NodeRole;

// ---------------------------------------------------------------------------
// Topology kind
// ---------------------------------------------------------------------------

/// The five canonical network topologies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyKind {
    Star,
    Ring,
    Bus,
    Tree,
    Mesh,
}

impl TopologyKind {
    pub const ALL: [TopologyKind; 5] = [
        TopologyKind::Star,
        TopologyKind::Ring,
        TopologyKind::Bus,
        TopologyKind::Tree,
        TopologyKind::Mesh,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TopologyKind::Star => "star",
            TopologyKind::Ring => "ring",
            TopologyKind::Bus => "bus",
            TopologyKind::Tree => "tree",
            TopologyKind::Mesh => "mesh",
        }
    }
}

impl fmt::Display for TopologyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// How the edge set is derived from the node set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeRule {
    /// One edge from the hub to every other node.
    Spokes,
    /// Consecutive nodes in cycle order, closing back to the first.
    Cycle,
    /// One connector per node onto the shared medium.
    Taps,
    /// One edge from each node's parent to the node.
    ParentChild,
    /// Every unordered pair of nodes.
    Complete,
}

/// How a node's effective liveness is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationRule {
    /// A node is active iff its own toggle is on.
    Direct,
    /// A node is active iff its own toggle and every ancestor's toggle are on.
    Inherited,
    /// Direct node liveness, plus a global cut flag on the shared medium.
    SharedMedium,
}

/// The geometric path a packet follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRule {
    /// Straight line between an edge's endpoints.
    Segment,
    /// Walks the ordered cycle of node positions.
    CycleChain,
    /// Trunk along the medium, spawning branches into nodes it passes.
    TwoPhase,
}

/// When new packets come into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnRule {
    /// A fixed set of looping packets, present only while the whole
    /// topology is active.
    AmbientLoop,
    /// One looping packet per traversable spoke, present only while the
    /// whole topology is active.
    AmbientSpokes,
    /// Looping trunk packets, present only while the medium is intact.
    AmbientTrunk,
    /// Periodic check: each active parent with no packet in flight sends one
    /// packet to each live child.
    PerParent,
    /// Periodic check: each active node sends a packet over every live edge
    /// that has no packet in flight from it.
    PerEdge,
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// The full rule set for one topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopologyStrategy {
    pub kind: TopologyKind,
    pub edges: EdgeRule,
    pub activation: ActivationRule,
    pub path: PathRule,
    pub spawn: SpawnRule,
    /// Whether ring/mesh style edge toggling is exposed.
    pub edge_toggle: bool,
}

impl TopologyStrategy {
    /// The rule set for a topology kind.
    pub fn for_kind(kind: TopologyKind) -> Self {
        match kind {
            TopologyKind::Star => Self {
                kind,
                edges: EdgeRule::Spokes,
                activation: ActivationRule::Direct,
                path: PathRule::Segment,
                spawn: SpawnRule::AmbientSpokes,
                edge_toggle: false,
            },
            TopologyKind::Ring => Self {
                kind,
                edges: EdgeRule::Cycle,
                activation: ActivationRule::Direct,
                path: PathRule::CycleChain,
                spawn: SpawnRule::AmbientLoop,
                edge_toggle: true,
            },
            TopologyKind::Bus => Self {
                kind,
                edges: EdgeRule::Taps,
                activation: ActivationRule::SharedMedium,
                path: PathRule::TwoPhase,
                spawn: SpawnRule::AmbientTrunk,
                edge_toggle: false,
            },
            TopologyKind::Tree => Self {
                kind,
                edges: EdgeRule::ParentChild,
                activation: ActivationRule::Inherited,
                path: PathRule::Segment,
                spawn: SpawnRule::PerParent,
                edge_toggle: false,
            },
            TopologyKind::Mesh => Self {
                kind,
                edges: EdgeRule::Complete,
                activation: ActivationRule::Direct,
                path: PathRule::Segment,
                spawn: SpawnRule::PerEdge,
                edge_toggle: true,
            },
        }
    }

    /// Whether a user may toggle a node with the given role.
    ///
    /// Star exposes only its hub, tree only its upper tier. Ring, bus, and
    /// mesh nodes are all toggleable.
    pub fn can_toggle(&self, role: NodeRole) -> bool {
        match self.kind {
            TopologyKind::Star => role == NodeRole::Hub,
            TopologyKind::Tree => role == NodeRole::Parent,
            TopologyKind::Ring | TopologyKind::Bus | TopologyKind::Mesh => true,
        }
    }
}
