//! Frame snapshots for renderers.
//!
//! A [`FrameSnapshot`] is an owned copy of everything a renderer draws for
//! one frame: node states, edge states, packet positions and intensities.
//! Nothing in it borrows from the engine, so it can be queued, diffed or
//! shipped across a wasm boundary as JSON.

use serde::{Deserialize, Serialize};

use crate::flash::FlashController;
use crate::geom::Point3;
use crate::graph::{EdgeKind, Endpoints, NodeRole, TopologyGraph};
use crate::id::{EdgeId, NodeId, PacketId};
use crate::packet::{PacketScheduler, Route};
use crate::propagate::Traversal;
use crate::sim::SimClock;
use crate::topology::TopologyKind;

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub position: Point3,
    pub role: NodeRole,
    /// Derived liveness (own toggle plus inheritance).
    pub active: bool,
    /// The node's own toggle.
    pub enabled: bool,
    /// Emission intensity: flash peak, resting baseline or dimmed.
    pub intensity: f32,
    pub flashing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSnapshot {
    pub id: EdgeId,
    pub kind: EdgeKind,
    /// Start of the drawn line. For bus connectors this is the tap point on
    /// the medium.
    pub from: Point3,
    pub to: Point3,
    pub endpoints: Endpoints,
    pub active: bool,
    pub traversable: bool,
}

/// How a renderer should style a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketHint {
    Normal,
    /// Travelling along the bus medium.
    Trunk,
    /// Travelling up a bus connector.
    Branch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketSnapshot {
    pub id: PacketId,
    pub position: Point3,
    pub progress: f32,
    pub hint: PacketHint,
}

/// The bus medium line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MediumSnapshot {
    pub from: Point3,
    pub to: Point3,
    pub cut: bool,
}

/// Everything needed to draw one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSnapshot {
    pub tick: u64,
    pub time: f64,
    pub topology: TopologyKind,
    pub all_active: bool,
    pub medium: Option<MediumSnapshot>,
    pub nodes: Vec<NodeSnapshot>,
    pub edges: Vec<EdgeSnapshot>,
    /// Released packets only.
    pub packets: Vec<PacketSnapshot>,
}

impl FrameSnapshot {
    pub fn node(&self, id: NodeId) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&EdgeSnapshot> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub fn flashing_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().filter(|n| n.flashing).map(|n| n.id)
    }

    /// Serialize to JSON for a web renderer.
    #[cfg(feature = "snapshot-json")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

pub(crate) struct SnapshotSource<'a> {
    pub kind: TopologyKind,
    pub clock: &'a SimClock,
    pub graph: &'a TopologyGraph,
    pub traversal: &'a Traversal,
    pub scheduler: &'a PacketScheduler,
    pub flashes: &'a FlashController,
}

impl SnapshotSource<'_> {
    pub(crate) fn capture(&self) -> FrameSnapshot {
        let graph = self.graph;

        let nodes = graph
            .nodes()
            .map(|(id, n)| {
                let active = self.traversal.node_active(id);
                NodeSnapshot {
                    id,
                    position: n.position,
                    role: n.role,
                    active,
                    enabled: n.enabled,
                    intensity: self.flashes.intensity(id, active),
                    flashing: self.flashes.is_flashing(id),
                }
            })
            .collect();

        let edges = graph
            .edges()
            .filter_map(|(id, e)| {
                let (from, to) = graph.edge_positions(id)?;
                Some(EdgeSnapshot {
                    id,
                    kind: e.kind,
                    from,
                    to,
                    endpoints: e.ends,
                    active: e.active,
                    traversable: self.traversal.edge_traversable(graph, id),
                })
            })
            .collect();

        let packets = self
            .scheduler
            .released(self.clock.time)
            .filter_map(|(id, p)| {
                Some(PacketSnapshot {
                    id,
                    position: p.position(graph)?,
                    progress: p.progress.clamp(0.0, 1.0),
                    hint: match p.route {
                        Route::Trunk { .. } => PacketHint::Trunk,
                        Route::Branch { .. } => PacketHint::Branch,
                        _ => PacketHint::Normal,
                    },
                })
            })
            .collect();

        FrameSnapshot {
            tick: self.clock.tick,
            time: self.clock.time,
            topology: self.kind,
            all_active: self.traversal.all_active(),
            medium: graph.medium().map(|(from, to)| MediumSnapshot {
                from,
                to,
                cut: graph.is_bus_cut(),
            }),
            nodes,
            edges,
            packets,
        }
    }
}
