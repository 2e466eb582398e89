//! Initial node layouts.
//!
//! An engine starts from a [`SeedLayout`]: either the canonical layout for
//! its topology or one loaded from a scenario file. Layouts are validated
//! before any node is created so a bad file never leaves a half-built graph.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::geom::Point3;
use crate::graph::{NodeRole, TopologyGraph};
use crate::id::NodeId;
use crate::topology::TopologyKind;

/// Reasons a layout cannot seed a topology.
#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    #[error("node {index}: parent index {parent} does not refer to an earlier node")]
    ParentNotBefore { index: usize, parent: usize },

    #[error("node {index}: only tree layouts may name a parent")]
    UnexpectedParent { index: usize },

    #[error("node {index}: role {role:?} is not valid in a {kind} topology")]
    InvalidRole {
        index: usize,
        role: NodeRole,
        kind: TopologyKind,
    },

    #[error("star layout has {count} hubs; at most one is allowed")]
    TooManyHubs { count: usize },

    /// The configuration the layout would be built under is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// One node of a seed layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedNode {
    pub position: Point3,
    pub role: NodeRole,
    /// Index of the parent within the layout. Must precede this node.
    #[serde(default)]
    pub parent: Option<usize>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl SeedNode {
    fn at(x: f32, y: f32, role: NodeRole) -> Self {
        Self {
            position: Point3::planar(x, y),
            role,
            parent: None,
            enabled: true,
        }
    }

    fn under(mut self, parent: usize) -> Self {
        self.parent = Some(parent);
        self
    }
}

/// An ordered list of nodes to create.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedLayout {
    pub nodes: Vec<SeedNode>,
}

impl SeedLayout {
    /// The classic layout for each topology.
    pub fn canonical(kind: TopologyKind) -> Self {
        let nodes = match kind {
            TopologyKind::Star => std::iter::once(SeedNode::at(0.0, 0.0, NodeRole::Hub))
                .chain(ellipse(6, 3.0, 3.0))
                .collect(),
            TopologyKind::Ring => ellipse(8, 4.2, 2.7).collect(),
            TopologyKind::Bus => [-3.0, -1.5, 0.0, 1.5, 3.0]
                .into_iter()
                .enumerate()
                .map(|(i, x)| {
                    let y = if i % 2 == 0 { 0.8 } else { -0.8 };
                    SeedNode::at(x, y, NodeRole::Peer)
                })
                .collect(),
            TopologyKind::Tree => vec![
                SeedNode::at(0.0, 2.5, NodeRole::Parent),
                SeedNode::at(-2.0, 0.8, NodeRole::Parent).under(0),
                SeedNode::at(2.0, 0.8, NodeRole::Parent).under(0),
                SeedNode::at(-3.0, -1.5, NodeRole::Child).under(1),
                SeedNode::at(-1.0, -1.5, NodeRole::Child).under(1),
                SeedNode::at(1.0, -1.5, NodeRole::Child).under(2),
                SeedNode::at(3.0, -1.5, NodeRole::Child).under(2),
            ],
            TopologyKind::Mesh => [(0.0, 3.0), (3.0, 1.0), (2.0, -2.6), (-2.0, -2.6), (-3.0, 1.0)]
                .into_iter()
                .map(|(x, y)| SeedNode::at(x, y, NodeRole::Peer))
                .collect(),
        };
        Self { nodes }
    }

    /// Check that the layout fits the topology.
    pub fn validate(&self, kind: TopologyKind) -> Result<(), LayoutError> {
        let mut hubs = 0;
        for (index, node) in self.nodes.iter().enumerate() {
            let role_ok = match kind {
                TopologyKind::Star => matches!(node.role, NodeRole::Hub | NodeRole::Peer),
                TopologyKind::Tree => matches!(node.role, NodeRole::Parent | NodeRole::Child),
                TopologyKind::Ring | TopologyKind::Bus | TopologyKind::Mesh => {
                    node.role == NodeRole::Peer
                }
            };
            if !role_ok {
                return Err(LayoutError::InvalidRole {
                    index,
                    role: node.role,
                    kind,
                });
            }
            if node.role == NodeRole::Hub {
                hubs += 1;
            }
            match node.parent {
                Some(_) if kind != TopologyKind::Tree => {
                    return Err(LayoutError::UnexpectedParent { index });
                }
                Some(parent) if parent >= index => {
                    return Err(LayoutError::ParentNotBefore { index, parent });
                }
                _ => {}
            }
        }
        if hubs > 1 {
            return Err(LayoutError::TooManyHubs { count: hubs });
        }
        Ok(())
    }

    /// Validate, then create every node in `graph`. Returns the new ids in
    /// layout order.
    pub fn build(
        &self,
        kind: TopologyKind,
        graph: &mut TopologyGraph,
    ) -> Result<Vec<NodeId>, LayoutError> {
        self.validate(kind)?;
        let mut ids: Vec<NodeId> = Vec::with_capacity(self.nodes.len());
        for (index, node) in self.nodes.iter().enumerate() {
            let parent = match node.parent {
                Some(p) => Some(
                    *ids.get(p)
                        .ok_or(LayoutError::ParentNotBefore { index, parent: p })?,
                ),
                None => None,
            };
            let id = graph
                .add_node(node.position, node.role, parent)
                .ok_or(LayoutError::ParentNotBefore {
                    index,
                    parent: node.parent.unwrap_or(index),
                })?;
            graph.set_node_active(id, node.enabled);
            ids.push(id);
        }
        Ok(ids)
    }
}

/// `n` peers evenly spaced on an ellipse, starting on the positive x axis.
fn ellipse(n: usize, rx: f32, ry: f32) -> impl Iterator<Item = SeedNode> {
    (0..n).map(move |i| {
        let theta = i as f32 / n as f32 * std::f32::consts::TAU;
        SeedNode::at(theta.cos() * rx, theta.sin() * ry, NodeRole::Peer)
    })
}
