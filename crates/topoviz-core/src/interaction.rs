//! Applies commands to the topology.
//!
//! [`InteractionController`] is the only code that calls the
//! [`TopologyGraph`] mutators. Every applied command is followed by exactly
//! one propagation pass, and removals purge packets and flashes in the same
//! call, so the rest of the step never sees a dangling id.

use log::debug;

use crate::command::{Command, CommandOutcome, IgnoreReason};
use crate::config::TopologyTuning;
use crate::event::{Event, EventFilter};
use crate::flash::FlashController;
use crate::geom::Point3;
use crate::graph::{NodeRole, TopologyGraph};
use crate::id::{EdgeId, NodeId, PendingNodeId};
use crate::packet::PacketScheduler;
use crate::propagate::Traversal;
use crate::topology::{ActivationRule, TopologyKind, TopologyStrategy};

/// The engine state a command may touch.
pub struct Targets<'a> {
    pub graph: &'a mut TopologyGraph,
    pub traversal: &'a mut Traversal,
    pub scheduler: &'a mut PacketScheduler,
    pub flashes: &'a mut FlashController,
}

/// Where an add-node command puts its node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub position: Point3,
    pub role: NodeRole,
    pub parent: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct InteractionController {
    strategy: TopologyStrategy,
    tuning: TopologyTuning,
}

impl InteractionController {
    pub fn new(strategy: TopologyStrategy, tuning: TopologyTuning) -> Self {
        Self { strategy, tuning }
    }

    /// Apply one command and record its events.
    pub fn apply(
        &self,
        targets: &mut Targets<'_>,
        command: &Command,
        pending: Option<PendingNodeId>,
        tick: u64,
        filter: &EventFilter,
        events: &mut Vec<Event>,
    ) -> CommandOutcome {
        let outcome = match *command {
            Command::AddNode {
                position,
                drop_target,
            } => self.add_node(targets, position, drop_target, pending, tick, filter, events),
            Command::RemoveNode { node } => self.remove_node(targets, node, tick, filter, events),
            Command::MoveNode { node, position } => {
                if targets.graph.move_node(node, position) {
                    targets.traversal.propagate(targets.graph);
                    let position = targets
                        .graph
                        .node(node)
                        .map_or(position, |n| n.position);
                    CommandOutcome::NodeMoved { node, position }
                } else {
                    ignored(IgnoreReason::UnknownNode)
                }
            }
            Command::ToggleNodeActive { node } => match targets.graph.node(node) {
                Some(data) => {
                    let enabled = !data.enabled;
                    self.set_node(targets, node, enabled, tick, filter, events)
                }
                None => ignored(IgnoreReason::UnknownNode),
            },
            Command::SetNodeActive { node, active } => {
                self.set_node(targets, node, active, tick, filter, events)
            }
            Command::ToggleEdgeActive { edge } => match targets.graph.edge(edge) {
                Some(data) => {
                    let active = !data.active;
                    self.set_edge(targets, edge, active)
                }
                None => ignored(IgnoreReason::UnknownEdge),
            },
            Command::SetEdgeActive { edge, active } => self.set_edge(targets, edge, active),
            Command::SetBusCut { cut } => set_cut(targets, cut),
            Command::ToggleBusCut => {
                let cut = !targets.graph.is_bus_cut();
                set_cut(targets, cut)
            }
        };
        debug!("applied {command:?} -> {outcome:?}");
        outcome
    }

    // -----------------------------------------------------------------------
    // Placement
    // -----------------------------------------------------------------------

    /// Decide role, parent and position for a node dropped at `position`.
    pub fn placement(
        &self,
        graph: &TopologyGraph,
        position: Point3,
        drop_target: Option<NodeId>,
    ) -> Result<Placement, IgnoreReason> {
        let peer = Placement {
            position,
            role: NodeRole::Peer,
            parent: None,
        };
        match self.strategy.kind {
            TopologyKind::Star => Ok(Placement {
                role: if graph.hub().is_some() {
                    NodeRole::Peer
                } else {
                    NodeRole::Hub
                },
                ..peer
            }),
            TopologyKind::Ring | TopologyKind::Mesh => Ok(peer),
            TopologyKind::Bus => {
                // Sides alternate, continuing the seed's +, -, + pattern.
                let side = if graph.node_count() % 2 == 0 { 1.0 } else { -1.0 };
                Ok(Placement {
                    position: Point3 {
                        y: side * self.tuning.tap_offset,
                        z: 0.0,
                        ..position
                    },
                    ..peer
                })
            }
            TopologyKind::Tree => match drop_target {
                Some(parent) => {
                    let anchor = graph.node(parent).ok_or(IgnoreReason::UnknownNode)?;
                    let siblings = graph.children(parent).len();
                    if siblings >= self.tuning.max_children {
                        return Err(IgnoreReason::ChildLimit);
                    }
                    Ok(Placement {
                        position: Point3 {
                            x: anchor.position.x + self.sibling_offset(siblings),
                            y: anchor.position.y - self.tuning.level_drop,
                            z: anchor.position.z,
                        },
                        role: NodeRole::Child,
                        parent: Some(parent),
                    })
                }
                None if graph.node_count() == 0 => Ok(Placement {
                    role: NodeRole::Parent,
                    ..peer
                }),
                None => Err(IgnoreReason::NeedsDropTarget),
            },
        }
    }

    /// Horizontal offset of the `index`th child: centred, then right, then
    /// left, widening outwards.
    fn sibling_offset(&self, index: usize) -> f32 {
        let spacing = self.tuning.child_spacing;
        let ring = index.div_ceil(2) as f32;
        if index % 2 == 1 { spacing * ring } else { -spacing * ring }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn add_node(
        &self,
        targets: &mut Targets<'_>,
        position: Point3,
        drop_target: Option<NodeId>,
        pending: Option<PendingNodeId>,
        tick: u64,
        filter: &EventFilter,
        events: &mut Vec<Event>,
    ) -> CommandOutcome {
        let placement = match self.placement(targets.graph, position, drop_target) {
            Ok(p) => p,
            Err(reason) => return ignored(reason),
        };
        let Some(node) =
            targets
                .graph
                .add_node(placement.position, placement.role, placement.parent)
        else {
            return ignored(IgnoreReason::UnknownNode);
        };
        targets.traversal.propagate(targets.graph);
        filter.record(events, Event::NodeAdded { node, tick });
        CommandOutcome::NodeAdded { pending, node }
    }

    fn remove_node(
        &self,
        targets: &mut Targets<'_>,
        node: NodeId,
        tick: u64,
        filter: &EventFilter,
        events: &mut Vec<Event>,
    ) -> CommandOutcome {
        let removed = targets.graph.remove_node(node);
        if removed.is_empty() {
            return ignored(IgnoreReason::UnknownNode);
        }
        targets.traversal.propagate(targets.graph);
        let packets = targets.scheduler.purge(&removed, tick, filter, events);
        targets.flashes.purge(&removed);
        for &id in &removed {
            filter.record(events, Event::NodeRemoved { node: id, tick });
        }
        CommandOutcome::NodesRemoved {
            nodes: removed,
            packets,
        }
    }

    fn set_node(
        &self,
        targets: &mut Targets<'_>,
        node: NodeId,
        enabled: bool,
        tick: u64,
        filter: &EventFilter,
        events: &mut Vec<Event>,
    ) -> CommandOutcome {
        let Some(data) = targets.graph.node(node) else {
            return ignored(IgnoreReason::UnknownNode);
        };
        if !self.strategy.can_toggle(data.role) {
            return ignored(IgnoreReason::NotToggleable);
        }
        targets.graph.set_node_active(node, enabled);
        let affected = match self.strategy.activation {
            ActivationRule::Inherited => targets.traversal.cascade(targets.graph, node),
            ActivationRule::Direct | ActivationRule::SharedMedium => {
                targets.traversal.propagate(targets.graph)
            }
        };
        for &id in &affected {
            let active = targets.traversal.node_active(id);
            filter.record(
                events,
                Event::NodeActivationChanged {
                    node: id,
                    active,
                    tick,
                },
            );
        }
        CommandOutcome::NodeToggled {
            node,
            enabled,
            affected,
        }
    }

    fn set_edge(&self, targets: &mut Targets<'_>, edge: EdgeId, active: bool) -> CommandOutcome {
        if !self.strategy.edge_toggle {
            return ignored(IgnoreReason::EdgeToggleUnsupported);
        }
        if !targets.graph.contains_edge(edge) {
            return ignored(IgnoreReason::UnknownEdge);
        }
        targets.graph.set_edge_active(edge, active);
        targets.traversal.propagate(targets.graph);
        CommandOutcome::EdgeToggled { edge, active }
    }
}

fn set_cut(targets: &mut Targets<'_>, cut: bool) -> CommandOutcome {
    if targets.graph.medium().is_none() {
        return ignored(IgnoreReason::NoMedium);
    }
    targets.graph.set_bus_cut(cut);
    targets.traversal.propagate(targets.graph);
    CommandOutcome::BusCut { cut }
}

fn ignored(reason: IgnoreReason) -> CommandOutcome {
    CommandOutcome::Ignored { reason }
}
