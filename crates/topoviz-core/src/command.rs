//! Input command queue for externally-submitted topology edits.
//!
//! Commands come from the renderer (clicks, drags, drops) and are applied at
//! the start of the next step so a frame never observes a half-applied edit.

use serde::{Deserialize, Serialize};

use crate::geom::Point3;
use crate::id::{EdgeId, NodeId, PendingNodeId};

// ---------------------------------------------------------------------------
// Command enum
// ---------------------------------------------------------------------------

/// A single edit submitted to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Add a node near `position`. Tree topologies attach it under
    /// `drop_target`; other topologies ignore the target.
    AddNode {
        position: Point3,
        drop_target: Option<NodeId>,
    },
    /// Remove a node. Tree removal takes the whole subtree with it.
    RemoveNode { node: NodeId },
    /// Drag a node. The position is clamped to the topology bounds.
    MoveNode { node: NodeId, position: Point3 },
    ToggleNodeActive { node: NodeId },
    ToggleEdgeActive { edge: EdgeId },
    SetNodeActive { node: NodeId, active: bool },
    SetEdgeActive { edge: EdgeId, active: bool },
    /// Cut or restore the bus medium.
    SetBusCut { cut: bool },
    ToggleBusCut,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why a command changed nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IgnoreReason {
    UnknownNode,
    UnknownEdge,
    /// The topology does not expose a toggle for this node.
    NotToggleable,
    /// The topology does not expose edge toggles.
    EdgeToggleUnsupported,
    /// The tree drop target already has its maximum number of children.
    ChildLimit,
    /// A non-empty tree needs a drop target to attach a new node to.
    NeedsDropTarget,
    /// The topology has no shared medium.
    NoMedium,
}

/// The result of applying one command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandOutcome {
    /// `pending` is the id handed out when the command was queued.
    NodeAdded {
        pending: Option<PendingNodeId>,
        node: NodeId,
    },
    /// Every removed node, the target first, and how many packets went
    /// with them.
    NodesRemoved { nodes: Vec<NodeId>, packets: usize },
    NodeMoved { node: NodeId, position: Point3 },
    /// A node toggle. `affected` lists nodes whose derived liveness changed.
    NodeToggled {
        node: NodeId,
        enabled: bool,
        affected: Vec<NodeId>,
    },
    EdgeToggled { edge: EdgeId, active: bool },
    BusCut { cut: bool },
    Ignored { reason: IgnoreReason },
}

impl CommandOutcome {
    pub fn is_ignored(&self) -> bool {
        matches!(self, CommandOutcome::Ignored { .. })
    }
}

// ---------------------------------------------------------------------------
// CommandQueue
// ---------------------------------------------------------------------------

/// A queued command plus the pending id handed out for add-node commands.
#[derive(Debug, Clone, PartialEq)]
pub struct Queued {
    pub command: Command,
    pub pending: Option<PendingNodeId>,
}

/// Commands waiting for the next step boundary.
///
/// Optionally keeps a bounded history of applied commands for debugging.
#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: Vec<Queued>,
    /// Applied commands: (tick, command).
    history: Vec<(u64, Command)>,
    /// Maximum history entries to retain. 0 = no history.
    max_history: usize,
    next_pending: u64,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue that retains up to `max_history` applied commands.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            max_history,
            ..Self::default()
        }
    }

    /// Queue a command. Add-node commands get a [`PendingNodeId`] that the
    /// tick report resolves once the node exists.
    pub fn push(&mut self, command: Command) -> Option<PendingNodeId> {
        if let Command::AddNode {
            position,
            drop_target,
        } = command
        {
            return Some(self.push_add_node(position, drop_target));
        }
        self.pending.push(Queued {
            command,
            pending: None,
        });
        None
    }

    /// Queue an add-node command and return its pending id.
    pub fn push_add_node(&mut self, position: Point3, drop_target: Option<NodeId>) -> PendingNodeId {
        let id = PendingNodeId(self.next_pending);
        self.next_pending += 1;
        self.pending.push(Queued {
            command: Command::AddNode {
                position,
                drop_target,
            },
            pending: Some(id),
        });
        id
    }

    pub fn push_batch(&mut self, commands: impl IntoIterator<Item = Command>) {
        for command in commands {
            self.push(command);
        }
    }

    /// Take every pending command in submission order, recording them in
    /// the history under `tick`.
    pub fn drain(&mut self, tick: u64) -> Vec<Queued> {
        let queued: Vec<Queued> = self.pending.drain(..).collect();

        if self.max_history > 0 {
            self.history
                .extend(queued.iter().map(|q| (tick, q.command.clone())));
            let excess = self.history.len().saturating_sub(self.max_history);
            if excess > 0 {
                self.history.drain(..excess);
            }
        }

        queued
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn history(&self) -> &[(u64, Command)] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}

// ===========================================================================
// Tests
// ===========================================================================
