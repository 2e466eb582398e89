//! Simulation events.
//!
//! Each step records what happened (spawns, arrivals, flashes, structural
//! changes) into the tick report so a front end can drive sound or UI cues
//! without diffing snapshots. Event kinds can be suppressed through
//! [`EventFilter`]; a suppressed kind is never recorded.

use serde::{Deserialize, Serialize};

use crate::id::*;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A simulation event. All events carry the tick at which they occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    // -- Packets --
    PacketSpawned {
        packet: PacketId,
        tick: u64,
    },
    /// A bus trunk passed a node and sent a branch packet towards it.
    BranchSpawned {
        packet: PacketId,
        trunk: PacketId,
        node: NodeId,
        tick: u64,
    },
    PacketArrived {
        packet: PacketId,
        node: NodeId,
        tick: u64,
    },
    /// A packet was dropped because its path stopped being traversable or
    /// one of its nodes was removed.
    PacketRetired {
        packet: PacketId,
        tick: u64,
    },

    // -- Nodes --
    NodeFlashed {
        node: NodeId,
        tick: u64,
    },
    NodeActivationChanged {
        node: NodeId,
        active: bool,
        tick: u64,
    },

    // -- Graph --
    NodeAdded {
        node: NodeId,
        tick: u64,
    },
    NodeRemoved {
        node: NodeId,
        tick: u64,
    },
}

/// Discriminant tag for event types, used for suppression and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    PacketSpawned,
    BranchSpawned,
    PacketArrived,
    PacketRetired,
    NodeFlashed,
    NodeActivationChanged,
    NodeAdded,
    NodeRemoved,
}

const EVENT_KIND_COUNT: usize = 8;

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::PacketSpawned { .. } => EventKind::PacketSpawned,
            Event::BranchSpawned { .. } => EventKind::BranchSpawned,
            Event::PacketArrived { .. } => EventKind::PacketArrived,
            Event::PacketRetired { .. } => EventKind::PacketRetired,
            Event::NodeFlashed { .. } => EventKind::NodeFlashed,
            Event::NodeActivationChanged { .. } => EventKind::NodeActivationChanged,
            Event::NodeAdded { .. } => EventKind::NodeAdded,
            Event::NodeRemoved { .. } => EventKind::NodeRemoved,
        }
    }

    pub fn tick(&self) -> u64 {
        match *self {
            Event::PacketSpawned { tick, .. }
            | Event::BranchSpawned { tick, .. }
            | Event::PacketArrived { tick, .. }
            | Event::PacketRetired { tick, .. }
            | Event::NodeFlashed { tick, .. }
            | Event::NodeActivationChanged { tick, .. }
            | Event::NodeAdded { tick, .. }
            | Event::NodeRemoved { tick, .. } => tick,
        }
    }
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Per-kind suppression switches.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    suppressed: [bool; EVENT_KIND_COUNT],
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop recording events of this kind.
    pub fn suppress(&mut self, kind: EventKind) {
        self.suppressed[kind as usize] = true;
    }

    /// Resume recording events of this kind.
    pub fn unsuppress(&mut self, kind: EventKind) {
        self.suppressed[kind as usize] = false;
    }

    pub fn is_suppressed(&self, kind: EventKind) -> bool {
        self.suppressed[kind as usize]
    }

    /// Append `event` to `sink` unless its kind is suppressed.
    pub fn record(&self, sink: &mut Vec<Event>, event: Event) {
        if !self.is_suppressed(event.kind()) {
            sink.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn make_node_id() -> NodeId {
        let mut sm = SlotMap::<NodeId, ()>::with_key();
        sm.insert(())
    }

    #[test]
    fn kind_and_tick_match_variant() {
        let node = make_node_id();
        let e = Event::NodeFlashed { node, tick: 9 };
        assert_eq!(e.kind(), EventKind::NodeFlashed);
        assert_eq!(e.tick(), 9);
    }

    #[test]
    fn suppressed_kinds_are_not_recorded() {
        let node = make_node_id();
        let mut filter = EventFilter::new();
        let mut sink = Vec::new();

        filter.suppress(EventKind::NodeFlashed);
        filter.record(&mut sink, Event::NodeFlashed { node, tick: 1 });
        filter.record(&mut sink, Event::NodeAdded { node, tick: 1 });
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].kind(), EventKind::NodeAdded);

        filter.unsuppress(EventKind::NodeFlashed);
        filter.record(&mut sink, Event::NodeFlashed { node, tick: 2 });
        assert_eq!(sink.len(), 2);
    }
}
