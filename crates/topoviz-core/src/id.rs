use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a node in the topology graph. Stable across mutations.
    pub struct NodeId;

    /// Identifies an edge (link, spoke, or bus connector) in the topology graph.
    pub struct EdgeId;

    /// Identifies an in-flight packet owned by the scheduler.
    pub struct PacketId;
}

/// A pending node ID returned when an add-node command is queued. Resolves to
/// a [`NodeId`] once the command is applied at the next tick boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingNodeId(pub u64);

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn node_ids_are_stable_after_removal_of_others() {
        let mut sm = SlotMap::<NodeId, &str>::with_key();
        let a = sm.insert("a");
        let b = sm.insert("b");
        sm.remove(a);
        assert_eq!(sm[b], "b");
        assert!(!sm.contains_key(a));
    }

    #[test]
    fn pending_ids_are_hashable() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(PendingNodeId(0), "first");
        map.insert(PendingNodeId(1), "second");
        assert_eq!(map[&PendingNodeId(1)], "second");
    }
}
