//! Transient node emission.

use slotmap::SecondaryMap;

use crate::config::FlashProfile;
use crate::id::NodeId;

/// Tracks which nodes are flashing and until when.
///
/// A flash holds a node at peak intensity until its deadline. Triggering a
/// node that is already flashing restarts the deadline; flashes never stack.
#[derive(Debug, Clone)]
pub struct FlashController {
    profile: FlashProfile,
    deadlines: SecondaryMap<NodeId, f64>,
}

impl FlashController {
    pub fn new(profile: FlashProfile) -> Self {
        Self {
            profile,
            deadlines: SecondaryMap::new(),
        }
    }

    pub fn profile(&self) -> &FlashProfile {
        &self.profile
    }

    /// Start (or restart) a flash at `now`.
    pub fn flash(&mut self, node: NodeId, now: f64) {
        self.deadlines.insert(node, now + self.profile.duration);
    }

    /// Drop flashes whose deadline has passed. Returns the nodes that
    /// reverted to their resting intensity.
    pub fn decay(&mut self, now: f64) -> Vec<NodeId> {
        let expired: Vec<NodeId> = self
            .deadlines
            .iter()
            .filter(|&(_, &deadline)| deadline <= now)
            .map(|(id, _)| id)
            .collect();
        for &id in &expired {
            self.deadlines.remove(id);
        }
        expired
    }

    /// Forget flashes on removed nodes.
    pub fn purge(&mut self, removed: &[NodeId]) {
        for &id in removed {
            self.deadlines.remove(id);
        }
    }

    pub fn is_flashing(&self, node: NodeId) -> bool {
        self.deadlines.contains_key(node)
    }

    pub fn deadline(&self, node: NodeId) -> Option<f64> {
        self.deadlines.get(node).copied()
    }

    pub fn active_count(&self) -> usize {
        self.deadlines.len()
    }

    /// Emission intensity for a node given its derived liveness.
    pub fn intensity(&self, node: NodeId, active: bool) -> f32 {
        if self.is_flashing(node) {
            self.profile.peak
        } else if active {
            self.profile.baseline
        } else {
            self.profile.dimmed
        }
    }
}
