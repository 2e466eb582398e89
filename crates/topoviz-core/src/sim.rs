//! Simulation strategy, clock, and state hash.
//!
//! The engine is driven by an external render loop that reports elapsed
//! wall-clock time. A [`SimulationStrategy`] decides how that delta turns
//! into simulation steps. Every step runs the same pipeline.

use crate::command::CommandOutcome;
use crate::event::Event;
use crate::id::{NodeId, PendingNodeId};

// ---------------------------------------------------------------------------
// Simulation strategy
// ---------------------------------------------------------------------------

/// How the engine advances time. Chosen through [`crate::config::EngineConfig`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationStrategy {
    /// One step per `advance()` call using the reported delta, clamped to the
    /// configured maximum frame delta.
    Variable,

    /// Accumulates reported time and runs as many steps of `step` seconds as
    /// fit, carrying the remainder forward. Makes runs reproducible regardless
    /// of the render frame rate.
    Fixed {
        /// Duration of one simulation step, in seconds.
        step: f64,
    },
}

impl Default for SimulationStrategy {
    fn default() -> Self {
        SimulationStrategy::Variable
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Monotonic simulation clock. All deadlines (flash expiry, spawn cadence,
/// staggered releases) are compared against `time`.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SimClock {
    /// Number of steps run so far.
    pub tick: u64,
    /// Simulation time in seconds.
    pub time: f64,
    /// Unconsumed time for fixed-step mode.
    pub accumulator: f64,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Tick report
// ---------------------------------------------------------------------------

/// Result of an `Engine::advance()` call.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Number of simulation steps actually executed.
    pub steps_run: u64,

    /// One outcome per command applied during this call, in submission order.
    pub outcomes: Vec<CommandOutcome>,

    /// Events emitted by every step of this call, oldest first.
    pub events: Vec<Event>,
}

impl TickReport {
    /// Look up the real `NodeId` assigned to a queued add-node command.
    pub fn resolve_node(&self, pending: PendingNodeId) -> Option<NodeId> {
        self.outcomes.iter().find_map(|o| match o {
            CommandOutcome::NodeAdded {
                pending: Some(p),
                node,
            } if *p == pending => Some(*node),
            _ => None,
        })
    }

    /// Nodes flashed during this call, in the order the flashes fired.
    pub fn flashed_nodes(&self) -> Vec<NodeId> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::NodeFlashed { node, .. } => Some(*node),
                _ => None,
            })
            .collect()
    }

    /// Arrivals recorded during this call.
    pub fn arrivals(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::PacketArrived { .. }))
            .count()
    }
}

// ---------------------------------------------------------------------------
// State hash
// ---------------------------------------------------------------------------

/// A simple deterministic hash of simulation state for replay comparison.
///
/// Uses FNV-1a (64-bit) for speed and simplicity. Not cryptographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    /// Start a new hash.
    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    /// Feed bytes into the hash.
    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.write(&v.to_bits().to_le_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.write(&v.to_bits().to_le_bytes());
    }

    pub fn write_bool(&mut self, v: bool) {
        self.write(&[v as u8]);
    }

    /// Finalize and return the hash value.
    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}
