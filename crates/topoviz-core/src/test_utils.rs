//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::event::Event;
use crate::id::{EdgeId, NodeId};
use crate::sim::{SimulationStrategy, TickReport};
use crate::topology::TopologyKind;

/// One render frame at 60 Hz.
pub const FRAME: f64 = 1.0 / 60.0;

// ===========================================================================
// Engine constructors
// ===========================================================================

/// Canonical engine stepping at a fixed 60 Hz, independent of frame timing.
pub fn fixed_engine(kind: TopologyKind) -> Engine {
    Engine::with_config(kind, fixed_config(0))
}

/// Like [`fixed_engine`] with an explicit RNG seed.
pub fn seeded_engine(kind: TopologyKind, seed: u64) -> Engine {
    Engine::with_config(kind, fixed_config(seed))
}

pub fn fixed_config(seed: u64) -> EngineConfig {
    EngineConfig {
        simulation: SimulationStrategy::Fixed { step: FRAME },
        seed,
        ..EngineConfig::default()
    }
}

// ===========================================================================
// Lookup helpers
// ===========================================================================

/// The `index`th node in the graph's layout order.
pub fn node_at(engine: &Engine, index: usize) -> NodeId {
    engine.graph().order()[index]
}

/// Every node id in layout order.
pub fn node_ids(engine: &Engine) -> Vec<NodeId> {
    engine.graph().order().to_vec()
}

/// The edge joining two nodes.
pub fn edge_between(engine: &Engine, a: NodeId, b: NodeId) -> EdgeId {
    engine
        .graph()
        .edge_between(a, b)
        .unwrap_or_else(|| panic!("no edge between {a:?} and {b:?}"))
}

// ===========================================================================
// Running
// ===========================================================================

/// Run one frame so queued commands take effect.
pub fn apply(engine: &mut Engine) -> TickReport {
    engine.advance(FRAME)
}

/// Run `seconds` of simulation in frames of `dt`, merging every report.
pub fn run_for(engine: &mut Engine, seconds: f64, dt: f64) -> TickReport {
    let mut total = TickReport::default();
    let frames = (seconds / dt).round() as u64;
    for _ in 0..frames {
        let mut report = engine.advance(dt);
        total.steps_run += report.steps_run;
        total.outcomes.append(&mut report.outcomes);
        total.events.append(&mut report.events);
    }
    total
}

/// Arrival events, in order, as (packet destination, tick).
pub fn arrivals(report: &TickReport) -> Vec<(NodeId, u64)> {
    report
        .events
        .iter()
        .filter_map(|e| match e {
            Event::PacketArrived { node, tick, .. } => Some((*node, *tick)),
            _ => None,
        })
        .collect()
}
