//! Headless runner: drives one topology without a renderer and prints what
//! a renderer would draw.
//!
//! Runs the ring for a few seconds, knocks node 3 out, brings it back, and
//! prints arrivals along the way. Set `RUST_LOG=debug` to see every applied
//! command and retired packet.
//!
//! Run with: `cargo run -p topoviz-core --example headless_runner [topology]`

use topoviz_core::config::EngineConfig;
use topoviz_core::engine::Engine;
use topoviz_core::event::{Event, EventKind};
use topoviz_core::sim::SimulationStrategy;
use topoviz_core::topology::TopologyKind;

const FRAME: f64 = 1.0 / 60.0;

fn main() {
    env_logger::init();

    let kind = std::env::args()
        .nth(1)
        .and_then(|arg| TopologyKind::ALL.into_iter().find(|k| k.name() == arg))
        .unwrap_or(TopologyKind::Ring);

    let config = EngineConfig {
        simulation: SimulationStrategy::Fixed { step: FRAME },
        ..EngineConfig::default()
    };
    let mut engine = Engine::with_config(kind, config);
    engine.suppress_event(EventKind::PacketSpawned);

    let victim = engine.graph().order().get(3).copied();

    for frame in 0..(8 * 60) {
        match (frame, victim) {
            (180, Some(node)) => {
                println!("-- disabling node 3");
                engine.toggle_node(node);
            }
            (300, Some(node)) => {
                println!("-- enabling node 3");
                engine.toggle_node(node);
            }
            _ => {}
        }

        let report = engine.advance(FRAME);
        for outcome in report.outcomes.iter().filter(|o| o.is_ignored()) {
            println!("   ignored: {outcome:?}");
        }
        for event in &report.events {
            if let Event::PacketArrived { node, tick, .. } = event {
                let index = engine.graph().index_of(*node).unwrap_or(usize::MAX);
                println!("tick {tick:>4}: packet reached node {index}");
            }
        }
    }

    let snapshot = engine.snapshot();
    println!(
        "{kind}: t={:.2}s, {} nodes, {} edges, {} packets in flight, hash {:#018x}",
        snapshot.time,
        snapshot.nodes.len(),
        snapshot.edges.len(),
        snapshot.packets.len(),
        engine.state_hash()
    );
}
