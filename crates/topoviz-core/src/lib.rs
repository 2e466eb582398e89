//! Topoviz Core -- the simulation engine behind the network topology visualizer.
//!
//! This crate models five classic network topologies (star, ring, bus, tree
//! and mesh) as a graph of nodes and edges, decides which parts of the
//! graph are live, moves packets along the live parts and flashes nodes
//! when packets reach them. Rendering lives elsewhere: the engine hands out
//! plain [`snapshot::FrameSnapshot`] values.
//!
//! # Step Pipeline
//!
//! Each step run by [`engine::Engine::advance`] goes through:
//!
//! 1. **Commands** -- Apply queued edits (add, remove, move, toggle, cut).
//!    Every applied edit re-propagates activation.
//! 2. **Packets** -- Retire packets on dead routes, advance the rest, record
//!    arrivals, then spawn new packets per the topology's spawn rule.
//! 3. **Flashes** -- Arrivals flash their node; expired flashes fall back to
//!    the resting intensity.
//! 4. **Bookkeeping** -- Increment the tick counter, move the clock and
//!    compute the state hash.
//!
//! # Command Pattern
//!
//! Edits are queued and applied at the next step boundary:
//!
//! ```rust,ignore
//! let pending = engine.add_node(Point3::planar(1.0, 2.0), None);
//! let report = engine.advance(1.0 / 60.0);
//! let node_id = report.resolve_node(pending).unwrap();
//! ```
//!
//! # Key Types
//!
//! - [`engine::Engine`] -- Owns every subsystem and runs the pipeline.
//! - [`graph::TopologyGraph`] -- Nodes, edges and the per-topology edge rule.
//! - [`propagate::Traversal`] -- Derived node liveness and edge traversability.
//! - [`packet::PacketScheduler`] -- Packet lifecycle, including bus trunk
//!   and branch motion.
//! - [`flash::FlashController`] -- Transient per-node emission intensity.
//! - [`interaction::InteractionController`] -- Turns commands into graph edits.
//! - [`topology::TopologyStrategy`] -- The rule set that distinguishes the
//!   five topologies.

pub mod command;
pub mod config;
pub mod engine;
pub mod event;
pub mod flash;
pub mod geom;
pub mod graph;
pub mod id;
pub mod interaction;
pub mod packet;
pub mod propagate;
pub mod rng;
pub mod seed;
pub mod sim;
pub mod snapshot;
pub mod topology;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
