//! The engine: one topology, its subsystems, and the per-step pipeline.
//!
//! # Architecture
//!
//! An [`Engine`] owns a [`TopologyGraph`], the derived liveness in
//! [`Traversal`], the [`PacketScheduler`], the [`FlashController`], and the
//! [`InteractionController`] that applies user edits. Every
//! [`Engine::advance`] runs zero or more steps according to the configured
//! [`SimulationStrategy`], and each step runs four phases:
//!
//! 1. **Commands**: drain the [`CommandQueue`] and apply each command, with
//!    one propagation pass per command.
//! 2. **Packets**: retire, advance and spawn packets; arrivals flash nodes.
//! 3. **Flashes**: expire flashes whose deadline has passed.
//! 4. **Bookkeeping**: bump the tick, move the clock, recompute the state
//!    hash.
//!
//! Nothing outside phase 1 mutates the graph, so a renderer reading a
//! [`FrameSnapshot`] between steps always sees a consistent topology.

use log::{info, warn};
use slotmap::Key;

use crate::command::{Command, CommandQueue};
use crate::config::{EngineConfig, TopologyTuning};
use crate::event::{Event, EventFilter, EventKind};
use crate::flash::FlashController;
use crate::geom::Point3;
use crate::graph::TopologyGraph;
use crate::id::{EdgeId, NodeId, PendingNodeId};
use crate::interaction::{InteractionController, Targets};
use crate::packet::{PacketScheduler, Route, StepContext, StepOutput};
use crate::propagate::Traversal;
use crate::seed::{LayoutError, SeedLayout};
use crate::sim::{SimClock, SimulationStrategy, StateHash, TickReport};
use crate::snapshot::{FrameSnapshot, SnapshotSource};
use crate::topology::{TopologyKind, TopologyStrategy};

/// History entries kept by the engine's command queue.
const COMMAND_HISTORY: usize = 256;

/// The topology simulation engine.
///
/// Owns every subsystem and runs the per-step pipeline. All mutation goes
/// through [`Engine::submit`] and is applied at the start of the next step.
#[derive(Debug)]
pub struct Engine {
    kind: TopologyKind,
    strategy: TopologyStrategy,
    config: EngineConfig,
    tuning: TopologyTuning,

    graph: TopologyGraph,
    traversal: Traversal,
    scheduler: PacketScheduler,
    flashes: FlashController,
    controller: InteractionController,

    queue: CommandQueue,
    filter: EventFilter,
    clock: SimClock,

    /// Whether the simulation is paused.
    paused: bool,

    /// The most recently computed state hash.
    last_state_hash: u64,
}

impl Engine {
    /// Engine seeded with the canonical layout and default configuration.
    pub fn new(kind: TopologyKind) -> Self {
        Self::with_config(kind, EngineConfig::default())
    }

    /// Engine seeded with the canonical layout.
    ///
    /// An invalid configuration is logged and used as given; use
    /// [`Engine::with_layout`] to have it rejected instead.
    pub fn with_config(kind: TopologyKind, config: EngineConfig) -> Self {
        if let Err(e) = config.validate() {
            warn!("running {kind} engine with an invalid configuration: {e}");
        }
        let mut engine = Self::empty(kind, config);
        // Canonical layouts always validate; an empty graph is the fallback.
        if let Err(e) = engine.seed(&SeedLayout::canonical(kind)) {
            warn!("canonical {kind} layout rejected: {e}");
        }
        engine
    }

    /// Engine seeded from a custom layout. Fails if either the layout or the
    /// configuration is unusable.
    pub fn with_layout(
        kind: TopologyKind,
        config: EngineConfig,
        layout: &SeedLayout,
    ) -> Result<Self, LayoutError> {
        config.validate()?;
        let mut engine = Self::empty(kind, config);
        engine.seed(layout)?;
        Ok(engine)
    }

    fn empty(kind: TopologyKind, config: EngineConfig) -> Self {
        let strategy = TopologyStrategy::for_kind(kind);
        let tuning = config.tuning(kind).clone();
        Self {
            kind,
            graph: TopologyGraph::new(strategy.edges, tuning.bounds),
            traversal: Traversal::new(strategy.activation),
            scheduler: PacketScheduler::new(config.seed),
            flashes: FlashController::new(tuning.flash),
            controller: InteractionController::new(strategy, tuning.clone()),
            queue: CommandQueue::with_max_history(COMMAND_HISTORY),
            filter: EventFilter::new(),
            clock: SimClock::new(),
            paused: false,
            last_state_hash: 0,
            strategy,
            tuning,
            config,
        }
    }

    fn seed(&mut self, layout: &SeedLayout) -> Result<(), LayoutError> {
        let ids = layout.build(self.kind, &mut self.graph)?;
        self.traversal.propagate(&self.graph);
        self.last_state_hash = self.compute_state_hash();
        info!(
            "seeded {} topology: {} nodes, {} edges",
            self.kind,
            ids.len(),
            self.graph.edge_count()
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Queue a command for the next step. Add-node commands return a pending
    /// id that [`TickReport::resolve_node`] turns into the real id.
    pub fn submit(&mut self, command: Command) -> Option<PendingNodeId> {
        self.queue.push(command)
    }

    pub fn add_node(&mut self, position: Point3, drop_target: Option<NodeId>) -> PendingNodeId {
        self.queue.push_add_node(position, drop_target)
    }

    pub fn remove_node(&mut self, node: NodeId) {
        self.submit(Command::RemoveNode { node });
    }

    pub fn move_node(&mut self, node: NodeId, position: Point3) {
        self.submit(Command::MoveNode { node, position });
    }

    pub fn toggle_node(&mut self, node: NodeId) {
        self.submit(Command::ToggleNodeActive { node });
    }

    pub fn toggle_edge(&mut self, edge: EdgeId) {
        self.submit(Command::ToggleEdgeActive { edge });
    }

    pub fn set_node_active(&mut self, node: NodeId, active: bool) {
        self.submit(Command::SetNodeActive { node, active });
    }

    pub fn set_edge_active(&mut self, edge: EdgeId, active: bool) {
        self.submit(Command::SetEdgeActive { edge, active });
    }

    pub fn set_bus_cut(&mut self, cut: bool) {
        self.submit(Command::SetBusCut { cut });
    }

    pub fn toggle_bus_cut(&mut self) {
        self.submit(Command::ToggleBusCut);
    }

    /// Commands applied so far, oldest first, with the tick they ran in.
    pub fn command_history(&self) -> &[(u64, Command)] {
        self.queue.history()
    }

    // -----------------------------------------------------------------------
    // Pause / Resume
    // -----------------------------------------------------------------------

    /// Pause the simulation. While paused, `advance()` and `step()` are
    /// no-ops and submitted commands stay queued.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Stop recording an event kind in tick reports.
    pub fn suppress_event(&mut self, kind: EventKind) {
        self.filter.suppress(kind);
    }

    pub fn unsuppress_event(&mut self, kind: EventKind) {
        self.filter.unsuppress(kind);
    }

    // -----------------------------------------------------------------------
    // Advance
    // -----------------------------------------------------------------------

    /// Advance by `dt` seconds of wall-clock time.
    ///
    /// - **Variable**: one step of `dt`, clamped to `max_frame_delta`.
    /// - **Fixed**: `dt`, clamped to `max_frame_delta`, is accumulated; as
    ///   many fixed steps run as fit.
    pub fn advance(&mut self, dt: f64) -> TickReport {
        let mut report = TickReport::default();
        if self.paused {
            return report;
        }
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        match self.config.simulation {
            SimulationStrategy::Variable => {
                let dt = dt.min(self.config.max_frame_delta);
                self.step_internal(dt, &mut report);
            }
            SimulationStrategy::Fixed { step } => {
                let step = step.max(f64::EPSILON);
                // A long stall catches up at most one frame's worth of steps.
                self.clock.accumulator += dt.min(self.config.max_frame_delta);
                while self.clock.accumulator >= step {
                    self.clock.accumulator -= step;
                    self.step_internal(step, &mut report);
                }
            }
        }

        report
    }

    /// Run exactly one step of `dt` seconds, ignoring the strategy. The
    /// delta is still clamped to `max_frame_delta`.
    pub fn step(&mut self, dt: f64) -> TickReport {
        let mut report = TickReport::default();
        if self.paused {
            return report;
        }
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.step_internal(dt.min(self.config.max_frame_delta), &mut report);
        report
    }

    // -----------------------------------------------------------------------
    // Internal: single step
    // -----------------------------------------------------------------------

    fn step_internal(&mut self, dt: f64, report: &mut TickReport) {
        // Phase 1: apply queued commands.
        self.phase_commands(report);

        let now = self.clock.time + dt;

        // Phase 2: retire, advance and spawn packets; fire arrival flashes.
        self.phase_packets(now, dt, report);

        // Phase 3: expire flashes.
        self.flashes.decay(now);

        // Phase 4: bookkeeping.
        self.phase_bookkeeping(now);

        report.steps_run += 1;
    }

    fn phase_commands(&mut self, report: &mut TickReport) {
        let tick = self.clock.tick;
        for queued in self.queue.drain(tick) {
            let mut targets = Targets {
                graph: &mut self.graph,
                traversal: &mut self.traversal,
                scheduler: &mut self.scheduler,
                flashes: &mut self.flashes,
            };
            let outcome = self.controller.apply(
                &mut targets,
                &queued.command,
                queued.pending,
                tick,
                &self.filter,
                &mut report.events,
            );
            report.outcomes.push(outcome);
        }
    }

    fn phase_packets(&mut self, now: f64, dt: f64, report: &mut TickReport) {
        let tick = self.clock.tick;
        let ctx = StepContext {
            graph: &self.graph,
            traversal: &self.traversal,
            strategy: &self.strategy,
            tuning: &self.tuning,
            filter: &self.filter,
            tick,
            now,
            dt,
        };
        let mut out = StepOutput::default();
        self.scheduler.step(&ctx, &mut out);

        report.events.append(&mut out.events);
        for node in out.flashes {
            self.flashes.flash(node, now);
            self.filter
                .record(&mut report.events, Event::NodeFlashed { node, tick });
        }
    }

    fn phase_bookkeeping(&mut self, now: f64) {
        self.clock.tick += 1;
        self.clock.time = now;
        self.last_state_hash = self.compute_state_hash();
    }

    /// Deterministic hash of clock, graph and packet state.
    fn compute_state_hash(&self) -> u64 {
        let mut hasher = StateHash::new();

        hasher.write_u64(self.clock.tick);
        hasher.write_f64(self.clock.time);

        // Node order is the graph's insertion order, which is deterministic.
        for (id, node) in self.graph.nodes() {
            hasher.write_u64(id.data().as_ffi());
            hasher.write_f32(node.position.x);
            hasher.write_f32(node.position.y);
            hasher.write_f32(node.position.z);
            hasher.write_bool(node.enabled);
            hasher.write_bool(self.traversal.node_active(id));
        }

        for (id, edge) in self.graph.edges() {
            hasher.write_u64(id.data().as_ffi());
            hasher.write_bool(edge.active);
        }
        hasher.write_bool(self.graph.is_bus_cut());

        for (id, packet) in self.scheduler.iter() {
            hasher.write_u64(id.data().as_ffi());
            hasher.write_f32(packet.progress);
            hasher.write_f64(packet.release_at);
            hasher.write_bool(matches!(
                packet.route,
                Route::Trunk { .. } | Route::Branch { .. }
            ));
        }
        hasher.write_u64(self.scheduler.rng_state());
        hasher.write_f64(self.scheduler.next_check());

        hasher.finish()
    }

    // -----------------------------------------------------------------------
    // Query API (read-only)
    // -----------------------------------------------------------------------

    /// Owned copy of everything a renderer needs for the current frame.
    pub fn snapshot(&self) -> FrameSnapshot {
        SnapshotSource {
            kind: self.kind,
            clock: &self.clock,
            graph: &self.graph,
            traversal: &self.traversal,
            scheduler: &self.scheduler,
            flashes: &self.flashes,
        }
        .capture()
    }

    /// Get the most recently computed state hash.
    pub fn state_hash(&self) -> u64 {
        self.last_state_hash
    }

    pub fn kind(&self) -> TopologyKind {
        self.kind
    }

    pub fn strategy(&self) -> &TopologyStrategy {
        &self.strategy
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tuning(&self) -> &TopologyTuning {
        &self.tuning
    }

    pub fn graph(&self) -> &TopologyGraph {
        &self.graph
    }

    pub fn traversal(&self) -> &Traversal {
        &self.traversal
    }

    pub fn scheduler(&self) -> &PacketScheduler {
        &self.scheduler
    }

    pub fn flashes(&self) -> &FlashController {
        &self.flashes
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn tick(&self) -> u64 {
        self.clock.tick
    }

    pub fn time(&self) -> f64 {
        self.clock.time
    }

    pub fn pending_commands(&self) -> usize {
        self.queue.pending_count()
    }

    /// Whether a node is currently live.
    pub fn is_active(&self, node: NodeId) -> bool {
        self.traversal.node_active(node)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandOutcome, IgnoreReason};
    use crate::config::{Bounds, ConfigError};

    fn fixed(step: f64) -> EngineConfig {
        EngineConfig {
            simulation: SimulationStrategy::Fixed { step },
            ..EngineConfig::default()
        }
    }

    #[test]
    fn new_engine_is_seeded() {
        let engine = Engine::new(TopologyKind::Ring);
        assert_eq!(engine.graph().node_count(), 8);
        assert_eq!(engine.tick(), 0);
        assert!(engine.traversal().all_active());
        assert_ne!(engine.state_hash(), 0);
    }

    #[test]
    fn subsystems_follow_the_strategy() {
        for kind in TopologyKind::ALL {
            let engine = Engine::new(kind);
            assert_eq!(engine.graph().rule(), engine.strategy().edges);
            assert_eq!(engine.traversal().rule(), engine.strategy().activation);
        }
    }

    #[test]
    fn variable_clamps_frame_delta() {
        let mut engine = Engine::new(TopologyKind::Star);
        let report = engine.advance(5.0);
        assert_eq!(report.steps_run, 1);
        assert_eq!(engine.time(), 0.1);
    }

    #[test]
    fn fixed_runs_whole_steps_and_carries_remainder() {
        let config = EngineConfig {
            max_frame_delta: 1.0,
            ..fixed(0.25)
        };
        let mut engine = Engine::with_config(TopologyKind::Mesh, config);
        let report = engine.advance(0.6);
        assert_eq!(report.steps_run, 2);
        assert_eq!(engine.time(), 0.5);
        assert!((engine.clock().accumulator - 0.1).abs() < 1e-9);
        let report = engine.advance(0.2);
        assert_eq!(report.steps_run, 1);
    }

    #[test]
    fn fixed_stall_is_capped_at_one_frame_delta() {
        let mut engine = Engine::with_config(TopologyKind::Ring, fixed(0.03125));
        let report = engine.advance(30.0);
        // max_frame_delta is 0.1 s: three steps, not nearly a thousand.
        assert_eq!(report.steps_run, 3);
        assert_eq!(engine.time(), 0.09375);
    }

    #[test]
    fn paused_engine_holds_commands() {
        let mut engine = Engine::new(TopologyKind::Mesh);
        engine.pause();
        let pending = engine.add_node(Point3::ORIGIN, None);
        let report = engine.advance(0.05);
        assert_eq!(report.steps_run, 0);
        assert_eq!(engine.pending_commands(), 1);
        assert!(engine.is_paused());

        engine.resume();
        let report = engine.advance(0.05);
        let node = report.resolve_node(pending).unwrap();
        assert!(engine.graph().contains_node(node));
        assert_eq!(engine.graph().node_count(), 6);
    }

    #[test]
    fn arrivals_flash_nodes() {
        let mut engine = Engine::new(TopologyKind::Star);
        let mut flashed = Vec::new();
        for _ in 0..60 {
            flashed.extend(engine.advance(0.05).flashed_nodes());
        }
        assert!(!flashed.is_empty());
        let hub = engine.graph().hub().unwrap();
        assert!(flashed.iter().any(|&n| n != hub));
    }

    #[test]
    fn suppressed_events_are_not_reported() {
        let mut engine = Engine::new(TopologyKind::Star);
        engine.suppress_event(EventKind::PacketSpawned);
        let report = engine.advance(0.05);
        assert!(
            report
                .events
                .iter()
                .all(|e| e.kind() != EventKind::PacketSpawned)
        );
        assert!(!engine.scheduler().is_empty());
    }

    #[test]
    fn history_records_applied_commands() {
        let mut engine = Engine::new(TopologyKind::Bus);
        engine.toggle_bus_cut();
        engine.advance(0.01);
        assert_eq!(engine.command_history(), &[(0, Command::ToggleBusCut)]);
        assert!(engine.graph().is_bus_cut());
    }

    #[test]
    fn ignored_commands_are_reported() {
        let mut engine = Engine::new(TopologyKind::Tree);
        let pending = engine.add_node(Point3::ORIGIN, None);
        let report = engine.advance(0.01);
        assert_eq!(
            report.outcomes,
            vec![CommandOutcome::Ignored {
                reason: IgnoreReason::NeedsDropTarget
            }]
        );
        assert_eq!(report.resolve_node(pending), None);
        assert_eq!(engine.graph().node_count(), 7);
    }

    #[test]
    fn equal_seeds_hash_equally() {
        let mut a = Engine::new(TopologyKind::Star);
        let mut b = Engine::new(TopologyKind::Star);
        for _ in 0..40 {
            a.advance(1.0 / 60.0);
            b.advance(1.0 / 60.0);
        }
        assert_eq!(a.state_hash(), b.state_hash());
        assert_eq!(a.snapshot(), b.snapshot());
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = Engine::new(TopologyKind::Star);
        let mut b = Engine::with_config(
            TopologyKind::Star,
            EngineConfig {
                seed: 99,
                ..EngineConfig::default()
            },
        );
        a.advance(0.05);
        b.advance(0.05);
        assert_ne!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn custom_layout_errors_propagate() {
        let layout = SeedLayout::canonical(TopologyKind::Tree);
        let err = Engine::with_layout(TopologyKind::Mesh, EngineConfig::default(), &layout)
            .unwrap_err();
        assert!(matches!(err, LayoutError::InvalidRole { index: 0, .. }));
    }

    #[test]
    fn invalid_bounds_are_rejected_not_panicked_on() {
        let mut config = EngineConfig::default();
        config.bus.bounds = Bounds::Line { half_length: -4.0 };
        let layout = SeedLayout::canonical(TopologyKind::Bus);

        let err = Engine::with_layout(TopologyKind::Bus, config.clone(), &layout).unwrap_err();
        assert!(matches!(
            err,
            LayoutError::Config(ConfigError::InvalidBounds {
                topology: TopologyKind::Bus,
                ..
            })
        ));

        // The infallible constructor still builds an engine.
        let mut engine = Engine::with_config(TopologyKind::Bus, config);
        assert_eq!(engine.graph().node_count(), 5);
        engine.advance(0.05);
    }
}
