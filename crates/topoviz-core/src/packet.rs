//! Packet motion and lifecycle.
//!
//! Every step the scheduler runs three passes over its packets:
//!
//! 1. **Retire**: drop packets whose route is no longer traversable.
//! 2. **Advance**: move released packets, record arrivals and flashes, and
//!    let bus trunks emit branch packets into the nodes they pass.
//! 3. **Spawn**: create new packets according to the topology's
//!    [`SpawnRule`].
//!
//! A packet's progress only ever grows. Loops (ring laps, star spokes, bus
//! trunks) are modelled as a chain of packets: completing a lap retires the
//! packet and a successor carries the overflow.

use std::collections::HashSet;

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::config::TopologyTuning;
use crate::event::{Event, EventFilter};
use crate::geom::Point3;
use crate::graph::{EdgeKind, Endpoints, TopologyGraph};
use crate::id::*;
use crate::propagate::Traversal;
use crate::rng::SimRng;
use crate::topology::{SpawnRule, TopologyStrategy};

// ---------------------------------------------------------------------------
// Packet data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketPhase {
    Traveling,
    /// A bus packet moving from the medium into a node.
    Branching,
}

/// The path a packet follows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Route {
    /// One lap around the ring. `segment` is the cycle segment the packet
    /// occupied after its last advance, on a ring of `nodes` nodes.
    Loop { segment: usize, nodes: usize },
    /// Hub to peer along a star spoke, repeated for as long as the star is up.
    Spoke {
        edge: EdgeId,
        hub: NodeId,
        peer: NodeId,
    },
    /// A single trip across a tree or mesh edge.
    Segment {
        edge: EdgeId,
        from: NodeId,
        to: NodeId,
    },
    /// One pass along the bus medium. `zones` holds every node whose
    /// proximity zone the trunk currently sits in; zones may overlap.
    Trunk { zones: Vec<NodeId> },
    /// From the point where a trunk passed a node, up the connector to it.
    Branch {
        edge: EdgeId,
        node: NodeId,
        origin: Point3,
    },
}

impl Route {
    /// Whether removing `node` invalidates this route.
    pub fn touches(&self, node: NodeId) -> bool {
        match *self {
            Route::Loop { .. } | Route::Trunk { .. } => false,
            Route::Spoke { hub, peer, .. } => hub == node || peer == node,
            Route::Segment { from, to, .. } => from == node || to == node,
            Route::Branch { node: n, .. } => n == node,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub route: Route,
    pub phase: PacketPhase,
    /// Fraction of the route covered, in `[0, 1]` once clamped for display.
    pub progress: f32,
    /// Progress per second.
    pub speed: f32,
    pub spawned_at: f64,
    /// The packet neither moves nor renders before this time.
    pub release_at: f64,
}

impl Packet {
    pub fn is_released(&self, now: f64) -> bool {
        now >= self.release_at
    }

    /// Where the packet is drawn. `None` when the route no longer resolves
    /// against the graph.
    pub fn position(&self, graph: &TopologyGraph) -> Option<Point3> {
        let t = self.progress.clamp(0.0, 1.0);
        match self.route {
            Route::Loop { .. } => {
                let order = graph.order();
                let n = order.len();
                if n == 0 {
                    return None;
                }
                let seg = segment_index(t, n);
                let local = t * n as f32 - seg as f32;
                let from = graph.node(order[seg])?.position;
                let to = graph.node(order[(seg + 1) % n])?.position;
                Some(from.lerp(to, local))
            }
            Route::Spoke { hub, peer, .. } => {
                Some(graph.node(hub)?.position.lerp(graph.node(peer)?.position, t))
            }
            Route::Segment { from, to, .. } => {
                Some(graph.node(from)?.position.lerp(graph.node(to)?.position, t))
            }
            Route::Trunk { .. } => {
                let (a, b) = graph.medium()?;
                Some(a.lerp(b, t))
            }
            Route::Branch { node, origin, .. } => {
                Some(origin.lerp(graph.node(node)?.position, t))
            }
        }
    }
}

/// Cycle segment containing progress `t` on a ring of `n` nodes.
fn segment_index(t: f32, n: usize) -> usize {
    ((t.max(0.0) * n as f32) as usize).min(n.saturating_sub(1))
}

// ---------------------------------------------------------------------------
// Step plumbing
// ---------------------------------------------------------------------------

/// Read-only view of the engine a scheduler step needs.
pub struct StepContext<'a> {
    pub graph: &'a TopologyGraph,
    pub traversal: &'a Traversal,
    pub strategy: &'a TopologyStrategy,
    pub tuning: &'a TopologyTuning,
    pub filter: &'a EventFilter,
    pub tick: u64,
    /// Simulation time at the end of this step.
    pub now: f64,
    pub dt: f64,
}

/// What one scheduler step produced.
#[derive(Debug, Default)]
pub struct StepOutput {
    pub events: Vec<Event>,
    /// Nodes reached this step, in the order packets reached them.
    pub flashes: Vec<NodeId>,
}

enum Finish {
    Arrive(NodeId),
    LoopLap,
    SpokeLap,
    TrunkLap,
}

struct BranchRequest {
    trunk: PacketId,
    edge: EdgeId,
    node: NodeId,
    origin: Point3,
}

// ---------------------------------------------------------------------------
// PacketScheduler
// ---------------------------------------------------------------------------

/// Owns every in-flight packet.
#[derive(Debug, Clone)]
pub struct PacketScheduler {
    packets: SlotMap<PacketId, Packet>,
    rng: SimRng,
    /// Next periodic spawn check (tree, mesh).
    next_check: f64,
}

impl PacketScheduler {
    pub fn new(seed: u64) -> Self {
        Self {
            packets: SlotMap::with_key(),
            rng: SimRng::new(seed),
            next_check: 0.0,
        }
    }

    pub fn get(&self, id: PacketId) -> Option<&Packet> {
        self.packets.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PacketId, &Packet)> {
        self.packets.iter()
    }

    /// Packets that have been released by `now`.
    pub fn released(&self, now: f64) -> impl Iterator<Item = (PacketId, &Packet)> {
        self.packets.iter().filter(move |(_, p)| p.is_released(now))
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn rng_state(&self) -> u64 {
        self.rng.state()
    }

    pub fn next_check(&self) -> f64 {
        self.next_check
    }

    /// Run one retire / advance / spawn cycle.
    pub fn step(&mut self, ctx: &StepContext<'_>, out: &mut StepOutput) {
        self.retire(ctx, out);
        self.advance(ctx, out);
        self.spawn(ctx, out);
    }

    /// Drop every packet routed through a removed node. Trunks that were
    /// sitting in a removed node's zone forget it.
    pub fn purge(
        &mut self,
        removed: &[NodeId],
        tick: u64,
        filter: &EventFilter,
        events: &mut Vec<Event>,
    ) -> usize {
        let doomed: Vec<PacketId> = self
            .packets
            .iter()
            .filter(|(_, p)| removed.iter().any(|&n| p.route.touches(n)))
            .map(|(id, _)| id)
            .collect();
        for &id in &doomed {
            self.packets.remove(id);
            filter.record(events, Event::PacketRetired { packet: id, tick });
        }
        for (_, packet) in self.packets.iter_mut() {
            if let Route::Trunk { zones } = &mut packet.route {
                zones.retain(|z| !removed.contains(z));
            }
        }
        doomed.len()
    }

    // -----------------------------------------------------------------------
    // Retire
    // -----------------------------------------------------------------------

    fn retire(&mut self, ctx: &StepContext<'_>, out: &mut StepOutput) {
        let stale: Vec<PacketId> = self
            .packets
            .iter()
            .filter(|(_, p)| !route_open(ctx, &p.route))
            .map(|(id, _)| id)
            .collect();
        for id in stale {
            self.packets.remove(id);
            debug!("retired packet {id:?}: route no longer traversable");
            ctx.filter.record(
                &mut out.events,
                Event::PacketRetired {
                    packet: id,
                    tick: ctx.tick,
                },
            );
        }
    }

    // -----------------------------------------------------------------------
    // Advance
    // -----------------------------------------------------------------------

    fn advance(&mut self, ctx: &StepContext<'_>, out: &mut StepOutput) {
        let ids: Vec<PacketId> = self.packets.keys().collect();
        let mut finished: Vec<(PacketId, Finish)> = Vec::new();
        let mut branches: Vec<BranchRequest> = Vec::new();

        for id in ids {
            let Some(packet) = self.packets.get_mut(id) else {
                continue;
            };
            if !packet.is_released(ctx.now) {
                continue;
            }
            let elapsed = (ctx.now - packet.release_at).min(ctx.dt).max(0.0) as f32;
            let before = packet.progress;
            packet.progress += packet.speed * elapsed;
            let after = packet.progress;

            match &mut packet.route {
                Route::Segment { to, .. } | Route::Branch { node: to, .. } => {
                    if after >= 1.0 {
                        finished.push((id, Finish::Arrive(*to)));
                    }
                }
                Route::Spoke { .. } => {
                    if after >= 1.0 {
                        finished.push((id, Finish::SpokeLap));
                    }
                }
                Route::Loop { segment, nodes } => {
                    let order = ctx.graph.order();
                    let n = order.len();
                    if n == 0 {
                        continue;
                    }
                    if *nodes != n {
                        // The ring changed size mid-lap; re-index against it.
                        *segment = segment_index(before, n);
                        *nodes = n;
                    }
                    if after >= 1.0 {
                        // Pass the rest of the lap; the first node is the arrival.
                        out.flashes.extend(order.iter().skip(*segment + 1));
                        finished.push((id, Finish::LoopLap));
                    } else {
                        let entered = segment_index(after, n);
                        if entered > *segment {
                            out.flashes
                                .extend(&order[(*segment + 1).min(n)..=entered]);
                        }
                        *segment = entered;
                    }
                }
                Route::Trunk { zones } => {
                    let Some((a, b)) = ctx.graph.medium() else {
                        continue;
                    };
                    let x = |t: f32| a.x + (b.x - a.x) * t.min(1.0);
                    *zones = sweep(ctx, id, x(before), x(after), &zones[..], &mut branches);
                    if after >= 1.0 {
                        finished.push((id, Finish::TrunkLap));
                    }
                }
            }
        }

        for (id, finish) in finished {
            let Some(packet) = self.packets.remove(id) else {
                continue;
            };
            let overflow = (packet.progress - 1.0).max(0.0).fract();
            match finish {
                Finish::Arrive(node) => {
                    self.arrive(ctx, out, id, node);
                }
                Finish::SpokeLap => {
                    if let Route::Spoke { peer, .. } = packet.route {
                        self.arrive(ctx, out, id, peer);
                    }
                    self.continue_with(ctx, out, packet.route, overflow, packet.speed);
                }
                Finish::LoopLap => {
                    let order = ctx.graph.order();
                    let Some(&first) = order.first() else {
                        continue;
                    };
                    self.arrive(ctx, out, id, first);
                    let segment = segment_index(overflow, order.len());
                    out.flashes.extend(order.iter().take(segment + 1).skip(1));
                    let nodes = order.len();
                    self.continue_with(
                        ctx,
                        out,
                        Route::Loop { segment, nodes },
                        overflow,
                        packet.speed,
                    );
                }
                Finish::TrunkLap => {
                    // The trunk wraps from the far end back to the start.
                    let trunk = self.continue_with(
                        ctx,
                        out,
                        Route::Trunk { zones: Vec::new() },
                        overflow,
                        packet.speed,
                    );
                    if let Some((a, b)) = ctx.graph.medium() {
                        let x = a.x + (b.x - a.x) * overflow;
                        let entered = sweep(ctx, trunk, a.x, x, &[], &mut branches);
                        if let Some(Packet {
                            route: Route::Trunk { zones },
                            ..
                        }) = self.packets.get_mut(trunk)
                        {
                            *zones = entered;
                        }
                    }
                }
            }
        }

        for req in branches {
            // The trunk may have just been retired by its lap; keep the branch.
            let packet = Packet {
                route: Route::Branch {
                    edge: req.edge,
                    node: req.node,
                    origin: req.origin,
                },
                phase: PacketPhase::Branching,
                progress: 0.0,
                speed: ctx.tuning.branch_speed,
                spawned_at: ctx.now,
                release_at: ctx.now,
            };
            let id = self.packets.insert(packet);
            trace!("trunk {:?} branched into node {:?}", req.trunk, req.node);
            ctx.filter.record(
                &mut out.events,
                Event::BranchSpawned {
                    packet: id,
                    trunk: req.trunk,
                    node: req.node,
                    tick: ctx.tick,
                },
            );
        }
    }

    fn arrive(&self, ctx: &StepContext<'_>, out: &mut StepOutput, id: PacketId, node: NodeId) {
        out.flashes.push(node);
        ctx.filter.record(
            &mut out.events,
            Event::PacketArrived {
                packet: id,
                node,
                tick: ctx.tick,
            },
        );
    }

    /// Start the next packet of a looping chain.
    fn continue_with(
        &mut self,
        ctx: &StepContext<'_>,
        out: &mut StepOutput,
        route: Route,
        progress: f32,
        speed: f32,
    ) -> PacketId {
        self.insert(
            ctx,
            out,
            Packet {
                route,
                phase: PacketPhase::Traveling,
                progress,
                speed,
                spawned_at: ctx.now,
                release_at: ctx.now,
            },
        )
    }

    // -----------------------------------------------------------------------
    // Spawn
    // -----------------------------------------------------------------------

    fn spawn(&mut self, ctx: &StepContext<'_>, out: &mut StepOutput) {
        match ctx.strategy.spawn {
            SpawnRule::AmbientLoop => self.spawn_loops(ctx, out),
            SpawnRule::AmbientSpokes => self.spawn_spokes(ctx, out),
            SpawnRule::AmbientTrunk => self.spawn_trunks(ctx, out),
            SpawnRule::PerParent | SpawnRule::PerEdge => {
                if ctx.now < self.next_check {
                    return;
                }
                let interval = ctx.tuning.spawn_interval;
                self.next_check = if interval > 0.0 {
                    let missed = ((ctx.now - self.next_check) / interval).floor() + 1.0;
                    self.next_check + missed * interval
                } else {
                    ctx.now
                };
                if ctx.strategy.spawn == SpawnRule::PerParent {
                    self.spawn_children(ctx, out);
                } else {
                    self.spawn_links(ctx, out);
                }
            }
        }
    }

    fn spawn_loops(&mut self, ctx: &StepContext<'_>, out: &mut StepOutput) {
        let n = ctx.graph.node_count();
        if !ctx.traversal.all_active() || n < 2 {
            return;
        }
        if self.packets.values().any(|p| matches!(p.route, Route::Loop { .. })) {
            return;
        }
        let count = ctx.tuning.packet_count;
        for i in 0..count {
            let offset = i as f32 / count as f32;
            self.insert_traveling(
                ctx,
                out,
                Route::Loop {
                    segment: segment_index(offset, n),
                    nodes: n,
                },
                offset,
                ctx.tuning.packet_speed,
                ctx.now,
            );
        }
    }

    fn spawn_spokes(&mut self, ctx: &StepContext<'_>, out: &mut StepOutput) {
        if !ctx.traversal.all_active() {
            return;
        }
        let busy: HashSet<EdgeId> = self
            .packets
            .values()
            .filter_map(|p| match p.route {
                Route::Spoke { edge, .. } => Some(edge),
                _ => None,
            })
            .collect();
        let spokes: Vec<(EdgeId, NodeId, NodeId)> = ctx
            .graph
            .edges()
            .filter(|(id, e)| {
                e.kind == EdgeKind::Spoke
                    && !busy.contains(id)
                    && ctx.traversal.edge_traversable(ctx.graph, *id)
            })
            .filter_map(|(id, e)| match e.ends {
                Endpoints::Pair { from, to } => Some((id, from, to)),
                Endpoints::Medium(_) => None,
            })
            .collect();
        for (edge, hub, peer) in spokes {
            let progress = self.rng.next_unit();
            self.insert_traveling(
                ctx,
                out,
                Route::Spoke { edge, hub, peer },
                progress,
                ctx.tuning.packet_speed,
                ctx.now,
            );
        }
    }

    fn spawn_trunks(&mut self, ctx: &StepContext<'_>, out: &mut StepOutput) {
        if !ctx.traversal.medium_traversable(ctx.graph) {
            return;
        }
        if self.packets.values().any(|p| matches!(p.route, Route::Trunk { .. })) {
            return;
        }
        let count = ctx.tuning.packet_count;
        for i in 0..count {
            self.insert_traveling(
                ctx,
                out,
                Route::Trunk { zones: Vec::new() },
                i as f32 / count as f32,
                ctx.tuning.packet_speed,
                ctx.now,
            );
        }
    }

    /// Tree: each active node with nothing in flight sends one packet to
    /// every child it can reach, staggered by sibling index.
    fn spawn_children(&mut self, ctx: &StepContext<'_>, out: &mut StepOutput) {
        let busy: HashSet<NodeId> = self
            .packets
            .values()
            .filter_map(|p| match p.route {
                Route::Segment { from, .. } => Some(from),
                _ => None,
            })
            .collect();
        let mut planned = Vec::new();
        for (id, _) in ctx.graph.nodes() {
            if !ctx.traversal.node_active(id) || busy.contains(&id) {
                continue;
            }
            let reachable = ctx.graph.children(id).iter().filter_map(|&child| {
                let edge = ctx.graph.edge_between(id, child)?;
                ctx.traversal
                    .edge_traversable(ctx.graph, edge)
                    .then_some((edge, child))
            });
            for (idx, (edge, child)) in reachable.enumerate() {
                planned.push((edge, id, child, idx));
            }
        }
        self.insert_staggered(ctx, out, planned);
    }

    /// Mesh: each active node sends a packet over every live link that has
    /// nothing in flight from it, staggered by link index.
    fn spawn_links(&mut self, ctx: &StepContext<'_>, out: &mut StepOutput) {
        let busy: HashSet<(EdgeId, NodeId)> = self
            .packets
            .values()
            .filter_map(|p| match p.route {
                Route::Segment { edge, from, .. } => Some((edge, from)),
                _ => None,
            })
            .collect();
        let mut planned = Vec::new();
        for (id, _) in ctx.graph.nodes() {
            if !ctx.traversal.node_active(id) {
                continue;
            }
            let open = ctx.graph.incident_edges(id).iter().filter_map(|&edge| {
                if busy.contains(&(edge, id)) || !ctx.traversal.edge_traversable(ctx.graph, edge) {
                    return None;
                }
                let other = ctx.graph.edge(edge)?.ends.other(id)?;
                Some((edge, other))
            });
            for (idx, (edge, other)) in open.enumerate() {
                planned.push((edge, id, other, idx));
            }
        }
        self.insert_staggered(ctx, out, planned);
    }

    fn insert_staggered(
        &mut self,
        ctx: &StepContext<'_>,
        out: &mut StepOutput,
        planned: Vec<(EdgeId, NodeId, NodeId, usize)>,
    ) {
        for (edge, from, to, idx) in planned {
            self.insert_traveling(
                ctx,
                out,
                Route::Segment { edge, from, to },
                0.0,
                ctx.tuning.packet_speed,
                ctx.now + idx as f64 * ctx.tuning.stagger,
            );
        }
    }

    fn insert_traveling(
        &mut self,
        ctx: &StepContext<'_>,
        out: &mut StepOutput,
        route: Route,
        progress: f32,
        speed: f32,
        release_at: f64,
    ) -> PacketId {
        self.insert(
            ctx,
            out,
            Packet {
                route,
                phase: PacketPhase::Traveling,
                progress,
                speed,
                spawned_at: ctx.now,
                release_at,
            },
        )
    }

    fn insert(&mut self, ctx: &StepContext<'_>, out: &mut StepOutput, packet: Packet) -> PacketId {
        trace!("spawn {:?} at progress {}", packet.route, packet.progress);
        let id = self.packets.insert(packet);
        ctx.filter.record(
            &mut out.events,
            Event::PacketSpawned {
                packet: id,
                tick: ctx.tick,
            },
        );
        id
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn route_open(ctx: &StepContext<'_>, route: &Route) -> bool {
    let (graph, traversal) = (ctx.graph, ctx.traversal);
    match *route {
        Route::Loop { .. } => traversal.all_active() && graph.node_count() >= 2,
        Route::Spoke { edge, .. } => traversal.all_active() && traversal.edge_traversable(graph, edge),
        Route::Segment { edge, .. } | Route::Branch { edge, .. } => {
            traversal.edge_traversable(graph, edge)
        }
        Route::Trunk { .. } => traversal.medium_traversable(graph),
    }
}

/// Sweep a trunk over `[lo, hi]` along the medium. Every node whose
/// proximity zone the sweep touches gets a branch, except the nodes in
/// `occupied` (zones the trunk was already sitting in). Returns every zone
/// the trunk ends in.
fn sweep(
    ctx: &StepContext<'_>,
    trunk: PacketId,
    lo: f32,
    hi: f32,
    occupied: &[NodeId],
    branches: &mut Vec<BranchRequest>,
) -> Vec<NodeId> {
    let graph = ctx.graph;
    let reach = ctx.tuning.proximity;
    let Some((start, _)) = graph.medium() else {
        return Vec::new();
    };

    let mut touched: Vec<(f32, NodeId)> = graph
        .nodes()
        .filter(|(_, n)| n.position.x - reach < hi && n.position.x + reach > lo)
        .map(|(id, n)| (n.position.x, id))
        .collect();
    touched.sort_by(|a, b| a.0.total_cmp(&b.0));

    for (x, node) in touched {
        if occupied.contains(&node) {
            continue;
        }
        let Some(&tap) = graph.incident_edges(node).first() else {
            continue;
        };
        if !ctx.traversal.edge_traversable(graph, tap) {
            continue;
        }
        branches.push(BranchRequest {
            trunk,
            edge: tap,
            node,
            origin: Point3 {
                x: x.clamp(lo, hi),
                ..start
            },
        });
    }

    graph
        .nodes()
        .filter(|(_, n)| (n.position.x - hi).abs() < reach)
        .map(|(id, _)| id)
        .collect()
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeRole;
    use crate::topology::TopologyKind;

    struct Rig {
        graph: TopologyGraph,
        traversal: Traversal,
        strategy: TopologyStrategy,
        tuning: TopologyTuning,
        filter: EventFilter,
        scheduler: PacketScheduler,
        tick: u64,
        time: f64,
    }

    impl Rig {
        fn new(kind: TopologyKind) -> Self {
            let strategy = TopologyStrategy::for_kind(kind);
            let tuning = TopologyTuning::for_kind(kind);
            Self {
                graph: TopologyGraph::new(strategy.edges, tuning.bounds),
                traversal: Traversal::new(strategy.activation),
                strategy,
                tuning,
                filter: EventFilter::new(),
                scheduler: PacketScheduler::new(7),
                tick: 0,
                time: 0.0,
            }
        }

        fn add(&mut self, x: f32, y: f32, role: NodeRole, parent: Option<NodeId>) -> NodeId {
            let id = self.graph.add_node(Point3::planar(x, y), role, parent).unwrap();
            self.traversal.propagate(&self.graph);
            id
        }

        fn step(&mut self, dt: f64) -> StepOutput {
            self.tick += 1;
            self.time += dt;
            let ctx = StepContext {
                graph: &self.graph,
                traversal: &self.traversal,
                strategy: &self.strategy,
                tuning: &self.tuning,
                filter: &self.filter,
                tick: self.tick,
                now: self.time,
                dt,
            };
            let mut out = StepOutput::default();
            self.scheduler.step(&ctx, &mut out);
            out
        }

        fn count(&self, pred: impl Fn(&Route) -> bool) -> usize {
            self.scheduler.iter().filter(|(_, p)| pred(&p.route)).count()
        }
    }

    fn ring(n: usize) -> (Rig, Vec<NodeId>) {
        let mut rig = Rig::new(TopologyKind::Ring);
        let ids = (0..n)
            .map(|i| {
                let theta = i as f32 / n as f32 * std::f32::consts::TAU;
                rig.add(4.2 * theta.cos(), 2.7 * theta.sin(), NodeRole::Peer, None)
            })
            .collect();
        (rig, ids)
    }

    fn bus(xs: &[f32]) -> (Rig, Vec<NodeId>) {
        let mut rig = Rig::new(TopologyKind::Bus);
        let ids = xs
            .iter()
            .enumerate()
            .map(|(i, &x)| rig.add(x, if i % 2 == 0 { 0.8 } else { -0.8 }, NodeRole::Peer, None))
            .collect();
        (rig, ids)
    }

    // -----------------------------------------------------------------------
    // Ring
    // -----------------------------------------------------------------------

    #[test]
    fn ring_spawns_configured_loops() {
        let (mut rig, _) = ring(8);
        rig.step(0.016);
        assert_eq!(rig.count(|r| matches!(r, Route::Loop { .. })), 2);
        let progress: Vec<f32> = rig.scheduler.iter().map(|(_, p)| p.progress).collect();
        assert!(progress.contains(&0.0));
        assert!(progress.contains(&0.5));
    }

    #[test]
    fn ring_flashes_every_node_in_cycle_order() {
        let (mut rig, ids) = ring(8);
        rig.tuning.packet_count = 1;
        rig.step(0.0);
        let mut flashes = Vec::new();
        // One lap at 0.32 laps/s takes 3.125 s.
        for _ in 0..320 {
            flashes.extend(rig.step(0.01).flashes);
        }
        assert!(flashes.len() >= 8);
        let expected: Vec<NodeId> = ids[1..].iter().chain(&ids[..1]).copied().collect();
        assert_eq!(&flashes[..8], expected.as_slice());
    }

    #[test]
    fn large_step_does_not_skip_ring_nodes() {
        let (mut rig, ids) = ring(8);
        rig.tuning.packet_count = 1;
        rig.tuning.packet_speed = 2.0;
        rig.step(0.0);
        let out = rig.step(0.3); // 0.6 of a lap in one step
        assert_eq!(out.flashes, ids[1..=4].to_vec());
    }

    #[test]
    fn shrinking_ring_reindexes_loop_segments() {
        let (mut rig, ids) = ring(8);
        rig.tuning.packet_count = 1;
        rig.tuning.packet_speed = 1.0;
        rig.step(0.0);
        assert_eq!(rig.step(0.3).flashes, ids[1..=2].to_vec());

        for &id in &ids[5..] {
            rig.graph.remove_node(id);
        }
        rig.traversal.propagate(&rig.graph);

        // 0.3 of a lap on five nodes sits between nodes 1 and 2.
        let out = rig.step(0.2);
        assert_eq!(out.flashes, vec![ids[2]]);
    }

    #[test]
    fn ring_lap_arrives_once_and_continues() {
        let (mut rig, ids) = ring(4);
        rig.tuning.packet_count = 1;
        rig.tuning.packet_speed = 1.0;
        rig.step(0.0);
        let first = rig.scheduler.iter().next().map(|(id, _)| id).unwrap();

        let mut arrivals = Vec::new();
        for _ in 0..11 {
            for e in rig.step(0.1).events {
                if let Event::PacketArrived { packet, node, .. } = e {
                    arrivals.push((packet, node));
                }
            }
        }
        assert_eq!(arrivals, vec![(first, ids[0])]);
        assert_eq!(rig.count(|r| matches!(r, Route::Loop { .. })), 1);
        assert!(rig.scheduler.get(first).is_none());
    }

    #[test]
    fn ring_loops_need_every_node_active() {
        let (mut rig, ids) = ring(8);
        rig.step(0.016);
        rig.graph.set_node_active(ids[3], false);
        rig.traversal.cascade(&rig.graph, ids[3]);

        let out = rig.step(0.016);
        assert_eq!(rig.scheduler.len(), 0);
        let retired = out
            .events
            .iter()
            .filter(|e| matches!(e, Event::PacketRetired { .. }))
            .count();
        assert_eq!(retired, 2);

        rig.graph.set_node_active(ids[3], true);
        rig.traversal.cascade(&rig.graph, ids[3]);
        rig.step(0.016);
        assert_eq!(rig.scheduler.len(), 2);
    }

    // -----------------------------------------------------------------------
    // Star
    // -----------------------------------------------------------------------

    fn star() -> (Rig, NodeId, Vec<NodeId>) {
        let mut rig = Rig::new(TopologyKind::Star);
        let hub = rig.add(0.0, 0.0, NodeRole::Hub, None);
        let peers = (0..6)
            .map(|i| {
                let theta = i as f32 / 6.0 * std::f32::consts::TAU;
                rig.add(3.0 * theta.cos(), 3.0 * theta.sin(), NodeRole::Peer, None)
            })
            .collect();
        (rig, hub, peers)
    }

    #[test]
    fn star_runs_one_packet_per_spoke() {
        let (mut rig, _, _) = star();
        rig.step(0.016);
        assert_eq!(rig.count(|r| matches!(r, Route::Spoke { .. })), 6);
        for _ in 0..200 {
            rig.step(0.016);
            assert_eq!(rig.scheduler.len(), 6);
        }
    }

    #[test]
    fn star_arrivals_flash_peers() {
        let (mut rig, hub, peers) = star();
        rig.step(0.0);
        let mut flashed = HashSet::new();
        for _ in 0..250 {
            flashed.extend(rig.step(0.01).flashes);
        }
        assert!(!flashed.contains(&hub));
        for p in peers {
            assert!(flashed.contains(&p));
        }
    }

    #[test]
    fn star_goes_quiet_when_hub_is_off() {
        let (mut rig, hub, _) = star();
        rig.step(0.016);
        rig.graph.set_node_active(hub, false);
        rig.traversal.cascade(&rig.graph, hub);
        rig.step(0.016);
        assert!(rig.scheduler.is_empty());
    }

    // -----------------------------------------------------------------------
    // Bus
    // -----------------------------------------------------------------------

    #[test]
    fn trunk_branches_once_per_node_crossing() {
        let (mut rig, ids) = bus(&[-3.0, -1.5, 0.0, 1.5, 3.0]);
        rig.tuning.packet_count = 1;
        rig.step(0.0);

        let mut branched = Vec::new();
        // A full pass at 0.29 laps/s takes about 3.45 s.
        for _ in 0..340 {
            for e in rig.step(0.01).events {
                if let Event::BranchSpawned { node, .. } = e {
                    branched.push(node);
                }
            }
        }
        assert_eq!(branched, ids);
    }

    #[test]
    fn overlapping_zones_branch_each_node_once() {
        let (mut rig, ids) = bus(&[0.0, 0.1]);
        rig.tuning.packet_count = 1;
        rig.step(0.0);

        let mut branched = Vec::new();
        for _ in 0..340 {
            for e in rig.step(0.01).events {
                if let Event::BranchSpawned { node, .. } = e {
                    branched.push(node);
                }
            }
        }
        assert_eq!(branched, ids);
    }

    #[test]
    fn large_trunk_step_still_branches() {
        let (mut rig, ids) = bus(&[-3.0, -1.5, 0.0]);
        rig.tuning.packet_count = 1;
        rig.tuning.packet_speed = 3.0;
        rig.step(0.0);
        let out = rig.step(0.1); // x sweeps -4.0 -> -1.6
        let branched: Vec<NodeId> = out
            .events
            .iter()
            .filter_map(|e| match e {
                Event::BranchSpawned { node, .. } => Some(*node),
                _ => None,
            })
            .collect();
        assert_eq!(branched, ids[..2].to_vec());
    }

    #[test]
    fn branch_lands_on_node_position() {
        let (mut rig, ids) = bus(&[-3.9]);
        rig.tuning.packet_count = 1;
        rig.step(0.0);
        rig.step(0.01);
        let branch = rig
            .scheduler
            .iter()
            .find(|(_, p)| matches!(p.route, Route::Branch { .. }))
            .map(|(id, _)| id)
            .unwrap();
        let mut landed = None;
        for _ in 0..100 {
            let out = rig.step(0.01);
            if out.flashes.contains(&ids[0]) {
                landed = Some(rig.graph.node(ids[0]).unwrap().position);
                break;
            }
            let p = rig.scheduler.get(branch).unwrap();
            assert_eq!(p.phase, PacketPhase::Branching);
        }
        assert_eq!(landed, Some(Point3::planar(-3.9, 0.8)));
        assert!(rig.scheduler.get(branch).is_none());

        let arrived = Packet {
            route: Route::Branch {
                edge: rig.graph.incident_edges(ids[0])[0],
                node: ids[0],
                origin: Point3::planar(-3.85, 0.0),
            },
            phase: PacketPhase::Branching,
            progress: 1.0,
            speed: 1.2,
            spawned_at: 0.0,
            release_at: 0.0,
        };
        assert_eq!(arrived.position(&rig.graph), Some(Point3::planar(-3.9, 0.8)));
    }

    #[test]
    fn cut_medium_stops_all_bus_traffic() {
        let (mut rig, _) = bus(&[-3.0, 0.0, 3.0]);
        for _ in 0..30 {
            rig.step(0.016);
        }
        assert!(!rig.scheduler.is_empty());
        rig.graph.set_bus_cut(true);
        rig.traversal.propagate(&rig.graph);
        for _ in 0..30 {
            let out = rig.step(0.016);
            assert!(out.flashes.is_empty());
            assert!(rig.scheduler.is_empty());
        }
    }

    #[test]
    fn inactive_bus_node_gets_no_branch() {
        let (mut rig, ids) = bus(&[-3.0, 0.0]);
        rig.tuning.packet_count = 1;
        rig.graph.set_node_active(ids[0], false);
        rig.traversal.cascade(&rig.graph, ids[0]);
        rig.step(0.0);
        let mut branched = Vec::new();
        for _ in 0..200 {
            for e in rig.step(0.01).events {
                if let Event::BranchSpawned { node, .. } = e {
                    branched.push(node);
                }
            }
        }
        assert_eq!(branched, vec![ids[1]]);
    }

    // -----------------------------------------------------------------------
    // Tree and mesh
    // -----------------------------------------------------------------------

    #[test]
    fn tree_spawns_staggered_children() {
        let mut rig = Rig::new(TopologyKind::Tree);
        let r = rig.add(0.0, 2.5, NodeRole::Parent, None);
        let c1 = rig.add(-2.0, 0.8, NodeRole::Parent, Some(r));
        let c2 = rig.add(2.0, 0.8, NodeRole::Parent, Some(r));
        rig.step(0.01);

        let from_root: Vec<&Packet> = rig
            .scheduler
            .iter()
            .map(|(_, p)| p)
            .filter(|p| matches!(p.route, Route::Segment { from, .. } if from == r))
            .collect();
        assert_eq!(from_root.len(), 2);
        let mut releases: Vec<(NodeId, f64)> = from_root
            .iter()
            .map(|p| match p.route {
                Route::Segment { to, .. } => (to, p.release_at),
                _ => unreachable!(),
            })
            .collect();
        releases.sort_by(|a, b| a.1.total_cmp(&b.1));
        assert_eq!(releases[0].0, c1);
        assert_eq!(releases[1].0, c2);
        assert!((releases[1].1 - releases[0].1 - 0.15).abs() < 1e-9);
    }

    #[test]
    fn tree_waits_for_packets_in_flight() {
        let mut rig = Rig::new(TopologyKind::Tree);
        let r = rig.add(0.0, 2.5, NodeRole::Parent, None);
        rig.add(-2.0, 0.8, NodeRole::Parent, Some(r));
        rig.step(0.01);
        assert_eq!(rig.scheduler.len(), 1);
        // Next check at 0.5 s; the packet needs about 1.43 s to arrive.
        for _ in 0..60 {
            rig.step(0.01);
        }
        assert_eq!(rig.scheduler.len(), 1);
    }

    #[test]
    fn mesh_skips_dead_links() {
        let mut rig = Rig::new(TopologyKind::Mesh);
        let a = rig.add(0.0, 3.0, NodeRole::Peer, None);
        let b = rig.add(3.0, 1.0, NodeRole::Peer, None);
        rig.add(2.0, -2.6, NodeRole::Peer, None);
        let ab = rig.graph.edge_between(a, b).unwrap();
        rig.graph.set_edge_active(ab, false);
        rig.traversal.propagate(&rig.graph);

        rig.step(0.01);
        // Two live links, one packet each way.
        assert_eq!(rig.scheduler.len(), 4);
        assert_eq!(
            rig.count(|r| matches!(r, Route::Segment { edge, .. } if *edge == ab)),
            0
        );
    }

    #[test]
    fn unreleased_packets_hold_still() {
        let mut rig = Rig::new(TopologyKind::Mesh);
        rig.add(0.0, 3.0, NodeRole::Peer, None);
        rig.add(3.0, 1.0, NodeRole::Peer, None);
        rig.add(2.0, -2.6, NodeRole::Peer, None);
        rig.step(0.01);
        rig.step(0.01);
        for (_, p) in rig.scheduler.iter() {
            if p.release_at > 0.02 {
                assert_eq!(p.progress, 0.0);
            }
        }
        assert!(rig.scheduler.released(0.02).count() < rig.scheduler.len());
    }

    #[test]
    fn purge_drops_packets_on_removed_nodes() {
        let mut rig = Rig::new(TopologyKind::Mesh);
        let a = rig.add(0.0, 3.0, NodeRole::Peer, None);
        rig.add(3.0, 1.0, NodeRole::Peer, None);
        rig.add(2.0, -2.6, NodeRole::Peer, None);
        rig.step(0.01);
        assert_eq!(rig.scheduler.len(), 6);

        let removed = rig.graph.remove_node(a);
        let mut events = Vec::new();
        let purged = rig.scheduler.purge(&removed, rig.tick, &rig.filter, &mut events);
        assert_eq!(purged, 4);
        assert_eq!(events.len(), 4);
        assert_eq!(rig.scheduler.len(), 2);
    }

    #[test]
    fn segment_progress_is_monotonic() {
        let mut rig = Rig::new(TopologyKind::Mesh);
        rig.add(0.0, 3.0, NodeRole::Peer, None);
        rig.add(3.0, 1.0, NodeRole::Peer, None);
        rig.step(0.01);
        let mut last: std::collections::HashMap<PacketId, f32> = Default::default();
        for _ in 0..300 {
            rig.step(0.016);
            for (id, p) in rig.scheduler.iter() {
                if let Some(prev) = last.insert(id, p.progress) {
                    assert!(p.progress >= prev);
                }
            }
        }
    }
}
