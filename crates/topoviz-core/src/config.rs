//! Engine configuration.
//!
//! Every field has a default, so a configuration file only needs to name the
//! values it overrides. The defaults reproduce the classic classroom demo:
//! speeds are in normalized progress per second, durations in seconds.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geom::Point3;
use crate::sim::SimulationStrategy;
use crate::topology::TopologyKind;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Configuration values the engine cannot run with.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{topology} bounds {bounds:?} are empty or not finite")]
    InvalidBounds {
        topology: TopologyKind,
        bounds: Bounds,
    },

    #[error("max_frame_delta must be finite and positive, got {value}")]
    InvalidFrameDelta { value: f64 },

    #[error("fixed step must be finite and positive, got {step}")]
    InvalidStep { step: f64 },
}

// ---------------------------------------------------------------------------
// Bounds
// ---------------------------------------------------------------------------

/// The region node positions are clamped into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bounds {
    /// Axis-aligned box.
    Box { min: Point3, max: Point3 },
    /// A shared medium running along the x axis from `-half_length` to
    /// `half_length` at y = z = 0. Nodes slide along it; their offset from
    /// the line is fixed when they are created.
    Line { half_length: f32 },
}

impl Bounds {
    /// The box used by every topology without a shared medium.
    pub fn default_box() -> Self {
        Bounds::Box {
            min: Point3::new(-8.0, -6.0, -2.0),
            max: Point3::new(8.0, 6.0, 2.0),
        }
    }

    /// Whether every limit is finite and the region is non-empty.
    pub fn is_valid(&self) -> bool {
        match *self {
            Bounds::Box { min, max } => [(min.x, max.x), (min.y, max.y), (min.z, max.z)]
                .into_iter()
                .all(|(lo, hi)| lo.is_finite() && hi.is_finite() && lo <= hi),
            Bounds::Line { half_length } => half_length.is_finite() && half_length >= 0.0,
        }
    }

    /// Clamp a position for a newly created node.
    ///
    /// Never panics, even on bounds that fail [`Bounds::is_valid`]; the
    /// result is then merely unspecified.
    pub fn clamp(&self, p: Point3) -> Point3 {
        match *self {
            Bounds::Box { min, max } => Point3 {
                x: limit(p.x, min.x, max.x),
                y: limit(p.y, min.y, max.y),
                z: limit(p.z, min.z, max.z),
            },
            Bounds::Line { half_length } => Point3 {
                x: limit(p.x, -half_length, half_length),
                ..p
            },
        }
    }

    /// Clamp a move request. On a line only the coordinate along the line
    /// changes.
    pub fn clamp_move(&self, current: Point3, requested: Point3) -> Point3 {
        match *self {
            Bounds::Box { .. } => self.clamp(requested),
            Bounds::Line { half_length } => Point3 {
                x: limit(requested.x, -half_length, half_length),
                ..current
            },
        }
    }

    /// The medium endpoints, if these bounds describe a shared line.
    pub fn medium(&self) -> Option<(Point3, Point3)> {
        match *self {
            Bounds::Line { half_length } => Some((
                Point3::planar(-half_length, 0.0),
                Point3::planar(half_length, 0.0),
            )),
            Bounds::Box { .. } => None,
        }
    }
}

/// `f32::clamp` without the `lo <= hi` assertion.
fn limit(v: f32, lo: f32, hi: f32) -> f32 {
    v.max(lo).min(hi)
}

// ---------------------------------------------------------------------------
// Flash profile
// ---------------------------------------------------------------------------

/// Emission intensities for node flashes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlashProfile {
    /// Resting intensity of an active node.
    pub baseline: f32,
    /// Intensity while a flash is live.
    pub peak: f32,
    /// Intensity of an inactive node.
    pub dimmed: f32,
    /// How long a flash lasts, in seconds.
    pub duration: f64,
}

// ---------------------------------------------------------------------------
// Per-topology tuning
// ---------------------------------------------------------------------------

/// Tunable constants for one topology. Fields a topology does not use are
/// ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyTuning {
    /// Packet speed in normalized progress per second. For ring loops and
    /// bus trunks this is laps per second.
    pub packet_speed: f32,
    /// Speed of bus branch packets.
    pub branch_speed: f32,
    /// Number of ambient loop packets (ring, bus).
    pub packet_count: usize,
    /// Seconds between spawn checks (tree, mesh).
    pub spawn_interval: f64,
    /// Release delay between sibling packets spawned in the same check.
    pub stagger: f64,
    /// Bus proximity threshold along the line.
    pub proximity: f32,
    /// Distance of bus nodes from the line.
    pub tap_offset: f32,
    /// Horizontal offset of a second tree child from its parent.
    pub child_spacing: f32,
    /// Vertical drop from a tree parent to its children.
    pub level_drop: f32,
    /// Maximum number of children a tree node may get through add-node.
    pub max_children: usize,
    /// Region node positions are clamped into.
    pub bounds: Bounds,
    pub flash: FlashProfile,
}

impl TopologyTuning {
    pub fn star() -> Self {
        Self {
            packet_speed: 0.5,
            packet_count: 1,
            flash: FlashProfile {
                baseline: 0.2,
                peak: 2.0,
                dimmed: 0.08,
                duration: 0.3,
            },
            ..Self::common()
        }
    }

    pub fn ring() -> Self {
        Self {
            packet_speed: 0.32,
            packet_count: 2,
            flash: FlashProfile {
                baseline: 0.13,
                peak: 1.1,
                dimmed: 0.08,
                duration: 0.3,
            },
            ..Self::common()
        }
    }

    pub fn bus() -> Self {
        Self {
            packet_speed: 0.29,
            branch_speed: 1.2,
            packet_count: 2,
            proximity: 0.14,
            tap_offset: 0.8,
            bounds: Bounds::Line { half_length: 4.0 },
            flash: FlashProfile {
                baseline: 0.13,
                peak: 1.1,
                dimmed: 0.03,
                duration: 0.32,
            },
            ..Self::common()
        }
    }

    pub fn tree() -> Self {
        Self {
            packet_speed: 0.7,
            spawn_interval: 0.5,
            stagger: 0.15,
            child_spacing: 2.1,
            level_drop: 2.0,
            max_children: 2,
            flash: FlashProfile {
                baseline: 0.18,
                peak: 0.67,
                dimmed: 0.02,
                duration: 0.25,
            },
            ..Self::common()
        }
    }

    pub fn mesh() -> Self {
        Self {
            packet_speed: 0.7,
            spawn_interval: 2.2,
            stagger: 0.08,
            flash: FlashProfile {
                baseline: 0.2,
                peak: 0.8,
                dimmed: 0.06,
                duration: 0.25,
            },
            ..Self::common()
        }
    }

    pub fn for_kind(kind: TopologyKind) -> Self {
        match kind {
            TopologyKind::Star => Self::star(),
            TopologyKind::Ring => Self::ring(),
            TopologyKind::Bus => Self::bus(),
            TopologyKind::Tree => Self::tree(),
            TopologyKind::Mesh => Self::mesh(),
        }
    }

    fn common() -> Self {
        Self {
            packet_speed: 0.5,
            branch_speed: 1.2,
            packet_count: 2,
            spawn_interval: 1.0,
            stagger: 0.1,
            proximity: 0.14,
            tap_offset: 0.8,
            child_spacing: 2.1,
            level_drop: 2.0,
            max_children: 2,
            bounds: Bounds::default_box(),
            flash: FlashProfile {
                baseline: 0.2,
                peak: 1.0,
                dimmed: 0.05,
                duration: 0.3,
            },
        }
    }
}

impl Default for TopologyTuning {
    fn default() -> Self {
        Self::common()
    }
}

// ---------------------------------------------------------------------------
// Engine configuration
// ---------------------------------------------------------------------------

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub simulation: SimulationStrategy,
    /// Upper bound on a single variable-mode step, in seconds. Keeps a
    /// backgrounded tab from teleporting every packet on resume.
    #[serde(default = "default_max_frame_delta")]
    pub max_frame_delta: f64,
    /// Seed for the deterministic RNG.
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "TopologyTuning::star")]
    pub star: TopologyTuning,
    #[serde(default = "TopologyTuning::ring")]
    pub ring: TopologyTuning,
    #[serde(default = "TopologyTuning::bus")]
    pub bus: TopologyTuning,
    #[serde(default = "TopologyTuning::tree")]
    pub tree: TopologyTuning,
    #[serde(default = "TopologyTuning::mesh")]
    pub mesh: TopologyTuning,
}

fn default_max_frame_delta() -> f64 {
    0.1
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationStrategy::default(),
            max_frame_delta: default_max_frame_delta(),
            seed: 0,
            star: TopologyTuning::star(),
            ring: TopologyTuning::ring(),
            bus: TopologyTuning::bus(),
            tree: TopologyTuning::tree(),
            mesh: TopologyTuning::mesh(),
        }
    }
}

impl EngineConfig {
    /// The tuning block for a topology.
    pub fn tuning(&self, kind: TopologyKind) -> &TopologyTuning {
        match kind {
            TopologyKind::Star => &self.star,
            TopologyKind::Ring => &self.ring,
            TopologyKind::Bus => &self.bus,
            TopologyKind::Tree => &self.tree,
            TopologyKind::Mesh => &self.mesh,
        }
    }

    /// Check the values the engine would otherwise have to guess around.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.max_frame_delta.is_finite() && self.max_frame_delta > 0.0) {
            return Err(ConfigError::InvalidFrameDelta {
                value: self.max_frame_delta,
            });
        }
        if let SimulationStrategy::Fixed { step } = self.simulation {
            if !(step.is_finite() && step > 0.0) {
                return Err(ConfigError::InvalidStep { step });
            }
        }
        for topology in TopologyKind::ALL {
            let bounds = self.tuning(topology).bounds;
            if !bounds.is_valid() {
                return Err(ConfigError::InvalidBounds { topology, bounds });
            }
        }
        Ok(())
    }
}
