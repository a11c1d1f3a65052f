//! Laser Logic - a beam-logic simulation engine
//!
//! Core modules:
//! - `sim`: Scene objects, spatial index, beam tracing and the settlement loop
//! - `clock`: Background driver that ticks clock objects and re-settles worlds
//! - `persistence`: Versioned JSON envelope around scene snapshots
//! - `settings`: Engine configuration

pub mod clock;
pub mod error;
pub mod persistence;
pub mod settings;
pub mod sim;

pub use clock::{ClockDriver, ClockThread, WorldId};
pub use error::{Result, SimError};
pub use settings::Settings;

use glam::Vec2;

/// Engine configuration constants
pub mod consts {
    /// Distance between beam samples while marching.
    /// Must not exceed `MIN_EXTENT` or small objects can be skipped.
    pub const TRACE_STEP: f32 = 3.0;
    /// Smallest hit radius an object may have
    pub const MIN_EXTENT: f32 = 3.0;

    /// Object hit radii
    pub const DEFAULT_EXTENT: f32 = 10.0;
    pub const MIRROR_EXTENT: f32 = 20.0;
    pub const LABEL_EXTENT: f32 = 5.0;

    /// Settlement cycles before a scene is declared oscillating
    pub const MAX_SETTLE_CYCLES: u32 = 1000;
    /// Segments per beam path (facing mirrors would otherwise bounce forever)
    pub const MAX_BEAM_SEGMENTS: usize = 256;

    /// Padding around the scene bounds when no viewport is known
    pub const TRACE_MARGIN: f32 = 250.0;

    /// Clock driver base period
    pub const CLOCK_PERIOD_MS: u64 = 250;
}

/// Wrap an angle into [0, 2π)
#[inline]
pub fn wrap_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(std::f32::consts::TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if wrapped >= std::f32::consts::TAU {
        0.0
    } else {
        wrapped
    }
}

/// Unit vector pointing along `angle`
#[inline]
pub fn direction(angle: f32) -> Vec2 {
    Vec2::new(angle.cos(), angle.sin())
}
