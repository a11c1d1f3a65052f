//! Beam segments and paths

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::ObjectId;
use crate::direction;

/// 24-bit RGB colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const GREEN: Color = Color::rgb(0, 255, 0);
    pub const BLUE: Color = Color::rgb(0, 0, 255);
    pub const CYAN: Color = Color::rgb(0, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// One straight segment of a beam.
///
/// `distance` stays 0 until tracing resolves it; a resolved segment always
/// has a positive distance no larger than the trace bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Beam {
    /// Travel direction (radians)
    pub angle: f32,
    /// Start point of the segment
    pub origin: Vec2,
    pub color: Color,
    /// Length of the segment once traced
    pub distance: f32,
    /// Object that emitted or reflected this segment; never struck by it
    pub source: Option<ObjectId>,
}

impl Beam {
    pub fn new(angle: f32, origin: Vec2, color: Color) -> Self {
        Self {
            angle,
            origin,
            color,
            distance: 0.0,
            source: None,
        }
    }

    #[inline]
    pub fn direction(&self) -> Vec2 {
        direction(self.angle)
    }

    /// Point `t` units along the segment
    #[inline]
    pub fn point_at(&self, t: f32) -> Vec2 {
        self.origin + self.direction() * t
    }

    /// Far end of the segment (only meaningful once resolved)
    pub fn end(&self) -> Vec2 {
        self.point_at(self.distance)
    }

    pub fn is_resolved(&self) -> bool {
        self.distance > 0.0
    }
}

/// A full beam: the emitted root segment followed by every reflection
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BeamPath {
    pub segments: Vec<Beam>,
}

impl BeamPath {
    pub fn new(root: Beam) -> Self {
        Self {
            segments: vec![root],
        }
    }

    pub fn root(&self) -> Option<&Beam> {
        self.segments.first()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Sum of all segment lengths
    pub fn total_length(&self) -> f32 {
        self.segments.iter().map(|s| s.distance).sum()
    }

    /// Where the beam finally stops (or leaves the traced area)
    pub fn terminus(&self) -> Option<Vec2> {
        self.segments.last().map(Beam::end)
    }
}
