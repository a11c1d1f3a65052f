//! Ray/mirror intersection and the reflection law
//!
//! A mirror is a finite segment through its center along its angle,
//! reaching `extent` to either side. A beam is a ray from its origin.

use glam::Vec2;

use crate::{direction, wrap_angle};

/// Below this |sin| between ray and mirror the two are treated as parallel
const PARALLEL_EPSILON: f32 = 1e-6;

/// Where a ray meets a mirror segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MirrorHit {
    /// Intersection point
    pub point: Vec2,
    /// Distance from the ray origin to `point`
    pub distance: f32,
}

/// Intersect a ray with a mirror segment.
///
/// Returns `None` when the ray is parallel to the mirror, when the crossing
/// lies behind the ray origin, or when it falls outside the segment.
pub fn ray_mirror_intersection(
    ray_origin: Vec2,
    ray_angle: f32,
    mirror_center: Vec2,
    mirror_angle: f32,
    extent: f32,
) -> Option<MirrorHit> {
    let d = direction(ray_angle);
    let u = direction(mirror_angle);

    // Solve origin + t*d = center + s*u
    let denom = d.perp_dot(u);
    if denom.abs() < PARALLEL_EPSILON {
        return None;
    }
    let offset = mirror_center - ray_origin;
    let t = offset.perp_dot(u) / denom;
    let s = offset.perp_dot(d) / denom;

    if !t.is_finite() || !s.is_finite() || t <= 0.0 || s.abs() > extent {
        return None;
    }

    Some(MirrorHit {
        point: ray_origin + d * t,
        distance: t,
    })
}

/// Angle of a beam travelling at `beam_angle` after bouncing off a mirror
/// at `mirror_angle`: `2π + 2m − a`, wrapped into [0, 2π)
#[inline]
pub fn reflect_angle(beam_angle: f32, mirror_angle: f32) -> f32 {
    wrap_angle(std::f32::consts::TAU + 2.0 * mirror_angle - beam_angle)
}
