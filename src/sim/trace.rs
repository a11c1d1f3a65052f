//! Beam propagation
//!
//! Marches each segment outward in fixed steps, asking the spatial index
//! which object is closest to the sample point. An object reacts when the
//! sample lies within its extent, so the step must not exceed the smallest
//! extent.

use slotmap::SlotMap;

use super::ObjectId;
use super::beam::{Beam, BeamPath};
use super::index::SpatialIndex;
use super::object::WorldObject;

/// Limits for one tracing pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceParams {
    /// Longest any segment may travel
    pub max_distance: f32,
    /// Distance between samples
    pub step: f32,
    /// Segments per path before the path is cut off
    pub max_segments: usize,
}

/// Follow `root` and every reflection it produces.
///
/// Every returned segment is resolved: `0 < distance <= max_distance`.
pub fn trace(
    root: Beam,
    objects: &mut SlotMap<ObjectId, WorldObject>,
    index: &SpatialIndex<ObjectId>,
    params: &TraceParams,
) -> BeamPath {
    let mut path = BeamPath::default();
    let mut next = Some(root);

    while let Some(mut beam) = next.take() {
        if path.len() >= params.max_segments {
            log::debug!(
                "Beam path cut off after {} segments at {:?}",
                path.len(),
                beam.origin
            );
            break;
        }
        beam.distance = 0.0;
        next = march(&mut beam, objects, index, params);
        path.segments.push(beam);
    }

    path
}

/// Trace a single segment; returns the reflected continuation, if any
fn march(
    beam: &mut Beam,
    objects: &mut SlotMap<ObjectId, WorldObject>,
    index: &SpatialIndex<ObjectId>,
    params: &TraceParams,
) -> Option<Beam> {
    let dir = beam.direction();
    let steps = (params.max_distance / params.step).ceil() as usize;
    let mut child = None;

    for i in 0..steps {
        let sample = beam.origin + dir * (i as f32 * params.step);
        let Some(nearest) = index.nearest(sample) else {
            break;
        };

        if Some(nearest.value) != beam.source {
            if let Some(obj) = objects.get_mut(nearest.value) {
                if nearest.distance <= obj.extent() {
                    if let Some(mut reflected) = obj.strike(beam) {
                        reflected.source = Some(nearest.value);
                        child = Some(reflected);
                    }
                }
            }
        }

        if beam.is_resolved() {
            break;
        }
    }

    if beam.is_resolved() {
        beam.distance = beam.distance.min(params.max_distance);
    } else {
        // Nothing caught it: the beam leaves the traced area
        beam.distance = params.max_distance;
    }
    child
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use crate::sim::beam::Color;
    use crate::sim::object::ObjectType;
    use glam::Vec2;
    use proptest::prelude::*;
    use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, TAU};

    struct Scene {
        objects: SlotMap<ObjectId, WorldObject>,
        index: SpatialIndex<ObjectId>,
    }

    impl Scene {
        fn new(items: &[(ObjectType, Vec2, f32)]) -> (Self, Vec<ObjectId>) {
            let settings = Settings::default();
            let mut objects = SlotMap::with_key();
            let ids: Vec<ObjectId> = items
                .iter()
                .map(|&(t, pos, angle)| {
                    let mut obj = WorldObject::new(t, pos, &settings);
                    obj.set_angle(angle);
                    objects.insert(obj)
                })
                .collect();
            let index = SpatialIndex::build(objects.iter().map(|(id, o)| (o.position(), id)));
            (Self { objects, index }, ids)
        }
    }

    fn params(max_distance: f32) -> TraceParams {
        TraceParams {
            max_distance,
            step: 3.0,
            max_segments: 64,
        }
    }

    fn emit(scene: &mut Scene, id: ObjectId) -> Beam {
        let mut beam = scene.objects[id].unsettled().unwrap();
        beam.source = Some(id);
        beam
    }

    #[test]
    fn test_beam_into_empty_space_uses_max_distance() {
        let (mut scene, ids) = Scene::new(&[(ObjectType::Emitter, Vec2::ZERO, 0.0)]);
        let root = emit(&mut scene, ids[0]);
        let path = trace(root, &mut scene.objects, &scene.index, &params(500.0));
        assert_eq!(path.len(), 1);
        assert_eq!(path.segments[0].distance, 500.0);
    }

    #[test]
    fn test_self_hit_excluded() {
        // The first sample sits on the emitter's own rim
        let (mut scene, ids) = Scene::new(&[
            (ObjectType::Emitter, Vec2::ZERO, 0.0),
            (ObjectType::Detector, Vec2::new(60.0, 0.0), 0.0),
        ]);
        let root = emit(&mut scene, ids[0]);
        let path = trace(root, &mut scene.objects, &scene.index, &params(500.0));
        assert_eq!(path.len(), 1);
        // Rim at x=10, detector center at x=60
        assert!((path.segments[0].distance - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_mirror_chain_to_detector() {
        let (mut scene, ids) = Scene::new(&[
            (ObjectType::Emitter, Vec2::ZERO, 0.0),
            (ObjectType::Mirror, Vec2::new(100.0, 0.0), FRAC_PI_4),
            (ObjectType::Detector, Vec2::new(100.0, 100.0), 0.0),
        ]);
        let root = emit(&mut scene, ids[0]);
        let path = trace(root, &mut scene.objects, &scene.index, &params(1000.0));

        assert_eq!(path.len(), 2);
        assert!((path.segments[0].distance - 90.0).abs() < 1e-3);
        assert!((path.segments[1].angle - FRAC_PI_2).abs() < 1e-4);
        assert_eq!(path.segments[1].source, Some(ids[1]));
        assert!((path.segments[1].distance - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_transparent_blocker_passes_beam() {
        let (mut scene, ids) = Scene::new(&[
            (ObjectType::Emitter, Vec2::ZERO, 0.0),
            (ObjectType::OpaqueBlock, Vec2::new(50.0, 0.0), 0.0),
            (ObjectType::Detector, Vec2::new(150.0, 0.0), 0.0),
        ]);
        let root = emit(&mut scene, ids[0]);
        let path = trace(root, &mut scene.objects, &scene.index, &params(1000.0));
        assert!((path.segments[0].distance - 140.0).abs() < 1e-3);
    }

    #[test]
    fn test_facing_mirrors_are_cut_off() {
        // Beam bounces between two vertical mirrors forever
        let (mut scene, ids) = Scene::new(&[
            (ObjectType::Mirror, Vec2::new(-50.0, 0.0), FRAC_PI_2),
            (ObjectType::Mirror, Vec2::new(50.0, 0.0), FRAC_PI_2),
        ]);
        let mut root = Beam::new(0.0, Vec2::new(-50.0, 0.0), Color::RED);
        root.source = Some(ids[0]);
        let limits = TraceParams {
            max_segments: 10,
            ..params(1000.0)
        };
        let path = trace(root, &mut scene.objects, &scene.index, &limits);
        assert_eq!(path.len(), 10);
        assert!(path.segments.iter().all(|s| (s.distance - 100.0).abs() < 1e-2));
    }

    proptest! {
        #[test]
        fn prop_distances_bounded(
            angle in 0.0f32..TAU,
            coords in prop::collection::vec((-300.0f32..300.0, -300.0f32..300.0, 0usize..7, 0.0f32..TAU), 0..12),
        ) {
            let mut items = vec![(ObjectType::Emitter, Vec2::new(-400.0, -400.0), angle)];
            items.extend(
                coords
                    .iter()
                    .map(|&(x, y, t, a)| (ObjectType::ALL[t], Vec2::new(x, y), a)),
            );
            let (mut scene, ids) = Scene::new(&items);
            let root = emit(&mut scene, ids[0]);
            let limits = params(1200.0);
            let path = trace(root, &mut scene.objects, &scene.index, &limits);
            prop_assert!(!path.is_empty());
            prop_assert!(path.len() <= limits.max_segments);
            for segment in &path.segments {
                prop_assert!(segment.distance > 0.0);
                prop_assert!(segment.distance <= limits.max_distance);
            }
        }
    }
}
