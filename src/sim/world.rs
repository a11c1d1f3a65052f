//! The world: object arena, spatial index and current beam paths
//!
//! Every mutator leaves the world settled. Position and membership changes
//! rebuild the spatial index first; the index is never patched.

use std::sync::{Arc, Mutex};

use glam::Vec2;
use slotmap::SlotMap;

use super::beam::{BeamPath, Color};
use super::index::{Nearest, SpatialIndex};
use super::object::{ClockRate, ObjectId, ObjectKind, ObjectType, WorldObject};
use super::settle::{SettleReport, settle};
use super::trace::TraceParams;
use crate::clock::{ClockDriver, WorldId};
use crate::error::{Result, SimError};
use crate::settings::Settings;

/// World shared between the editing thread and the clock driver
pub type SharedWorld = Arc<Mutex<World>>;

/// Axis-aligned rectangle in world coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub fn new(a: Vec2, b: Vec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Smallest rectangle containing every point, `None` if there are none
    pub fn enclosing<I: IntoIterator<Item = Vec2>>(points: I) -> Option<Self> {
        points.into_iter().fold(None, |acc: Option<Rect>, p| {
            Some(match acc {
                Some(r) => Rect {
                    min: r.min.min(p),
                    max: r.max.max(p),
                },
                None => Rect { min: p, max: p },
            })
        })
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn padded(&self, margin: f32) -> Rect {
        Rect {
            min: self.min - Vec2::splat(margin),
            max: self.max + Vec2::splat(margin),
        }
    }

    pub fn diagonal(&self) -> f32 {
        (self.max - self.min).length()
    }
}

/// Link from a world to the clock driver that ticks its clocks
#[derive(Debug)]
struct ClockLink {
    driver: ClockDriver,
    id: WorldId,
}

/// A scene and its settled beams
#[derive(Debug)]
pub struct World {
    pub(super) settings: Settings,
    pub(super) objects: SlotMap<ObjectId, WorldObject>,
    /// Insertion order; exported snapshots follow it
    pub(super) order: Vec<ObjectId>,
    pub(super) index: SpatialIndex<ObjectId>,
    pub(super) beams: Vec<BeamPath>,
    /// Toggles that changed state during the current cycle
    pub(super) invalid: Vec<ObjectId>,
    pub(super) max_distance: f32,
    viewport: Option<Rect>,
    last_settle: SettleReport,
    clocks: Option<ClockLink>,
}

impl World {
    /// A world that no clock driver ticks
    pub fn new(settings: Settings) -> Self {
        let settings = settings.validated();
        let max_distance = settings.trace_margin * 2.0;
        Self {
            settings,
            objects: SlotMap::with_key(),
            order: Vec::new(),
            index: SpatialIndex::default(),
            beams: Vec::new(),
            invalid: Vec::new(),
            max_distance,
            viewport: None,
            last_settle: SettleReport::default(),
            clocks: None,
        }
    }

    /// A shared world whose clocks are ticked by `driver`
    pub fn with_driver(settings: Settings, driver: &ClockDriver) -> SharedWorld {
        Arc::new_cyclic(|weak| {
            let id = driver.attach(weak.clone());
            let mut world = World::new(settings);
            world.clocks = Some(ClockLink {
                driver: driver.clone(),
                id,
            });
            Mutex::new(world)
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Id under which the clock driver knows this world
    pub fn world_id(&self) -> Option<WorldId> {
        self.clocks.as_ref().map(|link| link.id)
    }

    // === Queries ===

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    pub fn object(&self, id: ObjectId) -> Option<&WorldObject> {
        self.objects.get(id)
    }

    /// Objects in insertion order
    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, &WorldObject)> + '_ {
        self.order
            .iter()
            .filter_map(move |&id| self.objects.get(id).map(|obj| (id, obj)))
    }

    /// Settled beam paths from the last settlement run
    pub fn beam_paths(&self) -> &[BeamPath] {
        &self.beams
    }

    pub fn max_trace_distance(&self) -> f32 {
        self.max_distance
    }

    pub fn last_settle(&self) -> SettleReport {
        self.last_settle
    }

    /// Nearest object to `point`, however far away
    pub fn nearest(&self, point: Vec2) -> Option<Nearest<ObjectId>> {
        self.index.nearest(point)
    }

    /// Object whose extent contains `point` (click hit-testing)
    pub fn object_at(&self, point: Vec2) -> Option<ObjectId> {
        let hit = self.index.nearest(point)?;
        let obj = self.objects.get(hit.value)?;
        (hit.distance <= obj.extent()).then_some(hit.value)
    }

    /// Number of clocks in this world
    pub fn clock_count(&self) -> usize {
        self.objects
            .values()
            .filter(|o| matches!(o.kind(), ObjectKind::Clock(_)))
            .count()
    }

    // === Mutators ===

    /// Create an object of `object_type` at `pos`
    pub fn add_object(&mut self, object_type: ObjectType, pos: Vec2) -> Result<ObjectId> {
        let obj = WorldObject::new(object_type, finite(pos, "position")?, &self.settings);
        let id = self.insert(obj);
        self.refresh();
        Ok(id)
    }

    /// Remove an object, releasing every control link it takes part in
    pub fn remove_object(&mut self, id: ObjectId) -> Result<()> {
        self.cleanup(id)?;
        self.refresh();
        Ok(())
    }

    pub fn set_position(&mut self, id: ObjectId, pos: Vec2) -> Result<()> {
        let pos = finite(pos, "position")?;
        self.get_mut(id)?.set_position(pos);
        self.refresh();
        Ok(())
    }

    pub fn set_angle(&mut self, id: ObjectId, angle: f32) -> Result<()> {
        if !angle.is_finite() {
            return Err(SimError::NonFinite("angle"));
        }
        self.get_mut(id)?.set_angle(angle);
        self.settle();
        Ok(())
    }

    /// Make `controller` drive `target`, taking it from any previous controller
    pub fn control(&mut self, controller: ObjectId, target: ObjectId) -> Result<()> {
        self.link(controller, target)?;
        self.settle();
        Ok(())
    }

    /// Stop `controller` from driving `target`
    pub fn release(&mut self, controller: ObjectId, target: ObjectId) -> Result<()> {
        let released = self
            .get_mut(controller)?
            .as_control_mut()
            .ok_or(SimError::NotControl(controller))?
            .release(target);
        if released {
            if let Some(toggle) = self.objects.get_mut(target).and_then(|o| o.as_toggle_mut()) {
                if toggle.controller() == Some(controller) {
                    toggle.disown();
                }
            }
        }
        self.settle();
        Ok(())
    }

    /// Flip an emitter on or off by hand
    pub fn toggle_emitter(&mut self, id: ObjectId) -> Result<()> {
        match self.get_mut(id)?.kind_mut() {
            ObjectKind::Emitter(e) => e.emitting = !e.emitting,
            _ => return Err(SimError::WrongKind(id, "an emitter")),
        }
        self.settle();
        Ok(())
    }

    pub fn set_emitter_color(&mut self, id: ObjectId, color: Color) -> Result<()> {
        match self.get_mut(id)?.kind_mut() {
            ObjectKind::Emitter(e) => e.color = color,
            _ => return Err(SimError::WrongKind(id, "an emitter")),
        }
        self.settle();
        Ok(())
    }

    /// Change a label's text and colour. Labels never affect beams.
    pub fn set_label(&mut self, id: ObjectId, text: impl Into<String>, color: Color) -> Result<()> {
        match self.get_mut(id)?.kind_mut() {
            ObjectKind::Label(label) => {
                label.text = text.into();
                label.color = color;
                Ok(())
            }
            _ => Err(SimError::WrongKind(id, "a label")),
        }
    }

    /// Move a clock to another rate bucket
    pub fn set_clock_rate(&mut self, id: ObjectId, rate: ClockRate) -> Result<()> {
        let previous = match self.get_mut(id)?.kind_mut() {
            ObjectKind::Clock(clock) => std::mem::replace(&mut clock.rate, rate),
            _ => return Err(SimError::WrongKind(id, "a clock")),
        };
        if let Some(link) = &self.clocks {
            link.driver.retype(link.id, id, previous, rate);
        }
        self.settle();
        Ok(())
    }

    /// Supply the visible rectangle; beams are traced at least across it
    pub fn set_viewport(&mut self, viewport: Option<Rect>) -> Result<()> {
        if let Some(rect) = &viewport {
            finite(rect.min, "viewport")?;
            finite(rect.max, "viewport")?;
        }
        self.viewport = viewport;
        self.settle();
        Ok(())
    }

    /// Copy objects by `offset`, recreating only the control links among them.
    /// Returns the new ids in the order given.
    pub fn duplicate_objects(&mut self, ids: &[ObjectId], offset: Vec2) -> Result<Vec<ObjectId>> {
        let offset = finite(offset, "offset")?;
        let originals: Vec<&WorldObject> = ids
            .iter()
            .map(|&id| self.objects.get(id).ok_or(SimError::MissingObject(id)))
            .collect::<Result<_>>()?;

        let copies: Vec<WorldObject> = originals
            .iter()
            .map(|obj| {
                let mut copy = obj.duplicate();
                copy.set_position(obj.position() + offset);
                copy
            })
            .collect();

        let mut links = Vec::new();
        for (ci, obj) in originals.iter().enumerate() {
            if let Some(control) = obj.as_control() {
                for target in control.controlled() {
                    if let Some(ti) = ids.iter().position(|id| id == target) {
                        links.push((ci, ti));
                    }
                }
            }
        }

        let new_ids: Vec<ObjectId> = copies.into_iter().map(|obj| self.insert(obj)).collect();
        for (ci, ti) in links {
            self.link(new_ids[ci], new_ids[ti])?;
        }
        self.refresh();
        Ok(new_ids)
    }

    /// Rebuild the spatial index and settle
    pub fn refresh(&mut self) -> SettleReport {
        self.rebuild_index();
        self.settle()
    }

    /// Run the settlement loop to a fixed point (or the cycle cap)
    pub fn settle(&mut self) -> SettleReport {
        let report = settle(self);
        self.last_settle = report;
        report
    }

    // === Internals ===

    fn get_mut(&mut self, id: ObjectId) -> Result<&mut WorldObject> {
        self.objects.get_mut(id).ok_or(SimError::MissingObject(id))
    }

    pub(super) fn rebuild_index(&mut self) {
        self.index = SpatialIndex::build(
            self.order
                .iter()
                .filter_map(|&id| self.objects.get(id).map(|o| (o.position(), id))),
        );
    }

    /// Tracing limits for the current scene
    pub(super) fn trace_params(&self) -> TraceParams {
        let bounds = Rect::enclosing(self.objects.values().map(WorldObject::position));
        let area = match (bounds, self.viewport) {
            (Some(b), Some(v)) => b.union(&v),
            (None, Some(v)) => v,
            (Some(b), None) => b.padded(self.settings.trace_margin),
            (None, None) => Rect::new(Vec2::ZERO, Vec2::ZERO).padded(self.settings.trace_margin),
        };
        TraceParams {
            max_distance: area.diagonal().max(self.settings.trace_step),
            step: self.settings.trace_step,
            max_segments: self.settings.max_segments,
        }
    }

    /// Add without refreshing
    pub(super) fn insert(&mut self, obj: WorldObject) -> ObjectId {
        let rate = match obj.kind() {
            ObjectKind::Clock(clock) => Some(clock.rate),
            _ => None,
        };
        let id = self.objects.insert(obj);
        self.order.push(id);
        if let (Some(rate), Some(link)) = (rate, &self.clocks) {
            link.driver.add_clock(link.id, id, rate);
        }
        id
    }

    /// Detach an object from every link and the driver, then drop it
    pub(super) fn cleanup(&mut self, id: ObjectId) -> Result<WorldObject> {
        let mut obj = self.objects.remove(id).ok_or(SimError::MissingObject(id))?;
        self.order.retain(|&other| other != id);

        let detached = obj.cleanup();
        if let Some(owner) = detached.controller {
            if let Some(control) = self.objects.get_mut(owner).and_then(|o| o.as_control_mut()) {
                control.release(id);
            }
        }
        for target in detached.controlled {
            if let Some(toggle) = self.objects.get_mut(target).and_then(|o| o.as_toggle_mut()) {
                if toggle.controller() == Some(id) {
                    toggle.disown();
                }
            }
        }
        if let (ObjectKind::Clock(clock), Some(link)) = (obj.kind(), &self.clocks) {
            link.driver.remove_clock(link.id, id, clock.rate);
        }
        Ok(obj)
    }

    /// Remove every object
    pub(super) fn clear(&mut self) {
        for id in std::mem::take(&mut self.order) {
            if let Err(e) = self.cleanup(id) {
                log::warn!("clear: {e}");
            }
        }
    }

    /// Wire `controller` to `target` without settling
    pub(super) fn link(&mut self, controller: ObjectId, target: ObjectId) -> Result<()> {
        if self
            .objects
            .get(controller)
            .ok_or(SimError::MissingObject(controller))?
            .as_control()
            .is_none()
        {
            return Err(SimError::NotControl(controller));
        }
        let previous = self
            .get_mut(target)?
            .as_toggle_mut()
            .ok_or(SimError::NotToggle(target))?
            .claim(controller);
        if let Some(previous) = previous.filter(|&p| p != controller) {
            if let Some(old) = self.objects.get_mut(previous).and_then(|o| o.as_control_mut()) {
                old.release(target);
            }
        }
        if let Some(control) = self.objects.get_mut(controller).and_then(|o| o.as_control_mut()) {
            control.control(target);
        }
        Ok(())
    }

    /// Set a clock's phase; the driver settles afterwards
    pub(crate) fn tick_clock(&mut self, id: ObjectId, phase: bool) {
        if let Some(ObjectKind::Clock(clock)) = self.objects.get_mut(id).map(|o| o.kind_mut()) {
            clock.tick(phase);
        }
    }
}

/// Reject NaN and infinite coordinates before they reach the index
pub(super) fn finite(v: Vec2, what: &'static str) -> Result<Vec2> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(SimError::NonFinite(what))
    }
}

impl Drop for World {
    fn drop(&mut self) {
        if let Some(link) = &self.clocks {
            link.driver.detach(link.id);
        }
    }
}
