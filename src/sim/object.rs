//! Scene objects and their beam interaction rules
//!
//! Every object is a circle of radius `extent` for hit-testing. What happens
//! when a beam enters that circle depends on the variant in [`ObjectKind`].

use glam::Vec2;
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use super::beam::{Beam, Color};
use super::intersect::{ray_mirror_intersection, reflect_angle};
use super::protocol::{Control, Toggle, add_link, remove_link};
use crate::consts::MIN_EXTENT;
use crate::settings::Settings;
use crate::wrap_angle;

new_key_type! {
    /// Stable handle of an object inside its world
    pub struct ObjectId;
}

/// Control links an object gave up in [`WorldObject::cleanup`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detached {
    /// Controller that was driving this toggle
    pub controller: Option<ObjectId>,
    /// Toggles this controller was driving
    pub controlled: Vec<ObjectId>,
}

/// Kinds of object the factory can create
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    Emitter,
    Detector,
    /// Blocker that turns opaque when switched on
    OpaqueBlock,
    /// Blocker that turns transparent when switched on
    TransparentBlock,
    Mirror,
    Clock,
    Label,
}

impl ObjectType {
    pub const ALL: [ObjectType; 7] = [
        ObjectType::Emitter,
        ObjectType::Detector,
        ObjectType::OpaqueBlock,
        ObjectType::TransparentBlock,
        ObjectType::Mirror,
        ObjectType::Clock,
        ObjectType::Label,
    ];
}

/// Beam source; toggling it switches emission
#[derive(Debug, Clone, PartialEq)]
pub struct Emitter {
    pub emitting: bool,
    pub color: Color,
    controller: Option<ObjectId>,
}

impl Emitter {
    pub fn new(emitting: bool, color: Color) -> Self {
        Self {
            emitting,
            color,
            controller: None,
        }
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new(true, Color::RED)
    }
}

impl Toggle for Emitter {
    fn controller(&self) -> Option<ObjectId> {
        self.controller
    }

    fn claim(&mut self, controller: ObjectId) -> Option<ObjectId> {
        self.controller.replace(controller)
    }

    fn disown(&mut self) {
        self.controller = None;
    }

    fn is_on(&self) -> bool {
        self.emitting
    }

    fn set_toggle(&mut self, on: bool) -> bool {
        let changed = self.emitting != on;
        self.emitting = on;
        changed
    }
}

/// Switchable obstacle
#[derive(Debug, Clone, PartialEq)]
pub struct Blocker {
    /// Whether an "on" signal makes the blocker opaque
    pub on_is_opaque: bool,
    pub opaque: bool,
    controller: Option<ObjectId>,
}

impl Blocker {
    /// A blocker starts in its "off" state
    pub fn new(on_is_opaque: bool) -> Self {
        Self::with_state(on_is_opaque, !on_is_opaque)
    }

    pub fn with_state(on_is_opaque: bool, opaque: bool) -> Self {
        Self {
            on_is_opaque,
            opaque,
            controller: None,
        }
    }
}

impl Toggle for Blocker {
    fn controller(&self) -> Option<ObjectId> {
        self.controller
    }

    fn claim(&mut self, controller: ObjectId) -> Option<ObjectId> {
        self.controller.replace(controller)
    }

    fn disown(&mut self) {
        self.controller = None;
    }

    fn is_on(&self) -> bool {
        self.opaque == self.on_is_opaque
    }

    fn set_toggle(&mut self, on: bool) -> bool {
        let opaque = if self.on_is_opaque { on } else { !on };
        let changed = self.opaque != opaque;
        self.opaque = opaque;
        changed
    }
}

/// Reports whether any beam reached it this cycle
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Detector {
    pub struck: bool,
    controlled: Vec<ObjectId>,
}

impl Detector {
    pub fn new(struck: bool) -> Self {
        Self {
            struck,
            controlled: Vec::new(),
        }
    }
}

impl Control for Detector {
    fn controlled(&self) -> &[ObjectId] {
        &self.controlled
    }

    fn control(&mut self, target: ObjectId) {
        add_link(&mut self.controlled, target);
    }

    fn release(&mut self, target: ObjectId) -> bool {
        remove_link(&mut self.controlled, target)
    }

    fn signal(&self) -> bool {
        self.struck
    }
}

/// Tick rate bucket of a clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ClockRate {
    /// Not ticking
    Off,
    Slow,
    #[default]
    Regular,
    Fast,
    Extreme,
}

impl ClockRate {
    /// Rates that belong to a driver bucket, slowest first
    pub const TICKING: [ClockRate; 4] = [
        ClockRate::Slow,
        ClockRate::Regular,
        ClockRate::Fast,
        ClockRate::Extreme,
    ];

    /// The bucket flips on every n-th driver tick
    pub fn period_ticks(self) -> Option<u64> {
        match self {
            ClockRate::Off => None,
            ClockRate::Slow => Some(4),
            ClockRate::Regular => Some(3),
            ClockRate::Fast => Some(2),
            ClockRate::Extreme => Some(1),
        }
    }

    /// Bucket slot in the driver tables
    pub fn bucket(self) -> Option<usize> {
        match self {
            ClockRate::Off => None,
            ClockRate::Slow => Some(0),
            ClockRate::Regular => Some(1),
            ClockRate::Fast => Some(2),
            ClockRate::Extreme => Some(3),
        }
    }
}

/// Periodic signal source, flipped by the clock driver
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Clock {
    pub rate: ClockRate,
    pub active: bool,
    controlled: Vec<ObjectId>,
}

impl Clock {
    pub fn new(rate: ClockRate, active: bool) -> Self {
        Self {
            rate,
            active,
            controlled: Vec::new(),
        }
    }

    pub fn tick(&mut self, phase: bool) {
        self.active = phase;
    }
}

impl Control for Clock {
    fn controlled(&self) -> &[ObjectId] {
        &self.controlled
    }

    fn control(&mut self, target: ObjectId) {
        add_link(&mut self.controlled, target);
    }

    fn release(&mut self, target: ObjectId) -> bool {
        remove_link(&mut self.controlled, target)
    }

    fn signal(&self) -> bool {
        self.active
    }
}

/// Text annotation
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub text: String,
    pub color: Color,
}

impl Default for Label {
    fn default() -> Self {
        Self {
            text: String::new(),
            color: Color::CYAN,
        }
    }
}

/// Variant data of a world object
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    Emitter(Emitter),
    Mirror,
    Blocker(Blocker),
    Detector(Detector),
    Clock(Clock),
    Label(Label),
}

/// A scene object
#[derive(Debug, Clone, PartialEq)]
pub struct WorldObject {
    pos: Vec2,
    angle: f32,
    extent: f32,
    kind: ObjectKind,
}

impl WorldObject {
    /// Factory keyed on object type
    pub fn new(object_type: ObjectType, pos: Vec2, settings: &Settings) -> Self {
        let (kind, extent) = match object_type {
            ObjectType::Emitter => (ObjectKind::Emitter(Emitter::default()), settings.default_extent),
            ObjectType::Detector => (
                ObjectKind::Detector(Detector::default()),
                settings.default_extent,
            ),
            ObjectType::OpaqueBlock => (ObjectKind::Blocker(Blocker::new(true)), settings.default_extent),
            ObjectType::TransparentBlock => (
                ObjectKind::Blocker(Blocker::new(false)),
                settings.default_extent,
            ),
            ObjectType::Mirror => (ObjectKind::Mirror, settings.mirror_extent),
            ObjectType::Clock => (ObjectKind::Clock(Clock::default()), settings.default_extent),
            ObjectType::Label => (ObjectKind::Label(Label::default()), settings.label_extent),
        };
        Self::from_parts(pos, 0.0, extent, kind)
    }

    pub fn from_parts(pos: Vec2, angle: f32, extent: f32, kind: ObjectKind) -> Self {
        Self {
            pos,
            angle: wrap_angle(angle),
            extent: extent.max(MIN_EXTENT),
            kind,
        }
    }

    pub fn position(&self) -> Vec2 {
        self.pos
    }

    pub fn set_position(&mut self, pos: Vec2) {
        self.pos = pos;
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn set_angle(&mut self, angle: f32) {
        self.angle = wrap_angle(angle);
    }

    pub fn extent(&self) -> f32 {
        self.extent
    }

    pub fn set_extent(&mut self, extent: f32) {
        self.extent = extent.max(MIN_EXTENT);
    }

    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut ObjectKind {
        &mut self.kind
    }

    pub fn object_type(&self) -> ObjectType {
        match &self.kind {
            ObjectKind::Emitter(_) => ObjectType::Emitter,
            ObjectKind::Mirror => ObjectType::Mirror,
            ObjectKind::Blocker(b) if b.on_is_opaque => ObjectType::OpaqueBlock,
            ObjectKind::Blocker(_) => ObjectType::TransparentBlock,
            ObjectKind::Detector(_) => ObjectType::Detector,
            ObjectKind::Clock(_) => ObjectType::Clock,
            ObjectKind::Label(_) => ObjectType::Label,
        }
    }

    pub fn as_toggle(&self) -> Option<&dyn Toggle> {
        match &self.kind {
            ObjectKind::Emitter(e) => Some(e),
            ObjectKind::Blocker(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_toggle_mut(&mut self) -> Option<&mut dyn Toggle> {
        match &mut self.kind {
            ObjectKind::Emitter(e) => Some(e),
            ObjectKind::Blocker(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_control(&self) -> Option<&dyn Control> {
        match &self.kind {
            ObjectKind::Detector(d) => Some(d),
            ObjectKind::Clock(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_control_mut(&mut self) -> Option<&mut dyn Control> {
        match &mut self.kind {
            ObjectKind::Detector(d) => Some(d),
            ObjectKind::Clock(c) => Some(c),
            _ => None,
        }
    }

    /// Start of a settlement cycle: reset per-cycle state and emit a fresh
    /// root beam if this object is currently emitting.
    pub fn unsettled(&mut self) -> Option<Beam> {
        match &mut self.kind {
            ObjectKind::Emitter(e) if e.emitting => {
                let rim = self.pos + crate::direction(self.angle) * self.extent;
                Some(Beam::new(self.angle, rim, e.color))
            }
            ObjectKind::Detector(d) => {
                d.struck = false;
                None
            }
            _ => None,
        }
    }

    /// A traced beam entered this object's extent.
    ///
    /// Resolving the beam means setting `beam.distance`; a returned beam is
    /// the reflected continuation starting where this one ends.
    pub fn strike(&mut self, beam: &mut Beam) -> Option<Beam> {
        match &mut self.kind {
            ObjectKind::Mirror => {
                let hit = ray_mirror_intersection(
                    beam.origin,
                    beam.angle,
                    self.pos,
                    self.angle,
                    self.extent,
                )?;
                beam.distance = hit.distance;
                Some(Beam::new(
                    reflect_angle(beam.angle, self.angle),
                    hit.point,
                    beam.color,
                ))
            }
            ObjectKind::Blocker(b) => {
                if b.opaque {
                    absorb(beam, self.pos);
                }
                None
            }
            ObjectKind::Detector(d) => {
                d.struck = true;
                absorb(beam, self.pos);
                None
            }
            ObjectKind::Emitter(_) | ObjectKind::Clock(_) => {
                absorb(beam, self.pos);
                None
            }
            ObjectKind::Label(_) => None,
        }
    }

    /// End of a settlement cycle: the signal a controller pushes and the
    /// toggles that receive it. `None` for objects that control nothing.
    pub fn settled(&self) -> Option<(bool, &[ObjectId])> {
        self.as_control().map(|c| (c.signal(), c.controlled()))
    }

    /// Drop every control link this object holds and report them, so the
    /// owning world can fix up the other ends
    pub fn cleanup(&mut self) -> Detached {
        let controller = self.as_toggle_mut().and_then(|toggle| {
            let owner = toggle.controller();
            toggle.disown();
            owner
        });
        let controlled = match &mut self.kind {
            ObjectKind::Detector(d) => std::mem::take(&mut d.controlled),
            ObjectKind::Clock(c) => std::mem::take(&mut c.controlled),
            _ => Vec::new(),
        };
        Detached {
            controller,
            controlled,
        }
    }

    /// Copy without control links in either direction
    pub fn duplicate(&self) -> Self {
        let mut copy = self.clone();
        copy.cleanup();
        copy
    }
}

/// Stop `beam` at an object's center.
/// A resolved beam never has zero length, even when it starts on the center.
fn absorb(beam: &mut Beam, center: Vec2) {
    beam.distance = beam.origin.distance(center).max(f32::EPSILON);
}
