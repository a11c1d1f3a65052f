//! Bulk export and import of a world's objects and control links
//!
//! A snapshot is an ordered list of object records plus an adjacency list
//! from controller index to controlled indices. Import is all-or-nothing:
//! the snapshot is turned into detached objects and checked links first,
//! and the world is only touched once that succeeds.

use std::collections::{HashMap, HashSet};

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::beam::Color;
use super::object::{
    Blocker, Clock, ClockRate, Detector, Emitter, Label, ObjectId, ObjectKind, WorldObject,
};
use super::world::{World, finite};
use crate::error::{Result, SimError};

/// Objects and control topology of a world, in insertion order
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub objects: Vec<ObjectRecord>,
    #[serde(default)]
    pub links: Vec<LinkRecord>,
}

/// One object: type tag, placement and variant fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// `e` emitter, `d` detector, `b` blocker, `m` mirror, `c` clock, `l` label
    pub tag: String,
    pub pos: Vec2,
    #[serde(default)]
    pub angle: f32,
    pub extent: f32,
    #[serde(default)]
    pub props: Props,
}

/// Variant fields; which ones are required depends on the tag
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Props {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emitting: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_is_opaque: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opaque: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub struck: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<ClockRate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Controller index and the indices of the toggles it drives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub controller: usize,
    pub controlled: Vec<usize>,
}

/// A validated snapshot, ready to be inserted
struct Staged {
    objects: Vec<WorldObject>,
    links: Vec<(usize, usize)>,
}

fn required<T: Clone>(value: &Option<T>, tag: &str, field: &str) -> Result<T> {
    value
        .clone()
        .ok_or_else(|| SimError::Deserialization(format!("`{tag}` record is missing `{field}`")))
}

impl ObjectRecord {
    pub fn from_object(obj: &WorldObject) -> Self {
        let (tag, props) = match obj.kind() {
            ObjectKind::Emitter(e) => (
                "e",
                Props {
                    emitting: Some(e.emitting),
                    color: Some(e.color),
                    ..Default::default()
                },
            ),
            ObjectKind::Detector(d) => (
                "d",
                Props {
                    struck: Some(d.struck),
                    ..Default::default()
                },
            ),
            ObjectKind::Blocker(b) => (
                "b",
                Props {
                    on_is_opaque: Some(b.on_is_opaque),
                    opaque: Some(b.opaque),
                    ..Default::default()
                },
            ),
            ObjectKind::Mirror => ("m", Props::default()),
            ObjectKind::Clock(c) => (
                "c",
                Props {
                    rate: Some(c.rate),
                    active: Some(c.active),
                    ..Default::default()
                },
            ),
            ObjectKind::Label(l) => (
                "l",
                Props {
                    color: Some(l.color),
                    text: Some(l.text.clone()),
                    ..Default::default()
                },
            ),
        };
        Self {
            tag: tag.to_string(),
            pos: obj.position(),
            angle: obj.angle(),
            extent: obj.extent(),
            props,
        }
    }

    /// Build a detached object. Uppercase tags from older files are accepted.
    pub fn to_object(&self) -> Result<WorldObject> {
        if !self.pos.is_finite() || !self.angle.is_finite() || !self.extent.is_finite() {
            return Err(SimError::Deserialization(format!(
                "`{}` record has non-finite geometry",
                self.tag
            )));
        }
        if self.extent <= 0.0 {
            return Err(SimError::Deserialization(format!(
                "`{}` record has extent {}",
                self.tag, self.extent
            )));
        }

        let tag = self.tag.as_str();
        let p = &self.props;
        let kind = match tag {
            "e" | "E" => ObjectKind::Emitter(Emitter::new(
                required(&p.emitting, tag, "emitting")?,
                required(&p.color, tag, "color")?,
            )),
            "d" | "D" => ObjectKind::Detector(Detector::new(p.struck.unwrap_or(false))),
            "b" | "B" => ObjectKind::Blocker(Blocker::with_state(
                required(&p.on_is_opaque, tag, "on_is_opaque")?,
                required(&p.opaque, tag, "opaque")?,
            )),
            "m" | "M" => ObjectKind::Mirror,
            "c" | "C" => ObjectKind::Clock(Clock::new(
                required(&p.rate, tag, "rate")?,
                required(&p.active, tag, "active")?,
            )),
            "l" | "L" => ObjectKind::Label(Label {
                text: required(&p.text, tag, "text")?,
                color: p.color.unwrap_or(Color::CYAN),
            }),
            _ => return Err(SimError::UnknownType(self.tag.clone())),
        };
        Ok(WorldObject::from_parts(self.pos, self.angle, self.extent, kind))
    }
}

impl Snapshot {
    /// Check the whole snapshot without touching any world
    pub fn validate(&self) -> Result<()> {
        self.stage().map(|_| ())
    }

    fn stage(&self) -> Result<Staged> {
        let objects = self
            .objects
            .iter()
            .map(ObjectRecord::to_object)
            .collect::<Result<Vec<_>>>()?;

        let mut links = Vec::new();
        let mut claimed = HashSet::new();
        for link in &self.links {
            let controller = objects.get(link.controller).ok_or_else(|| {
                SimError::Deserialization(format!("link controller {} out of range", link.controller))
            })?;
            if controller.as_control().is_none() {
                return Err(SimError::Deserialization(format!(
                    "object {} cannot control other objects",
                    link.controller
                )));
            }
            for &target in &link.controlled {
                let obj = objects.get(target).ok_or_else(|| {
                    SimError::Deserialization(format!("link target {target} out of range"))
                })?;
                if obj.as_toggle().is_none() {
                    return Err(SimError::Deserialization(format!(
                        "object {target} cannot be toggled"
                    )));
                }
                if !claimed.insert(target) {
                    return Err(SimError::Deserialization(format!(
                        "object {target} is controlled more than once"
                    )));
                }
                links.push((link.controller, target));
            }
        }

        Ok(Staged { objects, links })
    }
}

impl World {
    /// Snapshot of every object and control link, in insertion order
    pub fn export(&self) -> Snapshot {
        let positions: HashMap<ObjectId, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i))
            .collect();

        let mut snapshot = Snapshot::default();
        for (i, (_, obj)) in self.objects().enumerate() {
            snapshot.objects.push(ObjectRecord::from_object(obj));
            let Some(control) = obj.as_control() else {
                continue;
            };
            let controlled: Vec<usize> = control
                .controlled()
                .iter()
                .filter_map(|target| positions.get(target).copied())
                .collect();
            if !controlled.is_empty() {
                snapshot.links.push(LinkRecord {
                    controller: i,
                    controlled,
                });
            }
        }

        log::debug!(
            "Exported {} objects, {} controllers",
            snapshot.objects.len(),
            snapshot.links.len()
        );
        snapshot
    }

    /// Replace every object with the snapshot's contents.
    /// On error the world is left as it was.
    pub fn import(&mut self, snapshot: &Snapshot) -> Result<Vec<ObjectId>> {
        let staged = snapshot.stage()?;
        self.clear();
        let ids = self.install(staged, Vec2::ZERO)?;
        self.refresh();
        log::debug!("Imported {} objects", ids.len());
        Ok(ids)
    }

    /// Add the snapshot's objects shifted by `offset`, keeping existing ones.
    /// On error the world is left as it was.
    pub fn merge(&mut self, snapshot: &Snapshot, offset: Vec2) -> Result<Vec<ObjectId>> {
        let offset = finite(offset, "offset")?;
        let staged = snapshot.stage()?;
        for obj in &staged.objects {
            finite(obj.position() + offset, "position")?;
        }
        let ids = self.install(staged, offset)?;
        self.refresh();
        log::debug!("Merged {} objects at offset {:?}", ids.len(), offset);
        Ok(ids)
    }

    fn install(&mut self, staged: Staged, offset: Vec2) -> Result<Vec<ObjectId>> {
        let ids: Vec<ObjectId> = staged
            .objects
            .into_iter()
            .map(|mut obj| {
                obj.set_position(obj.position() + offset);
                self.insert(obj)
            })
            .collect();
        for (controller, target) in staged.links {
            self.link(ids[controller], ids[target])?;
        }
        Ok(ids)
    }
}
