//! Capability traits layered on top of world objects
//!
//! Objects that can be switched by a signal implement [`Toggle`]; objects
//! that produce a signal for a set of toggles implement [`Control`]. Links
//! are stored as [`ObjectId`] handles on both sides and the world keeps the
//! two sides consistent.
//!
//! The per-cycle hooks live on [`WorldObject`](super::WorldObject):
//! `unsettled` before tracing, `strike` during it, `settled` after it, and
//! `cleanup` when the object leaves its world.

use super::ObjectId;

/// Something a controller can switch on and off
pub trait Toggle {
    /// Current controller, if any
    fn controller(&self) -> Option<ObjectId>;

    /// Take `controller` as the new owner.
    ///
    /// Returns the previous owner so the caller can release this object
    /// from it. A toggle has at most one controller at a time.
    fn claim(&mut self, controller: ObjectId) -> Option<ObjectId>;

    /// Forget the controller without notifying it
    fn disown(&mut self);

    /// Logical on/off state as last set by a controller
    fn is_on(&self) -> bool;

    /// Apply a control signal.
    ///
    /// Returns `true` only when the logical state actually changed; the
    /// world invalidates the object exactly in that case.
    fn set_toggle(&mut self, on: bool) -> bool;
}

/// Something that drives a set of toggles with one boolean signal
pub trait Control {
    /// Toggles currently driven, in link order
    fn controlled(&self) -> &[ObjectId];

    /// Add `target` to the driven set. No-op if already present.
    fn control(&mut self, target: ObjectId);

    /// Remove `target` from the driven set without touching the target.
    /// Returns whether it was present.
    fn release(&mut self, target: ObjectId) -> bool;

    /// Signal pushed to every controlled toggle after each trace pass
    fn signal(&self) -> bool;
}

/// Shared bookkeeping for controller link lists
pub(crate) fn add_link(links: &mut Vec<ObjectId>, target: ObjectId) {
    if !links.contains(&target) {
        links.push(target);
    }
}

pub(crate) fn remove_link(links: &mut Vec<ObjectId>, target: ObjectId) -> bool {
    let before = links.len();
    links.retain(|&id| id != target);
    links.len() != before
}
