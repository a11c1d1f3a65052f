//! Beam simulation
//!
//! Everything that decides where beams go lives here. Given the same objects
//! and control links the result is deterministic:
//! - Objects are visited in insertion order
//! - Beam paths are rebuilt from scratch every settlement cycle
//! - No rendering or platform dependencies

pub mod beam;
pub mod index;
pub mod intersect;
pub mod object;
pub mod protocol;
pub mod settle;
pub mod snapshot;
pub mod trace;
pub mod world;

pub use beam::{Beam, BeamPath, Color};
pub use index::{Nearest, SpatialIndex};
pub use intersect::{MirrorHit, ray_mirror_intersection, reflect_angle};
pub use object::{
    Blocker, Clock, ClockRate, Detached, Detector, Emitter, Label, ObjectId, ObjectKind,
    ObjectType, WorldObject,
};
pub use protocol::{Control, Toggle};
pub use settle::{SettleOutcome, SettleReport, settle};
pub use snapshot::{LinkRecord, ObjectRecord, Props, Snapshot};
pub use trace::{TraceParams, trace};
pub use world::{Rect, SharedWorld, World};
