//! Error types for the simulation engine

use thiserror::Error;

use crate::sim::ObjectId;

/// Errors surfaced by world mutators, snapshot import and persistence.
///
/// Oscillating scenes are not errors; see [`crate::sim::SettleReport`].
#[derive(Debug, Error)]
pub enum SimError {
    /// Malformed or truncated snapshot data
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// Snapshot names an object type this engine does not know
    #[error("unknown object type `{0}`")]
    UnknownType(String),

    /// The id does not (or no longer) refer to an object in the world
    #[error("no object with id {0:?}")]
    MissingObject(ObjectId),

    /// The object cannot drive toggle objects
    #[error("object {0:?} is not a controller")]
    NotControl(ObjectId),

    /// The object cannot be driven by a controller
    #[error("object {0:?} cannot be toggled")]
    NotToggle(ObjectId),

    /// A variant-specific mutator was called on another kind of object
    #[error("object {0:?} is not {1}")]
    WrongKind(ObjectId, &'static str),

    /// A position, angle or offset was NaN or infinite
    #[error("non-finite {0}")]
    NonFinite(&'static str),

    /// The clock driver already has a background thread
    #[error("clock thread already running")]
    ClockRunning,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
