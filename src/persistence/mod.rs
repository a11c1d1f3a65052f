//! Scene files
//!
//! A scene file is a versioned JSON envelope around a [`Snapshot`]. Saving
//! writes a temporary file first and keeps the previous save as a backup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::sim::Snapshot;

/// Format marker written into every scene file
pub const FORMAT: &str = "laser-logic";
/// Current envelope version
pub const VERSION: u32 = 1;

/// Versioned wrapper around a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub format: String,
    pub version: u32,
    pub snapshot: Snapshot,
}

impl Envelope {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            format: FORMAT.to_string(),
            version: VERSION,
            snapshot,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| SimError::Deserialization(e.to_string()))
    }

    /// Parse and validate. Unknown object tags surface as `UnknownType`.
    pub fn from_json(json: &str) -> Result<Self> {
        let envelope: Envelope =
            serde_json::from_str(json).map_err(|e| SimError::Deserialization(e.to_string()))?;
        if envelope.format != FORMAT {
            return Err(SimError::Deserialization(format!(
                "not a scene file (format `{}`)",
                envelope.format
            )));
        }
        if envelope.version != VERSION {
            return Err(SimError::Deserialization(format!(
                "unsupported scene version {}",
                envelope.version
            )));
        }
        envelope.snapshot.validate()?;
        Ok(envelope)
    }
}

fn sibling(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(extension);
    path.with_file_name(name)
}

/// Write a scene, rotating any existing file to `<name>.bak`
pub fn save_scene(path: impl AsRef<Path>, snapshot: &Snapshot) -> Result<()> {
    let path = path.as_ref();
    let json = Envelope::new(snapshot.clone()).to_json()?;

    let tmp = sibling(path, ".tmp");
    std::fs::write(&tmp, json)?;
    if path.exists() {
        std::fs::rename(path, sibling(path, ".bak"))?;
    }
    std::fs::rename(&tmp, path)?;

    log::info!(
        "Scene saved to {} ({} objects)",
        path.display(),
        snapshot.objects.len()
    );
    Ok(())
}

/// Read and validate a scene
pub fn load_scene(path: impl AsRef<Path>) -> Result<Snapshot> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)?;
    let envelope = Envelope::from_json(&json)?;
    log::info!(
        "Loaded scene from {} ({} objects)",
        path.display(),
        envelope.snapshot.objects.len()
    );
    Ok(envelope.snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use crate::sim::{ObjectType, World};
    use glam::Vec2;

    fn scene() -> Snapshot {
        let mut world = World::new(Settings::default());
        let detector = world.add_object(ObjectType::Detector, Vec2::new(80.0, 0.0)).unwrap();
        world.add_object(ObjectType::Emitter, Vec2::ZERO).unwrap();
        let blocker = world.add_object(ObjectType::OpaqueBlock, Vec2::new(0.0, 80.0)).unwrap();
        world.control(detector, blocker).unwrap();
        world.export()
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("laser-logic-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn test_envelope_json() {
        let envelope = Envelope::new(scene());
        let json = envelope.to_json().unwrap();
        assert!(json.contains("\"format\": \"laser-logic\""));
        assert_eq!(Envelope::from_json(&json).unwrap(), envelope);
    }

    #[test]
    fn test_rejects_garbage_and_wrong_version() {
        assert!(matches!(
            Envelope::from_json("{ \"format\": "),
            Err(SimError::Deserialization(_))
        ));

        let mut envelope = Envelope::new(scene());
        envelope.version = 7;
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(matches!(Envelope::from_json(&json), Err(SimError::Deserialization(_))));

        let mut envelope = Envelope::new(scene());
        envelope.format = "something-else".into();
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(matches!(Envelope::from_json(&json), Err(SimError::Deserialization(_))));
    }

    #[test]
    fn test_unknown_tag_survives_envelope() {
        let mut envelope = Envelope::new(scene());
        envelope.snapshot.objects[0].tag = "z".into();
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(matches!(Envelope::from_json(&json), Err(SimError::UnknownType(_))));
    }

    #[test]
    fn test_save_load_with_backup() {
        let path = temp_path("scene");
        let first = scene();
        save_scene(&path, &first).unwrap();
        assert_eq!(load_scene(&path).unwrap(), first);

        let second = Snapshot::default();
        save_scene(&path, &second).unwrap();
        assert_eq!(load_scene(&path).unwrap(), second);
        let backup = sibling(&path, ".bak");
        assert_eq!(load_scene(&backup).unwrap(), first);

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(&backup);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        assert!(matches!(
            load_scene("/nonexistent/laser-logic/scene.json"),
            Err(SimError::Io(_))
        ));
    }
}
