//! Engine settings
//!
//! Stored as JSON next to scene files; missing or unreadable files fall
//! back to defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::Result;

/// Tunable engine parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === Tracing ===
    /// Distance between beam samples
    pub trace_step: f32,
    /// Padding around the scene bounds when no viewport is set
    pub trace_margin: f32,
    /// Segments per beam path before it is cut off
    pub max_segments: usize,

    // === Settlement ===
    /// Cycles before a scene is declared oscillating
    pub max_cycles: u32,

    // === Clocks ===
    /// Base period of the clock driver
    pub tick_period_ms: u64,

    // === Object defaults ===
    pub default_extent: f32,
    pub mirror_extent: f32,
    pub label_extent: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            trace_step: TRACE_STEP,
            trace_margin: TRACE_MARGIN,
            max_segments: MAX_BEAM_SEGMENTS,

            max_cycles: MAX_SETTLE_CYCLES,

            tick_period_ms: CLOCK_PERIOD_MS,

            default_extent: DEFAULT_EXTENT,
            mirror_extent: MIRROR_EXTENT,
            label_extent: LABEL_EXTENT,
        }
    }
}

impl Settings {
    /// Clamp values that would break tracing or settlement
    pub fn validated(mut self) -> Self {
        // Imported objects can be as small as MIN_EXTENT
        if !(self.trace_step > 0.0 && self.trace_step <= MIN_EXTENT) {
            log::warn!(
                "trace_step {} outside (0, {}], clamping",
                self.trace_step,
                MIN_EXTENT
            );
            self.trace_step = if self.trace_step > 0.0 { MIN_EXTENT } else { TRACE_STEP.min(MIN_EXTENT) };
        }
        self.default_extent = self.default_extent.max(MIN_EXTENT);
        self.mirror_extent = self.mirror_extent.max(MIN_EXTENT);
        self.label_extent = self.label_extent.max(MIN_EXTENT);
        self.trace_margin = self.trace_margin.max(0.0);
        self.max_cycles = self.max_cycles.max(1);
        self.max_segments = self.max_segments.max(1);
        self.tick_period_ms = self.tick_period_ms.max(1);
        self
    }

    /// Load settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str::<Settings>(&json) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    return settings.validated();
                }
                Err(e) => log::warn!("Ignoring invalid settings in {}: {}", path.display(), e),
            },
            Err(e) => log::info!("No settings at {} ({}), using defaults", path.display(), e),
        }
        Self::default()
    }

    /// Save settings as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path.as_ref(), json)?;
        log::info!("Settings saved to {}", path.as_ref().display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert_eq!(settings.clone().validated(), settings);
        assert_eq!(settings.max_cycles, 1000);
        assert_eq!(settings.tick_period_ms, 250);
    }

    #[test]
    fn test_step_clamped_to_min_extent() {
        // Configured extents do not bound imported ones
        let settings = Settings {
            trace_step: 5.0,
            default_extent: 20.0,
            mirror_extent: 20.0,
            label_extent: 20.0,
            ..Default::default()
        }
        .validated();
        assert_eq!(settings.trace_step, MIN_EXTENT);

        let settings = Settings {
            trace_step: 1.5,
            ..Default::default()
        }
        .validated();
        assert_eq!(settings.trace_step, 1.5);

        let settings = Settings {
            trace_step: -1.0,
            ..Default::default()
        }
        .validated();
        assert!(settings.trace_step > 0.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: Settings = serde_json::from_str(r#"{ "max_cycles": 10 }"#).unwrap();
        assert_eq!(settings.max_cycles, 10);
        assert_eq!(settings.mirror_extent, MIRROR_EXTENT);
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let settings = Settings::load("/nonexistent/laser-logic/settings.json");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_save_then_load() {
        let path = std::env::temp_dir().join(format!("laser-logic-settings-{}.json", std::process::id()));
        let settings = Settings {
            max_cycles: 42,
            ..Default::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path), settings);
        let _ = std::fs::remove_file(&path);
    }
}
