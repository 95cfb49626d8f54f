//! Engine settings that persist across sessions.
//!
//! Stored as a small TOML file. A missing or unreadable file falls back to
//! defaults with a warning; bad individual values are clamped into range
//! rather than rejected, so an edited settings file can never brick the
//! engine.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Maximum number of undo (and redo) transactions retained. Pushing
    /// past this silently evicts the oldest.
    pub undo_capacity: usize,
    /// Mask rasterization worker threads. Clamped to at least 4.
    pub mask_workers: usize,
    /// Frame budget for animated undo/redo replay; one replay is spread
    /// over roughly this many steps.
    pub replay_frames: usize,
    /// Rolling buffer length for the pixel-perfect brush.
    pub pixel_perfect_buffer: usize,
    /// Default keep-probability for the spray brush, `0.0..=1.0`.
    pub spray_density: f32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            undo_capacity: 75,
            mask_workers: 4,
            replay_frames: 600,
            pixel_perfect_buffer: 20,
            spray_density: 0.5,
        }
    }
}

impl EngineSettings {
    /// Load settings from `path`, falling back to defaults when the file
    /// is missing or does not parse.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("settings: failed to read {}: {}", path.display(), e);
                }
                return Self::default();
            }
        };
        match toml::from_str::<EngineSettings>(&raw) {
            Ok(s) => s.clamped(),
            Err(e) => {
                log::warn!("settings: {} did not parse ({}), using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let body = toml::to_string_pretty(self).expect("settings always serialize");
        std::fs::write(path, body)
    }

    /// Force every field into its valid range.
    pub fn clamped(mut self) -> Self {
        self.undo_capacity = self.undo_capacity.max(1);
        self.mask_workers = self.mask_workers.max(4);
        self.replay_frames = self.replay_frames.max(1);
        self.pixel_perfect_buffer = self.pixel_perfect_buffer.clamp(4, 256);
        self.spray_density = self.spray_density.clamp(0.0, 1.0);
        self
    }
}
