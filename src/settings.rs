// ============================================================================
// SETTINGS — persisted user configuration (serde + bincode)
// ============================================================================
//
// Stored next to the session log in the OS data directory:
//   <data dir>/WarpFE/settings.bin
//
// Loading is best-effort: a missing or unreadable file (including one from
// an incompatible older version) falls back to defaults silently.  Saving
// failures are logged but never surfaced as errors — settings are a
// convenience, not state the user can lose work over.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::log_warn;
use crate::logger;

/// Hard bounds shared by the UI sliders and the GPU passes.  Brush size is
/// a radius in device-independent pixels; strength is a percentage.
pub const BRUSH_SIZE_MIN: f32 = 1.0;
pub const BRUSH_SIZE_MAX: f32 = 200.0;
pub const BRUSH_STRENGTH_MIN: f32 = 1.0;
pub const BRUSH_STRENGTH_MAX: f32 = 100.0;

pub const ZOOM_MIN: f32 = 0.05;
/// Zoom ceiling on constrained devices vs. everywhere else.
pub const ZOOM_MAX_CONSTRAINED: f32 = 24.0;
pub const ZOOM_MAX: f32 = 48.0;

/// History snapshot pixel budgets (see `components/history.rs`).
pub const SNAPSHOT_BUDGET_PX: u32 = 2_400_000;
pub const SNAPSHOT_BUDGET_PX_CONSTRAINED: u32 = 600_000;

#[derive(Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Brush radius in device-independent pixels, [1, 200].
    pub brush_size: f32,
    /// Brush strength in percent, [1, 100].
    pub brush_strength: f32,

    /// Exposure multiplier applied in linear light.
    pub exposure: f32,
    /// Black point subtracted in linear light (result clamped at 0).
    pub black_point: f32,
    /// Reinhard white point.  1000.0 is effectively neutral; 10.0 makes the
    /// compression clearly visible at default settings.
    pub white_point: f32,
    /// Per-channel tint multiplier.
    pub tint: [f32; 3],

    /// Treat this machine as constrained: lower zoom ceiling and smaller
    /// history snapshots.
    pub constrained: bool,
    /// Maximum retained history entries (the zero baseline is entry 0 and
    /// never counts against eviction).
    pub history_capacity: usize,
    /// "high performance" or "low power" — adapter preference.
    pub preferred_gpu: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            brush_size: 60.0,
            brush_strength: 50.0,
            exposure: 1.0,
            black_point: 0.0,
            white_point: 1000.0,
            tint: [1.0, 1.0, 1.0],
            constrained: false,
            history_capacity: 50,
            preferred_gpu: "high performance".to_string(),
        }
    }
}

impl Settings {
    pub fn max_zoom(&self) -> f32 {
        if self.constrained {
            ZOOM_MAX_CONSTRAINED
        } else {
            ZOOM_MAX
        }
    }

    pub fn snapshot_budget_px(&self) -> u32 {
        if self.constrained {
            SNAPSHOT_BUDGET_PX_CONSTRAINED
        } else {
            SNAPSHOT_BUDGET_PX
        }
    }

    /// True when every tone parameter is at its neutral value.
    pub fn tone_is_neutral(&self) -> bool {
        self.exposure == 1.0
            && self.black_point == 0.0
            && self.white_point >= 1000.0
            && self.tint == [1.0, 1.0, 1.0]
    }

    /// Load from disk, falling back to defaults on any failure.
    pub fn load() -> Self {
        let path = settings_path();
        match fs::read(&path) {
            Ok(bytes) => match bincode::deserialize::<Settings>(&bytes) {
                Ok(s) => s.sanitized(),
                Err(_) => Settings::default(),
            },
            Err(_) => Settings::default(),
        }
    }

    /// Best-effort save.  Failures are logged, never propagated.
    pub fn save(&self) {
        let path = settings_path();
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        match bincode::serialize(self) {
            Ok(bytes) => {
                if let Err(e) = fs::write(&path, bytes) {
                    log_warn!("settings save failed: {}", e);
                }
            }
            Err(e) => log_warn!("settings serialize failed: {}", e),
        }
    }

    /// Clamp every field into its documented range.  Applied after load so a
    /// hand-edited or corrupt file cannot push invalid values into the GPU
    /// passes.
    fn sanitized(mut self) -> Self {
        self.brush_size = self.brush_size.clamp(BRUSH_SIZE_MIN, BRUSH_SIZE_MAX);
        self.brush_strength = self
            .brush_strength
            .clamp(BRUSH_STRENGTH_MIN, BRUSH_STRENGTH_MAX);
        self.exposure = self.exposure.clamp(0.0, 16.0);
        self.black_point = self.black_point.clamp(0.0, 1.0);
        self.white_point = self.white_point.clamp(1.0, 1000.0);
        for c in &mut self.tint {
            *c = c.clamp(0.0, 4.0);
        }
        self.history_capacity = self.history_capacity.clamp(2, 200);
        self
    }
}

fn settings_path() -> PathBuf {
    logger::data_dir().join("WarpFE").join("settings.bin")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_neutral_tone() {
        assert!(Settings::default().tone_is_neutral());
    }

    #[test]
    fn sanitize_clamps_out_of_range_fields() {
        let s = Settings {
            brush_size: 9999.0,
            brush_strength: 0.0,
            white_point: 0.5,
            history_capacity: 0,
            ..Settings::default()
        }
        .sanitized();
        assert_eq!(s.brush_size, BRUSH_SIZE_MAX);
        assert_eq!(s.brush_strength, BRUSH_STRENGTH_MIN);
        assert_eq!(s.white_point, 1.0);
        assert_eq!(s.history_capacity, 2);
    }

    #[test]
    fn constrained_lowers_zoom_and_budget() {
        let mut s = Settings::default();
        assert_eq!(s.max_zoom(), ZOOM_MAX);
        assert_eq!(s.snapshot_budget_px(), SNAPSHOT_BUDGET_PX);
        s.constrained = true;
        assert_eq!(s.max_zoom(), ZOOM_MAX_CONSTRAINED);
        assert_eq!(s.snapshot_budget_px(), SNAPSHOT_BUDGET_PX_CONSTRAINED);
    }
}
