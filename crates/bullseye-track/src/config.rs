//! Validated session configuration and pipeline assembly.

use std::time::Duration;

use bullseye_core::BullseyeModel;
use serde::{Deserialize, Serialize};

use crate::calibration::{CalibrationParams, Calibrator, SharedCalibration};
use crate::error::ConfigError;
use crate::marker::{MarkerDetectParams, MarkerDetector};
use crate::session::HitSession;
use crate::transient::{RedFlashParams, TransientDetector};

/// Analysis-to-display scale factors, applied when detected pixel
/// coordinates are remapped into display space.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FrameScale {
    pub sx: f32,
    pub sy: f32,
}

impl FrameScale {
    /// Analysis and display streams share one resolution.
    pub fn identity() -> Self {
        Self { sx: 1.0, sy: 1.0 }
    }

    /// Scale from an analysis resolution to a display resolution.
    pub fn between(proc_w: usize, proc_h: usize, display_w: usize, display_h: usize) -> Self {
        Self {
            sx: display_w as f32 / proc_w.max(1) as f32,
            sy: display_h as f32 / proc_h.max(1) as f32,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sx <= 0.0 || self.sy <= 0.0 || !self.sx.is_finite() || !self.sy.is_finite() {
            return Err(ConfigError::InvalidFrameScale {
                sx: self.sx,
                sy: self.sy,
            });
        }
        Ok(())
    }
}

impl Default for FrameScale {
    fn default() -> Self {
        Self::identity()
    }
}

/// Aggregate session configuration, supplied once at startup. Defaults
/// carry tuned values for a 900x1200 plane with paper targets.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub detector: MarkerDetectParams,
    pub flash: RedFlashParams,
    pub calibration: CalibrationParams,
    pub bullseye: BullseyeModel,
    /// Minimum interval between scored hits, in milliseconds.
    pub debounce_ms: u64,
    /// Optional shots-per-game limit; `None` keeps scoring indefinitely.
    pub game_shots: Option<u32>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            detector: MarkerDetectParams::default(),
            flash: RedFlashParams::default(),
            calibration: CalibrationParams::default(),
            bullseye: BullseyeModel::default(),
            debounce_ms: 120,
            game_shots: None,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.detector;
        if d.threshold_window < 3 {
            return Err(ConfigError::ThresholdWindowTooSmall(d.threshold_window));
        }
        if !(d.min_perimeter_rate > 0.0 && d.min_perimeter_rate < d.max_perimeter_rate) {
            return Err(ConfigError::InvalidPerimeterBounds {
                min: d.min_perimeter_rate,
                max: d.max_perimeter_rate,
            });
        }
        if !(0.0..=1.0).contains(&d.min_border_score) {
            return Err(ConfigError::InvalidBorderScore(d.min_border_score));
        }
        if d.clahe.tiles_x == 0 || d.clahe.tiles_y == 0 {
            return Err(ConfigError::InvalidClaheTiles);
        }
        if d.clahe.clip_limit <= 0.0 {
            return Err(ConfigError::InvalidClaheClip(d.clahe.clip_limit));
        }

        let f = &self.flash;
        if f.low_band_max >= f.high_band_min || f.high_band_min > 179 {
            return Err(ConfigError::InvalidHueBands {
                low: f.low_band_max,
                high: f.high_band_min,
            });
        }

        let c = &self.calibration;
        if c.plane_w <= 0.0 || c.plane_h <= 0.0 {
            return Err(ConfigError::InvalidPlaneSize {
                w: c.plane_w,
                h: c.plane_h,
            });
        }
        if c.min_markers < 2 {
            return Err(ConfigError::MinMarkersTooLow(c.min_markers));
        }
        if c.staleness_ms == 0 {
            return Err(ConfigError::ZeroStaleness);
        }

        self.bullseye.validate()?;
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// A wired calibrator/hit-session pair sharing one calibration cell.
///
/// The two halves are meant to run on independent cadences; [`split`]
/// hands each its own owner. The calibrator remains the sole writer of the
/// shared state.
///
/// [`split`]: Pipeline::split
pub struct Pipeline {
    pub calibrator: Calibrator,
    pub hits: HitSession,
}

impl Pipeline {
    pub fn new(config: TrackerConfig, scale: FrameScale) -> Result<Self, ConfigError> {
        config.validate()?;
        scale.validate()?;
        let debounce = config.debounce();

        let shared = SharedCalibration::new();
        let calibrator = Calibrator::new(
            MarkerDetector::new(config.detector),
            config.calibration,
            scale,
            shared.clone(),
        );
        let hits = HitSession::new(
            TransientDetector::new(config.flash),
            shared,
            config.bullseye,
            scale,
            debounce,
            config.game_shots,
        );
        Ok(Self { calibrator, hits })
    }

    /// Split into the low-rate calibration half and the per-frame hit
    /// half.
    pub fn split(self) -> (Calibrator, HitSession) {
        (self.calibrator, self.hits)
    }
}
