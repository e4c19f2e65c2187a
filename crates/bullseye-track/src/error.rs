//! Error taxonomy for configuration and startup.
//!
//! Per-frame detection failures are never errors: the calibrator absorbs
//! them into its miss streak and the transient detector simply reports no
//! candidate.

use bullseye_core::BullseyeModelError;

/// Rejected configuration values.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Bullseye(#[from] BullseyeModelError),

    #[error("hue bands overlap or exceed range (low max {low}, high min {high})")]
    InvalidHueBands { low: u8, high: u8 },

    #[error("marker perimeter bounds invalid (min {min}, max {max})")]
    InvalidPerimeterBounds { min: f32, max: f32 },

    #[error("border score must lie in 0..=1, got {0}")]
    InvalidBorderScore(f32),

    #[error("adaptive threshold window must be at least 3, got {0}")]
    ThresholdWindowTooSmall(usize),

    #[error("CLAHE tile grid must be at least 1x1")]
    InvalidClaheTiles,

    #[error("CLAHE clip limit must be positive, got {0}")]
    InvalidClaheClip(f32),

    #[error("target plane size must be positive ({w} x {h})")]
    InvalidPlaneSize { w: f32, h: f32 },

    #[error("calibration needs at least 2 markers, configured {0}")]
    MinMarkersTooLow(usize),

    #[error("staleness deadline must be positive")]
    ZeroStaleness,

    #[error("frame scale factors must be positive (sx {sx}, sy {sy})")]
    InvalidFrameScale { sx: f32, sy: f32 },
}

/// Pipeline startup failures, distinct from steady-state degradation.
#[derive(thiserror::Error, Debug)]
pub enum TrackError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No frames can be obtained at all. Steady-state detection loss is
    /// *not* reported this way; it shows up as calibration status instead.
    #[error("frame source unavailable: {0}")]
    FrameSource(String),
}
