//! Real-time planar target tracking and red-flash hit scoring.
//!
//! Two periodic activities consume the same live frame source:
//!
//! - the [`Calibrator`] runs at a low fixed cadence, detecting square
//!   fiducial markers and refreshing the camera-to-plane homography held in
//!   a [`SharedCalibration`] cell (sole writer);
//! - the [`HitSession`] runs per delivered frame, isolating transient red
//!   flashes and projecting them through the current homography onto the
//!   scoring plane (reader).
//!
//! [`Pipeline::new`] wires both halves around one shared calibration cell;
//! [`Pipeline::split`] hands each half to its own loop or thread.
//!
//! Frame acquisition, rendering, score persistence and game flow are the
//! caller's business: feed frames in, consume [`HitEvent`]s and
//! [`CalibrationStatus`] out.

mod calibration;
mod clahe;
mod config;
mod error;
mod marker;
mod session;
mod transient;

pub use calibration::{
    CalibrationParams, CalibrationSnapshot, CalibrationStatus, Calibrator, SharedCalibration,
};
pub use clahe::{equalize, ClaheParams};
pub use config::{FrameScale, Pipeline, TrackerConfig};
pub use error::{ConfigError, TrackError};
pub use marker::{MarkerDetectParams, MarkerDetector, MarkerObservation, MarkerQuad};
pub use session::{HitEvent, HitSession};
pub use transient::{RedFlashParams, TransientDetector};
