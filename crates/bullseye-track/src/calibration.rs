//! Low-cadence calibration loop and the shared camera-to-plane transform.
//!
//! The calibrator is the sole writer of the [`SharedCalibration`] cell; the
//! hit loop only reads snapshots. A detection miss never clears the last
//! good homography (soft degradation); only an explicit recalibration
//! request does.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use bullseye_core::{convex_hull, order_corners, plane_from_corners, GrayFrameView, Homography};
use log::{debug, info};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::config::FrameScale;
use crate::marker::MarkerDetector;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CalibrationParams {
    /// Minimum detected markers before a homography is attempted.
    pub min_markers: usize,
    /// Target plane width in plane units.
    pub plane_w: f32,
    /// Target plane height in plane units.
    pub plane_h: f32,
    /// Age of the last good homography after which status reports
    /// "reacquiring".
    pub staleness_ms: u64,
    /// Suggested calibration tick period for the driving loop.
    pub tick_ms: u64,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            min_markers: 2,
            plane_w: 900.0,
            plane_h: 1200.0,
            staleness_ms: 2000,
            tick_ms: 60,
        }
    }
}

impl CalibrationParams {
    pub fn staleness(&self) -> Duration {
        Duration::from_millis(self.staleness_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// The calibration state shared between the two loops.
#[derive(Clone, Debug, Default)]
pub struct CalibrationSnapshot {
    /// Current camera-to-plane transform, kept across misses.
    pub homography: Option<Homography>,
    /// When the homography was last refreshed.
    pub last_success: Option<Instant>,
    /// Consecutive ticks without a successful refresh.
    pub miss_streak: u32,
    /// Markers seen on the most recent tick.
    pub marker_count: usize,
    /// Mean marker side in display pixels on the most recent tick.
    pub marker_px_wide: f32,
}

/// Caller-visible calibration status.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibrationStatus {
    pub marker_count: usize,
    pub marker_px_wide: f32,
    /// A homography exists (possibly stale).
    pub calibrated: bool,
    /// No homography yet, or the last one is older than the staleness
    /// deadline. The transform stays usable while this is set.
    pub reacquiring: bool,
}

/// Shared read-mostly cell holding the calibration snapshot.
///
/// Cloning shares the same cell. Writes happen only through the
/// [`Calibrator`]; readers take a short lock to clone the snapshot, so a
/// projection never observes a half-written transform.
#[derive(Clone, Debug, Default)]
pub struct SharedCalibration {
    inner: Arc<RwLock<CalibrationSnapshot>>,
}

impl SharedCalibration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone the current snapshot.
    pub fn snapshot(&self) -> CalibrationSnapshot {
        self.read(Clone::clone)
    }

    /// Current homography, if any.
    pub fn homography(&self) -> Option<Homography> {
        self.read(|s| s.homography)
    }

    fn read<T>(&self, f: impl FnOnce(&CalibrationSnapshot) -> T) -> T {
        match self.inner.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    pub(crate) fn write(&self, f: impl FnOnce(&mut CalibrationSnapshot)) {
        match self.inner.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

/// Periodic marker-detection and homography refresh.
pub struct Calibrator {
    detector: MarkerDetector,
    params: CalibrationParams,
    scale: FrameScale,
    shared: SharedCalibration,
}

impl Calibrator {
    pub fn new(
        detector: MarkerDetector,
        params: CalibrationParams,
        scale: FrameScale,
        shared: SharedCalibration,
    ) -> Self {
        Self {
            detector,
            params,
            scale,
            shared,
        }
    }

    #[inline]
    pub fn params(&self) -> &CalibrationParams {
        &self.params
    }

    /// Handle to the shared cell, for status queries elsewhere.
    pub fn shared(&self) -> SharedCalibration {
        self.shared.clone()
    }

    /// Run one calibration cycle on the analysis frame.
    ///
    /// Returns `true` when the homography was refreshed. On a miss the
    /// previous transform stays in place and the miss streak grows.
    pub fn tick(&mut self, gray: &GrayFrameView<'_>, now: Instant) -> bool {
        let obs = self.detector.detect(gray);
        let count = obs.count();
        let px_wide = obs.mean_side_px * self.scale.sx;

        if count < self.params.min_markers {
            debug!("calibration miss: {count} markers (need {})", self.params.min_markers);
            self.record_miss(count, px_wide);
            return false;
        }

        // Pool every corner across all quads, rescaled to display space.
        let pooled: Vec<Point2<f32>> = obs
            .quads
            .iter()
            .flat_map(|q| q.corners)
            .map(|p| Point2::new(p.x * self.scale.sx, p.y * self.scale.sy))
            .collect();

        let hull = convex_hull(&pooled);
        let Some(corners) = order_corners(&hull) else {
            debug!("calibration miss: degenerate hull ({} vertices)", hull.len());
            self.record_miss(count, px_wide);
            return false;
        };
        let Some(h) = plane_from_corners(&corners, self.params.plane_w, self.params.plane_h) else {
            debug!("calibration miss: homography solve failed");
            self.record_miss(count, px_wide);
            return false;
        };

        self.shared.write(|s| {
            s.homography = Some(h);
            s.last_success = Some(now);
            s.miss_streak = 0;
            s.marker_count = count;
            s.marker_px_wide = px_wide;
        });
        debug!("calibration refreshed from {count} markers (~{px_wide:.0}px wide)");
        true
    }

    fn record_miss(&self, count: usize, px_wide: f32) {
        self.shared.write(|s| {
            s.miss_streak = s.miss_streak.saturating_add(1);
            s.marker_count = count;
            s.marker_px_wide = px_wide;
        });
    }

    /// Discard the current homography entirely and start over. This is the
    /// only path that invalidates the transform.
    pub fn recalibrate(&mut self) {
        info!("recalibration requested: clearing homography");
        self.shared.write(|s| {
            *s = CalibrationSnapshot::default();
        });
    }

    /// Queryable status for the caller's UI.
    pub fn status(&self, now: Instant) -> CalibrationStatus {
        let snap = self.shared.snapshot();
        let stale = match snap.last_success {
            Some(t) => now.saturating_duration_since(t) > self.params.staleness(),
            None => true,
        };
        CalibrationStatus {
            marker_count: snap.marker_count,
            marker_px_wide: snap.marker_px_wide,
            calibrated: snap.homography.is_some(),
            reacquiring: snap.homography.is_none() || stale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::MarkerDetectParams;

    const W: usize = 320;
    const H: usize = 240;

    /// Frame with four solid dark squares whose pooled corner hull spans
    /// (40,40)..(280,200).
    fn marker_frame() -> Vec<u8> {
        let mut data = vec![225u8; W * H];
        let side = 36;
        for (x0, y0) in [(40, 40), (244, 40), (244, 164), (40, 164)] {
            for y in y0..y0 + side {
                for x in x0..x0 + side {
                    data[y * W + x] = 12;
                }
            }
        }
        data
    }

    fn calibrator() -> Calibrator {
        Calibrator::new(
            MarkerDetector::new(MarkerDetectParams::default()),
            CalibrationParams::default(),
            FrameScale::identity(),
            SharedCalibration::new(),
        )
    }

    #[test]
    fn successful_tick_installs_homography() {
        let mut cal = calibrator();
        let data = marker_frame();
        let view = GrayFrameView::new(W, H, &data).unwrap();
        let t0 = Instant::now();

        assert!(cal.tick(&view, t0));

        let snap = cal.shared().snapshot();
        let h = snap.homography.expect("homography installed");
        assert_eq!(snap.marker_count, 4);
        assert_eq!(snap.miss_streak, 0);

        // The pooled hull's top-left corner maps to the plane origin.
        let origin = h.apply(Point2::new(40.0, 40.0));
        assert!(origin.x.abs() < 1.0 && origin.y.abs() < 1.0, "{origin:?}");
        let far = h.apply(Point2::new(280.0 - 1.0, 200.0 - 1.0));
        assert!((far.x - 900.0).abs() < 10.0 && (far.y - 1200.0).abs() < 12.0, "{far:?}");
    }

    #[test]
    fn miss_keeps_previous_homography_and_counts() {
        let mut cal = calibrator();
        let data = marker_frame();
        let view = GrayFrameView::new(W, H, &data).unwrap();
        let t0 = Instant::now();
        assert!(cal.tick(&view, t0));

        let blank = vec![210u8; W * H];
        let blank_view = GrayFrameView::new(W, H, &blank).unwrap();
        assert!(!cal.tick(&blank_view, t0));
        assert!(!cal.tick(&blank_view, t0));

        let snap = cal.shared().snapshot();
        assert!(snap.homography.is_some(), "last-good H retained");
        assert_eq!(snap.miss_streak, 2);
        assert_eq!(snap.marker_count, 0);
    }

    #[test]
    fn staleness_flags_reacquiring_while_h_stays_usable() {
        let mut cal = calibrator();
        let data = marker_frame();
        let view = GrayFrameView::new(W, H, &data).unwrap();
        let t0 = Instant::now();
        assert!(cal.tick(&view, t0));

        let fresh = cal.status(t0 + Duration::from_millis(500));
        assert!(fresh.calibrated && !fresh.reacquiring);

        let stale = cal.status(t0 + Duration::from_millis(2500));
        assert!(stale.calibrated, "H still present");
        assert!(stale.reacquiring, "staleness deadline passed");
        assert!(cal.shared().homography().is_some());
    }

    #[test]
    fn recalibrate_clears_everything() {
        let mut cal = calibrator();
        let data = marker_frame();
        let view = GrayFrameView::new(W, H, &data).unwrap();
        assert!(cal.tick(&view, Instant::now()));

        cal.recalibrate();
        let snap = cal.shared().snapshot();
        assert!(snap.homography.is_none());
        assert!(snap.last_success.is_none());
        assert_eq!(snap.miss_streak, 0);

        let status = cal.status(Instant::now());
        assert!(!status.calibrated && status.reacquiring);
    }

    #[test]
    fn scale_factors_remap_corners_to_display_space() {
        let shared = SharedCalibration::new();
        let mut cal = Calibrator::new(
            MarkerDetector::new(MarkerDetectParams::default()),
            CalibrationParams::default(),
            FrameScale { sx: 2.0, sy: 2.0 },
            shared.clone(),
        );
        let data = marker_frame();
        let view = GrayFrameView::new(W, H, &data).unwrap();
        assert!(cal.tick(&view, Instant::now()));

        // Display-space corner (2x the analysis frame) maps to the origin.
        let h = shared.homography().unwrap();
        let origin = h.apply(Point2::new(80.0, 80.0));
        assert!(origin.x.abs() < 2.0 && origin.y.abs() < 2.0, "{origin:?}");
    }
}
