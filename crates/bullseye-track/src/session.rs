//! Per-frame hit detection, debouncing and scoring.

use std::time::{Duration, Instant};

use bullseye_core::{BullseyeModel, RgbFrameView};
use log::{debug, info};
use nalgebra::Point2;

use crate::calibration::SharedCalibration;
use crate::config::FrameScale;
use crate::transient::TransientDetector;

/// One confirmed (or diagnostic) hit.
///
/// `plane` and `score` are absent when no homography exists yet: the raw
/// display pixel is still reported for diagnostics, but nothing can be
/// scored.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HitEvent {
    /// Hit pixel in display space.
    pub display: Point2<f32>,
    /// Hit point projected onto the target plane.
    pub plane: Option<Point2<f32>>,
    /// Ring score for the plane point.
    pub score: Option<u32>,
}

/// High-rate loop: transient detection, projection through the shared
/// homography, ring scoring and the running shot tally.
///
/// The debounce timestamp is owned and mutated only here, so one physical
/// flash spanning several frames scores exactly once.
pub struct HitSession {
    transient: TransientDetector,
    calibration: SharedCalibration,
    bullseye: BullseyeModel,
    scale: FrameScale,
    debounce: Duration,
    last_hit: Option<Instant>,
    shots_fired: u32,
    total_score: u32,
    game_shots: Option<u32>,
}

impl HitSession {
    pub fn new(
        transient: TransientDetector,
        calibration: SharedCalibration,
        bullseye: BullseyeModel,
        scale: FrameScale,
        debounce: Duration,
        game_shots: Option<u32>,
    ) -> Self {
        Self {
            transient,
            calibration,
            bullseye,
            scale,
            debounce,
            last_hit: None,
            shots_fired: 0,
            total_score: 0,
            game_shots,
        }
    }

    /// Process one frame from the high-rate stream.
    ///
    /// Emits at most one event. Candidates falling inside the debounce
    /// window of the previous scored hit are suppressed entirely; the
    /// first candidate of a flash wins.
    pub fn process_frame(&mut self, frame: &RgbFrameView<'_>, now: Instant) -> Option<HitEvent> {
        let raw = self.transient.process(frame)?;
        let display = Point2::new(raw.x * self.scale.sx, raw.y * self.scale.sy);

        let Some(h) = self.calibration.homography() else {
            // NoHomography: diagnostic only, no score, no debounce consumed.
            debug!("hit candidate at ({:.1}, {:.1}) with no homography", display.x, display.y);
            return Some(HitEvent {
                display,
                plane: None,
                score: None,
            });
        };

        if self.finished() {
            return None;
        }

        if let Some(last) = self.last_hit {
            if now.saturating_duration_since(last) < self.debounce {
                debug!("hit candidate suppressed inside debounce window");
                return None;
            }
        }
        self.last_hit = Some(now);

        let plane = h.apply(display);
        let score = self.bullseye.score(plane);
        self.shots_fired += 1;
        self.total_score += score;
        info!(
            "hit #{} at display ({:.0}, {:.0}) -> plane ({:.0}, {:.0}), score {}",
            self.shots_fired, display.x, display.y, plane.x, plane.y, score
        );

        Some(HitEvent {
            display,
            plane: Some(plane),
            score: Some(score),
        })
    }

    /// Drop transient baseline and debounce state; tally is kept.
    pub fn reset_detection(&mut self) {
        self.transient.reset();
        self.last_hit = None;
    }

    /// Clear the shot tally and start a fresh game.
    pub fn reset_game(&mut self) {
        self.shots_fired = 0;
        self.total_score = 0;
        self.last_hit = None;
        self.transient.reset();
    }

    pub fn shots_fired(&self) -> u32 {
        self.shots_fired
    }

    pub fn total_score(&self) -> u32 {
        self.total_score
    }

    pub fn average(&self) -> f32 {
        if self.shots_fired == 0 {
            0.0
        } else {
            self.total_score as f32 / self.shots_fired as f32
        }
    }

    /// True once the configured shots-per-game limit is reached.
    pub fn finished(&self) -> bool {
        self.game_shots
            .map(|limit| self.shots_fired >= limit)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationSnapshot;
    use crate::transient::RedFlashParams;
    use bullseye_core::{plane_from_corners, Homography};
    use std::time::Instant;

    const W: usize = 64;
    const H: usize = 48;

    fn frame(buf: &[u8]) -> RgbFrameView<'_> {
        RgbFrameView::new(W, H, buf).unwrap()
    }

    fn plain() -> Vec<u8> {
        vec![50u8; 3 * W * H]
    }

    fn with_flash(cx: i32, cy: i32) -> Vec<u8> {
        let mut buf = plain();
        for y in 0..H as i32 {
            for x in 0..W as i32 {
                let dx = x - cx;
                let dy = y - cy;
                if dx * dx + dy * dy <= 16 {
                    let i = 3 * (y as usize * W + x as usize);
                    buf[i] = 250;
                    buf[i + 1] = 40;
                    buf[i + 2] = 40;
                }
            }
        }
        buf
    }

    /// Homography mapping the full frame rectangle onto the 900x1200 plane.
    fn full_frame_homography() -> Homography {
        let corners = [
            Point2::new(0.0_f32, 0.0),
            Point2::new(W as f32, 0.0),
            Point2::new(W as f32, H as f32),
            Point2::new(0.0_f32, H as f32),
        ];
        plane_from_corners(&corners, 900.0, 1200.0).unwrap()
    }

    fn shared_with_h(h: Option<Homography>) -> SharedCalibration {
        let shared = SharedCalibration::new();
        shared.write(|s| {
            *s = CalibrationSnapshot {
                homography: h,
                last_success: h.map(|_| Instant::now()),
                ..CalibrationSnapshot::default()
            };
        });
        shared
    }

    fn session(shared: SharedCalibration, debounce_ms: u64, game_shots: Option<u32>) -> HitSession {
        HitSession::new(
            TransientDetector::new(RedFlashParams::default()),
            shared,
            BullseyeModel::default(),
            FrameScale::identity(),
            Duration::from_millis(debounce_ms),
            game_shots,
        )
    }

    #[test]
    fn scored_hit_projects_through_homography() {
        let h = full_frame_homography();
        let mut s = session(shared_with_h(Some(h)), 120, None);
        let t0 = Instant::now();

        assert!(s.process_frame(&frame(&plain()), t0).is_none());
        let flash = with_flash(32, 24);
        let ev = s
            .process_frame(&frame(&flash), t0 + Duration::from_millis(16))
            .expect("scored event");

        let plane = ev.plane.expect("plane point");
        // Frame center maps to the plane center, the highest ring.
        assert!((plane.x - 450.0).abs() < 30.0 && (plane.y - 600.0).abs() < 40.0);
        assert_eq!(ev.score, Some(10));
        assert_eq!(s.shots_fired(), 1);
        assert_eq!(s.total_score(), 10);
    }

    #[test]
    fn no_homography_yields_unscored_diagnostic() {
        let mut s = session(shared_with_h(None), 120, None);
        let t0 = Instant::now();

        assert!(s.process_frame(&frame(&plain()), t0).is_none());
        let ev = s
            .process_frame(&frame(&with_flash(20, 20)), t0 + Duration::from_millis(16))
            .expect("diagnostic event");
        assert!(ev.plane.is_none() && ev.score.is_none());
        assert_eq!(s.shots_fired(), 0, "unscored events do not count shots");
    }

    #[test]
    fn debounce_collapses_rapid_candidates_keeping_the_first() {
        let h = full_frame_homography();
        let mut s = session(shared_with_h(Some(h)), 120, None);
        let t0 = Instant::now();

        assert!(s.process_frame(&frame(&plain()), t0).is_none());
        let first = s
            .process_frame(&frame(&with_flash(20, 20)), t0 + Duration::from_millis(10))
            .expect("first hit scores");

        // The flash moves; the mask spike at the new spot is inside the
        // debounce window and must be suppressed.
        let second = s.process_frame(
            &frame(&with_flash(44, 30)),
            t0 + Duration::from_millis(60),
        );
        assert!(second.is_none());
        assert_eq!(s.shots_fired(), 1);

        // After the window a fresh flash scores again.
        assert!(s
            .process_frame(&frame(&plain()), t0 + Duration::from_millis(200))
            .is_none());
        let third = s.process_frame(
            &frame(&with_flash(10, 10)),
            t0 + Duration::from_millis(260),
        );
        assert!(third.is_some());
        assert_eq!(s.shots_fired(), 2);
        let _ = first;
    }

    #[test]
    fn game_limit_stops_scoring() {
        let h = full_frame_homography();
        let mut s = session(shared_with_h(Some(h)), 0, Some(1));
        let t0 = Instant::now();

        assert!(s.process_frame(&frame(&plain()), t0).is_none());
        assert!(s
            .process_frame(&frame(&with_flash(20, 20)), t0 + Duration::from_millis(10))
            .is_some());
        assert!(s.finished());

        assert!(s
            .process_frame(&frame(&plain()), t0 + Duration::from_millis(300))
            .is_none());
        let after = s.process_frame(
            &frame(&with_flash(40, 30)),
            t0 + Duration::from_millis(400),
        );
        assert!(after.is_none(), "no events after the game is finished");
        assert_eq!(s.shots_fired(), 1);
    }

    #[test]
    fn reset_game_clears_tally() {
        let h = full_frame_homography();
        let mut s = session(shared_with_h(Some(h)), 0, None);
        let t0 = Instant::now();
        assert!(s.process_frame(&frame(&plain()), t0).is_none());
        s.process_frame(&frame(&with_flash(20, 20)), t0 + Duration::from_millis(10))
            .unwrap();
        assert_eq!(s.shots_fired(), 1);

        s.reset_game();
        assert_eq!(s.shots_fired(), 0);
        assert_eq!(s.total_score(), 0);
        assert_eq!(s.average(), 0.0);
    }
}
