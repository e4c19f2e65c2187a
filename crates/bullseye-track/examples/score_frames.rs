//! Run the tracking pipeline over still frames.
//!
//! Usage: score_frames <calibration.png> <frame1.png> <frame2.png> [...]
//!
//! The first image calibrates; the rest are fed through hit detection in
//! order, 16 ms apart, printing any scored events.

use std::time::{Duration, Instant};

use bullseye_core::{GrayFrameView, RgbFrameView};
use bullseye_track::{FrameScale, Pipeline, TrackError, TrackerConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let calib_path = args
        .next()
        .ok_or_else(|| TrackError::FrameSource("no calibration image given".into()))?;
    let frame_paths: Vec<String> = args.collect();
    if frame_paths.is_empty() {
        return Err(TrackError::FrameSource("no frame images given".into()).into());
    }

    let pipeline = Pipeline::new(TrackerConfig::default(), FrameScale::identity())?;
    let (mut calibrator, mut hits) = pipeline.split();
    let t0 = Instant::now();

    let calib = image::ImageReader::open(&calib_path)?.decode()?.to_luma8();
    let gray = GrayFrameView::new(
        calib.width() as usize,
        calib.height() as usize,
        calib.as_raw(),
    )
    .ok_or_else(|| TrackError::FrameSource(format!("bad buffer in {calib_path}")))?;
    calibrator.tick(&gray, t0);

    let status = calibrator.status(t0);
    println!(
        "markers: {} | ~{:.0}px | {}",
        status.marker_count,
        status.marker_px_wide,
        if status.calibrated { "calibrated" } else { "seeking" }
    );

    for (i, path) in frame_paths.iter().enumerate() {
        let img = image::ImageReader::open(path)?.decode()?.to_rgb8();
        let frame = RgbFrameView::new(img.width() as usize, img.height() as usize, img.as_raw())
            .ok_or_else(|| TrackError::FrameSource(format!("bad buffer in {path}")))?;

        let now = t0 + Duration::from_millis(16 * (i as u64 + 1));
        if let Some(ev) = hits.process_frame(&frame, now) {
            match (ev.plane, ev.score) {
                (Some(p), Some(score)) => println!(
                    "{path}: hit at ({:.0}, {:.0}) -> plane ({:.0}, {:.0}) scores {score}",
                    ev.display.x, ev.display.y, p.x, p.y
                ),
                _ => println!(
                    "{path}: flash at ({:.0}, {:.0}) but not calibrated",
                    ev.display.x, ev.display.y
                ),
            }
        }
    }

    println!(
        "shots: {} | total: {} | avg: {:.1}",
        hits.shots_fired(),
        hits.total_score(),
        hits.average()
    );
    Ok(())
}
