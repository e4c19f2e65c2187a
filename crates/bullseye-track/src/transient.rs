//! Transient red-flash detection by color masking and frame differencing.
//!
//! Each frame builds a combined red-candidate mask (dual HSV hue bands
//! intersected with a red-dominance test), opens it morphologically, and
//! diffs it against the previous frame's combined mask. Only pixels that
//! became red-candidate *this* frame survive, so a static red object never
//! produces a hit while a momentary flash does.

use bullseye_core::{Mask, RgbFrameView};
use log::debug;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Red-flash masking thresholds. HSV uses the OpenCV byte convention:
/// hue in `0..180`, saturation and value in `0..256`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RedFlashParams {
    /// Upper hue bound of the band near 0.
    pub low_band_max: u8,
    /// Lower hue bound of the band near the wrap-around.
    pub high_band_min: u8,
    /// Minimum saturation for either band.
    pub min_saturation: u8,
    /// Minimum value (brightness) for either band.
    pub min_value: u8,
    /// Red-dominance threshold: requires `R - G > red_dominance`.
    pub red_dominance: u8,
    /// Minimum blob area in pixels.
    pub min_area: usize,
    /// Sensitivity threshold; blobs must also exceed this area.
    pub sensitivity: usize,
}

impl Default for RedFlashParams {
    fn default() -> Self {
        Self {
            low_band_max: 12,
            high_band_min: 160,
            min_saturation: 110,
            min_value: 170,
            red_dominance: 36,
            min_area: 10,
            sensitivity: 10,
        }
    }
}

/// Stateful flash detector; owns the previous combined mask.
pub struct TransientDetector {
    params: RedFlashParams,
    prev: Option<Mask>,
}

impl TransientDetector {
    pub fn new(params: RedFlashParams) -> Self {
        Self { params, prev: None }
    }

    #[inline]
    pub fn params(&self) -> &RedFlashParams {
        &self.params
    }

    /// Drop the carried previous mask; the next frame becomes a baseline.
    pub fn reset(&mut self) {
        self.prev = None;
    }

    /// Process one frame. Returns at most one flash centroid, in the pixel
    /// space of the input frame.
    pub fn process(&mut self, frame: &RgbFrameView<'_>) -> Option<Point2<f32>> {
        let combined = self.combined_mask(frame).open3();

        // A resolution switch invalidates the carried mask.
        if let Some(prev) = &self.prev {
            if prev.width != combined.width || prev.height != combined.height {
                self.prev = None;
            }
        }

        let hit = self.prev.as_ref().and_then(|prev| {
            let fresh = combined.diff_new(prev);
            largest_blob(&fresh, self.params.min_area, self.params.sensitivity)
        });

        if let Some(p) = hit {
            debug!("transient candidate at ({:.1}, {:.1})", p.x, p.y);
        }

        self.prev = Some(combined);
        hit
    }

    /// Hue-band red mask AND red-dominance mask, built in one pass.
    fn combined_mask(&self, frame: &RgbFrameView<'_>) -> Mask {
        let p = &self.params;
        let mut mask = Mask::zeros(frame.width, frame.height);
        for y in 0..frame.height {
            for x in 0..frame.width {
                let (r, g, b) = frame.rgb(x, y);
                let (h, s, v) = rgb_to_hsv(r, g, b);
                let in_band = h <= p.low_band_max || h >= p.high_band_min;
                let red_dominant = r.saturating_sub(g) > p.red_dominance;
                if in_band && s >= p.min_saturation && v >= p.min_value && red_dominant {
                    mask.set(x, y, true);
                }
            }
        }
        mask
    }
}

/// OpenCV-style byte HSV: hue halved into `0..180`.
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let v = max;
    let delta = (max - min) as f32;

    let s = if max == 0 {
        0
    } else {
        (255.0 * delta / max as f32).round() as u8
    };

    if delta == 0.0 {
        return (0, s, v);
    }

    let rf = r as f32;
    let gf = g as f32;
    let bf = b as f32;
    let mut h_deg = if max == r {
        60.0 * (gf - bf) / delta
    } else if max == g {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if h_deg < 0.0 {
        h_deg += 360.0;
    }
    ((h_deg / 2.0).round().min(179.0) as u8, s, v)
}

/// Largest connected component exceeding both area thresholds; returns its
/// centroid.
fn largest_blob(mask: &Mask, min_area: usize, sensitivity: usize) -> Option<Point2<f32>> {
    let w = mask.width;
    let h = mask.height;
    let mut visited = vec![false; w * h];
    let mut stack = Vec::new();

    let mut best_area = 0usize;
    let mut best_centroid = None;

    for sy in 0..h {
        for sx in 0..w {
            if visited[sy * w + sx] || !mask.get(sx, sy) {
                continue;
            }
            let mut area = 0usize;
            let mut sum_x = 0.0f64;
            let mut sum_y = 0.0f64;
            stack.push((sx, sy));
            visited[sy * w + sx] = true;
            while let Some((x, y)) = stack.pop() {
                area += 1;
                sum_x += x as f64;
                sum_y += y as f64;
                let neighbors = [
                    (x.wrapping_sub(1), y),
                    (x + 1, y),
                    (x, y.wrapping_sub(1)),
                    (x, y + 1),
                ];
                for (nx, ny) in neighbors {
                    if nx < w && ny < h && !visited[ny * w + nx] && mask.get(nx, ny) {
                        visited[ny * w + nx] = true;
                        stack.push((nx, ny));
                    }
                }
            }
            if area > min_area && area > sensitivity && area > best_area {
                best_area = area;
                best_centroid = Some(Point2::new(
                    (sum_x / area as f64) as f32,
                    (sum_y / area as f64) as f32,
                ));
            }
        }
    }
    best_centroid
}
