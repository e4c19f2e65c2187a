//! Square fiducial marker detection on a contrast-equalized frame.
//!
//! The detector looks for dark square blobs: adaptive threshold, connected
//! components, convex hull reduced to a quad, then a warped border-ring scan
//! that requires a mostly-black marker border. Marker payloads are never
//! decoded; identity is not needed for bounding-geometry calibration.
//!
//! Zero or one detected markers is a normal "insufficient data" outcome for
//! the calibration loop, not an error.

use bullseye_core::{
    convex_hull, homography_from_4pt, order_corners, sample_bilinear_u8, GrayFrameView, Mask,
};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::clahe::{equalize, ClaheParams};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MarkerDetectParams {
    /// Contrast equalization applied before thresholding.
    pub clahe: ClaheParams,
    /// Side of the adaptive-threshold mean window, in pixels (odd).
    pub threshold_window: usize,
    /// A pixel is a dark candidate when `value + offset < local mean`.
    pub threshold_offset: i16,
    /// Minimum quad perimeter as a fraction of the larger image dimension.
    pub min_perimeter_rate: f32,
    /// Maximum quad perimeter as a fraction of the larger image dimension.
    pub max_perimeter_rate: f32,
    /// Components closer than this to the image border are discarded.
    pub min_distance_to_border: usize,
    /// Required fraction of black samples along the warped marker border.
    pub min_border_score: f32,
    /// Samples taken per border cell during validation.
    pub border_samples_per_edge: usize,
}

impl Default for MarkerDetectParams {
    fn default() -> Self {
        Self {
            clahe: ClaheParams::default(),
            threshold_window: 15,
            threshold_offset: 7,
            min_perimeter_rate: 0.02,
            max_perimeter_rate: 4.0,
            min_distance_to_border: 1,
            min_border_score: 0.85,
            border_samples_per_edge: 6,
        }
    }
}

/// One detected marker: 4 corners in camera pixel space, ordered
/// tl/tr/br/bl.
#[derive(Clone, Copy, Debug)]
pub struct MarkerQuad {
    pub corners: [Point2<f32>; 4],
}

impl MarkerQuad {
    /// Length of the tl-tr edge in pixels; for square markers this is the
    /// side length.
    pub fn side_px(&self) -> f32 {
        let a = self.corners[0];
        let b = self.corners[1];
        (b.x - a.x).hypot(b.y - a.y)
    }
}

/// Markers found in one detection cycle. No identity persists across
/// cycles.
#[derive(Clone, Debug, Default)]
pub struct MarkerObservation {
    pub quads: Vec<MarkerQuad>,
    /// Mean marker side length in pixels; a human-readable size estimate,
    /// not geometry input.
    pub mean_side_px: f32,
}

impl MarkerObservation {
    pub fn count(&self) -> usize {
        self.quads.len()
    }
}

pub struct MarkerDetector {
    params: MarkerDetectParams,
}

impl MarkerDetector {
    pub fn new(params: MarkerDetectParams) -> Self {
        Self { params }
    }

    #[inline]
    pub fn params(&self) -> &MarkerDetectParams {
        &self.params
    }

    /// Detect marker quads in a grayscale frame.
    pub fn detect(&self, gray: &GrayFrameView<'_>) -> MarkerObservation {
        if gray.width < 8 || gray.height < 8 {
            return MarkerObservation::default();
        }

        let eq = equalize(gray, &self.params.clahe);
        let eq_view = eq.as_view();
        let dark = adaptive_dark_mask(
            &eq_view,
            self.params.threshold_window,
            self.params.threshold_offset,
        );

        let max_dim = gray.width.max(gray.height) as f32;
        let min_perim = self.params.min_perimeter_rate * max_dim;
        let max_perim = self.params.max_perimeter_rate * max_dim;

        let mut quads = Vec::new();
        for boundary in component_boundaries(&dark, self.params.min_distance_to_border) {
            let hull = convex_hull(&boundary);
            let perim = polygon_perimeter(&hull);
            if perim < min_perim || perim > max_perim {
                continue;
            }
            let Some(quad_pts) = reduce_hull_to_quad(hull) else {
                continue;
            };
            let Some(corners) = order_corners(&quad_pts) else {
                continue;
            };
            let quad = MarkerQuad { corners };
            if self.border_score(&eq_view, &quad) >= self.params.min_border_score {
                quads.push(quad);
            }
        }

        let mean_side_px = if quads.is_empty() {
            0.0
        } else {
            quads.iter().map(MarkerQuad::side_px).sum::<f32>() / quads.len() as f32
        };

        MarkerObservation {
            quads,
            mean_side_px,
        }
    }

    /// Sample the warped marker border ring and return its black fraction.
    ///
    /// The quad is mapped to a canonical square; border cells are sampled
    /// at their centers, and an Otsu split over all samples decides what
    /// counts as black.
    fn border_score(&self, gray: &GrayFrameView<'_>, quad: &MarkerQuad) -> f32 {
        let cells = self.params.border_samples_per_edge.max(3);
        let side = cells as f32;
        let canonical = [
            Point2::new(0.0, 0.0),
            Point2::new(side, 0.0),
            Point2::new(side, side),
            Point2::new(0.0, side),
        ];
        let Some(h) = homography_from_4pt(&canonical, &quad.corners) else {
            return 0.0;
        };

        let mut samples = Vec::with_capacity(cells * cells);
        let mut border = Vec::with_capacity(4 * cells);
        for j in 0..cells {
            for i in 0..cells {
                let p = h.apply(Point2::new(i as f32 + 0.5, j as f32 + 0.5));
                let v = sample_bilinear_u8(gray, p.x, p.y);
                samples.push(v);
                if i == 0 || j == 0 || i == cells - 1 || j == cells - 1 {
                    border.push(v);
                }
            }
        }

        // A nearly uniform patch has no black/white split to find: decide
        // by absolute brightness instead of letting Otsu cut the single
        // cluster in half.
        let min_v = *samples.iter().min().unwrap_or(&0);
        let max_v = *samples.iter().max().unwrap_or(&0);
        if max_v - min_v < 32 {
            let mean: u32 = samples.iter().map(|&v| v as u32).sum::<u32>() / samples.len() as u32;
            return if mean < 128 { 1.0 } else { 0.0 };
        }

        let thresh = otsu_threshold(&samples);
        let black = border.iter().filter(|&&v| v <= thresh).count();
        black as f32 / border.len() as f32
    }
}

/// Dark-candidate mask via local mean thresholding over a sliding window,
/// using a summed-area table.
fn adaptive_dark_mask(gray: &GrayFrameView<'_>, window: usize, offset: i16) -> Mask {
    let w = gray.width;
    let h = gray.height;
    let r = (window.max(3) / 2) as i32;

    let mut integral = vec![0u64; (w + 1) * (h + 1)];
    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            row_sum += gray.data[y * w + x] as u64;
            integral[(y + 1) * (w + 1) + (x + 1)] = integral[y * (w + 1) + (x + 1)] + row_sum;
        }
    }
    let sum_rect = |x0: usize, y0: usize, x1: usize, y1: usize| -> u64 {
        // inclusive-exclusive rectangle [x0, x1) x [y0, y1)
        integral[y1 * (w + 1) + x1] + integral[y0 * (w + 1) + x0]
            - integral[y0 * (w + 1) + x1]
            - integral[y1 * (w + 1) + x0]
    };

    let mut mask = Mask::zeros(w, h);
    for y in 0..h {
        let y0 = (y as i32 - r).max(0) as usize;
        let y1 = ((y as i32 + r + 1) as usize).min(h);
        for x in 0..w {
            let x0 = (x as i32 - r).max(0) as usize;
            let x1 = ((x as i32 + r + 1) as usize).min(w);
            let area = ((x1 - x0) * (y1 - y0)) as u64;
            let mean = (sum_rect(x0, y0, x1, y1) / area) as i32;
            let v = gray.data[y * w + x] as i32;
            if v + i32::from(offset) < mean {
                mask.set(x, y, true);
            }
        }
    }
    mask
}

/// Boundary point sets of 4-connected components, skipping components that
/// reach within `border_margin` of the image edge or are too small to be a
/// marker candidate.
fn component_boundaries(mask: &Mask, border_margin: usize) -> Vec<Vec<Point2<f32>>> {
    const MIN_COMPONENT_AREA: usize = 16;

    let w = mask.width;
    let h = mask.height;
    let mut visited = vec![false; w * h];
    let mut out = Vec::new();
    let mut stack = Vec::new();
    let mut pixels: Vec<(usize, usize)> = Vec::new();

    for sy in 0..h {
        for sx in 0..w {
            if visited[sy * w + sx] || !mask.get(sx, sy) {
                continue;
            }
            pixels.clear();
            stack.push((sx, sy));
            visited[sy * w + sx] = true;
            let mut touches_border = false;

            while let Some((x, y)) = stack.pop() {
                pixels.push((x, y));
                if x < border_margin + 1
                    || y < border_margin + 1
                    || x + border_margin + 1 >= w
                    || y + border_margin + 1 >= h
                {
                    touches_border = true;
                }
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

            if touches_border || pixels.len() < MIN_COMPONENT_AREA {
                continue;
            }

            let boundary: Vec<Point2<f32>> = pixels
                .iter()
                .filter(|&&(x, y)| {
                    x == 0
                        || y == 0
                        || x + 1 == w
                        || y + 1 == h
                        || !mask.get(x - 1, y)
                        || !mask.get(x + 1, y)
                        || !mask.get(x, y - 1)
                        || !mask.get(x, y + 1)
                })
                .map(|&(x, y)| Point2::new(x as f32, y as f32))
                .collect();
            if boundary.len() >= 4 {
                out.push(boundary);
            }
        }
    }
    out
}

fn polygon_perimeter(poly: &[Point2<f32>]) -> f32 {
    if poly.len() < 2 {
        return 0.0;
    }
    let n = poly.len();
    (0..n)
        .map(|i| {
            let a = poly[i];
            let b = poly[(i + 1) % n];
            (b.x - a.x).hypot(b.y - a.y)
        })
        .sum()
}

/// Collapse a convex hull to 4 vertices by repeatedly removing the vertex
/// whose removal changes the polygon area the least.
fn reduce_hull_to_quad(mut hull: Vec<Point2<f32>>) -> Option<[Point2<f32>; 4]> {
    if hull.len() < 4 {
        return None;
    }
    while hull.len() > 4 {
        let n = hull.len();
        let mut best = 0;
        let mut best_loss = f32::INFINITY;
        for i in 0..n {
            let prev = hull[(i + n - 1) % n];
            let cur = hull[i];
            let next = hull[(i + 1) % n];
            let loss = ((cur.x - prev.x) * (next.y - prev.y)
                - (next.x - prev.x) * (cur.y - prev.y))
                .abs()
                * 0.5;
            if loss < best_loss {
                best_loss = loss;
                best = i;
            }
        }
        hull.remove(best);
    }
    Some([hull[0], hull[1], hull[2], hull[3]])
}

/// Otsu threshold over raw samples; midpoint fallback when the histogram is
/// too flat to split.
fn otsu_threshold(samples: &[u8]) -> u8 {
    if samples.is_empty() {
        return 127;
    }
    let mut min_v = 255u8;
    let mut max_v = 0u8;
    let mut hist = [0u32; 256];
    for &v in samples {
        hist[v as usize] += 1;
        min_v = min_v.min(v);
        max_v = max_v.max(v);
    }
    if min_v == max_v {
        return min_v;
    }

    let total = samples.len() as f64;
    let sum_total: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum();

    let mut sum_b = 0.0f64;
    let mut w_b = 0.0f64;
    let mut best_var = -1.0f64;
    let mut best_t = ((min_v as u16 + max_v as u16) / 2) as u8;

    for (t, &c) in hist.iter().enumerate() {
        w_b += c as f64;
        if w_b < 1.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f < 1.0 {
            break;
        }
        sum_b += t as f64 * c as f64;
        let m_b = sum_b / w_b;
        let m_f = (sum_total - sum_b) / w_f;
        let var = w_b * w_f * (m_b - m_f) * (m_b - m_f);
        if var > best_var {
            best_var = var;
            best_t = t as u8;
        }
    }
    best_t
}

#[cfg(test)]
mod tests {
    use super::*;

    /// White frame with filled dark squares at the given top-left corners.
    fn frame_with_squares(w: usize, h: usize, side: usize, at: &[(usize, usize)]) -> Vec<u8> {
        let mut data = vec![230u8; w * h];
        for &(x0, y0) in at {
            for y in y0..y0 + side {
                for x in x0..x0 + side {
                    data[y * w + x] = 15;
                }
            }
        }
        data
    }

    #[test]
    fn detects_isolated_dark_squares() {
        let data = frame_with_squares(320, 240, 40, &[(30, 30), (220, 160)]);
        let view = GrayFrameView::new(320, 240, &data).unwrap();
        let det = MarkerDetector::new(MarkerDetectParams::default());

        let obs = det.detect(&view);
        assert_eq!(obs.count(), 2);
        // Side estimate should land near the drawn square size.
        assert!(
            (obs.mean_side_px - 40.0).abs() < 8.0,
            "mean side {}",
            obs.mean_side_px
        );
    }

    #[test]
    fn corner_labels_extremize_coordinate_sums() {
        let data = frame_with_squares(200, 200, 50, &[(60, 60)]);
        let view = GrayFrameView::new(200, 200, &data).unwrap();
        let det = MarkerDetector::new(MarkerDetectParams::default());

        let obs = det.detect(&view);
        assert_eq!(obs.count(), 1);
        let [tl, tr, br, bl] = obs.quads[0].corners;
        // tl/br hold the min/max of x+y; tr/bl the min/max of x-y.
        assert!(tl.x + tl.y < br.x + br.y);
        assert!(tr.x - tr.y < tl.x - tl.y);
        assert!(bl.x - bl.y > tl.x - tl.y);
        // For the axis-aligned square the labeled corners land on it.
        assert!((tl.x - 60.0).abs() < 3.0 && (tl.y - 60.0).abs() < 3.0);
        assert!((br.x - 109.0).abs() < 3.0 && (br.y - 109.0).abs() < 3.0);
    }

    #[test]
    fn empty_frame_yields_insufficient_data() {
        let data = vec![200u8; 160 * 120];
        let view = GrayFrameView::new(160, 120, &data).unwrap();
        let det = MarkerDetector::new(MarkerDetectParams::default());

        let obs = det.detect(&view);
        assert_eq!(obs.count(), 0);
        assert_eq!(obs.mean_side_px, 0.0);
    }

    #[test]
    fn component_touching_border_is_discarded() {
        let data = frame_with_squares(200, 150, 40, &[(0, 50)]);
        let view = GrayFrameView::new(200, 150, &data).unwrap();
        let det = MarkerDetector::new(MarkerDetectParams::default());
        assert_eq!(det.detect(&view).count(), 0);
    }

    #[test]
    fn oversized_component_fails_perimeter_bounds() {
        // Nearly frame-filling blob: perimeter rate above the max bound.
        let data = frame_with_squares(100, 100, 92, &[(4, 4)]);
        let view = GrayFrameView::new(100, 100, &data).unwrap();
        let mut params = MarkerDetectParams::default();
        params.max_perimeter_rate = 2.0;
        let det = MarkerDetector::new(params);
        assert_eq!(det.detect(&view).count(), 0);
    }

    #[test]
    fn adaptive_threshold_requires_offset_below_local_mean() {
        let mut data = vec![120u8; 32 * 32];
        data[16 * 32 + 16] = 100; // 20 below its neighborhood
        data[8 * 32 + 8] = 114; // only 6 below, inside the offset
        let view = GrayFrameView::new(32, 32, &data).unwrap();

        let mask = adaptive_dark_mask(&view, 15, 7);
        assert!(mask.get(16, 16));
        assert!(!mask.get(8, 8));
        assert!(!mask.get(4, 4));
    }

    #[test]
    fn otsu_splits_bimodal_samples() {
        let mut samples = vec![10u8; 40];
        samples.extend(std::iter::repeat(200u8).take(40));
        let t = otsu_threshold(&samples);
        assert!(t >= 10 && t < 200);
    }

    #[test]
    fn hull_reduction_keeps_dominant_corners() {
        // A square with one slightly shaved corner reduces back to ~square.
        let hull = vec![
            Point2::new(0.0_f32, 0.0),
            Point2::new(98.0, 0.0),
            Point2::new(100.0, 2.0),
            Point2::new(100.0, 100.0),
            Point2::new(0.0, 100.0),
        ];
        let quad = reduce_hull_to_quad(hull).unwrap();
        let xs: Vec<f32> = quad.iter().map(|p| p.x).collect();
        assert!(xs.iter().cloned().fold(f32::MIN, f32::max) >= 98.0);
        assert!(xs.iter().cloned().fold(f32::MAX, f32::min) <= 0.0 + 1e-3);
    }
}
