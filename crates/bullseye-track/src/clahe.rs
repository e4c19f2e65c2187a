//! Contrast-limited adaptive histogram equalization.
//!
//! Applied to the grayscale frame before marker detection so marker edges
//! stay stable under uneven lighting. Tile histograms are clipped, the
//! excess is redistributed, and per-pixel output interpolates between the
//! four neighboring tile lookup tables.

use bullseye_core::{GrayBuffer, GrayFrameView};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ClaheParams {
    /// Histogram clip limit as a multiple of the uniform bin height.
    pub clip_limit: f32,
    /// Tile grid columns.
    pub tiles_x: usize,
    /// Tile grid rows.
    pub tiles_y: usize,
}

impl Default for ClaheParams {
    fn default() -> Self {
        Self {
            clip_limit: 2.0,
            tiles_x: 8,
            tiles_y: 8,
        }
    }
}

/// Equalize a grayscale frame. Tile counts are clamped so every tile holds
/// at least one pixel.
pub fn equalize(src: &GrayFrameView<'_>, params: &ClaheParams) -> GrayBuffer {
    let w = src.width;
    let h = src.height;
    if w == 0 || h == 0 {
        return GrayBuffer {
            width: w,
            height: h,
            data: Vec::new(),
        };
    }

    let tiles_x = params.tiles_x.clamp(1, w);
    let tiles_y = params.tiles_y.clamp(1, h);
    let tile_w = w.div_ceil(tiles_x);
    let tile_h = h.div_ceil(tiles_y);

    let luts = build_tile_luts(src, tiles_x, tiles_y, tile_w, tile_h, params.clip_limit);

    let mut out = vec![0u8; w * h];
    for y in 0..h {
        // Position of the pixel relative to tile centers, clamped so pixels
        // outside the first/last center replicate the edge tile.
        let fy = ((y as f32 + 0.5) / tile_h as f32 - 0.5).clamp(0.0, tiles_y as f32 - 1.0);
        let ty0 = fy.floor() as usize;
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        let wy = fy - ty0 as f32;

        for x in 0..w {
            let fx = ((x as f32 + 0.5) / tile_w as f32 - 0.5).clamp(0.0, tiles_x as f32 - 1.0);
            let tx0 = fx.floor() as usize;
            let tx1 = (tx0 + 1).min(tiles_x - 1);
            let wx = fx - tx0 as f32;

            let v = src.data[y * w + x] as usize;
            let p00 = luts[ty0 * tiles_x + tx0][v] as f32;
            let p10 = luts[ty0 * tiles_x + tx1][v] as f32;
            let p01 = luts[ty1 * tiles_x + tx0][v] as f32;
            let p11 = luts[ty1 * tiles_x + tx1][v] as f32;

            let top = p00 + wx * (p10 - p00);
            let bot = p01 + wx * (p11 - p01);
            out[y * w + x] = (top + wy * (bot - top)).round().clamp(0.0, 255.0) as u8;
        }
    }

    GrayBuffer {
        width: w,
        height: h,
        data: out,
    }
}

fn build_tile_luts(
    src: &GrayFrameView<'_>,
    tiles_x: usize,
    tiles_y: usize,
    tile_w: usize,
    tile_h: usize,
    clip_limit: f32,
) -> Vec<[u8; 256]> {
    let mut luts = Vec::with_capacity(tiles_x * tiles_y);

    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(src.width);
            let y1 = (y0 + tile_h).min(src.height);

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                let row = &src.data[y * src.width..y * src.width + src.width];
                for &v in &row[x0..x1] {
                    hist[v as usize] += 1;
                }
            }
            let area = ((x1 - x0) * (y1 - y0)) as u32;

            clip_histogram(&mut hist, area, clip_limit);

            let mut lut = [0u8; 256];
            let mut cdf = 0u64;
            for (i, &count) in hist.iter().enumerate() {
                cdf += count as u64;
                lut[i] = ((cdf * 255) / area.max(1) as u64).min(255) as u8;
            }
            luts.push(lut);
        }
    }
    luts
}

/// Clip bins at `clip_limit` times the uniform height and spread the excess
/// evenly over all bins.
fn clip_histogram(hist: &mut [u32; 256], area: u32, clip_limit: f32) {
    if clip_limit <= 0.0 {
        return;
    }
    let clip = ((clip_limit * area as f32 / 256.0).ceil() as u32).max(1);

    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > clip {
            excess += *bin - clip;
            *bin = clip;
        }
    }
    let per_bin = excess / 256;
    let mut remainder = excess % 256;
    for bin in hist.iter_mut() {
        *bin += per_bin;
        if remainder > 0 {
            *bin += 1;
            remainder -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_frame_stays_uniform() {
        let data = vec![90u8; 64 * 48];
        let v = GrayFrameView::new(64, 48, &data).unwrap();
        let eq = equalize(&v, &ClaheParams::default());
        let first = eq.data[0];
        assert!(eq.data.iter().all(|&p| p == first));
    }

    fn spread(buf: &[u8]) -> i32 {
        let lo = *buf.iter().min().unwrap() as i32;
        let hi = *buf.iter().max().unwrap() as i32;
        hi - lo
    }

    /// Horizontal gradient with values squeezed into [100, 140).
    fn low_contrast_gradient(w: usize, h: usize) -> Vec<u8> {
        (0..w * h).map(|i| (100 + ((i % w) * 40) / w) as u8).collect()
    }

    #[test]
    fn loose_clip_stretches_a_low_contrast_gradient() {
        let data = low_contrast_gradient(128, 32);
        let v = GrayFrameView::new(128, 32, &data).unwrap();
        let params = ClaheParams {
            clip_limit: 40.0,
            tiles_x: 8,
            tiles_y: 8,
        };
        let eq = equalize(&v, &params);
        assert!(spread(&eq.data) > spread(&data));
    }

    #[test]
    fn tight_clip_limits_equalization() {
        // With small tiles the default clip flattens each histogram almost
        // to uniform, so the LUTs barely reshape the values.
        let data = low_contrast_gradient(128, 32);
        let v = GrayFrameView::new(128, 32, &data).unwrap();
        let eq = equalize(&v, &ClaheParams::default());
        assert!(spread(&eq.data) <= spread(&data));
    }

    #[test]
    fn tile_interpolation_is_continuous_across_tile_centers() {
        // Two vertically stacked tiles with very different histograms; a
        // pair of identical pixels straddling the first tile center must map
        // to nearly the same output.
        let w = 8;
        let h = 8;
        let mut data = vec![50u8; w * h];
        for y in 4..8 {
            for x in 0..w {
                data[y * w + x] = 200;
            }
        }
        data[w + 4] = 100; // (4, 1), above the tile-0 center
        data[2 * w + 4] = 100; // (4, 2), just below it
        let v = GrayFrameView::new(w, h, &data).unwrap();
        let params = ClaheParams {
            clip_limit: 100.0,
            tiles_x: 1,
            tiles_y: 2,
        };
        let eq = equalize(&v, &params);

        let a = eq.data[w + 4] as i32;
        let b = eq.data[2 * w + 4] as i32;
        assert!(
            (a - b).abs() <= 20,
            "rows straddling the center differ by {} ({a} vs {b})",
            (a - b).abs()
        );
    }

    #[test]
    fn output_dimensions_match_input() {
        let data = vec![0u8; 30 * 20];
        let v = GrayFrameView::new(30, 20, &data).unwrap();
        let eq = equalize(&v, &ClaheParams { tiles_x: 4, tiles_y: 4, clip_limit: 2.0 });
        assert_eq!(eq.width, 30);
        assert_eq!(eq.height, 20);
        assert_eq!(eq.data.len(), 600);
    }
}
