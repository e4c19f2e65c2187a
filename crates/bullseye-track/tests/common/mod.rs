//! Synthetic frame builders shared by the integration tests.

/// Light gray frame with filled dark squares at the given top-left
/// corners; stands in for the analysis stream during calibration.
pub fn gray_frame_with_squares(
    w: usize,
    h: usize,
    side: usize,
    at: &[(usize, usize)],
) -> Vec<u8> {
    let mut data = vec![225u8; w * h];
    for &(x0, y0) in at {
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                data[y * w + x] = 12;
            }
        }
    }
    data
}

/// Neutral RGB scene with nothing red in it.
pub fn rgb_plain(w: usize, h: usize) -> Vec<u8> {
    vec![70u8; 3 * w * h]
}

/// Stamp a saturated red disk onto an RGB buffer.
pub fn draw_red_disk(buf: &mut [u8], w: usize, h: usize, cx: i32, cy: i32, radius: i32) {
    for y in 0..h as i32 {
        for x in 0..w as i32 {
            let dx = x - cx;
            let dy = y - cy;
            if dx * dx + dy * dy <= radius * radius {
                let i = 3 * (y as usize * w + x as usize);
                buf[i] = 250;
                buf[i + 1] = 40;
                buf[i + 2] = 40;
            }
        }
    }
}
