//! Lightweight pixel buffer views and binary masks.
//!
//! Frames are borrowed, row-major buffers owned by the caller for the
//! duration of one pipeline call. The only buffer that outlives a call is
//! the previous-mask carried by the transient detector, which owns a `Mask`.

/// Borrowed grayscale frame, row-major, `len = width * height`.
#[derive(Clone, Copy, Debug)]
pub struct GrayFrameView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8],
}

impl<'a> GrayFrameView<'a> {
    /// Wrap a raw buffer, checking its length against the dimensions.
    pub fn new(width: usize, height: usize, data: &'a [u8]) -> Option<Self> {
        (data.len() == width * height).then_some(Self {
            width,
            height,
            data,
        })
    }
}

/// Borrowed RGB frame, interleaved, `len = 3 * width * height`.
#[derive(Clone, Copy, Debug)]
pub struct RgbFrameView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8],
}

impl<'a> RgbFrameView<'a> {
    /// Wrap a raw interleaved buffer, checking its length.
    pub fn new(width: usize, height: usize, data: &'a [u8]) -> Option<Self> {
        (data.len() == 3 * width * height).then_some(Self {
            width,
            height,
            data,
        })
    }

    /// RGB triple at `(x, y)`. Caller guarantees bounds.
    #[inline]
    pub fn rgb(&self, x: usize, y: usize) -> (u8, u8, u8) {
        let i = 3 * (y * self.width + x);
        (self.data[i], self.data[i + 1], self.data[i + 2])
    }
}

/// Owned grayscale buffer (e.g. the contrast-equalized detection input).
#[derive(Clone, Debug)]
pub struct GrayBuffer {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayBuffer {
    pub fn as_view(&self) -> GrayFrameView<'_> {
        GrayFrameView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

/// Owned binary image; pixels are 0 or 255.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl Mask {
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; width * height],
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x] != 0
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, on: bool) {
        self.data[y * self.width + x] = if on { 255 } else { 0 };
    }

    /// Number of set pixels.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }

    /// In-place logical AND with another mask of identical dimensions.
    pub fn and(&mut self, other: &Mask) {
        debug_assert_eq!(self.data.len(), other.data.len());
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            if b == 0 {
                *a = 0;
            }
        }
    }

    /// Pixels set in `self` but not in `prev` (saturating positive
    /// difference). This is the temporal-spike isolation step: anything
    /// present in both frames is dropped.
    pub fn diff_new(&self, prev: &Mask) -> Mask {
        debug_assert_eq!(self.data.len(), prev.data.len());
        let data = self
            .data
            .iter()
            .zip(&prev.data)
            .map(|(&cur, &old)| if cur != 0 && old == 0 { 255 } else { 0 })
            .collect();
        Mask {
            width: self.width,
            height: self.height,
            data,
        }
    }

    /// 3x3 erosion. Border pixels are treated as unset.
    pub fn erode3(&self) -> Mask {
        self.morph3(true)
    }

    /// 3x3 dilation.
    pub fn dilate3(&self) -> Mask {
        self.morph3(false)
    }

    /// Morphological opening with a 3x3 structuring element; suppresses
    /// single-pixel noise before blob extraction.
    pub fn open3(&self) -> Mask {
        self.erode3().dilate3()
    }

    fn morph3(&self, erode: bool) -> Mask {
        let mut out = Mask::zeros(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let mut keep = erode;
                'win: for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        let nx = x as i32 + dx;
                        let ny = y as i32 + dy;
                        let on = nx >= 0
                            && ny >= 0
                            && nx < self.width as i32
                            && ny < self.height as i32
                            && self.get(nx as usize, ny as usize);
                        if erode && !on {
                            keep = false;
                            break 'win;
                        }
                        if !erode && on {
                            keep = true;
                            break 'win;
                        }
                    }
                }
                out.set(x, y, keep);
            }
        }
        out
    }
}

#[inline]
fn get_gray(src: &GrayFrameView<'_>, x: i32, y: i32) -> u8 {
    if x < 0 || y < 0 || x >= src.width as i32 || y >= src.height as i32 {
        return 0;
    }
    src.data[y as usize * src.width + x as usize]
}

/// Bilinear sample of a grayscale view; out-of-bounds neighbors read as 0.
#[inline]
pub fn sample_bilinear(src: &GrayFrameView<'_>, x: f32, y: f32) -> f32 {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = get_gray(src, x0, y0) as f32;
    let p10 = get_gray(src, x0 + 1, y0) as f32;
    let p01 = get_gray(src, x0, y0 + 1) as f32;
    let p11 = get_gray(src, x0 + 1, y0 + 1) as f32;

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

#[inline]
pub fn sample_bilinear_u8(src: &GrayFrameView<'_>, x: f32, y: f32) -> u8 {
    sample_bilinear(src, x, y).clamp(0.0, 255.0) as u8
}
