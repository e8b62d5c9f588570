//! Raw grab buffers and the converted BGR image

use std::time::Instant;

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::{Array3, ArrayView3};

use crate::common::PixelFormat;
use crate::error::{CameraError, Result};

/// Payload of one grab result, copied out of the SDK buffer.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub data: Vec<u8>,
    pub frame_id: u64,
    pub timestamp: Instant,
}

impl RawFrame {
    pub fn new(width: u32, height: u32, pixel_format: PixelFormat, data: Vec<u8>) -> Self {
        RawFrame {
            width,
            height,
            pixel_format,
            data,
            frame_id: 0,
            timestamp: Instant::now(),
        }
    }

    /// Render a test pattern directly in `pixel_format`
    pub fn test_pattern(
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        pattern: TestPattern,
    ) -> Self {
        let data = encode_pattern(width, height, pixel_format, pattern);
        RawFrame::new(width, height, pixel_format, data)
    }

    /// Set frame ID for tracking
    pub fn with_frame_id(mut self, frame_id: u64) -> Self {
        self.frame_id = frame_id;
        self
    }

    /// Payload length implied by the geometry and pixel format.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.pixel_format.bytes_per_pixel()
    }

    /// Short form for logs, e.g. `640x480 BayerRG8`.
    pub fn describe(&self) -> String {
        format!("{}x{} {}", self.width, self.height, self.pixel_format)
    }
}

/// Synthetic scenes rendered by the simulated camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPattern {
    Gradient,
    Checkerboard,
    ColorBars,
}

impl TestPattern {
    /// Reference color of the pattern at `(x, y)`, as `[r, g, b]`.
    pub fn rgb_at(&self, x: u32, y: u32, width: u32) -> [u8; 3] {
        match self {
            TestPattern::Gradient => {
                let r = (x % 256) as u8;
                let g = (y % 256) as u8;
                let b = ((x + y) / 2 % 256) as u8;
                [r, g, b]
            }
            // 32 px squares, white at the origin
            TestPattern::Checkerboard => {
                if (x / 32 + y / 32) % 2 == 0 { [255, 255, 255] } else { [0, 0, 0] }
            }
            TestPattern::ColorBars => {
                const BARS: [[u8; 3]; 8] = [
                    [255, 255, 255],
                    [255, 255, 0],
                    [0, 255, 255],
                    [0, 255, 0],
                    [255, 0, 255],
                    [255, 0, 0],
                    [0, 0, 255],
                    [0, 0, 0],
                ];
                let bar = (x as usize * BARS.len()) / width.max(1) as usize;
                BARS[bar.min(BARS.len() - 1)]
            }
        }
    }
}

fn luma(rgb: [u8; 3]) -> u8 {
    let [r, g, b] = rgb.map(f32::from);
    (0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8
}

fn encode_pattern(width: u32, height: u32, format: PixelFormat, pattern: TestPattern) -> Vec<u8> {
    let mut data = Vec::with_capacity(width as usize * height as usize * format.bytes_per_pixel());
    for y in 0..height {
        match format {
            PixelFormat::YCbCr422_8 => {
                // YUYV: one (Cb, Cr) pair per two pixels
                let mut x = 0;
                while x < width {
                    let p0 = pattern.rgb_at(x, y, width);
                    let p1 = pattern.rgb_at((x + 1).min(width - 1), y, width);
                    let (y0, cb, cr) = rgb_to_ycbcr(p0);
                    let (y1, _, _) = rgb_to_ycbcr(p1);
                    data.extend_from_slice(&[y0, cb]);
                    if x + 1 < width {
                        data.extend_from_slice(&[y1, cr]);
                    }
                    x += 2;
                }
            }
            _ => {
                for x in 0..width {
                    let rgb = pattern.rgb_at(x, y, width);
                    match format {
                        PixelFormat::Mono8 => data.push(luma(rgb)),
                        PixelFormat::Mono10 | PixelFormat::Mono12 | PixelFormat::Mono16 => {
                            let bits = format.mono_bit_depth().unwrap_or(16);
                            let value = u16::from(luma(rgb)) << (bits - 8);
                            data.extend_from_slice(&value.to_le_bytes());
                        }
                        PixelFormat::Rgb8 => data.extend_from_slice(&rgb),
                        PixelFormat::Bgr8 => data.extend_from_slice(&[rgb[2], rgb[1], rgb[0]]),
                        _ => {
                            let channel = format.cfa_channel(x, y).unwrap_or(1);
                            data.push(rgb[channel]);
                        }
                    }
                }
            }
        }
    }
    data
}

fn rgb_to_ycbcr(rgb: [u8; 3]) -> (u8, u8, u8) {
    let [r, g, b] = rgb.map(f32::from);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let cb = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
    let cr = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
    let q = |v: f32| v.round().clamp(0.0, 255.0) as u8;
    (q(y), q(cb), q(cr))
}

/// Converted frame: `(height, width, 3)` bytes in B, G, R order.
#[derive(Debug, Clone, PartialEq)]
pub struct BgrImage {
    data: Array3<u8>,
}

impl BgrImage {
    /// Wrap an existing `(height, width, 3)` array. Other channel counts are rejected.
    pub fn from_array(data: Array3<u8>) -> Result<Self> {
        let (_, _, channels) = data.dim();
        if channels != 3 {
            return Err(CameraError::BufferSize { expected: 3, actual: channels });
        }
        let data =
            if data.is_standard_layout() { data } else { data.as_standard_layout().into_owned() };
        Ok(BgrImage { data })
    }

    /// Build from packed, row-major BGR bytes.
    pub fn from_raw(width: u32, height: u32, bgr: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        let actual = bgr.len();
        if actual != expected {
            return Err(CameraError::BufferSize { expected, actual });
        }
        let data = Array3::from_shape_vec((height as usize, width as usize, 3), bgr)
            .map_err(|_| CameraError::BufferSize { expected, actual })?;
        Ok(BgrImage { data })
    }

    pub fn width(&self) -> u32 {
        self.data.dim().1 as u32
    }

    pub fn height(&self) -> u32 {
        self.data.dim().0 as u32
    }

    /// Always [`PixelFormat::Bgr8`].
    pub fn pixel_format(&self) -> PixelFormat {
        PixelFormat::Bgr8
    }

    pub fn as_array(&self) -> ArrayView3<'_, u8> {
        self.data.view()
    }

    pub fn into_array(self) -> Array3<u8> {
        self.data
    }

    /// Packed BGR bytes, row-major.
    pub fn as_raw(&self) -> &[u8] {
        self.data.as_slice().unwrap_or(&[])
    }

    /// `[b, g, r]` at column `x`, row `y`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        let (x, y) = (x as usize, y as usize);
        if y >= self.data.dim().0 || x >= self.data.dim().1 {
            return None;
        }
        Some([self.data[[y, x, 0]], self.data[[y, x, 1]], self.data[[y, x, 2]]])
    }

    /// Copy into an `image` buffer with the channels swapped to RGB, e.g. for PNG export.
    pub fn to_rgb_image(&self) -> RgbImage {
        let rgb = self
            .as_raw()
            .chunks_exact(3)
            .flat_map(|p| [p[2], p[1], p[0]])
            .collect::<Vec<u8>>();
        // Length always matches width * height * 3.
        RgbImage::from_raw(self.width(), self.height(), rgb).unwrap_or_default()
    }

    /// Resize for display. Zero dimensions are bumped to one pixel.
    pub fn resized(&self, width: u32, height: u32) -> BgrImage {
        let (width, height) = (width.max(1), height.max(1));
        if width == self.width() && height == self.height() {
            return self.clone();
        }
        // Channel order is irrelevant to the filter, so BGR rides in an RgbImage container.
        let raw = self.as_raw().to_vec();
        let Some(src) = RgbImage::from_raw(self.width(), self.height(), raw) else {
            return self.clone();
        };
        let dst = imageops::resize(&src, width, height, FilterType::Triangle);
        let (w, h) = dst.dimensions();
        match Array3::from_shape_vec((h as usize, w as usize, 3), dst.into_raw()) {
            Ok(data) => BgrImage { data },
            Err(_) => self.clone(),
        }
    }
}
