//! Conversion of raw grab payloads to 24-bit BGR

use serde::{Deserialize, Serialize};

use crate::common::PixelFormat;
use crate::error::{CameraError, Result};
use crate::frame::{BgrImage, RawFrame};

/// Where the significant bits of a wider-than-8-bit sample end up in the 8-bit output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BitAlignment {
    /// Keep the most significant bits (the output uses the full 0..=255 range).
    #[default]
    MsbAligned,
    /// Keep the least significant bits, saturating at 255.
    LsbAligned,
}

/// Converts any supported raw layout into packed BGR8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFormatConverter {
    output_pixel_format: PixelFormat,
    pub output_bit_alignment: BitAlignment,
}

impl Default for ImageFormatConverter {
    fn default() -> Self {
        Self {
            output_pixel_format: PixelFormat::Bgr8,
            output_bit_alignment: BitAlignment::MsbAligned,
        }
    }
}

impl ImageFormatConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always `Bgr8`.
    pub fn output_pixel_format(&self) -> PixelFormat {
        self.output_pixel_format
    }

    pub fn convert(&self, frame: &RawFrame) -> Result<BgrImage> {
        let expected = frame.expected_len();
        if frame.data.len() != expected {
            return Err(CameraError::BufferSize { expected, actual: frame.data.len() });
        }
        let (w, h) = (frame.width as usize, frame.height as usize);
        let src = &frame.data;
        let mut out = Vec::with_capacity(w * h * 3);

        match frame.pixel_format {
            PixelFormat::Bgr8 => out.extend_from_slice(src),
            PixelFormat::Rgb8 => {
                for p in src.chunks_exact(3) {
                    out.extend_from_slice(&[p[2], p[1], p[0]]);
                }
            }
            PixelFormat::Mono8 => {
                for &v in src {
                    out.extend_from_slice(&[v, v, v]);
                }
            }
            PixelFormat::Mono10 | PixelFormat::Mono12 | PixelFormat::Mono16 => {
                let bits = frame.pixel_format.mono_bit_depth().unwrap_or(16);
                for s in src.chunks_exact(2) {
                    let v = self.reduce_to_8bit(u16::from_le_bytes([s[0], s[1]]), bits);
                    out.extend_from_slice(&[v, v, v]);
                }
            }
            PixelFormat::YCbCr422_8 => convert_yuyv(src, w, h, &mut out),
            format if format.is_bayer() => {
                out.resize(w * h * 3, 0);
                demosaic_blocks(src, w, h, format, &mut out);
            }
            other => return Err(CameraError::UnsupportedPixelFormat(other.to_string())),
        }

        BgrImage::from_raw(frame.width, frame.height, out)
    }

    fn reduce_to_8bit(&self, sample: u16, bits: u32) -> u8 {
        match self.output_bit_alignment {
            BitAlignment::MsbAligned => (sample >> (bits - 8)).min(255) as u8,
            BitAlignment::LsbAligned => sample.min(255) as u8,
        }
    }
}

/// 2x2 block demosaic: every block yields one BGR value (green averaged) written to all four
/// of its pixels. Odd trailing rows/columns reuse the last full block.
fn demosaic_blocks(src: &[u8], w: usize, h: usize, format: PixelFormat, out: &mut [u8]) {
    if w == 0 || h == 0 {
        return;
    }
    let last_x0 = w.saturating_sub(2);
    let last_y0 = h.saturating_sub(2);

    for by in (0..h).step_by(2) {
        let y0 = by.min(last_y0);
        for bx in (0..w).step_by(2) {
            let x0 = bx.min(last_x0);
            let mut sum = [0u32; 3];
            let mut count = [0u32; 3];
            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                let x = (x0 + dx).min(w - 1);
                let y = (y0 + dy).min(h - 1);
                if let Some(c) = format.cfa_channel(x as u32, y as u32) {
                    sum[c] += u32::from(src[y * w + x]);
                    count[c] += 1;
                }
            }
            // Degenerate 1-pixel-wide frames lack some filters; fall back to the block mean.
            let mean = sum.iter().sum::<u32>() / count.iter().sum::<u32>().max(1);
            let channel =
                |c: usize| if count[c] == 0 { mean as u8 } else { (sum[c] / count[c]) as u8 };
            let bgr = [channel(2), channel(1), channel(0)];

            for y in by..(by + 2).min(h) {
                for x in bx..(bx + 2).min(w) {
                    let i = (y * w + x) * 3;
                    out[i..i + 3].copy_from_slice(&bgr);
                }
            }
        }
    }
}

/// YUYV (Y0 Cb Y1 Cr) with full-range BT.601 coefficients.
fn convert_yuyv(src: &[u8], w: usize, h: usize, out: &mut Vec<u8>) {
    let row_len = w * 2;
    for row in 0..h {
        let line = &src[row * row_len..(row + 1) * row_len];
        let mut x = 0;
        while x < w {
            let i = x * 2;
            let y0 = line[i];
            let cb = line[i + 1];
            if x + 1 < w {
                let y1 = line[i + 2];
                let cr = line[i + 3];
                out.extend_from_slice(&ycbcr_to_bgr(y0, cb, cr));
                out.extend_from_slice(&ycbcr_to_bgr(y1, cb, cr));
            } else {
                out.extend_from_slice(&ycbcr_to_bgr(y0, cb, 128));
            }
            x += 2;
        }
    }
}

fn ycbcr_to_bgr(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let y = f32::from(y);
    let cb = f32::from(cb) - 128.0;
    let cr = f32::from(cr) - 128.0;
    let q = |v: f32| v.round().clamp(0.0, 255.0) as u8;
    let r = y + 1.402 * cr;
    let g = y - 0.344_136 * cb - 0.714_136 * cr;
    let b = y + 1.772 * cb;
    [q(b), q(g), q(r)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::TestPattern;

    fn solid_bayer(format: PixelFormat, w: u32, h: u32, rgb: [u8; 3]) -> RawFrame {
        let mut data = Vec::new();
        for y in 0..h {
            for x in 0..w {
                data.push(rgb[format.cfa_channel(x, y).unwrap()]);
            }
        }
        RawFrame::new(w, h, format, data)
    }

    #[test]
    fn output_is_always_bgr8() {
        let conv = ImageFormatConverter::new();
        assert_eq!(conv.output_pixel_format(), PixelFormat::Bgr8);
        let img = conv
            .convert(&RawFrame::test_pattern(40, 30, PixelFormat::Mono8, TestPattern::Gradient))
            .unwrap();
        assert_eq!(img.as_array().dim(), (30, 40, 3));
        assert_eq!(img.pixel_format(), PixelFormat::Bgr8);
    }

    #[test]
    fn rgb_is_swapped_to_bgr() {
        let frame = RawFrame::new(2, 1, PixelFormat::Rgb8, vec![1, 2, 3, 4, 5, 6]);
        let img = ImageFormatConverter::new().convert(&frame).unwrap();
        assert_eq!(img.as_raw(), &[3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn mono12_keeps_the_most_significant_bits() {
        let data = [0x0fffu16, 0x0800].iter().flat_map(|v| v.to_le_bytes()).collect();
        let frame = RawFrame::new(2, 1, PixelFormat::Mono12, data);
        let img = ImageFormatConverter::new().convert(&frame).unwrap();
        assert_eq!(img.pixel(0, 0), Some([255, 255, 255]));
        assert_eq!(img.pixel(1, 0), Some([128, 128, 128]));

        let lsb = ImageFormatConverter {
            output_bit_alignment: BitAlignment::LsbAligned,
            ..Default::default()
        };
        assert_eq!(lsb.convert(&frame).unwrap().pixel(1, 0), Some([255, 255, 255]));
    }

    #[test]
    fn bayer_solid_color_survives_demosaic() {
        let rgb = [200, 100, 50];
        for format in [
            PixelFormat::BayerRg8,
            PixelFormat::BayerBg8,
            PixelFormat::BayerGb8,
            PixelFormat::BayerGr8,
        ] {
            let img =
                ImageFormatConverter::new().convert(&solid_bayer(format, 5, 3, rgb)).unwrap();
            for (x, y) in [(0, 0), (3, 1), (4, 2)] {
                assert_eq!(img.pixel(x, y), Some([50, 100, 200]), "{format} at ({x},{y})");
            }
        }
    }

    #[test]
    fn yuyv_gray_stays_gray() {
        let frame = RawFrame::new(3, 1, PixelFormat::YCbCr422_8, vec![90, 128, 90, 128, 90, 128]);
        let img = ImageFormatConverter::new().convert(&frame).unwrap();
        for x in 0..3 {
            assert_eq!(img.pixel(x, 0), Some([90, 90, 90]));
        }
    }

    #[test]
    fn short_payload_is_rejected() {
        let frame = RawFrame::new(4, 4, PixelFormat::Rgb8, vec![0; 10]);
        assert_eq!(
            ImageFormatConverter::new().convert(&frame).unwrap_err(),
            CameraError::BufferSize { expected: 48, actual: 10 }
        );
    }
}
