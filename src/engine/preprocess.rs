//! Image preprocessing for the fire classifier
//!
//! decode (base64 → RGB) → area resize to a square edge → per-channel
//! normalization into an HWC `f32` tensor. The resize and normalization must
//! reproduce the training pipeline exactly; a mismatch silently degrades
//! predictions instead of failing.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::{GenericImageView, Rgb, RgbImage};
use ndarray::{Array3, Array4, Axis};
use serde::Deserialize;

use crate::error::DecodeError;

/// ImageNet channel means in BGR order (Keras "caffe" mode).
const CAFFE_MEAN_BGR: [f32; 3] = [103.939, 116.779, 123.68];

/// ImageNet channel statistics in RGB order (Keras "torch" mode).
const TORCH_MEAN_RGB: [f32; 3] = [0.485, 0.456, 0.406];
const TORCH_STD_RGB: [f32; 3] = [0.229, 0.224, 0.225];

/// Per-channel normalization applied after resizing.
///
/// Names follow the `mode` argument of Keras `preprocess_input`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// BGR channel order, ImageNet mean subtracted, no scaling (ResNet50).
    Caffe,
    /// RGB scaled to [-1, 1].
    Tf,
    /// RGB scaled to [0, 1], then ImageNet mean/std standardized.
    Torch,
}

impl Normalization {
    pub fn as_str(&self) -> &'static str {
        match self {
            Normalization::Caffe => "caffe",
            Normalization::Tf => "tf",
            Normalization::Torch => "torch",
        }
    }

    /// Normalize one RGB pixel into the model's channel layout.
    #[inline]
    pub fn apply(&self, [r, g, b]: [u8; 3]) -> [f32; 3] {
        let (r, g, b) = (r as f32, g as f32, b as f32);
        match self {
            Normalization::Caffe => [
                b - CAFFE_MEAN_BGR[0],
                g - CAFFE_MEAN_BGR[1],
                r - CAFFE_MEAN_BGR[2],
            ],
            Normalization::Tf => [r / 127.5 - 1.0, g / 127.5 - 1.0, b / 127.5 - 1.0],
            Normalization::Torch => {
                let rgb = [r / 255.0, g / 255.0, b / 255.0];
                [
                    (rgb[0] - TORCH_MEAN_RGB[0]) / TORCH_STD_RGB[0],
                    (rgb[1] - TORCH_MEAN_RGB[1]) / TORCH_STD_RGB[1],
                    (rgb[2] - TORCH_MEAN_RGB[2]) / TORCH_STD_RGB[2],
                ]
            }
        }
    }
}

/// Model input for a single image: `(edge, edge, 3)`, channels last.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessedTensor(Array3<f32>);

impl PreprocessedTensor {
    pub fn as_array(&self) -> &Array3<f32> {
        &self.0
    }

    pub fn edge(&self) -> usize {
        self.0.shape()[0]
    }

    /// Add the leading batch axis: `(1, edge, edge, 3)`.
    pub fn into_batch(self) -> Array4<f32> {
        self.0.insert_axis(Axis(0))
    }
}

/// Decode a base64 payload into a 3-channel RGB image.
///
/// Surrounding whitespace is ignored. Alpha is dropped and grayscale is
/// expanded. EXIF orientation is not applied.
pub fn decode_image(input: Option<&str>) -> Result<RgbImage, DecodeError> {
    let encoded = input
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(DecodeError::EmptyInput)?;

    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| DecodeError::Base64Error(e.to_string()))?;

    decode_image_bytes(&bytes)
}

/// Decode raw image bytes (JPEG, PNG, ...) into RGB.
pub fn decode_image_bytes(data: &[u8]) -> Result<RgbImage, DecodeError> {
    let image = image::load_from_memory(data)
        .map_err(|e| DecodeError::ImageFormatError(e.to_string()))?;

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(DecodeError::ImageFormatError(format!(
            "image has no pixels ({}x{})",
            width, height
        )));
    }

    Ok(image.to_rgb8())
}

/// Resize to `edge × edge` with area interpolation and normalize.
///
/// `edge` must be at least 1.
pub fn preprocess(image: &RgbImage, edge: u32, normalization: Normalization) -> PreprocessedTensor {
    let resized = resize_area(image, edge, edge);
    let side = edge as usize;

    let mut tensor = Array3::<f32>::zeros((side, side, 3));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let values = normalization.apply(pixel.0);
        for (c, v) in values.into_iter().enumerate() {
            tensor[[y as usize, x as usize, c]] = v;
        }
    }

    PreprocessedTensor(tensor)
}

/// Contribution of one source pixel to a destination pixel along one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Tap {
    src: usize,
    weight: f64,
}

/// Upscale tap with an 11-bit fixed-point weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FixedTap {
    src: usize,
    weight: i32,
}

/// Fixed-point scale of upscale coefficients (OpenCV `INTER_RESIZE_COEF_SCALE`).
const COEF_BITS: u32 = 11;
const COEF_SCALE: f64 = (1 << COEF_BITS) as f64;

/// Area-interpolation resize with OpenCV `INTER_AREA` semantics.
///
/// - Exact 2x shrink on both axes: integer 2×2 mean, `(sum + 2) >> 2`.
/// - Other shrinks: coverage-weighted mean, rounded half to even.
/// - Any axis grows: INTER_AREA upscale weights in 11-bit fixed point on both
///   axes, rounded half up.
pub fn resize_area(image: &RgbImage, dst_w: u32, dst_h: u32) -> RgbImage {
    let (src_w, src_h) = image.dimensions();
    if (src_w, src_h) == (dst_w, dst_h) {
        image.clone()
    } else if src_w == 2 * dst_w && src_h == 2 * dst_h {
        resize_half(image, dst_w, dst_h)
    } else if dst_w <= src_w && dst_h <= src_h {
        resize_shrink(image, &area_taps(src_w, dst_w), &area_taps(src_h, dst_h))
    } else {
        resize_grow(image, &upscale_taps(src_w, dst_w), &upscale_taps(src_h, dst_h))
    }
}

fn resize_half(image: &RgbImage, dst_w: u32, dst_h: u32) -> RgbImage {
    RgbImage::from_fn(dst_w, dst_h, |dx, dy| {
        let (sx, sy) = (dx * 2, dy * 2);
        let quad = [
            image.get_pixel(sx, sy).0,
            image.get_pixel(sx + 1, sy).0,
            image.get_pixel(sx, sy + 1).0,
            image.get_pixel(sx + 1, sy + 1).0,
        ];
        let mut out = [0u8; 3];
        for c in 0..3 {
            let sum: u32 = quad.iter().map(|p| p[c] as u32).sum();
            out[c] = ((sum + 2) >> 2) as u8;
        }
        Rgb(out)
    })
}

fn resize_shrink(image: &RgbImage, x_taps: &[Vec<Tap>], y_taps: &[Vec<Tap>]) -> RgbImage {
    let (_, src_h) = image.dimensions();
    let dst_w = x_taps.len();

    // Horizontal pass: src_h rows of dst_w pixels.
    let mut rows = vec![[0f64; 3]; src_h as usize * dst_w];
    for y in 0..src_h {
        for (dx, taps) in x_taps.iter().enumerate() {
            let acc = &mut rows[y as usize * dst_w + dx];
            for tap in taps {
                let p = image.get_pixel(tap.src as u32, y).0;
                for c in 0..3 {
                    acc[c] += p[c] as f64 * tap.weight;
                }
            }
        }
    }

    let mut output = RgbImage::new(dst_w as u32, y_taps.len() as u32);
    for (dy, taps) in y_taps.iter().enumerate() {
        for dx in 0..dst_w {
            let mut acc = [0f64; 3];
            for tap in taps {
                let row = &rows[tap.src * dst_w + dx];
                for c in 0..3 {
                    acc[c] += row[c] * tap.weight;
                }
            }
            let pixel = output.get_pixel_mut(dx as u32, dy as u32);
            for c in 0..3 {
                pixel.0[c] = acc[c].round_ties_even().clamp(0.0, 255.0) as u8;
            }
        }
    }

    output
}

fn resize_grow(image: &RgbImage, x_taps: &[Vec<FixedTap>], y_taps: &[Vec<FixedTap>]) -> RgbImage {
    let (_, src_h) = image.dimensions();
    let dst_w = x_taps.len();

    // Rows carry COEF_BITS of fraction, the output 2 * COEF_BITS.
    let mut rows = vec![[0i64; 3]; src_h as usize * dst_w];
    for y in 0..src_h {
        for (dx, taps) in x_taps.iter().enumerate() {
            let acc = &mut rows[y as usize * dst_w + dx];
            for tap in taps {
                let p = image.get_pixel(tap.src as u32, y).0;
                for c in 0..3 {
                    acc[c] += p[c] as i64 * tap.weight as i64;
                }
            }
        }
    }

    let shift = 2 * COEF_BITS;
    let half = 1i64 << (shift - 1);
    let mut output = RgbImage::new(dst_w as u32, y_taps.len() as u32);
    for (dy, taps) in y_taps.iter().enumerate() {
        for dx in 0..dst_w {
            let mut acc = [0i64; 3];
            for tap in taps {
                let row = &rows[tap.src * dst_w + dx];
                for c in 0..3 {
                    acc[c] += row[c] * tap.weight as i64;
                }
            }
            let pixel = output.get_pixel_mut(dx as u32, dy as u32);
            for c in 0..3 {
                pixel.0[c] = ((acc[c] + half) >> shift).clamp(0, 255) as u8;
            }
        }
    }

    output
}

/// Coverage weights for shrinking `src_len` to `dst_len` (`dst_len <= src_len`).
fn area_taps(src_len: u32, dst_len: u32) -> Vec<Vec<Tap>> {
    let scale = src_len as f64 / dst_len as f64;
    let src_len = src_len as usize;

    (0..dst_len)
        .map(|d| {
            let start = d as f64 * scale;
            let end = (start + scale).min(src_len as f64);

            let mut taps = Vec::with_capacity(scale.ceil() as usize + 1);
            let mut s = start.floor() as usize;
            while s < src_len && (s as f64) < end {
                let covered = end.min(s as f64 + 1.0) - start.max(s as f64);
                // Slivers below 1e-3 of a pixel are dropped, like OpenCV.
                if covered > 1e-3 {
                    taps.push(Tap { src: s, weight: covered });
                }
                s += 1;
            }

            let total: f64 = taps.iter().map(|t| t.weight).sum();
            for tap in &mut taps {
                tap.weight /= total;
            }
            taps
        })
        .collect()
}

/// INTER_AREA weights when the image grows along some axis.
fn upscale_taps(src_len: u32, dst_len: u32) -> Vec<Vec<FixedTap>> {
    let scale = src_len as f64 / dst_len as f64;
    let inv_scale = dst_len as f64 / src_len as f64;
    let last = src_len as usize - 1;

    (0..dst_len)
        .map(|d| {
            let mut sx = (d as f64 * scale).floor() as usize;
            let mut fx = (d as f64 + 1.0) - (sx as f64 + 1.0) * inv_scale;
            fx = if fx <= 0.0 { 0.0 } else { fx - fx.floor() };

            if sx >= last {
                sx = last;
                fx = 0.0;
            }

            let right = (fx * COEF_SCALE).round_ties_even() as i32;
            let left = (1 << COEF_BITS) - right;
            if right == 0 {
                vec![FixedTap { src: sx, weight: left }]
            } else {
                vec![
                    FixedTap { src: sx, weight: left },
                    FixedTap { src: sx + 1, weight: right },
                ]
            }
        })
        .collect()
}
