//! Image normalisation: arbitrary raster image → model-ready tensor.
//!
//! ## Why pad to a square instead of stretching?
//!
//! Document photos arrive in every aspect ratio. Stretching to the model's
//! square input distorts glyphs and ruins small print; padding onto a white
//! canvas preserves geometry, and white matches the paper background the
//! model saw in training. The canvas is `max(longer_side, input_size)` so
//! small documents are never blown up past their native resolution — they
//! sit centred in white space instead.
//!
//! ## Why a minimum dimension?
//!
//! A degenerate sliver (a 3-px-tall crop) would vanish entirely after the
//! final downsample. Inputs below `min_size` in either dimension are first
//! upscaled isotropically so both dimensions reach at least `min_size`.
//!
//! Lanczos resampling is used for both directions — the quality choice for
//! text, matching PIL's `LANCZOS`.

use crate::error::TaskError;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use std::path::Path;
use tracing::debug;

/// Per-channel normalisation statistics (standard ImageNet values).
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// A single-item batch of normalised pixels in CHW plane order.
///
/// Layout: `[R0..Rn, G0..Gn, B0..Bn]` for shape `[1, 3, H, W]`. Each value
/// is `(x/255 − mean_c) / std_c`.
#[derive(Debug, Clone)]
pub struct PixelTensor {
    data: Vec<f32>,
    shape: [usize; 4],
}

impl PixelTensor {
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// `[batch, channels, height, width]`.
    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn height(&self) -> usize {
        self.shape[2]
    }

    pub fn width(&self) -> usize {
        self.shape[3]
    }
}

/// Decode the image at `path` and normalise it to `input_size × input_size`.
///
/// Steps: convert to RGB, upscale below `min_size`, paste centred onto a
/// white square canvas of `max(longer_side, input_size)`, downsample the
/// canvas to `input_size` if larger, then ImageNet-normalise. Any decode
/// failure surfaces as [`TaskError::ImageDecode`]; there is no partial
/// output.
pub fn normalize_image(
    path: &Path,
    input_size: u32,
    min_size: u32,
) -> Result<PixelTensor, TaskError> {
    let decoded = image::open(path).map_err(|e| TaskError::ImageDecode {
        detail: format!("{}: {e}", path.display()),
    })?;
    let rgb = decoded.to_rgb8();
    debug!(
        "Decoded {} → {}x{} px",
        path.display(),
        rgb.width(),
        rgb.height()
    );
    Ok(normalize_rgb(rgb, input_size, min_size))
}

/// Normalise an already-decoded RGB image. Infallible: resampling and
/// padding cannot fail once decode succeeded.
pub fn normalize_rgb(mut image: RgbImage, input_size: u32, min_size: u32) -> PixelTensor {
    let (w, h) = image.dimensions();

    // Enforce minimum dimensions with a uniform scale factor.
    if w < min_size || h < min_size {
        let scale = f64::max(min_size as f64 / w as f64, min_size as f64 / h as f64);
        let new_w = min_size.max((w as f64 * scale) as u32);
        let new_h = min_size.max((h as f64 * scale) as u32);
        image = imageops::resize(&image, new_w, new_h, FilterType::Lanczos3);
    }

    // White square canvas, image pasted centred.
    let (w, h) = image.dimensions();
    let square = w.max(h).max(input_size);
    let mut canvas = RgbImage::from_pixel(square, square, Rgb([255, 255, 255]));
    let paste_x = ((square - w) / 2) as i64;
    let paste_y = ((square - h) / 2) as i64;
    imageops::replace(&mut canvas, &image, paste_x, paste_y);

    let canvas = if square > input_size {
        imageops::resize(&canvas, input_size, input_size, FilterType::Lanczos3)
    } else {
        canvas
    };

    to_tensor(&canvas)
}

/// Pack an RGB image into a normalised CHW tensor buffer.
fn to_tensor(image: &RgbImage) -> PixelTensor {
    let width = image.width() as usize;
    let height = image.height() as usize;
    let num_pixels = width * height;
    let raw = image.as_raw();

    let mut data = vec![0.0f32; num_pixels * 3];
    for i in 0..num_pixels {
        for c in 0..3 {
            let v = raw[3 * i + c] as f32 / 255.0;
            data[c * num_pixels + i] = (v - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }

    PixelTensor {
        data,
        shape: [1, 3, height, width],
    }
}
