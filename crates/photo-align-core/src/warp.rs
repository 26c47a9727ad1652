//! Perspective resampling of one image into another image's pixel frame.

use crate::homography::Homography;
use crate::image::{sample_bilinear_channel, Image, ImageView};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Resampling kernel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    /// Copy the closest source pixel; never produces new colour values.
    #[default]
    Nearest,
    Bilinear,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WarpError {
    #[error("homography is not invertible")]
    NonInvertible,
}

/// Resample `source` into a `out_w × out_h` frame.
///
/// `h_dst_from_src` maps source pixel coordinates into output coordinates
/// (for the estimator's output: target → reference).
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(source, h_dst_from_src), fields(w = out_w, h = out_h))
)]
pub fn warp(
    source: &ImageView<'_>,
    h_dst_from_src: &Homography,
    out_w: usize,
    out_h: usize,
    interpolation: Interpolation,
) -> Result<Image, WarpError> {
    let h_src_from_dst = h_dst_from_src.inverse().ok_or(WarpError::NonInvertible)?;
    Ok(warp_perspective(
        source,
        &h_src_from_dst,
        out_w,
        out_h,
        interpolation,
    ))
}

/// For each output pixel center, map back into `src` via `h_src_from_dst`
/// and sample. Samples that land outside the source are black.
pub fn warp_perspective(
    src: &ImageView<'_>,
    h_src_from_dst: &Homography,
    out_w: usize,
    out_h: usize,
    interpolation: Interpolation,
) -> Image {
    let channels = src.channels;
    let mut out = Image::new(out_w, out_h, channels);
    let (sw, sh) = (src.width as f64, src.height as f64);

    for y in 0..out_h {
        for x in 0..out_w {
            let p = h_src_from_dst.apply(Point2::new(x as f64 + 0.5, y as f64 + 0.5));
            if !(p.x >= 0.0 && p.y >= 0.0 && p.x < sw && p.y < sh) {
                continue;
            }
            let dst = (y * out_w + x) * channels;
            match interpolation {
                Interpolation::Nearest => {
                    let sx = p.x.floor() as usize;
                    let sy = p.y.floor() as usize;
                    let s = (sy * src.width + sx) * channels;
                    out.data[dst..dst + channels].copy_from_slice(&src.data[s..s + channels]);
                }
                Interpolation::Bilinear => {
                    // integer coordinates are pixel centers for the sampler
                    let fx = (p.x - 0.5) as f32;
                    let fy = (p.y - 0.5) as f32;
                    for c in 0..channels {
                        let v = sample_bilinear_edge(src, fx, fy, c);
                        out.data[dst + c] = v.round().clamp(0.0, 255.0) as u8;
                    }
                }
            }
        }
    }

    out
}

// Clamp taps to the image so border pixels are not darkened by the zero
// padding of `sample_bilinear_channel`.
#[inline]
fn sample_bilinear_edge(src: &ImageView<'_>, x: f32, y: f32, c: usize) -> f32 {
    let max_x = src.width.saturating_sub(1) as f32;
    let max_y = src.height.saturating_sub(1) as f32;
    sample_bilinear_channel(src, x.clamp(0.0, max_x), y.clamp(0.0, max_y), c)
}
