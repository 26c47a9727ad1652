//! Multi-scale oriented keypoints.

use image::imageops::{self, FilterType};
use image::GrayImage;
use photo_align_core::{ImageView, Point};
use serde::{Deserialize, Serialize};

use crate::fast::detect_corners;
use crate::params::MatcherParams;

/// Keypoints closer than this to a level's edge are discarded, so the
/// orientation disc and the rotated descriptor pattern always fit.
pub(crate) const BORDER: usize = 16;

/// Radius of the intensity-centroid disc.
const ORIENTATION_RADIUS: i32 = 15;

/// A keypoint in full-resolution image coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    /// Position in level-0 pixel coordinates (pixel `i` spans `[i, i + 1)`).
    pub position: Point,
    /// Pyramid level the keypoint was detected on.
    pub level: usize,
    /// Orientation in radians, from the intensity centroid.
    pub angle: f32,
    /// Harris response on its level.
    pub response: f32,
}

/// One pyramid level together with its scale relative to level 0.
pub(crate) struct Level {
    pub image: GrayImage,
    pub scale_x: f64,
    pub scale_y: f64,
}

/// Borrow a `GrayImage` as a single-channel core view.
pub(crate) fn gray_view(img: &GrayImage) -> ImageView<'_> {
    ImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        channels: 1,
        data: img.as_raw(),
    }
}

/// Gray pyramid; every level is resampled directly from level 0.
pub(crate) fn build_pyramid(gray: GrayImage, params: &MatcherParams) -> Vec<Level> {
    let levels = params.levels.max(1);
    let factor = params.scale_factor.max(1.0) as f64;
    let (w0, h0) = (gray.width() as f64, gray.height() as f64);
    let mut out = Vec::with_capacity(levels);
    for l in 1..levels {
        let s = factor.powi(l as i32);
        let w = (w0 / s).round() as u32;
        let h = (h0 / s).round() as u32;
        if w as usize <= 2 * BORDER || h as usize <= 2 * BORDER {
            break;
        }
        out.push(Level {
            image: imageops::resize(&gray, w, h, FilterType::Triangle),
            scale_x: w0 / w as f64,
            scale_y: h0 / h as f64,
        });
    }
    out.insert(
        0,
        Level {
            image: gray,
            scale_x: 1.0,
            scale_y: 1.0,
        },
    );
    out
}

/// Split `total` keypoints over `levels`, geometrically decreasing with scale.
pub(crate) fn level_budgets(total: usize, levels: usize, scale_factor: f32) -> Vec<usize> {
    if levels == 0 {
        return Vec::new();
    }
    let f = 1.0 / scale_factor.max(1.0) as f64;
    let mut budgets = Vec::with_capacity(levels);
    if (1.0 - f).abs() < 1e-9 {
        let per = total / levels;
        budgets.resize(levels, per);
    } else {
        let first = total as f64 * (1.0 - f) / (1.0 - f.powi(levels as i32));
        for l in 0..levels {
            budgets.push((first * f.powi(l as i32)).round() as usize);
        }
    }
    let assigned: usize = budgets[..levels - 1].iter().sum();
    budgets[levels - 1] = total.saturating_sub(assigned);
    budgets
}

/// Intensity-centroid orientation of the disc around `(x, y)`.
pub(crate) fn orientation(img: &ImageView<'_>, x: usize, y: usize) -> f32 {
    let r = ORIENTATION_RADIUS;
    let (mut m10, mut m01) = (0i64, 0i64);
    for dy in -r..=r {
        let row = (y as i32 + dy) as usize * img.width;
        for dx in -r..=r {
            if dx * dx + dy * dy > r * r {
                continue;
            }
            let v = img.data[row + (x as i32 + dx) as usize] as i64;
            m10 += dx as i64 * v;
            m01 += dy as i64 * v;
        }
    }
    (m01 as f32).atan2(m10 as f32)
}

/// Detect up to `budget` oriented keypoints on one level.
pub(crate) fn detect_on_level(
    level: &Level,
    index: usize,
    budget: usize,
    params: &MatcherParams,
) -> Vec<Keypoint> {
    let view = gray_view(&level.image);
    let mut corners = detect_corners(&view, params.fast_threshold, params.harris_k, BORDER);
    corners.truncate(budget);
    corners
        .into_iter()
        .map(|c| Keypoint {
            position: Point::new(
                (c.x as f64 + 0.5) * level.scale_x,
                (c.y as f64 + 0.5) * level.scale_y,
            ),
            level: index,
            angle: orientation(&view, c.x, c.y),
            response: c.response,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use photo_align_core::Image;

    #[test]
    fn budgets_sum_to_total_and_decrease() {
        let b = level_budgets(500, 4, 1.2);
        assert_eq!(b.iter().sum::<usize>(), 500);
        assert!(b[0] > b[1] && b[1] > b[2]);
        assert_eq!(level_budgets(7, 1, 1.2), vec![7]);
        assert_eq!(level_budgets(9, 3, 1.0), vec![3, 3, 3]);
    }

    #[test]
    fn pyramid_stops_before_levels_get_too_small() {
        let params = MatcherParams {
            levels: 8,
            scale_factor: 1.5,
            ..MatcherParams::default()
        };
        let pyr = build_pyramid(GrayImage::new(60, 60), &params);
        // 60 / 1.5 = 40 still fits the border, 60 / 2.25 ≈ 27 does not
        assert_eq!(pyr.len(), 2);
        assert_eq!(pyr[1].image.width(), 40);
        assert_abs_diff_eq!(pyr[1].scale_x, 1.5);
    }

    #[test]
    fn orientation_points_towards_bright_side() {
        let img = Image::from_fn(40, 40, 1, |x, _, _| if x > 20 { 200 } else { 10 });
        let a = orientation(&img.view(), 20, 20);
        assert_abs_diff_eq!(a, 0.0, epsilon = 1e-3);

        let img = Image::from_fn(40, 40, 1, |_, y, _| if y > 20 { 200 } else { 10 });
        let a = orientation(&img.view(), 20, 20);
        assert_abs_diff_eq!(a, std::f32::consts::FRAC_PI_2, epsilon = 1e-3);
    }
}
