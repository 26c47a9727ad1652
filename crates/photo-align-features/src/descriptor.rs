//! Steered BRIEF: 256 intensity comparisons rotated by the keypoint angle.

use image::GrayImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Test pairs lie inside this disc around the keypoint.
const PATTERN_RADIUS: i32 = 13;
const PATTERN_PAIRS: usize = 256;
/// Half-size of the smoothing box (5×5).
const BLUR_RADIUS: u32 = 2;

/// 256-bit binary descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Descriptor(pub [u64; 4]);

impl Descriptor {
    #[inline]
    pub fn hamming(&self, other: &Descriptor) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    #[inline]
    fn set_bit(&mut self, i: usize) {
        self.0[i / 64] |= 1u64 << (i % 64);
    }
}

/// Fixed sampling pattern shared by every image described with the same seed.
#[derive(Clone, Debug)]
pub(crate) struct BriefPattern {
    pairs: Vec<[(f32, f32); 2]>,
}

impl BriefPattern {
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut point = || loop {
            let x = rng.gen_range(-PATTERN_RADIUS..=PATTERN_RADIUS);
            let y = rng.gen_range(-PATTERN_RADIUS..=PATTERN_RADIUS);
            if x * x + y * y <= PATTERN_RADIUS * PATTERN_RADIUS {
                return (x as f32, y as f32);
            }
        };
        let mut pairs = Vec::with_capacity(PATTERN_PAIRS);
        while pairs.len() < PATTERN_PAIRS {
            let a = point();
            let b = point();
            if a != b {
                pairs.push([a, b]);
            }
        }
        Self { pairs }
    }

    /// Describe the keypoint at integer position `(x, y)` of `smoothed`.
    ///
    /// The caller guarantees a margin of `PATTERN_RADIUS + 1` pixels.
    pub fn describe(&self, smoothed: &GrayImage, x: u32, y: u32, angle: f32) -> Descriptor {
        let (s, c) = angle.sin_cos();
        let sample = |(px, py): (f32, f32)| {
            let rx = (c * px - s * py).round() as i32;
            let ry = (s * px + c * py).round() as i32;
            let xi = (x as i32 + rx) as u32;
            let yi = (y as i32 + ry) as u32;
            smoothed.get_pixel(xi, yi).0[0]
        };
        let mut d = Descriptor([0; 4]);
        for (i, [a, b]) in self.pairs.iter().enumerate() {
            if sample(*a) < sample(*b) {
                d.set_bit(i);
            }
        }
        d
    }
}

/// 5×5 box smoothing applied before the intensity tests.
pub(crate) fn box_blur(src: &GrayImage) -> GrayImage {
    imageproc::filter::box_filter(src, BLUR_RADIUS, BLUR_RADIUS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn textured(w: u32, h: u32, dx: u32, dy: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            let (x, y) = (x + dx, y + dy);
            Luma([((x * 37 + y * 91 + x * y) % 251) as u8])
        })
    }

    #[test]
    fn hamming_counts_differing_bits() {
        let a = Descriptor([0, 0, 0, 0]);
        let b = Descriptor([0b1011, 0, u64::MAX, 1]);
        assert_eq!(a.hamming(&b), 3 + 64 + 1);
        assert_eq!(b.hamming(&b), 0);
    }

    #[test]
    fn pattern_is_seeded() {
        let a = BriefPattern::new(7);
        let b = BriefPattern::new(7);
        let c = BriefPattern::new(8);
        assert_eq!(a.pairs, b.pairs);
        assert_ne!(a.pairs, c.pairs);
        assert_eq!(a.pairs.len(), PATTERN_PAIRS);
        assert!(a.pairs.iter().flatten().all(|&(x, y)| x * x + y * y <= 169.0));
    }

    #[test]
    fn blur_keeps_constant_images() {
        let img = GrayImage::from_pixel(9, 7, Luma([77]));
        assert_eq!(box_blur(&img), img);
    }

    #[test]
    fn same_patch_gives_same_descriptor() {
        let pattern = BriefPattern::new(1);
        let a = box_blur(&textured(64, 64, 0, 0));
        let b = box_blur(&textured(64, 64, 3, 2));
        let da = pattern.describe(&a, 32, 32, 0.4);
        let db = pattern.describe(&b, 29, 30, 0.4);
        assert_eq!(da.hamming(&db), 0);
        let other = pattern.describe(&a, 20, 40, 0.4);
        assert!(da.hamming(&other) > 0);
    }
}
