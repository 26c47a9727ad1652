use serde::{Deserialize, Serialize};

/// Configuration for keypoint detection, description and matching.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherParams {
    /// Keypoints detected per image, as a multiple of the requested match count.
    pub oversample: usize,
    /// Pyramid levels (1 = full resolution only).
    pub levels: usize,
    /// Downscale factor between consecutive pyramid levels.
    pub scale_factor: f32,
    /// FAST segment-test intensity threshold.
    pub fast_threshold: u8,
    /// Harris corner constant used to rank FAST corners.
    pub harris_k: f32,
    /// Keep only mutual nearest neighbours.
    pub cross_check: bool,
    /// Drop matches with a larger Hamming distance.
    pub max_distance: Option<u32>,
    /// Seed of the BRIEF sampling pattern. Both images must use the same one.
    pub pattern_seed: u64,
}

impl Default for MatcherParams {
    fn default() -> Self {
        Self {
            oversample: 5,
            levels: 4,
            scale_factor: 1.2,
            fast_threshold: 20,
            harris_k: 0.04,
            cross_check: false,
            max_distance: None,
            pattern_seed: 0x5eed_b21e,
        }
    }
}
