use image::GrayImage;
use log::{debug, warn};
use photo_align_core::{Correspondence, CorrespondenceSet, Image, ImageView};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::descriptor::{box_blur, BriefPattern, Descriptor};
use crate::keypoint::{build_pyramid, detect_on_level, level_budgets, Keypoint};
use crate::matcher::match_descriptors;
use crate::params::MatcherParams;

/// A described keypoint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Feature {
    pub keypoint: Keypoint,
    pub descriptor: Descriptor,
}

/// Copy `img` into a `GrayImage`, converting colour to luma.
fn gray_image(img: &ImageView<'_>) -> Option<GrayImage> {
    let data = if img.channels == 1 {
        img.data.to_vec()
    } else {
        Image::from_raw(img.width, img.height, img.channels, img.data.to_vec())?
            .to_gray()
            .data
    };
    GrayImage::from_raw(img.width as u32, img.height as u32, data)
}

/// Detect and describe up to `max_features` keypoints over the pyramid.
///
/// Color input is converted to luma first. Deterministic for fixed params.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(img, params), fields(w = img.width, h = img.height))
)]
pub fn detect_features(
    img: &ImageView<'_>,
    max_features: usize,
    params: &MatcherParams,
) -> Vec<Feature> {
    if max_features == 0 || img.width == 0 || img.height == 0 {
        return Vec::new();
    }
    let Some(gray) = gray_image(img) else {
        warn!(
            "image buffer does not match {}x{}x{}",
            img.width, img.height, img.channels
        );
        return Vec::new();
    };

    let pyramid = build_pyramid(gray, params);
    let budgets = level_budgets(max_features, pyramid.len(), params.scale_factor);
    let pattern = BriefPattern::new(params.pattern_seed);

    let mut features = Vec::new();
    for (index, (level, budget)) in pyramid.iter().zip(budgets).enumerate() {
        let keypoints = detect_on_level(level, index, budget, params);
        if keypoints.is_empty() {
            continue;
        }
        let smoothed = box_blur(&level.image);
        for kp in keypoints {
            let x = (kp.position.x / level.scale_x - 0.5).round() as u32;
            let y = (kp.position.y / level.scale_y - 0.5).round() as u32;
            features.push(Feature {
                keypoint: kp,
                descriptor: pattern.describe(&smoothed, x, y, kp.angle),
            });
        }
    }
    debug!(
        "detected {} features on {} levels ({}x{})",
        features.len(),
        pyramid.len(),
        img.width,
        img.height
    );
    features
}

/// Match features of `reference` against `target` and return up to
/// `max_count` correspondences, strongest first.
///
/// Images without keypoints yield an empty set.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all, fields(max_count)))]
pub fn detect_correspondences(
    reference: &ImageView<'_>,
    target: &ImageView<'_>,
    max_count: usize,
    params: &MatcherParams,
) -> CorrespondenceSet {
    let budget = max_count.saturating_mul(params.oversample.max(1));
    let (ref_features, tgt_features) = rayon::join(
        || detect_features(reference, budget, params),
        || detect_features(target, budget, params),
    );

    let query: Vec<Descriptor> = ref_features.iter().map(|f| f.descriptor).collect();
    let train: Vec<Descriptor> = tgt_features.iter().map(|f| f.descriptor).collect();
    let mut matches = match_descriptors(&query, &train, params.cross_check, params.max_distance);
    matches.truncate(max_count);

    let set: CorrespondenceSet = matches
        .iter()
        .map(|m| {
            Correspondence::new(
                ref_features[m.query].keypoint.position,
                tgt_features[m.train].keypoint.position,
            )
        })
        .collect();
    debug!(
        "{} correspondences from {} / {} features",
        set.len(),
        ref_features.len(),
        tgt_features.len()
    );
    set
}
