//! Automatic correspondence detection for photo-align.
//!
//! Pipeline per image pair:
//! - FAST-9 corners on a gray pyramid, ranked by Harris response,
//! - intensity-centroid orientation and steered 256-bit BRIEF descriptors,
//! - brute-force Hamming matching, optionally cross-checked.
//!
//! The result is a [`photo_align_core::CorrespondenceSet`] ordered from the
//! strongest match to the weakest, ready for RANSAC.

mod descriptor;
mod detect;
mod fast;
mod keypoint;
mod matcher;
mod params;

pub use descriptor::Descriptor;
pub use detect::{detect_correspondences, detect_features, Feature};
pub use keypoint::Keypoint;
pub use matcher::{match_descriptors, FeatureMatch};
pub use params::MatcherParams;
