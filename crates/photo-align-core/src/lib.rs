//! Core types and algorithms for aligning a sequence of photos to a reference.
//!
//! This crate is purely geometric and does no file I/O:
//! - [`CorrespondenceSet`]: matched points between the reference and one target,
//! - [`HomographyEstimator`]: RANSAC fit of the target → reference homography,
//! - [`warp`]: resampling of a target into the reference pixel frame,
//! - [`BoundingRect`]: the shrinking rectangle shared by all warped images.
//!
//! ```
//! use photo_align_core::{CorrespondenceSet, HomographyEstimator};
//!
//! let mut set = CorrespondenceSet::new();
//! for (x, y) in [(0.0, 0.0), (50.0, 0.0), (50.0, 40.0), (0.0, 40.0), (20.0, 10.0)] {
//!     set.add(x + 10.0, y + 10.0, x, y);
//! }
//! let fit = HomographyEstimator::default().estimate(&set).unwrap();
//! assert_eq!(fit.inlier_count(), 5);
//! ```

mod bounds;
mod correspondence;
mod homography;
mod image;
mod logger;
mod ransac;
mod warp;

pub use bounds::BoundingRect;
pub use correspondence::{Correspondence, CorrespondenceError, CorrespondenceSet, Point, Side};
pub use homography::{estimate_homography_dlt, homography_from_4pt, Homography};
pub use image::{sample_bilinear, sample_bilinear_channel, Image, ImageView};
pub use ransac::{
    points_are_collinear, EstimationError, HomographyEstimator, HomographyFit, RansacParams,
    MIN_CORRESPONDENCES,
};
pub use warp::{warp, warp_perspective, Interpolation, WarpError};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
