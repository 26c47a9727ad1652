//! High-level facade crate for the `photo-align-*` workspace.
//!
//! This crate provides:
//! - re-exports of the geometric core and the feature matcher,
//! - the [`project::Project`] model with its JSON file format,
//! - the [`editor::PairEditor`] used by interactive front ends,
//! - the [`pipeline::AlignmentPipeline`] that warps every target onto the
//!   reference and crops all images to their common region,
//! - (feature `image`) file-system loading and output writing in [`io`].
//!
//! ## Quickstart
//!
//! ```no_run
//! use photo_align::io::{write_outputs, FsImageSource, OutputFormat};
//! use photo_align::pipeline::AlignmentPipeline;
//! use photo_align::project::Project;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let project = Project::load_json("shoot/project.json")?;
//! let source = FsImageSource::for_project_file("shoot/project.json");
//! let result = AlignmentPipeline::default().align(&project, &source)?;
//! for warning in result.warnings() {
//!     eprintln!("{warning}");
//! }
//! write_outputs(&result, "shoot/aligned", OutputFormat::Png)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `photo_align::core`: correspondences, homographies, RANSAC, rasters, warping.
//! - `photo_align::features`: keypoints, descriptors and automatic matching.
//! - `photo_align::project`: images, pair keys, persistence, shared access.
//! - `photo_align::editor`: point editing with change notifications.
//! - `photo_align::pipeline`: the alignment run and its result.
//! - `photo_align::config`: JSON run configuration.
//! - `photo_align::io` (feature `image`): image files in and out.

pub use photo_align_core as core;
pub use photo_align_features as features;

pub mod config;
pub mod editor;
pub mod pipeline;
pub mod project;
pub mod source;

#[cfg(feature = "image")]
pub mod io;

pub use config::AlignConfig;
pub use editor::{PairEditor, PairEvent, PairObserver};
pub use pipeline::{AlignError, AlignParams, AlignmentPipeline, AlignmentResult, ImageOutcome};
pub use photo_align_core::{CorrespondenceSet, Homography, Interpolation, Side};
pub use project::{ImageId, PairKey, Project, SharedProject};
pub use source::{ImageLoadError, ImageSource, MemoryImageSource};
