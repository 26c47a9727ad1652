//! Align every target of a project to its reference and crop all images to
//! the region they share.

use log::{debug, info};
use photo_align_core::{
    warp, BoundingRect, EstimationError, Homography, HomographyEstimator, HomographyFit, Image,
    Interpolation, RansacParams, WarpError,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::project::{ImageId, ImageRecord, PairKey, Project, ProjectError};
use crate::source::{ImageLoadError, ImageSource};

/// Alignment parameters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignParams {
    pub ransac: RansacParams,
    pub interpolation: Interpolation,
}

#[derive(thiserror::Error, Debug)]
pub enum AlignError {
    #[error("project has no images")]
    EmptyProject,
    #[error("cannot load reference image: {0}")]
    ReferenceLoad(#[source] ImageLoadError),
    #[error("aligned images have no area in common")]
    EmptyOverlap,
}

/// Why a target image was left out of the alignment.
#[derive(thiserror::Error, Debug)]
pub enum AlignWarning {
    #[error("image {index} ({path}): no correspondences with the reference, left unwarped")]
    MissingCorrespondences { index: usize, path: String },
    #[error("image {index} ({path}): {source}, left blank")]
    ImageLoad {
        index: usize,
        path: String,
        source: ImageLoadError,
    },
    #[error("image {index} ({path}): {source}, left unwarped")]
    Estimation {
        index: usize,
        path: String,
        source: EstimationError,
    },
    #[error("image {index} ({path}): {source}, left unwarped")]
    Warp {
        index: usize,
        path: String,
        source: WarpError,
    },
}

impl AlignWarning {
    /// Project index of the affected image.
    pub fn index(&self) -> usize {
        match self {
            Self::MissingCorrespondences { index, .. }
            | Self::ImageLoad { index, .. }
            | Self::Estimation { index, .. }
            | Self::Warp { index, .. } => *index,
        }
    }
}

/// Compact description of an accepted homography fit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitSummary {
    /// Target → reference.
    pub homography: Homography,
    pub inliers: usize,
    pub correspondences: usize,
    /// RMS reprojection error over the inliers, in reference pixels.
    pub rms_px: f64,
}

impl From<&HomographyFit> for FitSummary {
    fn from(fit: &HomographyFit) -> Self {
        Self {
            homography: fit.homography,
            inliers: fit.inlier_count(),
            correspondences: fit.inliers.len(),
            rms_px: fit.inlier_rms(),
        }
    }
}

#[derive(Debug)]
pub enum ImageOutcome {
    Reference,
    Aligned(FitSummary),
    Skipped(AlignWarning),
}

#[derive(Debug)]
pub struct AlignmentResult {
    /// Cropped images in project order, all `bounding.width() × bounding.height()`.
    pub images: Vec<Image>,
    pub bounding: BoundingRect,
    /// Shared rectangle before any target (first entry) and after each target.
    pub bounding_history: Vec<BoundingRect>,
    pub outcomes: Vec<ImageOutcome>,
    /// Size of every image as loaded, `None` when it could not be read.
    pub dimensions: Vec<(ImageId, Option<(usize, usize)>)>,
}

impl AlignmentResult {
    pub fn warnings(&self) -> impl Iterator<Item = &AlignWarning> {
        self.outcomes.iter().filter_map(|o| match o {
            ImageOutcome::Skipped(w) => Some(w),
            _ => None,
        })
    }

    /// True when every target was aligned.
    pub fn is_complete(&self) -> bool {
        self.warnings().next().is_none()
    }

    /// Store the loaded image sizes on the project's records.
    pub fn record_dimensions(&self, project: &mut Project) -> Result<(), ProjectError> {
        for &(id, dims) in &self.dimensions {
            if let Some((width, height)) = dims {
                project.set_dimensions(id, width, height)?;
            }
        }
        Ok(())
    }
}

/// Per-target output before the bounding fold.
struct Slot {
    image: Image,
    loaded: Option<(usize, usize)>,
    footprint: Option<BoundingRect>,
    outcome: ImageOutcome,
}

/// Frame of the reference image every target is warped into.
#[derive(Clone, Copy)]
struct Frame {
    width: usize,
    height: usize,
    channels: usize,
}

#[derive(Clone, Debug, Default)]
pub struct AlignmentPipeline {
    params: AlignParams,
}

impl AlignmentPipeline {
    pub fn new(params: AlignParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &AlignParams {
        &self.params
    }

    /// Fit the target → reference homography for one pair.
    pub fn estimate(
        &self,
        project: &Project,
        key: &PairKey,
    ) -> Option<Result<HomographyFit, EstimationError>> {
        let set = project.correspondences(key)?;
        Some(HomographyEstimator::new(self.params.ransac.clone()).estimate(set))
    }

    /// Align all targets of `project` to its first image.
    ///
    /// Per-target failures become warnings in the result; only a missing or
    /// unreadable reference and an empty overlap are errors.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(images = project.len()))
    )]
    pub fn align(
        &self,
        project: &Project,
        source: &dyn ImageSource,
    ) -> Result<AlignmentResult, AlignError> {
        let reference = project.reference().ok_or(AlignError::EmptyProject)?;
        let ref_img = source.load(reference).map_err(AlignError::ReferenceLoad)?;
        let frame = Frame {
            width: ref_img.width,
            height: ref_img.height,
            channels: ref_img.channels,
        };
        info!(
            "aligning {} target(s) to {} ({}x{})",
            project.targets().len(),
            reference.path,
            frame.width,
            frame.height
        );

        let slots: Vec<Slot> = project
            .targets()
            .par_iter()
            .enumerate()
            .map(|(i, record)| self.align_target(project, source, reference, record, i + 1, frame))
            .collect();

        let mut bounding = BoundingRect::full(frame.width, frame.height);
        let mut bounding_history = Vec::with_capacity(slots.len() + 1);
        bounding_history.push(bounding);
        let mut warped = Vec::with_capacity(slots.len() + 1);
        let mut outcomes = Vec::with_capacity(slots.len() + 1);
        let mut dimensions = Vec::with_capacity(slots.len() + 1);
        dimensions.push((reference.id, Some((frame.width, frame.height))));
        warped.push(ref_img);
        outcomes.push(ImageOutcome::Reference);
        for ((i, slot), record) in slots.into_iter().enumerate().zip(project.targets()) {
            if let Some(footprint) = slot.footprint {
                bounding = bounding.intersect(&footprint);
                debug!("image {}: footprint {:?}, bounding now {:?}", i + 1, footprint, bounding);
            }
            bounding_history.push(bounding);
            if let ImageOutcome::Skipped(w) = &slot.outcome {
                info!("{w}");
            }
            dimensions.push((record.id, slot.loaded));
            warped.push(slot.image);
            outcomes.push(slot.outcome);
        }

        if bounding.is_empty() {
            return Err(AlignError::EmptyOverlap);
        }
        info!(
            "shared region x={}..{} y={}..{} ({}x{})",
            bounding.x_min,
            bounding.x_max,
            bounding.y_min,
            bounding.y_max,
            bounding.width(),
            bounding.height()
        );

        let images = warped.par_iter().map(|img| img.crop(&bounding)).collect();
        Ok(AlignmentResult {
            images,
            bounding,
            bounding_history,
            outcomes,
            dimensions,
        })
    }

    fn align_target(
        &self,
        project: &Project,
        source: &dyn ImageSource,
        reference: &ImageRecord,
        record: &ImageRecord,
        index: usize,
        frame: Frame,
    ) -> Slot {
        let path = record.path.clone();
        let img = match source.load(record) {
            Ok(img) if img.channels == frame.channels => img,
            Ok(img) => {
                debug!(
                    "image {index} ({path}): {} channel(s) converted to {}",
                    img.channels, frame.channels
                );
                img.to_channels(frame.channels)
            }
            Err(source) => {
                return Slot {
                    image: Image::new(frame.width, frame.height, frame.channels),
                    loaded: None,
                    footprint: None,
                    outcome: ImageOutcome::Skipped(AlignWarning::ImageLoad {
                        index,
                        path,
                        source,
                    }),
                };
            }
        };
        let loaded = Some((img.width, img.height));
        let unwarped = |img: &Image, warning: AlignWarning| Slot {
            image: img.on_canvas(frame.width, frame.height),
            loaded,
            footprint: None,
            outcome: ImageOutcome::Skipped(warning),
        };

        let key = PairKey {
            reference: reference.id,
            target: record.id,
        };
        let Some(set) = project.correspondences(&key) else {
            return unwarped(&img, AlignWarning::MissingCorrespondences { index, path });
        };

        let estimator = HomographyEstimator::new(self.params.ransac.clone());
        let fit = match estimator.estimate(set) {
            Ok(fit) => fit,
            Err(source) => {
                return unwarped(
                    &img,
                    AlignWarning::Estimation {
                        index,
                        path,
                        source,
                    },
                );
            }
        };
        let corners = fit.homography.map_frame_corners(img.width, img.height);
        let Some(footprint) = BoundingRect::circumscribing(&corners) else {
            return unwarped(
                &img,
                AlignWarning::Estimation {
                    index,
                    path,
                    source: EstimationError::DegenerateConfiguration {
                        reason: "image corner maps to infinity".into(),
                    },
                },
            );
        };

        match warp(
            &img.view(),
            &fit.homography,
            frame.width,
            frame.height,
            self.params.interpolation,
        ) {
            Ok(image) => {
                let summary = FitSummary::from(&fit);
                debug!(
                    "image {index} ({path}): {}/{} inliers, rms {:.3}px",
                    summary.inliers, summary.correspondences, summary.rms_px
                );
                Slot {
                    image,
                    loaded,
                    footprint: Some(footprint),
                    outcome: ImageOutcome::Aligned(summary),
                }
            }
            Err(source) => unwarped(
                &img,
                AlignWarning::Warp {
                    index,
                    path,
                    source,
                },
            ),
        }
    }
}
