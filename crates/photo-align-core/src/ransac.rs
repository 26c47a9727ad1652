//! Outlier-robust homography estimation from a [`CorrespondenceSet`].
//!
//! Minimal 4-point samples are drawn with a seeded RNG, each candidate is
//! scored by counting correspondences with reprojection error below a pixel
//! threshold, and the best consensus set is refitted with the normalized DLT.

use crate::correspondence::{CorrespondenceSet, Point, Side};
use crate::homography::{estimate_homography_dlt, homography_from_4pt, Homography};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Minimal number of correspondences that constrain a homography.
pub const MIN_CORRESPONDENCES: usize = 4;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EstimationError {
    #[error("insufficient correspondences: need {needed}, got {got}")]
    InsufficientPoints { needed: usize, got: usize },
    #[error("degenerate configuration: {reason}")]
    DegenerateConfiguration { reason: String },
}

impl EstimationError {
    fn degenerate(reason: impl Into<String>) -> Self {
        Self::DegenerateConfiguration {
            reason: reason.into(),
        }
    }
}

/// RANSAC configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacParams {
    /// Inlier gate on reprojection error, in reference pixels.
    pub inlier_threshold_px: f64,
    /// Upper bound on sampling iterations.
    pub max_iters: usize,
    /// Desired probability of drawing at least one all-inlier sample.
    ///
    /// Used to stop early once the best inlier ratio makes more samples
    /// pointless. Set to `1.0` to always run `max_iters`.
    pub confidence: f64,
    /// Minimal consensus size for the final model.
    pub min_inliers: usize,
    /// Refit the winning model on all of its inliers.
    pub refine: bool,
    /// RNG seed; the estimator is deterministic for a fixed seed.
    pub seed: u64,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            inlier_threshold_px: 3.0,
            max_iters: 2000,
            confidence: 0.995,
            min_inliers: MIN_CORRESPONDENCES,
            refine: true,
            seed: 0,
        }
    }
}

/// A fitted target→reference homography and its consensus set.
#[derive(Clone, Debug, PartialEq)]
pub struct HomographyFit {
    pub homography: Homography,
    /// One flag per input correspondence.
    pub inliers: Vec<bool>,
    /// Reprojection error of every input correspondence under `homography`.
    pub errors: Vec<f64>,
}

impl HomographyFit {
    pub fn inlier_count(&self) -> usize {
        self.inliers.iter().filter(|&&m| m).count()
    }

    /// Indices of the inlier correspondences.
    pub fn inlier_indices(&self) -> Vec<usize> {
        self.inliers
            .iter()
            .enumerate()
            .filter_map(|(i, &m)| m.then_some(i))
            .collect()
    }

    /// RMS reprojection error over the inliers.
    pub fn inlier_rms(&self) -> f64 {
        let (sum, n) = self
            .inliers
            .iter()
            .zip(&self.errors)
            .filter(|(&m, _)| m)
            .fold((0.0, 0usize), |(s, n), (_, e)| (s + e * e, n + 1));
        if n == 0 {
            0.0
        } else {
            (sum / n as f64).sqrt()
        }
    }
}

/// RANSAC homography estimator.
#[derive(Clone, Debug, Default)]
pub struct HomographyEstimator {
    params: RansacParams,
}

struct Consensus {
    homography: Homography,
    inliers: Vec<bool>,
    errors: Vec<f64>,
    count: usize,
    inlier_error: f64,
}

impl Consensus {
    fn score(h: Homography, src: &[Point], dst: &[Point], threshold: f64) -> Self {
        let errors: Vec<f64> = src
            .iter()
            .zip(dst)
            .map(|(&s, &d)| h.reprojection_error(s, d))
            .collect();
        let inliers: Vec<bool> = errors.iter().map(|&e| e < threshold).collect();
        let (count, inlier_error) = inliers
            .iter()
            .zip(&errors)
            .filter(|(&m, _)| m)
            .fold((0usize, 0.0), |(n, s), (_, e)| (n + 1, s + e));
        Self {
            homography: h,
            inliers,
            errors,
            count,
            inlier_error,
        }
    }

    fn beats(&self, other: &Consensus) -> bool {
        self.count > other.count
            || (self.count == other.count && self.inlier_error < other.inlier_error)
    }
}

impl HomographyEstimator {
    pub fn new(params: RansacParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &RansacParams {
        &self.params
    }

    /// Fit the homography mapping target points onto reference points.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, set), fields(n = set.len()))
    )]
    pub fn estimate(&self, set: &CorrespondenceSet) -> Result<HomographyFit, EstimationError> {
        let src: Vec<Point> = set.points(Side::Target).collect();
        let dst: Vec<Point> = set.points(Side::Reference).collect();
        self.estimate_points(&src, &dst)
    }

    /// Fit `dst ~ H * src` from parallel point lists.
    pub fn estimate_points(
        &self,
        src: &[Point],
        dst: &[Point],
    ) -> Result<HomographyFit, EstimationError> {
        let n = src.len().min(dst.len());
        if n < MIN_CORRESPONDENCES {
            return Err(EstimationError::InsufficientPoints {
                needed: MIN_CORRESPONDENCES,
                got: n,
            });
        }
        if src.len() != dst.len() {
            return Err(EstimationError::degenerate(
                "source and destination lists differ in length",
            ));
        }
        if src.iter().chain(dst).any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(EstimationError::degenerate("non-finite coordinates"));
        }

        let p = &self.params;
        let threshold = p.inlier_threshold_px;
        let mut rng = StdRng::seed_from_u64(p.seed);
        let mut best: Option<Consensus> = None;
        let mut iter_budget = p.max_iters.max(1);
        let mut iter = 0usize;

        while iter < iter_budget {
            iter += 1;

            let idx = rand::seq::index::sample(&mut rng, n, MIN_CORRESPONDENCES);
            let s4 = [src[idx.index(0)], src[idx.index(1)], src[idx.index(2)], src[idx.index(3)]];
            let d4 = [dst[idx.index(0)], dst[idx.index(1)], dst[idx.index(2)], dst[idx.index(3)]];
            if sample_is_degenerate(&s4) || sample_is_degenerate(&d4) {
                continue;
            }

            let Some(h) = homography_from_4pt(&s4, &d4) else {
                continue;
            };
            if !h.is_well_conditioned() {
                continue;
            }

            let candidate = Consensus::score(h, src, dst, threshold);
            if best.as_ref().map_or(true, |b| candidate.beats(b)) {
                iter_budget = iter_budget.min(adaptive_iterations(
                    candidate.count,
                    n,
                    p.confidence,
                    p.max_iters,
                ));
                best = Some(candidate);
            }
        }

        let Some(mut best) = best else {
            return Err(EstimationError::degenerate(
                "every minimal sample was collinear or singular",
            ));
        };
        log::debug!(
            "ransac: {} iterations, {}/{} inliers before refinement",
            iter,
            best.count,
            n
        );

        if p.refine && best.count > MIN_CORRESPONDENCES {
            let (s_in, d_in) = select_inliers(src, dst, &best.inliers);
            if let Some(h) = estimate_homography_dlt(&s_in, &d_in) {
                if h.is_well_conditioned() {
                    let refined = Consensus::score(h, src, dst, threshold);
                    if refined.count >= best.count {
                        best = refined;
                    }
                }
            }
        }

        if best.count < p.min_inliers.max(MIN_CORRESPONDENCES) {
            return Err(EstimationError::degenerate(format!(
                "only {} inliers (need {})",
                best.count,
                p.min_inliers.max(MIN_CORRESPONDENCES)
            )));
        }

        let (s_in, d_in) = select_inliers(src, dst, &best.inliers);
        if points_are_collinear(&s_in) || points_are_collinear(&d_in) {
            return Err(EstimationError::degenerate("inlier points are collinear"));
        }
        if !best.homography.is_well_conditioned() {
            return Err(EstimationError::degenerate("homography is singular"));
        }

        Ok(HomographyFit {
            homography: best.homography,
            inliers: best.inliers,
            errors: best.errors,
        })
    }
}

fn select_inliers(src: &[Point], dst: &[Point], mask: &[bool]) -> (Vec<Point>, Vec<Point>) {
    src.iter()
        .zip(dst)
        .zip(mask)
        .filter(|(_, &m)| m)
        .map(|((&s, &d), _)| (s, d))
        .unzip()
}

/// Standard RANSAC bound: `log(1 - conf) / log(1 - w^4)`.
fn adaptive_iterations(inliers: usize, n: usize, confidence: f64, max_iters: usize) -> usize {
    if !(0.0..1.0).contains(&confidence) {
        return max_iters;
    }
    let w = inliers as f64 / n as f64;
    let p_good = w.powi(MIN_CORRESPONDENCES as i32);
    if p_good <= f64::EPSILON {
        return max_iters;
    }
    if p_good >= 1.0 - f64::EPSILON {
        return 1;
    }
    let k = (1.0 - confidence).ln() / (1.0 - p_good).ln();
    if !k.is_finite() {
        return max_iters;
    }
    (k.ceil() as usize).clamp(1, max_iters)
}

fn triangle_area2(a: Point, b: Point, c: Point) -> f64 {
    ((b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)).abs()
}

// Any three of the four points (nearly) on one line make the 4-point system
// ill-posed.
fn sample_is_degenerate(pts: &[Point; 4]) -> bool {
    let scale = pts
        .iter()
        .flat_map(|p| pts.iter().map(move |q| (p - q).norm()))
        .fold(0.0_f64, f64::max);
    if scale < 1e-9 {
        return true;
    }
    let eps = 1e-6 * scale * scale;
    const TRIPLES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];
    TRIPLES
        .iter()
        .any(|t| triangle_area2(pts[t[0]], pts[t[1]], pts[t[2]]) < eps)
}

/// True when the points' spread is (numerically) one-dimensional.
pub fn points_are_collinear(pts: &[Point]) -> bool {
    if pts.len() < 3 {
        return true;
    }
    let n = pts.len() as f64;
    let (sx, sy) = pts.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    let (cx, cy) = (sx / n, sy / n);
    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for p in pts {
        let dx = p.x - cx;
        let dy = p.y - cy;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    let trace = sxx + syy;
    if trace <= 1e-12 {
        return true;
    }
    let det = sxx * syy - sxy * sxy;
    let disc = (trace * trace / 4.0 - det).max(0.0).sqrt();
    let lambda_min = trace / 2.0 - disc;
    let lambda_max = trace / 2.0 + disc;
    lambda_min / lambda_max < 1e-8
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Matrix3;
    use rand::Rng;

    fn ground_truth() -> Homography {
        Homography::new(Matrix3::new(
            1.05, 0.04, 12.0, //
            -0.03, 0.97, -7.5, //
            0.0002, -0.0001, 1.0,
        ))
    }

    fn synthetic_set(h: &Homography, n: usize, seed: u64) -> CorrespondenceSet {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut set = CorrespondenceSet::new();
        for _ in 0..n {
            let t = Point::new(rng.gen_range(0.0..640.0), rng.gen_range(0.0..480.0));
            let r = h.apply(t);
            set.add(r.x, r.y, t.x, t.y);
        }
        set
    }

    #[test]
    fn recovers_noise_free_transform() {
        let h = ground_truth();
        for n in [4, 5, 12, 40] {
            let set = synthetic_set(&h, n, 7 + n as u64);
            let fit = HomographyEstimator::default().estimate(&set).expect("fit");
            assert_eq!(fit.inlier_count(), n);
            for c in set.iter() {
                let err = fit.homography.reprojection_error(c.target, c.reference);
                assert!(err < 0.5, "n={n}: reprojection error {err}");
            }
        }
    }

    #[test]
    fn three_points_are_insufficient() {
        let set = synthetic_set(&ground_truth(), 3, 1);
        assert_eq!(
            HomographyEstimator::default().estimate(&set),
            Err(EstimationError::InsufficientPoints { needed: 4, got: 3 })
        );
        assert!(matches!(
            HomographyEstimator::default().estimate(&CorrespondenceSet::new()),
            Err(EstimationError::InsufficientPoints { got: 0, .. })
        ));
    }

    #[test]
    fn rejects_outliers() {
        let h = ground_truth();
        let mut set = synthetic_set(&h, 10, 3);
        // Two correspondences pointing somewhere unrelated.
        set.add(500.0, 20.0, 30.0, 400.0);
        set.add(15.0, 300.0, 610.0, 50.0);

        let fit = HomographyEstimator::default().estimate(&set).expect("fit");
        assert_eq!(fit.inlier_count(), 10);
        assert!(!fit.inliers[10]);
        assert!(!fit.inliers[11]);
        assert!(fit.inliers[..10].iter().all(|&m| m));
        assert!(fit.inlier_rms() < 0.5);
    }

    #[test]
    fn collinear_points_are_degenerate() {
        let mut set = CorrespondenceSet::new();
        for i in 0..8 {
            let t = i as f64 * 10.0;
            set.add(t + 5.0, 2.0 * t + 5.0, t, 2.0 * t);
        }
        assert!(matches!(
            HomographyEstimator::default().estimate(&set),
            Err(EstimationError::DegenerateConfiguration { .. })
        ));
    }

    #[test]
    fn same_seed_gives_same_model() {
        let mut set = synthetic_set(&ground_truth(), 20, 11);
        set.add(1.0, 2.0, 300.0, 300.0);
        let est = HomographyEstimator::new(RansacParams {
            seed: 42,
            ..RansacParams::default()
        });
        let a = est.estimate(&set).expect("fit");
        let b = est.estimate(&set).expect("fit");
        assert_eq!(a, b);
    }

    #[test]
    fn adaptive_bound_shrinks_with_inlier_ratio() {
        assert_eq!(adaptive_iterations(10, 10, 0.995, 2000), 1);
        let half = adaptive_iterations(5, 10, 0.995, 2000);
        let tenth = adaptive_iterations(1, 10, 0.995, 2000);
        assert!(half < tenth);
        assert_eq!(tenth, 2000);
    }

    #[test]
    fn params_deserialize_with_defaults() {
        let p: RansacParams = serde_json::from_str(r#"{"inlier_threshold_px": 1.5}"#).unwrap();
        assert_eq!(p.inlier_threshold_px, 1.5);
        assert_eq!(p.max_iters, RansacParams::default().max_iters);
    }
}
