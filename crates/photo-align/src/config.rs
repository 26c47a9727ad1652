//! JSON run configuration.

use photo_align_core::{Interpolation, RansacParams};
use photo_align_features::MatcherParams;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::pipeline::AlignParams;

/// Points requested from automatic matching when nothing else is configured.
pub const DEFAULT_MAX_POINTS: usize = 10;

#[derive(thiserror::Error, Debug)]
pub enum ConfigIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn default_max_points() -> usize {
    DEFAULT_MAX_POINTS
}

/// Overrides for a run. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignConfig {
    #[serde(default)]
    pub ransac: Option<RansacParams>,
    #[serde(default)]
    pub matcher: Option<MatcherParams>,
    #[serde(default)]
    pub interpolation: Option<Interpolation>,
    #[serde(default = "default_max_points")]
    pub max_points: usize,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            ransac: None,
            matcher: None,
            interpolation: None,
            max_points: DEFAULT_MAX_POINTS,
        }
    }
}

impl AlignConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Build pipeline parameters, applying overrides from the config.
    pub fn build_params(&self) -> AlignParams {
        let mut params = AlignParams::default();
        if let Some(ransac) = self.ransac.clone() {
            params.ransac = ransac;
        }
        if let Some(interpolation) = self.interpolation {
            params.interpolation = interpolation;
        }
        params
    }

    pub fn build_matcher_params(&self) -> MatcherParams {
        self.matcher.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_gives_defaults() {
        let cfg: AlignConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, AlignConfig::default());
        assert_eq!(cfg.build_params(), AlignParams::default());
        assert_eq!(cfg.build_matcher_params(), MatcherParams::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg: AlignConfig = serde_json::from_str(
            r#"{
                "ransac": { "inlier_threshold_px": 1.5 },
                "matcher": { "cross_check": true },
                "interpolation": "bilinear",
                "max_points": 25
            }"#,
        )
        .unwrap();
        let params = cfg.build_params();
        assert_eq!(params.ransac.inlier_threshold_px, 1.5);
        assert_eq!(params.ransac.max_iters, RansacParams::default().max_iters);
        assert_eq!(params.interpolation, Interpolation::Bilinear);
        let matcher = cfg.build_matcher_params();
        assert!(matcher.cross_check);
        assert_eq!(matcher.levels, MatcherParams::default().levels);
        assert_eq!(cfg.max_points, 25);
    }

    #[test]
    fn config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        let cfg = AlignConfig {
            interpolation: Some(Interpolation::Bilinear),
            ..AlignConfig::default()
        };
        cfg.write_json(&path).unwrap();
        assert_eq!(AlignConfig::load_json(&path).unwrap(), cfg);
    }
}
