//! Run configuration file.
//!
//! A single JSON document with one section per stage. Every section and
//! every field is optional; missing values fall back to the defaults of the
//! reference parameter set.

use std::path::Path;

use arcore::{DecompositionConfig, DetectionConfig};
use serde::{Deserialize, Serialize};
use track::TrackingConfig;

use crate::domain::DomainConfig;
use crate::error::PipelineError;

/// Everything a run needs, built once and shared read-only by every task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub domain: DomainConfig,
    pub decomposition: DecompositionConfig,
    pub detection: DetectionConfig,
    pub tracking: TrackingConfig,
}

impl RunConfig {
    /// Check every section.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.domain.validate()?;
        self.decomposition.validate()?;
        self.detection.validate()?;
        self.tracking.validate()?;
        Ok(())
    }

    /// Save as pretty-printed JSON.
    pub fn save_to_file(&self, path: &Path) -> Result<(), PipelineError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| PipelineError::json(path, e))?;
        std::fs::write(path, json).map_err(|e| PipelineError::io(path, e))
    }

    /// Load and validate a JSON configuration file.
    pub fn load_from_file(path: &Path) -> Result<Self, PipelineError> {
        let json = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let config: RunConfig =
            serde_json::from_str(&json).map_err(|e| PipelineError::json(path, e))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcore::config::{DecompositionMode, ThresholdSpec};
    use track::TrackScheme;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");

        let mut config = RunConfig::default();
        config.decomposition.mode = DecompositionMode::Climatology;
        config.detection.thres_low = ThresholdSpec::Fixed(180.0);
        config.tracking.track_scheme = TrackScheme::Full;
        config.domain.shift_lon = Some(80.0);
        config.save_to_file(&path).unwrap();

        let loaded = RunConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_sparse_file_takes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, r#"{ "tracking": { "min_duration": 12 } }"#).unwrap();

        let loaded = RunConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.tracking.min_duration, 12.0);
        assert_eq!(loaded.detection, DetectionConfig::default());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, r#"{ "detection": { "min_lat": 50, "max_lat": 10 } }"#).unwrap();
        assert!(matches!(
            RunConfig::load_from_file(&path),
            Err(PipelineError::Detection(arcore::ArError::InvalidConfig(_)))
        ));

        std::fs::write(&path, r#"{ "tracking": { "max_dist_allow": -5 } }"#).unwrap();
        assert!(matches!(
            RunConfig::load_from_file(&path),
            Err(PipelineError::Tracking(_))
        ));

        std::fs::write(&path, r#"{ "domain": { "lat1": 60, "lat2": 10 } }"#).unwrap();
        assert!(matches!(
            RunConfig::load_from_file(&path),
            Err(PipelineError::Detection(arcore::ArError::InvalidConfig(_)))
        ));
    }

    #[test]
    fn test_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            RunConfig::load_from_file(&path),
            Err(PipelineError::Json { .. })
        ));
        assert!(matches!(
            RunConfig::load_from_file(&dir.path().join("missing.json")),
            Err(PipelineError::Io { .. })
        ));
    }
}
