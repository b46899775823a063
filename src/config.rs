//! Runtime configuration for the calibration binaries.

use crate::error::MotionError;
use crate::estimator::EstimatorOptions;
use std::fs;
use std::path::{Path, PathBuf};
use serde::Deserialize;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct OutputConfig {
    /// Write the calibration report as pretty JSON here.
    #[serde(default)]
    pub json_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RuntimeConfig {
    /// Persisted micrograph motion files forming the evaluation subset.
    pub micrographs: Vec<PathBuf>,
    #[serde(default)]
    pub estimator: EstimatorOptions,
    #[serde(default)]
    pub output: OutputConfig,
}

pub fn load_config(path: &Path) -> Result<RuntimeConfig, MotionError> {
    let contents = fs::read_to_string(path).map_err(|e| MotionError::file_access(path, e))?;
    serde_json::from_str(&contents).map_err(|e| {
        MotionError::InvalidConfig(format!("cannot parse config {}: {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_config_fills_defaults() {
        let config: RuntimeConfig = serde_json::from_str(
            r#"{ "micrographs": ["a.star"], "estimator": { "estim2": true } }"#,
        )
        .unwrap();
        assert!(config.estimator.estim2);
        assert_eq!(config.estimator.steps, 5);
        assert!(config.output.json_out.is_none());
    }
}
