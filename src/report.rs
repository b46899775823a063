//! Serializable search diagnostics and JSON output helpers.

use crate::align::TrialWeights;
use crate::error::MotionError;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Score of a single trial tuple.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct TrialReport {
    pub weights: TrialWeights,
    pub score: f64,
}

/// One recursion level of the grid search.
#[derive(Clone, Debug, Serialize)]
pub struct LevelReport {
    /// Level index, 0 = the full-range grid.
    pub level: usize,
    /// Half-width of the sampling interval at this level.
    pub range: f64,
    /// Winning tuple of the level.
    pub best: TrialWeights,
    pub score: f64,
    pub trials: Vec<TrialReport>,
}

/// Full calibration summary, written as pretty JSON by the demo binaries.
#[derive(Clone, Debug, Serialize)]
pub struct CalibrationReport {
    pub best: TrialWeights,
    pub score: f64,
    pub evaluations: usize,
    pub latency_ms: f64,
    pub levels: Vec<LevelReport>,
}

/// Serialize a value as pretty JSON to `path`, creating parent directories.
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<(), MotionError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| MotionError::file_access(parent, e))?;
        }
    }
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| MotionError::InvalidConfig(format!("cannot serialize JSON: {e}")))?;
    fs::write(path, json).map_err(|e| MotionError::file_access(path, e))
}
