//! Interface to the external alignment engine.
//!
//! The engine that actually re-estimates trajectories is out of scope; the
//! estimator only needs to hand it a fixed evaluation subset together with a
//! trial weight tuple and read back a scalar quality score. Keeping the
//! subset loaded once bounds the I/O cost of a search that may run dozens of
//! trial refinements.

use crate::error::MotionError;
use crate::micrograph::Micrograph;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One candidate tuple of regularization weights: velocity-, divergence-
/// and acceleration-type smoothing terms.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrialWeights {
    pub r_v: f64,
    pub r_d: f64,
    pub r_a: f64,
}

/// Which end of the quality score is "good".
///
/// The convention is an explicit parameter rather than an assumption:
/// smoothing-penalty style scores shrink as alignments improve
/// (`LowerIsBetter`, the default), correlation-style scores grow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreDirection {
    #[default]
    LowerIsBetter,
    HigherIsBetter,
}

impl ScoreDirection {
    /// Whether `candidate` strictly beats `incumbent`.
    pub fn better(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Self::LowerIsBetter => candidate < incumbent,
            Self::HigherIsBetter => candidate > incumbent,
        }
    }
}

/// The fixed evaluation subset reused across trial refinements.
///
/// Loaded once before the search starts and read-only afterwards, so trial
/// evaluations within a level can fan out across threads.
#[derive(Clone, Debug, Default)]
pub struct AlignmentSet {
    micrographs: Vec<Micrograph>,
}

impl AlignmentSet {
    /// Load the subset from persisted micrograph motion files.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self, MotionError> {
        let micrographs = paths
            .iter()
            .map(|p| Micrograph::read(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { micrographs })
    }

    /// Build the subset from already loaded micrographs.
    pub fn from_micrographs(micrographs: Vec<Micrograph>) -> Self {
        Self { micrographs }
    }

    pub fn micrographs(&self) -> &[Micrograph] {
        &self.micrographs
    }

    pub fn len(&self) -> usize {
        self.micrographs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.micrographs.is_empty()
    }

    /// Total number of movie frames across the subset.
    pub fn total_frames(&self) -> usize {
        self.micrographs.iter().map(Micrograph::n_frames).sum()
    }
}

/// One full trial refinement pass under a weight tuple, reporting a scalar
/// alignment-quality score.
///
/// Implementations must be safe to call concurrently on the same subset
/// (`Sync`); the estimator fans trial tuples of a recursion level out across
/// threads. A failing trial aborts the whole search — calibration runs
/// prioritize correctness over availability.
pub trait AlignmentScorer: Sync {
    fn refine_and_score(
        &self,
        set: &AlignmentSet,
        weights: TrialWeights,
    ) -> Result<f64, MotionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_direction_defaults_to_lower() {
        assert_eq!(ScoreDirection::default(), ScoreDirection::LowerIsBetter);
        assert!(ScoreDirection::LowerIsBetter.better(1.0, 2.0));
        assert!(!ScoreDirection::LowerIsBetter.better(2.0, 2.0));
        assert!(ScoreDirection::HigherIsBetter.better(2.0, 1.0));
    }
}
