//! Recursive grid search over motion-regularization weights.
//!
//! The estimator calibrates the weights that control how aggressively
//! per-particle trajectories are smoothed during motion refinement. Each
//! recursion level samples `steps` evenly spaced candidates per active
//! parameter around the incumbent tuple, scores the full Cartesian product
//! with the external alignment engine, adopts the winner and halves the
//! range. Parameters are varied jointly, not coordinate-wise, which is why
//! the cost is `steps²` or `steps³` per level and the parameter count is
//! capped at three.
//!
//! Trial evaluations within a level are independent (the evaluation subset
//! is read-only) and fan out across threads; levels are strictly sequential
//! because each needs the previous winner to centre its grid.

use crate::align::{AlignmentScorer, AlignmentSet, ScoreDirection, TrialWeights};
use crate::error::MotionError;
use crate::report::{LevelReport, TrialReport};
use log::debug;
use rayon::prelude::*;
use serde::Deserialize;

/// Configuration of the weight search.
///
/// Exactly one of `estim2` / `estim3` must be set: a 2-parameter search
/// varies `(r_v, r_d)`, a 3-parameter search adds `r_a`. The `r_*` values
/// double as the starting tuple and, for inactive parameters, as the fixed
/// value used in every trial.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct EstimatorOptions {
    /// Search over `(r_v, r_d)`.
    pub estim2: bool,
    /// Search over `(r_v, r_d, r_a)`.
    pub estim3: bool,
    /// Half-width of the initial sampling interval per parameter, in the
    /// parameter's native units.
    pub max_range: f64,
    /// Number of range-halving refinement rounds.
    pub recursions: usize,
    /// Candidate sample points per parameter per round.
    pub steps: usize,
    /// Starting velocity-type regularization weight.
    pub r_v: f64,
    /// Starting divergence-type regularization weight.
    pub r_d: f64,
    /// Starting acceleration-type regularization weight.
    pub r_a: f64,
    /// Optimization direction of the alignment-quality score.
    pub direction: ScoreDirection,
}

impl Default for EstimatorOptions {
    fn default() -> Self {
        Self {
            estim2: false,
            estim3: false,
            max_range: 1.0,
            recursions: 3,
            steps: 5,
            r_v: 1.0,
            r_d: 1.0,
            r_a: 1.0,
            direction: ScoreDirection::LowerIsBetter,
        }
    }
}

/// Search lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Unconfigured,
    Ready,
    Searching,
    Converged,
}

/// Result of a completed search: the committed tuple, its score, and
/// per-level diagnostics.
#[derive(Clone, Debug)]
pub struct SearchOutcome {
    pub weights: TrialWeights,
    pub score: f64,
    /// Number of trial refinements the search ran.
    pub evaluations: usize,
    pub levels: Vec<LevelReport>,
}

/// Calibrates regularization weights by repeated trial refinements over a
/// fixed evaluation subset.
pub struct ParamEstimator {
    options: EstimatorOptions,
    phase: Phase,
    alignment_set: Option<AlignmentSet>,
    best: TrialWeights,
    best_score: Option<f64>,
}

impl ParamEstimator {
    pub fn new(options: EstimatorOptions) -> Self {
        let best = TrialWeights {
            r_v: options.r_v,
            r_d: options.r_d,
            r_a: options.r_a,
        };
        Self {
            options,
            phase: Phase::Unconfigured,
            alignment_set: None,
            best,
            best_score: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn options(&self) -> &EstimatorOptions {
        &self.options
    }

    /// The committed weight tuple: the configured start before a search, the
    /// winning tuple after one.
    pub fn best_weights(&self) -> TrialWeights {
        self.best
    }

    /// Score of the committed tuple, once a search has run.
    pub fn best_score(&self) -> Option<f64> {
        self.best_score
    }

    /// Number of jointly varied parameters, or an `InvalidConfig` error.
    /// Validation runs before any evaluation subset is touched, so expensive
    /// trial refinements never start against a bad configuration.
    fn validate(options: &EstimatorOptions) -> Result<usize, MotionError> {
        if options.estim2 && options.estim3 {
            return Err(MotionError::InvalidConfig(
                "estim2 and estim3 are mutually exclusive".into(),
            ));
        }
        if !options.estim2 && !options.estim3 {
            return Err(MotionError::InvalidConfig(
                "no parameters to estimate: set estim2 or estim3".into(),
            ));
        }
        if !(options.max_range > 0.0) {
            return Err(MotionError::InvalidConfig(format!(
                "max_range must be positive (got {})",
                options.max_range
            )));
        }
        if options.steps < 1 {
            return Err(MotionError::InvalidConfig("steps must be at least 1".into()));
        }
        Ok(if options.estim3 { 3 } else { 2 })
    }

    /// Validate the configuration and adopt the evaluation subset,
    /// transitioning to `Ready`.
    pub fn init(&mut self, alignment_set: AlignmentSet) -> Result<(), MotionError> {
        Self::validate(&self.options)?;
        if alignment_set.is_empty() {
            return Err(MotionError::InvalidConfig(
                "evaluation subset is empty".into(),
            ));
        }
        debug!(
            "estimator ready: {} micrographs, {} frames in evaluation subset",
            alignment_set.len(),
            alignment_set.total_frames()
        );
        self.alignment_set = Some(alignment_set);
        self.phase = Phase::Ready;
        Ok(())
    }

    /// Validate the configuration and load the evaluation subset from
    /// persisted micrograph motion files.
    pub fn init_from_paths<P: AsRef<std::path::Path>>(
        &mut self,
        paths: &[P],
    ) -> Result<(), MotionError> {
        Self::validate(&self.options)?;
        self.init(AlignmentSet::load(paths)?)
    }

    /// Run the search and commit the winning tuple.
    pub fn run<S: AlignmentScorer>(&mut self, scorer: &S) -> Result<SearchOutcome, MotionError> {
        let n_params = Self::validate(&self.options)?;
        if self.alignment_set.is_none() {
            return Err(MotionError::InvalidConfig(
                "run() before init(): no evaluation subset".into(),
            ));
        }
        self.phase = Phase::Searching;

        let options = self.options;
        let set = self.alignment_set.as_ref().expect("subset checked above");

        let mut incumbent = TrialWeights {
            r_v: options.r_v,
            r_d: options.r_d,
            r_a: options.r_a,
        };
        let mut incumbent_score = None;
        let mut evaluations = 0usize;
        let mut levels = Vec::with_capacity(options.recursions);
        let mut range = options.max_range;

        for level in 0..options.recursions {
            let (best, trials) = refine_level(&options, scorer, set, incumbent, range, n_params)?;
            evaluations += trials.len();
            debug!(
                "level {}: range {:.6} best ({:.6}, {:.6}, {:.6}) score {:.6}",
                level, range, best.weights.r_v, best.weights.r_d, best.weights.r_a, best.score
            );
            incumbent = best.weights;
            incumbent_score = Some(best.score);
            levels.push(LevelReport {
                level,
                range,
                best: best.weights,
                score: best.score,
                trials,
            });
            range *= 0.5;
        }

        // With zero refinement rounds the starting tuple is still scored so
        // the outcome always carries a score.
        let score = match incumbent_score {
            Some(s) => s,
            None => {
                evaluations += 1;
                scorer.refine_and_score(set, incumbent)?
            }
        };

        // Commit the winning tuple: the real (non-trial) refinement pass
        // reads its weights from these options.
        self.options.r_v = incumbent.r_v;
        self.options.r_d = incumbent.r_d;
        self.options.r_a = incumbent.r_a;
        self.best = incumbent;
        self.best_score = Some(score);
        self.phase = Phase::Converged;

        Ok(SearchOutcome {
            weights: incumbent,
            score,
            evaluations,
            levels,
        })
    }
}

/// Evenly spaced candidates spanning `center ± range`. A single step
/// degenerates to the centre itself.
fn candidates(center: f64, range: f64, steps: usize) -> Vec<f64> {
    if steps == 1 {
        return vec![center];
    }
    (0..steps)
        .map(|i| center - range + 2.0 * range * i as f64 / (steps as f64 - 1.0))
        .collect()
}

/// Score one level's grid and return the winner with the level's trial log.
///
/// The best-so-far tuple is threaded functionally (winner in, winner out)
/// rather than mutated in place; trials run in parallel and the reduction
/// walks tuples in canonical order, so ties resolve deterministically to the
/// earliest candidate.
fn refine_level<S: AlignmentScorer>(
    options: &EstimatorOptions,
    scorer: &S,
    set: &AlignmentSet,
    center: TrialWeights,
    range: f64,
    n_params: usize,
) -> Result<(TrialReport, Vec<TrialReport>), MotionError> {
    let vs = candidates(center.r_v, range, options.steps);
    let ds = candidates(center.r_d, range, options.steps);
    let accs = if n_params == 3 {
        candidates(center.r_a, range, options.steps)
    } else {
        vec![center.r_a]
    };

    let mut tuples = Vec::with_capacity(vs.len() * ds.len() * accs.len());
    for &r_v in &vs {
        for &r_d in &ds {
            for &r_a in &accs {
                tuples.push(TrialWeights { r_v, r_d, r_a });
            }
        }
    }

    let scores: Vec<Result<f64, MotionError>> = tuples
        .par_iter()
        .map(|w| scorer.refine_and_score(set, *w))
        .collect();

    let mut trials = Vec::with_capacity(tuples.len());
    let mut best: Option<TrialReport> = None;
    for (weights, score) in tuples.into_iter().zip(scores) {
        let score = score?;
        trials.push(TrialReport { weights, score });
        let improves = best
            .as_ref()
            .map_or(true, |b| options.direction.better(score, b.score));
        if improves {
            best = Some(TrialReport { weights, score });
        }
    }

    // The grid is never empty: steps >= 1 guarantees at least one tuple.
    let best = best.expect("non-empty trial grid");
    Ok((best, trials))
}
