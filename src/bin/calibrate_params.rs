//! Config-driven weight calibration demo.
//!
//! Loads the evaluation subset named in a JSON config, runs the recursive
//! grid search and prints (optionally dumps) the calibration report. The
//! scorer here is a stand-in for an external refinement engine: it rewards
//! smooth observed trajectories, penalized by the trial weights' distance
//! from the subset's roughness scale. Swap in a real `AlignmentScorer` to
//! calibrate against an actual alignment pass.
//!
//! Usage: `calibrate_params <config.json>`

use micromotion::config::load_config;
use micromotion::{
    write_json_file, AlignmentScorer, AlignmentSet, CalibrationReport, MotionError,
    ParamEstimator, TrialWeights,
};
use std::env;
use std::path::PathBuf;
use std::time::Instant;

/// Surrogate quality score standing in for a real refinement pass: a convex
/// surface whose optimum tracks the roughness of the observed global
/// trajectories (rough trajectories ask for weaker velocity/acceleration
/// smoothing).
struct TrajectoryRoughnessScorer;

impl TrajectoryRoughnessScorer {
    fn roughness(set: &AlignmentSet) -> Result<(f64, f64), MotionError> {
        let mut vel = 0.0;
        let mut acc = 0.0;
        let mut count = 0usize;
        for mg in set.micrographs() {
            for frame in 2..mg.n_frames() {
                if !(mg.observed(frame - 1)? && mg.observed(frame)? && mg.observed(frame + 1)?) {
                    continue;
                }
                let prev = mg.global_shift(frame - 1)?;
                let curr = mg.global_shift(frame)?;
                let next = mg.global_shift(frame + 1)?;
                vel += (next - prev).norm_squared() / 4.0;
                acc += (next - 2.0 * curr + prev).norm_squared();
                count += 1;
            }
        }
        if count == 0 {
            return Err(MotionError::InvalidConfig(
                "evaluation subset has no observed trajectories".into(),
            ));
        }
        Ok((vel / count as f64, acc / count as f64))
    }
}

impl AlignmentScorer for TrajectoryRoughnessScorer {
    fn refine_and_score(
        &self,
        set: &AlignmentSet,
        w: TrialWeights,
    ) -> Result<f64, MotionError> {
        let (mean_vel, mean_acc) = Self::roughness(set)?;
        let opt_v = 1.0 / (1.0 + mean_vel);
        let opt_a = 1.0 / (1.0 + mean_acc);
        Ok((w.r_v - opt_v).powi(2) + (w.r_d - 1.0).powi(2) + (w.r_a - opt_a).powi(2))
    }
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), MotionError> {
    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .ok_or_else(|| MotionError::InvalidConfig("usage: calibrate_params <config.json>".into()))?;
    let config = load_config(&config_path)?;

    let mut estimator = ParamEstimator::new(config.estimator);
    estimator.init_from_paths(&config.micrographs)?;

    let t0 = Instant::now();
    let outcome = estimator.run(&TrajectoryRoughnessScorer)?;
    let latency_ms = t0.elapsed().as_secs_f64() * 1000.0;

    println!(
        "best (rV, rD, rA) = ({:.4}, {:.4}, {:.4}) score {:.6}",
        outcome.weights.r_v, outcome.weights.r_d, outcome.weights.r_a, outcome.score
    );
    println!(
        "{} evaluations over {} levels in {:.1} ms",
        outcome.evaluations,
        outcome.levels.len(),
        latency_ms
    );

    if let Some(path) = &config.output.json_out {
        let report = CalibrationReport {
            best: outcome.weights,
            score: outcome.score,
            evaluations: outcome.evaluations,
            latency_ms,
            levels: outcome.levels,
        };
        write_json_file(path, &report)?;
        println!("JSON report written to {}", path.display());
    }
    Ok(())
}
