use micromotion::{
    AlignmentScorer, AlignmentSet, EstimatorOptions, Micrograph, MotionError, ParamEstimator,
    TrialWeights,
};

// Demo stub: calibrates weights against a synthetic convex quality surface
// standing in for the external alignment engine.
struct SyntheticScorer {
    target: TrialWeights,
}

impl AlignmentScorer for SyntheticScorer {
    fn refine_and_score(
        &self,
        _set: &AlignmentSet,
        w: TrialWeights,
    ) -> Result<f64, MotionError> {
        Ok((w.r_v - self.target.r_v).powi(2)
            + (w.r_d - self.target.r_d).powi(2)
            + 0.25 * (w.r_a - self.target.r_a).powi(2))
    }
}

fn main() {
    env_logger::init();

    let mg = Micrograph::new(4096, 4096, 40, "demo.mrcs").expect("valid demo dimensions");

    let mut estimator = ParamEstimator::new(EstimatorOptions {
        estim3: true,
        max_range: 2.0,
        recursions: 4,
        steps: 5,
        ..Default::default()
    });
    estimator
        .init(AlignmentSet::from_micrographs(vec![mg]))
        .expect("valid demo configuration");

    let scorer = SyntheticScorer {
        target: TrialWeights {
            r_v: 0.6,
            r_d: 0.3,
            r_a: 1.4,
        },
    };
    let outcome = estimator.run(&scorer).expect("synthetic search succeeds");

    println!(
        "best (rV, rD, rA) = ({:.4}, {:.4}, {:.4}) score {:.6} after {} evaluations",
        outcome.weights.r_v,
        outcome.weights.r_d,
        outcome.weights.r_a,
        outcome.score,
        outcome.evaluations
    );
}
