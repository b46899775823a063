use micromotion::model::{coeff_index, SpatialTerm};
use micromotion::{AlignmentSet, AlignmentScorer, Micrograph, MotionError, MotionModel, ThirdOrderPolynomial, TrialWeights};
use nalgebra::SVector;

/// Builds a micrograph with a drifting trajectory and full metadata.
pub fn sample_micrograph(n_frames: usize, with_model: bool) -> Micrograph {
    let mut mg = Micrograph::new(3838, 3710, n_frames, "movies/mic001.mrcs").unwrap();
    mg.gain_file = "gain/gain.mrc".to_string();
    mg.binning = 2.0;
    mg.angpix = 0.885;
    mg.dose_per_frame = 1.277;
    mg.pre_exposure = 0.0;
    mg.voltage = 300.0;
    for frame in 1..=n_frames {
        let t = frame as f64;
        mg.set_global_shift(frame, 0.3 * t + 0.01 * t * t, -0.2 * t).unwrap();
    }
    if with_model {
        mg.model = Some(MotionModel::ThirdOrderPolynomial(sample_polynomial()));
    }
    mg
}

/// A polynomial with distinct, exactly representable coefficients.
pub fn sample_polynomial() -> ThirdOrderPolynomial {
    let mut cx = SVector::zeros();
    let mut cy = SVector::zeros();
    cx[coeff_index(SpatialTerm::One, 1)] = 0.5;
    cx[coeff_index(SpatialTerm::X, 2)] = -0.03125;
    cx[coeff_index(SpatialTerm::Xy, 3)] = 0.015625;
    cy[coeff_index(SpatialTerm::Y, 1)] = 0.25;
    cy[coeff_index(SpatialTerm::Y2, 2)] = 0.0625;
    cy[coeff_index(SpatialTerm::One, 3)] = -0.125;
    ThirdOrderPolynomial::from_coeffs(cx, cy)
}

/// Strictly convex paraboloid in `(r_v, r_d)` with a known minimum; ignores
/// the evaluation subset.
pub struct ParaboloidScorer {
    pub v0: f64,
    pub d0: f64,
}

impl AlignmentScorer for ParaboloidScorer {
    fn refine_and_score(
        &self,
        _set: &AlignmentSet,
        w: TrialWeights,
    ) -> Result<f64, MotionError> {
        Ok((w.r_v - self.v0).powi(2) + (w.r_d - self.d0).powi(2))
    }
}
