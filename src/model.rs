//! Spatially varying polynomial shift model.
//!
//! The deformation surface is cubic in the frame coordinate `z` and
//! quadratic in the in-plane position `(x, y)`: six spatial basis terms
//! `{1, x, x², y, y², xy}` each carry the three powers `{z, z², z³}`, giving
//! 18 coefficients per axis. Coefficient `i` always maps to the same
//! monomial; the pairing is pinned by [`coeff_index`] and preserved verbatim
//! by serialization, so persisted models evaluate identically after a
//! round trip.

use crate::error::MotionError;
use crate::startab::StarBlock;
use log::warn;
use nalgebra::{SVector, Vector2};

/// Coefficients per axis of the third-order polynomial model.
pub const NUM_COEFFS_PER_DIM: usize = 18;
const NUM_COEFFS: usize = 2 * NUM_COEFFS_PER_DIM;

/// Version tag written for a micrograph without a spatial model.
pub const MODEL_VERSION_NULL: i64 = 0;
/// Version tag of [`ThirdOrderPolynomial`].
pub const MODEL_VERSION_THIRD_ORDER_POLYNOMIAL: i64 = 1;

pub(crate) const MOTION_COEFFS_IDX: &str = "_rlnMotionModelCoeffsIdx";
pub(crate) const MOTION_COEFF: &str = "_rlnMotionModelCoeff";

/// Spatial basis term of a coefficient, in canonical order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpatialTerm {
    One = 0,
    X = 1,
    X2 = 2,
    Y = 3,
    Y2 = 4,
    Xy = 5,
}

/// Index of the coefficient multiplying `term * z^z_power` (`z_power` in
/// `1..=3`).
pub fn coeff_index(term: SpatialTerm, z_power: u8) -> usize {
    debug_assert!((1..=3).contains(&z_power), "z power must be 1..=3");
    term as usize * 3 + (z_power as usize - 1)
}

/// 18-coefficient-per-axis polynomial shift surface.
///
/// Evaluation is pure and unvalidated: callers supply any real `(z, x, y)`,
/// typically a 1-indexed frame number cast to real and pixel offsets from a
/// reference point such as the image centre.
#[derive(Clone, Debug, PartialEq)]
pub struct ThirdOrderPolynomial {
    coeff_x: SVector<f64, NUM_COEFFS_PER_DIM>,
    coeff_y: SVector<f64, NUM_COEFFS_PER_DIM>,
}

impl Default for ThirdOrderPolynomial {
    fn default() -> Self {
        Self::zeros()
    }
}

impl ThirdOrderPolynomial {
    /// All-zero model (identity deformation).
    pub fn zeros() -> Self {
        Self {
            coeff_x: SVector::zeros(),
            coeff_y: SVector::zeros(),
        }
    }

    /// Build a model from explicit coefficient vectors.
    pub fn from_coeffs(
        coeff_x: SVector<f64, NUM_COEFFS_PER_DIM>,
        coeff_y: SVector<f64, NUM_COEFFS_PER_DIM>,
    ) -> Self {
        Self { coeff_x, coeff_y }
    }

    pub fn coeff_x(&self) -> &SVector<f64, NUM_COEFFS_PER_DIM> {
        &self.coeff_x
    }

    pub fn coeff_y(&self) -> &SVector<f64, NUM_COEFFS_PER_DIM> {
        &self.coeff_y
    }

    /// Evaluate the deformation at `(z, x, y)`.
    ///
    /// Powers are computed once and the terms are accumulated in canonical
    /// basis order, keeping results bit-stable against the persisted
    /// coefficient pairing.
    pub fn shift_at(&self, z: f64, x: f64, y: f64) -> Vector2<f64> {
        let x2 = x * x;
        let y2 = y * y;
        let xy = x * y;
        let z2 = z * z;
        let z3 = z2 * z;

        let z_powers = [z, z2, z3];
        let terms = [1.0, x, x2, y, y2, xy];

        let mut shift_x = 0.0;
        let mut shift_y = 0.0;
        for (ti, term) in terms.iter().enumerate() {
            for (pi, zp) in z_powers.iter().enumerate() {
                let i = ti * 3 + pi;
                shift_x += self.coeff_x[i] * zp * term;
                shift_y += self.coeff_y[i] * zp * term;
            }
        }
        Vector2::new(shift_x, shift_y)
    }

    /// Serialize as a loop block of 36 `(index, value)` records: indices
    /// `0..18` are the X coefficients, `18..36` the Y coefficients.
    pub fn write_block(&self, block_name: &str) -> StarBlock {
        let mut block = StarBlock::tabular(block_name);
        for (offset, coeffs) in [(0, &self.coeff_x), (NUM_COEFFS_PER_DIM, &self.coeff_y)] {
            for i in 0..NUM_COEFFS_PER_DIM {
                block.add_row();
                block.set(MOTION_COEFFS_IDX, offset + i);
                block.set(MOTION_COEFF, coeffs[i]);
            }
        }
        block
    }

    /// Deserialize from a coefficient block. Records are placed by their
    /// stored index; fails when a record is missing either field, when an
    /// index falls outside `[0, 36)`, or when the record count is not 36.
    pub fn read_block(block: &StarBlock) -> Result<Self, MotionError> {
        let mut coeff_x = SVector::zeros();
        let mut coeff_y = SVector::zeros();

        let n_read = block.n_rows();
        for row in 0..n_read {
            let idx = block.require_i64(row, MOTION_COEFFS_IDX)?;
            let value = block.require_f64(row, MOTION_COEFF)?;

            match usize::try_from(idx) {
                Ok(i) if i < NUM_COEFFS_PER_DIM => coeff_x[i] = value,
                Ok(i) if i < NUM_COEFFS => coeff_y[i - NUM_COEFFS_PER_DIM] = value,
                _ => {
                    return Err(MotionError::malformed(
                        block.name(),
                        format!("coefficient index {idx} outside [0, {NUM_COEFFS})"),
                    ))
                }
            }
        }

        if n_read != NUM_COEFFS {
            return Err(MotionError::malformed(
                block.name(),
                format!("expected {NUM_COEFFS} coefficient records, found {n_read}"),
            ));
        }

        Ok(Self { coeff_x, coeff_y })
    }
}

/// Closed set of spatial motion-model variants, tagged by the persisted
/// version field. Absence of a model is represented by `Option<MotionModel>`
/// on the owning micrograph.
#[derive(Clone, Debug, PartialEq)]
pub enum MotionModel {
    ThirdOrderPolynomial(ThirdOrderPolynomial),
}

impl MotionModel {
    /// Persisted version tag of this variant.
    pub fn version(&self) -> i64 {
        match self {
            Self::ThirdOrderPolynomial(_) => MODEL_VERSION_THIRD_ORDER_POLYNOMIAL,
        }
    }

    /// Evaluate the spatial component at `(z, x, y)`.
    pub fn shift_at(&self, z: f64, x: f64, y: f64) -> Vector2<f64> {
        match self {
            Self::ThirdOrderPolynomial(poly) => poly.shift_at(z, x, y),
        }
    }

    pub(crate) fn write_block(&self, block_name: &str) -> StarBlock {
        match self {
            Self::ThirdOrderPolynomial(poly) => poly.write_block(block_name),
        }
    }

    /// Dispatch on a persisted version tag. A recognized model version
    /// requires its coefficient block; an unrecognized version degrades to
    /// `None` with a warning instead of failing the read.
    pub(crate) fn from_version(
        version: i64,
        block: Option<&StarBlock>,
        block_name: &str,
    ) -> Result<Option<Self>, MotionError> {
        match version {
            MODEL_VERSION_NULL => Ok(None),
            MODEL_VERSION_THIRD_ORDER_POLYNOMIAL => {
                let block = block.ok_or_else(|| {
                    MotionError::malformed(block_name, "missing coefficient block for model")
                })?;
                Ok(Some(Self::ThirdOrderPolynomial(
                    ThirdOrderPolynomial::read_block(block)?,
                )))
            }
            other => {
                warn!("ignoring unknown motion model version {other}");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn pure_z_linear_term() {
        let mut cx = SVector::zeros();
        cx[coeff_index(SpatialTerm::One, 1)] = 1.0;
        let model = ThirdOrderPolynomial::from_coeffs(cx, SVector::zeros());

        let s = model.shift_at(2.0, 0.0, 0.0);
        assert_relative_eq!(s.x, 2.0);
        assert_relative_eq!(s.y, 0.0);
    }

    #[test]
    fn mixed_term_evaluation() {
        let mut cx = SVector::zeros();
        let mut cy = SVector::zeros();
        cx[coeff_index(SpatialTerm::Xy, 2)] = 0.5; // 0.5 * z^2 * x * y
        cy[coeff_index(SpatialTerm::Y2, 3)] = -1.0; // -1.0 * z^3 * y^2

        let model = ThirdOrderPolynomial::from_coeffs(cx, cy);
        let s = model.shift_at(2.0, 3.0, 4.0);
        assert_relative_eq!(s.x, 0.5 * 4.0 * 12.0);
        assert_relative_eq!(s.y, -8.0 * 16.0);
    }

    #[test]
    fn block_round_trip_is_exact() {
        let mut cx = SVector::zeros();
        let mut cy = SVector::zeros();
        for i in 0..NUM_COEFFS_PER_DIM {
            cx[i] = (i as f64 + 1.0) * 0.1;
            cy[i] = -(i as f64) / 3.0;
        }
        let model = ThirdOrderPolynomial::from_coeffs(cx, cy);

        let restored = ThirdOrderPolynomial::read_block(&model.write_block("m")).unwrap();
        assert_eq!(model, restored);
    }

    #[test]
    fn short_coefficient_table_is_rejected() {
        let model = ThirdOrderPolynomial::zeros();
        let mut block = model.write_block("m");
        // Rebuild with one record dropped.
        let mut short = StarBlock::tabular("m");
        for row in 0..block.n_rows() - 1 {
            short.add_row();
            short.set(MOTION_COEFFS_IDX, block.require_i64(row, MOTION_COEFFS_IDX).unwrap());
            short.set(MOTION_COEFF, block.require_f64(row, MOTION_COEFF).unwrap());
        }
        block = short;

        let err = ThirdOrderPolynomial::read_block(&block).unwrap_err();
        assert!(err.to_string().contains("35"), "{err}");
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut block = StarBlock::tabular("m");
        for i in 0..NUM_COEFFS {
            block.add_row();
            block.set(MOTION_COEFFS_IDX, if i == 7 { 36 } else { i as i64 });
            block.set(MOTION_COEFF, 0.0);
        }
        let err = ThirdOrderPolynomial::read_block(&block).unwrap_err();
        assert!(err.to_string().contains("index 36"), "{err}");
    }

    #[test]
    fn unknown_version_degrades_to_none() {
        let restored = MotionModel::from_version(99, None, "local_motion_model").unwrap();
        assert!(restored.is_none());
    }
}
