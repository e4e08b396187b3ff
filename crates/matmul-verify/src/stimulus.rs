//! Random operand generation

use crate::config::TbConfig;
use crate::error::VerifyResult;
use crate::matrix::{Matrix, MatrixShape};
use matmul_sim::BitVector;
use num_bigint::RandBigInt;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// One operand pair, `(A, B)`
pub type StimulusPair = (Matrix, Matrix);

/// Draws operand matrices whose elements are independent and uniform in `[0, 2^W)`.
///
/// Seeded, so the same seed always yields the same sequence.
pub struct StimulusGenerator {
    rng: StdRng,
    a_shape: MatrixShape,
    b_shape: MatrixShape,
}

impl StimulusGenerator {
    pub fn new(config: &TbConfig, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            a_shape: config.a_shape(),
            b_shape: config.b_shape(),
        }
    }

    pub fn random_matrix(&mut self, shape: MatrixShape) -> VerifyResult<Matrix> {
        let width = shape.element_width;
        let rows = (0..shape.rows)
            .map(|_| {
                (0..shape.cols)
                    .map(|_| BitVector::new(width, self.rng.gen_biguint(u64::from(width))))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        Matrix::new(width, rows)
    }

    pub fn next_pair(&mut self) -> VerifyResult<StimulusPair> {
        let a = self.random_matrix(self.a_shape)?;
        let b = self.random_matrix(self.b_shape)?;
        Ok((a, b))
    }

    pub fn pairs(&mut self, count: usize) -> VerifyResult<Vec<StimulusPair>> {
        (0..count).map(|_| self.next_pair()).collect()
    }
}
