//! Expected-value computer
//!
//! Ground truth for the multiplier: the exact integer product of the operands, computed in
//! arbitrary precision and represented at the widened output width
//! `2W + ceil(log2 K)`, which holds the worst case `K * (2^W - 1)^2` exactly.

use crate::error::{VerifyError, VerifyResult};
use crate::matrix::Matrix;
use matmul_sim::BitVector;
use num_bigint::BigUint;
use num_traits::Zero;

/// `ceil(log2 n)` for `n >= 1`; zero for `n <= 1`
pub fn ceil_log2(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

/// Bit width of each product element for `W`-bit operands and inner dimension `K`
pub fn product_width(data_width: u32, inner: usize) -> u32 {
    2 * data_width + ceil_log2(inner)
}

/// Largest value a product element can take: `K * (2^W - 1)^2`
pub fn max_product_value(data_width: u32, inner: usize) -> BigUint {
    let max_operand = (BigUint::from(1u8) << data_width) - 1u8;
    &max_operand * &max_operand * BigUint::from(inner)
}

/// Exact product `A x B` for `W`-bit operands
pub fn expected_product(a: &Matrix, b: &Matrix, data_width: u32) -> VerifyResult<Matrix> {
    if a.cols() != b.rows() {
        return Err(VerifyError::ShapeMismatch {
            signal: "B".to_string(),
            detail: format!(
                "A has {} columns but B has {} rows",
                a.cols(),
                b.rows()
            ),
        });
    }
    for (name, m) in [("A", a), ("B", b)] {
        if m.element_width() != data_width {
            return Err(VerifyError::WidthMismatch {
                signal: name.to_string(),
                expected: data_width,
                actual: m.element_width(),
            });
        }
    }

    let inner = a.cols();
    let width = product_width(data_width, inner);
    let rows = (0..a.rows())
        .map(|i| {
            (0..b.cols())
                .map(|j| {
                    let sum = (0..inner).fold(BigUint::zero(), |acc, n| {
                        acc + a.as_rows()[i][n].value() * b.as_rows()[n][j].value()
                    });
                    // Never truncates: a value that does not fit is an error
                    BitVector::new(width, sum)
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    Matrix::new(width, rows)
}
