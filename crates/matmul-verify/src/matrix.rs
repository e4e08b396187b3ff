//! Fixed-width unsigned matrices

use crate::error::{VerifyError, VerifyResult};
use matmul_sim::BitVector;
use std::fmt;

/// Declared dimensions and element width of a matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixShape {
    pub rows: usize,
    pub cols: usize,
    pub element_width: u32,
}

impl MatrixShape {
    pub fn new(rows: usize, cols: usize, element_width: u32) -> Self {
        Self {
            rows,
            cols,
            element_width,
        }
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row-major position of element `(i, j)`
    pub fn flat_index(&self, i: usize, j: usize) -> usize {
        i * self.cols + j
    }
}

impl fmt::Display for MatrixShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} of u{}", self.rows, self.cols, self.element_width)
    }
}

/// A rectangular matrix whose elements all have the same bit width
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix {
    element_width: u32,
    rows: Vec<Vec<BitVector>>,
}

impl Matrix {
    pub fn new(element_width: u32, rows: Vec<Vec<BitVector>>) -> VerifyResult<Self> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        if rows.is_empty() || cols == 0 {
            return Err(VerifyError::Config("matrix must not be empty".to_string()));
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(VerifyError::ShapeMismatch {
                    signal: "matrix".to_string(),
                    detail: format!("row {} has {} elements, row 0 has {}", i, row.len(), cols),
                });
            }
            if let Some(bad) = row.iter().find(|v| v.width() != element_width) {
                return Err(VerifyError::WidthMismatch {
                    signal: "matrix".to_string(),
                    expected: element_width,
                    actual: bad.width(),
                });
            }
        }
        Ok(Self {
            element_width,
            rows,
        })
    }

    /// Build from native values, each of which must fit in `element_width` bits
    pub fn from_u64_rows<R: AsRef<[u64]>>(element_width: u32, rows: &[R]) -> VerifyResult<Self> {
        let rows = rows
            .iter()
            .map(|row| {
                row.as_ref()
                    .iter()
                    .map(|&v| BitVector::from_u64(element_width, v))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(element_width, rows)
    }

    pub fn zeros(shape: MatrixShape) -> VerifyResult<Self> {
        Self::new(
            shape.element_width,
            vec![vec![BitVector::zero(shape.element_width); shape.cols]; shape.rows],
        )
    }

    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    pub fn cols(&self) -> usize {
        self.rows[0].len()
    }

    pub fn element_width(&self) -> u32 {
        self.element_width
    }

    pub fn shape(&self) -> MatrixShape {
        MatrixShape::new(self.rows(), self.cols(), self.element_width)
    }

    pub fn get(&self, i: usize, j: usize) -> Option<&BitVector> {
        self.rows.get(i).and_then(|row| row.get(j))
    }

    pub fn as_rows(&self) -> &[Vec<BitVector>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<BitVector>> {
        self.rows
    }

    /// Native view of the values, if every element fits in a `u64`
    pub fn to_u64_rows(&self) -> Option<Vec<Vec<u64>>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(BitVector::to_u64).collect())
            .collect()
    }

    /// First cell, in row-major order, where the two matrices differ
    pub fn first_difference(&self, other: &Matrix) -> Option<(usize, usize)> {
        if self.rows() != other.rows() || self.cols() != other.cols() {
            return Some((0, 0));
        }
        self.rows
            .iter()
            .zip(&other.rows)
            .enumerate()
            .find_map(|(i, (lhs, rhs))| {
                lhs.iter()
                    .zip(rhs)
                    .position(|(l, r)| l != r)
                    .map(|j| (i, j))
            })
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "[")?;
            for (j, v) in row.iter().enumerate() {
                if j > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", v.value())?;
            }
            write!(f, "]")?;
        }
        write!(f, "] (u{})", self.element_width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows() {
        let m = Matrix::from_u64_rows(4, &[[1u64, 2, 3], [4, 5, 6]]).unwrap();
        assert_eq!(m.rows(), 2);
        assert_eq!(m.cols(), 3);
        assert_eq!(m.get(1, 2).unwrap().to_u64(), Some(6));
        assert_eq!(m.get(2, 0), None);
        assert_eq!(m.to_string(), "[[1, 2, 3], [4, 5, 6]] (u4)");
    }

    #[test]
    fn test_rejects_ragged_and_out_of_range() {
        let ragged: Vec<Vec<u64>> = vec![vec![1, 2], vec![3]];
        assert!(matches!(
            Matrix::from_u64_rows(4, &ragged),
            Err(VerifyError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            Matrix::from_u64_rows(4, &[[16u64]]),
            Err(VerifyError::Simulation(_))
        ));
        let empty: Vec<Vec<u64>> = vec![];
        assert!(Matrix::from_u64_rows(4, &empty).is_err());
    }

    #[test]
    fn test_mixed_widths_rejected() {
        let rows = vec![vec![BitVector::zero(4), BitVector::zero(5)]];
        assert!(matches!(
            Matrix::new(4, rows),
            Err(VerifyError::WidthMismatch {
                expected: 4,
                actual: 5,
                ..
            })
        ));
    }

    #[test]
    fn test_first_difference() {
        let a = Matrix::from_u64_rows(8, &[[1u64, 2], [3, 4]]).unwrap();
        let mut b_rows = a.to_u64_rows().unwrap();
        assert_eq!(a.first_difference(&a.clone()), None);
        b_rows[1][0] = 9;
        let b = Matrix::from_u64_rows(8, &b_rows).unwrap();
        assert_eq!(a.first_difference(&b), Some((1, 0)));
    }
}
