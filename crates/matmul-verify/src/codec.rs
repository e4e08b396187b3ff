//! Matrix codec
//!
//! Converts between a logical [`Matrix`] and its bus representation. Which representation
//! a device uses depends on the simulation backend: with multi-dimensional array support a
//! matrix port is one aggregate signal, otherwise it is flattened into `rows * cols`
//! scalar elements in row-major order. The codec is picked once per run by [`codec_for`].

use crate::error::{VerifyError, VerifyResult};
use crate::matrix::{Matrix, MatrixShape};
use matmul_sim::{PortShape, SignalStore, SignalValue, SimCapabilities, Simulator};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Representation {
    Aggregate,
    Flattened,
}

impl Representation {
    pub fn detect(capabilities: &SimCapabilities) -> Self {
        if capabilities.multi_dimensional_arrays {
            Representation::Aggregate
        } else {
            Representation::Flattened
        }
    }
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Representation::Aggregate => write!(f, "aggregate"),
            Representation::Flattened => write!(f, "flattened"),
        }
    }
}

pub trait MatrixCodec: Send + Sync + fmt::Debug {
    fn representation(&self) -> Representation;

    /// Verify that `signal` is declared with the representation, dimensions and element
    /// width this codec expects for `shape`
    fn check(&self, signals: &SignalStore, signal: &str, shape: MatrixShape) -> VerifyResult<()>;

    /// Reconstruct the matrix held by `signal`
    fn decode(&self, signals: &SignalStore, signal: &str, shape: MatrixShape)
        -> VerifyResult<Matrix>;

    /// Drive `matrix` onto `signal`
    fn encode(&self, sim: &mut Simulator, signal: &str, matrix: &Matrix) -> VerifyResult<()>;
}

pub fn codec_for(representation: Representation) -> Arc<dyn MatrixCodec> {
    match representation {
        Representation::Aggregate => Arc::new(AggregateCodec),
        Representation::Flattened => Arc::new(FlattenedCodec),
    }
}

fn check_width(signal: &str, declared: u32, shape: MatrixShape) -> VerifyResult<()> {
    if declared == shape.element_width {
        Ok(())
    } else {
        Err(VerifyError::WidthMismatch {
            signal: signal.to_string(),
            expected: shape.element_width,
            actual: declared,
        })
    }
}

fn declared(signals: &SignalStore, signal: &str) -> VerifyResult<(PortShape, u32)> {
    signals
        .port(signal)
        .map(|p| (p.shape, p.width))
        .ok_or_else(|| VerifyError::Config(format!("device has no signal named '{}'", signal)))
}

/// One composite signal carrying the whole matrix
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateCodec;

impl MatrixCodec for AggregateCodec {
    fn representation(&self) -> Representation {
        Representation::Aggregate
    }

    fn check(&self, signals: &SignalStore, signal: &str, shape: MatrixShape) -> VerifyResult<()> {
        match declared(signals, signal)? {
            (PortShape::Matrix { rows, cols }, width) => {
                if rows != shape.rows || cols != shape.cols {
                    return Err(VerifyError::ShapeMismatch {
                        signal: signal.to_string(),
                        detail: format!(
                            "port is {}x{}, configuration expects {}x{}",
                            rows, cols, shape.rows, shape.cols
                        ),
                    });
                }
                check_width(signal, width, shape)
            }
            (other, _) => Err(VerifyError::Representation {
                signal: signal.to_string(),
                codec: "aggregate",
                found: format!("{:?}", other),
                needs: format!("a {}x{} matrix signal", shape.rows, shape.cols),
            }),
        }
    }

    fn decode(
        &self,
        signals: &SignalStore,
        signal: &str,
        shape: MatrixShape,
    ) -> VerifyResult<Matrix> {
        self.check(signals, signal, shape)?;
        match signals.read(signal)? {
            SignalValue::Matrix(rows) => Matrix::new(shape.element_width, rows.clone()),
            other => Err(VerifyError::Representation {
                signal: signal.to_string(),
                codec: "aggregate",
                found: format!("a {} value", other.kind()),
                needs: "a matrix value".to_string(),
            }),
        }
    }

    fn encode(&self, sim: &mut Simulator, signal: &str, matrix: &Matrix) -> VerifyResult<()> {
        self.check(sim.signals(), signal, matrix.shape())?;
        sim.write(signal, SignalValue::Matrix(matrix.as_rows().to_vec()))?;
        Ok(())
    }
}

/// `rows * cols` scalar elements, element `(i, j)` at index `i * cols + j`
#[derive(Debug, Clone, Copy, Default)]
pub struct FlattenedCodec;

impl MatrixCodec for FlattenedCodec {
    fn representation(&self) -> Representation {
        Representation::Flattened
    }

    fn check(&self, signals: &SignalStore, signal: &str, shape: MatrixShape) -> VerifyResult<()> {
        match declared(signals, signal)? {
            (PortShape::Array { len }, width) => {
                if len != shape.len() {
                    return Err(VerifyError::ShapeMismatch {
                        signal: signal.to_string(),
                        detail: format!(
                            "port has {} elements, a {}x{} matrix needs {}",
                            len,
                            shape.rows,
                            shape.cols,
                            shape.len()
                        ),
                    });
                }
                check_width(signal, width, shape)
            }
            (other, _) => Err(VerifyError::Representation {
                signal: signal.to_string(),
                codec: "flattened",
                found: format!("{:?}", other),
                needs: format!("an array of {} elements", shape.len()),
            }),
        }
    }

    fn decode(
        &self,
        signals: &SignalStore,
        signal: &str,
        shape: MatrixShape,
    ) -> VerifyResult<Matrix> {
        self.check(signals, signal, shape)?;
        let rows = (0..shape.rows)
            .map(|i| {
                (0..shape.cols)
                    .map(|j| signals.read_element(signal, shape.flat_index(i, j)).cloned())
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        Matrix::new(shape.element_width, rows)
    }

    fn encode(&self, sim: &mut Simulator, signal: &str, matrix: &Matrix) -> VerifyResult<()> {
        let shape = matrix.shape();
        self.check(sim.signals(), signal, shape)?;
        for (i, row) in matrix.as_rows().iter().enumerate() {
            // Index with the row's own length; it has to agree with the declared shape
            if row.len() != shape.cols {
                return Err(VerifyError::ShapeMismatch {
                    signal: signal.to_string(),
                    detail: format!(
                        "row {} has {} elements, expected {}",
                        i,
                        row.len(),
                        shape.cols
                    ),
                });
            }
            for (j, value) in row.iter().enumerate() {
                sim.write_element(signal, i * row.len() + j, value.clone())?;
            }
        }
        Ok(())
    }
}
