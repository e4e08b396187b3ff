//! Fixed-width signal values
//!
//! Every value on the bus is an unsigned integer of a declared bit width. Widths are not
//! limited to 64 bits: product ports grow with `2W + ceil(log2 K)` and can exceed any
//! native integer type, so values are backed by `BigUint`.

use crate::simulator::{SimulationError, SimulationResult};
use num_bigint::BigUint;
use num_traits::Zero;
use std::fmt;

/// An unsigned value of exactly `width` bits
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BitVector {
    width: u32,
    value: BigUint,
}

impl BitVector {
    /// Create a value, rejecting anything that does not fit in `width` bits
    pub fn new(width: u32, value: BigUint) -> SimulationResult<Self> {
        if width == 0 {
            return Err(SimulationError::InvalidInput(
                "bit width must be at least 1".to_string(),
            ));
        }
        if value.bits() > u64::from(width) {
            return Err(SimulationError::ValueTooWide {
                width,
                bits: value.bits(),
            });
        }
        Ok(Self { width, value })
    }

    pub fn from_u64(width: u32, value: u64) -> SimulationResult<Self> {
        Self::new(width, BigUint::from(value))
    }

    /// Keep only the low `width` bits of `value`, the way a register of that width would
    pub fn truncated(width: u32, value: &BigUint) -> Self {
        let mask = (BigUint::from(1u8) << width) - 1u8;
        Self {
            width,
            value: mask & value,
        }
    }

    pub fn zero(width: u32) -> Self {
        Self {
            width: width.max(1),
            value: BigUint::zero(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn value(&self) -> &BigUint {
        &self.value
    }

    pub fn into_value(self) -> BigUint {
        self.value
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    /// Single-bit view used for flags such as `valid` and `reset`
    pub fn is_high(&self) -> bool {
        !self.value.is_zero()
    }

    pub fn bit(&self, index: u32) -> bool {
        index < self.width && self.value.bit(u64::from(index))
    }

    /// Value as a native integer, if it fits
    pub fn to_u64(&self) -> Option<u64> {
        u64::try_from(&self.value).ok()
    }

    /// Little-endian byte image, padded to `ceil(width / 8)` bytes
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let len = self.width.div_ceil(8) as usize;
        let mut bytes = self.value.to_bytes_le();
        bytes.resize(len, 0);
        bytes
    }

    /// Inverse of [`BitVector::to_le_bytes`]; bits above `width` must be clear
    pub fn from_le_bytes(width: u32, bytes: &[u8]) -> SimulationResult<Self> {
        Self::new(width, BigUint::from_bytes_le(bytes))
    }
}

impl fmt::Display for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}'d{}", self.width, self.value)
    }
}

/// The value held by one declared signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalValue {
    /// A single packed vector (flags, scalars)
    Scalar(BitVector),
    /// A one-dimensional unpacked array, the flattened form of a matrix port
    Array(Vec<BitVector>),
    /// A two-dimensional unpacked array, the aggregate form of a matrix port
    Matrix(Vec<Vec<BitVector>>),
}

impl SignalValue {
    pub fn kind(&self) -> &'static str {
        match self {
            SignalValue::Scalar(_) => "scalar",
            SignalValue::Array(_) => "array",
            SignalValue::Matrix(_) => "matrix",
        }
    }

    pub fn as_scalar(&self) -> Option<&BitVector> {
        match self {
            SignalValue::Scalar(v) => Some(v),
            _ => None,
        }
    }
}
