//! Declared ports and the signal store
//!
//! The store is keyed by port name and preserves declaration order. Every write is checked
//! against the port declaration, so a harness that disagrees with the device about a shape
//! or a width fails loudly instead of silently driving garbage.

use crate::simulator::{SimulationError, SimulationResult};
use crate::value::{BitVector, SignalValue};
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// Shape of a declared port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortShape {
    Scalar,
    /// `len` independent elements
    Array { len: usize },
    /// `rows` x `cols` elements in one composite signal
    Matrix { rows: usize, cols: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDecl {
    pub name: String,
    pub direction: Direction,
    pub shape: PortShape,
    /// Width of a scalar, or of each element of an array/matrix
    pub width: u32,
}

impl PortDecl {
    pub fn input(name: impl Into<String>, shape: PortShape, width: u32) -> Self {
        Self {
            name: name.into(),
            direction: Direction::Input,
            shape,
            width,
        }
    }

    pub fn output(name: impl Into<String>, shape: PortShape, width: u32) -> Self {
        Self {
            name: name.into(),
            direction: Direction::Output,
            shape,
            width,
        }
    }

    /// The all-zero value matching this declaration
    pub fn zero_value(&self) -> SignalValue {
        let zero = BitVector::zero(self.width);
        match self.shape {
            PortShape::Scalar => SignalValue::Scalar(zero),
            PortShape::Array { len } => SignalValue::Array(vec![zero; len]),
            PortShape::Matrix { rows, cols } => SignalValue::Matrix(vec![vec![zero; cols]; rows]),
        }
    }

    fn check(&self, value: &SignalValue) -> SimulationResult<()> {
        let mismatch = |detail: String| SimulationError::ShapeMismatch {
            signal: self.name.clone(),
            detail,
        };
        let check_width = |v: &BitVector| {
            if v.width() == self.width {
                Ok(())
            } else {
                Err(mismatch(format!(
                    "element width {} does not match declared width {}",
                    v.width(),
                    self.width
                )))
            }
        };

        match (self.shape, value) {
            (PortShape::Scalar, SignalValue::Scalar(v)) => check_width(v),
            (PortShape::Array { len }, SignalValue::Array(elems)) => {
                if elems.len() != len {
                    return Err(mismatch(format!(
                        "array has {} elements, port declares {}",
                        elems.len(),
                        len
                    )));
                }
                elems.iter().try_for_each(check_width)
            }
            (PortShape::Matrix { rows, cols }, SignalValue::Matrix(m)) => {
                if m.len() != rows {
                    return Err(mismatch(format!(
                        "matrix has {} rows, port declares {}",
                        m.len(),
                        rows
                    )));
                }
                for (i, row) in m.iter().enumerate() {
                    if row.len() != cols {
                        return Err(mismatch(format!(
                            "row {} has {} columns, port declares {}",
                            i,
                            row.len(),
                            cols
                        )));
                    }
                    row.iter().try_for_each(check_width)?;
                }
                Ok(())
            }
            (shape, value) => Err(mismatch(format!(
                "cannot assign a {} value to a {:?} port",
                value.kind(),
                shape
            ))),
        }
    }
}

/// Current values of every declared port
#[derive(Debug, Clone, Default)]
pub struct SignalStore {
    ports: IndexMap<String, PortDecl>,
    values: IndexMap<String, SignalValue>,
}

impl SignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a port and initialise it to zero
    pub fn declare(&mut self, port: PortDecl) -> SimulationResult<()> {
        if self.ports.contains_key(&port.name) {
            return Err(SimulationError::InvalidInput(format!(
                "port '{}' declared twice",
                port.name
            )));
        }
        self.values.insert(port.name.clone(), port.zero_value());
        self.ports.insert(port.name.clone(), port);
        Ok(())
    }

    pub fn port(&self, name: &str) -> Option<&PortDecl> {
        self.ports.get(name)
    }

    pub fn ports(&self) -> impl Iterator<Item = &PortDecl> {
        self.ports.values()
    }

    pub fn read(&self, name: &str) -> SimulationResult<&SignalValue> {
        self.values
            .get(name)
            .ok_or_else(|| SimulationError::UnknownSignal(name.to_string()))
    }

    /// Read a single-bit flag such as `valid` or `reset`
    pub fn read_flag(&self, name: &str) -> SimulationResult<bool> {
        match self.read(name)? {
            SignalValue::Scalar(v) => Ok(v.is_high()),
            other => Err(SimulationError::ShapeMismatch {
                signal: name.to_string(),
                detail: format!("expected a scalar flag, found a {}", other.kind()),
            }),
        }
    }

    /// Read one element of an array port
    pub fn read_element(&self, name: &str, index: usize) -> SimulationResult<&BitVector> {
        match self.read(name)? {
            SignalValue::Array(elems) => {
                elems
                    .get(index)
                    .ok_or_else(|| SimulationError::IndexOutOfRange {
                        signal: name.to_string(),
                        index,
                        len: elems.len(),
                    })
            }
            other => Err(SimulationError::ShapeMismatch {
                signal: name.to_string(),
                detail: format!("element access on a {} signal", other.kind()),
            }),
        }
    }

    pub fn write(&mut self, name: &str, value: SignalValue) -> SimulationResult<()> {
        let port = self
            .ports
            .get(name)
            .ok_or_else(|| SimulationError::UnknownSignal(name.to_string()))?;
        port.check(&value)?;
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Write one element of an array port
    pub fn write_element(
        &mut self,
        name: &str,
        index: usize,
        value: BitVector,
    ) -> SimulationResult<()> {
        let port = self
            .ports
            .get(name)
            .ok_or_else(|| SimulationError::UnknownSignal(name.to_string()))?;
        if value.width() != port.width {
            return Err(SimulationError::ShapeMismatch {
                signal: name.to_string(),
                detail: format!(
                    "element width {} does not match declared width {}",
                    value.width(),
                    port.width
                ),
            });
        }
        match self.values.get_mut(name) {
            Some(SignalValue::Array(elems)) => {
                let len = elems.len();
                let slot = elems
                    .get_mut(index)
                    .ok_or_else(|| SimulationError::IndexOutOfRange {
                        signal: name.to_string(),
                        index,
                        len,
                    })?;
                *slot = value;
                Ok(())
            }
            Some(other) => Err(SimulationError::ShapeMismatch {
                signal: name.to_string(),
                detail: format!("element access on a {} signal", other.kind()),
            }),
            None => Err(SimulationError::UnknownSignal(name.to_string())),
        }
    }

    pub fn write_flag(&mut self, name: &str, high: bool) -> SimulationResult<()> {
        let width = self
            .ports
            .get(name)
            .map(|p| p.width)
            .ok_or_else(|| SimulationError::UnknownSignal(name.to_string()))?;
        self.write(
            name,
            SignalValue::Scalar(BitVector::from_u64(width, u64::from(high))?),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SignalStore {
        let mut s = SignalStore::new();
        s.declare(PortDecl::input("valid", PortShape::Scalar, 1))
            .unwrap();
        s.declare(PortDecl::input("A", PortShape::Array { len: 4 }, 4))
            .unwrap();
        s.declare(PortDecl::output("C", PortShape::Matrix { rows: 2, cols: 2 }, 9))
            .unwrap();
        s
    }

    #[test]
    fn test_declared_ports_start_at_zero() {
        let s = store();
        assert!(!s.read_flag("valid").unwrap());
        assert!(s.read_element("A", 3).unwrap().is_zero());
        match s.read("C").unwrap() {
            SignalValue::Matrix(m) => assert_eq!(m.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_declaration_rejected() {
        let mut s = store();
        assert!(s
            .declare(PortDecl::input("valid", PortShape::Scalar, 1))
            .is_err());
    }

    #[test]
    fn test_writes_are_checked() {
        let mut s = store();
        s.write_flag("valid", true).unwrap();
        assert!(s.read_flag("valid").unwrap());

        let seven = BitVector::from_u64(4, 7).unwrap();
        s.write_element("A", 2, seven.clone()).unwrap();
        assert_eq!(s.read_element("A", 2).unwrap(), &seven);

        assert!(matches!(
            s.write_element("A", 4, seven.clone()),
            Err(SimulationError::IndexOutOfRange { index: 4, len: 4, .. })
        ));
        assert!(matches!(
            s.write_element("A", 0, BitVector::from_u64(5, 7).unwrap()),
            Err(SimulationError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            s.write("C", SignalValue::Array(vec![BitVector::zero(9); 4])),
            Err(SimulationError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            s.read("nope"),
            Err(SimulationError::UnknownSignal(_))
        ));
    }
}
