//! Behavioral model of a pipelined matrix multiplier
//!
//! Stands in for the HDL design. Operands are registered on the rising edge where
//! `valid` is high, each result cell is built by a multiply-accumulate chain in a register
//! of the declared output width, and the result appears `latency` cycles after the cycle
//! in which the operands were driven.
//!
//! Faults can be injected to check that a harness actually notices a broken device.

use crate::device::Device;
use crate::signal::{PortDecl, PortShape, SignalStore};
use crate::simulator::{SimCapabilities, SimulationError, SimulationResult};
use crate::value::{BitVector, SignalValue};
use num_bigint::BigUint;
use std::collections::VecDeque;
use tracing::trace;

/// Port names of the multiplier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiplierPorts {
    pub clk: String,
    pub reset: String,
    pub a: String,
    pub b: String,
    pub in_valid: String,
    pub c: String,
    pub out_valid: String,
}

impl MultiplierPorts {
    /// `i_A`, `i_B`, `i_valid`, `o_C`, `o_valid`
    pub fn prefixed() -> Self {
        Self {
            clk: "clk".to_string(),
            reset: "reset".to_string(),
            a: "i_A".to_string(),
            b: "i_B".to_string(),
            in_valid: "i_valid".to_string(),
            c: "o_C".to_string(),
            out_valid: "o_valid".to_string(),
        }
    }

    /// `A_i`, `B_i`, `valid_i`, `C_o`, `valid_o`
    pub fn suffixed() -> Self {
        Self {
            clk: "clk".to_string(),
            reset: "reset".to_string(),
            a: "A_i".to_string(),
            b: "B_i".to_string(),
            in_valid: "valid_i".to_string(),
            c: "C_o".to_string(),
            out_valid: "valid_o".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiplierParams {
    pub data_width: u32,
    pub a_rows: usize,
    pub a_columns_b_rows: usize,
    pub b_columns: usize,
    /// Cycles between the operands' valid cycle and the result's valid cycle
    pub latency: usize,
    pub ports: MultiplierPorts,
}

impl MultiplierParams {
    /// Width of every result element
    pub fn output_width(&self) -> u32 {
        let k = self.a_columns_b_rows.max(1);
        let clog2 = usize::BITS - (k - 1).leading_zeros();
        2 * self.data_width + clog2
    }
}

/// Deliberate defects for negative testing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFault {
    /// Never raise `valid` for the n-th result (0-based)
    DropValid { result: usize },
    /// Flip bit 0 of one element of the n-th result
    CorruptElement {
        result: usize,
        row: usize,
        col: usize,
    },
    /// Accumulate in a register one bit narrower than required
    NarrowAccumulator,
}

type Cells = Vec<Vec<BitVector>>;

pub struct MatrixMultiplier {
    params: MultiplierParams,
    fault: Option<DeviceFault>,
    /// Results in flight, `latency - 1` entries between edges
    pipeline: VecDeque<Option<Cells>>,
    results: usize,
}

impl MatrixMultiplier {
    pub fn new(params: MultiplierParams) -> SimulationResult<Self> {
        if params.latency == 0 {
            return Err(SimulationError::InvalidInput(
                "multiplier latency must be at least one cycle".to_string(),
            ));
        }
        if params.data_width == 0
            || params.a_rows == 0
            || params.a_columns_b_rows == 0
            || params.b_columns == 0
        {
            return Err(SimulationError::InvalidInput(
                "multiplier dimensions and data width must be non-zero".to_string(),
            ));
        }
        let pipeline = Self::empty_pipeline(params.latency);
        Ok(Self {
            params,
            fault: None,
            pipeline,
            results: 0,
        })
    }

    pub fn with_fault(mut self, fault: DeviceFault) -> Self {
        self.fault = Some(fault);
        self
    }

    pub fn params(&self) -> &MultiplierParams {
        &self.params
    }

    fn empty_pipeline(latency: usize) -> VecDeque<Option<Cells>> {
        std::iter::repeat_with(|| None).take(latency - 1).collect()
    }

    fn shape(&self, rows: usize, cols: usize, capabilities: &SimCapabilities) -> PortShape {
        if capabilities.multi_dimensional_arrays {
            PortShape::Matrix { rows, cols }
        } else {
            PortShape::Array { len: rows * cols }
        }
    }

    fn read_operand(
        signals: &SignalStore,
        name: &str,
        rows: usize,
        cols: usize,
    ) -> SimulationResult<Vec<Vec<BigUint>>> {
        let cells: Vec<Vec<BigUint>> = match signals.read(name)? {
            SignalValue::Matrix(m) => m
                .iter()
                .map(|row| row.iter().map(|v| v.value().clone()).collect())
                .collect(),
            SignalValue::Array(elems) => elems
                .chunks(cols)
                .map(|row| row.iter().map(|v| v.value().clone()).collect())
                .collect(),
            SignalValue::Scalar(_) => {
                return Err(SimulationError::Device(format!(
                    "operand port '{}' is not an array",
                    name
                )))
            }
        };
        if cells.len() != rows {
            return Err(SimulationError::Device(format!(
                "operand port '{}' has {} rows, expected {}",
                name,
                cells.len(),
                rows
            )));
        }
        Ok(cells)
    }

    fn multiply(&self, signals: &SignalStore) -> SimulationResult<Cells> {
        let p = &self.params;
        let a = Self::read_operand(signals, &p.ports.a, p.a_rows, p.a_columns_b_rows)?;
        let b = Self::read_operand(signals, &p.ports.b, p.a_columns_b_rows, p.b_columns)?;

        let out_width = p.output_width();
        let acc_width = match self.fault {
            Some(DeviceFault::NarrowAccumulator) => out_width - 1,
            _ => out_width,
        };

        let mut c = Vec::with_capacity(p.a_rows);
        for i in 0..p.a_rows {
            let mut row = Vec::with_capacity(p.b_columns);
            for j in 0..p.b_columns {
                // MAC chain, wrapping at the accumulator width like the hardware register
                let mut acc = BitVector::zero(acc_width);
                for n in 0..p.a_columns_b_rows {
                    let sum = &a[i][n] * &b[n][j] + acc.value();
                    acc = BitVector::truncated(acc_width, &sum);
                }
                row.push(BitVector::new(out_width, acc.into_value())?);
            }
            c.push(row);
        }
        Ok(c)
    }

    fn write_result(&self, signals: &mut SignalStore, cells: Cells) -> SimulationResult<()> {
        let name = &self.params.ports.c;
        let value = match signals.port(name).map(|p| p.shape) {
            Some(PortShape::Matrix { .. }) => SignalValue::Matrix(cells),
            Some(_) => SignalValue::Array(cells.into_iter().flatten().collect()),
            None => return Err(SimulationError::UnknownSignal(name.clone())),
        };
        signals.write(name, value)
    }

    fn clear_outputs(&mut self, signals: &mut SignalStore) -> SimulationResult<()> {
        let ports = &self.params.ports;
        let zero = signals
            .port(&ports.c)
            .map(|p| p.zero_value())
            .ok_or_else(|| SimulationError::UnknownSignal(ports.c.clone()))?;
        signals.write(&ports.c, zero)?;
        signals.write_flag(&ports.out_valid, false)
    }

    fn inject(&self, mut cells: Cells) -> Option<Cells> {
        match self.fault {
            Some(DeviceFault::DropValid { result }) if result == self.results => None,
            Some(DeviceFault::CorruptElement { result, row, col }) if result == self.results => {
                if let Some(cell) = cells.get_mut(row).and_then(|r| r.get_mut(col)) {
                    let flipped = BigUint::from(1u8) ^ cell.value();
                    *cell = BitVector::truncated(cell.width(), &flipped);
                }
                Some(cells)
            }
            _ => Some(cells),
        }
    }
}

impl Device for MatrixMultiplier {
    fn name(&self) -> &str {
        "matrix_multiplier"
    }

    fn ports(&self, capabilities: &SimCapabilities) -> Vec<PortDecl> {
        let p = &self.params;
        vec![
            PortDecl::input(p.ports.clk.clone(), PortShape::Scalar, 1),
            PortDecl::input(p.ports.reset.clone(), PortShape::Scalar, 1),
            PortDecl::input(
                p.ports.a.clone(),
                self.shape(p.a_rows, p.a_columns_b_rows, capabilities),
                p.data_width,
            ),
            PortDecl::input(
                p.ports.b.clone(),
                self.shape(p.a_columns_b_rows, p.b_columns, capabilities),
                p.data_width,
            ),
            PortDecl::input(p.ports.in_valid.clone(), PortShape::Scalar, 1),
            PortDecl::output(
                p.ports.c.clone(),
                self.shape(p.a_rows, p.b_columns, capabilities),
                p.output_width(),
            ),
            PortDecl::output(p.ports.out_valid.clone(), PortShape::Scalar, 1),
        ]
    }

    fn on_rising_edge(&mut self, signals: &mut SignalStore) -> SimulationResult<()> {
        if signals.read_flag(&self.params.ports.reset)? {
            self.pipeline = Self::empty_pipeline(self.params.latency);
            self.results = 0;
            return self.clear_outputs(signals);
        }

        let incoming = if signals.read_flag(&self.params.ports.in_valid)? {
            Some(self.multiply(signals)?)
        } else {
            None
        };
        self.pipeline.push_back(incoming);

        match self.pipeline.pop_front().flatten() {
            Some(cells) => {
                let emitted = self.inject(cells);
                self.results += 1;
                match emitted {
                    Some(cells) => {
                        trace!("Multiplier result {} valid", self.results - 1);
                        self.write_result(signals, cells)?;
                        signals.write_flag(&self.params.ports.out_valid, true)
                    }
                    None => signals.write_flag(&self.params.ports.out_valid, false),
                }
            }
            None => signals.write_flag(&self.params.ports.out_valid, false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{SimulationConfig, Simulator};

    fn params(latency: usize) -> MultiplierParams {
        MultiplierParams {
            data_width: 4,
            a_rows: 2,
            a_columns_b_rows: 2,
            b_columns: 2,
            latency,
            ports: MultiplierPorts::prefixed(),
        }
    }

    fn matrix(width: u32, rows: &[&[u64]]) -> SignalValue {
        SignalValue::Matrix(
            rows.iter()
                .map(|r| {
                    r.iter()
                        .map(|v| BitVector::from_u64(width, *v).unwrap())
                        .collect()
                })
                .collect(),
        )
    }

    fn result(sim: &Simulator) -> Vec<u64> {
        match sim.read("o_C").unwrap() {
            SignalValue::Matrix(m) => m.iter().flatten().map(|v| v.to_u64().unwrap()).collect(),
            SignalValue::Array(a) => a.iter().map(|v| v.to_u64().unwrap()).collect(),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_output_width() {
        assert_eq!(params(1).output_width(), 9);
        let mut p = params(1);
        p.a_columns_b_rows = 1;
        assert_eq!(p.output_width(), 8);
        p.a_columns_b_rows = 5;
        assert_eq!(p.output_width(), 11);
    }

    #[test]
    fn test_zero_latency_rejected() {
        assert!(MatrixMultiplier::new(params(0)).is_err());
    }

    #[test]
    fn test_ports_follow_capabilities() {
        let dut = MatrixMultiplier::new(params(1)).unwrap();
        let flat = dut.ports(&SimCapabilities::for_simulator("icarus"));
        let a = flat.iter().find(|p| p.name == "i_A").unwrap();
        assert_eq!(a.shape, PortShape::Array { len: 4 });

        let agg = dut.ports(&SimCapabilities::for_simulator("questa"));
        let c = agg.iter().find(|p| p.name == "o_C").unwrap();
        assert_eq!(c.shape, PortShape::Matrix { rows: 2, cols: 2 });
        assert_eq!(c.width, 9);
    }

    #[tokio::test]
    async fn test_pipeline_latency() {
        for latency in 1..=3 {
            let dut = MatrixMultiplier::new(params(latency)).unwrap();
            let mut sim = Simulator::new(SimulationConfig::default(), Box::new(dut)).unwrap();

            sim.rising_edge().await.unwrap();
            let driven_cycle = sim.cycle();
            sim.write("i_A", matrix(4, &[&[1, 2], &[3, 4]])).unwrap();
            sim.write("i_B", matrix(4, &[&[5, 6], &[7, 8]])).unwrap();
            sim.write_flag("i_valid", true).unwrap();

            sim.rising_edge().await.unwrap();
            sim.write_flag("i_valid", false).unwrap();

            let mut seen = None;
            for _ in 0..latency + 2 {
                if sim.signals().read_flag("o_valid").unwrap() {
                    assert!(seen.is_none(), "valid must pulse once");
                    seen = Some(sim.cycle());
                    assert_eq!(result(&sim), vec![19, 22, 43, 50]);
                }
                sim.rising_edge().await.unwrap();
            }
            assert_eq!(seen, Some(driven_cycle + latency as u64));
        }
    }

    #[tokio::test]
    async fn test_reset_clears_pipeline() {
        let dut = MatrixMultiplier::new(params(2)).unwrap();
        let mut sim = Simulator::new(SimulationConfig::default(), Box::new(dut)).unwrap();

        sim.write("i_A", matrix(4, &[&[1, 1], &[1, 1]])).unwrap();
        sim.write_flag("i_valid", true).unwrap();
        sim.rising_edge().await.unwrap();
        sim.write_flag("i_valid", false).unwrap();
        sim.write_flag("reset", true).unwrap();
        sim.clock_cycles(3).await.unwrap();
        sim.write_flag("reset", false).unwrap();
        for _ in 0..3 {
            sim.rising_edge().await.unwrap();
            assert!(!sim.signals().read_flag("o_valid").unwrap());
        }
    }

    #[tokio::test]
    async fn test_narrow_accumulator_wraps() {
        let dut = MatrixMultiplier::new(params(1))
            .unwrap()
            .with_fault(DeviceFault::NarrowAccumulator);
        let mut sim = Simulator::new(
            SimulationConfig::for_simulator("icarus"),
            Box::new(dut),
        )
        .unwrap();

        for idx in 0..4 {
            sim.write_element("i_A", idx, BitVector::from_u64(4, 15).unwrap())
                .unwrap();
            sim.write_element("i_B", idx, BitVector::from_u64(4, 15).unwrap())
                .unwrap();
        }
        sim.write_flag("i_valid", true).unwrap();
        sim.rising_edge().await.unwrap();

        // 2 * 225 = 450 needs 9 bits; an 8-bit accumulator keeps 450 - 256
        assert_eq!(result(&sim), vec![194; 4]);
    }

    #[tokio::test]
    async fn test_outputs_cannot_be_driven() {
        let dut = MatrixMultiplier::new(params(1)).unwrap();
        let mut sim = Simulator::new(SimulationConfig::default(), Box::new(dut)).unwrap();
        assert!(matches!(
            sim.write_flag("o_valid", true),
            Err(SimulationError::NotAnInput(_))
        ));
    }
}
