//! Bus monitors
//!
//! A monitor is a task that wakes once per cycle with the cycle's read-only sample, checks
//! the bus valid flag, and on a valid cycle decodes the bus and emits one [`Transaction`]
//! into its stream. The input monitor turns operands into the expected product at the
//! moment they are seen valid; the output monitor forwards the observed result.

use crate::codec::MatrixCodec;
use crate::error::{VerifyError, VerifyResult};
use crate::matrix::{Matrix, MatrixShape};
use crate::model::expected_product;
use matmul_sim::{Sample, SampleReceiver};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A matrix observed (or derived) on a valid cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub cycle: u64,
    pub matrix: Matrix,
}

pub type TransactionSender = mpsc::UnboundedSender<Transaction>;
pub type TransactionReceiver = mpsc::UnboundedReceiver<Transaction>;

pub trait BusMonitor: Send + 'static {
    fn name(&self) -> &str;

    /// Inspect one settled cycle; `Some` when the bus carried a valid transfer
    fn sample(&mut self, sample: &Sample) -> VerifyResult<Option<Matrix>>;
}

/// Watches the input bus and emits the product the device should produce
#[derive(Debug)]
pub struct MatrixInMonitor {
    a: String,
    b: String,
    valid: String,
    a_shape: MatrixShape,
    b_shape: MatrixShape,
    codec: Arc<dyn MatrixCodec>,
}

impl MatrixInMonitor {
    pub fn new(
        a: impl Into<String>,
        b: impl Into<String>,
        valid: impl Into<String>,
        a_shape: MatrixShape,
        b_shape: MatrixShape,
        codec: Arc<dyn MatrixCodec>,
    ) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
            valid: valid.into(),
            a_shape,
            b_shape,
            codec,
        }
    }
}

impl BusMonitor for MatrixInMonitor {
    fn name(&self) -> &str {
        "input"
    }

    fn sample(&mut self, sample: &Sample) -> VerifyResult<Option<Matrix>> {
        if !sample.signals.read_flag(&self.valid)? {
            return Ok(None);
        }
        let a = self.codec.decode(&sample.signals, &self.a, self.a_shape)?;
        let b = self.codec.decode(&sample.signals, &self.b, self.b_shape)?;
        expected_product(&a, &b, self.a_shape.element_width).map(Some)
    }
}

/// Watches the output bus and forwards the observed result
#[derive(Debug)]
pub struct MatrixOutMonitor {
    c: String,
    valid: String,
    c_shape: MatrixShape,
    codec: Arc<dyn MatrixCodec>,
}

impl MatrixOutMonitor {
    pub fn new(
        c: impl Into<String>,
        valid: impl Into<String>,
        c_shape: MatrixShape,
        codec: Arc<dyn MatrixCodec>,
    ) -> Self {
        Self {
            c: c.into(),
            valid: valid.into(),
            c_shape,
            codec,
        }
    }
}

impl BusMonitor for MatrixOutMonitor {
    fn name(&self) -> &str {
        "output"
    }

    fn sample(&mut self, sample: &Sample) -> VerifyResult<Option<Matrix>> {
        if !sample.signals.read_flag(&self.valid)? {
            return Ok(None);
        }
        self.codec
            .decode(&sample.signals, &self.c, self.c_shape)
            .map(Some)
    }
}

/// What a monitor saw over its lifetime
#[derive(Debug, Clone, Default)]
pub struct MonitorReport {
    pub name: String,
    pub cycles_sampled: u64,
    pub transactions: Vec<Transaction>,
}

/// Run `monitor` over every sample until the simulator closes the stream.
///
/// Transactions go to `stream` in cycle order; with `record` they are also kept in the
/// returned report. A decode error ends the task with that error.
pub fn spawn_monitor<M: BusMonitor>(
    mut monitor: M,
    mut samples: SampleReceiver,
    stream: TransactionSender,
    record: bool,
) -> JoinHandle<VerifyResult<MonitorReport>> {
    tokio::spawn(async move {
        let mut report = MonitorReport {
            name: monitor.name().to_string(),
            ..Default::default()
        };
        let mut scoreboard_open = true;

        // Idle until the next settled cycle, then sample it
        while let Some(sample) = samples.recv().await {
            report.cycles_sampled += 1;
            let Some(matrix) = monitor.sample(&sample)? else {
                continue;
            };
            let transaction = Transaction {
                cycle: sample.cycle,
                matrix,
            };
            debug!(
                "Monitor '{}' cycle {}: {}",
                report.name, transaction.cycle, transaction.matrix
            );
            if record {
                report.transactions.push(transaction.clone());
            }
            if scoreboard_open && stream.send(transaction).is_err() {
                warn!("Monitor '{}': scoreboard is gone", report.name);
                scoreboard_open = false;
            }
        }
        Ok::<_, VerifyError>(report)
    })
}

/// Wait for a monitor task and surface its failure
pub async fn join_monitor(
    name: &str,
    handle: JoinHandle<VerifyResult<MonitorReport>>,
) -> VerifyResult<MonitorReport> {
    handle.await.map_err(|e| VerifyError::Monitor {
        name: name.to_string(),
        reason: e.to_string(),
    })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{codec_for, Representation};
    use matmul_sim::{MatrixMultiplier, MultiplierParams, MultiplierPorts, SimulationConfig, Simulator};

    fn simulator() -> Simulator {
        let dut = MatrixMultiplier::new(MultiplierParams {
            data_width: 4,
            a_rows: 2,
            a_columns_b_rows: 2,
            b_columns: 2,
            latency: 1,
            ports: MultiplierPorts::prefixed(),
        })
        .unwrap();
        Simulator::new(SimulationConfig::default(), Box::new(dut)).unwrap()
    }

    #[tokio::test]
    async fn test_monitors_follow_valid() {
        let mut sim = simulator();
        let codec = codec_for(Representation::Aggregate);
        let a_shape = MatrixShape::new(2, 2, 4);
        let c_shape = MatrixShape::new(2, 2, 9);

        let (exp_tx, mut exp_rx) = mpsc::unbounded_channel();
        let (act_tx, mut act_rx) = mpsc::unbounded_channel();
        let in_mon = spawn_monitor(
            MatrixInMonitor::new("i_A", "i_B", "i_valid", a_shape, a_shape, codec.clone()),
            sim.subscribe(),
            exp_tx,
            true,
        );
        let out_mon = spawn_monitor(
            MatrixOutMonitor::new("o_C", "o_valid", c_shape, codec.clone()),
            sim.subscribe(),
            act_tx,
            false,
        );

        sim.rising_edge().await.unwrap();
        codec
            .encode(&mut sim, "i_A", &Matrix::from_u64_rows(4, &[[1u64, 2], [3, 4]]).unwrap())
            .unwrap();
        codec
            .encode(&mut sim, "i_B", &Matrix::from_u64_rows(4, &[[5u64, 6], [7, 8]]).unwrap())
            .unwrap();
        sim.write_flag("i_valid", true).unwrap();
        sim.rising_edge().await.unwrap();
        sim.write_flag("i_valid", false).unwrap();
        sim.rising_edge().await.unwrap();
        sim.close_samples();

        let in_report = join_monitor("input", in_mon).await.unwrap();
        let out_report = join_monitor("output", out_mon).await.unwrap();
        assert_eq!(in_report.cycles_sampled, 4);
        assert_eq!(in_report.transactions.len(), 1);
        assert!(out_report.transactions.is_empty());

        let expected = exp_rx.recv().await.unwrap();
        let actual = act_rx.recv().await.unwrap();
        assert_eq!(expected.cycle, 1);
        assert_eq!(actual.cycle, 2);
        assert_eq!(expected.matrix, actual.matrix);
        assert_eq!(
            actual.matrix.to_u64_rows().unwrap(),
            vec![vec![19, 22], vec![43, 50]]
        );
        assert!(exp_rx.recv().await.is_none());
        assert!(act_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_decode_error_ends_monitor() {
        let mut sim = simulator();
        // Aggregate device ports, flattened codec: a configuration error on first valid
        let codec = codec_for(Representation::Flattened);
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = spawn_monitor(
            MatrixOutMonitor::new("o_C", "o_valid", MatrixShape::new(2, 2, 9), codec),
            sim.subscribe(),
            tx,
            false,
        );

        sim.write_flag("i_valid", true).unwrap();
        sim.clock_cycles(2).await.unwrap();
        sim.close_samples();

        let err = join_monitor("output", handle).await.unwrap_err();
        assert!(matches!(err, VerifyError::Representation { .. }), "{}", err);
    }
}
