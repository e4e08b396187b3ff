//! Stimulus sequencer
//!
//! Owns one end-to-end scenario: wires the monitors and the scoreboard to the simulator,
//! resets the device, drives every operand pair for one valid cycle followed by one idle
//! cycle, lets the pipeline drain and returns the scoreboard's verdict.

use crate::codec::{codec_for, MatrixCodec, Representation};
use crate::config::{SignalMap, TbConfig};
use crate::error::{VerifyError, VerifyResult};
use crate::matrix::Matrix;
use crate::monitor::{
    join_monitor, spawn_monitor, MatrixInMonitor, MatrixOutMonitor, MonitorReport, Transaction,
};
use crate::scoreboard::{Scoreboard, ScoreboardReport};
use crate::stimulus::{StimulusGenerator, StimulusPair};
use matmul_sim::Simulator;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Outcome of one scenario
#[derive(Debug, Clone)]
pub struct RunReport {
    pub representation: Representation,
    /// Seed of the random stimulus, if it was generated
    pub seed: Option<u64>,
    pub samples: usize,
    /// Simulator cycle at which the scenario started
    pub start_cycle: u64,
    pub end_cycle: u64,
    pub scoreboard: ScoreboardReport,
    /// Expected stream, in order
    pub expected: Vec<Transaction>,
    /// Actual stream, in order
    pub actual: Vec<Transaction>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.scoreboard.passed()
    }

    /// The report on success, the consolidated scoreboard failure otherwise
    pub fn into_result(self) -> VerifyResult<Self> {
        match self.scoreboard.failure() {
            None => Ok(self),
            Some(failure) => Err(VerifyError::Scoreboard(Box::new(failure))),
        }
    }
}

pub struct Sequencer {
    config: TbConfig,
    signals: SignalMap,
}

impl Sequencer {
    pub fn new(config: TbConfig) -> VerifyResult<Self> {
        config.validate()?;
        let signals = config.signal_map();
        Ok(Self { config, signals })
    }

    pub fn config(&self) -> &TbConfig {
        &self.config
    }

    /// Run `num_samples` random operand pairs from the configured (or a fresh) seed
    pub async fn run_random(&self, sim: &mut Simulator) -> VerifyResult<RunReport> {
        let seed = self.config.seed.unwrap_or_else(rand::random);
        info!("Stimulus seed: {}", seed);
        let stimulus =
            StimulusGenerator::new(&self.config, seed).pairs(self.config.num_samples)?;
        let mut report = self.run(sim, stimulus).await?;
        report.seed = Some(seed);
        Ok(report)
    }

    /// Run the given operand pairs
    pub async fn run(
        &self,
        sim: &mut Simulator,
        stimulus: Vec<StimulusPair>,
    ) -> VerifyResult<RunReport> {
        let capabilities = sim.capabilities();
        info!(
            "Multi-Dimensional Array support: {}",
            capabilities.multi_dimensional_arrays
        );
        let representation = Representation::detect(&capabilities);
        let codec = codec_for(representation);
        self.check_ports(sim, codec.as_ref())?;
        self.check_stimulus(&stimulus)?;

        let (exp_tx, exp_rx) = mpsc::unbounded_channel();
        let (act_tx, act_rx) = mpsc::unbounded_channel();
        let in_monitor = spawn_monitor(
            MatrixInMonitor::new(
                self.signals.a.clone(),
                self.signals.b.clone(),
                self.signals.in_valid.clone(),
                self.config.a_shape(),
                self.config.b_shape(),
                codec.clone(),
            ),
            sim.subscribe(),
            exp_tx,
            true,
        );
        let out_monitor = spawn_monitor(
            MatrixOutMonitor::new(
                self.signals.c.clone(),
                self.signals.out_valid.clone(),
                self.config.c_shape(),
                codec.clone(),
            ),
            sim.subscribe(),
            act_tx,
            true,
        );
        let scoreboard =
            Scoreboard::new("matrix_multiplier", self.config.failure_policy).spawn(exp_rx, act_rx);

        let start_cycle = sim.cycle();
        let driven = self
            .drive(sim, codec.as_ref(), &stimulus, [&in_monitor, &out_monitor])
            .await;
        sim.close_samples();
        let end_cycle = sim.cycle();

        // A monitor failure explains any drive error, so report it first
        let input = join_monitor("input", in_monitor).await?;
        let output = join_monitor("output", out_monitor).await?;
        driven?;

        let scoreboard = scoreboard.await.map_err(|e| VerifyError::Monitor {
            name: "scoreboard".to_string(),
            reason: e.to_string(),
        })?;
        info!(
            "Scenario finished after {} cycles: {}",
            end_cycle - start_cycle,
            scoreboard.summary()
        );

        Ok(RunReport {
            representation,
            seed: None,
            samples: stimulus.len(),
            start_cycle,
            end_cycle,
            scoreboard,
            expected: input.transactions,
            actual: output.transactions,
        })
    }

    fn check_ports(&self, sim: &Simulator, codec: &dyn MatrixCodec) -> VerifyResult<()> {
        let signals = sim.signals();
        codec.check(signals, &self.signals.a, self.config.a_shape())?;
        codec.check(signals, &self.signals.b, self.config.b_shape())?;
        codec.check(signals, &self.signals.c, self.config.c_shape())?;
        for flag in [
            &self.signals.reset,
            &self.signals.in_valid,
            &self.signals.out_valid,
        ] {
            signals.read_flag(flag)?;
        }
        Ok(())
    }

    fn check_stimulus(&self, stimulus: &[StimulusPair]) -> VerifyResult<()> {
        let (a_shape, b_shape) = (self.config.a_shape(), self.config.b_shape());
        for (idx, (a, b)) in stimulus.iter().enumerate() {
            if a.shape() != a_shape || b.shape() != b_shape {
                return Err(VerifyError::ShapeMismatch {
                    signal: format!("stimulus {}", idx),
                    detail: format!(
                        "operands are {} and {}, configuration expects {} and {}",
                        a.shape(),
                        b.shape(),
                        a_shape,
                        b_shape
                    ),
                });
            }
        }
        Ok(())
    }

    async fn drive(
        &self,
        sim: &mut Simulator,
        codec: &dyn MatrixCodec,
        stimulus: &[StimulusPair],
        monitors: [&JoinHandle<VerifyResult<MonitorReport>>; 2],
    ) -> VerifyResult<()> {
        let signals = &self.signals;

        // Neutral inputs
        sim.write_flag(&signals.in_valid, false)?;
        codec.encode(sim, &signals.a, &Matrix::zeros(self.config.a_shape())?)?;
        codec.encode(sim, &signals.b, &Matrix::zeros(self.config.b_shape())?)?;

        sim.write_flag(&signals.reset, true)?;
        sim.clock_cycles(self.config.reset_cycles).await?;
        sim.write_flag(&signals.reset, false)?;
        debug!("Reset released at cycle {}", sim.cycle());

        for (idx, (a, b)) in stimulus.iter().enumerate() {
            sim.rising_edge().await?;
            codec.encode(sim, &signals.a, a)?;
            codec.encode(sim, &signals.b, b)?;
            sim.write_flag(&signals.in_valid, true)?;

            sim.rising_edge().await?;
            sim.write_flag(&signals.in_valid, false)?;

            if monitors.iter().any(|m| m.is_finished()) {
                return Err(VerifyError::Monitor {
                    name: "sequencer".to_string(),
                    reason: format!(
                        "a monitor stopped after {} of {} samples",
                        idx + 1,
                        stimulus.len()
                    ),
                });
            }
        }

        // Let the last result out of the pipeline
        sim.clock_cycles(self.config.pipeline_latency.max(1)).await?;
        Ok(())
    }
}
