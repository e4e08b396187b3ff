//! Cycle kernel
//!
//! The simulator owns the signal store, the clock and the device. A testbench drives it
//! from a single async task with [`Simulator::rising_edge`]; observers subscribe to an
//! ordered stream of read-only samples, one per cycle, taken after every write of that
//! cycle has landed and before the next edge.

use crate::clock_manager::ClockManager;
use crate::device::Device;
use crate::signal::{Direction, SignalStore};
use crate::value::{BitVector, SignalValue};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Errors that can occur during simulation
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Unknown signal: {0}")]
    UnknownSignal(String),
    #[error("Signal '{signal}' shape mismatch: {detail}")]
    ShapeMismatch { signal: String, detail: String },
    #[error("Index {index} out of range for signal '{signal}' with {len} elements")]
    IndexOutOfRange {
        signal: String,
        index: usize,
        len: usize,
    },
    #[error("Value needs {bits} bits but the signal is {width} bits wide")]
    ValueTooWide { width: u32, bits: u64 },
    #[error("Signal '{0}' is not an input and cannot be driven by the testbench")]
    NotAnInput(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Device error: {0}")]
    Device(String),
    #[error("Simulation timeout after {0} cycles")]
    Timeout(u64),
}

/// Result type for simulation operations
pub type SimulationResult<T> = Result<T, SimulationError>;

/// What the simulation backend can represent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimCapabilities {
    /// Whether ports may be two-dimensional unpacked arrays
    pub multi_dimensional_arrays: bool,
}

impl SimCapabilities {
    /// Capabilities of a backend identified by name. Icarus and GHDL only expose
    /// one-dimensional arrays through their VPI/VHPI layers.
    pub fn for_simulator(name: &str) -> Self {
        let name = name.to_lowercase();
        let flattened = ["icarus", "ghdl"].iter().any(|p| name.starts_with(p));
        Self {
            multi_dimensional_arrays: !flattened,
        }
    }
}

impl Default for SimCapabilities {
    fn default() -> Self {
        Self {
            multi_dimensional_arrays: true,
        }
    }
}

/// Configuration for simulation
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Backend name, only used to derive capabilities and for logging
    pub simulator: String,
    pub capabilities: SimCapabilities,
    pub clock_name: String,
    pub clock_period_ps: u64,
    pub max_cycles: u64,
}

impl SimulationConfig {
    pub fn for_simulator(name: &str) -> Self {
        SimulationConfig {
            simulator: name.to_string(),
            capabilities: SimCapabilities::for_simulator(name),
            ..Default::default()
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            simulator: "matmul-sim".to_string(),
            capabilities: SimCapabilities::default(),
            clock_name: "clk".to_string(),
            clock_period_ps: 5_000,
            max_cycles: 1_000_000,
        }
    }
}

/// Settled values of every signal at the end of one cycle
#[derive(Debug, Clone)]
pub struct Sample {
    pub cycle: u64,
    pub time_ps: u64,
    pub signals: SignalStore,
}

pub type SampleReceiver = mpsc::UnboundedReceiver<Arc<Sample>>;

pub struct Simulator {
    config: SimulationConfig,
    store: SignalStore,
    clock: ClockManager,
    device: Box<dyn Device>,
    subscribers: Vec<mpsc::UnboundedSender<Arc<Sample>>>,
    last_published: Option<u64>,
}

impl Simulator {
    pub fn new(config: SimulationConfig, device: Box<dyn Device>) -> SimulationResult<Self> {
        let mut store = SignalStore::new();
        for port in device.ports(&config.capabilities) {
            store.declare(port)?;
        }
        let clock = ClockManager::new(config.clock_name.clone(), config.clock_period_ps);
        debug!(
            "Simulator '{}' loaded device '{}' (multi-dimensional arrays: {})",
            config.simulator,
            device.name(),
            config.capabilities.multi_dimensional_arrays
        );

        Ok(Simulator {
            config,
            store,
            clock,
            device,
            subscribers: Vec::new(),
            last_published: None,
        })
    }

    pub fn capabilities(&self) -> SimCapabilities {
        self.config.capabilities
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn cycle(&self) -> u64 {
        self.clock.cycle()
    }

    pub fn time_ps(&self) -> u64 {
        self.clock.time_ps()
    }

    /// Current (not necessarily settled) signal values
    pub fn signals(&self) -> &SignalStore {
        &self.store
    }

    pub fn read(&self, name: &str) -> SimulationResult<&SignalValue> {
        self.store.read(name)
    }

    fn check_input(&self, name: &str) -> SimulationResult<()> {
        match self.store.port(name) {
            Some(port) if port.direction == Direction::Input => Ok(()),
            Some(_) => Err(SimulationError::NotAnInput(name.to_string())),
            None => Err(SimulationError::UnknownSignal(name.to_string())),
        }
    }

    pub fn write(&mut self, name: &str, value: SignalValue) -> SimulationResult<()> {
        self.check_input(name)?;
        self.store.write(name, value)
    }

    pub fn write_element(
        &mut self,
        name: &str,
        index: usize,
        value: BitVector,
    ) -> SimulationResult<()> {
        self.check_input(name)?;
        self.store.write_element(name, index, value)
    }

    pub fn write_flag(&mut self, name: &str, high: bool) -> SimulationResult<()> {
        self.check_input(name)?;
        self.store.write_flag(name, high)
    }

    /// Receive the read-only sample of every cycle from now on
    pub fn subscribe(&mut self) -> SampleReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    fn publish(&mut self) {
        let cycle = self.clock.cycle();
        if self.last_published == Some(cycle) {
            return;
        }
        self.last_published = Some(cycle);

        let sample = Arc::new(Sample {
            cycle,
            time_ps: self.clock.time_ps(),
            signals: self.store.clone(),
        });
        // Receivers that hung up are simply forgotten
        self.subscribers.retain(|tx| tx.send(Arc::clone(&sample)).is_ok());
        trace!("Published read-only sample for cycle {}", cycle);
    }

    /// Finish the current cycle and advance to the next rising edge.
    ///
    /// Returns the number of the cycle that starts at the edge.
    pub async fn rising_edge(&mut self) -> SimulationResult<u64> {
        self.publish();

        if self.clock.cycle() >= self.config.max_cycles {
            return Err(SimulationError::Timeout(self.config.max_cycles));
        }
        self.clock.advance_to_rising_edge();
        if self.store.port(&self.config.clock_name).is_some() {
            self.store.write_flag(&self.config.clock_name, true)?;
        }
        self.device.on_rising_edge(&mut self.store)?;

        // Let observers process what was just published
        tokio::task::yield_now().await;
        Ok(self.clock.cycle())
    }

    pub async fn clock_cycles(&mut self, cycles: usize) -> SimulationResult<u64> {
        for _ in 0..cycles {
            self.rising_edge().await?;
        }
        Ok(self.clock.cycle())
    }

    /// Publish the current cycle and end every sample stream
    pub fn close_samples(&mut self) {
        self.publish();
        self.subscribers.clear();
        debug!("Closed sample streams at cycle {}", self.clock.cycle());
    }
}
