//! Cycle kernel for matmul-tb
//!
//! Provides the primitives a testbench consumes from a simulator:
//! - fixed-width values and declared, shape-checked ports
//! - a single clock advanced one rising edge at a time
//! - an ordered stream of read-only samples, one per cycle
//! - a backend capability flag (multi-dimensional array support)
//!
//! plus a behavioral matrix multiplier to drive the harness against.

pub mod clock_manager;
pub mod device;
pub mod multiplier;
pub mod signal;
pub mod simulator;
pub mod value;

pub use clock_manager::{ClockEdge, ClockInfo, ClockManager};
pub use device::Device;
pub use multiplier::{DeviceFault, MatrixMultiplier, MultiplierParams, MultiplierPorts};
pub use signal::{Direction, PortDecl, PortShape, SignalStore};
pub use simulator::{
    Sample, SampleReceiver, SimCapabilities, SimulationConfig, SimulationError, SimulationResult,
    Simulator,
};
pub use value::{BitVector, SignalValue};
