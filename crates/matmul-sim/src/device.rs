//! Device-under-test interface
//!
//! The kernel knows nothing about what a device computes. A device declares its ports
//! (their shape may depend on what the backend can represent) and reacts to rising clock
//! edges by reading its inputs and updating its registered outputs.

use crate::signal::{PortDecl, SignalStore};
use crate::simulator::{SimCapabilities, SimulationResult};

pub trait Device: Send {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Ports the device exposes on a backend with the given capabilities
    fn ports(&self, capabilities: &SimCapabilities) -> Vec<PortDecl>;

    /// Clocked behaviour. Inputs hold the values driven before the edge; outputs written
    /// here become visible for the cycle that starts at this edge.
    fn on_rising_edge(&mut self, signals: &mut SignalStore) -> SimulationResult<()>;
}
