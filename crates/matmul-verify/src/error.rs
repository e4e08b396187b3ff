//! Error types for the verification harness

use crate::scoreboard::ScoreboardFailure;
use matmul_sim::SimulationError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for harness operations
pub type VerifyResult<T> = Result<T, VerifyError>;

#[derive(Debug, Error)]
pub enum VerifyError {
    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A port or matrix does not have the declared number of rows/columns/elements
    #[error("Shape mismatch on '{signal}': {detail}")]
    ShapeMismatch { signal: String, detail: String },

    /// A port or matrix element does not have the declared bit width
    #[error("Width mismatch on '{signal}': expected {expected}-bit elements, found {actual}-bit")]
    WidthMismatch {
        signal: String,
        expected: u32,
        actual: u32,
    },

    /// A port's representation does not match the selected codec
    #[error("Signal '{signal}' is {found}, but the {codec} codec needs {needs}")]
    Representation {
        signal: String,
        codec: &'static str,
        found: String,
        needs: String,
    },

    #[error("Simulation error: {0}")]
    Simulation(#[from] SimulationError),

    /// Consolidated comparison and stream-balance failures of a run
    #[error("{0}")]
    Scoreboard(Box<ScoreboardFailure>),

    /// A monitor or scoreboard task ended abnormally
    #[error("Monitor '{name}' failed: {reason}")]
    Monitor { name: String, reason: String },

    #[error("Failed to read config file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
