//! Verification harness for a matrix multiplier
//!
//! The harness drives random operand pairs into a device under test, observes both of its
//! interfaces with passive monitors and checks every result against a reference model:
//!
//! - [`config`]: testbench parameters and signal naming
//! - [`codec`]: aggregate or flattened matrix ports, chosen from the backend's capabilities
//! - [`model`]: the expected product and its bit width
//! - [`monitor`]: input and output monitors turning cycles into transactions
//! - [`scoreboard`]: in-order comparison of expected and actual transactions
//! - [`sequencer`]: reset, stimulus, drain and the final verdict

pub mod codec;
pub mod config;
pub mod error;
pub mod matrix;
pub mod model;
pub mod monitor;
pub mod scoreboard;
pub mod sequencer;
pub mod stimulus;

pub use codec::{codec_for, AggregateCodec, FlattenedCodec, MatrixCodec, Representation};
pub use config::{SignalMap, SignalNaming, SignalOverrides, TbConfig};
pub use error::{VerifyError, VerifyResult};
pub use matrix::{Matrix, MatrixShape};
pub use model::{ceil_log2, expected_product, max_product_value, product_width};
pub use monitor::{
    join_monitor, spawn_monitor, BusMonitor, MatrixInMonitor, MatrixOutMonitor, MonitorReport,
    Transaction, TransactionReceiver, TransactionSender,
};
pub use scoreboard::{
    FailurePolicy, Mismatch, Scoreboard, ScoreboardFailure, ScoreboardReport, StreamImbalance,
};
pub use sequencer::{RunReport, Sequencer};
pub use stimulus::{StimulusGenerator, StimulusPair};
