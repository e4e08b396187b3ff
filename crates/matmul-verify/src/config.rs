//! Harness configuration
//!
//! Everything the harness needs to know about the device is passed in explicitly through
//! [`TbConfig`], usually loaded from a TOML file:
//!
//! ```toml
//! num_samples = 3000
//! data_width = 8
//! a_rows = 4
//! a_columns_b_rows = 3
//! b_columns = 2
//! pipeline_latency = 1
//! naming = "suffixed"
//!
//! [signals]
//! reset = "rst"
//! ```

use crate::error::{VerifyError, VerifyResult};
use crate::matrix::MatrixShape;
use crate::model::product_width;
use crate::scoreboard::FailurePolicy;
use matmul_sim::{MultiplierParams, MultiplierPorts};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_num_samples() -> usize {
    3000
}

fn default_pipeline_latency() -> usize {
    1
}

fn default_clock_period_ps() -> u64 {
    5_000
}

fn default_reset_cycles() -> usize {
    3
}

/// Naming convention of the device's ports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalNaming {
    /// `i_A`, `i_B`, `i_valid`, `o_C`, `o_valid`
    #[default]
    Prefixed,
    /// `A_i`, `B_i`, `valid_i`, `C_o`, `valid_o`
    Suffixed,
}

/// Per-role name overrides applied on top of a naming convention
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignalOverrides {
    pub clk: Option<String>,
    pub reset: Option<String>,
    pub a: Option<String>,
    pub b: Option<String>,
    pub in_valid: Option<String>,
    pub c: Option<String>,
    pub out_valid: Option<String>,
}

/// Concrete signal name for every logical role on the two buses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalMap {
    pub clk: String,
    pub reset: String,
    pub a: String,
    pub b: String,
    pub in_valid: String,
    pub c: String,
    pub out_valid: String,
}

impl SignalMap {
    pub fn for_naming(naming: SignalNaming) -> Self {
        let ports = match naming {
            SignalNaming::Prefixed => MultiplierPorts::prefixed(),
            SignalNaming::Suffixed => MultiplierPorts::suffixed(),
        };
        Self::from(ports)
    }

    pub fn with_overrides(mut self, overrides: &SignalOverrides) -> Self {
        let apply = |slot: &mut String, value: &Option<String>| {
            if let Some(name) = value {
                slot.clone_from(name);
            }
        };
        apply(&mut self.clk, &overrides.clk);
        apply(&mut self.reset, &overrides.reset);
        apply(&mut self.a, &overrides.a);
        apply(&mut self.b, &overrides.b);
        apply(&mut self.in_valid, &overrides.in_valid);
        apply(&mut self.c, &overrides.c);
        apply(&mut self.out_valid, &overrides.out_valid);
        self
    }

    fn names(&self) -> [&str; 7] {
        [
            &self.clk,
            &self.reset,
            &self.a,
            &self.b,
            &self.in_valid,
            &self.c,
            &self.out_valid,
        ]
    }
}

impl From<MultiplierPorts> for SignalMap {
    fn from(p: MultiplierPorts) -> Self {
        Self {
            clk: p.clk,
            reset: p.reset,
            a: p.a,
            b: p.b,
            in_valid: p.in_valid,
            c: p.c,
            out_valid: p.out_valid,
        }
    }
}

impl From<SignalMap> for MultiplierPorts {
    fn from(m: SignalMap) -> Self {
        Self {
            clk: m.clk,
            reset: m.reset,
            a: m.a,
            b: m.b,
            in_valid: m.in_valid,
            c: m.c,
            out_valid: m.out_valid,
        }
    }
}

/// Harness configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TbConfig {
    /// Number of random operand pairs to drive
    #[serde(default = "default_num_samples")]
    pub num_samples: usize,

    /// Bit width `W` of every operand element
    pub data_width: u32,

    /// Rows of A and of the product
    pub a_rows: usize,

    /// Columns of A, rows of B (the inner dimension `K`)
    pub a_columns_b_rows: usize,

    /// Columns of B and of the product
    pub b_columns: usize,

    /// Cycles between an input-valid cycle and its output-valid cycle, from the device's
    /// documented contract
    #[serde(default = "default_pipeline_latency")]
    pub pipeline_latency: usize,

    /// Stimulus seed; a fresh random seed is drawn (and logged) when absent
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub naming: SignalNaming,

    #[serde(default)]
    pub signals: SignalOverrides,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    #[serde(default = "default_clock_period_ps")]
    pub clock_period_ps: u64,

    #[serde(default = "default_reset_cycles")]
    pub reset_cycles: usize,
}

impl TbConfig {
    /// Configuration with default settings for the given dimensions
    pub fn new(data_width: u32, a_rows: usize, a_columns_b_rows: usize, b_columns: usize) -> Self {
        Self {
            num_samples: default_num_samples(),
            data_width,
            a_rows,
            a_columns_b_rows,
            b_columns,
            pipeline_latency: default_pipeline_latency(),
            seed: None,
            naming: SignalNaming::default(),
            signals: SignalOverrides::default(),
            failure_policy: FailurePolicy::default(),
            clock_period_ps: default_clock_period_ps(),
            reset_cycles: default_reset_cycles(),
        }
    }

    pub fn from_toml_str(content: &str) -> VerifyResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> VerifyResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| VerifyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> VerifyResult<()> {
        let dims = [
            ("a_rows", self.a_rows),
            ("a_columns_b_rows", self.a_columns_b_rows),
            ("b_columns", self.b_columns),
        ];
        if let Some((name, _)) = dims.iter().find(|(_, v)| *v == 0) {
            return Err(VerifyError::Config(format!("{} must be at least 1", name)));
        }
        if self.data_width == 0 {
            return Err(VerifyError::Config(
                "data_width must be at least 1".to_string(),
            ));
        }
        if self.data_width > 1024 {
            return Err(VerifyError::Config(format!(
                "data_width {} is larger than the supported 1024 bits",
                self.data_width
            )));
        }
        if self.pipeline_latency == 0 {
            return Err(VerifyError::Config(
                "pipeline_latency must be at least 1".to_string(),
            ));
        }
        if self.clock_period_ps < 2 {
            return Err(VerifyError::Config(
                "clock_period_ps must be at least 2".to_string(),
            ));
        }

        let map = self.signal_map();
        let names = map.names();
        for (i, name) in names.iter().enumerate() {
            if name.is_empty() {
                return Err(VerifyError::Config("signal names must not be empty".to_string()));
            }
            if names[..i].contains(name) {
                return Err(VerifyError::Config(format!(
                    "signal name '{}' is mapped to more than one role",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn signal_map(&self) -> SignalMap {
        SignalMap::for_naming(self.naming).with_overrides(&self.signals)
    }

    pub fn a_shape(&self) -> MatrixShape {
        MatrixShape::new(self.a_rows, self.a_columns_b_rows, self.data_width)
    }

    pub fn b_shape(&self) -> MatrixShape {
        MatrixShape::new(self.a_columns_b_rows, self.b_columns, self.data_width)
    }

    pub fn c_shape(&self) -> MatrixShape {
        MatrixShape::new(self.a_rows, self.b_columns, self.output_width())
    }

    /// Width of every product element, `2W + ceil(log2 K)`
    pub fn output_width(&self) -> u32 {
        product_width(self.data_width, self.a_columns_b_rows)
    }

    /// Parameters of a behavioral multiplier that honours this configuration's contract
    pub fn multiplier_params(&self) -> MultiplierParams {
        MultiplierParams {
            data_width: self.data_width,
            a_rows: self.a_rows,
            a_columns_b_rows: self.a_columns_b_rows,
            b_columns: self.b_columns,
            latency: self.pipeline_latency,
            ports: self.signal_map().into(),
        }
    }
}
