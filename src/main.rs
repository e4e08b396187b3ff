use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use matmul_sim::{DeviceFault, MatrixMultiplier, SimulationConfig, Simulator};
use matmul_verify::{FailurePolicy, Sequencer, SignalNaming, TbConfig};
use std::path::{Path, PathBuf};
use tracing::info;

/// Cycle-accurate verification harness for a matrix multiplier
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive random operand pairs through the multiplier and check every result
    Run(RunArgs),

    /// Load and validate a configuration file, then print the derived port layout
    CheckConfig {
        /// TOML configuration file
        config: PathBuf,

        /// Simulator whose capabilities decide the port representation
        #[arg(long, default_value = "verilator")]
        simulator: String,
    },
}

#[derive(Args)]
struct RunArgs {
    /// TOML configuration file (without one, an 8-bit 4x4 by 4x4 multiplier is assumed)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Simulator whose capabilities decide the port representation
    #[arg(long, default_value = "verilator")]
    simulator: String,

    /// Number of operand pairs
    #[arg(short = 'n', long)]
    samples: Option<usize>,

    /// Element width of A and B
    #[arg(short = 'w', long)]
    data_width: Option<u32>,

    /// Rows of A
    #[arg(long)]
    a_rows: Option<usize>,

    /// Columns of A, rows of B
    #[arg(long)]
    inner: Option<usize>,

    /// Columns of B
    #[arg(long)]
    b_columns: Option<usize>,

    /// Cycles from input valid to output valid
    #[arg(short, long)]
    latency: Option<usize>,

    /// Stimulus seed
    #[arg(short, long)]
    seed: Option<u64>,

    /// Port naming: prefixed (i_A, o_C) or suffixed (A_i, C_o)
    #[arg(long)]
    naming: Option<String>,

    /// Compare every result instead of stopping at the first mismatch
    #[arg(long)]
    collect_all: bool,

    /// Inject a device fault: narrow, drop-valid:<n> or corrupt:<n>:<row>:<col>
    #[arg(long)]
    fault: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt().with_env_filter(log_level).init();

    match cli.command {
        Commands::Run(args) => run(args).await?,
        Commands::CheckConfig { config, simulator } => check_config(&config, &simulator)?,
    }

    Ok(())
}

async fn run(args: RunArgs) -> Result<()> {
    let config = build_config(&args)?;
    let fault = args.fault.as_deref().map(parse_fault).transpose()?;

    let mut sim = build_simulator(&config, &args.simulator, fault)?;
    let sequencer = Sequencer::new(config).context("Invalid configuration")?;

    println!(
        "🧪 Verifying {}x{} * {}x{} ({}-bit) on '{}'",
        sequencer.config().a_rows,
        sequencer.config().a_columns_b_rows,
        sequencer.config().a_columns_b_rows,
        sequencer.config().b_columns,
        sequencer.config().data_width,
        args.simulator
    );

    let report = sequencer
        .run_random(&mut sim)
        .await
        .context("Scenario aborted")?;

    println!("   Representation: {}", report.representation);
    if let Some(seed) = report.seed {
        println!("   Seed: {}", seed);
    }
    println!(
        "   Cycles: {} ({}..{})",
        report.end_cycle - report.start_cycle,
        report.start_cycle,
        report.end_cycle
    );
    println!("   Scoreboard: {}", report.scoreboard.summary());

    report.into_result()?;
    println!("✅ All {} results matched", sequencer.config().num_samples);
    Ok(())
}

fn check_config(path: &Path, simulator: &str) -> Result<()> {
    let config = TbConfig::load(path)
        .with_context(|| format!("Failed to load config '{}'", path.display()))?;
    let sim = build_simulator(&config, simulator, None)?;
    let signals = config.signal_map();

    println!("✅ Configuration '{}' is valid", path.display());
    println!("   A: {} on '{}'", config.a_shape(), signals.a);
    println!("   B: {} on '{}'", config.b_shape(), signals.b);
    println!("   C: {} on '{}'", config.c_shape(), signals.c);
    println!(
        "   Valid: '{}' -> '{}' after {} cycle(s)",
        signals.in_valid, signals.out_valid, config.pipeline_latency
    );
    println!(
        "   Multi-Dimensional Array support: {}",
        sim.capabilities().multi_dimensional_arrays
    );
    Ok(())
}

fn build_config(args: &RunArgs) -> Result<TbConfig> {
    let mut config = match &args.config {
        Some(path) => TbConfig::load(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => TbConfig::new(8, 4, 4, 4),
    };

    if let Some(samples) = args.samples {
        config.num_samples = samples;
    }
    if let Some(width) = args.data_width {
        config.data_width = width;
    }
    if let Some(rows) = args.a_rows {
        config.a_rows = rows;
    }
    if let Some(inner) = args.inner {
        config.a_columns_b_rows = inner;
    }
    if let Some(cols) = args.b_columns {
        config.b_columns = cols;
    }
    if let Some(latency) = args.latency {
        config.pipeline_latency = latency;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if let Some(naming) = &args.naming {
        config.naming = match naming.as_str() {
            "prefixed" => SignalNaming::Prefixed,
            "suffixed" => SignalNaming::Suffixed,
            other => bail!("Unknown naming '{}', expected prefixed or suffixed", other),
        };
    }
    if args.collect_all {
        config.failure_policy = FailurePolicy::CollectAll;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn build_simulator(
    config: &TbConfig,
    simulator: &str,
    fault: Option<DeviceFault>,
) -> Result<Simulator> {
    let mut dut = MatrixMultiplier::new(config.multiplier_params())
        .context("Failed to build the multiplier model")?;
    if let Some(fault) = fault {
        info!("Injecting device fault: {:?}", fault);
        dut = dut.with_fault(fault);
    }

    let mut sim_config = SimulationConfig::for_simulator(simulator);
    sim_config.clock_period_ps = config.clock_period_ps;
    Simulator::new(sim_config, Box::new(dut)).context("Failed to start the simulator")
}

fn parse_fault(spec: &str) -> Result<DeviceFault> {
    let parts: Vec<&str> = spec.split(':').collect();
    let number = |s: &str| -> Result<usize> {
        s.parse()
            .with_context(|| format!("Invalid number '{}' in fault '{}'", s, spec))
    };

    match parts.as_slice() {
        ["narrow"] => Ok(DeviceFault::NarrowAccumulator),
        ["drop-valid", n] => Ok(DeviceFault::DropValid { result: number(n)? }),
        ["corrupt", n, row, col] => Ok(DeviceFault::CorruptElement {
            result: number(n)?,
            row: number(row)?,
            col: number(col)?,
        }),
        _ => bail!(
            "Unknown fault '{}', expected narrow, drop-valid:<n> or corrupt:<n>:<row>:<col>",
            spec
        ),
    }
}
