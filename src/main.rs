/*!
 * Wakegate CLI - Command Line Interface
 *
 * Simulates proximity-gated wakes against a scripted sensor and manages the
 * configuration file.
 */

use anyhow::Context;
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use wakegate::{
    config::{GuardConfig, LogLevel},
    error::{WakeGateError, EXIT_FATAL, EXIT_SUCCESS},
    logging,
    sim::{self, Scenario, ScriptedSample},
};

#[derive(Parser)]
#[command(name = "wakegate")]
#[command(version, about = "Proximity-gated wake arbitration", long_about = None)]
struct Cli {
    /// Path to config file (overrides the per-user default)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Path to log file (default: stderr)
    #[arg(long, value_name = "FILE", global = true)]
    log: Option<PathBuf>,

    /// Enable verbose logging (equivalent to --log-level=debug)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run wake requests through the gate against a simulated sensor
    Simulate(SimulateArgs),

    /// Write the default configuration file
    InitConfig {
        /// Destination (default: per-user config directory)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    ShowConfig,

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Distance the sensor reports, in cm
    #[arg(long, default_value = "4.0")]
    distance: f32,

    /// Maximum range of the sensor, in cm
    #[arg(long, default_value = "5.0")]
    max_range: f32,

    /// Delay between listener registration and the reading
    #[arg(long, default_value = "100")]
    sample_after_ms: u64,

    /// The sensor never reports
    #[arg(long, conflicts_with_all = ["distance", "sample_after_ms"])]
    no_sample: bool,

    /// Simulate a device without a proximity sensor
    #[arg(long)]
    unavailable: bool,

    /// The sensor refuses listener registration
    #[arg(long)]
    registration_fails: bool,

    /// Number of wake requests
    #[arg(long, default_value = "1")]
    requests: u32,

    /// Pause between requests
    #[arg(long, default_value = "0")]
    request_gap_ms: u64,

    /// Run with the feature switched off
    #[arg(long)]
    disabled: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl SimulateArgs {
    fn scenario(&self) -> Scenario {
        Scenario {
            sample: (!self.no_sample).then_some(ScriptedSample {
                after_ms: self.sample_after_ms,
                distance: self.distance,
                max_range: self.max_range,
            }),
            sensor_available: !self.unavailable,
            registration_fails: self.registration_fails,
            requests: self.requests,
            request_gap_ms: self.request_gap_ms,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            e.downcast_ref::<WakeGateError>()
                .map_or(EXIT_FATAL, WakeGateError::exit_code)
        }
    };
    std::process::exit(code);
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = GuardConfig::load_or_default(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.log_level = level.into();
    }
    if cli.log.is_some() {
        config.log_file = cli.log.clone();
    }
    config.verbose |= cli.verbose;

    match cli.command {
        Commands::Simulate(args) => {
            if let Err(e) = logging::init_logging(&config) {
                eprintln!("Warning: Failed to initialize logging: {}", e);
            }
            if args.disabled {
                config.enabled = false;
            }
            handle_simulate(&config, &args)
        }
        Commands::InitConfig { path, force } => handle_init_config(path, force),
        Commands::ShowConfig => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "wakegate", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn handle_simulate(config: &GuardConfig, args: &SimulateArgs) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let report = runtime.block_on(sim::run_scenario(config, &args.scenario()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.summary());
    }
    Ok(())
}

fn handle_init_config(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = match path {
        Some(path) => path,
        None => GuardConfig::default_path().ok_or_else(|| {
            WakeGateError::Config("no per-user config directory on this platform".to_string())
        })?,
    };

    if path.exists() && !force {
        return Err(WakeGateError::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        ))
        .into());
    }

    GuardConfig::default().to_file(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
