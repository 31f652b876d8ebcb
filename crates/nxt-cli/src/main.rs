//! `nxt`: query and drive an NXT brick over a serial link.

mod commands;
mod config;
mod error;

use clap::{Parser, Subcommand};
use commands::Output;
use config::CliConfig;
use error::CliError;
use nxt_link::Session;
use nxt_protocol::{MotorPort, SensorPort};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// Talk to a LEGO NXT brick over USB or Bluetooth serial.
#[derive(Parser, Debug)]
#[command(name = "nxt", version, about, long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Serial port (overrides the config file)
    #[arg(id = "serial_port", short = 'p', long = "port", value_name = "PORT", global = true)]
    port: Option<String>,

    /// Baud rate (overrides the config file)
    #[arg(long, global = true)]
    baud: Option<u32>,

    /// Reply timeout in milliseconds (overrides the config file)
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// More logging; repeat for trace output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read the battery voltage
    Battery,
    /// Show firmware version, brick name and free memory
    Info,
    /// Reset the sleep timer and show the sleep timeout
    KeepAlive,
    /// Play a tone
    Tone {
        /// Frequency in Hz (200-14000)
        frequency: u16,
        /// Duration in milliseconds
        duration_ms: u16,
    },
    /// Read a sensor port (1-4)
    Sensor { port: SensorPort },
    /// Read a motor port (A, B, C)
    Motor { port: MotorPort },
    /// Show which buttons are pressed
    Buttons,
    /// List files on the brick
    Ls {
        #[arg(default_value = "*.*")]
        pattern: String,
    },
    /// Read an ultrasonic sensor over the I2C bus
    Sonar {
        port: SensorPort,
        /// Also read the sensor's identity strings
        #[arg(long)]
        identify: bool,
    },
    /// Replay a YAML command sequence
    Run {
        /// Sequence file (defaults to `sequence` in the config file)
        file: Option<PathBuf>,
        /// Stop after this many cycles
        #[arg(long)]
        cycles: Option<u64>,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info,nxt_link=debug",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = CliConfig::load(cli.config.as_deref())?.with_overrides(
        cli.port,
        cli.baud,
        cli.timeout_ms,
    );
    debug!(?config, "configuration");
    nxt_metrics::describe_metrics();

    let out = Output { json: cli.json };
    let mut session = Session::open(config.port()?, config.session.clone())?;

    match cli.command {
        Commands::Battery => commands::battery(&mut session, out),
        Commands::Info => commands::info(&mut session, out),
        Commands::KeepAlive => commands::keep_alive(&mut session, out),
        Commands::Tone {
            frequency,
            duration_ms,
        } => commands::tone(&mut session, out, frequency, duration_ms),
        Commands::Sensor { port } => commands::sensor(&mut session, out, port),
        Commands::Motor { port } => commands::motor(&mut session, out, port),
        Commands::Buttons => commands::buttons(&mut session, out),
        Commands::Ls { pattern } => commands::ls(&mut session, out, &pattern),
        Commands::Sonar { port, identify } => {
            commands::sonar(&mut session, out, &config, port, identify)
        }
        Commands::Run { file, cycles } => {
            let path = file
                .or_else(|| config.sequence.clone())
                .ok_or(CliError::NoSequence)?;
            commands::run(&mut session, out, &path, cycles)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = ?e, "command failed");
            eprintln!("error: {}", e);
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                eprintln!("  caused by: {}", cause);
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
