//! teensymon
//!
//! Live log monitor for microcontroller boards on a USB serial port.
//!
//! # Features
//!
//! - **Serial Monitor**: Finds the board by USB identifier, follows its log
//!   output across unplug/replug, and colours DEBUG/INFO/WARNING/ERROR tokens
//! - **Backtrace Symbolication**: Fault backtrace lines (`#N 0x...`) get the
//!   function and source location appended, via `addr2line` and the firmware ELF
//! - **Offline Traces**: Resolve a saved crash report from stdin
//! - **DBC Code Generation**: Pre-build step generating C CAN message sources
//!
//! # Usage
//!
//! ```bash
//! # Monitor the default board (Teensy 4.1)
//! teensymon
//!
//! # Monitor with explicit settings
//! teensymon monitor --elf .pio/build/teensy41/firmware.elf --baud 115200
//!
//! # List serial ports and which one would be selected
//! teensymon ports
//!
//! # Symbolicate a saved backtrace
//! teensymon trace < crash.txt
//!
//! # Generate C sources from dbc/*.dbc into .dbc_gen/
//! teensymon generate dbc
//! ```

mod cancel;
mod classify;
mod codegen;
mod config;
mod devices;
mod render;
mod serial;
mod symbols;
mod trace;

#[cfg(all(test, unix))]
mod test_support;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use cancel::CancelToken;
use codegen::DbcGenerator;
use config::{DecodePolicy, MonitorConfig};
use devices::{get_profile, profile_names, BoardProfile, DEFAULT_PROFILE};
use serial::{MonitorError, SerialBackend, SerialMonitor, SystemSerial};
use symbols::Addr2Line;

/// Live serial log monitor with backtrace symbolication
#[derive(Parser)]
#[command(name = "teensymon")]
#[command(version)]
#[command(about = "Live serial log monitor with backtrace symbolication")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Board profile supplying defaults (teensy41, teensy40, stm32)
    #[arg(short, long, global = true, default_value = DEFAULT_PROFILE)]
    device: String,

    /// Configuration file (default: ./teensymon.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor the board's serial output (the default)
    Monitor(MonitorArgs),

    /// List available serial ports
    Ports,

    /// List supported board profiles
    Devices,

    /// Resolve backtrace addresses read from stdin
    Trace(ResolverArgs),

    /// Generate build inputs
    #[command(subcommand)]
    Generate(GenerateCommands),
}

#[derive(Args, Default)]
struct ResolverArgs {
    /// Firmware ELF with debug info
    #[arg(long)]
    elf: Option<PathBuf>,

    /// addr2line executable for the target architecture
    #[arg(long)]
    addr2line: Option<PathBuf>,

    /// Kill addr2line after this many milliseconds (0 waits indefinitely)
    #[arg(long)]
    resolver_timeout_ms: Option<u64>,
}

#[derive(Args, Default)]
struct MonitorArgs {
    #[command(flatten)]
    resolver: ResolverArgs,

    /// Substring of the port's hardware descriptor selecting the device (e.g. 16C0:0483)
    #[arg(long)]
    device_id: Option<String>,

    /// Baud rate (overrides device profile default)
    #[arg(short, long)]
    baud: Option<u32>,

    /// Pause between reconnect attempts in milliseconds
    #[arg(long)]
    backoff_ms: Option<u64>,

    /// What to do with lines that are not ASCII text
    #[arg(long, value_enum)]
    decode: Option<DecodePolicy>,

    /// Prefix lines with the local time
    #[arg(long)]
    timestamps: bool,
}

#[derive(Subcommand)]
enum GenerateCommands {
    /// Generate C encode/decode sources from CAN DBC files with cantools
    Dbc {
        /// Directory containing *.dbc files
        #[arg(short, long, default_value = codegen::DEFAULT_INPUT_DIR)]
        input: PathBuf,

        /// Output directory for generated sources
        #[arg(short, long, default_value = codegen::DEFAULT_OUTPUT_DIR)]
        output: PathBuf,

        /// Python interpreter with cantools installed
        #[arg(long, default_value = "python3")]
        python: PathBuf,
    },
}

impl ResolverArgs {
    fn apply(&self, config: &mut MonitorConfig) {
        if let Some(ref elf) = self.elf {
            config.elf = elf.clone();
        }
        if let Some(ref addr2line) = self.addr2line {
            config.addr2line = addr2line.clone();
        }
        if let Some(ms) = self.resolver_timeout_ms {
            config.resolver_timeout = Some(Duration::from_millis(ms)).filter(|t| !t.is_zero());
        }
    }
}

impl MonitorArgs {
    fn apply(&self, config: &mut MonitorConfig) {
        self.resolver.apply(config);
        if let Some(ref device_id) = self.device_id {
            config.device_id = device_id.clone();
        }
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
        if let Some(ms) = self.backoff_ms {
            config.backoff = Duration::from_millis(ms);
        }
        if let Some(policy) = self.decode {
            config.decode_policy = policy;
        }
        if self.timestamps {
            config.timestamps = true;
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logger
    let filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "[ERROR]".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let profile = get_profile(&cli.device).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown device profile: {}. Use 'teensymon devices' to see available profiles.",
            cli.device
        )
    })?;

    match cli.command.unwrap_or_else(|| Commands::Monitor(MonitorArgs::default())) {
        Commands::Monitor(args) => {
            let mut config = load_config(profile, cli.config)?;
            args.apply(&mut config);
            handle_monitor(config)
        }
        Commands::Ports => {
            let config = load_config(profile, cli.config)?;
            let ports = SystemSerial.available_ports()?;
            serial::port::print_ports(&ports, &config.device_id);
            Ok(())
        }
        Commands::Devices => {
            handle_devices();
            Ok(())
        }
        Commands::Trace(args) => {
            let mut config = load_config(profile, cli.config)?;
            args.apply(&mut config);
            handle_trace(&config)
        }
        Commands::Generate(GenerateCommands::Dbc {
            input,
            output,
            python,
        }) => handle_generate_dbc(DbcGenerator::new(python, input, output)),
    }
}

fn load_config(profile: &BoardProfile, path: Option<PathBuf>) -> Result<MonitorConfig> {
    let config = MonitorConfig::load(profile, path.as_deref()).context("Failed to load configuration")?;
    log::debug!("configuration: {:?}", config);
    Ok(config)
}

fn resolver(config: &MonitorConfig) -> Addr2Line {
    let resolver = Addr2Line::new(&config.addr2line, &config.elf).with_timeout(config.resolver_timeout);
    if !resolver.binary().is_file() {
        log::warn!(
            "firmware ELF {} not found; backtraces will not be symbolicated",
            resolver.binary().display()
        );
    }
    resolver
}

fn handle_monitor(config: MonitorConfig) -> Result<()> {
    config.validate()?;

    let resolver = resolver(&config);
    let cancel = CancelToken::on_ctrl_c()?;
    let device_id = config.device_id.clone();

    let stdout = io::stdout();
    let mut monitor = SerialMonitor::new(config, SystemSerial, resolver, stdout.lock(), cancel);
    let result = monitor.run();
    drop(monitor);

    match result {
        Ok(stats) => {
            stats.print_summary();
            Ok(())
        }
        Err(MonitorError::DeviceNotFound { .. }) => {
            eprintln!(
                "{} Cannot find a serial device matching '{}'",
                "[ERROR]".red().bold(),
                device_id
            );
            eprintln!("Use {} to see attached ports", "teensymon ports".cyan());
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

fn handle_trace(config: &MonitorConfig) -> Result<()> {
    let resolver = resolver(config);
    let stdin = io::stdin();
    let stdout = io::stdout();
    let resolved = trace::resolve_trace(stdin.lock(), stdout.lock(), &resolver, &CancelToken::new())?;
    log::info!("resolved {} address(es)", resolved);
    Ok(())
}

fn handle_devices() {
    println!("{}", "=".repeat(60));
    println!("{}", "Supported Board Profiles".cyan().bold());
    println!("{}", "=".repeat(60));

    for name in profile_names() {
        if let Some(profile) = get_profile(name) {
            println!("\n  {}: {}", profile.id.white().bold(), profile.name);
            println!("    {}", profile.description);
            println!("    Device id: {}", profile.device_id);
            println!("    Default baud: {}", profile.baud_rate);
            println!("    Firmware: {}", profile.elf);
        }
    }

    println!("\n{}", "=".repeat(60));
}

fn handle_generate_dbc(generator: DbcGenerator) -> Result<()> {
    println!("{} Building DBC source files...", "[*]".cyan().bold());
    generator.check_cantools()?;

    let report = generator.generate()?;
    report.print_report(generator.output_dir());
    if !report.is_success() {
        anyhow::bail!("{} DBC file(s) failed to generate", report.failed.len());
    }
    Ok(())
}
