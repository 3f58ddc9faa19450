//! Two-channel signal classifier CLI

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use crossbeam_channel::unbounded;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use sigclass::config::OutputFormat;
use sigclass::input::spawn_stdin_reader;
use sigclass::{
    alert_sink, run_configured, run_session, BlockSource, CaptureSource, Config, KeyMap,
    ModelStore, Monitor, OutputWriter, SessionLimits, WavBlockWriter, WavSource,
};

/// Two-channel signal classifier
#[derive(Parser)]
#[command(name = "sigclass")]
#[command(about = "Classify objects from a two-channel signal level", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

/// Options shared by every command that runs the classifier
#[derive(Args)]
struct MonitorArgs {
    /// Model store JSON file
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Output file path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format (overrides the configuration)
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Alert threshold on the raw block level (volts)
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Disable the alert sound (alerts are still logged)
    #[arg(long)]
    no_sound: bool,

    /// Disable console output
    #[arg(long)]
    no_console: bool,

    /// Stop after this many blocks
    #[arg(long)]
    max_blocks: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a live two-channel input
    Run {
        /// Input device name (uses default if not specified)
        #[arg(short = 'D', long)]
        device: Option<String>,

        #[command(flatten)]
        monitor: MonitorArgs,
    },

    /// Classify a recorded two-channel WAV file
    Replay {
        /// Input WAV file path
        input: PathBuf,

        /// Pace blocks at their real duration
        #[arg(long)]
        realtime: bool,

        #[command(flatten)]
        monitor: MonitorArgs,
    },

    /// Record acquired blocks to a two-channel WAV file
    Record {
        /// Output WAV file path
        #[arg(short, long, default_value = "recording.wav")]
        output: PathBuf,

        /// Recording duration in seconds
        #[arg(short, long, default_value = "10")]
        duration: u32,

        /// Input device name
        #[arg(short = 'D', long)]
        device: Option<String>,
    },

    /// List available input devices
    Devices,

    /// Print the stored object models
    Models {
        /// Model store JSON file
        #[arg(short, long)]
        store: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging - quiet by default, use -v for more
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    };

    // stdout carries the status line
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let mut config = if let Some(ref config_path) = cli.config {
        Config::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        Config::default()
    };

    match cli.command {
        Commands::Run { device, monitor } => {
            if let Some(device) = device {
                config.acquisition.device = Some(device);
            }
            let limits = apply_monitor_args(&mut config, monitor);
            let source = CaptureSource::new(config.acquisition.device.clone());
            run_monitor(config, source, false, limits)
        }
        Commands::Replay {
            input,
            realtime,
            monitor,
        } => {
            let limits = apply_monitor_args(&mut config, monitor);
            let source = WavSource::open(&input)
                .with_context(|| format!("Failed to open {}", input.display()))?;
            run_monitor(config, source, realtime, limits)
        }
        Commands::Record {
            output,
            duration,
            device,
        } => {
            if let Some(device) = device {
                config.acquisition.device = Some(device);
            }
            record_blocks(config, output, duration)
        }
        Commands::Devices => list_devices(),
        Commands::Models { store } => {
            if let Some(store) = store {
                config.store.path = store;
            }
            print_models(&config)
        }
    }
}

/// Apply CLI overrides to the configuration
fn apply_monitor_args(config: &mut Config, args: MonitorArgs) -> SessionLimits {
    if let Some(store) = args.store {
        config.store.path = store;
    }
    if let Some(output) = args.output {
        config.output.output_path = Some(output);
    }
    if let Some(threshold) = args.threshold {
        config.alert.threshold = threshold;
    }
    if let Some(format) = args.format {
        config.output.format = format;
    }
    if args.no_console {
        config.output.enable_console = false;
    }
    if args.no_sound {
        config.alert.enable_sound = false;
    }

    SessionLimits {
        max_blocks: args.max_blocks,
    }
}

fn load_store(config: &Config) -> ModelStore {
    let mut store = ModelStore::from_objects(&config.objects, config.calibration.std_floor);
    let restored = store.load_file(&config.store.path);
    info!(
        "Restored {}/{} models from {}",
        restored,
        store.len(),
        config.store.path.display()
    );
    store
}

/// Run the classifier on `source` until it ends or Ctrl+C
fn run_monitor<S: BlockSource>(
    config: Config,
    mut source: S,
    realtime: bool,
    limits: SessionLimits,
) -> Result<()> {
    info!("Starting classifier");

    // Setup signal handler for graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    let store = load_store(&config);
    let mut monitor = Monitor::new(&config, store, alert_sink(&config.alert));
    let started = Instant::now();

    // configure errors end up in run_persisted too
    let result = run_configured(
        &mut source,
        &mut monitor,
        &config.acquisition,
        &config.store.path,
        |source, monitor, timing| {
            let pace = realtime.then(|| Duration::from_secs_f64(timing.block_duration()));

            let (command_tx, command_rx) = unbounded();
            spawn_stdin_reader(KeyMap::from_store(monitor.store()), command_tx)?;

            let mut output = OutputWriter::new(config.output.clone())?;

            let result = run_session(source, monitor, &command_rx, &running, limits, |snapshot| {
                output.write(snapshot)?;
                if let Some(pace) = pace {
                    std::thread::sleep(pace);
                }
                Ok(())
            });

            if let Err(e) = output.finish() {
                warn!("Failed to flush output: {}", e);
            }
            result
        },
    );

    let stats = result.context("Classifier stopped with an error")?;
    stats.log_summary(started);
    info!("Models saved to {}", config.store.path.display());

    Ok(())
}

/// List available input devices
fn list_devices() -> Result<()> {
    let source = CaptureSource::new(None);
    let devices = source.list_devices()?;

    if devices.is_empty() {
        println!("No input devices found");
    } else {
        println!("Available input devices:");
        for (i, name) in devices.iter().enumerate() {
            println!("  {}. {}", i + 1, name);
        }
    }

    Ok(())
}

/// Print the models as they would be loaded by `run`
fn print_models(config: &Config) -> Result<()> {
    let store = load_store(config);
    println!("Models in {}:", config.store.path.display());
    println!("  {:<12} {:>3} {:>12} {:>12}", "object", "key", "mean", "std");
    for (name, model) in store.iter() {
        println!(
            "  {:<12} {:>3} {:>12.6} {:>12.6}",
            name,
            model.key(),
            model.mean(),
            model.std()
        );
    }
    Ok(())
}

/// Record acquired blocks to a WAV file
fn record_blocks(config: Config, output_path: PathBuf, duration_secs: u32) -> Result<()> {
    info!("Recording to: {}", output_path.display());

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let mut source = CaptureSource::new(config.acquisition.device.clone());
    let timing = source
        .configure(&config.acquisition)
        .context("Failed to configure acquisition")?;

    let target_blocks = (duration_secs as f64 / timing.block_duration()).ceil() as usize;
    let mut writer = create_writer(&output_path, timing.sample_rate())?;

    println!(
        "Recording for {} seconds... Press Ctrl+C to stop early",
        duration_secs
    );

    while running.load(Ordering::SeqCst) && writer.blocks() < target_blocks {
        let Some(block) = source.acquire_block()? else {
            break;
        };
        writer.write_block(&block)?;

        // Progress indicator
        let elapsed = writer.blocks() as f64 * timing.block_duration();
        print!("\rRecording: {:.1}s / {}s", elapsed, duration_secs);
        let _ = std::io::Write::flush(&mut std::io::stdout());
    }
    println!();

    source.stop();
    let blocks = writer.blocks();
    writer.finalize()?;
    info!("Recorded {} blocks to: {}", blocks, output_path.display());

    Ok(())
}

fn create_writer(path: &Path, sample_rate: u32) -> Result<WavBlockWriter> {
    WavBlockWriter::create(path, sample_rate)
        .with_context(|| format!("Failed to create WAV file {}", path.display()))
}
