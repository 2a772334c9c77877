//! Stagehand - run a command and capture its output
//!
//! # Overview
//!
//! The binary wires the library together the way a host application would:
//! - Configuration from `Stagehand.yaml` + `STAGEHAND_*` env vars ([`ConfigManager`])
//! - Logging infrastructure (file rotation + optional console output)
//! - An [`AffinityThread`] standing in for a UI thread
//! - [`StreamCapture`] draining the command's stdout/stderr
//!
//! # Execution Flow
//!
//! 1. Load configuration, apply command-line overrides
//! 2. Initialize logging → logs/stagehand.<date>
//! 3. Spawn the affinity thread
//! 4. `run_thriftily`: capture the command off the affinity thread, render the
//!    report on it, print the report off it again
//! 5. Exit with the command's exit status

use anyhow::{Context, Result, anyhow};
use camino::Utf8PathBuf;
use clap::Parser;
use stagehand::{
    APP_NAME, AffinityDispatcher, AffinityThread, CaptureMode, ChannelCapture, Charset,
    ConfigManager, DispatchError, Metrics, StreamCapture, VERSION,
};
use std::io::Write;
use std::process::Command;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "stagehand")]
#[command(version, about = "Run a command and capture its output", long_about = None)]
struct Args {
    /// Directory holding Stagehand.yaml
    #[arg(long, value_name = "DIR", default_value = "Stagehand Data")]
    config_dir: Utf8PathBuf,

    /// Capture mode: polling or timeout
    #[arg(long)]
    mode: Option<CaptureMode>,

    /// Charset used to decode the output
    #[arg(long)]
    charset: Option<Charset>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Also log to the console
    #[arg(long)]
    console: bool,

    /// Command to run, followed by its arguments
    #[arg(last = true, required = true, value_name = "COMMAND")]
    command: Vec<String>,
}

/// Captured text as rendered on the affinity thread.
struct Report {
    output: String,
    error: String,
    exit_status: i32,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let exit_status = run(args)?;

    // Logging guard and affinity thread are gone by now; nothing left to flush
    std::process::exit(exit_status);
}

fn run(args: Args) -> Result<i32> {
    let config_manager = ConfigManager::new(&args.config_dir)?;
    let mut config = config_manager.load_config()?;

    if let Some(mode) = args.mode {
        config.capture.mode = mode;
    }
    if let Some(charset) = args.charset {
        config.capture.charset = charset;
    }
    config.logging.debug |= args.debug;
    config.logging.console |= args.console;

    let _guard = stagehand::logging::setup_logging(&config.logging)?;
    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let metrics = Arc::new(Metrics::new());
    let affinity = Arc::new(
        AffinityThread::spawn(config.dispatch.affinity_thread_name.clone())
            .context("Failed to spawn the affinity thread")?,
    );
    let dispatcher = AffinityDispatcher::with_settings(affinity.clone(), &config.dispatch)
        .with_metrics(metrics.clone());
    let capture = StreamCapture::new(config.capture.clone()).with_metrics(metrics.clone());
    let charset = config.capture.charset;

    let (program, program_args) = args
        .command
        .split_first()
        .context("No command given")?;
    let mut command = Command::new(program);
    command.args(program_args);

    tracing::info!(
        "Capturing {} in {:?} mode ({})",
        program,
        config.capture.mode,
        charset
    );

    let mut exit_status = ChannelCapture::UNKNOWN_EXIT_STATUS;
    let outcome = dispatcher.run_thriftily(
        || -> Result<ChannelCapture> {
            capture
                .capture_command(&mut command, charset)
                .with_context(|| format!("Failed to capture {}", program))
        },
        |captured: ChannelCapture| -> Result<Report> { Ok(render_report(captured)) },
        |report: Report| -> Result<()> {
            print_report(&report)?;
            exit_status = report.exit_status;
            Ok(())
        },
    );

    metrics.log_summary();
    affinity.shutdown();

    match outcome {
        Ok(()) => {
            tracing::info!("{} exited with status {}", program, exit_status);
            Ok(exit_status)
        }
        Err(DispatchError::Task(error)) => Err(error),
        Err(fatal) => Err(anyhow!(fatal.to_string())),
    }
}

fn render_report(captured: ChannelCapture) -> Report {
    tracing::debug!(
        "Rendering report on {:?}",
        std::thread::current().name().unwrap_or("unnamed")
    );

    let (output, error, exit_status) = captured.into_parts();
    Report {
        output,
        error,
        exit_status,
    }
}

fn print_report(report: &Report) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(report.output.as_bytes())
        .context("Failed to write captured output")?;
    stdout.flush()?;

    let mut stderr = std::io::stderr().lock();
    stderr
        .write_all(report.error.as_bytes())
        .context("Failed to write captured error output")?;
    stderr.flush()?;
    Ok(())
}
