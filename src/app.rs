//! Process startup and shutdown shared by both binaries.
use clap::Parser;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::MonitorError;
use crate::monitor_modules::config::{
    load_file_config, MonitorArgs, MonitorMode, MonitorSettings, Variant,
};
use crate::monitor_modules::sampler::SystemSampler;
use crate::monitor_modules::sampling_loop::{run_sampling_loop, LoopExit};
use crate::monitor_modules::shutdown::{spawn_line_listener, spawn_signal_listener, stop_channel};
use crate::monitor_modules::sink::LogSink;

/// Diagnostic logging. Samples are not written here, they go through
/// [`LogSink`].
pub fn init_logging(diagnostics_dir: Option<&Path>) {
    // Optional file: JSON format, daily rotation
    let file_layer = diagnostics_dir.map(|dir| {
        fmt::layer()
            .with_writer(rolling::daily(dir, "monitor.log"))
            .with_ansi(false)
            .json()
    });

    // stdout carries the prompts, so the console log goes to stderr.
    let stderr_layer = fmt::layer().with_writer(io::stderr);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
}

/// Reads the monitor choice from the first line of `reader`.
pub fn read_mode<R: BufRead>(reader: &mut R) -> Result<MonitorMode, MonitorError> {
    let mut line = String::new();
    let read = reader.read_line(&mut line).map_err(MonitorError::Input)?;
    if read == 0 {
        return Err(MonitorError::Input(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "no monitor choice given",
        )));
    }
    line.parse()
}

fn resolve_mode(variant: Variant, args: &MonitorArgs) -> Result<MonitorMode, MonitorError> {
    match (variant.fixed_mode(), &args.mode) {
        (Some(_), Some(_)) => Err(MonitorError::Config(
            "--mode is not supported by this monitor".to_string(),
        )),
        (Some(mode), None) => Ok(mode),
        (None, Some(choice)) => choice.parse(),
        (None, None) => {
            println!("Which monitor do you want to run? Enter 'cpu' or 'memory':");
            io::stdout().flush().map_err(MonitorError::Input)?;
            read_mode(&mut io::stdin().lock())
        }
    }
}

/// Runs one monitor until Enter, SIGINT or SIGTERM. Returns once the grace
/// period after the stop request is over.
///
/// The stdin reader keeps a blocking thread alive, so callers should end the
/// process with [`std::process::exit`] instead of waiting for runtime shutdown.
pub async fn run(variant: Variant) -> Result<(), MonitorError> {
    let args = MonitorArgs::parse();

    let file_config = args.config.as_deref().map(load_file_config).transpose()?;
    let settings = MonitorSettings::resolve(variant, file_config, &args)?;
    init_logging(settings.diagnostics_dir.as_deref());
    info!(settings = ?settings, "Resolved monitor settings.");

    let mode = resolve_mode(variant, &args)?;
    let sink = LogSink::open(&settings.log_file, mode)?;
    info!(mode = %mode, path = ?sink.path(), "Opened sample log.");

    let (stop_handle, stop_signal) = stop_channel();
    let mut main_signal = stop_handle.subscribe();
    if let Err(e) = spawn_signal_listener(stop_handle.clone()) {
        error!(error = %e, "Failed to listen for OS signals. Only Enter will stop the monitor.");
    }

    // CPU mode waits out the minimum refresh window while priming.
    let sampler = tokio::task::spawn_blocking(move || SystemSampler::new(mode))
        .await
        .map_err(|e| {
            error!(mode = %mode, error = %e, "Sampler setup task panicked.");
            MonitorError::MetricsUnavailable(mode.label().to_string())
        })?;

    let loop_handle = stop_handle.clone();
    let tick_interval = settings.tick_interval;
    let sampling_task = tokio::spawn(async move {
        let exit = run_sampling_loop(
            sampler,
            sink,
            stop_signal,
            loop_handle,
            tick_interval,
        )
        .await;
        if exit == LoopExit::SamplerFailed {
            warn!(mode = %mode, "Sampling stopped after a metrics error. Press Enter to exit.");
        }
        exit
    });

    println!("Press Enter to stop monitoring...");
    spawn_line_listener(BufReader::new(io::stdin()), stop_handle.clone());

    main_signal.stop_requested().await;

    if stop_handle.wait_stopped(settings.grace_period).await {
        info!("Monitor stopped.");
    } else if sampling_task.is_finished() {
        info!("Sampling loop had already ended.");
    } else {
        warn!(
            grace_ms = settings.grace_period.as_millis() as u64,
            "Sampling loop did not stop within the grace period, exiting anyway."
        );
    }
    Ok(())
}
