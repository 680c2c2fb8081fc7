use clap::Parser;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::MonitorError;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(1);

/// Which metric the monitor samples. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorMode {
    Cpu,
    Memory,
}

impl MonitorMode {
    /// Label used in the lifecycle markers, e.g. "CPU monitor started".
    pub fn label(&self) -> &'static str {
        match self {
            MonitorMode::Cpu => "CPU",
            MonitorMode::Memory => "Memory",
        }
    }
}

impl fmt::Display for MonitorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorMode::Cpu => f.write_str("cpu"),
            MonitorMode::Memory => f.write_str("memory"),
        }
    }
}

impl FromStr for MonitorMode {
    type Err = MonitorError;

    /// Case-sensitive; any trailing `\n`, `\r\n` or other whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "cpu" => Ok(MonitorMode::Cpu),
            "memory" => Ok(MonitorMode::Memory),
            other => Err(MonitorError::InvalidMode(other.to_string())),
        }
    }
}

/// The two shipped tools. They share everything except the prompt and the
/// output file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Asks for `cpu` or `memory` on stdin.
    Combined,
    /// Always samples memory, no prompt.
    MemoryOnly,
}

impl Variant {
    pub fn default_log_file(&self) -> &'static str {
        match self {
            Variant::Combined => "system_logs.yaml",
            Variant::MemoryOnly => "memory_logs.yaml",
        }
    }

    /// The mode fixed by the variant, if any.
    pub fn fixed_mode(&self) -> Option<MonitorMode> {
        match self {
            Variant::Combined => None,
            Variant::MemoryOnly => Some(MonitorMode::Memory),
        }
    }
}

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct MonitorArgs {
    /// Monitor to run ("cpu" or "memory"). Skips the interactive prompt.
    #[arg(long)]
    pub mode: Option<String>,

    /// Path to an optional TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the output file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Override the sampling interval, in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,
}

/// On-disk configuration. Every field is optional; missing values fall back
/// to the variant defaults.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorFileConfig {
    pub log_file: Option<PathBuf>,
    pub tick_interval_ms: Option<u64>,
    pub grace_period_ms: Option<u64>,
    pub diagnostics_dir: Option<PathBuf>,
}

pub fn load_file_config(config_path: &Path) -> Result<MonitorFileConfig, MonitorError> {
    let config_str = fs::read_to_string(config_path).map_err(|e| {
        MonitorError::Config(format!("cannot read {}: {e}", config_path.display()))
    })?;

    toml::from_str(&config_str).map_err(|e| {
        MonitorError::Config(format!("cannot parse {}: {e}", config_path.display()))
    })
}

/// Fully resolved settings. The mode is resolved separately because the
/// combined tool may still have to ask for it.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub log_file: PathBuf,
    pub tick_interval: Duration,
    pub grace_period: Duration,
    pub diagnostics_dir: Option<PathBuf>,
}

impl MonitorSettings {
    pub fn defaults(variant: Variant) -> Self {
        Self {
            log_file: PathBuf::from(variant.default_log_file()),
            tick_interval: DEFAULT_TICK_INTERVAL,
            grace_period: DEFAULT_GRACE_PERIOD,
            diagnostics_dir: None,
        }
    }

    /// Layers defaults, then the file config, then command line overrides.
    pub fn resolve(
        variant: Variant,
        file_config: Option<MonitorFileConfig>,
        args: &MonitorArgs,
    ) -> Result<Self, MonitorError> {
        let mut settings = Self::defaults(variant);

        if let Some(file_config) = file_config {
            if let Some(path) = file_config.log_file {
                settings.log_file = path;
            }
            if let Some(ms) = file_config.tick_interval_ms {
                settings.tick_interval = millis("tick_interval_ms", ms)?;
            }
            if let Some(ms) = file_config.grace_period_ms {
                settings.grace_period = millis("grace_period_ms", ms)?;
            }
            settings.diagnostics_dir = file_config.diagnostics_dir;
        }

        if let Some(path) = &args.log_file {
            settings.log_file = path.clone();
        }
        if let Some(ms) = args.interval_ms {
            settings.tick_interval = millis("--interval-ms", ms)?;
        }

        Ok(settings)
    }
}

fn millis(name: &str, ms: u64) -> Result<Duration, MonitorError> {
    if ms == 0 {
        return Err(MonitorError::Config(format!("{name} must be greater than 0")));
    }
    Ok(Duration::from_millis(ms))
}
