use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Invalid monitor choice: {0:?}. Expected 'cpu' or 'memory'")]
    InvalidMode(String),
    #[error("Failed to read user input: {0}")]
    Input(#[source] io::Error),
    #[error("Failed to open log file {path:?}: {source}")]
    SinkOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to convert log entry to YAML: {0}")]
    Serialize(#[from] serde_yaml::Error),
    #[error("Failed to get {0} information")]
    MetricsUnavailable(String),
    #[error("Configuration error: {0}")]
    Config(String),
}
