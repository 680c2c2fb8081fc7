//! Append-only sample log.
//!
//! The sink carries its own `tracing` dispatcher writing to the log file, so
//! sample entries never pass through the process-wide diagnostic subscriber
//! and the diagnostic output never lands in the sample file.
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::level_filters::LevelFilter;
use tracing::{dispatcher, error, info, Dispatch};

use crate::error::MonitorError;
use crate::monitor_modules::config::MonitorMode;
use crate::monitor_modules::record::SampleRecord;

pub struct LogSink {
    mode: MonitorMode,
    path: PathBuf,
    dispatch: Dispatch,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl LogSink {
    /// Opens `path` for appending, creating it if needed. Existing content is
    /// never truncated.
    pub fn open(path: impl AsRef<Path>, mode: MonitorMode) -> Result<Self, MonitorError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| MonitorError::SinkOpen {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            mode,
            path,
            dispatch: file_dispatch(file),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the "started" marker. Only the first call writes anything.
    pub fn started(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let label = self.mode.label();
        dispatcher::with_default(&self.dispatch, || info!("{label} monitor started"));
    }

    /// Appends one sample entry, preceded by the "started" marker if this is
    /// the first write.
    pub fn record(&self, record: &SampleRecord) -> Result<(), MonitorError> {
        let yaml = record.to_yaml()?;
        self.started();
        let label = self.mode.label();
        dispatcher::with_default(&self.dispatch, || {
            info!("{label} sample\n{}", yaml.trim_end())
        });
        Ok(())
    }

    pub fn error(&self, err: &MonitorError) {
        dispatcher::with_default(&self.dispatch, || error!("{err}"));
    }

    /// Writes the "stopped" marker. Later calls are no-ops.
    pub fn stopped(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let label = self.mode.label();
        dispatcher::with_default(&self.dispatch, || info!("{label} monitor stopped"));
    }
}

fn file_dispatch(file: File) -> Dispatch {
    let subscriber = tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .with_max_level(LevelFilter::INFO)
        .finish();
    Dispatch::new(subscriber)
}
