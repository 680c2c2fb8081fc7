use chrono::{Local, SecondsFormat};
use serde::Serialize;

use crate::error::MonitorError;

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// One sample as it is written to the log file. Exactly one of the numeric
/// fields is populated; the other stays at 0.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub timestamp: String,
    #[serde(rename = "memoryUsed")]
    pub memory_used_gb: f64,
    #[serde(rename = "cpuUsed")]
    pub cpu_used_percent: f64,
}

impl SampleRecord {
    pub fn memory(used_bytes: u64) -> Self {
        Self {
            timestamp: now_rfc3339(),
            memory_used_gb: used_bytes as f64 / BYTES_PER_GIB,
            cpu_used_percent: 0.0,
        }
    }

    pub fn cpu(used_percent: f64) -> Self {
        Self {
            timestamp: now_rfc3339(),
            memory_used_gb: 0.0,
            cpu_used_percent: used_percent,
        }
    }

    /// Block-style YAML, one key per line.
    pub fn to_yaml(&self) -> Result<String, MonitorError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

fn now_rfc3339() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Millis, false)
}
