use std::time::Instant;
use sysinfo::{System, MINIMUM_CPU_UPDATE_INTERVAL};
use tracing::debug;

use crate::error::MonitorError;
use crate::monitor_modules::config::MonitorMode;
use crate::monitor_modules::record::SampleRecord;

/// Produces the next sample on demand. The sampling loop owns one of these.
pub trait Sampler: Send {
    fn mode(&self) -> MonitorMode;
    fn sample(&mut self) -> Result<SampleRecord, MonitorError>;
}

/// Reads CPU or memory utilization through `sysinfo`.
pub struct SystemSampler {
    mode: MonitorMode,
    sys: System,
    last_cpu_refresh: Instant,
}

impl SystemSampler {
    /// In CPU mode this blocks for `MINIMUM_CPU_UPDATE_INTERVAL` after taking
    /// the usage baseline, so call it off the async workers.
    pub fn new(mode: MonitorMode) -> Self {
        let mut sys = System::new();
        match mode {
            MonitorMode::Cpu => {
                sys.refresh_cpu_usage();
                std::thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL);
            }
            MonitorMode::Memory => sys.refresh_memory(),
        }
        Self {
            mode,
            sys,
            last_cpu_refresh: Instant::now(),
        }
    }

    fn sample_cpu(&mut self) -> Result<SampleRecord, MonitorError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(MonitorError::MetricsUnavailable("CPU".to_string()));
        }
        // Two refreshes closer than the minimum interval give a meaningless delta.
        let remaining =
            MINIMUM_CPU_UPDATE_INTERVAL.saturating_sub(self.last_cpu_refresh.elapsed());
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
        self.sys.refresh_cpu_usage();
        self.last_cpu_refresh = Instant::now();
        if self.sys.cpus().is_empty() {
            return Err(MonitorError::MetricsUnavailable("CPU".to_string()));
        }
        let usage = clamp_percent(self.sys.global_cpu_usage());
        debug!(cpu_used_percent = usage, "Sampled CPU usage.");
        Ok(SampleRecord::cpu(usage))
    }

    fn sample_memory(&mut self) -> Result<SampleRecord, MonitorError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(MonitorError::MetricsUnavailable("memory".to_string()));
        }
        self.sys.refresh_memory();
        if self.sys.total_memory() == 0 {
            return Err(MonitorError::MetricsUnavailable("memory".to_string()));
        }
        let used = self.sys.used_memory();
        debug!(used_bytes = used, "Sampled memory usage.");
        Ok(SampleRecord::memory(used))
    }
}

impl Sampler for SystemSampler {
    fn mode(&self) -> MonitorMode {
        self.mode
    }

    fn sample(&mut self) -> Result<SampleRecord, MonitorError> {
        match self.mode {
            MonitorMode::Cpu => self.sample_cpu(),
            MonitorMode::Memory => self.sample_memory(),
        }
    }
}

fn clamp_percent(raw: f32) -> f64 {
    if raw.is_finite() {
        f64::from(raw).clamp(0.0, 100.0)
    } else {
        0.0
    }
}
