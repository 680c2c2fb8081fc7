use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::monitor_modules::sampler::Sampler;
use crate::monitor_modules::shutdown::{StopHandle, StopSignal};
use crate::monitor_modules::sink::LogSink;

/// Why the sampling loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// A stop was requested and the "stopped" marker written.
    Stopped,
    /// The metrics query failed; nothing further is written.
    SamplerFailed,
}

pub async fn run_sampling_loop<S: Sampler>(
    mut sampler: S,
    sink: LogSink,
    mut stop_signal: StopSignal,
    stop_handle: StopHandle,
    tick_interval: Duration,
) -> LoopExit {
    let mode = sampler.mode();
    let mut ticker = tokio::time::interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    sink.started();
    info!(
        mode = %mode,
        path = ?sink.path(),
        interval_ms = tick_interval.as_millis() as u64,
        "Sampling loop started."
    );

    loop {
        tokio::select! {
            biased;

            _ = stop_signal.stop_requested() => {
                info!(mode = %mode, "Stop received, terminating sampling loop.");
                break;
            }

            _ = ticker.tick() => {
                if stop_signal.is_stop_requested() {
                    break;
                }

                let record = match sampler.sample() {
                    Ok(record) => record,
                    Err(e) => {
                        error!(mode = %mode, error = %e, "Metrics query failed, sampling loop ends.");
                        sink.error(&e);
                        return LoopExit::SamplerFailed;
                    }
                };

                if let Err(e) = sink.record(&record) {
                    error!(mode = %mode, error = %e, "Dropping sample.");
                    sink.error(&e);
                    continue;
                }
                debug!(mode = %mode, timestamp = %record.timestamp, "Sample written.");
            }
        }
    }

    sink.stopped();
    stop_handle.mark_stopped();
    info!(mode = %mode, "Sampling loop gracefully shut down.");
    LoopExit::Stopped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;
    use crate::monitor_modules::config::MonitorMode;
    use crate::monitor_modules::record::SampleRecord;
    use crate::monitor_modules::sampler::SystemSampler;
    use crate::monitor_modules::shutdown::{stop_channel, LifecycleState, StopTrigger};
    use chrono::DateTime;
    use std::fs;
    use std::path::Path;

    struct FailingSampler {
        remaining_ok: usize,
    }

    impl Sampler for FailingSampler {
        fn mode(&self) -> MonitorMode {
            MonitorMode::Cpu
        }

        fn sample(&mut self) -> Result<SampleRecord, MonitorError> {
            if self.remaining_ok == 0 {
                return Err(MonitorError::MetricsUnavailable("CPU".to_string()));
            }
            self.remaining_ok -= 1;
            Ok(SampleRecord::cpu(50.0))
        }
    }

    fn sample_timestamps(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .filter_map(|line| line.strip_prefix("timestamp: "))
            .map(|ts| ts.trim_matches('\'').trim_matches('"').to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_memory_run_then_stop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory_logs.yaml");
        let sink = LogSink::open(&path, MonitorMode::Memory).unwrap();
        let (handle, signal) = stop_channel();

        let task = tokio::spawn(run_sampling_loop(
            SystemSampler::new(MonitorMode::Memory),
            sink,
            signal,
            handle.clone(),
            Duration::from_millis(100),
        ));

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(handle.request_stop(StopTrigger::Enter));
        assert!(handle.wait_stopped(Duration::from_millis(100)).await);
        assert_eq!(task.await.unwrap(), LoopExit::Stopped);

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("Memory monitor started").count(), 1);
        assert_eq!(content.matches("Memory monitor stopped").count(), 1);
        let samples = content.matches("INFO Memory sample").count();
        assert!((3..=4).contains(&samples), "got {samples} samples");

        let timestamps: Vec<_> = sample_timestamps(&path)
            .iter()
            .map(|ts| DateTime::parse_from_rfc3339(ts).unwrap())
            .collect();
        assert_eq!(timestamps.len(), samples);
        assert!(timestamps.windows(2).all(|w| w[0] < w[1]));
        assert!(content
            .lines()
            .filter_map(|line| line.strip_prefix("memoryUsed: "))
            .all(|v| v.parse::<f64>().unwrap() >= 0.0));
    }

    #[tokio::test]
    async fn test_first_record_is_written_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system_logs.yaml");
        let sink = LogSink::open(&path, MonitorMode::Memory).unwrap();
        let (handle, signal) = stop_channel();

        let task = tokio::spawn(run_sampling_loop(
            SystemSampler::new(MonitorMode::Memory),
            sink,
            signal,
            handle.clone(),
            Duration::from_secs(1),
        ));

        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.request_stop(StopTrigger::Interrupt);
        assert_eq!(task.await.unwrap(), LoopExit::Stopped);
        assert_eq!(sample_timestamps(&path).len(), 1);
    }

    #[tokio::test]
    async fn test_stop_before_start_writes_no_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system_logs.yaml");
        let sink = LogSink::open(&path, MonitorMode::Cpu).unwrap();
        let (handle, signal) = stop_channel();
        handle.request_stop(StopTrigger::Enter);

        let exit = run_sampling_loop(
            SystemSampler::new(MonitorMode::Cpu),
            sink,
            signal,
            handle.clone(),
            Duration::from_millis(100),
        )
        .await;

        assert_eq!(exit, LoopExit::Stopped);
        assert_eq!(handle.state(), LifecycleState::Stopped);
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("CPU monitor started"));
        assert!(content.contains("CPU monitor stopped"));
        assert!(!content.contains("INFO CPU sample"));
    }

    #[tokio::test]
    async fn test_sampler_failure_ends_loop_without_stopped_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system_logs.yaml");
        let sink = LogSink::open(&path, MonitorMode::Cpu).unwrap();
        let (handle, signal) = stop_channel();

        let exit = run_sampling_loop(
            FailingSampler { remaining_ok: 2 },
            sink,
            signal,
            handle.clone(),
            Duration::from_millis(10),
        )
        .await;

        assert_eq!(exit, LoopExit::SamplerFailed);
        assert_eq!(handle.state(), LifecycleState::Running);
        // A late trigger after the loop is gone must still be harmless.
        assert!(handle.request_stop(StopTrigger::Terminate));

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("INFO CPU sample").count(), 2);
        assert!(content.contains("ERROR Failed to get CPU information"));
        assert!(!content.contains("CPU monitor stopped"));
    }

    #[tokio::test]
    async fn test_double_trigger_writes_one_stopped_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system_logs.yaml");
        let sink = LogSink::open(&path, MonitorMode::Cpu).unwrap();
        let (handle, signal) = stop_channel();

        let task = tokio::spawn(run_sampling_loop(
            SystemSampler::new(MonitorMode::Cpu),
            sink,
            signal,
            handle.clone(),
            Duration::from_millis(50),
        ));

        tokio::time::sleep(Duration::from_millis(120)).await;
        let enter = handle.clone();
        let interrupt = handle.clone();
        let (a, b) = tokio::join!(
            tokio::spawn(async move { enter.request_stop(StopTrigger::Enter) }),
            tokio::spawn(async move { interrupt.request_stop(StopTrigger::Interrupt) }),
        );
        assert!(a.unwrap() ^ b.unwrap());
        assert_eq!(task.await.unwrap(), LoopExit::Stopped);

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("CPU monitor stopped").count(), 1);
        assert!(content
            .lines()
            .filter_map(|line| line.strip_prefix("cpuUsed: "))
            .map(|v| v.parse::<f64>().unwrap())
            .all(|v| (0.0..=100.0).contains(&v)));
    }
}
