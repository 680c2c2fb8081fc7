use std::fmt;
use std::io::{self, BufRead};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Running,
    StopRequested,
    Stopped,
}

/// Who asked the monitor to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopTrigger {
    Enter,
    Interrupt,
    Terminate,
}

impl fmt::Display for StopTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopTrigger::Enter => f.write_str("enter"),
            StopTrigger::Interrupt => f.write_str("interrupt"),
            StopTrigger::Terminate => f.write_str("terminate"),
        }
    }
}

/// Writer side of the stop token. Cheap to clone; every trigger gets one.
#[derive(Clone)]
pub struct StopHandle {
    tx: watch::Sender<LifecycleState>,
}

/// Reader side, held by the sampling loop.
pub struct StopSignal {
    rx: watch::Receiver<LifecycleState>,
}

pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(LifecycleState::Running);
    (StopHandle { tx }, StopSignal { rx })
}

impl StopHandle {
    /// Moves `Running` to `StopRequested`. Returns `false` if a stop was
    /// already requested. Works with no receivers left.
    pub fn request_stop(&self, trigger: StopTrigger) -> bool {
        let first = self.tx.send_if_modified(|state| {
            if *state == LifecycleState::Running {
                *state = LifecycleState::StopRequested;
                true
            } else {
                false
            }
        });
        if first {
            info!(trigger = %trigger, "Stop requested.");
        } else {
            debug!(trigger = %trigger, "Stop already requested, ignoring trigger.");
        }
        first
    }

    pub fn mark_stopped(&self) {
        self.tx.send_replace(LifecycleState::Stopped);
    }

    #[cfg(test)]
    pub fn state(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> StopSignal {
        StopSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Waits until the sampling loop acknowledged the stop, at most `timeout`.
    /// Returns whether it did.
    pub async fn wait_stopped(&self, timeout: Duration) -> bool {
        let mut rx = self.tx.subscribe();
        let acknowledged = async {
            rx.wait_for(|state| *state == LifecycleState::Stopped)
                .await
                .map(|_| ())
        };
        matches!(tokio::time::timeout(timeout, acknowledged).await, Ok(Ok(())))
    }
}

impl StopSignal {
    /// Non-blocking check.
    pub fn is_stop_requested(&self) -> bool {
        *self.rx.borrow() != LifecycleState::Running
    }

    /// Resolves once a stop was requested. If every handle is gone the stop
    /// can never come, so this then waits forever.
    pub async fn stop_requested(&mut self) {
        let requested = self
            .rx
            .wait_for(|state| *state != LifecycleState::Running)
            .await
            .map(|_| ());
        if requested.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Converts SIGINT/SIGTERM (ctrl-c on Windows) into a stop request. The
/// handlers are installed before this returns, so a signal arriving before the
/// task first runs is still turned into a stop.
pub fn spawn_signal_listener(handle: StopHandle) -> io::Result<JoinHandle<()>> {
    let mut signals = OsSignals::register()?;
    Ok(tokio::spawn(async move {
        let trigger = signals.recv().await;
        handle.request_stop(trigger);
    }))
}

#[cfg(unix)]
struct OsSignals {
    sigint: tokio::signal::unix::Signal,
    sigterm: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl OsSignals {
    fn register() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) -> StopTrigger {
        tokio::select! {
            _ = self.sigint.recv() => StopTrigger::Interrupt,
            _ = self.sigterm.recv() => StopTrigger::Terminate,
        }
    }
}

#[cfg(windows)]
struct OsSignals {
    ctrl_c: tokio::signal::windows::CtrlC,
}

#[cfg(windows)]
impl OsSignals {
    fn register() -> io::Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
        })
    }

    async fn recv(&mut self) -> StopTrigger {
        self.ctrl_c.recv().await;
        StopTrigger::Interrupt
    }
}

/// Reads one line on a blocking thread and requests a stop. End of input
/// counts as a stop as well, otherwise a closed stdin would leave no way to
/// stop other than a signal.
pub fn spawn_line_listener<R>(mut reader: R, handle: StopHandle) -> JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => warn!("Input closed, stopping monitor."),
            Ok(_) => debug!("Enter pressed."),
            Err(e) => error!(error = %e, "Failed to read user input, stopping monitor."),
        }
        handle.request_stop(StopTrigger::Enter);
    })
}
