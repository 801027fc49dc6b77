//! Supervised background process: spawn, status, guaranteed stop.
//!
//! Stop sequence:
//! 1. Already exited? Reap and report success.
//! 2. Send the graceful stop signal (SIGTERM on Unix).
//! 3. Bounded wait; on expiry escalate to a force kill and wait again.
//!
//! A force-killed service still counts as cleaned up; only a process that
//! cannot be signaled or reaped is a cleanup failure.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use serde::Serialize;
use tokio::process::Child;
use tokio::time::timeout;

use crate::command::CommandSpec;
use crate::error::{SuperviseError, SuperviseResult};

/// Lifecycle state of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Spawned, readiness not yet confirmed.
    Starting,
    /// Readiness confirmed; the client may run against it.
    Running,
    /// Terminated and reaped by cleanup.
    Stopped,
    /// Cleanup could not stop or reap the process.
    Failed,
}

impl ServiceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

/// How cleanup of the supervised process ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CleanupStatus {
    /// Service exited after the graceful stop signal.
    Graceful,
    /// Service had already exited on its own before cleanup ran.
    AlreadyExited,
    /// Service ignored the stop signal and was force-killed.
    Forced,
    /// Service could not be stopped or reaped.
    Failed { message: String },
}

impl CleanupStatus {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// True unless the service is still unaccounted for.
    pub fn ok(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

enum SignalDelivery {
    Delivered,
    AlreadyGone,
}

/// A launched background process, exclusively owned by one supervised run.
///
/// The stop signal is sent at most once: repeated [`shutdown`] calls
/// re-report the recorded outcome without signaling again.
///
/// [`shutdown`]: ServiceProcess::shutdown
pub struct ServiceProcess {
    child: Child,
    pid: u32,
    command: String,
    status: ServiceStatus,
    cleanup: Option<CleanupStatus>,
}

impl ServiceProcess {
    /// Launch the service in the background.
    ///
    /// Stdin is closed; stdout/stderr are inherited so the service logs to
    /// the terminal. `kill_on_drop` is the backstop for unwinds that skip
    /// the explicit shutdown.
    pub fn spawn(spec: &CommandSpec) -> SuperviseResult<Self> {
        let mut cmd = spec.to_command();
        cmd.stdin(Stdio::null()).kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| SuperviseError::launch(spec.to_string(), e))?;
        let pid = child.id().unwrap_or_default();

        Ok(Self {
            child,
            pid,
            command: spec.to_string(),
            status: ServiceStatus::Starting,
            cleanup: None,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn status(&self) -> ServiceStatus {
        self.status
    }

    /// Record that the readiness condition passed.
    pub fn mark_running(&mut self) {
        if !self.status.is_terminal() {
            self.status = ServiceStatus::Running;
        }
    }

    /// Poll for exit without blocking.
    pub fn try_exit(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Stop and reap the service, bounded by `grace` per stage.
    ///
    /// Idempotent: once performed, later calls return the same outcome.
    pub async fn shutdown(&mut self, grace: Duration) -> CleanupStatus {
        if let Some(done) = self.cleanup.clone() {
            tracing::debug!(pid = self.pid, "Cleanup already performed");
            return done;
        }

        let outcome = self.stop_and_reap(grace).await;
        self.status = if outcome.ok() {
            ServiceStatus::Stopped
        } else {
            ServiceStatus::Failed
        };
        self.cleanup = Some(outcome.clone());
        outcome
    }

    async fn stop_and_reap(&mut self, grace: Duration) -> CleanupStatus {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(pid = self.pid, %status, "Service already exited before cleanup");
                return CleanupStatus::AlreadyExited;
            }
            Ok(None) => {}
            Err(e) => return CleanupStatus::failed(format!("failed to poll service: {e}")),
        }

        tracing::debug!(pid = self.pid, "Sending stop signal to service");
        match self.send_stop_signal() {
            Ok(SignalDelivery::Delivered) => {}
            Ok(SignalDelivery::AlreadyGone) => {
                let _ = self.child.wait().await;
                tracing::debug!(pid = self.pid, "Service gone before stop signal");
                return CleanupStatus::AlreadyExited;
            }
            Err(message) => {
                return CleanupStatus::failed(format!("stop signal not delivered: {message}"));
            }
        }

        match timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(pid = self.pid, %status, "Service exited after stop signal");
                CleanupStatus::Graceful
            }
            Ok(Err(e)) => CleanupStatus::failed(format!("failed to reap service: {e}")),
            Err(_) => {
                tracing::warn!(
                    pid = self.pid,
                    grace_secs = grace.as_secs_f64(),
                    "Service ignored stop signal, force-killing"
                );
                self.force_kill(grace).await
            }
        }
    }

    async fn force_kill(&mut self, grace: Duration) -> CleanupStatus {
        if let Err(e) = self.child.start_kill() {
            return CleanupStatus::failed(format!("force kill failed: {e}"));
        }
        match timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(pid = self.pid, %status, "Service exited after force kill");
                CleanupStatus::Forced
            }
            Ok(Err(e)) => {
                CleanupStatus::failed(format!("failed to reap service after force kill: {e}"))
            }
            Err(_) => CleanupStatus::failed("service unresponsive after force kill"),
        }
    }

    /// Deliver the graceful stop signal.
    ///
    /// SIGTERM, addressed by pid. ESRCH means the process is already gone,
    /// which cleanup treats as success.
    #[cfg(unix)]
    fn send_stop_signal(&mut self) -> Result<SignalDelivery, String> {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id() else {
            return Ok(SignalDelivery::AlreadyGone);
        };
        match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            Ok(()) => Ok(SignalDelivery::Delivered),
            Err(Errno::ESRCH) => Ok(SignalDelivery::AlreadyGone),
            Err(e) => Err(e.to_string()),
        }
    }

    /// No distinct graceful signal off Unix; the runtime's kill is both
    /// stages.
    #[cfg(not(unix))]
    fn send_stop_signal(&mut self) -> Result<SignalDelivery, String> {
        match self.child.start_kill() {
            Ok(()) => Ok(SignalDelivery::Delivered),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {
                Ok(SignalDelivery::AlreadyGone)
            }
            Err(e) => Err(e.to_string()),
        }
    }
}
