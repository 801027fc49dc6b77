//! Foreground client task.
//!
//! The client runs to completion while the service is up. Its failures are
//! folded into [`TaskOutcome`] instead of raised, so the supervisor's
//! cleanup step always runs next.

use std::process::ExitStatus;

use serde::Serialize;

use crate::command::CommandSpec;

/// How the client invocation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskStatus {
    /// Exited with a status code.
    Exited { code: i32 },
    /// Killed by a signal (Unix).
    Signaled { signal: i32 },
    /// Could not be launched or its exit could not be decoded.
    Faulted { message: String },
}

impl TaskStatus {
    pub fn success(&self) -> bool {
        matches!(self, Self::Exited { code: 0 })
    }

    fn from_exit(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::Exited { code };
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Signaled { signal };
            }
        }
        Self::Faulted {
            message: format!("unrecognized exit status: {status}"),
        }
    }
}

/// Result of a client run: status plus optionally captured output.
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    #[serde(flatten)]
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl TaskOutcome {
    fn plain(status: TaskStatus) -> Self {
        Self {
            status,
            stdout: None,
            stderr: None,
        }
    }

    fn faulted(message: impl Into<String>) -> Self {
        Self::plain(TaskStatus::Faulted {
            message: message.into(),
        })
    }
}

/// The dependent client invocation.
pub struct ForegroundTask {
    spec: CommandSpec,
    capture: bool,
}

impl ForegroundTask {
    pub fn new(spec: CommandSpec) -> Self {
        Self {
            spec,
            capture: false,
        }
    }

    /// Capture stdout/stderr into the outcome instead of inheriting the
    /// terminal.
    pub fn with_capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    /// Run the client and wait for it to exit. Never fails: launch errors
    /// become [`TaskStatus::Faulted`].
    pub async fn run(&self) -> TaskOutcome {
        tracing::info!(command = %self.spec, "Running client");
        let mut cmd = self.spec.to_command();

        let outcome = if self.capture {
            match cmd.output().await {
                Ok(output) => TaskOutcome {
                    status: TaskStatus::from_exit(output.status),
                    stdout: Some(String::from_utf8_lossy(&output.stdout).into_owned()),
                    stderr: Some(String::from_utf8_lossy(&output.stderr).into_owned()),
                },
                Err(e) => TaskOutcome::faulted(format!("failed to launch client: {e}")),
            }
        } else {
            match cmd.status().await {
                Ok(status) => TaskOutcome::plain(TaskStatus::from_exit(status)),
                Err(e) => TaskOutcome::faulted(format!("failed to launch client: {e}")),
            }
        };

        match &outcome.status {
            TaskStatus::Exited { code } => tracing::info!(code, "Client exited"),
            TaskStatus::Signaled { signal } => tracing::warn!(signal, "Client killed by signal"),
            TaskStatus::Faulted { message } => tracing::error!(%message, "Client faulted"),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new(["sh", "-c", script]).unwrap()
    }

    #[test]
    fn success_requires_zero_exit() {
        assert!(TaskStatus::Exited { code: 0 }.success());
        assert!(!TaskStatus::Exited { code: 7 }.success());
        assert!(!TaskStatus::Signaled { signal: 15 }.success());
        assert!(
            !TaskStatus::Faulted {
                message: "no".into()
            }
            .success()
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn reports_zero_exit() {
        let outcome = ForegroundTask::new(sh("exit 0")).run().await;
        assert_eq!(outcome.status, TaskStatus::Exited { code: 0 });
        assert!(outcome.stdout.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn reports_nonzero_exit() {
        let outcome = ForegroundTask::new(sh("exit 7")).run().await;
        assert_eq!(outcome.status, TaskStatus::Exited { code: 7 });
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_output_when_asked() {
        let outcome = ForegroundTask::new(sh("echo out; echo err >&2"))
            .with_capture(true)
            .run()
            .await;
        assert_eq!(outcome.status, TaskStatus::Exited { code: 0 });
        assert_eq!(outcome.stdout.as_deref(), Some("out\n"));
        assert_eq!(outcome.stderr.as_deref(), Some("err\n"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn reports_signal_exit() {
        let outcome = ForegroundTask::new(sh("kill -TERM $$")).run().await;
        assert_eq!(outcome.status, TaskStatus::Signaled { signal: 15 });
    }

    #[tokio::test]
    async fn launch_failure_is_a_fault() {
        let spec = CommandSpec::new(["/nonexistent/tether-test-client"]).unwrap();
        let outcome = ForegroundTask::new(spec).run().await;
        assert!(matches!(outcome.status, TaskStatus::Faulted { .. }));
    }
}
