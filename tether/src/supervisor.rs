//! Lifecycle supervisor - runs a client against a supervised service.
//!
//! Flow:
//! 1. Validate both commands
//! 2. Spawn the service in the background
//! 3. Wait for the readiness condition (cleanup on failure)
//! 4. Run the client to completion
//! 5. Stop and reap the service - on every path out of step 3/4
//! 6. Report the client result and the cleanup result together

use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::command::CommandSpec;
use crate::error::{SuperviseError, SuperviseResult};
use crate::probe::ReadinessProbe;
use crate::process::{CleanupStatus, ServiceProcess};
use crate::task::{ForegroundTask, TaskOutcome};

/// Configuration for a supervised run.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Bounded wait per cleanup stage (graceful, then forced).
    pub stop_grace: Duration,
    /// Condition that must hold before the client runs.
    pub readiness: ReadinessProbe,
    /// Capture client stdout/stderr into the outcome instead of inheriting.
    pub capture_client_output: bool,
}

impl SupervisorConfig {
    pub fn new() -> Self {
        Self {
            stop_grace: Duration::from_secs(5),
            readiness: ReadinessProbe::Launched,
            capture_client_output: false,
        }
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn with_readiness(mut self, probe: ReadinessProbe) -> Self {
        self.readiness = probe;
        self
    }

    pub fn with_captured_client_output(mut self, capture: bool) -> Self {
        self.capture_client_output = capture;
        self
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate result of a supervised run.
///
/// The client result and the cleanup result are reported together; a
/// cleanup failure never displaces a client fault, and vice versa.
#[derive(Debug, Serialize)]
pub struct ExitOutcome {
    /// Correlates the run's log lines and reports.
    pub run_id: Uuid,
    pub client: TaskOutcome,
    pub cleanup: CleanupStatus,
}

impl ExitOutcome {
    /// Client exited zero and the service was cleaned up.
    pub fn success(&self) -> bool {
        self.client.status.success() && self.cleanup.ok()
    }
}

/// Prefix invalid-command errors with which command was at fault.
fn label(err: SuperviseError, which: &str) -> SuperviseError {
    match err {
        SuperviseError::InvalidCommand(reason) => {
            SuperviseError::invalid_command(format!("{which} command: {reason}"))
        }
        other => other,
    }
}

/// Runs the "background service + dependent client" pattern with
/// guaranteed cleanup.
pub struct Supervisor {
    config: SupervisorConfig,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Launch `service_argv` in the background, run `client_argv` against
    /// it, and stop the service afterward regardless of how the client
    /// fared.
    ///
    /// Only pre-client failures return `Err`; see [`SuperviseError`]. The
    /// service owns no state beyond this call - sequential runs are
    /// independent.
    pub async fn run<A, SA, B, SB>(
        &self,
        service_argv: A,
        client_argv: B,
    ) -> SuperviseResult<ExitOutcome>
    where
        A: IntoIterator<Item = SA>,
        SA: Into<String>,
        B: IntoIterator<Item = SB>,
        SB: Into<String>,
    {
        let service_spec = CommandSpec::new(service_argv).map_err(|e| label(e, "service"))?;
        let client_spec = CommandSpec::new(client_argv).map_err(|e| label(e, "client"))?;

        let run_id = Uuid::new_v4();
        let mut service = ServiceProcess::spawn(&service_spec)?;
        tracing::info!(
            %run_id,
            pid = service.pid(),
            command = %service_spec,
            "Service launched"
        );

        if let Err(reason) = self.config.readiness.wait(&mut service).await {
            tracing::error!(%run_id, %reason, "Service failed readiness, cleaning up");
            let cleanup = service.shutdown(self.config.stop_grace).await;
            if !cleanup.ok() {
                tracing::error!(%run_id, ?cleanup, "Cleanup after readiness failure also failed");
            }
            return Err(SuperviseError::not_ready(service_spec.to_string(), reason));
        }
        service.mark_running();
        tracing::debug!(%run_id, pid = service.pid(), "Service ready");

        let client = ForegroundTask::new(client_spec)
            .with_capture(self.config.capture_client_output)
            .run()
            .await;

        let cleanup = service.shutdown(self.config.stop_grace).await;
        match &cleanup {
            CleanupStatus::Failed { message } => {
                tracing::error!(%run_id, %message, "Service cleanup failed");
            }
            outcome => {
                tracing::info!(%run_id, ?outcome, "Service stopped");
            }
        }

        Ok(ExitOutcome {
            run_id,
            client,
            cleanup,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;

    const SH: &str = "sh";

    fn supervisor() -> Supervisor {
        Supervisor::new(SupervisorConfig::new().with_stop_grace(Duration::from_secs(2)))
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn client_success_with_clean_stop() {
        let outcome = supervisor()
            .run([SH, "-c", "sleep 30"], [SH, "-c", "exit 0"])
            .await
            .unwrap();
        assert_eq!(outcome.client.status, TaskStatus::Exited { code: 0 });
        assert_eq!(outcome.cleanup, CleanupStatus::Graceful);
        assert!(outcome.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn client_failure_still_cleans_up() {
        let outcome = supervisor()
            .run([SH, "-c", "sleep 30"], [SH, "-c", "exit 7"])
            .await
            .unwrap();
        assert_eq!(outcome.client.status, TaskStatus::Exited { code: 7 });
        assert!(outcome.cleanup.ok());
        assert!(!outcome.success());
    }

    #[tokio::test]
    async fn empty_service_command_is_invalid() {
        let err = supervisor()
            .run(Vec::<String>::new(), vec!["true".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, SuperviseError::InvalidCommand(_)));
    }

    #[tokio::test]
    async fn empty_client_command_is_invalid() {
        let err = supervisor()
            .run(vec!["sleep".to_string(), "30".to_string()], Vec::<String>::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SuperviseError::InvalidCommand(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn launch_failure_never_runs_the_client() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("client-ran");
        let client = format!("touch {}", marker.display());

        let err = supervisor()
            .run(["/nonexistent/tether-test-service"], [SH, "-c", client.as_str()])
            .await
            .unwrap_err();
        assert!(matches!(err, SuperviseError::Launch { .. }));
        assert!(!marker.exists(), "client must not run when launch fails");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stop_signal_sent_exactly_once_even_on_client_fault() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("stops");
        let service = format!(
            "trap 'echo stopped >> {}; exit 0' TERM; while true; do sleep 0.05; done",
            marker.display()
        );

        let outcome = supervisor()
            .run([SH, "-c", service.as_str()], [SH, "-c", "exit 7"])
            .await
            .unwrap();
        assert!(!outcome.success());
        assert_eq!(outcome.cleanup, CleanupStatus::Graceful);

        let stops = std::fs::read_to_string(&marker).unwrap();
        assert_eq!(stops.lines().count(), 1, "one stop signal, got: {stops:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn readiness_failure_cleans_up_and_reports_not_ready() {
        let config = SupervisorConfig::new()
            .with_stop_grace(Duration::from_secs(2))
            .with_readiness(ReadinessProbe::Delay(Duration::from_secs(10)));
        let err = Supervisor::new(config)
            .run([SH, "-c", "exit 3"], [SH, "-c", "exit 0"])
            .await
            .unwrap_err();
        assert!(matches!(err, SuperviseError::NotReady { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captured_client_output_lands_in_the_outcome() {
        let config = SupervisorConfig::new()
            .with_stop_grace(Duration::from_secs(2))
            .with_captured_client_output(true);
        let outcome = Supervisor::new(config)
            .run([SH, "-c", "sleep 30"], [SH, "-c", "echo received"])
            .await
            .unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.client.stdout.as_deref(), Some("received\n"));
    }
}
