//! Readiness probes for the supervised service.
//!
//! The default treats a successful launch as ready, which preserves the
//! launch-then-use behavior this tool replaces. The other probes close the
//! race for services that need settle time or bind a socket: the delay
//! probe fails fast if the service dies while waiting, and the TCP probe
//! polls until the service accepts a connection.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{Instant, sleep, timeout};

use crate::process::ServiceProcess;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const CONNECT_ATTEMPT: Duration = Duration::from_millis(250);

/// Condition that must hold before the client runs.
#[derive(Debug, Clone, Default)]
pub enum ReadinessProbe {
    /// A successful launch is ready.
    #[default]
    Launched,
    /// Fixed settle time after launch.
    Delay(Duration),
    /// Poll until `addr` accepts a TCP connection, bounded by `timeout`.
    Tcp { addr: String, timeout: Duration },
}

impl ReadinessProbe {
    /// Wait until the service is ready, failing fast if it exits first.
    pub async fn wait(&self, service: &mut ServiceProcess) -> Result<(), String> {
        match self {
            Self::Launched => Ok(()),
            Self::Delay(settle) => {
                let deadline = Instant::now() + *settle;
                loop {
                    check_still_up(service)?;
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(());
                    }
                    sleep(POLL_INTERVAL.min(deadline - now)).await;
                }
            }
            Self::Tcp {
                addr,
                timeout: limit,
            } => {
                let deadline = Instant::now() + *limit;
                loop {
                    check_still_up(service)?;
                    if let Ok(Ok(_)) =
                        timeout(CONNECT_ATTEMPT, TcpStream::connect(addr.as_str())).await
                    {
                        tracing::debug!(%addr, "Service accepting connections");
                        return Ok(());
                    }
                    if Instant::now() >= deadline {
                        return Err(format!(
                            "timed out after {:.1}s waiting for {addr} to accept connections",
                            limit.as_secs_f64()
                        ));
                    }
                    sleep(POLL_INTERVAL).await;
                }
            }
        }
    }
}

fn check_still_up(service: &mut ServiceProcess) -> Result<(), String> {
    match service.try_exit() {
        Ok(None) => Ok(()),
        Ok(Some(status)) => Err(format!("service exited during startup: {status}")),
        Err(e) => Err(format!("failed to poll service: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandSpec;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new(["sh", "-c", script]).unwrap()
    }

    async fn stop(mut service: ServiceProcess) {
        service.shutdown(Duration::from_secs(2)).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn launched_is_immediately_ready() {
        let mut service = ServiceProcess::spawn(&sh("sleep 30")).unwrap();
        assert_eq!(ReadinessProbe::Launched.wait(&mut service).await, Ok(()));
        stop(service).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn delay_probe_waits_out_the_settle_time() {
        let mut service = ServiceProcess::spawn(&sh("sleep 30")).unwrap();
        let started = Instant::now();
        let probe = ReadinessProbe::Delay(Duration::from_millis(150));
        assert_eq!(probe.wait(&mut service).await, Ok(()));
        assert!(started.elapsed() >= Duration::from_millis(150));
        stop(service).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn delay_probe_fails_fast_on_service_exit() {
        let mut service = ServiceProcess::spawn(&sh("exit 3")).unwrap();
        let started = Instant::now();
        let probe = ReadinessProbe::Delay(Duration::from_secs(10));
        let err = probe.wait(&mut service).await.unwrap_err();
        assert!(err.contains("exited during startup"), "{err}");
        assert!(started.elapsed() < Duration::from_secs(5));
        stop(service).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn tcp_probe_succeeds_once_listening() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let mut service = ServiceProcess::spawn(&sh("sleep 30")).unwrap();
        let probe = ReadinessProbe::Tcp {
            addr,
            timeout: Duration::from_secs(2),
        };
        assert_eq!(probe.wait(&mut service).await, Ok(()));
        stop(service).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn tcp_probe_times_out_when_nothing_listens() {
        // Bind then drop to get a port that is very likely closed.
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };

        let mut service = ServiceProcess::spawn(&sh("sleep 30")).unwrap();
        let probe = ReadinessProbe::Tcp {
            addr,
            timeout: Duration::from_millis(300),
        };
        let err = probe.wait(&mut service).await.unwrap_err();
        assert!(err.contains("timed out"), "{err}");
        stop(service).await;
    }
}
