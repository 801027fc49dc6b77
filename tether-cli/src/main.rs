//! `tether` - run a foreground client against a supervised background service.
//!
//! Usage: `tether [OPTIONS] <SERVICE...> -- <CLIENT...>`. The service is
//! launched in the background, the client runs to completion against it,
//! and the service is stopped and reaped afterward whatever the client did.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use tether::{
    CleanupStatus, ExitOutcome, ReadinessProbe, SuperviseError, Supervisor, SupervisorConfig,
    TaskStatus,
};

const EXIT_SUCCESS: u8 = 0;
const EXIT_CLIENT_FAULT: u8 = 1;
const EXIT_LAUNCH_ERROR: u8 = 2;
const EXIT_CLEANUP_ERROR: u8 = 3;
const EXIT_INVALID_COMMAND: u8 = 4;

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "tether",
    about = "Run a client against a supervised background service",
    version
)]
struct Cli {
    /// Seconds to wait per cleanup stage (graceful stop, then force kill).
    #[arg(long, value_name = "SECONDS", default_value_t = 5.0)]
    stop_grace: f64,

    /// Settle time in seconds between launching the service and running
    /// the client.
    #[arg(long, value_name = "SECONDS")]
    ready_delay: Option<f64>,

    /// Wait until this address accepts a TCP connection before running
    /// the client.
    #[arg(long, value_name = "HOST:PORT", conflicts_with = "ready_delay")]
    ready_tcp: Option<String>,

    /// Seconds to wait for the TCP readiness probe before giving up.
    #[arg(long, value_name = "SECONDS", default_value_t = 30.0)]
    ready_timeout: f64,

    /// Capture client stdout/stderr into the outcome report.
    #[arg(long)]
    capture: bool,

    /// Print the run outcome as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Service command, then `--`, then client command.
    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "SERVICE... -- CLIENT..."
    )]
    commands: Vec<String>,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("tether: {err:#}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("tether: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(args))
}

async fn run(args: Cli) -> ExitCode {
    let (service, client) = split_commands(&args.commands);
    let supervisor = Supervisor::new(supervisor_config(&args));

    match supervisor.run(service, client).await {
        Ok(outcome) => {
            if args.json {
                match serde_json::to_string_pretty(&outcome) {
                    Ok(report) => println!("{report}"),
                    Err(err) => tracing::error!(error = %err, "Failed to serialize outcome"),
                }
            }
            report_problems(&outcome);
            ExitCode::from(exit_code_for(
                outcome.client.status.success(),
                outcome.cleanup.ok(),
            ))
        }
        Err(err) => {
            eprintln!("tether: {err}");
            ExitCode::from(error_exit_code(&err))
        }
    }
}

/// Everything before the first `--` is the service command, everything
/// after it is the client command.
fn split_commands(args: &[String]) -> (Vec<String>, Vec<String>) {
    match args.iter().position(|a| a == "--") {
        Some(split) => (args[..split].to_vec(), args[split + 1..].to_vec()),
        None => (args.to_vec(), Vec::new()),
    }
}

fn supervisor_config(args: &Cli) -> SupervisorConfig {
    let readiness = if let Some(addr) = &args.ready_tcp {
        ReadinessProbe::Tcp {
            addr: addr.clone(),
            timeout: Duration::from_secs_f64(args.ready_timeout.max(0.0)),
        }
    } else if let Some(settle) = args.ready_delay {
        ReadinessProbe::Delay(Duration::from_secs_f64(settle.max(0.0)))
    } else {
        ReadinessProbe::Launched
    };

    SupervisorConfig::new()
        .with_stop_grace(Duration::from_secs_f64(args.stop_grace.max(0.0)))
        .with_readiness(readiness)
        .with_captured_client_output(args.capture)
}

/// Both a client fault and a cleanup failure are reported when both occur;
/// the exit code alone cannot carry both.
fn report_problems(outcome: &ExitOutcome) {
    if let TaskStatus::Faulted { message } = &outcome.client.status {
        eprintln!("tether: client fault: {message}");
    }
    if let CleanupStatus::Failed { message } = &outcome.cleanup {
        eprintln!("tether: cleanup failed: {message}");
    }
}

fn exit_code_for(client_ok: bool, cleanup_ok: bool) -> u8 {
    match (client_ok, cleanup_ok) {
        (true, true) => EXIT_SUCCESS,
        (false, _) => EXIT_CLIENT_FAULT,
        (true, false) => EXIT_CLEANUP_ERROR,
    }
}

fn error_exit_code(err: &SuperviseError) -> u8 {
    match err {
        SuperviseError::InvalidCommand(_) => EXIT_INVALID_COMMAND,
        SuperviseError::Launch { .. } | SuperviseError::NotReady { .. } => EXIT_LAUNCH_ERROR,
    }
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("TETHER_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    }
    .context("failed to initialize tracing subscriber")
}
