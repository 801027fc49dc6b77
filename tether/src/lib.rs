//! tether: run a foreground client against a supervised background service.
//!
//! The service is started in the background and the client runs against it;
//! afterward the service is stopped and reaped, even when the client fails.

mod command;
mod error;
mod probe;
mod process;
mod supervisor;
mod task;

pub use command::CommandSpec;
pub use error::{SuperviseError, SuperviseResult};
pub use probe::ReadinessProbe;
pub use process::{CleanupStatus, ServiceProcess, ServiceStatus};
pub use supervisor::{ExitOutcome, Supervisor, SupervisorConfig};
pub use task::{ForegroundTask, TaskOutcome, TaskStatus};
