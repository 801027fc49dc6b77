//! Error taxonomy for supervised runs.
//!
//! Only failures before the client runs are surfaced as errors. Once the
//! client has run, its result and the cleanup result travel together in
//! [`ExitOutcome`] instead, so neither can mask the other.
//!
//! [`ExitOutcome`]: crate::supervisor::ExitOutcome

/// Errors that abort a supervised run before the client executes.
#[derive(Debug, thiserror::Error)]
pub enum SuperviseError {
    /// The command sequence was empty or malformed. Nothing was spawned.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// The service process could not be started. Nothing to clean up.
    #[error("failed to launch service `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The service launched but never became ready. Cleanup has already run.
    #[error("service `{command}` did not become ready: {reason}")]
    NotReady { command: String, reason: String },
}

impl SuperviseError {
    pub fn invalid_command(message: impl Into<String>) -> Self {
        Self::InvalidCommand(message.into())
    }

    pub fn launch(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::Launch {
            command: command.into(),
            source,
        }
    }

    pub fn not_ready(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotReady {
            command: command.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for supervised runs.
pub type SuperviseResult<T> = std::result::Result<T, SuperviseError>;
