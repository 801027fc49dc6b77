//! Validated command sequences.

use std::fmt;

use tokio::process::Command;

use crate::error::{SuperviseError, SuperviseResult};

/// A non-empty command sequence: program plus arguments.
///
/// Validation happens at construction so the supervisor never hands an
/// empty or unnameable command to the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
}

impl CommandSpec {
    /// Build a spec from an argv-style sequence.
    ///
    /// Fails with [`SuperviseError::InvalidCommand`] when the sequence is
    /// empty or the program name is an empty string.
    pub fn new<I, S>(argv: I) -> SuperviseResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = argv.into_iter().map(Into::into);
        let program = argv
            .next()
            .ok_or_else(|| SuperviseError::invalid_command("command sequence is empty"))?;
        if program.is_empty() {
            return Err(SuperviseError::invalid_command("program name is empty"));
        }
        Ok(Self {
            program,
            args: argv.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Build the `tokio` command for this spec. Stdio is left at the
    /// caller's choice.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}
