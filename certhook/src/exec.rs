//! External command execution.
//!
//! DNS providers and the container runtime are driven through their CLIs. All of
//! them go through [`CommandRunner`] so the hook logic can be exercised without
//! spawning processes.

use std::process::Command;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with status {code}: {detail}")]
    NonZeroExit {
        command: String,
        code: i32,
        detail: String,
    },

    #[error("{command} was terminated by a signal: {detail}")]
    Terminated { command: String, detail: String },
}

/// A program invocation: argv plus extra environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Command line for logs. Environment values are never included.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Synchronous call-and-result contract for external programs.
pub trait CommandRunner {
    fn run(&self, invocation: &Invocation) -> Result<(), CommandError>;
}

/// Runs invocations as child processes of the hook.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<(), CommandError> {
        let command_line = invocation.command_line();
        tracing::debug!(command = %command_line, "Running command");

        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(invocation.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .output()
            .map_err(|source| CommandError::Spawn {
                command: command_line.clone(),
                source,
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let detail = if stderr.is_empty() { stdout } else { stderr };

        match output.status.code() {
            Some(code) => Err(CommandError::NonZeroExit {
                command: command_line,
                code,
                detail,
            }),
            None => Err(CommandError::Terminated {
                command: command_line,
                detail,
            }),
        }
    }
}
