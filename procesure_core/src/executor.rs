//! External command execution
//!
//! Every provisioning action that touches the OS goes through an
//! [`Executor`]. Commands are described by a [`CommandSpec`] and produce a
//! [`CommandOutcome`] that separates "ran and succeeded", "ran and failed"
//! and "could not be started", logging the details of each through `tracing`.

use crate::error::{ProcesureError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// Windows PowerShell binary used for scripted steps
pub const POWERSHELL: &str = r"C:\Windows\System32\WindowsPowerShell\v1.0\powershell.exe";

/// Quote a value as a single-quoted PowerShell string literal
pub fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Description of a command to run, plus the messages logged around it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    pub msg_in: Option<String>,
    pub msg_out: Option<String>,
    pub msg_error: Option<String>,
    /// Hide arguments from logs (credentials on the command line)
    pub redact_args: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            msg_in: None,
            msg_out: None,
            msg_error: None,
            redact_args: false,
        }
    }

    /// Run a PowerShell script through the system PowerShell binary
    pub fn powershell(script: impl Into<String>) -> Self {
        Self::new(POWERSHELL).args([
            "-NoProfile".to_string(),
            "-ExecutionPolicy".to_string(),
            "Bypass".to_string(),
            "-Command".to_string(),
            script.into(),
        ])
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

    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    /// Set the working directory
    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Message logged before the command runs
    pub fn on_start(mut self, msg: impl Into<String>) -> Self {
        self.msg_in = Some(msg.into());
        self
    }

    /// Message logged when the command succeeds
    pub fn on_success(mut self, msg: impl Into<String>) -> Self {
        self.msg_out = Some(msg.into());
        self
    }

    /// Message logged when the command fails or cannot start
    pub fn on_error(mut self, msg: impl Into<String>) -> Self {
        self.msg_error = Some(msg.into());
        self
    }

    pub fn redacted(mut self) -> Self {
        self.redact_args = true;
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        if self.redact_args {
            if !self.args.is_empty() {
                write!(f, " <{} args redacted>", self.args.len())?;
            }
            return Ok(());
        }
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Captured result of a process that ran to completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or -1 if terminated by a signal
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

/// Structured result of running a [`CommandSpec`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Exited with status 0
    Succeeded(CommandOutput),
    /// Exited with a non-zero status
    Failed(CommandOutput),
    /// The process could not be started
    Error(String),
}

impl CommandOutcome {
    /// 0 for success, 1 for a non-zero exit, 2 when the command could not run
    pub fn status_code(&self) -> u8 {
        match self {
            Self::Succeeded(_) => 0,
            Self::Failed(_) => 1,
            Self::Error(_) => 2,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    /// Output of a process that ran, whatever its exit status
    pub fn output(&self) -> Option<&CommandOutput> {
        match self {
            Self::Succeeded(out) | Self::Failed(out) => Some(out),
            Self::Error(_) => None,
        }
    }

    /// Convert into a `Result`, turning any non-success into [`ProcesureError::Command`]
    pub fn into_result(self, program: &str) -> Result<CommandOutput> {
        match self {
            Self::Succeeded(out) => Ok(out),
            Self::Failed(out) => Err(ProcesureError::Command {
                program: program.to_string(),
                code: out.code,
                stderr: out.stderr.trim().to_string(),
            }),
            Self::Error(message) => Err(ProcesureError::Command {
                program: program.to_string(),
                code: -1,
                stderr: message,
            }),
        }
    }
}

/// Runs external commands
#[cfg_attr(test, mockall::automock)]
pub trait Executor {
    fn execute(&self, spec: &CommandSpec) -> CommandOutcome;
}

/// Run a command and require it to succeed
pub fn run_checked(executor: &dyn Executor, spec: &CommandSpec) -> Result<CommandOutput> {
    executor.execute(spec).into_result(&spec.program)
}

/// [`Executor`] backed by `std::process::Command`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

impl SystemExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Executor for SystemExecutor {
    fn execute(&self, spec: &CommandSpec) -> CommandOutcome {
        if let Some(msg) = &spec.msg_in {
            info!("{}", msg);
        }

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        if let Some(dir) = &spec.current_dir {
            cmd.current_dir(dir);
        }

        let output = match cmd.output() {
            Ok(output) => output,
            Err(e) => {
                if let Some(msg) = &spec.msg_error {
                    warn!("{}", msg);
                }
                warn!("Could not start '{}': {}", spec.program, e);
                return CommandOutcome::Error(e.to_string());
            }
        };

        let result = CommandOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        debug!("Command: {}", spec);
        debug!("Exit code: {}", result.code);
        debug!("Output: {}", result.stdout_trimmed());

        if output.status.success() {
            if !result.stderr_trimmed().is_empty() {
                debug!("Error: {}", result.stderr_trimmed());
            }
            if let Some(msg) = &spec.msg_out {
                info!("{}", msg);
            }
            CommandOutcome::Succeeded(result)
        } else {
            if let Some(msg) = &spec.msg_error {
                warn!("{}", msg);
            }
            warn!(
                "'{}' exited with code {}: {}",
                spec.program,
                result.code,
                result.stderr_trimmed()
            );
            CommandOutcome::Failed(result)
        }
    }
}
