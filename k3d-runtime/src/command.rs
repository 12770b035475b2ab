//! Docker command builder.
//!
//! Centralizes how `docker` subcommands are spawned, logged and how their
//! failures are classified into [`RuntimeError`] variants.

use crate::RuntimeResult;
use k3d_core::RuntimeError;
use std::process::Command;
use tracing::debug;

const UNAVAILABLE_MARKERS: &[&str] = &[
    "cannot connect to the docker daemon",
    "is the docker daemon running",
    "error during connect",
    "connection refused",
];

const NOT_FOUND_MARKERS: &[&str] = &[
    "no such container",
    "no such volume",
    "no such network",
    "no such object",
    "is not connected to",
    "not found",
];

const CONFLICT_MARKERS: &[&str] = &["is already in use", "already exists"];

/// Builder for Docker commands with fluent interface and consistent error handling.
#[derive(Debug, Clone)]
pub struct DockerCommand {
    executable: String,
    subcommand: Option<String>,
    args: Vec<String>,
}

impl DockerCommand {
    /// Create a new builder for the given `docker` executable.
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            subcommand: None,
            args: Vec::new(),
        }
    }

    /// Set the Docker subcommand (e.g., "ps", "network", "volume").
    pub fn subcommand<S: Into<String>>(mut self, cmd: S) -> Self {
        self.subcommand = Some(cmd.into());
        self
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
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

    /// Add `flag value` once per value, e.g. `--label k=v --label k2=v2`.
    pub fn repeated<I, S>(mut self, flag: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for value in values {
            self.args.push(flag.to_string());
            self.args.push(value.into());
        }
        self
    }

    /// Execute the command and return success/failure status.
    pub fn execute(self) -> RuntimeResult<()> {
        self.execute_with_output().map(|_| ())
    }

    /// Execute the command and return its trimmed stdout.
    pub fn execute_with_output(self) -> RuntimeResult<String> {
        let rendered = self.render();
        let mut cmd = self.build_command();

        debug!("Executing Docker command: {}", rendered);

        let output = cmd.output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RuntimeError::Unavailable(format!("'{}' executable not found", rendered_bin(&cmd)))
            } else {
                RuntimeError::Io(e)
            }
        })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            debug!("Docker command failed ({}): {}", output.status, stderr);
            Err(classify_failure(rendered, stderr))
        }
    }

    /// The command line as it would be typed, for logs and errors.
    pub fn render(&self) -> String {
        let mut parts = vec![self.executable.clone()];
        parts.extend(self.subcommand.iter().cloned());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    fn build_command(self) -> Command {
        let mut cmd = Command::new(self.executable);

        if let Some(subcmd) = self.subcommand {
            cmd.arg(subcmd);
        }

        cmd.args(self.args);
        cmd
    }
}

fn rendered_bin(cmd: &Command) -> String {
    cmd.get_program().to_string_lossy().into_owned()
}

/// Map a failed command's stderr onto the runtime error taxonomy.
pub fn classify_failure(command: String, stderr: String) -> RuntimeError {
    let lower = stderr.to_lowercase();
    if UNAVAILABLE_MARKERS.iter().any(|m| lower.contains(m)) {
        RuntimeError::Unavailable(stderr)
    } else if NOT_FOUND_MARKERS.iter().any(|m| lower.contains(m)) {
        RuntimeError::NotFound(stderr)
    } else if CONFLICT_MARKERS.iter().any(|m| lower.contains(m)) {
        RuntimeError::Conflict(stderr)
    } else {
        RuntimeError::CommandFailed { command, stderr }
    }
}
