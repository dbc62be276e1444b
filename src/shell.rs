//! Privileged command channel
//!
//! Every read or write of the camera's private files goes through a shell
//! running with elevated rights. Commands are plain strings so the same
//! sequence can be replayed by hand with `su -c` when debugging a device.

use anyhow::{Context, Result, bail};
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

/// Result of one command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl CommandOutput {
    /// First non-empty stdout line, trimmed
    pub fn first_line(&self) -> Option<&str> {
        self.stdout.iter().map(|l| l.trim()).find(|l| !l.is_empty())
    }
}

/// Capability to run shell commands with elevated rights
pub trait PrivilegedChannel: Send + Sync {
    /// Run `command`; `Err` only when the shell itself could not be started
    fn execute(&self, command: &str) -> Result<CommandOutput>;

    /// Run `command` and fail with its stderr when it exits non-zero
    fn run(&self, command: &str) -> Result<CommandOutput> {
        let output = self.execute(command)?;
        if !output.success {
            bail!("`{}` failed: {}", command, output.stderr.join("; "));
        }
        Ok(output)
    }
}

/// Runs commands through `<program> -c <command>`
#[derive(Debug, Clone)]
pub struct ShellChannel {
    program: String,
}

impl ShellChannel {
    /// Use `su`, or plain `sh` when `su_binary` is empty
    pub fn new(su_binary: &str) -> Self {
        let program = if su_binary.is_empty() { "sh" } else { su_binary };
        Self {
            program: program.to_string(),
        }
    }

    #[cfg(test)]
    pub fn program(&self) -> &str {
        &self.program
    }
}

impl PrivilegedChannel for ShellChannel {
    fn execute(&self, command: &str) -> Result<CommandOutput> {
        debug!(shell = %self.program, command = %command, "Executing privileged command");

        let output = Command::new(&self.program)
            .arg("-c")
            .arg(command)
            .output()
            .with_context(|| format!("Failed to start '{}'", self.program))?;

        let result = CommandOutput {
            success: output.status.success(),
            stdout: split_lines(&output.stdout),
            stderr: split_lines(&output.stderr),
        };
        if !result.success {
            warn!(command = %command, status = ?output.status.code(), stderr = ?result.stderr, "Privileged command failed");
        }
        Ok(result)
    }
}

fn split_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes).lines().map(str::to_string).collect()
}

/// Single-quote a string for the shell
pub fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

pub fn quote_path(path: &Path) -> String {
    quote(&path.to_string_lossy())
}
