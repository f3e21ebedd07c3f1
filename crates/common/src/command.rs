//! Synchronous external-command invocation
//!
//! Both binaries drive external tools (`usbip`, `udevadm`, `systemctl`) whose
//! invocations are short and synchronous. This module is the single primitive
//! for that: run the command, capture exit status and both streams, decode
//! them as UTF-8 (lossily — tool output is not guaranteed clean).

use crate::error::{Error, Result};
use std::process::Command;
use tracing::debug;

/// Captured result of an external command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code; -1 if the process was killed by a signal
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// True if the command exited with status 0
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Run an external command and capture its output
///
/// A non-zero exit status is not an error here; callers that need one use
/// [`run_command_checked`]. Failing to spawn the process at all (binary not
/// installed, permissions) is an error.
pub fn run_command(program: &str, args: &[&str]) -> Result<CommandOutput> {
    debug!("Running command: {} {}", program, args.join(" "));

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| Error::Command(format!("failed to run {}: {}", program, e)))?;

    let result = CommandOutput {
        status: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    if !result.success() {
        debug!(
            "Command {} exited with status {}: {}",
            program,
            result.status,
            result.stderr.trim()
        );
    }

    Ok(result)
}

/// Run an external command, treating a non-zero exit status as an error
///
/// The error carries the command's stderr so it can be surfaced to the user.
pub fn run_command_checked(program: &str, args: &[&str]) -> Result<CommandOutput> {
    let output = run_command(program, args)?;
    if !output.success() {
        return Err(Error::Command(format!(
            "{} {} failed with status {}: {}",
            program,
            args.join(" "),
            output.status,
            output.stderr.trim()
        )));
    }
    Ok(output)
}
