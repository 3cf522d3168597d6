//! OS command invocation with diagnosable failures.

use std::process::Command;

use tracing::debug;

use crate::error::{NetconfError, Result};

fn command_line(program: &str, args: &[&str]) -> String {
    let mut line = String::from(program);
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Runs a command to completion, discarding output on success.
///
/// # Errors
///
/// Returns an error carrying the full command line and the combined
/// stdout/stderr if the command cannot be spawned or exits unsuccessfully.
pub fn run(program: &str, args: &[&str]) -> Result<()> {
    let line = command_line(program, args);
    debug!(command = %line, "running");

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| NetconfError::Spawn {
            command: line.clone(),
            source,
        })?;

    if !output.status.success() {
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        return Err(NetconfError::CommandFailed {
            command: line,
            output: combined.trim().to_string(),
        });
    }

    Ok(())
}

/// Runs a command and returns its stdout on success.
///
/// # Errors
///
/// Same failure modes as [`run`].
pub fn run_capture(program: &str, args: &[&str]) -> Result<String> {
    let line = command_line(program, args);
    debug!(command = %line, "running");

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| NetconfError::Spawn {
            command: line.clone(),
            source,
        })?;

    if !output.status.success() {
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        return Err(NetconfError::CommandFailed {
            command: line,
            output: combined.trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
