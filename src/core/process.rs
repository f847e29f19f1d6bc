//! External command execution
//!
//! Everything shiprel delegates (hooks, the publish tool, build agents, upload
//! commands, self-tests) runs through here so failures all surface as
//! `ShipError::CommandFailed` with the command line attached.

use crate::core::error::{ShipError, ShipResult};
use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, ExitStatus};
use tracing::info;

/// Render a command line for messages
pub fn describe(cmd: &Command) -> String {
  std::iter::once(cmd.get_program())
    .chain(cmd.get_args())
    .map(|s| s.to_string_lossy().into_owned())
    .collect::<Vec<_>>()
    .join(" ")
}

/// Run a command with inherited stdio and return its exit status
pub fn call(cmd: &mut Command) -> ShipResult<ExitStatus> {
  let line = describe(cmd);
  info!("Executing {}", line);
  cmd
    .status()
    .map_err(|e| ShipError::message(format!("Failed to execute {}: {}", line, e)))
}

/// Run a command and fail unless it exits successfully
pub fn check_call(cmd: &mut Command) -> ShipResult<()> {
  let status = call(cmd)?;
  if status.success() {
    Ok(())
  } else {
    Err(ShipError::CommandFailed {
      command: describe(cmd),
      code: status.code(),
    })
  }
}

/// Run a shell snippet (`sh -c SCRIPT`) in `cwd` with extra environment
pub fn run_shell(script: &str, cwd: &Path, env: &[(&str, &str)]) -> ShipResult<()> {
  let mut cmd = Command::new("sh");
  cmd.arg("-c").arg(script).current_dir(cwd);
  for (key, val) in env {
    cmd.env(key, val);
  }

  let status = call(&mut cmd)?;
  if status.success() {
    Ok(())
  } else {
    Err(ShipError::CommandFailed {
      command: script.to_string(),
      code: status.code(),
    })
  }
}

/// Print and run a user command, passing `args` as its positional parameters
///
/// Runs `sh -c COMMAND - ARGS...`, so the command refers to them as `"$@"`.
pub fn show_and_run<S: AsRef<OsStr>>(command: &str, args: &[S], cwd: &Path, env: &[(&str, &str)]) -> ShipResult<()> {
  let shown: Vec<String> = args
    .iter()
    .map(|a| format!("[{}]", a.as_ref().to_string_lossy()))
    .collect();
  println!("Executing: {} {}", command, shown.join(" "));

  let mut cmd = Command::new("sh");
  cmd.arg("-c").arg(command).arg("-").args(args).current_dir(cwd);
  for (key, val) in env {
    cmd.env(key, val);
  }

  let status = call(&mut cmd)?;
  if status.success() {
    Ok(())
  } else {
    Err(ShipError::CommandFailed {
      command: command.to_string(),
      code: status.code(),
    })
  }
}
