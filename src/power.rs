// src/power.rs

//! Host-level auto actions: hibernate and shut down the machine once the
//! scheduler is done with it.

use tokio::process::Command;
use tracing::{info, warn};

use crate::errors::{DacapoError, Result};
use crate::exec::decode_line;
use crate::types::AutoAction;

/// Command line carrying out `action` on a host running `os` (a
/// `std::env::consts::OS` value).
///
/// `None` when the action needs no host command (`none`, `exit`) or the
/// platform offers none. Hibernation is Windows-only; shutdown on unix goes
/// through `sudo` with a one-minute delay so it can still be cancelled.
pub fn host_command(action: AutoAction, os: &str) -> Option<&'static [&'static str]> {
    match (action, os) {
        (AutoAction::Hibernate, "windows") => Some(&["shutdown", "/h", "/f"]),
        (AutoAction::Shutdown, "windows") => Some(&["shutdown", "/s", "/t", "10", "/f"]),
        (AutoAction::Shutdown, "linux" | "macos") => Some(&["sudo", "shutdown", "-h", "+1"]),
        _ => None,
    }
}

/// Run the host command for `action` on this machine and wait for it.
///
/// Unsupported platforms are logged and treated as success.
pub async fn perform(action: AutoAction) -> Result<()> {
    let os = std::env::consts::OS;
    let Some((program, args)) = host_command(action, os).and_then(|argv| argv.split_first())
    else {
        warn!(?action, os, "auto action not supported on this platform");
        return Ok(());
    };

    let line = format!("{program} {}", args.join(" "));
    info!(?action, command = %line, "running auto action");

    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|source| DacapoError::Spawn {
            command: line.clone(),
            source,
        })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(DacapoError::CommandFailed {
            status: output.status,
            stderr: decode_line(&output.stderr).into_owned(),
        })
    }
}
