// src/exec/command.rs

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broadcast::Broadcaster;
use crate::errors::{DacapoError, Result};

use super::backend::{CancelReceiver, CommandExecutor, CommandRequest, ProcessExit};
use super::output::{OutputStream, StderrTail, drain_lines};

/// Environment forced onto every task: unbuffered Python output and a
/// colour-capable terminal.
pub const ENV_OVERLAY: [(&str, &str); 6] = [
    ("PYTHONUNBUFFERED", "1"),
    ("FORCE_COLOR", "1"),
    ("TERM", "xterm-256color"),
    ("COLORTERM", "truecolor"),
    ("CLICOLOR", "1"),
    ("CLICOLOR_FORCE", "1"),
];

/// How long output may stay open once the task process has exited.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Split a command line into arguments using POSIX shell-word rules.
pub fn parse_command(command: &str) -> Result<Vec<String>> {
    let args = shell_words::split(command)?;
    if args.is_empty() {
        return Err(DacapoError::EmptyCommand);
    }
    Ok(args)
}

/// Production executor: spawns the process directly (no shell), streams its
/// output to the live-update channel and waits for it to exit.
#[derive(Debug, Clone)]
pub struct RealExecutor {
    broadcaster: Arc<dyn Broadcaster>,
    stderr_tail_chars: usize,
}

impl RealExecutor {
    pub fn new(broadcaster: Arc<dyn Broadcaster>, stderr_tail_chars: usize) -> Self {
        Self {
            broadcaster,
            stderr_tail_chars,
        }
    }

    async fn run_inner(
        &self,
        request: CommandRequest,
        mut cancel: CancelReceiver,
    ) -> Result<ProcessExit> {
        let args = parse_command(&request.command)?;

        let mut cmd = Command::new(&args[0]);
        cmd.args(&args[1..])
            .envs(ENV_OVERLAY)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = request.work_dir.as_ref() {
            cmd.current_dir(dir);
        }

        // Own process group so cancellation reaches the whole tree.
        #[cfg(unix)]
        cmd.process_group(0);

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        let mut child = cmd.spawn().map_err(|source| DacapoError::Spawn {
            command: request.command.clone(),
            source,
        })?;

        let stdout = child.stdout.take().ok_or(DacapoError::Pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(DacapoError::Pipe("stderr"))?;

        debug!(
            instance = %request.instance,
            task = %request.task,
            pid = ?child.id(),
            "task process started"
        );

        let broadcaster = Arc::clone(&self.broadcaster);
        let instance = request.instance.clone();
        let tail = StderrTail::new(self.stderr_tail_chars);
        let mut output = tokio::spawn(async move {
            let (_, tail) = tokio::join!(
                drain_lines(
                    stdout,
                    instance.clone(),
                    OutputStream::Stdout,
                    Arc::clone(&broadcaster),
                    None,
                ),
                drain_lines(stderr, instance, OutputStream::Stderr, broadcaster, Some(tail)),
            );
            tail.unwrap_or_default()
        });

        // The pid doubles as the process group id; keep it for after the
        // leader has been reaped.
        let pgid = child.id();

        // Either the process exits on its own, or the task manager is
        // cancelled and we kill it.
        let (status, mut killed) = tokio::select! {
            status = child.wait() => (status?, false),

            _ = cancelled(&mut cancel) => {
                info!(
                    instance = %request.instance,
                    task = %request.task,
                    "cancellation requested; killing task process"
                );
                kill_tree(&mut child, pgid, &request).await;
                (child.wait().await?, true)
            }
        };

        // Processes left in the group can hold the pipes open past the
        // leader's exit. Cancellation still reaches them while we drain.
        let tail = if killed {
            collect_output(&mut output, &request).await
        } else {
            tokio::select! {
                tail = collect_output(&mut output, &request) => tail,

                _ = cancelled(&mut cancel) => {
                    info!(
                        instance = %request.instance,
                        task = %request.task,
                        "cancellation requested after exit; killing process group"
                    );
                    kill_group(pgid, &request);
                    killed = true;
                    collect_output(&mut output, &request).await
                }
            }
        };

        info!(
            instance = %request.instance,
            task = %request.task,
            exit_code = ?status.code(),
            success = status.success(),
            killed,
            "task process exited"
        );

        if killed {
            return Ok(ProcessExit::ManuallyStopped);
        }
        if status.success() {
            Ok(ProcessExit::Completed)
        } else {
            Err(DacapoError::CommandFailed {
                status,
                stderr: tail.into_string(),
            })
        }
    }
}

/// Resolves when a cancellation is sent; a dropped sender never resolves.
async fn cancelled(cancel: &mut CancelReceiver) {
    if cancel.await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Wait for both output readers, at most [`OUTPUT_DRAIN_GRACE`].
///
/// On timeout the readers are aborted, which closes our end of the pipes;
/// whatever still holds them keeps running detached.
async fn collect_output(
    output: &mut JoinHandle<StderrTail>,
    request: &CommandRequest,
) -> StderrTail {
    match tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut *output).await {
        Ok(Ok(tail)) => tail,
        Ok(Err(e)) => {
            warn!(instance = %request.instance, error = %e, "output reader failed");
            StderrTail::default()
        }
        Err(_) => {
            warn!(
                instance = %request.instance,
                task = %request.task,
                "output still open after the process exited; detaching"
            );
            output.abort();
            StderrTail::default()
        }
    }
}

async fn kill_tree(child: &mut Child, pgid: Option<u32>, request: &CommandRequest) {
    kill_group(pgid, request);

    if let Err(e) = child.kill().await {
        warn!(
            instance = %request.instance,
            task = %request.task,
            error = %e,
            "failed to kill child process on cancellation"
        );
    }
}

#[cfg(unix)]
fn kill_group(pgid: Option<u32>, request: &CommandRequest) {
    let Some(pgid) = pgid else {
        return;
    };
    // SAFETY: plain syscall on the process group we created at spawn.
    let rc = unsafe { libc::kill(-(pgid as i32), libc::SIGKILL) };
    if rc != 0 {
        debug!(
            instance = %request.instance,
            pgid,
            "process group kill failed; group already gone"
        );
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: Option<u32>, _request: &CommandRequest) {}

impl CommandExecutor for RealExecutor {
    fn run_command(
        &self,
        request: CommandRequest,
        cancel: CancelReceiver,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessExit>> + Send + '_>> {
        Box::pin(self.run_inner(request, cancel))
    }
}
