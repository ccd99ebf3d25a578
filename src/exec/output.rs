// src/exec/output.rs

//! Output draining for task processes.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{error, warn};

use crate::broadcast::Broadcaster;

use super::decode::decode_line;

/// Bounded capture of a process's stderr.
///
/// Keeps only the last `cap` characters; the tail usually holds the actual
/// error. Lines are newline-terminated, empty lines included.
#[derive(Debug, Clone, Default)]
pub struct StderrTail {
    buf: String,
    cap: usize,
    truncated: bool,
}

impl StderrTail {
    pub fn new(cap: usize) -> Self {
        Self {
            buf: String::new(),
            cap,
            truncated: false,
        }
    }

    pub fn push_line(&mut self, line: &str) {
        self.buf.push_str(line);
        self.buf.push('\n');

        // Bytes >= chars, so this bounds memory without counting on every line.
        if self.buf.len() > self.cap.saturating_mul(2).max(64) {
            self.trim();
        }
    }

    /// Finished tail, prefixed with `...\n` when earlier output was dropped.
    pub fn into_string(mut self) -> String {
        self.trim();
        if self.truncated {
            format!("...\n{}", self.buf)
        } else {
            self.buf
        }
    }

    fn trim(&mut self) {
        let chars = self.buf.chars().count();
        if chars <= self.cap {
            return;
        }
        let skip = chars - self.cap;
        let cut = self
            .buf
            .char_indices()
            .nth(skip)
            .map(|(idx, _)| idx)
            .unwrap_or(self.buf.len());
        self.buf.drain(..cut);
        self.truncated = true;
    }
}

/// Which pipe a reader is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Read `pipe` line by line until EOF, broadcasting every decoded line.
///
/// Trailing CR/LF is stripped; empty lines are kept. When `tail` is given
/// (stderr), lines are also captured and logged at error level. The tail is
/// handed back once the pipe is drained.
pub async fn drain_lines<R>(
    pipe: R,
    instance: String,
    stream: OutputStream,
    broadcaster: Arc<dyn Broadcaster>,
    mut tail: Option<StderrTail>,
) -> Option<StderrTail>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(pipe);
    let mut raw = Vec::new();

    loop {
        raw.clear();
        match reader.read_until(b'\n', &mut raw).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(instance = %instance, ?stream, error = %e, "error reading output");
                break;
            }
        }

        while matches!(raw.last(), Some(b'\n' | b'\r')) {
            raw.pop();
        }

        let text = decode_line(&raw);
        broadcaster.broadcast_log(&instance, &text);

        if let Some(tail) = tail.as_mut() {
            if !text.is_empty() {
                error!(instance = %instance, "{}", text);
            }
            tail.push_line(&text);
        }
    }

    tail
}
