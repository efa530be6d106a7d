//! Child-process execution with a timeout and bounded output capture.
//!
//! Backs the command classifier: the vision model runs out of process and
//! must never hang the survey.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Characters kept from the end of stderr for error messages.
const STDERR_TAIL_CHARS: usize = 300;
const READ_CHUNK: usize = 8192;

/// How the child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    Exited(ExitStatus),
    /// Killed after exceeding the timeout.
    TimedOut,
}

/// One output stream, capped at the configured limit.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Captured {
    pub bytes: Vec<u8>,
    /// Bytes read past the limit and discarded.
    pub dropped: usize,
}

#[derive(Debug)]
pub struct ProcessOutput {
    pub exit: ChildExit,
    pub stdout: Captured,
    pub stderr: Captured,
}

impl ProcessOutput {
    /// Exit code when the child exited on its own.
    pub fn exit_code(&self) -> Option<i32> {
        match self.exit {
            ChildExit::Exited(status) => status.code(),
            ChildExit::TimedOut => None,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.exit, ChildExit::Exited(status) if status.success())
    }

    /// End of stderr, trimmed, for error messages.
    pub fn stderr_tail(&self) -> String {
        let text = String::from_utf8_lossy(&self.stderr.bytes);
        let trimmed = text.trim();
        let start = trimmed
            .char_indices()
            .rev()
            .nth(STDERR_TAIL_CHARS)
            .map_or(0, |(idx, _)| idx);
        trimmed[start..].to_string()
    }
}

/// Run `cmd`, feed it `stdin`, and wait at most `timeout`.
///
/// Both pipes are drained on reader threads while the child runs, so a chatty
/// child cannot deadlock on a full pipe. Only spawn and wait failures are
/// errors; a timeout or non-zero exit is reported in [`ProcessOutput::exit`].
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), limit = limit))]
pub fn run_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    limit: usize,
) -> Result<ProcessOutput> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    let mut child = cmd.spawn().context("spawn command")?;
    debug!(pid = child.id(), "child spawned");

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let stdout_reader = thread::spawn(move || capture(stdout, limit));
    let stderr_reader = thread::spawn(move || capture(stderr, limit));

    if let Some(input) = stdin {
        let mut pipe = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        // A child that exits without reading stdin closes the pipe; its exit
        // status reports the real failure.
        if let Err(err) = pipe.write_all(input) {
            warn!(%err, "child closed stdin early");
        }
    }

    let exit = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => ChildExit::Exited(status),
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            child.kill().context("kill command")?;
            child.wait().context("reap killed command")?;
            ChildExit::TimedOut
        }
    };

    let stdout = join(stdout_reader).context("collect stdout")?;
    let stderr = join(stderr_reader).context("collect stderr")?;
    if stdout.dropped > 0 || stderr.dropped > 0 {
        warn!(
            stdout_dropped = stdout.dropped,
            stderr_dropped = stderr.dropped,
            "output exceeded limit"
        );
    }

    debug!(?exit, stdout_bytes = stdout.bytes.len(), "command finished");
    Ok(ProcessOutput {
        exit,
        stdout,
        stderr,
    })
}

fn join(reader: JoinHandle<Result<Captured>>) -> Result<Captured> {
    reader
        .join()
        .map_err(|_| anyhow!("output reader thread panicked"))?
}

fn capture<R: Read>(mut stream: R, limit: usize) -> Result<Captured> {
    let mut captured = Captured::default();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = stream.read(&mut chunk).context("read output")?;
        if n == 0 {
            return Ok(captured);
        }
        let keep = n.min(limit.saturating_sub(captured.bytes.len()));
        captured.bytes.extend_from_slice(&chunk[..keep]);
        captured.dropped += n - keep;
    }
}
