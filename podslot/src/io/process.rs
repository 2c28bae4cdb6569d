//! Running runtime CLI queries with a timeout and bounded output.

use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Captured output of a finished (or killed) query.
#[derive(Debug)]
pub struct QueryOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Bytes dropped past the output limit.
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl QueryOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// First non-empty stderr line, for error messages.
    pub fn stderr_summary(&self) -> String {
        String::from_utf8_lossy(&self.stderr)
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("no output")
            .to_string()
    }
}

/// Run `program args..` with stdin closed, killing it after `timeout`.
///
/// Both pipes are drained on reader threads so a chatty child cannot block
/// on a full pipe; at most `output_limit_bytes` of each stream is kept.
#[instrument(skip_all, fields(program, timeout_secs = timeout.as_secs()))]
pub fn run_query(
    program: &str,
    args: &[&str],
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<QueryOutput> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("spawn {program}"))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let stdout_handle = thread::spawn(move || read_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for query")? {
        Some(status) => status,
        None => {
            warn!(program, timeout_secs = timeout.as_secs(), "query timed out, killing");
            timed_out = true;
            child.kill().context("kill query")?;
            child.wait().context("wait query after kill")?
        }
    };

    let (stdout, stdout_truncated) = join_reader(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_reader(stderr_handle).context("join stderr")?;
    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "query output truncated");
    }
    debug!(exit_code = ?status.code(), timed_out, "query finished");
    Ok(QueryOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn join_reader(
    handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>,
) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let keep = n.min(limit.saturating_sub(buf.len()));
        buf.extend_from_slice(&chunk[..keep]);
        truncated += n - keep;
    }
    Ok((buf, truncated))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_of_quick_command() {
        let out = run_query("sh", &["-c", "echo one; echo two"], Duration::from_secs(5), 1024)
            .expect("run");
        assert!(out.success());
        assert_eq!(out.stdout_text(), "one\ntwo\n");
    }

    #[test]
    fn kills_command_after_timeout() {
        let out = run_query("sh", &["-c", "exec sleep 5"], Duration::from_millis(100), 1024)
            .expect("run");
        assert!(out.timed_out);
        assert!(!out.success());
    }

    #[test]
    fn bounds_captured_output() {
        let out = run_query("sh", &["-c", "printf 'abcdefgh'"], Duration::from_secs(5), 4)
            .expect("run");
        assert_eq!(out.stdout, b"abcd");
        assert_eq!(out.stdout_truncated, 4);
        assert_eq!(out.stderr_truncated, 0);
    }

    #[test]
    fn missing_program_is_an_error() {
        assert!(run_query("podslot-no-such-binary", &[], Duration::from_secs(1), 16).is_err());
    }
}
