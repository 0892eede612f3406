//! Structured external tool invocation.
//!
//! Every external tool (search engine, converter, predictor, re-scorer) runs
//! through [`run_tool`]: an argument vector handed straight to the OS (never a
//! shell string), stdout/stderr captured rather than inherited, and a hard
//! timeout. A nonzero exit, a timeout, or a missing expected output file is
//! fatal for the pipeline; these are deterministic local invocations, so no
//! retry is ever warranted.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crossbeam_channel::bounded;
use log::{debug, info};

/// Errors raised by external tool invocations. All are fatal.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The process could not be started at all.
    #[error("failed to launch {tool} ({program}): {source}")]
    Spawn {
        /// Human-readable tool name.
        tool: String,
        /// Program that was invoked.
        program: String,
        /// Underlying launch error.
        source: std::io::Error,
    },

    /// I/O error while supervising the process.
    #[error("I/O error while running {tool}: {source}")]
    Io {
        /// Human-readable tool name.
        tool: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Nonzero exit status.
    #[error("{tool} failed with {status}; stderr: {stderr}")]
    ExitStatus {
        /// Human-readable tool name.
        tool: String,
        /// Exit status description.
        status: String,
        /// Tail of the captured stderr.
        stderr: String,
    },

    /// The process exceeded its allotted run time and was killed.
    #[error("{tool} did not finish within {timeout_secs}s and was killed")]
    Timeout {
        /// Human-readable tool name.
        tool: String,
        /// The limit that was exceeded.
        timeout_secs: u64,
    },

    /// The process exited cleanly but an expected output file is absent.
    #[error("{tool} did not produce expected output file {path}")]
    MissingOutput {
        /// Human-readable tool name.
        tool: String,
        /// The absent file.
        path: PathBuf,
    },
}

/// Captured output of a completed invocation.
#[derive(Debug)]
pub struct ToolOutput {
    /// Captured standard output.
    pub stdout: Vec<u8>,
    /// Captured standard error.
    pub stderr: Vec<u8>,
}

/// Poll interval while waiting for a child to exit.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How much captured stderr to include in an error message.
const STDERR_TAIL: usize = 2000;

/// Run `program` with `args`, capturing output, failing on nonzero exit and
/// killing the child after `timeout`.
pub fn run_tool(
    tool: &str,
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<ToolOutput, ToolError> {
    info!("running {tool}: {program} {}", args.join(" "));

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ToolError::Spawn {
            tool: tool.to_string(),
            program: program.to_string(),
            source,
        })?;

    // Drain both pipes on helper threads so the child never blocks on a full
    // pipe while we wait for it.
    let stdout_rx = drain(child.stdout.take());
    let stderr_rx = drain(child.stderr.take());

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if started.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ToolError::Timeout {
                        tool: tool.to_string(),
                        timeout_secs: timeout.as_secs(),
                    });
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(source) => {
                return Err(ToolError::Io {
                    tool: tool.to_string(),
                    source,
                })
            }
        }
    };

    let stdout = stdout_rx.recv().unwrap_or_default();
    let stderr = stderr_rx.recv().unwrap_or_default();

    if !status.success() {
        return Err(ToolError::ExitStatus {
            tool: tool.to_string(),
            status: status.to_string(),
            stderr: tail(&stderr),
        });
    }

    debug!(
        "{tool} finished in {:.1}s ({} bytes stdout, {} bytes stderr)",
        started.elapsed().as_secs_f64(),
        stdout.len(),
        stderr.len()
    );
    Ok(ToolOutput { stdout, stderr })
}

/// Fail unless `path` exists after a tool reported success.
pub fn expect_output(tool: &str, path: &Path) -> Result<(), ToolError> {
    if path.exists() {
        Ok(())
    } else {
        Err(ToolError::MissingOutput {
            tool: tool.to_string(),
            path: path.to_path_buf(),
        })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> crossbeam_channel::Receiver<Vec<u8>> {
    let (tx, rx) = bounded(1);
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send(buf);
    });
    rx
}

fn tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_TAIL {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}
