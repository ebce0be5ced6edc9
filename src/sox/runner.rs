//! SoX process spawning.
//!
//! `capture` runs a short query to completion and returns its trimmed stdout.
//! `run_sox_streaming` runs a conversion, draining stdout in a background task
//! while stderr chunks are handed to the caller in arrival order.

use std::io;
use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::builder::format_args_for_display_multiline;
use super::path_to_string;
use crate::error::ProcessError;

/// Keep only the last N bytes of stderr to avoid unbounded memory growth.
const MAX_STDERR_BYTES: usize = 64 * 1024;
const READ_CHUNK_BYTES: usize = 4096;

/// Run `program` once and return its stdout, trimmed.
pub async fn capture(program: &Path, args: Vec<String>) -> Result<String, ProcessError> {
    let output = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| ProcessError::launch(path_to_string(program), args.clone(), e))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if output.status.success() {
        Ok(stdout.trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        log::debug!(
            target: "sox_transcode::sox::runner",
            "query failed (code={:?}): args={:?}",
            output.status.code(),
            args
        );
        Err(ProcessError::exit(
            path_to_string(program),
            args,
            output.status.code(),
            stdout,
            stderr,
        ))
    }
}

/// Output of a conversion that exited successfully.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Decode everything up to a trailing partial code point, which stays pending.
/// Invalid bytes become U+FFFD.
fn take_utf8(pending: &mut Vec<u8>) -> String {
    let mut text = String::new();
    let mut start = 0;
    while start < pending.len() {
        match std::str::from_utf8(&pending[start..]) {
            Ok(valid) => {
                text.push_str(valid);
                start = pending.len();
            }
            Err(e) => {
                let valid_end = start + e.valid_up_to();
                text.push_str(&String::from_utf8_lossy(&pending[start..valid_end]));
                match e.error_len() {
                    Some(len) => {
                        text.push(char::REPLACEMENT_CHARACTER);
                        start = valid_end + len;
                    }
                    None => {
                        start = valid_end;
                        break;
                    }
                }
            }
        }
    }
    pending.drain(..start);
    text
}

fn push_capped(buf: &mut String, text: &str) {
    buf.push_str(text);
    if buf.len() > MAX_STDERR_BYTES {
        let mut excess = buf.len() - MAX_STDERR_BYTES;
        while !buf.is_char_boundary(excess) {
            excess += 1;
        }
        buf.drain(..excess);
    }
}

async fn drain_stdout<R>(mut stdout: R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Err(e) = stdout.read_to_end(&mut buf).await {
        log::warn!(
            target: "sox_transcode::sox::runner",
            "stdout read failed: {}",
            e
        );
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Read stderr to EOF, handing each decoded chunk to `on_stderr`.
/// On a read error the text captured so far is returned with the error.
async fn drain_stderr<R, F>(mut stderr: R, on_stderr: &mut F) -> Result<String, (io::Error, String)>
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut captured = String::new();
    let mut pending = Vec::with_capacity(READ_CHUNK_BYTES);
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];
    loop {
        match stderr.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                pending.extend_from_slice(&chunk[..n]);
                let text = take_utf8(&mut pending);
                if !text.is_empty() {
                    push_capped(&mut captured, &text);
                    on_stderr(&text);
                }
            }
            Err(e) => return Err((e, captured)),
        }
    }
    if !pending.is_empty() {
        let text = String::from_utf8_lossy(&pending).into_owned();
        push_capped(&mut captured, &text);
        on_stderr(&text);
    }
    Ok(captured)
}

/// Run a conversion to completion. `on_stderr` sees every stderr chunk as it arrives.
pub async fn run_sox_streaming<F>(
    program: &Path,
    args: Vec<String>,
    mut on_stderr: F,
) -> Result<CapturedOutput, ProcessError>
where
    F: FnMut(&str),
{
    let program_str = path_to_string(program);
    log::debug!(
        target: "sox_transcode::sox::runner",
        "Spawning SoX: path={}\n  {}",
        program_str,
        format_args_for_display_multiline(&args)
    );

    let mut child = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ProcessError::launch(program_str.clone(), args.clone(), e))?;

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        let _ = child.kill().await;
        return Err(ProcessError::launch(
            program_str,
            args,
            io::Error::other("failed to capture output pipes"),
        ));
    };

    let stdout_task = tokio::spawn(drain_stdout(stdout));

    let stderr_text = match drain_stderr(stderr, &mut on_stderr).await {
        Ok(text) => text,
        Err((e, captured)) => {
            log::error!(
                target: "sox_transcode::sox::runner",
                "stderr read failed, killing SoX: {}",
                e
            );
            let _ = child.kill().await;
            stdout_task.abort();
            return Err(ProcessError::read(program_str, args, e, captured));
        }
    };

    let status = child
        .wait()
        .await
        .map_err(|e| ProcessError::launch(program_str.clone(), args.clone(), e))?;
    let stdout_text = stdout_task.await.unwrap_or_default();

    if status.success() {
        log::info!(
            target: "sox_transcode::sox::runner",
            "SoX completed successfully"
        );
        Ok(CapturedOutput {
            stdout: stdout_text,
            stderr: stderr_text,
        })
    } else {
        let err_preview = stderr_text
            .lines()
            .rev()
            .filter(|l| !l.trim().is_empty())
            .take(3)
            .collect::<Vec<_>>()
            .join("; ");
        log::error!(
            target: "sox_transcode::sox::runner",
            "SoX failed (code={:?}): {}",
            status.code(),
            err_preview
        );
        Err(ProcessError::exit(
            program_str,
            args,
            status.code(),
            stdout_text,
            stderr_text,
        ))
    }
}
