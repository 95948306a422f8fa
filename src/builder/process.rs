//! Running toolchain processes with streaming output and cancellation

use crate::error::{AutobuildError, AutobuildResult};
use crate::project::{ProcessSpec, Runtime};
use std::process::ExitStatus;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Max number of output lines to include in stage failure messages.
const ERROR_TAIL_LINES: usize = 50;

/// The useful tail of a stage's output for error diagnostics.
pub(crate) fn error_tail(lines: &[String]) -> String {
    let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Line reader over a child's output pipe.
///
/// Lines are decoded lossily so that non-UTF-8 output (compilers quote
/// source lines verbatim) never ends the stream early. Partial lines survive
/// a cancelled read, so `next_line` can race in `select!`.
struct OutputLines<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> OutputLines<R> {
    fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
        }
    }

    /// Next line without its terminator, `None` at end of stream or on a
    /// read error
    async fn next_line(&mut self) -> Option<String> {
        match self.reader.read_until(b'\n', &mut self.buf).await {
            Ok(0) if self.buf.is_empty() => None,
            Ok(_) => {
                let line = decode_line(&self.buf);
                self.buf.clear();
                Some(line)
            }
            Err(e) => {
                debug!("Stopped reading child output: {}", e);
                None
            }
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Stream stdout+stderr from a child process, calling `on_output` for each line.
///
/// Returns all collected output lines for error reporting.
async fn stream_child_output(
    child: &mut Child,
    on_output: &(dyn Fn(String) + Send + Sync),
) -> Vec<String> {
    let mut stderr_reader = child.stderr.take().map(OutputLines::new);
    let mut stdout_reader = child.stdout.take().map(OutputLines::new);

    let mut all_output = Vec::new();

    while stderr_reader.is_some() || stdout_reader.is_some() {
        tokio::select! {
            line = next_line(&mut stderr_reader), if stderr_reader.is_some() => {
                match line {
                    Some(line) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    None => stderr_reader = None,
                }
            }
            line = next_line(&mut stdout_reader), if stdout_reader.is_some() => {
                match line {
                    Some(line) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    None => stdout_reader = None,
                }
            }
        }
    }

    all_output
}

async fn next_line<R>(reader: &mut Option<OutputLines<R>>) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    match reader {
        Some(reader) => reader.next_line().await,
        None => None,
    }
}

async fn stream_and_wait(
    child: &mut Child,
    on_output: &(dyn Fn(String) + Send + Sync),
) -> (Vec<String>, std::io::Result<ExitStatus>) {
    let output = stream_child_output(child, on_output).await;
    let status = child.wait().await;
    (output, status)
}

/// Run one pipeline stage to completion.
///
/// The child is killed as soon as `cancel` fires. A non-zero exit yields
/// [`AutobuildError::ProcessFailed`] carrying the tail of the output.
pub(crate) async fn run_stage(
    runtime: &dyn Runtime,
    stage: &str,
    spec: &ProcessSpec,
    cancel: &CancellationToken,
    on_output: &(dyn Fn(String) + Send + Sync),
) -> AutobuildResult<()> {
    if cancel.is_cancelled() {
        return Err(AutobuildError::Cancelled);
    }

    let command = spec.display();
    debug!("{} in {}: {}", stage, spec.cwd.display(), command);

    let mut child = runtime
        .command(spec)
        .spawn()
        .map_err(|e| AutobuildError::command_failed(&command, e))?;

    let finished = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = stream_and_wait(&mut child, on_output) => Some(result),
    };

    let Some((output, status)) = finished else {
        debug!("{} cancelled, killing {}", stage, command);
        let _ = child.kill().await;
        return Err(AutobuildError::Cancelled);
    };

    let status = status.map_err(|e| AutobuildError::command_failed(&command, e))?;
    if !status.success() {
        return Err(AutobuildError::ProcessFailed {
            stage: stage.to_string(),
            command,
            code: status.code().unwrap_or(-1),
            output: error_tail(&output),
        });
    }

    Ok(())
}

/// Run a process and capture its standard output.
///
/// Dropping the child on cancellation kills it.
pub(crate) async fn capture_stdout(
    runtime: &dyn Runtime,
    stage: &str,
    spec: &ProcessSpec,
    cancel: &CancellationToken,
) -> AutobuildResult<(ExitStatus, String)> {
    let command = spec.display();
    debug!("{} in {}: {}", stage, spec.cwd.display(), command);

    let child = runtime
        .command(spec)
        .spawn()
        .map_err(|e| AutobuildError::command_failed(&command, e))?;

    let output = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(AutobuildError::Cancelled),
        output = child.wait_with_output() => {
            output.map_err(|e| AutobuildError::command_failed(&command, e))?
        }
    };

    Ok((
        output.status,
        String::from_utf8_lossy(&output.stdout).into_owned(),
    ))
}
