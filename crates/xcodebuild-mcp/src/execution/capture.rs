use super::progress::ProgressTracker;
use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Consecutive read errors tolerated on one stream before it is abandoned
const MAX_READ_ERRORS: u32 = 8;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("{helper} is not installed")]
    HelperUnavailable { helper: String },

    #[error("{helper} failed: {reason}")]
    HelperFailed { helper: String, reason: String },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Exit status plus everything the process wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait OutputCapture: Send + Sync {
    fn name(&self) -> &'static str;

    async fn capture(
        &self,
        command_line: &str,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<CapturedOutput, CaptureError>;
}

/// Runs the command under a plain shell and reads its pipes directly.
#[derive(Debug, Clone)]
pub struct DirectCapture {
    shell: String,
}

impl DirectCapture {
    pub fn new(shell: impl Into<String>) -> Self {
        Self { shell: shell.into() }
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }
}

impl Default for DirectCapture {
    fn default() -> Self {
        Self::new("sh")
    }
}

#[async_trait]
impl OutputCapture for DirectCapture {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn capture(
        &self,
        command_line: &str,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<CapturedOutput, CaptureError> {
        let mut child = spawn_shell(&self.shell, command_line)?;
        debug!("Spawned {} (pid {:?})", self.shell, child.id());

        let mut captured = drain(child.stdout.take(), child.stderr.take(), tracker).await;
        let status = child.wait().await.map_err(|source| CaptureError::Wait {
            program: self.shell.clone(),
            source,
        })?;
        captured.exit_code = status.code();
        Ok(captured)
    }
}

/// Pipes stdout through a log formatter such as xcpretty.
///
/// The command and the formatter run as two processes so their exit
/// statuses stay separate. A formatter that is missing or exits nonzero
/// yields an error and the executor reruns the command with
/// [`DirectCapture`].
#[derive(Debug, Clone)]
pub struct PrettyCapture {
    helper: String,
    shell: String,
}

impl PrettyCapture {
    pub fn new(helper: impl Into<String>) -> Self {
        Self {
            helper: helper.into(),
            shell: "sh".to_string(),
        }
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn helper(&self) -> &str {
        &self.helper
    }

    pub fn is_available(&self) -> bool {
        which::which(&self.helper).is_ok()
    }

    fn failed(&self, reason: impl Into<String>) -> CaptureError {
        CaptureError::HelperFailed {
            helper: self.helper.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl OutputCapture for PrettyCapture {
    fn name(&self) -> &'static str {
        "pretty"
    }

    async fn capture(
        &self,
        command_line: &str,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<CapturedOutput, CaptureError> {
        let helper = which::which(&self.helper).map_err(|_| CaptureError::HelperUnavailable {
            helper: self.helper.clone(),
        })?;

        let mut producer = spawn_shell(&self.shell, command_line)?;
        let pipe: Stdio = producer
            .stdout
            .take()
            .ok_or_else(|| self.failed("command stdout was not captured"))?
            .try_into()
            .map_err(|e: io::Error| self.failed(format!("could not connect pipe: {}", e)))?;

        // the builder holding the pipe is dropped at the end of this statement,
        // so the producer sees EPIPE if the formatter exits early
        let mut formatter = Command::new(&helper)
            .stdin(pipe)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.failed(format!("could not start: {}", e)))?;
        debug!(
            "Spawned {} (pid {:?}) piped into {} (pid {:?})",
            self.shell,
            producer.id(),
            self.helper,
            formatter.id()
        );

        let mut captured = drain(formatter.stdout.take(), producer.stderr.take(), tracker).await;

        let formatter_status = formatter.wait().await.map_err(|source| CaptureError::Wait {
            program: self.helper.clone(),
            source,
        })?;
        let producer_status = producer.wait().await.map_err(|source| CaptureError::Wait {
            program: self.shell.clone(),
            source,
        })?;

        if !formatter_status.success() {
            return Err(self.failed(format!("exited with {}", formatter_status)));
        }
        captured.exit_code = producer_status.code();
        Ok(captured)
    }
}

fn spawn_shell(shell: &str, command_line: &str) -> Result<tokio::process::Child, CaptureError> {
    Command::new(shell)
        .args(["-c", command_line])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CaptureError::Spawn {
            program: shell.to_string(),
            source,
        })
}

/// Reads both streams to EOF, feeding every line to the tracker.
async fn drain<O, E>(
    stdout: Option<O>,
    stderr: Option<E>,
    tracker: &mut ProgressTracker<'_>,
) -> CapturedOutput
where
    O: AsyncRead + Unpin + Send,
    E: AsyncRead + Unpin + Send,
{
    let mut captured = CapturedOutput::default();
    let mut stdout_lines = stdout.map(LineReader::new);
    let mut stderr_lines = stderr.map(LineReader::new);

    while stdout_lines.is_some() || stderr_lines.is_some() {
        tokio::select! {
            line = next_line(&mut stdout_lines), if stdout_lines.is_some() => match line {
                Some(line) => {
                    tracker.observe_line(&line);
                    captured.stdout.push_str(&line);
                    captured.stdout.push('\n');
                }
                None => stdout_lines = None,
            },
            line = next_line(&mut stderr_lines), if stderr_lines.is_some() => match line {
                Some(line) => {
                    tracker.observe_line(&line);
                    captured.stderr.push_str(&line);
                    captured.stderr.push('\n');
                }
                None => stderr_lines = None,
            },
        }
    }

    captured
}

/// Line reader that tolerates output which is not valid UTF-8.
struct LineReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
    errors: u32,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            buf: Vec::new(),
            errors: 0,
        }
    }

    /// `None` at EOF, or once the stream keeps failing.
    async fn next_line(&mut self) -> Option<String> {
        loop {
            self.buf.clear();
            match self.inner.read_until(b'\n', &mut self.buf).await {
                Ok(0) => return None,
                Ok(_) => {
                    self.errors = 0;
                    if self.buf.ends_with(b"\n") {
                        self.buf.pop();
                        if self.buf.ends_with(b"\r") {
                            self.buf.pop();
                        }
                    }
                    return Some(String::from_utf8_lossy(&self.buf).into_owned());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.errors += 1;
                    warn!("Error reading process output: {}", e);
                    if self.errors >= MAX_READ_ERRORS {
                        return None;
                    }
                }
            }
        }
    }
}

async fn next_line<R: AsyncRead + Unpin>(reader: &mut Option<LineReader<R>>) -> Option<String> {
    reader.as_mut()?.next_line().await
}
