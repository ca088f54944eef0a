//! Running one shell command per request and reporting how it went.

pub mod capture;
pub mod phase;
pub mod progress;
pub mod quoting;

pub use capture::{CaptureError, CapturedOutput, DirectCapture, OutputCapture, PrettyCapture};
pub use phase::{LineSignal, PhaseClassifier, PhaseMark, XcodebuildPhases};
pub use progress::{ProgressSink, ProgressStatus, ProgressTracker, ProgressUpdate};
pub use quoting::{join_command, quote_arg, quote_literal};

use crate::config::ServerConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    tokens: Vec<String>,
    label: String,
    pretty_output: bool,
}

impl ExecutionRequest {
    pub fn new<I, S>(label: impl Into<String>, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
            label: label.into(),
            pretty_output: false,
        }
    }

    /// Argv assembled from client input. Every token reaches the command as
    /// the same text, even one that arrives wrapped in quotes.
    pub fn literal<I, S>(label: impl Into<String>, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(
            label,
            tokens
                .into_iter()
                .map(|t| quote_literal(t.as_ref()).into_owned()),
        )
    }

    /// Allow the executor to route stdout through the pretty formatter.
    pub fn with_pretty_output(mut self) -> Self {
        self.pretty_output = true;
        self
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn command_line(&self) -> String {
        join_command(&self.tokens)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn succeeded(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn failed(output: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            error: Some(error.into()),
        }
    }
}

pub struct CommandExecutor {
    direct: DirectCapture,
    pretty: Option<PrettyCapture>,
    classifier: Option<Arc<dyn PhaseClassifier>>,
    progress_interval: Duration,
}

impl std::fmt::Debug for CommandExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandExecutor")
            .field("direct", &self.direct)
            .field("pretty", &self.pretty)
            .field("classifier", &self.classifier.as_ref().map(|_| "<classifier>"))
            .field("progress_interval", &self.progress_interval)
            .finish()
    }
}

impl CommandExecutor {
    pub fn new() -> Self {
        Self {
            direct: DirectCapture::default(),
            pretty: None,
            classifier: Some(Arc::new(XcodebuildPhases)),
            progress_interval: Duration::from_secs(1),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        let executor = Self::new()
            .with_shell(config.shell.clone())
            .with_progress_interval(config.progress_interval);
        if config.use_pretty_output {
            executor.with_pretty_output(config.pretty_helper.clone())
        } else {
            executor
        }
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        let shell = shell.into();
        self.pretty = self.pretty.map(|p| p.with_shell(shell.clone()));
        self.direct = DirectCapture::new(shell);
        self
    }

    pub fn with_pretty_output(mut self, helper: impl Into<String>) -> Self {
        self.pretty = Some(PrettyCapture::new(helper).with_shell(self.direct.shell()));
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn PhaseClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn without_classifier(mut self) -> Self {
        self.classifier = None;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Runs the request to completion. Spawn failures and nonzero exits are
    /// reported in the returned result; a sink, when given, always receives
    /// exactly one terminal update, and it comes last.
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
        sink: Option<&dyn ProgressSink>,
    ) -> ExecutionResult {
        let label = request.label();
        let command_line = request.command_line();
        let mut tracker =
            ProgressTracker::new(label, sink, self.classifier.as_deref(), self.progress_interval);

        info!("{}: {}", label, command_line);
        tracker.start();

        // A formatter that fails after the command ran means the command runs again unformatted
        let mut captured = None;
        if let Some(pretty) = self.pretty.as_ref().filter(|_| request.pretty_output) {
            match pretty.capture(&command_line, &mut tracker).await {
                Ok(output) => captured = Some(output),
                Err(e) => warn!(
                    "{} output unavailable for {}, using direct capture: {}",
                    pretty.name(),
                    label,
                    e
                ),
            }
        }

        let captured = match captured {
            Some(output) => Ok(output),
            None => self.direct.capture(&command_line, &mut tracker).await,
        };

        let result = match captured {
            Ok(output) => Self::interpret(label, output),
            Err(e) => {
                warn!("{} could not run: {}", label, e);
                ExecutionResult::failed("", format!("{} could not be started: {}", label, e))
            }
        };

        let message = if result.success {
            format!("{} completed successfully", label)
        } else {
            format!("{} failed", label)
        };
        tracker.finish(result.success, message);

        result
    }

    fn interpret(label: &str, output: CapturedOutput) -> ExecutionResult {
        let stdout = output.stdout.trim_end().to_string();
        let stderr = output.stderr.trim_end().to_string();

        match output.exit_code {
            Some(0) => {
                if stdout.is_empty() {
                    ExecutionResult::succeeded(format!("{} completed successfully", label))
                } else {
                    ExecutionResult::succeeded(stdout)
                }
            }
            Some(code) => {
                warn!("{} exited with code {}", label, code);
                let error = if stderr.is_empty() {
                    format!("{} failed with exit code {}", label, code)
                } else {
                    stderr
                };
                ExecutionResult::failed(stdout, error)
            }
            None => {
                warn!("{} was terminated by a signal", label);
                let error = if stderr.is_empty() {
                    format!("{} was terminated by a signal", label)
                } else {
                    stderr
                };
                ExecutionResult::failed(stdout, error)
            }
        }
    }
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpret_success_without_output() {
        let result = CommandExecutor::interpret(
            "Boot simulator",
            CapturedOutput {
                exit_code: Some(0),
                ..Default::default()
            },
        );
        assert!(result.success);
        assert_eq!(result.output, "Boot simulator completed successfully");
        assert!(result.error.is_none());
    }

    #[test]
    fn test_interpret_failure_keeps_stdout() {
        let result = CommandExecutor::interpret(
            "Build",
            CapturedOutput {
                exit_code: Some(65),
                stdout: "CompileSwift A.swift\n".to_string(),
                stderr: "error: cannot find 'x' in scope\n".to_string(),
            },
        );
        assert!(!result.success);
        assert_eq!(result.output, "CompileSwift A.swift");
        assert_eq!(result.error.as_deref(), Some("error: cannot find 'x' in scope"));
    }

    #[test]
    fn test_interpret_failure_without_stderr() {
        let result = CommandExecutor::interpret(
            "Clean",
            CapturedOutput {
                exit_code: Some(2),
                ..Default::default()
            },
        );
        assert_eq!(result.error.as_deref(), Some("Clean failed with exit code 2"));
    }

    #[test]
    fn test_literal_request_neutralizes_client_quotes() {
        let request = ExecutionRequest::literal(
            "Build",
            ["xcodebuild", "-scheme", "My App", "\"$(id)\"", "build"],
        );
        assert_eq!(
            request.command_line(),
            "xcodebuild -scheme \"My App\" \"\\\"\\$(id)\\\"\" build"
        );
    }

    #[test]
    fn test_request_command_line() {
        let request = ExecutionRequest::new(
            "Build",
            ["xcodebuild", "-scheme", "My App", "-destination", "generic/platform=iOS", "build"],
        );
        assert_eq!(
            request.command_line(),
            "xcodebuild -scheme \"My App\" -destination \"generic/platform=iOS\" build"
        );
    }
}
