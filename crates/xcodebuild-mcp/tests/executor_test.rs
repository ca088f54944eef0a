use std::sync::{Arc, Mutex};
use std::time::Duration;
use xcodebuild_mcp::execution::{ProgressSink, ProgressStatus, ProgressUpdate};
use xcodebuild_mcp::{CommandExecutor, ExecutionRequest};

#[derive(Default, Clone)]
struct Recorder {
    updates: Arc<Mutex<Vec<ProgressUpdate>>>,
}

impl Recorder {
    fn sink(&self) -> Arc<dyn ProgressSink> {
        let updates = self.updates.clone();
        Arc::new(move |update: ProgressUpdate| updates.lock().unwrap().push(update))
    }

    fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates.lock().unwrap().clone()
    }
}

fn assert_single_terminal_last(updates: &[ProgressUpdate]) {
    let terminal: Vec<_> = updates.iter().filter(|u| u.status.is_terminal()).collect();
    assert_eq!(terminal.len(), 1, "updates: {:?}", updates);
    assert!(updates.last().unwrap().status.is_terminal());
}

fn executor() -> CommandExecutor {
    CommandExecutor::new().with_progress_interval(Duration::ZERO)
}

#[tokio::test]
async fn test_zero_exit_succeeds() {
    let recorder = Recorder::default();
    let sink = recorder.sink();
    let request = ExecutionRequest::new("Echo", ["echo", "hello"]);

    let result = executor().execute(&request, Some(sink.as_ref())).await;

    assert!(result.success);
    assert_eq!(result.output, "hello");
    assert!(result.error.is_none());

    let updates = recorder.updates();
    assert_single_terminal_last(&updates);
    let last = updates.last().unwrap();
    assert_eq!(last.status, ProgressStatus::Completed);
    assert_eq!(last.progress, 100);
    assert_eq!(last.message, "Echo completed successfully");
}

#[tokio::test]
async fn test_empty_output_gets_generic_message() {
    let request = ExecutionRequest::new("Noop", ["true"]);
    let result = executor().execute(&request, None).await;
    assert!(result.success);
    assert_eq!(result.output, "Noop completed successfully");
}

#[tokio::test]
async fn test_nonzero_exit_fails_with_error() {
    let recorder = Recorder::default();
    let sink = recorder.sink();
    let request = ExecutionRequest::new("Exit", ["exit", "3"]);

    let result = executor().execute(&request, Some(sink.as_ref())).await;

    assert!(!result.success);
    let error = result.error.expect("error text");
    assert!(!error.is_empty());
    assert!(error.contains("exit code 3"), "error: {}", error);

    let updates = recorder.updates();
    assert_single_terminal_last(&updates);
    assert_eq!(updates.last().unwrap().status, ProgressStatus::Failed);
}

#[tokio::test]
async fn test_stderr_becomes_error_text() {
    let request = ExecutionRequest::new("List", ["ls", "/nonexistent-xcodebuild-mcp-path"]);
    let result = executor().execute(&request, None).await;
    assert!(!result.success);
    let error = result.error.expect("stderr text");
    assert!(error.contains("nonexistent-xcodebuild-mcp-path"), "error: {}", error);
}

#[tokio::test]
async fn test_spawn_failure_is_a_failed_result() {
    let recorder = Recorder::default();
    let sink = recorder.sink();
    let executor = executor().with_shell("/nonexistent/shell");
    let request = ExecutionRequest::new("Unrunnable", ["echo", "hi"]);

    let result = executor.execute(&request, Some(sink.as_ref())).await;

    assert!(!result.success);
    let error = result.error.expect("spawn error");
    assert!(error.starts_with("Unrunnable could not be started"), "error: {}", error);

    let updates = recorder.updates();
    assert_single_terminal_last(&updates);
    let last = updates.last().unwrap();
    assert_eq!(last.status, ProgressStatus::Failed);
    assert_eq!(last.progress, 0);
}

#[tokio::test]
async fn test_tokens_reach_the_shell_intact() {
    let request = ExecutionRequest::new(
        "Printf",
        [
            "printf",
            "'%s|'",
            "hello world",
            "a,b=c",
            "say \"hi\"",
            "back\\slash",
            "$HOME",
        ],
    );
    let result = executor().execute(&request, None).await;
    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.output, "hello world|a,b=c|say \"hi\"|back\\slash|$HOME|");
}

#[tokio::test]
async fn test_literal_tokens_are_not_expanded() {
    let request = ExecutionRequest::literal("Printf", ["printf", "%s|", "\"$(echo injected)\"", "'$HOME'"]);
    let result = executor().execute(&request, None).await;
    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.output, "\"$(echo injected)\"|'$HOME'|");
}

#[tokio::test]
async fn test_missing_pretty_helper_falls_back_to_direct() {
    let request = ExecutionRequest::new("Echo", ["echo", "plain"]).with_pretty_output();

    let direct = executor().execute(&request, None).await;
    let pretty = executor()
        .with_pretty_output("definitely-not-an-installed-formatter")
        .execute(&request, None)
        .await;

    assert_eq!(pretty, direct);
    assert_eq!(pretty.output, "plain");
}

#[tokio::test]
async fn test_installed_pretty_helper_matches_direct() {
    let request = ExecutionRequest::new("Echo", ["echo", "plain"]).with_pretty_output();

    let direct = executor().execute(&request, None).await;
    let pretty = executor().with_pretty_output("cat").execute(&request, None).await;

    assert_eq!(pretty, direct);
    assert_eq!(pretty.output, "plain");
}

#[tokio::test]
async fn test_failing_pretty_helper_falls_back_to_direct() {
    let recorder = Recorder::default();
    let sink = recorder.sink();
    let request = ExecutionRequest::new("Echo", ["echo", "plain"]).with_pretty_output();

    let direct = executor().execute(&request, None).await;
    let pretty = executor()
        .with_pretty_output("false")
        .execute(&request, Some(sink.as_ref()))
        .await;

    assert_eq!(pretty, direct);
    assert!(pretty.success);
    assert_single_terminal_last(&recorder.updates());
}

#[tokio::test]
async fn test_pretty_helper_keeps_command_exit_status() {
    let request = ExecutionRequest::new("Exit", ["exit", "5"]).with_pretty_output();
    let result = executor().with_pretty_output("cat").execute(&request, None).await;
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Exit failed with exit code 5"));
}

#[tokio::test]
async fn test_invalid_utf8_output_is_kept() {
    // enough output after the bad byte to fill the pipe if the reader stopped
    let request = ExecutionRequest::new(
        "Noisy",
        [
            "sh",
            "-c",
            "'printf \"a\\377\\nb\\n\"; sleep 0.2; seq 1 20000; echo tail'",
        ],
    );

    let result = executor().execute(&request, None).await;

    assert!(result.success, "error: {:?}", result.error);
    assert!(result.output.starts_with("a\u{fffd}\nb\n"), "output: {:.40}", result.output);
    assert!(result.output.contains("\n20000\n"));
    assert!(result.output.ends_with("tail"));
}

#[tokio::test]
async fn test_phase_lines_drive_progress() {
    let recorder = Recorder::default();
    let sink = recorder.sink();
    // a fully single-quoted token reaches printf untouched
    let request = ExecutionRequest::new(
        "Build",
        ["printf", "'CompileSwift Foo.swift\\nLd App normal\\nCodeSign App.app\\n'"],
    );

    let result = executor().execute(&request, Some(sink.as_ref())).await;
    assert!(result.success);

    let updates = recorder.updates();
    assert_single_terminal_last(&updates);
    let running: Vec<u8> = updates
        .iter()
        .filter(|u| u.status == ProgressStatus::Running)
        .map(|u| u.progress)
        .collect();
    assert!(running.windows(2).all(|w| w[0] <= w[1]), "progress: {:?}", running);
    assert!(updates.iter().any(|u| u.message.contains("Linking")));
    assert_eq!(updates.last().unwrap().progress, 100);
}

#[tokio::test]
async fn test_concurrent_executions_are_independent() {
    let executor = Arc::new(executor());
    let first = Recorder::default();
    let second = Recorder::default();

    let (a, b) = {
        let (e1, e2) = (executor.clone(), executor.clone());
        let (s1, s2) = (first.sink(), second.sink());
        tokio::join!(
            async move {
                let request = ExecutionRequest::new("First", ["sleep", "0.1"]);
                e1.execute(&request, Some(s1.as_ref())).await
            },
            async move {
                let request = ExecutionRequest::new("Second", ["exit", "2"]);
                e2.execute(&request, Some(s2.as_ref())).await
            }
        )
    };

    assert!(a.success);
    assert_eq!(a.output, "First completed successfully");
    assert!(!b.success);

    let first = first.updates();
    let second = second.updates();
    assert_single_terminal_last(&first);
    assert_single_terminal_last(&second);
    let first_id = &first[0].operation_id;
    let second_id = &second[0].operation_id;
    assert_ne!(first_id, second_id);
    assert!(first.iter().all(|u| &u.operation_id == first_id));
    assert!(second.iter().all(|u| &u.operation_id == second_id));
}
