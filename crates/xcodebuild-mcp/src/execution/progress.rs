use super::phase::{LineSignal, PhaseClassifier, PhaseMark};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Running,
    Completed,
    Failed,
}

impl ProgressStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressStatus::Running)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub operation_id: String,
    pub status: ProgressStatus,
    pub progress: u8,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Receives progress updates while a command runs.
///
/// Called on the task that drains process output, so implementations must
/// return quickly.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, update: ProgressUpdate);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn emit(&self, update: ProgressUpdate) {
        self(update)
    }
}

/// Progress state for one execution. Built fresh per call and dropped with it.
pub struct ProgressTracker<'a> {
    operation_id: String,
    label: String,
    sink: Option<&'a dyn ProgressSink>,
    classifier: Option<&'a dyn PhaseClassifier>,
    min_interval: Duration,
    phase: Option<PhaseMark>,
    progress: u8,
    last_emit: Option<Instant>,
    finished: bool,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(
        label: impl Into<String>,
        sink: Option<&'a dyn ProgressSink>,
        classifier: Option<&'a dyn PhaseClassifier>,
        min_interval: Duration,
    ) -> Self {
        Self {
            operation_id: Uuid::new_v4().to_string(),
            label: label.into(),
            sink,
            classifier,
            min_interval,
            phase: None,
            progress: 0,
            last_emit: None,
            finished: false,
        }
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn phase(&self) -> Option<&'static str> {
        self.phase.map(|p| p.name)
    }

    pub fn start(&mut self) {
        let message = format!("Starting {}", self.label);
        self.emit(ProgressStatus::Running, message, None);
    }

    pub fn observe_line(&mut self, line: &str) {
        if self.finished {
            return;
        }

        let signal = self.classifier.and_then(|c| c.classify(line));
        match signal {
            Some(LineSignal::Phase(mark)) if self.phase.map(|p| p.index) != Some(mark.index) => {
                self.phase = Some(mark);
                self.progress = mark.floor;
                let message = format!("{}: {}", self.label, mark.name);
                self.emit(ProgressStatus::Running, message, Some(line.trim().to_string()));
                return;
            }
            Some(LineSignal::Files { completed, total }) => {
                let estimate = (u64::from(completed.min(total)) * 100 / u64::from(total)).min(99) as u8;
                self.progress = self.progress.max(estimate);
            }
            _ => {}
        }

        if self.throttle_elapsed() {
            let message = match self.phase {
                Some(phase) => format!("{}: {} ({}%)", self.label, phase.name, self.progress),
                None => format!("{} running", self.label),
            };
            self.emit(ProgressStatus::Running, message, Some(line.trim().to_string()));
        }
    }

    /// Emits the terminal update. Later calls are ignored.
    pub fn finish(&mut self, success: bool, message: impl Into<String>) {
        if self.finished {
            return;
        }
        let status = if success {
            self.progress = 100;
            ProgressStatus::Completed
        } else {
            ProgressStatus::Failed
        };
        self.emit(status, message.into(), None);
        self.finished = true;
    }

    fn throttle_elapsed(&self) -> bool {
        self.last_emit
            .is_none_or(|last| last.elapsed() >= self.min_interval)
    }

    fn emit(&mut self, status: ProgressStatus, message: String, details: Option<String>) {
        self.last_emit = Some(Instant::now());
        if let Some(sink) = self.sink {
            sink.emit(ProgressUpdate {
                operation_id: self.operation_id.clone(),
                status,
                progress: self.progress,
                message,
                timestamp: Utc::now(),
                details: details.filter(|d| !d.is_empty()),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::phase::XcodebuildPhases;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collector(Mutex<Vec<ProgressUpdate>>);

    impl ProgressSink for Collector {
        fn emit(&self, update: ProgressUpdate) {
            self.0.lock().unwrap().push(update);
        }
    }

    impl Collector {
        fn updates(&self) -> Vec<ProgressUpdate> {
            self.0.lock().unwrap().clone()
        }
    }

    #[test]
    fn test_phase_transitions_bypass_throttle() {
        let sink = Collector::default();
        let classifier = XcodebuildPhases;
        let mut tracker =
            ProgressTracker::new("Build", Some(&sink), Some(&classifier), Duration::from_secs(3600));

        tracker.start();
        tracker.observe_line("note: nothing interesting");
        tracker.observe_line("CompileSwift normal arm64 A.swift");
        tracker.observe_line("CompileSwift normal arm64 B.swift");
        tracker.observe_line("Ld /tmp/App normal");
        tracker.finish(true, "Build succeeded");

        let updates = sink.updates();
        let messages: Vec<&str> = updates.iter().map(|u| u.message.as_str()).collect();
        assert_eq!(
            messages,
            vec!["Starting Build", "Build: Compiling", "Build: Linking", "Build succeeded"]
        );
        assert_eq!(updates.last().unwrap().status, ProgressStatus::Completed);
        assert_eq!(updates.last().unwrap().progress, 100);
        assert!(updates.iter().all(|u| u.operation_id == updates[0].operation_id));
    }

    #[test]
    fn test_file_counts_never_reach_100_before_exit() {
        let classifier = XcodebuildPhases;
        let mut tracker = ProgressTracker::new("Build", None, Some(&classifier), Duration::ZERO);

        tracker.observe_line("Building 10 of 40 files");
        assert_eq!(tracker.progress(), 25);
        tracker.observe_line("Building 5 of 40 files");
        assert_eq!(tracker.progress(), 25);
        tracker.observe_line("Building 40 of 40 files");
        assert_eq!(tracker.progress(), 99);
        tracker.finish(true, "done");
        assert_eq!(tracker.progress(), 100);
    }

    #[test]
    fn test_progress_monotonic_except_phase_reset() {
        let sink = Collector::default();
        let classifier = XcodebuildPhases;
        let mut tracker = ProgressTracker::new("Build", Some(&sink), Some(&classifier), Duration::ZERO);

        let lines = [
            "CompileC a.o",
            "Building 30 of 40 files",
            "CompileC b.o",
            "Ld App",
            "Building 1 of 2 files",
            "Building 2 of 2 files",
        ];
        for line in lines {
            tracker.observe_line(line);
        }
        tracker.finish(true, "done");

        let updates = sink.updates();
        for pair in updates.windows(2) {
            let phase_change = pair[1].message.ends_with("Linking") || pair[1].message.ends_with("Compiling");
            assert!(phase_change || pair[1].progress >= pair[0].progress);
        }
    }

    #[test]
    fn test_failure_keeps_progress_and_is_last() {
        let sink = Collector::default();
        let mut tracker = ProgressTracker::new("Clean", Some(&sink), None, Duration::ZERO);

        tracker.finish(false, "Clean failed");
        tracker.finish(true, "ignored");
        tracker.observe_line("late output");

        let updates = sink.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].status, ProgressStatus::Failed);
        assert_eq!(updates[0].progress, 0);
    }

    #[test]
    fn test_wire_format() {
        let update = ProgressUpdate {
            operation_id: "op".to_string(),
            status: ProgressStatus::Running,
            progress: 10,
            message: "m".to_string(),
            timestamp: Utc::now(),
            details: None,
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["operationId"], "op");
        assert_eq!(json["status"], "running");
        assert!(json.get("details").is_none());
    }
}
