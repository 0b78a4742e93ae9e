// src/summary/progress.rs
//! A bounded log of what the current summary scan is doing, for polling clients.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

/// How many messages are kept.
pub const PROGRESS_CAPACITY: usize = 200;

/// One progress message.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    /// What happened.
    pub message: String,
    /// The plugin concerned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_id: Option<String>,
    /// The file concerned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
}

/// A snapshot of the log.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    /// Whether a scan is in progress.
    pub running: bool,
    /// Oldest first.
    pub entries: Vec<ProgressEntry>,
}

#[derive(Debug, Default)]
struct State {
    running: bool,
    entries: VecDeque<ProgressEntry>,
}

/// The shared progress log. The oldest message is dropped once [`PROGRESS_CAPACITY`] is reached.
#[derive(Debug, Default)]
pub struct ProgressLog {
    state: Mutex<State>,
}

impl ProgressLog {
    /// Clear the log and mark a scan as running.
    pub fn start(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.entries.clear();
        state.running = true;
    }

    /// Mark the scan as done.
    pub fn finish(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .running = false;
    }

    /// Append a message.
    pub fn push(
        &self,
        message: impl Into<String>,
        plugin_id: Option<&str>,
        file_path: Option<&Path>,
    ) {
        let entry = ProgressEntry {
            message: message.into(),
            plugin_id: plugin_id.map(str::to_string),
            file_path: file_path.map(Path::to_path_buf),
        };
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.entries.len() == PROGRESS_CAPACITY {
            state.entries.pop_front();
        }
        state.entries.push_back(entry);
    }

    /// The current state of the log.
    pub fn snapshot(&self) -> Progress {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Progress {
            running: state.running,
            entries: state.entries.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{ProgressLog, PROGRESS_CAPACITY};

    #[test]
    fn keeps_the_latest_messages() {
        let log = ProgressLog::default();
        log.start();
        for i in 0..PROGRESS_CAPACITY + 5 {
            log.push(format!("message {}", i), Some("nginx"), None);
        }

        let progress = log.snapshot();
        assert!(progress.running);
        assert_eq!(progress.entries.len(), PROGRESS_CAPACITY);
        assert_eq!(progress.entries[0].message, "message 5");
        assert_eq!(
            progress.entries.last().map(|entry| entry.message.as_str()),
            Some("message 204")
        );
    }

    #[test]
    fn start_clears_and_finish_stops() {
        let log = ProgressLog::default();
        log.push("old", None, Some(Path::new("/var/log/syslog")));
        log.start();
        assert!(log.snapshot().entries.is_empty());
        log.finish();
        assert!(!log.snapshot().running);
    }
}
