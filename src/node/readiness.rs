//! Readiness detection
//!
//! Log lines are classified against the literal markers of a
//! [`ReadinessMarkers`] set. The first of {ready, fatal, exited, timed out}
//! settles a [`ReadinessLatch`]; every later report is ignored.

use super::spec::ReadinessMarkers;
use std::time::Duration;
use tokio::sync::watch;

/// What a single log line tells us
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSignal {
    Ready,
    Fatal,
}

/// Classify a log line. Fatal wins over ready when a line contains both.
pub fn classify_line(line: &str, markers: &ReadinessMarkers) -> Option<LogSignal> {
    let lower = line.to_lowercase();
    if lower.contains(markers.fatal()) {
        Some(LogSignal::Fatal)
    } else if lower.contains(markers.ready()) {
        Some(LogSignal::Ready)
    } else {
        None
    }
}

/// Final result of waiting for a process to come up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessOutcome {
    Ready,
    /// The offending log line
    Fatal(String),
    /// Exit status description
    Exited(String),
    TimedOut(Duration),
}

/// Once-only completion shared by the output scanners, the exit monitor and
/// any number of waiters
#[derive(Debug)]
pub struct ReadinessLatch {
    tx: watch::Sender<Option<ReadinessOutcome>>,
}

impl Default for ReadinessLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessLatch {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Settle the latch. Returns `false` if another outcome got there first.
    pub fn resolve(&self, outcome: ReadinessOutcome) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(outcome);
            true
        })
    }

    /// The winning outcome, if any
    pub fn outcome(&self) -> Option<ReadinessOutcome> {
        self.tx.borrow().clone()
    }

    /// Wait until some outcome wins
    pub async fn settled(&self) -> ReadinessOutcome {
        let mut rx = self.tx.subscribe();
        let settled = match rx.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            // Unreachable while `self` holds the sender
            Err(_) => None,
        };
        settled.unwrap_or_else(|| ReadinessOutcome::Exited("readiness channel closed".to_string()))
    }
}
