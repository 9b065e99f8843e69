//! # Sync Job State Machine
//!
//! One [`SyncJobState`] per configured source, with validated transitions.
//!
//! ## State Machine
//!
//! ```text
//!         start               stream task ends
//! Idle ─────────→ Running ───────────────────────→ Idle
//!   ↑                │
//!   │                ├──→ Completed ─┐
//!   │                ├──→ Failed ────┤ stream task ends
//!   │                └──→ Cancelled ─┤
//!   └────────────────────────────────┘
//! ```
//!
//! A terminal state can also be left by a fresh `start` before the previous
//! stream task has wound down.

use crate::payload::ProgressFrame;
use crate::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Identifier minted for every `start` of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncRunId(Uuid);

impl SyncRunId {
    /// Create a new random run ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SyncRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SyncRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Status Types
// ============================================================================

/// The current status of a source's sync job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// No stream task is running
    #[default]
    Idle,
    /// A local stream is open and applying frames
    Running,
    /// The stream reported 100%
    Completed,
    /// The stream reported an error or could not be opened
    Failed,
    /// The stream was aborted locally
    Cancelled,
}

impl SyncStatus {
    /// Check if this status represents a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncStatus::Completed | SyncStatus::Failed | SyncStatus::Cancelled
        )
    }

    /// Check if this status represents an active state
    pub fn is_active(&self) -> bool {
        matches!(self, SyncStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Running => "running",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
            SyncStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(SyncStatus::Idle),
            "running" => Ok(SyncStatus::Running),
            "completed" => Ok(SyncStatus::Completed),
            "failed" => Ok(SyncStatus::Failed),
            "cancelled" => Ok(SyncStatus::Cancelled),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// How the last run of a source ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub run_id: SyncRunId,
    /// Terminal status reached by the run
    pub status: SyncStatus,
    /// Status text at the time the run ended
    pub message: String,
    pub new_items: u64,
    pub finished_at: DateTime<Utc>,
}

/// What applying one progress frame did to the job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEffect {
    Progress,
    Completed { new_items: u64 },
    Failed { message: String },
}

// ============================================================================
// Job State
// ============================================================================

/// Sync state of one configured source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJobState {
    pub source_id: String,
    pub status: SyncStatus,
    /// Run whose frames may currently update this job
    pub run_id: Option<SyncRunId>,
    /// Latest progress percentage (0-100)
    pub percent: u8,
    /// Latest human-readable status line
    pub status_text: String,
    pub current_item: Option<String>,
    /// Running count of new items
    pub new_items: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<SyncOutcome>,
}

impl SyncJobState {
    /// Create an idle job for `source_id`
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            status: SyncStatus::Idle,
            run_id: None,
            percent: 0,
            status_text: String::new(),
            current_item: None,
            new_items: 0,
            started_at: None,
            last_outcome: None,
        }
    }

    /// Whether frames from `run_id` may still change this job
    pub fn accepts(&self, run_id: SyncRunId) -> bool {
        self.run_id == Some(run_id) && self.status == SyncStatus::Running
    }

    /// Begin a new run, clearing the previous status text and counters
    ///
    /// # Errors
    ///
    /// Returns an error if the job is already running
    pub fn start(&mut self, run_id: SyncRunId, now: DateTime<Utc>) -> Result<()> {
        self.validate_transition(SyncStatus::Running)?;
        self.status = SyncStatus::Running;
        self.run_id = Some(run_id);
        self.percent = 0;
        self.status_text.clear();
        self.current_item = None;
        self.new_items = 0;
        self.started_at = Some(now);
        Ok(())
    }

    /// Record an intermediate progress frame
    ///
    /// # Errors
    ///
    /// Returns an error if the job is not running
    pub fn record_progress(
        &mut self,
        percent: Option<u8>,
        current_item: Option<String>,
        new_items: Option<u64>,
    ) -> Result<()> {
        if self.status != SyncStatus::Running {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: "record_progress".to_string(),
                reason: "Job must be running to record progress".to_string(),
            });
        }

        if let Some(percent) = percent {
            self.percent = percent.min(100);
        }
        if current_item.is_some() {
            self.current_item = current_item;
        }
        if let Some(new_items) = new_items {
            self.new_items = new_items;
        }
        self.status_text = progress_text(self.percent, self.current_item.as_deref(), self.new_items);
        Ok(())
    }

    /// Mark the run completed
    ///
    /// # Errors
    ///
    /// Returns an error if the job is not running
    pub fn complete(&mut self, new_items: u64, now: DateTime<Utc>) -> Result<()> {
        self.validate_transition(SyncStatus::Completed)?;
        self.status = SyncStatus::Completed;
        self.percent = 100;
        self.new_items = new_items;
        self.status_text = completion_text(new_items);
        self.record_outcome(now);
        Ok(())
    }

    /// Mark the run failed; the error becomes the status text
    ///
    /// # Errors
    ///
    /// Returns an error if the job is not running
    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        self.validate_transition(SyncStatus::Failed)?;
        self.status = SyncStatus::Failed;
        self.status_text = message.into();
        self.record_outcome(now);
        Ok(())
    }

    /// Mark the run cancelled
    ///
    /// # Errors
    ///
    /// Returns an error if the job is not running
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.validate_transition(SyncStatus::Cancelled)?;
        self.status = SyncStatus::Cancelled;
        self.status_text = CANCELLED_TEXT.to_string();
        self.record_outcome(now);
        Ok(())
    }

    /// Return to Idle once the stream task has ended
    ///
    /// A run that closed without a terminal frame keeps its last status text
    /// and records no outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the job is already idle
    pub fn settle(&mut self) -> Result<()> {
        self.validate_transition(SyncStatus::Idle)?;
        self.status = SyncStatus::Idle;
        Ok(())
    }

    /// Apply one decoded frame from the stream of the current run
    ///
    /// # Errors
    ///
    /// Returns an error if the job is not running
    pub fn apply_frame(&mut self, frame: ProgressFrame, now: DateTime<Utc>) -> Result<FrameEffect> {
        if let Some(message) = frame.error {
            self.fail(message.clone(), now)?;
            return Ok(FrameEffect::Failed { message });
        }

        if frame.complete {
            let new_items = frame.new_items.unwrap_or(self.new_items);
            if frame.current_item.is_some() {
                self.current_item = frame.current_item;
            }
            self.complete(new_items, now)?;
            return Ok(FrameEffect::Completed { new_items });
        }

        self.record_progress(frame.progress, frame.current_item, frame.new_items)?;
        Ok(FrameEffect::Progress)
    }

    fn record_outcome(&mut self, now: DateTime<Utc>) {
        if let Some(run_id) = self.run_id {
            self.last_outcome = Some(SyncOutcome {
                run_id,
                status: self.status,
                message: self.status_text.clone(),
                new_items: self.new_items,
                finished_at: now,
            });
        }
    }

    /// Validate a state transition
    fn validate_transition(&self, to: SyncStatus) -> Result<()> {
        let valid = match (self.status, to) {
            // Starting from anything but a live run
            (SyncStatus::Running, SyncStatus::Running) => false,
            (_, SyncStatus::Running) => true,

            // From Running
            (SyncStatus::Running, SyncStatus::Completed) => true,
            (SyncStatus::Running, SyncStatus::Failed) => true,
            (SyncStatus::Running, SyncStatus::Cancelled) => true,

            // Stream task ended
            (SyncStatus::Idle, SyncStatus::Idle) => false,
            (_, SyncStatus::Idle) => true,

            // Terminal states only settle or restart
            _ => false,
        };

        if !valid {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!(
                    "Cannot transition from {} to {}",
                    self.status.as_str(),
                    to.as_str()
                ),
            });
        }

        Ok(())
    }
}

pub const CANCELLED_TEXT: &str = "Sync cancelled";

fn progress_text(percent: u8, current_item: Option<&str>, new_items: u64) -> String {
    match current_item {
        Some(item) if !item.is_empty() => {
            format!("Syncing {}%: {} ({} new)", percent, item, new_items)
        }
        _ => format!("Syncing {}% ({} new)", percent, new_items),
    }
}

fn completion_text(new_items: u64) -> String {
    match new_items {
        1 => "Sync complete: 1 new item".to_string(),
        n => format!("Sync complete: {} new items", n),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn running() -> (SyncJobState, SyncRunId) {
        let mut job = SyncJobState::new("chub");
        let run_id = SyncRunId::new();
        job.start(run_id, now()).unwrap();
        (job, run_id)
    }

    #[test]
    fn test_run_id_new() {
        assert_ne!(SyncRunId::new(), SyncRunId::new());
    }

    #[test]
    fn test_sync_status_is_terminal() {
        assert!(!SyncStatus::Idle.is_terminal());
        assert!(!SyncStatus::Running.is_terminal());
        assert!(SyncStatus::Completed.is_terminal());
        assert!(SyncStatus::Failed.is_terminal());
        assert!(SyncStatus::Cancelled.is_terminal());
        assert!(SyncStatus::Running.is_active());
    }

    #[test]
    fn test_sync_status_from_str() {
        assert_eq!("RUNNING".parse::<SyncStatus>().unwrap(), SyncStatus::Running);
        assert!("paused".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn test_start_clears_previous_text() {
        let (mut job, _) = running();
        job.fail("boom", now()).unwrap();
        job.settle().unwrap();
        assert_eq!(job.status_text, "boom");

        job.start(SyncRunId::new(), now()).unwrap();
        assert_eq!(job.status, SyncStatus::Running);
        assert!(job.status_text.is_empty());
        assert_eq!(job.new_items, 0);
    }

    #[test]
    fn test_cannot_start_twice() {
        let (mut job, _) = running();
        let err = job.start(SyncRunId::new(), now()).unwrap_err();
        assert!(matches!(err, SyncError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_progress_line_combines_fields() {
        let (mut job, _) = running();
        job.record_progress(Some(10), Some("X".into()), Some(0)).unwrap();
        assert_eq!(job.status_text, "Syncing 10%: X (0 new)");

        job.record_progress(Some(40), None, Some(2)).unwrap();
        assert_eq!(job.status_text, "Syncing 40%: X (2 new)");
    }

    #[test]
    fn test_complete_records_outcome() {
        let (mut job, run_id) = running();
        job.complete(4, now()).unwrap();

        assert_eq!(job.status, SyncStatus::Completed);
        assert!(job.status_text.contains("complete"));
        assert!(job.status_text.contains('4'));

        let outcome = job.last_outcome.clone().unwrap();
        assert_eq!(outcome.run_id, run_id);
        assert_eq!(outcome.status, SyncStatus::Completed);
        assert_eq!(outcome.new_items, 4);
        assert_eq!(outcome.finished_at, now());
    }

    #[test]
    fn test_terminal_states_only_settle_or_restart() {
        let (mut job, _) = running();
        job.cancel(now()).unwrap();
        assert_eq!(job.status_text, CANCELLED_TEXT);

        assert!(job.complete(1, now()).is_err());
        assert!(job.fail("late", now()).is_err());
        assert!(job.record_progress(Some(50), None, None).is_err());

        job.settle().unwrap();
        assert_eq!(job.status, SyncStatus::Idle);
        assert!(job.settle().is_err());
    }

    #[test]
    fn test_settle_from_running_keeps_text() {
        let (mut job, _) = running();
        job.record_progress(Some(70), None, Some(3)).unwrap();
        job.settle().unwrap();

        assert_eq!(job.status, SyncStatus::Idle);
        assert_eq!(job.status_text, "Syncing 70% (3 new)");
        assert!(job.last_outcome.is_none());
    }

    #[test]
    fn test_apply_frame_effects() {
        let (mut job, run_id) = running();
        assert!(job.accepts(run_id));
        assert!(!job.accepts(SyncRunId::new()));

        let effect = job
            .apply_frame(
                ProgressFrame {
                    progress: Some(10),
                    current_item: Some("X".into()),
                    new_items: Some(0),
                    ..ProgressFrame::default()
                },
                now(),
            )
            .unwrap();
        assert_eq!(effect, FrameEffect::Progress);

        let effect = job
            .apply_frame(
                ProgressFrame {
                    progress: Some(100),
                    complete: true,
                    new_items: Some(4),
                    ..ProgressFrame::default()
                },
                now(),
            )
            .unwrap();
        assert_eq!(effect, FrameEffect::Completed { new_items: 4 });
        assert!(!job.accepts(run_id));
    }

    #[test]
    fn test_rounded_up_progress_keeps_running() {
        let (mut job, run_id) = running();
        let frame = ProgressFrame::parse(r#"{"progress":99.6,"currentCard":"Last"}"#).unwrap();

        let effect = job.apply_frame(frame, now()).unwrap();

        assert_eq!(effect, FrameEffect::Progress);
        assert_eq!(job.status, SyncStatus::Running);
        assert!(job.accepts(run_id));
        assert!(job.last_outcome.is_none());
    }

    #[test]
    fn test_error_frame_fails_job() {
        let (mut job, _) = running();
        let effect = job
            .apply_frame(
                ProgressFrame {
                    error: Some("rate limited".into()),
                    progress: Some(100),
                    complete: true,
                    ..ProgressFrame::default()
                },
                now(),
            )
            .unwrap();

        assert_eq!(
            effect,
            FrameEffect::Failed {
                message: "rate limited".into()
            }
        );
        assert_eq!(job.status, SyncStatus::Failed);
        assert_eq!(job.status_text, "rate limited");
    }
}
