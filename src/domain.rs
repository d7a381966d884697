#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::session::SessionControl;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationOutcome {
    Full,
    Partial,
    Failed,
}

impl std::fmt::Display for AllocationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllocationOutcome::Full => f.write_str("FULL"),
            AllocationOutcome::Partial => f.write_str("PARTIAL"),
            AllocationOutcome::Failed => f.write_str("FAILED"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    #[default]
    Idle,
    Allocating,
    Running,
    Completed,
    Aborted,
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Idle => "IDLE",
            SessionState::Allocating => "ALLOCATING",
            SessionState::Running => "RUNNING",
            SessionState::Completed => "COMPLETED",
            SessionState::Aborted => "ABORTED",
            SessionState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminationReason {
    Completed,
    Aborted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    AllocationExhausted,
    PassAccessFailure,
}

/// Live observation pushed while a run is in progress. Speeds are GiB/s;
/// the `write/read/total` triple covers the window since the previous sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub write_gbps: f64,
    pub read_gbps: f64,
    pub total_gbps: f64,
    pub avg_write_gbps: f64,
    pub avg_read_gbps: f64,
    pub elapsed_seconds: f64,
    pub remaining_seconds: f64,
    pub loops: u64,
    pub allocated_bytes: u64,
    pub checksum: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub reason: TerminationReason,
    pub allocation: AllocationOutcome,
    pub allocated_bytes: u64,
    pub regions: usize,
    pub requested_seconds: f64,
    pub elapsed_seconds: f64,
    pub loops: u64,
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub write_seconds: f64,
    pub read_seconds: f64,
    pub average_write_gbps: f64,
    pub average_read_gbps: f64,
    pub average_total_gbps: f64,
    pub checksum: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailureNotice {
    pub kind: FailureKind,
    pub reason: String,
    pub allocated_bytes: u64,
    pub loops: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// Everything the worker tells the outside world, in order. A run ends with
/// exactly one `Finished` or `Failed`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionEvent {
    Allocated {
        bytes: u64,
        regions: usize,
        outcome: AllocationOutcome,
    },
    Sample(Sample),
    Finished(SessionSummary),
    Failed(FailureNotice),
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::Finished(_) | SessionEvent::Failed(_))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StartRequest {
    pub duration_minutes: f64,
    #[serde(default)]
    pub ceiling_bytes: Option<u64>,
}

/// Snapshot served by the status endpoint.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunStatus {
    pub state: SessionState,
    pub running: bool,
    pub requested_minutes: f64,
    pub ceiling_bytes: u64,
    pub allocated_bytes: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_sample: Option<Sample>,
    pub last_summary: Option<SessionSummary>,
    pub last_failure: Option<FailureNotice>,
    /// Host-wide figure at the time of the request, not just this run.
    #[serde(default)]
    pub system_memory_used_percent: f64,
}

/// Shared between the control plane and the event pump of the active run.
#[derive(Clone, Default)]
pub struct RunController {
    pub status: Arc<Mutex<RunStatus>>,
    pub active: Arc<Mutex<Option<SessionControl>>>,
}

#[derive(Clone)]
pub struct AppState {
    pub ctrl: RunController,
    pub metrics: crate::metrics::Metrics,
    pub config: crate::config::EngineConfig,
}
