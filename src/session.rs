#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::domain::{
    AllocationOutcome, FailureKind, FailureNotice, SessionEvent, SessionState, SessionSummary,
    TerminationReason,
};
use crate::error::{EngineError, EngineResult};
use crate::growth::{grow, GrowthPolicy};
use crate::pass::{fold_checksum, run_pass};
use crate::region::{RegionAllocator, WorkingSet};
use crate::sampler::Sampler;

/// Requested run length. Fixed once the run starts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionConfig {
    requested_minutes: f64,
    duration: Duration,
}

impl SessionConfig {
    pub fn from_minutes(minutes: f64) -> EngineResult<Self> {
        if !minutes.is_finite() || minutes <= 0.0 {
            return Err(EngineError::InvalidConfiguration(format!(
                "duration must be a positive number of minutes, got {minutes}"
            )));
        }
        let duration = Duration::try_from_secs_f64(minutes * 60.0)
            .map_err(|e| EngineError::InvalidConfiguration(format!("duration out of range: {e}")))?;
        Ok(Self {
            requested_minutes: minutes,
            duration,
        })
    }

    pub fn requested_minutes(&self) -> f64 {
        self.requested_minutes
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

/// Receiver of session events. Delivery must not block the worker for long.
pub trait EventSink {
    fn emit(&mut self, event: SessionEvent);
}

impl EventSink for Vec<SessionEvent> {
    fn emit(&mut self, event: SessionEvent) {
        self.push(event);
    }
}

impl EventSink for tokio::sync::mpsc::UnboundedSender<SessionEvent> {
    fn emit(&mut self, event: SessionEvent) {
        if self.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }
}

#[derive(Debug, Default)]
struct ControlInner {
    state: Mutex<SessionState>,
    stop: AtomicBool,
    last_pass_nanos: AtomicU64,
    passes: AtomicU64,
}

/// What an operator interrupt (Ctrl-C) should do at the current state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterruptAction {
    /// Running: the stop flag is set and the current pass finishes.
    StopAfterPass,
    /// Not running yet: nothing to finish, leave immediately.
    Exit,
    /// Already winding down.
    Ignore,
}

/// Handle shared between the worker and whoever drives it.
#[derive(Clone, Debug, Default)]
pub struct SessionControl {
    inner: Arc<ControlInner>,
}

impl SessionControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Asks a running session to stop after its current pass. Returns whether
    /// the request was taken; outside `Running` it does nothing.
    pub fn request_stop(&self) -> bool {
        let state = self.inner.state.lock();
        if *state == SessionState::Running {
            self.inner.stop.store(true, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    /// Maps an interrupt onto the lifecycle. Passes are never cut short, but
    /// growth towards the ceiling has no safe point to wait for.
    pub fn on_interrupt(&self) -> InterruptAction {
        if self.request_stop() {
            return InterruptAction::StopAfterPass;
        }
        match self.state() {
            SessionState::Idle | SessionState::Allocating => InterruptAction::Exit,
            SessionState::Running => InterruptAction::StopAfterPass,
            SessionState::Completed | SessionState::Aborted | SessionState::Failed => {
                InterruptAction::Ignore
            }
        }
    }

    /// Passes finished so far in the current run.
    pub fn passes_completed(&self) -> u64 {
        self.inner.passes.load(Ordering::SeqCst)
    }

    pub fn stop_requested(&self) -> bool {
        self.inner.stop.load(Ordering::SeqCst)
    }

    /// Upper bound on how long a stop request takes to be honoured: one full
    /// pass over the working set. `None` until the first pass finishes.
    pub fn expected_stop_latency(&self) -> Option<Duration> {
        match self.inner.last_pass_nanos.load(Ordering::Relaxed) {
            0 => None,
            nanos => Some(Duration::from_nanos(nanos)),
        }
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.inner.state.lock();
        let prev = *state;
        debug!(from = %prev, to = %next, "session state");
        *state = next;
    }

    fn enter_running(&self) {
        let mut state = self.inner.state.lock();
        self.inner.stop.store(false, Ordering::SeqCst);
        self.inner.passes.store(0, Ordering::SeqCst);
        *state = SessionState::Running;
    }

    fn record_pass(&self, took: Duration) {
        let nanos = u64::try_from(took.as_nanos()).unwrap_or(u64::MAX).max(1);
        self.inner.last_pass_nanos.store(nanos, Ordering::Relaxed);
        self.inner.passes.fetch_add(1, Ordering::SeqCst);
    }
}

/// One allocate/run/cleanup cycle.
pub struct Session<A> {
    config: SessionConfig,
    ceiling_bytes: u64,
    policy: GrowthPolicy,
    sample_interval: Duration,
    allocator: A,
    control: SessionControl,
}

impl<A: RegionAllocator> Session<A> {
    pub fn new(
        config: SessionConfig,
        ceiling_bytes: u64,
        engine: &EngineConfig,
        allocator: A,
    ) -> EngineResult<Self> {
        engine.growth.validate()?;
        Ok(Self {
            config,
            ceiling_bytes,
            policy: engine.growth,
            sample_interval: engine.sample_interval(),
            allocator,
            control: SessionControl::new(),
        })
    }

    pub fn control(&self) -> SessionControl {
        self.control.clone()
    }

    /// Runs to completion on the calling thread. Every exit path releases the
    /// working set before the terminal event is emitted.
    pub fn run<S: EventSink + ?Sized>(self, sink: &mut S) -> EngineResult<SessionSummary> {
        let Session {
            config,
            ceiling_bytes,
            policy,
            sample_interval,
            mut allocator,
            control,
        } = self;
        let started_at = Utc::now();

        control.set_state(SessionState::Allocating);
        info!(
            ceiling_bytes,
            minutes = config.requested_minutes(),
            "allocating working set"
        );
        let growth = grow(ceiling_bytes, WorkingSet::new(), &policy, &mut allocator);
        if growth.outcome == AllocationOutcome::Failed {
            drop(growth.working_set);
            let err = EngineError::AllocationExhausted { ceiling_bytes };
            error!(error = %err, attempts = growth.attempts, "session failed");
            control.set_state(SessionState::Failed);
            sink.emit(SessionEvent::Failed(FailureNotice {
                kind: FailureKind::AllocationExhausted,
                reason: err.to_string(),
                allocated_bytes: 0,
                loops: 0,
                started_at,
                ended_at: Utc::now(),
            }));
            control.set_state(SessionState::Idle);
            return Err(err);
        }

        let allocation = growth.outcome;
        let mut working_set = growth.working_set;
        let allocated_bytes = working_set.total_bytes();
        let regions = working_set.region_count();
        if allocation == AllocationOutcome::Partial {
            warn!(allocated_bytes, ceiling_bytes, "running with partial allocation");
        }
        sink.emit(SessionEvent::Allocated {
            bytes: allocated_bytes,
            regions,
            outcome: allocation,
        });

        control.enter_running();
        let t0 = Instant::now();
        let mut sampler = Sampler::new(t0, config.duration(), sample_interval, allocated_bytes);
        let mut checksum = 1u32;

        let reason = loop {
            let pass = match run_pass(&mut working_set) {
                Ok(pass) => pass,
                Err(err) => {
                    drop(working_set);
                    error!(error = %err, loops = sampler.totals().loops, "pass failed");
                    control.set_state(SessionState::Failed);
                    sink.emit(SessionEvent::Failed(FailureNotice {
                        kind: FailureKind::PassAccessFailure,
                        reason: err.to_string(),
                        allocated_bytes,
                        loops: sampler.totals().loops,
                        started_at,
                        ended_at: Utc::now(),
                    }));
                    control.set_state(SessionState::Idle);
                    return Err(err);
                }
            };
            checksum = fold_checksum(checksum, pass.checksum);
            control.record_pass(pass.duration());

            let now = Instant::now();
            if let Some(sample) = sampler.observe(&pass, checksum, now) {
                debug!(
                    loops = sample.loops,
                    write_gbps = sample.write_gbps,
                    read_gbps = sample.read_gbps,
                    "sample"
                );
                sink.emit(SessionEvent::Sample(sample));
            }

            if now.saturating_duration_since(t0) >= config.duration() {
                break TerminationReason::Completed;
            }
            if control.stop_requested() {
                break TerminationReason::Aborted;
            }
        };
        let elapsed = t0.elapsed();
        drop(working_set);

        control.set_state(match reason {
            TerminationReason::Completed => SessionState::Completed,
            TerminationReason::Aborted => SessionState::Aborted,
        });
        let totals = *sampler.totals();
        let summary = SessionSummary {
            reason,
            allocation,
            allocated_bytes,
            regions,
            requested_seconds: config.duration().as_secs_f64(),
            elapsed_seconds: elapsed.as_secs_f64(),
            loops: totals.loops,
            bytes_written: totals.bytes_written,
            bytes_read: totals.bytes_read,
            write_seconds: totals.write_time.as_secs_f64(),
            read_seconds: totals.read_time.as_secs_f64(),
            average_write_gbps: totals.write_gbps(),
            average_read_gbps: totals.read_gbps(),
            average_total_gbps: totals.total_gbps(),
            checksum,
            started_at,
            ended_at: Utc::now(),
        };
        info!(
            reason = ?summary.reason,
            loops = summary.loops,
            write_gbps = summary.average_write_gbps,
            read_gbps = summary.average_read_gbps,
            total_gbps = summary.average_total_gbps,
            "session finished"
        );
        sink.emit(SessionEvent::Finished(summary.clone()));
        control.set_state(SessionState::Idle);
        Ok(summary)
    }
}

impl<A: RegionAllocator + Send + 'static> Session<A> {
    /// Moves the session onto its own named worker thread.
    pub fn spawn<S: EventSink + Send + 'static>(
        self,
        mut sink: S,
    ) -> std::io::Result<JoinHandle<EngineResult<SessionSummary>>> {
        std::thread::Builder::new()
            .name("memspeed-worker".into())
            .spawn(move || self.run(&mut sink))
    }
}
