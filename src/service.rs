#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use anyhow::{bail, Context, Result as AnyResult};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};

use crate::ceiling::{near_full_ceiling, SystemMemory};
use crate::config::EngineConfig;
use crate::domain::{
    RunController, RunStatus, SessionEvent, SessionState, StartRequest, TerminationReason,
};
use crate::metrics::Metrics;
use crate::region::{RegionAllocator, SystemAllocator};
use crate::session::{Session, SessionConfig, SessionControl};
use crate::validation::validate_start;

#[derive(Clone)]
pub struct SpeedTestRunner {
    ctrl: RunController,
    metrics: Metrics,
    config: EngineConfig,
}

impl SpeedTestRunner {
    pub fn new(ctrl: RunController, metrics: Metrics, config: EngineConfig) -> Self {
        Self {
            ctrl,
            metrics,
            config,
        }
    }

    pub fn is_running(&self) -> bool {
        self.ctrl.active.lock().is_some()
    }

    pub fn validate_request(&self, req: &StartRequest) -> AnyResult<SessionConfig> {
        validate_start(req)
    }

    /// Request override, then configured ceiling, then the near-full policy.
    pub fn resolve_ceiling(&self, req: &StartRequest) -> u64 {
        req.ceiling_bytes
            .or(self.config.ceiling_bytes)
            .unwrap_or_else(|| near_full_ceiling(&SystemMemory::probe(), self.config.reserve_bytes))
    }

    pub fn start(&self, req: &StartRequest) -> AnyResult<SessionControl> {
        let session_config = self.validate_request(req)?;
        let ceiling_bytes = self.resolve_ceiling(req);
        let session = Session::new(session_config, ceiling_bytes, &self.config, SystemAllocator)?;
        self.start_session(session, session_config, ceiling_bytes)
    }

    /// Registers `session` as the active run, moves it onto its worker thread
    /// and starts pumping its events into status and metrics.
    pub fn start_session<A: RegionAllocator + Send + 'static>(
        &self,
        session: Session<A>,
        session_config: SessionConfig,
        ceiling_bytes: u64,
    ) -> AnyResult<SessionControl> {
        let control = session.control();
        {
            let mut active = self.ctrl.active.lock();
            if active.is_some() {
                bail!("another run is active");
            }
            *active = Some(control.clone());
        }
        {
            let mut status = self.ctrl.status.lock();
            *status = RunStatus {
                state: SessionState::Allocating,
                running: true,
                requested_minutes: session_config.requested_minutes(),
                ceiling_bytes,
                started_at: Some(Utc::now()),
                ..RunStatus::default()
            };
        }
        self.metrics.mark_run_started();

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<SessionEvent>();
        if let Err(e) = session.spawn(tx) {
            *self.ctrl.active.lock() = None;
            self.ctrl.status.lock().running = false;
            self.metrics.mark_run_finished(true);
            return Err(e).context("spawn worker thread");
        }
        info!(
            ceiling_bytes,
            minutes = session_config.requested_minutes(),
            "run started"
        );
        let runner = self.clone();
        tokio::spawn(async move {
            runner.pump_events(rx).await;
        });
        Ok(control)
    }

    pub async fn pump_events(self, mut rx: UnboundedReceiver<SessionEvent>) {
        while let Some(event) = rx.recv().await {
            self.apply(event);
        }
        // worker gone without a terminal event
        if self.ctrl.active.lock().take().is_some() {
            warn!("worker exited without a terminal event");
            self.ctrl.status.lock().running = false;
            self.metrics.mark_run_finished(true);
        }
    }

    pub fn apply(&self, event: SessionEvent) {
        let mut status = self.ctrl.status.lock();
        match event {
            SessionEvent::Allocated {
                bytes,
                regions,
                outcome,
            } => {
                info!(bytes, regions, outcome = %outcome, "working set allocated");
                status.allocated_bytes = bytes;
                status.state = SessionState::Running;
                self.metrics.mark_allocated(bytes);
            }
            SessionEvent::Sample(sample) => {
                let seen = status.last_sample.as_ref().map_or(0, |s| s.loops);
                self.metrics
                    .record_sample(&sample, sample.loops.saturating_sub(seen));
                status.last_sample = Some(sample);
            }
            SessionEvent::Finished(summary) => {
                let seen = status.last_sample.as_ref().map_or(0, |s| s.loops);
                self.metrics
                    .passes_total
                    .inc_by(summary.loops.saturating_sub(seen));
                self.metrics.record_summary(&summary);
                self.metrics.mark_run_finished(false);
                status.state = match summary.reason {
                    TerminationReason::Completed => SessionState::Completed,
                    TerminationReason::Aborted => SessionState::Aborted,
                };
                status.running = false;
                status.allocated_bytes = 0;
                status.last_summary = Some(summary);
                *self.ctrl.active.lock() = None;
            }
            SessionEvent::Failed(notice) => {
                error!(kind = ?notice.kind, reason = %notice.reason, "run failed");
                self.metrics.mark_run_finished(true);
                status.state = SessionState::Failed;
                status.running = false;
                status.allocated_bytes = 0;
                status.last_failure = Some(notice);
                *self.ctrl.active.lock() = None;
            }
        }
    }

    /// True when a running session accepted the request.
    pub fn stop(&self) -> bool {
        self.ctrl
            .active
            .lock()
            .as_ref()
            .is_some_and(SessionControl::request_stop)
    }

    pub fn status(&self) -> RunStatus {
        let mut status = self.ctrl.status.lock().clone();
        if let Some(control) = self.ctrl.active.lock().as_ref() {
            // the worker drops back to Idle before its terminal event is applied
            let live = control.state();
            if live != SessionState::Idle {
                status.state = live;
            }
        }
        status.system_memory_used_percent = SystemMemory::probe().used_percent();
        status
    }

    pub fn encode_metrics(&self) -> AnyResult<Vec<u8>> {
        self.metrics.encode_text()
    }

    pub fn health(&self) -> HealthReport {
        let running = self.is_running();
        let metrics_ok = self.metrics.encode_text().is_ok();
        let registry_metrics = self.metrics.registry.gather().len();
        let memory = SystemMemory::probe();
        HealthReport {
            status: if metrics_ok { "ok" } else { "degraded" }.to_string(),
            running,
            metrics_ok,
            registry_metrics,
            system_memory_used_percent: memory.used_percent(),
            system_memory: memory,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
    pub status: String,
    pub running: bool,
    pub metrics_ok: bool,
    pub registry_metrics: usize,
    pub system_memory: SystemMemory,
    pub system_memory_used_percent: f64,
}
