#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use anyhow::{Context, Result as AnyResult};
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Opts, Registry, TextEncoder};

use crate::domain::{Sample, SessionSummary};

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,
    pub run_active: IntGauge,
    pub allocated_bytes: IntGauge,
    pub write_gbps: Gauge,
    pub read_gbps: Gauge,
    pub total_gbps: Gauge,
    pub remaining_seconds: Gauge,
    pub passes_total: IntCounter,
    pub runs_total: IntCounter,
    pub runs_failed_total: IntCounter,
}

impl Metrics {
    pub fn new() -> AnyResult<Self> {
        let registry = Registry::new();
        let run_active = IntGauge::with_opts(Opts::new(
            "memspeed_run_active",
            "1 if a run holds memory",
        ))
        .context("create run_active")?;
        let allocated_bytes = IntGauge::with_opts(Opts::new(
            "memspeed_allocated_bytes",
            "bytes held by the working set",
        ))
        .context("create allocated_bytes")?;
        let write_gbps = Gauge::with_opts(Opts::new("memspeed_write_gbps", "latest write GiB/s"))
            .context("create write_gbps")?;
        let read_gbps = Gauge::with_opts(Opts::new("memspeed_read_gbps", "latest read GiB/s"))
            .context("create read_gbps")?;
        let total_gbps = Gauge::with_opts(Opts::new("memspeed_total_gbps", "latest total GiB/s"))
            .context("create total_gbps")?;
        let remaining_seconds = Gauge::with_opts(Opts::new(
            "memspeed_remaining_seconds",
            "seconds left in the run",
        ))
        .context("create remaining_seconds")?;
        let passes_total =
            IntCounter::with_opts(Opts::new("memspeed_passes_total", "completed passes"))
                .context("create passes_total")?;
        let runs_total = IntCounter::with_opts(Opts::new("memspeed_runs_total", "started runs"))
            .context("create runs_total")?;
        let runs_failed_total =
            IntCounter::with_opts(Opts::new("memspeed_runs_failed_total", "failed runs"))
                .context("create runs_failed_total")?;

        registry
            .register(Box::new(run_active.clone()))
            .context("register run_active")?;
        registry
            .register(Box::new(allocated_bytes.clone()))
            .context("register allocated_bytes")?;
        registry
            .register(Box::new(write_gbps.clone()))
            .context("register write_gbps")?;
        registry
            .register(Box::new(read_gbps.clone()))
            .context("register read_gbps")?;
        registry
            .register(Box::new(total_gbps.clone()))
            .context("register total_gbps")?;
        registry
            .register(Box::new(remaining_seconds.clone()))
            .context("register remaining_seconds")?;
        registry
            .register(Box::new(passes_total.clone()))
            .context("register passes_total")?;
        registry
            .register(Box::new(runs_total.clone()))
            .context("register runs_total")?;
        registry
            .register(Box::new(runs_failed_total.clone()))
            .context("register runs_failed_total")?;
        Ok(Self {
            registry,
            run_active,
            allocated_bytes,
            write_gbps,
            read_gbps,
            total_gbps,
            remaining_seconds,
            passes_total,
            runs_total,
            runs_failed_total,
        })
    }

    pub fn mark_run_started(&self) {
        self.runs_total.inc();
        self.run_active.set(1);
    }

    pub fn mark_allocated(&self, bytes: u64) {
        self.allocated_bytes.set(i64::try_from(bytes).unwrap_or(i64::MAX));
    }

    /// `passes` is how many passes the sample covers beyond the previous one.
    pub fn record_sample(&self, sample: &Sample, passes: u64) {
        self.write_gbps.set(sample.write_gbps);
        self.read_gbps.set(sample.read_gbps);
        self.total_gbps.set(sample.total_gbps);
        self.remaining_seconds.set(sample.remaining_seconds);
        self.passes_total.inc_by(passes);
    }

    pub fn record_summary(&self, summary: &SessionSummary) {
        self.write_gbps.set(summary.average_write_gbps);
        self.read_gbps.set(summary.average_read_gbps);
        self.total_gbps.set(summary.average_total_gbps);
    }

    pub fn mark_run_finished(&self, failed: bool) {
        if failed {
            self.runs_failed_total.inc();
        }
        self.run_active.set(0);
        self.allocated_bytes.set(0);
        self.remaining_seconds.set(0.0);
    }

    pub fn encode_text(&self) -> AnyResult<Vec<u8>> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf).context("encode metrics")?;
        Ok(buf)
    }
}
