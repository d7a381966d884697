#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use std::time::{Duration, Instant};

use chrono::Utc;

use crate::domain::Sample;
use crate::pass::PassResult;

pub const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Phase durations below this are treated as this long, keeping speeds finite.
pub const MIN_PHASE_SECONDS: f64 = 1e-9;

#[allow(clippy::cast_precision_loss)]
pub fn gib_per_second(bytes: u64, elapsed: Duration) -> f64 {
    bytes as f64 / elapsed.as_secs_f64().max(MIN_PHASE_SECONDS) / GIB
}

/// Byte and time counters accumulated over passes.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Totals {
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub write_time: Duration,
    pub read_time: Duration,
    pub loops: u64,
}

impl Totals {
    fn add(&mut self, pass: &PassResult) {
        self.bytes_written += pass.bytes_written;
        self.bytes_read += pass.bytes_read;
        self.write_time += pass.write_time;
        self.read_time += pass.read_time;
        self.loops += 1;
    }

    fn since(&self, earlier: &Totals) -> Totals {
        Totals {
            bytes_written: self.bytes_written - earlier.bytes_written,
            bytes_read: self.bytes_read - earlier.bytes_read,
            write_time: self.write_time.saturating_sub(earlier.write_time),
            read_time: self.read_time.saturating_sub(earlier.read_time),
            loops: self.loops - earlier.loops,
        }
    }

    pub fn write_gbps(&self) -> f64 {
        gib_per_second(self.bytes_written, self.write_time)
    }

    pub fn read_gbps(&self) -> f64 {
        gib_per_second(self.bytes_read, self.read_time)
    }

    /// Combined bytes over combined time, not the mean of the two speeds.
    pub fn total_gbps(&self) -> f64 {
        gib_per_second(
            self.bytes_written + self.bytes_read,
            self.write_time + self.read_time,
        )
    }
}

/// Turns pass results into throttled samples and keeps the running totals
/// the summary is computed from.
#[derive(Debug)]
pub struct Sampler {
    started: Instant,
    budget: Duration,
    interval: Duration,
    allocated_bytes: u64,
    totals: Totals,
    at_last_emit: Totals,
    last_emit: Option<Instant>,
}

impl Sampler {
    pub fn new(started: Instant, budget: Duration, interval: Duration, allocated_bytes: u64) -> Self {
        Self {
            started,
            budget,
            interval,
            allocated_bytes,
            totals: Totals::default(),
            at_last_emit: Totals::default(),
            last_emit: None,
        }
    }

    /// Records `pass` and returns a sample unless one was emitted less than
    /// `interval` before `now`. The first pass always produces one.
    pub fn observe(&mut self, pass: &PassResult, checksum: u32, now: Instant) -> Option<Sample> {
        self.totals.add(pass);
        if let Some(last) = self.last_emit {
            if now.saturating_duration_since(last) < self.interval {
                return None;
            }
        }

        let window = self.totals.since(&self.at_last_emit);
        let elapsed = now.saturating_duration_since(self.started);
        let sample = Sample {
            timestamp: Utc::now(),
            write_gbps: window.write_gbps(),
            read_gbps: window.read_gbps(),
            total_gbps: window.total_gbps(),
            avg_write_gbps: self.totals.write_gbps(),
            avg_read_gbps: self.totals.read_gbps(),
            elapsed_seconds: elapsed.as_secs_f64(),
            remaining_seconds: self.budget.saturating_sub(elapsed).as_secs_f64(),
            loops: self.totals.loops,
            allocated_bytes: self.allocated_bytes,
            checksum,
        };
        self.at_last_emit = self.totals;
        self.last_emit = Some(now);
        Some(sample)
    }

    pub fn totals(&self) -> &Totals {
        &self.totals
    }
}
