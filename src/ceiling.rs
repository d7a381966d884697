#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use serde::Serialize;
use sysinfo::System;

use crate::growth::MIB;

const FLOOR_BYTES: u64 = 256 * MIB as u64;
const AVAILABLE_SLACK_BYTES: u64 = 64 * MIB as u64;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SystemMemory {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl SystemMemory {
    pub fn probe() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        Self {
            total_bytes: sys.total_memory(),
            available_bytes: sys.available_memory(),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn used_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        let used = self.total_bytes.saturating_sub(self.available_bytes);
        used as f64 / self.total_bytes as f64 * 100.0
    }
}

/// "Near 100%" target: everything but `reserve_bytes`, bounded by what is
/// actually available minus a little slack, never below 256 MiB. An unknown
/// total falls back to 1 GiB.
pub fn near_full_ceiling(mem: &SystemMemory, reserve_bytes: u64) -> u64 {
    if mem.total_bytes == 0 {
        return 1024 * MIB as u64;
    }
    let target = mem.total_bytes.saturating_sub(reserve_bytes).max(FLOOR_BYTES);
    let bounded = if mem.available_bytes > 0 {
        target.min(
            mem.available_bytes
                .saturating_sub(AVAILABLE_SLACK_BYTES)
                .max(FLOOR_BYTES),
        )
    } else {
        target
    };
    bounded.max(FLOOR_BYTES)
}
