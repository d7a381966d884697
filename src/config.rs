#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use std::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::growth::{GrowthPolicy, MIB};

/// Listen address for `serve` when neither `--bind` nor `MEMSPEED_BIND` is set.
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";

/// Tuning shared by every run the agent starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub growth: GrowthPolicy,
    pub sample_interval_ms: u64,
    /// Left free for the OS when the ceiling is derived from system memory.
    pub reserve_bytes: u64,
    /// Fixed ceiling; skips the system-memory probe when set.
    pub ceiling_bytes: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            growth: GrowthPolicy::default(),
            sample_interval_ms: 200,
            reserve_bytes: 128 * MIB as u64,
            ceiling_bytes: None,
        }
    }
}

impl EngineConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

#[derive(Args, Clone, Debug)]
pub struct EngineArgs {
    /// Memory left to the OS when sizing the working set, in MiB.
    #[arg(long, env = "MEMSPEED_RESERVE_MIB", default_value_t = 128)]
    pub reserve_mib: u64,

    /// Fixed working-set ceiling in MiB instead of "near all memory".
    #[arg(long, env = "MEMSPEED_CEILING_MIB")]
    pub ceiling_mib: Option<u64>,

    #[arg(long, env = "MEMSPEED_INITIAL_CHUNK_MIB", default_value_t = 256)]
    pub initial_chunk_mib: usize,

    #[arg(long, env = "MEMSPEED_MIN_CHUNK_MIB", default_value_t = 16)]
    pub min_chunk_mib: usize,

    #[arg(long, env = "MEMSPEED_MAX_ATTEMPTS", default_value_t = 4096)]
    pub max_attempts: u32,

    /// Minimum gap between live samples.
    #[arg(long, env = "MEMSPEED_SAMPLE_INTERVAL_MS", default_value_t = 200)]
    pub sample_interval_ms: u64,
}

impl From<EngineArgs> for EngineConfig {
    fn from(args: EngineArgs) -> Self {
        let mib = MIB as u64;
        Self {
            growth: GrowthPolicy {
                initial_chunk: args.initial_chunk_mib.saturating_mul(MIB),
                min_chunk: args.min_chunk_mib.saturating_mul(MIB),
                max_attempts: args.max_attempts,
            },
            sample_interval_ms: args.sample_interval_ms,
            reserve_bytes: args.reserve_mib.saturating_mul(mib),
            ceiling_bytes: args.ceiling_mib.map(|m| m.saturating_mul(mib)),
        }
    }
}
