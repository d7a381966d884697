#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::AllocationOutcome;
use crate::error::{EngineError, EngineResult};
use crate::region::{MemoryRegion, RegionAllocator, WorkingSet};

pub const MIB: usize = 1024 * 1024;

/// Written over every freshly acquired region so its pages are resident
/// before the first timed pass.
pub const COMMIT_PATTERN: u8 = 0xAA;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrowthPolicy {
    pub initial_chunk: usize,
    pub min_chunk: usize,
    pub max_attempts: u32,
}

impl Default for GrowthPolicy {
    fn default() -> Self {
        Self {
            initial_chunk: 256 * MIB,
            min_chunk: 16 * MIB,
            max_attempts: 4096,
        }
    }
}

impl GrowthPolicy {
    pub fn validate(&self) -> EngineResult<()> {
        if self.min_chunk == 0 {
            return Err(EngineError::InvalidPolicy("min_chunk must be > 0".into()));
        }
        if self.initial_chunk < self.min_chunk {
            return Err(EngineError::InvalidPolicy(
                "initial_chunk must be >= min_chunk".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(EngineError::InvalidPolicy("max_attempts must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Growth {
    pub working_set: WorkingSet,
    pub outcome: AllocationOutcome,
    pub attempts: u32,
}

/// Extends `working_set` towards `ceiling_bytes`.
///
/// Chunks start at `policy.initial_chunk` and halve on every refusal. Growth
/// stops when the ceiling is met, when a request no larger than
/// `policy.min_chunk` is refused, or after `policy.max_attempts` requests.
/// Regions are committed with [`COMMIT_PATTERN`] before being appended, and
/// the held total never exceeds the ceiling.
pub fn grow<A: RegionAllocator + ?Sized>(
    ceiling_bytes: u64,
    mut working_set: WorkingSet,
    policy: &GrowthPolicy,
    allocator: &mut A,
) -> Growth {
    let mut chunk = policy.initial_chunk.max(policy.min_chunk).max(1);
    let mut attempts = 0u32;

    while working_set.total_bytes() < ceiling_bytes && attempts < policy.max_attempts {
        let remaining = ceiling_bytes - working_set.total_bytes();
        let request = usize::try_from(remaining).map_or(chunk, |r| r.min(chunk));
        attempts += 1;

        if let Some(mut buf) = allocator.try_reserve(request) {
            buf.resize(request, COMMIT_PATTERN);
            working_set.push(MemoryRegion::from_committed(buf));
            debug!(
                request,
                held = working_set.total_bytes(),
                regions = working_set.region_count(),
                "region acquired"
            );
            continue;
        }

        if request <= policy.min_chunk {
            warn!(request, attempts, "minimum chunk refused, growth stops");
            break;
        }
        chunk = (request / 2).max(policy.min_chunk);
        debug!(request, next_chunk = chunk, "request refused, shrinking chunk");
    }

    let outcome = if working_set.is_empty() {
        AllocationOutcome::Failed
    } else if working_set.total_bytes() >= ceiling_bytes {
        AllocationOutcome::Full
    } else {
        AllocationOutcome::Partial
    };
    info!(
        ceiling_bytes,
        held = working_set.total_bytes(),
        regions = working_set.region_count(),
        attempts,
        outcome = %outcome,
        "growth finished"
    );
    Growth {
        working_set,
        outcome,
        attempts,
    }
}
