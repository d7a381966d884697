#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use memspeed_agent::domain::AllocationOutcome;
use memspeed_agent::error::EngineError;
use memspeed_agent::growth::{grow, GrowthPolicy, COMMIT_PATTERN, MIB};
use memspeed_agent::region::{LimitedAllocator, RegionAllocator, WorkingSet};

fn policy(initial_mib: usize, min_mib: usize) -> GrowthPolicy {
    GrowthPolicy {
        initial_chunk: initial_mib * MIB,
        min_chunk: min_mib * MIB,
        max_attempts: 64,
    }
}

#[test]
fn reaches_ceiling() {
    let mut alloc = LimitedAllocator::new(u64::MAX, usize::MAX);
    let g = grow(8 * MIB as u64, WorkingSet::new(), &policy(4, 1), &mut alloc);
    assert_eq!(g.outcome, AllocationOutcome::Full);
    assert_eq!(g.working_set.total_bytes(), 8 * MIB as u64);
    assert_eq!(g.working_set.region_count(), 2);
}

#[test]
fn never_exceeds_odd_ceiling() {
    let ceiling = 5 * MIB as u64 + 123;
    let mut alloc = LimitedAllocator::new(u64::MAX, usize::MAX);
    let g = grow(ceiling, WorkingSet::new(), &policy(2, 1), &mut alloc);
    assert_eq!(g.outcome, AllocationOutcome::Full);
    assert_eq!(g.working_set.total_bytes(), ceiling);
    let sum: u64 = g.working_set.regions().iter().map(|r| r.len() as u64).sum();
    assert_eq!(sum, ceiling);
}

#[test]
fn stops_partial_when_budget_runs_out() {
    let mut alloc = LimitedAllocator::new(6 * MIB as u64, usize::MAX);
    let g = grow(10 * MIB as u64, WorkingSet::new(), &policy(4, 1), &mut alloc);
    assert_eq!(g.outcome, AllocationOutcome::Partial);
    assert_eq!(g.working_set.total_bytes(), 6 * MIB as u64);
    assert!(g.working_set.total_bytes() <= 10 * MIB as u64);
}

#[test]
fn halves_chunk_after_refusal() {
    let mut alloc = LimitedAllocator::new(u64::MAX, MIB);
    let g = grow(4 * MIB as u64, WorkingSet::new(), &policy(8, 1), &mut alloc);
    assert_eq!(g.outcome, AllocationOutcome::Full);
    assert_eq!(g.working_set.region_count(), 4);
    assert!(g.working_set.regions().iter().all(|r| r.len() == MIB));
    // 4 MiB then 2 MiB refused before 1 MiB requests succeed
    assert_eq!(alloc.attempts, 2 + 4);
}

#[test]
fn zero_ceiling_fails() {
    let mut alloc = LimitedAllocator::new(u64::MAX, usize::MAX);
    let g = grow(0, WorkingSet::new(), &policy(4, 1), &mut alloc);
    assert_eq!(g.outcome, AllocationOutcome::Failed);
    assert!(g.working_set.is_empty());
    assert_eq!(g.attempts, 0);
}

#[test]
fn nothing_available_fails() {
    let mut alloc = LimitedAllocator::new(0, usize::MAX);
    let g = grow(8 * MIB as u64, WorkingSet::new(), &policy(4, 1), &mut alloc);
    assert_eq!(g.outcome, AllocationOutcome::Failed);
    assert!(g.working_set.is_empty());
    // 4, 2, 1 MiB tried once each
    assert_eq!(g.attempts, 3);
}

#[test]
fn attempt_cap_bounds_growth() {
    let mut alloc = LimitedAllocator::new(u64::MAX, usize::MAX);
    let capped = GrowthPolicy {
        max_attempts: 3,
        ..policy(1, 1)
    };
    let g = grow(10 * MIB as u64, WorkingSet::new(), &capped, &mut alloc);
    assert_eq!(g.outcome, AllocationOutcome::Partial);
    assert_eq!(g.working_set.region_count(), 3);
}

#[test]
fn appends_to_existing_set() {
    let mut alloc = LimitedAllocator::new(u64::MAX, usize::MAX);
    let first = grow(2 * MIB as u64, WorkingSet::new(), &policy(1, 1), &mut alloc);
    let second = grow(3 * MIB as u64, first.working_set, &policy(1, 1), &mut alloc);
    assert_eq!(second.outcome, AllocationOutcome::Full);
    assert_eq!(second.working_set.region_count(), 3);
}

#[test]
fn regions_are_committed() {
    let mut alloc = LimitedAllocator::new(u64::MAX, usize::MAX);
    let g = grow(2 * MIB as u64 + 7, WorkingSet::new(), &policy(1, 1), &mut alloc);
    for region in g.working_set.regions() {
        assert!(region.as_slice().iter().all(|b| *b == COMMIT_PATTERN));
    }
}

#[test]
fn policy_validation() {
    assert!(GrowthPolicy::default().validate().is_ok());
    let zero_min = GrowthPolicy {
        min_chunk: 0,
        ..GrowthPolicy::default()
    };
    assert!(matches!(zero_min.validate(), Err(EngineError::InvalidPolicy(_))));
    let inverted = policy(1, 4);
    assert!(matches!(inverted.validate(), Err(EngineError::InvalidPolicy(_))));
    let no_attempts = GrowthPolicy {
        max_attempts: 0,
        ..GrowthPolicy::default()
    };
    assert!(no_attempts.validate().is_err());
}

/// Records every request size and whether it was granted.
struct Recording {
    inner: LimitedAllocator,
    log: Vec<(usize, bool)>,
}

impl RegionAllocator for Recording {
    fn try_reserve(&mut self, len: usize) -> Option<Vec<u8>> {
        let got = self.inner.try_reserve(len);
        self.log.push((len, got.is_some()));
        got
    }
}

#[test]
fn refused_request_is_never_repeated() {
    let mut alloc = Recording {
        inner: LimitedAllocator::new(2 * MIB as u64, usize::MAX),
        log: Vec::new(),
    };
    let g = grow(3 * MIB as u64, WorkingSet::new(), &policy(256, 1), &mut alloc);
    assert_eq!(g.outcome, AllocationOutcome::Partial);
    assert_eq!(g.working_set.total_bytes(), (MIB + MIB / 2) as u64);
    let sizes: Vec<usize> = alloc.log.iter().map(|(len, _)| *len).collect();
    assert_eq!(sizes, vec![3 * MIB, MIB + MIB / 2, MIB + MIB / 2, MIB]);
    for pair in alloc.log.windows(2) {
        if !pair[0].1 {
            assert!(pair[1].0 < pair[0].0, "refused {} then asked {}", pair[0].0, pair[1].0);
        }
    }
}
