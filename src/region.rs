#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

/// One owned, contiguous span of committed bytes.
///
/// The backing allocation is a boxed slice, so the address and length cannot
/// change between acquisition and release.
#[derive(Debug)]
pub struct MemoryRegion {
    bytes: Box<[u8]>,
}

impl MemoryRegion {
    pub(crate) fn from_committed(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

/// All memory held by a running session. Append-only while growing, dropped
/// as a whole when the session ends.
#[derive(Debug, Default)]
pub struct WorkingSet {
    regions: Vec<MemoryRegion>,
    total_bytes: u64,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, region: MemoryRegion) {
        self.total_bytes += region.len() as u64;
        self.regions.push(region);
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn regions(&self) -> &[MemoryRegion] {
        &self.regions
    }

    pub fn regions_mut(&mut self) -> &mut [MemoryRegion] {
        &mut self.regions
    }
}

/// Fallible source of raw capacity for the growth controller.
///
/// Implementations only reserve; committing pages is the caller's job.
pub trait RegionAllocator {
    /// Returns an empty vector with capacity for at least `len` bytes, or
    /// `None` when the request cannot be satisfied.
    fn try_reserve(&mut self, len: usize) -> Option<Vec<u8>>;
}

/// Reserves from the global allocator without aborting on exhaustion.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemAllocator;

impl RegionAllocator for SystemAllocator {
    fn try_reserve(&mut self, len: usize) -> Option<Vec<u8>> {
        let mut buf = Vec::new();
        match buf.try_reserve_exact(len) {
            Ok(()) => Some(buf),
            Err(e) => {
                tracing::debug!(len, error = %e, "reserve failed");
                None
            }
        }
    }
}

/// Allocator that refuses once a byte budget is spent, or any single request
/// above `max_request`. Lets callers exercise growth without exhausting RAM.
#[derive(Clone, Debug)]
pub struct LimitedAllocator {
    pub budget_bytes: u64,
    pub max_request: usize,
    pub granted_bytes: u64,
    pub attempts: u32,
}

impl LimitedAllocator {
    pub fn new(budget_bytes: u64, max_request: usize) -> Self {
        Self {
            budget_bytes,
            max_request,
            granted_bytes: 0,
            attempts: 0,
        }
    }
}

impl RegionAllocator for LimitedAllocator {
    fn try_reserve(&mut self, len: usize) -> Option<Vec<u8>> {
        self.attempts += 1;
        if len > self.max_request || self.granted_bytes + len as u64 > self.budget_bytes {
            return None;
        }
        self.granted_bytes += len as u64;
        Some(Vec::with_capacity(len))
    }
}
