#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use std::hint::black_box;
use std::time::{Duration, Instant};

use adler::Adler32;

use crate::error::{EngineError, EngineResult};
use crate::region::WorkingSet;

/// Byte written over the whole working set on every pass.
pub const FILL_PATTERN: u8 = 0x5A;

const ADLER_MOD: u128 = 65_521;

/// One write+read cycle over the full working set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PassResult {
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub write_time: Duration,
    pub read_time: Duration,
    pub checksum: u32,
}

impl PassResult {
    pub fn duration(&self) -> Duration {
        self.write_time + self.read_time
    }
}

/// Writes then reads every region. The read phase only starts once every
/// region has been filled, and both phases are timed as single wall-clock
/// spans.
pub fn run_pass(working_set: &mut WorkingSet) -> EngineResult<PassResult> {
    let (bytes_written, write_time) = write_phase(working_set, FILL_PATTERN);
    let (bytes_read, read_time, checksum) = read_phase(working_set, FILL_PATTERN)?;
    Ok(PassResult {
        bytes_written,
        bytes_read,
        write_time,
        read_time,
        checksum,
    })
}

pub fn write_phase(working_set: &mut WorkingSet, pattern: u8) -> (u64, Duration) {
    let started = Instant::now();
    let mut written = 0u64;
    for region in working_set.regions_mut() {
        let bytes = region.as_mut_slice();
        bytes.fill(pattern);
        let _ = black_box(&mut *bytes);
        written += bytes.len() as u64;
    }
    (written, started.elapsed())
}

/// Streams every region into one Adler-32 and checks the result against the
/// value a fully `pattern`-filled working set must produce.
pub fn read_phase(working_set: &WorkingSet, pattern: u8) -> EngineResult<(u64, Duration, u32)> {
    let started = Instant::now();
    let mut hasher = Adler32::new();
    let mut read = 0u64;
    for (idx, region) in working_set.regions().iter().enumerate() {
        if region.is_empty() {
            return Err(EngineError::PassAccessFailure(format!(
                "region {idx} is not readable"
            )));
        }
        hasher.write_slice(black_box(region.as_slice()));
        read += region.len() as u64;
    }
    let checksum = hasher.checksum();
    let elapsed = started.elapsed();

    let expected = uniform_adler32(read, pattern);
    if checksum != expected {
        return Err(EngineError::PassAccessFailure(format!(
            "checksum mismatch over {read} bytes: got {checksum:#010x}, expected {expected:#010x}"
        )));
    }
    Ok((read, elapsed, checksum))
}

/// Adler-32 of `len` bytes that all equal `value`, in closed form.
pub fn uniform_adler32(len: u64, value: u8) -> u32 {
    let n = u128::from(len);
    let v = u128::from(value);
    let triangle = if n % 2 == 0 {
        (n / 2) * (n + 1) % ADLER_MOD
    } else {
        n * ((n + 1) / 2) % ADLER_MOD
    };
    let a = (1 + (n % ADLER_MOD) * v) % ADLER_MOD;
    let b = (n + v * triangle) % ADLER_MOD;
    // both halves are < 65521 after the reduction
    u32::try_from((b << 16) | a).unwrap_or(u32::MAX)
}

/// Folds one pass checksum into the running session checksum.
pub fn fold_checksum(session: u32, pass: u32) -> u32 {
    let mut hasher = Adler32::from_checksum(session);
    hasher.write_slice(&pass.to_le_bytes());
    hasher.checksum()
}
