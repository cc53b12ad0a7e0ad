//! Throughput accounting.
//!
//! A [`ThroughputSample`] is a plain `(blocks, microseconds)` pair owned by a
//! single worker and accumulated without locking. When the worker finishes it
//! merges its sample once into the run-wide [`ThroughputTracker`], which is
//! the only copy shared across threads.

use std::ops::{Add, AddAssign};
use std::sync::Mutex;
use std::time::Duration;

const MICROS_PER_SEC: f64 = 1_000_000.0;
const BYTES_PER_KIB: f64 = 1024.0;
const KIB_PER_MIB: f64 = 1024.0;

/// Blocks processed and the time spent processing them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThroughputSample {
    pub blocks: u64,
    pub micros: u64,
}

impl ThroughputSample {
    #[must_use]
    pub const fn new(blocks: u64, micros: u64) -> Self {
        Self { blocks, micros }
    }

    /// Adds `blocks` processed in `elapsed` to this sample.
    #[inline]
    pub fn record(&mut self, blocks: u64, elapsed: Duration) {
        self.blocks += blocks;
        self.micros += duration_micros(elapsed);
    }

    /// Throughput in KiB/s for blocks of `block_size` bytes.
    ///
    /// Returns `None` when no time has been accumulated.
    #[must_use]
    pub fn kib_per_sec(&self, block_size: usize) -> Option<f64> {
        if self.micros == 0 {
            return None;
        }

        #[allow(clippy::cast_precision_loss)]
        let bytes = self.blocks as f64 * block_size as f64;
        #[allow(clippy::cast_precision_loss)]
        let seconds = self.micros as f64 / MICROS_PER_SEC;

        Some(bytes / BYTES_PER_KIB / seconds)
    }

    /// Throughput in MB/s (MiB per second) for blocks of `block_size` bytes.
    ///
    /// Returns `None` when no time has been accumulated.
    #[must_use]
    pub fn mb_per_sec(&self, block_size: usize) -> Option<f64> {
        self.kib_per_sec(block_size).map(|kib| kib / KIB_PER_MIB)
    }
}

impl Add for ThroughputSample {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self { blocks: self.blocks + rhs.blocks, micros: self.micros + rhs.micros }
    }
}

impl AddAssign for ThroughputSample {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Run-wide throughput totals, safe to update from any worker.
#[derive(Debug, Default)]
pub struct ThroughputTracker {
    totals: Mutex<ThroughputSample>,
}

impl ThroughputTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, blocks: u64, micros: u64) {
        self.merge(ThroughputSample::new(blocks, micros));
    }

    /// Folds another sample into the totals.
    pub fn merge(&self, sample: ThroughputSample) {
        let mut totals = self.totals.lock().expect("throughput totals poisoned");
        *totals += sample;
    }

    /// Current totals.
    ///
    /// Stable only once every contributing worker has finished.
    #[must_use]
    pub fn snapshot(&self) -> ThroughputSample {
        *self.totals.lock().expect("throughput totals poisoned")
    }
}

/// Saturating conversion of a [`Duration`] to whole microseconds.
#[inline]
#[must_use]
pub fn duration_micros(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}
