//! The parallel worker pool.
//!
//! Workers share nothing but the [`RunContext`]: they claim units from its
//! work list, report through its reporter and merge their throughput into
//! its totals exactly once, when they run out of work.

use std::panic;
use std::thread;

use anyhow::{Context, Result};

use crate::driver::RunContext;

pub mod processor;
pub mod queue;

pub use processor::{WorkItem, Worker, WorkerSummary};
pub use queue::WorkList;

/// A fixed number of worker threads draining one shared work list.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    threads: usize,
}

impl WorkerPool {
    #[must_use]
    pub fn new(threads: usize) -> Self {
        Self { threads }
    }

    /// Runs every worker to completion and returns their summaries by id.
    ///
    /// Returns only after all worker threads have terminated. A worker that
    /// panics takes the caller down with it.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker's compressor cannot be built or its
    /// thread cannot be spawned. Workers that did start still drain the
    /// list before this returns.
    pub fn run(&self, ctx: &RunContext<'_>) -> Result<Vec<WorkerSummary>> {
        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.threads);
            for id in 0..self.threads {
                let compressor = (ctx.compressors)().with_context(|| format!("failed to build compressor for worker {id}"))?;
                let handle = thread::Builder::new().name(format!("worker-{id}")).spawn_scoped(scope, move || Worker::new(id, ctx, compressor).run()).with_context(|| format!("failed to spawn worker {id}"))?;
                handles.push(handle);
            }

            Ok(handles.into_iter().map(|handle| handle.join().unwrap_or_else(|payload| panic::resume_unwind(payload))).collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::compression::CompressionAlgorithm;
    use crate::config::Settings;
    use crate::file::BlockGroup;
    use crate::hashing::Crc32;
    use crate::report::Capture;
    use crate::throughput::ThroughputTracker;

    #[test]
    fn test_every_group_processed_exactly_once() {
        let items: Vec<WorkItem> = (0..64).map(|i| WorkItem::Group { name: format!("g#{i}"), group: BlockGroup::new(vec![(i % 7) as u8; 256], 128) }).collect();

        let capture = Capture::default();
        let reporter = capture.reporter();
        let ctx = RunContext {
            settings: Settings { threads: 4, block_size: 128, read_blocks: 2, hash_blocks: 1, ..Settings::default() },
            work: WorkList::from(items),
            totals: ThroughputTracker::new(),
            reporter: &reporter,
            compressors: CompressionAlgorithm::Lz4.factory(1),
            hasher: Arc::new(Crc32),
            offload: None,
            progress: None,
        };

        let workers = WorkerPool::new(4).run(&ctx).unwrap();

        assert_eq!(workers.len(), 4);
        assert_eq!(workers.iter().map(|w| w.id).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert_eq!(workers.iter().map(|w| w.units).sum::<u64>(), 64);
        assert_eq!(ctx.totals.snapshot().blocks, 128);

        let names: Vec<String> = capture.lines().iter().map(|line| line.split('|').nth(2).unwrap().to_owned()).collect();
        let unique: HashSet<&String> = names.iter().collect();
        assert_eq!(names.len(), 64);
        assert_eq!(unique.len(), 64);
    }

    #[test]
    fn test_each_worker_gets_its_own_compressor() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);

        let capture = Capture::default();
        let reporter = capture.reporter();
        let ctx = RunContext {
            settings: Settings { threads: 3, block_size: 128, read_blocks: 1, hash_blocks: 1, ..Settings::default() },
            work: WorkList::from(vec![WorkItem::Group { name: "g".to_owned(), group: BlockGroup::new(vec![1u8; 128], 128) }]),
            totals: ThroughputTracker::new(),
            reporter: &reporter,
            compressors: Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                CompressionAlgorithm::Zstd.compressor(1)
            }),
            hasher: Arc::new(Crc32),
            offload: None,
            progress: None,
        };

        let workers = WorkerPool::new(3).run(&ctx).unwrap();

        assert_eq!(workers.len(), 3);
        assert_eq!(built.load(Ordering::SeqCst), 3);
    }
}
