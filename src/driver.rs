//! Run orchestration.
//!
//! The [`Driver`] owns a run from validated settings to the last report
//! line. It moves through [`Phase`]s strictly in order; the offload thread,
//! when enabled, is the only thing that runs alongside more than one phase.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, ensure};
use strum::Display;
use tracing::{debug, info, warn};

use crate::compression::CompressorFactory;
use crate::config::Settings;
use crate::file::BlockSource;
use crate::hashing::BlockHasher;
use crate::offload::{OffloadHandle, OffloadStage, OffloadStats};
use crate::report::{Reporter, RunSummary};
use crate::throughput::{ThroughputSample, ThroughputTracker};
use crate::ui::Bar;
use crate::worker::{WorkItem, WorkList, WorkerPool, WorkerSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Phase {
    Configured,
    Running,
    Draining,
    Reported,
    OffloadShutdown,
    Done,
}

impl Phase {
    /// Moves to `next`, which must directly follow `self`.
    ///
    /// `OffloadShutdown` is skipped when no offload stage was started.
    ///
    /// # Panics
    ///
    /// Panics on any other transition.
    #[must_use]
    pub fn advance(self, next: Self) -> Self {
        let allowed = matches!(
            (self, next),
            (Self::Configured, Self::Running) | (Self::Running, Self::Draining) | (Self::Draining, Self::Reported) | (Self::Reported, Self::OffloadShutdown | Self::Done) | (Self::OffloadShutdown, Self::Done)
        );
        assert!(allowed, "driver cannot move from {self} to {next}");
        debug!(from = %self, to = %next, "driver phase");
        next
    }
}

/// Everything the workers of one run share.
///
/// Built by the [`Driver`] and borrowed by every worker thread for the
/// length of the run.
pub struct RunContext<'a> {
    pub settings: Settings,
    pub work: WorkList<WorkItem>,
    pub totals: ThroughputTracker,
    pub reporter: &'a Reporter,
    /// Builds each worker's own compressor.
    pub compressors: CompressorFactory,
    pub hasher: Arc<dyn BlockHasher>,
    pub offload: Option<OffloadHandle>,
    pub progress: Option<Bar>,
}

/// Outcome of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub compression: &'static str,
    pub hashing: &'static str,
    pub block_size: usize,
    /// Wall-clock time from the first worker start to the last worker exit.
    pub elapsed: Duration,
    /// Run-wide totals, merged from every worker.
    pub total: ThroughputSample,
    pub workers: Vec<WorkerSummary>,
    pub files_skipped: u64,
    pub files_empty: u64,
    pub units_failed: u64,
    pub offload: Option<OffloadStats>,
}

impl RunReport {
    #[must_use]
    pub fn mb_per_sec(&self) -> Option<f64> {
        self.total.mb_per_sec(self.block_size)
    }
}

pub struct Driver<'a> {
    settings: Settings,
    reporter: &'a Reporter,
    phase: Phase,
}

impl<'a> Driver<'a> {
    #[must_use]
    pub fn new(settings: Settings, reporter: &'a Reporter) -> Self {
        Self { settings, reporter, phase: Phase::Configured }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Processes `inputs` with the configured pool and reports the result.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid settings, an empty input list, a thread
    /// that cannot be spawned, or a report sink that cannot be written. A
    /// single unreadable input is not an error.
    ///
    /// # Panics
    ///
    /// Panics if called twice, or if an internal invariant breaks: work left
    /// over after every worker exited, or offload requests still queued at
    /// shutdown.
    pub fn run(&mut self, inputs: &[PathBuf]) -> Result<RunReport> {
        assert_eq!(self.phase, Phase::Configured, "driver already ran");
        self.settings.validate()?;
        ensure!(!inputs.is_empty(), "no inputs to process");

        let settings = self.settings.clone();
        let compressors = settings.compression.factory(settings.zstd_level);
        let hasher: Arc<dyn BlockHasher> = Arc::from(settings.hashing.hasher());
        let (compression, hashing) = (compressors()?.name(), hasher.name());

        let loaded = load_work(&settings, inputs);
        let stage = if settings.offload { Some(OffloadStage::spawn(Arc::clone(&hasher))?) } else { None };
        let progress = if settings.progress { Some(Bar::new(loaded.bytes, "processing")?) } else { None };

        info!(threads = settings.threads, compression, hashing, offload = settings.offload, units = loaded.items.len(), "starting run");

        let ctx = RunContext {
            settings,
            work: WorkList::from(loaded.items),
            totals: ThroughputTracker::new(),
            reporter: self.reporter,
            compressors,
            hasher,
            offload: stage.as_ref().map(OffloadStage::handle),
            progress,
        };

        self.phase = self.phase.advance(Phase::Running);
        let started = Instant::now();
        let workers = WorkerPool::new(ctx.settings.threads).run(&ctx)?;
        let elapsed = started.elapsed();

        self.phase = self.phase.advance(Phase::Draining);
        assert!(ctx.work.is_empty(), "{} unit(s) left after every worker exited", ctx.work.len());
        if let Some(bar) = &ctx.progress {
            bar.finish();
        }

        let total = ctx.totals.snapshot();
        let merged = workers.iter().fold(ThroughputSample::default(), |acc, w| acc + w.sample);
        assert_eq!(total, merged, "run totals disagree with the worker samples");

        self.phase = self.phase.advance(Phase::Reported);
        self.reporter.summary(&RunSummary { hashing, compression, threads: ctx.settings.threads, offload: ctx.settings.offload, elapsed, total, block_size: ctx.settings.block_size })?;

        let offload = match stage {
            Some(stage) => {
                self.phase = self.phase.advance(Phase::OffloadShutdown);
                Some(stage.shutdown()?)
            }
            None => None,
        };
        self.phase = self.phase.advance(Phase::Done);

        let report = RunReport {
            compression,
            hashing,
            block_size: ctx.settings.block_size,
            elapsed,
            total,
            files_skipped: loaded.skipped + workers.iter().map(|w| w.skipped).sum::<u64>(),
            files_empty: loaded.empty + workers.iter().map(|w| w.empty).sum::<u64>(),
            units_failed: workers.iter().map(|w| w.failed).sum(),
            workers,
            offload,
        };

        info!(blocks = report.total.blocks, micros = report.total.micros, elapsed_us = report.elapsed.as_micros(), skipped = report.files_skipped, failed = report.units_failed, "run finished");
        Ok(report)
    }
}

struct LoadedWork {
    items: Vec<WorkItem>,
    bytes: u64,
    skipped: u64,
    empty: u64,
}

/// Builds the shared work list.
///
/// File mode queues paths for the workers to open. Preload mode reads every
/// input here and queues its block-groups; inputs that fail to load are
/// skipped the same way a worker would skip them.
fn load_work(settings: &Settings, inputs: &[PathBuf]) -> LoadedWork {
    let mut loaded = LoadedWork { items: Vec::new(), bytes: 0, skipped: 0, empty: 0 };

    if !settings.preload {
        // Claims pop from the back; reverse so units start in input order.
        loaded.items = inputs.iter().rev().cloned().map(WorkItem::File).collect();
        loaded.bytes = inputs.iter().filter_map(|path| fs::metadata(path).ok()).map(|meta| meta.len()).sum();
        return loaded;
    }

    let source = BlockSource::from_settings(settings);
    for path in inputs {
        let name = path.display().to_string();
        match source.read_all_blocks(path) {
            Ok(groups) if groups.is_empty() => {
                warn!(worker = "loader", unit = %name, "no full block to process");
                loaded.empty += 1;
            }
            Ok(groups) => {
                for (index, group) in groups.into_iter().enumerate() {
                    loaded.bytes += group.len() as u64;
                    loaded.items.push(WorkItem::Group { name: format!("{name}#{index}"), group });
                }
            }
            Err(e) => {
                warn!(worker = "loader", file = %name, "skipping file: {e:#}");
                loaded.skipped += 1;
            }
        }
    }

    loaded.items.reverse();
    loaded
}
