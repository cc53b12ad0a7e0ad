//! A single compression worker.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use tracing::{debug, warn};

use crate::compression::BlockCompressor;
use crate::config::COMPRESSION_BUFFER_FACTOR;
use crate::driver::RunContext;
use crate::file::{BlockGroup, BlockSource};
use crate::offload::Submitter;
use crate::report::UnitRecord;
use crate::throughput::{ThroughputSample, duration_micros};

/// One unit of work in the shared list.
#[derive(Debug, Clone)]
pub enum WorkItem {
    /// A file the claiming worker streams itself, one block-group at a time.
    File(PathBuf),
    /// A block-group read into memory before the run.
    Group { name: String, group: BlockGroup },
}

/// What one worker did over the whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub id: usize,
    /// Units processed to completion.
    pub units: u64,
    /// Blocks and time of the completed units.
    pub sample: ThroughputSample,
    /// Files that could not be opened or read.
    pub skipped: u64,
    /// Units that held no full block.
    pub empty: u64,
    /// Units abandoned on an algorithm error.
    pub failed: u64,
    /// Time spent blocked on offload completions, already part of `sample`.
    pub offload_wait: Duration,
}

/// Why a unit stopped early.
enum Abandon {
    Read(anyhow::Error),
    Algorithm(anyhow::Error),
}

pub struct Worker<'a> {
    id: usize,
    ctx: &'a RunContext<'a>,
    source: BlockSource,
    compressor: Box<dyn BlockCompressor>,
    compressed: Vec<u8>,
    digests: Vec<u8>,
    submitter: Option<Submitter>,
    summary: WorkerSummary,
}

impl<'a> Worker<'a> {
    #[must_use]
    pub fn new(id: usize, ctx: &'a RunContext<'a>, compressor: Box<dyn BlockCompressor>) -> Self {
        let settings = &ctx.settings;

        Self {
            id,
            ctx,
            source: BlockSource::from_settings(settings),
            compressor,
            compressed: vec![0u8; settings.block_size * COMPRESSION_BUFFER_FACTOR],
            digests: vec![0u8; settings.hash_blocks * ctx.hasher.digest_size()],
            submitter: ctx.offload.clone().map(Submitter::new),
            summary: WorkerSummary { id, ..WorkerSummary::default() },
        }
    }

    /// Claims and processes units until the shared list is empty, then
    /// merges this worker's sample into the run totals.
    pub fn run(mut self) -> WorkerSummary {
        debug!(worker = self.id, "worker started");

        while let Some(item) = self.ctx.work.claim() {
            match item {
                WorkItem::File(path) => self.process_file(&path),
                WorkItem::Group { name, group } => self.process_unit(&name, std::iter::once(Ok(group))),
            }
        }

        self.ctx.totals.merge(self.summary.sample);
        debug!(worker = self.id, units = self.summary.units, blocks = self.summary.sample.blocks, "worker finished");
        self.summary
    }

    fn process_file(&mut self, path: &Path) {
        match self.source.open(path) {
            Ok(mut groups) => {
                let name = groups.name().to_owned();
                self.process_unit(&name, &mut groups);
                if groups.truncated() > 0 {
                    debug!(worker = self.id, file = name.as_str(), bytes = groups.truncated(), "truncated partial read");
                }
            }
            Err(e) => {
                warn!(worker = self.id, file = %path.display(), "skipping file: {e:#}");
                self.summary.skipped += 1;
            }
        }
    }

    fn process_unit(&mut self, name: &str, groups: impl Iterator<Item = Result<BlockGroup>>) {
        let mut sample = ThroughputSample::default();

        for group in groups {
            let outcome = group.map_err(Abandon::Read).and_then(|group| self.process_group(name, &group, &mut sample).map(|()| group.len()));

            match outcome {
                Ok(bytes) => {
                    if let Some(bar) = &self.ctx.progress {
                        bar.add(bytes as u64);
                    }
                }
                Err(Abandon::Read(e)) => {
                    warn!(worker = self.id, file = name, "skipping file: {e:#}");
                    self.summary.skipped += 1;
                    return;
                }
                Err(Abandon::Algorithm(e)) => {
                    warn!(worker = self.id, unit = name, "abandoning unit: {e:#}");
                    self.summary.failed += 1;
                    return;
                }
            }
        }

        if sample.blocks == 0 {
            warn!(worker = self.id, unit = name, "no full block to process");
            self.summary.empty += 1;
            return;
        }

        self.summary.units += 1;
        self.summary.sample += sample;

        let record = UnitRecord { worker: self.id, name, sample, block_size: self.ctx.settings.block_size };
        if let Err(e) = self.ctx.reporter.unit(&record) {
            warn!(worker = self.id, "{e:#}");
        }
    }

    /// Compresses every block of `group`, hashing inline or through the
    /// offload stage, and records one timing per block into `sample`.
    ///
    /// Time blocked on the offload completion is added to `sample` too, so
    /// offloaded hashing is never free.
    fn process_group(&mut self, name: &str, group: &BlockGroup, sample: &mut ThroughputSample) -> Result<(), Abandon> {
        let ctx = self.ctx;
        let block_size = group.block_size();
        let hash_blocks = ctx.settings.hash_blocks;

        if let Some(submitter) = self.submitter.as_mut() {
            submitter.submit(Arc::clone(group.data()), block_size, group.block_count() * ctx.hasher.digest_size());
        }
        let inline = self.submitter.is_none();

        let mut outcome = Ok(());
        for (index, block) in group.blocks().enumerate() {
            let start = Instant::now();

            if self.compressor.compress(block, &mut self.compressed) == 0 {
                outcome = Err(anyhow!("{} compression failed on block {index} of {name}", self.compressor.name()));
                break;
            }

            if inline && (index + 1) % hash_blocks == 0 {
                let first = (index + 1 - hash_blocks) * block_size;
                let span = &group.data()[first..first + hash_blocks * block_size];
                if let Err(e) = ctx.hasher.hash(span, block_size, &mut self.digests) {
                    outcome = Err(e);
                    break;
                }
            }

            sample.record(1, start.elapsed());
        }

        // The group's bytes stay shared with the offload thread until this returns.
        if let Some(submitter) = self.submitter.as_mut() {
            let start = Instant::now();
            let waited = submitter.wait().map(|_| ());
            let elapsed = start.elapsed();
            sample.micros += duration_micros(elapsed);
            self.summary.offload_wait += elapsed;
            outcome = outcome.and(waited);
        }

        outcome.map_err(Abandon::Algorithm)
    }
}
