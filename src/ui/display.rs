//! Human-readable run results.

use bytesize::ByteSize;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;

use crate::driver::RunReport;
use crate::report::format_rate;
use crate::worker::WorkerSummary;

/// One row per worker plus a closing total row.
#[must_use]
pub fn worker_table(workers: &[WorkerSummary], block_size: usize) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Worker", "Units", "Blocks", "Busy (us)", "MB/s", "Offload wait (us)", "Skipped", "Failed"]);

    for worker in workers {
        table.add_row(vec![
            worker.id.to_string(),
            worker.units.to_string(),
            worker.sample.blocks.to_string(),
            worker.sample.micros.to_string(),
            format_rate(worker.sample, block_size),
            worker.offload_wait.as_micros().to_string(),
            worker.skipped.to_string(),
            worker.failed.to_string(),
        ]);
    }

    let total = workers.iter().fold(WorkerSummary::default(), |mut acc, w| {
        acc.units += w.units;
        acc.sample += w.sample;
        acc.offload_wait += w.offload_wait;
        acc.skipped += w.skipped;
        acc.failed += w.failed;
        acc
    });

    table.add_row(vec![
        "total".to_owned(),
        total.units.to_string(),
        total.sample.blocks.to_string(),
        total.sample.micros.to_string(),
        format_rate(total.sample, block_size),
        total.offload_wait.as_micros().to_string(),
        total.skipped.to_string(),
        total.failed.to_string(),
    ]);

    table
}

/// Prints the worker table and a one-line total to stderr.
pub fn show_worker_table(report: &RunReport) {
    let bytes = report.total.blocks.saturating_mul(report.block_size as u64);

    eprintln!();
    eprintln!("{}", worker_table(&report.workers, report.block_size));
    eprintln!("{} {} + {}: {} in {:.3}s wall clock", report.total.blocks, if report.total.blocks == 1 { "block" } else { "blocks" }, report.compression, ByteSize::b(bytes), report.elapsed.as_secs_f64());

    if let Some(offload) = report.offload {
        eprintln!("{}: {} request(s) offloaded covering {} block(s)", report.hashing, offload.requests, offload.blocks);
    }
}
