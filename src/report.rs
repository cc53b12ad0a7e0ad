//! Line-oriented report records.
//!
//! Every record is one line on the report sink (stdout by default), its
//! fields joined by [`LOG_SEPARATOR`]. The first field names the record
//! kind so downstream tooling can split a mixed stream:
//!
//! ```text
//! unit|<worker>|<name>|<blocks>|<micros>|<MB/s>
//! summary|<hash>|<compression>|<threads>|<offload>|<elapsed us>|<blocks>|<micros>|<MB/s>
//! ```

use std::io::{self, Write};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::LOG_SEPARATOR;
use crate::throughput::{ThroughputSample, duration_micros};

/// Written in place of a rate when no time was accumulated.
const NO_RATE: &str = "n/a";

/// One processed unit (a file, or a preloaded block-group).
#[derive(Debug, Clone, Copy)]
pub struct UnitRecord<'a> {
    pub worker: usize,
    pub name: &'a str,
    pub sample: ThroughputSample,
    pub block_size: usize,
}

/// The final line of a run.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary<'a> {
    pub hashing: &'a str,
    pub compression: &'a str,
    pub threads: usize,
    pub offload: bool,
    pub elapsed: Duration,
    pub total: ThroughputSample,
    pub block_size: usize,
}

/// Serializes report records from any number of threads onto one sink.
pub struct Reporter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl Reporter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out: Mutex::new(out) }
    }

    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Writes the record for one finished unit.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot be written.
    pub fn unit(&self, record: &UnitRecord<'_>) -> Result<()> {
        let line = join(&["unit", &record.worker.to_string(), record.name, &record.sample.blocks.to_string(), &record.sample.micros.to_string(), &format_rate(record.sample, record.block_size)]);
        self.write_line(&line).with_context(|| format!("failed to report unit {}", record.name))
    }

    /// Writes the summary line and flushes the sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot be written.
    pub fn summary(&self, summary: &RunSummary<'_>) -> Result<()> {
        let line = join(&[
            "summary",
            summary.hashing,
            summary.compression,
            &summary.threads.to_string(),
            if summary.offload { "offload" } else { "inline" },
            &duration_micros(summary.elapsed).to_string(),
            &summary.total.blocks.to_string(),
            &summary.total.micros.to_string(),
            &format_rate(summary.total, summary.block_size),
        ]);

        self.write_line(&line).context("failed to report run summary")?;
        self.out.lock().expect("report sink poisoned").flush().context("failed to flush report sink")
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut out = self.out.lock().expect("report sink poisoned");
        writeln!(out, "{line}")
    }
}

/// MB/s with two decimals, or `n/a`.
#[must_use]
pub fn format_rate(sample: ThroughputSample, block_size: usize) -> String {
    sample.mb_per_sec(block_size).map_or_else(|| NO_RATE.to_owned(), |rate| format!("{rate:.2}"))
}

fn join(fields: &[&str]) -> String {
    let mut line = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            line.push(LOG_SEPARATOR);
        }
        // Names are free text; keep the field count stable.
        line.push_str(&field.replace(LOG_SEPARATOR, "_"));
    }
    line
}

/// In-memory sink whose contents stay readable after the reporter takes it.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct Capture(std::sync::Arc<Mutex<Vec<u8>>>);

#[cfg(test)]
impl Capture {
    pub(crate) fn reporter(&self) -> Reporter {
        Reporter::new(Box::new(self.clone()))
    }

    pub(crate) fn lines(&self) -> Vec<String> {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap().lines().map(str::to_owned).collect()
    }
}

#[cfg(test)]
impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
