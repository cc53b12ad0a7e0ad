use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result, ensure};
use clap::error::ErrorKind;
use clap::{ArgAction, CommandFactory, Parser};
use tracing::Level;

use crate::compression::CompressionAlgorithm;
use crate::config::{APP_NAME, DEFAULT_BLOCK_SIZE, DEFAULT_COMPRESSION, DEFAULT_HASH_BLOCKS, DEFAULT_HASHING, DEFAULT_READ_BLOCKS, DEFAULT_ZSTD_LEVEL, STDIN_PATH, Settings};
use crate::driver::Driver;
use crate::file::expand_inputs;
use crate::hashing::HashAlgorithm;
use crate::report::Reporter;
use crate::ui;

#[derive(Parser)]
#[command(name = APP_NAME, version, about = "Measure compression and hashing throughput over fixed-size file blocks.")]
pub struct App {
    /// Files or directories to read; `-` reads standard input.
    #[arg(default_value = STDIN_PATH)]
    inputs: Vec<PathBuf>,

    /// Worker threads [default: available cores]
    #[arg(short = 'c', long)]
    threads: Option<usize>,

    /// Bytes per block.
    #[arg(short = 'b', long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: usize,

    /// Blocks read from an input at a time.
    #[arg(short = 'r', long, default_value_t = DEFAULT_READ_BLOCKS)]
    read_blocks: usize,

    /// Blocks per inline hashing call; must divide --read-blocks.
    #[arg(short = 'G', long, default_value_t = DEFAULT_HASH_BLOCKS)]
    hash_blocks: usize,

    /// Hash on a dedicated offload thread instead of inline.
    #[arg(short = 'g', long)]
    offload: bool,

    /// Read every input into memory before starting the workers.
    #[arg(short = 'p', long)]
    preload: bool,

    /// Compression algorithm: lz4, zstd or none.
    #[arg(short = 'C', long = "comp-alg", default_value_t = DEFAULT_COMPRESSION.to_string())]
    comp_alg: String,

    /// Hashing algorithm: blake3, sha256 or crc32.
    #[arg(short = 'H', long = "hash-alg", default_value_t = DEFAULT_HASHING.to_string())]
    hash_alg: String,

    #[arg(long, default_value_t = DEFAULT_ZSTD_LEVEL)]
    zstd_level: i32,

    /// Glob of paths to leave out of directory inputs (repeatable).
    #[arg(long)]
    exclude: Vec<String>,

    /// Show a progress bar on stderr.
    #[arg(long)]
    progress: bool,

    /// Print a per-worker table on stderr after the run.
    #[arg(long)]
    table: bool,

    /// More logging on stderr (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl App {
    pub fn init() -> Result<Self> {
        let app = Self::parse();
        let subscriber = tracing_subscriber::fmt().with_writer(io::stderr).with_max_level(app.log_level()).with_file(true).with_line_number(true).finish();
        tracing::subscriber::set_global_default(subscriber)?;
        Ok(app)
    }

    pub fn execute(self) -> Result<()> {
        let settings = self.settings().unwrap_or_else(|e| Self::command().error(ErrorKind::InvalidValue, format!("{e:#}")).exit());

        let inputs = expand_inputs(&self.inputs, &self.exclude);
        ensure!(!inputs.is_empty(), "no inputs left to process");

        let reporter = Reporter::stdout();
        let report = Driver::new(settings, &reporter).run(&inputs).context("benchmark run failed")?;

        if self.table {
            ui::show_worker_table(&report);
        }

        Ok(())
    }

    /// Resolves the flags into validated run settings.
    fn settings(&self) -> Result<Settings> {
        let defaults = Settings::default();
        let settings = Settings {
            threads: self.threads.unwrap_or(defaults.threads),
            block_size: self.block_size,
            read_blocks: self.read_blocks,
            hash_blocks: self.hash_blocks,
            offload: self.offload,
            preload: self.preload,
            compression: CompressionAlgorithm::parse(&self.comp_alg)?,
            hashing: HashAlgorithm::parse(&self.hash_alg)?,
            zstd_level: self.zstd_level,
            progress: self.progress,
        };

        settings.validate()?;
        Ok(settings)
    }

    fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}
