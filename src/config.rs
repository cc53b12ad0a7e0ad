//! Global Configuration
//!
//! Named defaults for the harness and the [`Settings`] a run is built from.
//! Everything here is validated once, before any worker thread exists, so a
//! bad flag ends the process with a usage error instead of a failure mid-run.

use std::thread;

use anyhow::{Result, ensure};

use crate::compression::CompressionAlgorithm;
use crate::hashing::HashAlgorithm;

/// Application name used in logs and the CLI.
pub const APP_NAME: &str = "blockbench";

// === Block Geometry ===

/// Bytes per block, the minimum unit of compression and hashing.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Blocks read from an input at a time (one block-group).
pub const DEFAULT_READ_BLOCKS: usize = 8;

/// Blocks hashed per inline hashing call.
pub const DEFAULT_HASH_BLOCKS: usize = 1;

/// Compression output buffers are sized to this multiple of a block.
///
/// Incompressible input can grow slightly under every supported codec, and
/// a codec that needs more room than this reports failure by returning 0.
pub const COMPRESSION_BUFFER_FACTOR: usize = 2;

/// Largest block-group a worker may buffer, in bytes (1 GiB).
pub const MAX_GROUP_SIZE: usize = 1 << 30;

// === Workers ===

/// Worker count used when the available parallelism cannot be queried.
pub const FALLBACK_THREADS: usize = 8;

// === Algorithms ===

/// Compression algorithm used when none is named.
pub const DEFAULT_COMPRESSION: CompressionAlgorithm = CompressionAlgorithm::Lz4;

/// Hashing algorithm used when none is named.
pub const DEFAULT_HASHING: HashAlgorithm = HashAlgorithm::Blake3;

/// Zstandard level; 1 favours speed, which is what the harness measures.
pub const DEFAULT_ZSTD_LEVEL: i32 = 1;

// === Reporting ===

/// Field separator of every report record written to stdout.
pub const LOG_SEPARATOR: char = '|';

/// Input name that selects standard input.
pub const STDIN_PATH: &str = "-";

/// Everything a single run needs to know, fixed before the Driver starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Number of parallel compression workers.
    pub threads: usize,

    /// Bytes per block.
    pub block_size: usize,

    /// Blocks per block-group read from an input.
    pub read_blocks: usize,

    /// Blocks per inline hashing call. Must divide `read_blocks`.
    pub hash_blocks: usize,

    /// Route hashing through the dedicated offload thread.
    pub offload: bool,

    /// Read every input into memory before the workers start.
    pub preload: bool,

    pub compression: CompressionAlgorithm,

    pub hashing: HashAlgorithm,

    pub zstd_level: i32,

    /// Draw a progress bar on stderr while the workers run.
    pub progress: bool,
}

impl Settings {
    /// Bytes in one block-group, or `None` if that overflows.
    #[inline]
    #[must_use]
    pub fn group_size(&self) -> Option<usize> {
        self.block_size.checked_mul(self.read_blocks)
    }

    /// Checks the settings for values that cannot drive a run.
    ///
    /// # Errors
    ///
    /// Returns an error when a count is zero, when a block-group would exceed
    /// [`MAX_GROUP_SIZE`], or when the read blocking factor is not an integer
    /// multiple of the hash grouping factor.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.threads > 0, "thread count must be at least 1");
        ensure!(self.block_size > 0, "block size must be at least 1 byte");
        ensure!(self.read_blocks > 0, "read blocking factor must be at least 1");
        ensure!(self.hash_blocks > 0, "hash grouping factor must be at least 1");
        ensure!(
            self.read_blocks % self.hash_blocks == 0,
            "read blocking factor ({}) must be an integer multiple of hash grouping factor ({})",
            self.read_blocks,
            self.hash_blocks
        );
        ensure!(
            self.group_size().is_some_and(|size| size <= MAX_GROUP_SIZE),
            "block size ({}) times read blocking factor ({}) exceeds the {MAX_GROUP_SIZE} byte group limit",
            self.block_size,
            self.read_blocks
        );

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        let threads = thread::available_parallelism().map_or(FALLBACK_THREADS, std::num::NonZeroUsize::get);

        Self {
            threads,
            block_size: DEFAULT_BLOCK_SIZE,
            read_blocks: DEFAULT_READ_BLOCKS,
            hash_blocks: DEFAULT_HASH_BLOCKS,
            offload: false,
            preload: false,
            compression: DEFAULT_COMPRESSION,
            hashing: DEFAULT_HASHING,
            zstd_level: DEFAULT_ZSTD_LEVEL,
            progress: false,
        }
    }
}
