//! Block compression strategies.
//!
//! The harness only times compression; output is never decompressed or
//! checked in the measured path. Each codec writes into a caller-owned
//! buffer and reports failure by returning 0 instead of an error, so a
//! worker can keep its hot loop free of allocation.
//!
//! A compressor may hold codec state between calls, so every worker builds
//! its own through a [`CompressorFactory`].

use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use strum::{Display, EnumString, VariantNames};

/// Compression algorithm identifiers accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, VariantNames)]
#[strum(serialize_all = "lowercase")]
pub enum CompressionAlgorithm {
    /// LZ4 block format.
    #[default]
    Lz4,
    /// Zstandard, single-shot bulk API.
    Zstd,
    /// Plain copy, to measure the harness overhead alone.
    None,
}

impl CompressionAlgorithm {
    /// Looks an algorithm up by name.
    ///
    /// # Errors
    ///
    /// Returns a usage error naming every accepted identifier.
    pub fn parse(name: &str) -> Result<Self> {
        Self::from_str(name).map_err(|_| anyhow!("invalid compression algorithm {name:?}; please use one of: {}", Self::VARIANTS.join(", ")))
    }

    /// Builds one instance of the strategy for this algorithm.
    ///
    /// # Errors
    ///
    /// Returns an error if the codec cannot set up its context.
    pub fn compressor(self, zstd_level: i32) -> Result<Box<dyn BlockCompressor>> {
        Ok(match self {
            Self::Lz4 => Box::new(Lz4),
            Self::Zstd => Box::new(Zstd::new(zstd_level)?),
            Self::None => Box::new(Passthrough),
        })
    }

    /// A factory handing out a fresh compressor per call.
    #[must_use]
    pub fn factory(self, zstd_level: i32) -> CompressorFactory {
        Box::new(move || self.compressor(zstd_level))
    }
}

/// Builds one compressor per worker.
pub type CompressorFactory = Box<dyn Fn() -> Result<Box<dyn BlockCompressor>> + Send + Sync>;

/// A swappable compression strategy, owned by a single worker.
pub trait BlockCompressor: Send {
    fn name(&self) -> &'static str;

    /// Compresses `src` into `dst` and returns the compressed length.
    ///
    /// `dst` is at least [`COMPRESSION_BUFFER_FACTOR`](crate::config::COMPRESSION_BUFFER_FACTOR)
    /// times `src.len()`. A return value of 0 means the codec failed.
    fn compress(&mut self, src: &[u8], dst: &mut [u8]) -> usize;
}

pub struct Lz4;

impl BlockCompressor for Lz4 {
    fn name(&self) -> &'static str {
        "lz4"
    }

    #[inline]
    fn compress(&mut self, src: &[u8], dst: &mut [u8]) -> usize {
        lz4_flex::block::compress_into(src, dst).unwrap_or(0)
    }
}

/// Zstandard with one compression context reused for every block.
pub struct Zstd {
    context: zstd::bulk::Compressor<'static>,
}

impl Zstd {
    /// # Errors
    ///
    /// Returns an error if the context cannot be created at `level`.
    pub fn new(level: i32) -> Result<Self> {
        let context = zstd::bulk::Compressor::new(level).with_context(|| format!("failed to create zstd context at level {level}"))?;
        Ok(Self { context })
    }
}

impl BlockCompressor for Zstd {
    fn name(&self) -> &'static str {
        "zstd"
    }

    #[inline]
    fn compress(&mut self, src: &[u8], dst: &mut [u8]) -> usize {
        self.context.compress_to_buffer(src, dst).unwrap_or(0)
    }
}

pub struct Passthrough;

impl BlockCompressor for Passthrough {
    fn name(&self) -> &'static str {
        "none"
    }

    #[inline]
    fn compress(&mut self, src: &[u8], dst: &mut [u8]) -> usize {
        match dst.get_mut(..src.len()) {
            Some(out) => {
                out.copy_from_slice(src);
                src.len()
            }
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{COMPRESSION_BUFFER_FACTOR, DEFAULT_BLOCK_SIZE, DEFAULT_ZSTD_LEVEL};

    fn noisy_block() -> Vec<u8> {
        // xorshift keeps the block incompressible without pulling in an RNG.
        let mut state = 0x9E37_79B9_u32;
        (0..DEFAULT_BLOCK_SIZE)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state.to_le_bytes()[0]
            })
            .collect()
    }

    #[test]
    fn test_parse_known_names() {
        assert_eq!(CompressionAlgorithm::parse("lz4").unwrap(), CompressionAlgorithm::Lz4);
        assert_eq!(CompressionAlgorithm::parse("zstd").unwrap(), CompressionAlgorithm::Zstd);
        assert_eq!(CompressionAlgorithm::parse("none").unwrap(), CompressionAlgorithm::None);
    }

    #[test]
    fn test_parse_unknown_name() {
        let err = CompressionAlgorithm::parse("lzf").unwrap_err().to_string();
        assert!(err.contains("invalid compression algorithm"));
        assert!(err.contains("lz4"));
    }

    #[test]
    fn test_names_round_trip_through_display() {
        for algorithm in [CompressionAlgorithm::Lz4, CompressionAlgorithm::Zstd, CompressionAlgorithm::None] {
            let compressor = algorithm.compressor(DEFAULT_ZSTD_LEVEL).unwrap();
            assert_eq!(compressor.name(), algorithm.to_string());
        }
    }

    #[test]
    fn test_compression_actually_compresses() {
        let block = vec![b'a'; DEFAULT_BLOCK_SIZE];
        let mut dst = vec![0u8; COMPRESSION_BUFFER_FACTOR * DEFAULT_BLOCK_SIZE];

        for algorithm in [CompressionAlgorithm::Lz4, CompressionAlgorithm::Zstd] {
            let written = algorithm.compressor(DEFAULT_ZSTD_LEVEL).unwrap().compress(&block, &mut dst);
            assert!(written > 0, "{algorithm} reported failure");
            assert!(written < block.len(), "{algorithm} did not shrink a uniform block");
        }
    }

    #[test]
    fn test_incompressible_block_fits_buffer() {
        let block = noisy_block();
        let mut dst = vec![0u8; COMPRESSION_BUFFER_FACTOR * DEFAULT_BLOCK_SIZE];

        for algorithm in [CompressionAlgorithm::Lz4, CompressionAlgorithm::Zstd, CompressionAlgorithm::None] {
            let written = algorithm.compressor(DEFAULT_ZSTD_LEVEL).unwrap().compress(&block, &mut dst);
            assert!(written > 0 && written <= dst.len(), "{algorithm} wrote {written} bytes");
        }
    }

    #[test]
    fn test_zstd_context_is_reused_across_blocks() {
        let mut zstd = Zstd::new(DEFAULT_ZSTD_LEVEL).unwrap();
        let mut dst = vec![0u8; COMPRESSION_BUFFER_FACTOR * DEFAULT_BLOCK_SIZE];

        let uniform = vec![b'z'; DEFAULT_BLOCK_SIZE];
        let first = zstd.compress(&uniform, &mut dst);
        let _ = zstd.compress(&noisy_block(), &mut dst);
        let again = zstd.compress(&uniform, &mut dst);

        assert!(first > 0);
        assert_eq!(first, again);
        assert_eq!(zstd::bulk::decompress(&dst[..again], DEFAULT_BLOCK_SIZE).unwrap(), uniform);
    }

    #[test]
    fn test_factory_builds_independent_compressors() {
        let factory = CompressionAlgorithm::Zstd.factory(DEFAULT_ZSTD_LEVEL);
        let mut a = factory().unwrap();
        let mut b = factory().unwrap();
        let block = vec![3u8; DEFAULT_BLOCK_SIZE];
        let mut dst = vec![0u8; COMPRESSION_BUFFER_FACTOR * DEFAULT_BLOCK_SIZE];

        assert_eq!(a.compress(&block, &mut dst), b.compress(&block, &mut dst));
    }

    #[test]
    fn test_short_buffer_reports_zero() {
        let block = noisy_block();
        let mut dst = vec![0u8; 16];

        assert_eq!(Passthrough.compress(&block, &mut dst), 0);
        assert_eq!(Lz4.compress(&block, &mut dst), 0);
    }
}
