//! Per-block hashing strategies.
//!
//! A hashing call covers a run of consecutive blocks and produces one
//! fixed-size digest per block, laid out back to back in the destination.

use std::str::FromStr;

use anyhow::{Result, anyhow, ensure};
use sha2::{Digest, Sha256};
use strum::{Display, EnumString, VariantNames};

/// Hashing algorithm identifiers accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, VariantNames)]
#[strum(serialize_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Blake3,
    Sha256,
    Crc32,
}

impl HashAlgorithm {
    /// Looks an algorithm up by name.
    ///
    /// # Errors
    ///
    /// Returns a usage error naming every accepted identifier.
    pub fn parse(name: &str) -> Result<Self> {
        Self::from_str(name).map_err(|_| anyhow!("invalid hashing algorithm {name:?}; please use one of: {}", Self::VARIANTS.join(", ")))
    }

    #[must_use]
    pub fn hasher(self) -> Box<dyn BlockHasher> {
        match self {
            Self::Blake3 => Box::new(Blake3),
            Self::Sha256 => Box::new(Sha256Blocks),
            Self::Crc32 => Box::new(Crc32),
        }
    }
}

/// A swappable hashing strategy.
pub trait BlockHasher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Size in bytes of a single block digest.
    fn digest_size(&self) -> usize;

    /// Writes the digest of one block into `out`, which is exactly
    /// [`digest_size`](Self::digest_size) bytes long.
    fn digest_into(&self, block: &[u8], out: &mut [u8]);

    /// Hashes every `block_size` block of `src` into `dst`.
    ///
    /// # Errors
    ///
    /// Fails when `src` is not a whole number of blocks or when `dst` is not
    /// exactly one digest per block.
    fn hash(&self, src: &[u8], block_size: usize, dst: &mut [u8]) -> Result<()> {
        ensure!(block_size > 0 && src.len() % block_size == 0, "{} input of {} bytes is not a whole number of {block_size}-byte blocks", self.name(), src.len());

        let digest_size = self.digest_size();
        let count = src.len() / block_size;
        ensure!(dst.len() == count * digest_size, "{} digest buffer holds {} bytes, {count} blocks need {}", self.name(), dst.len(), count * digest_size);

        for (block, out) in src.chunks_exact(block_size).zip(dst.chunks_exact_mut(digest_size)) {
            self.digest_into(block, out);
        }

        Ok(())
    }
}

pub struct Blake3;

impl BlockHasher for Blake3 {
    fn name(&self) -> &'static str {
        "blake3"
    }

    fn digest_size(&self) -> usize {
        blake3::OUT_LEN
    }

    #[inline]
    fn digest_into(&self, block: &[u8], out: &mut [u8]) {
        out.copy_from_slice(blake3::hash(block).as_bytes());
    }
}

pub struct Sha256Blocks;

impl BlockHasher for Sha256Blocks {
    fn name(&self) -> &'static str {
        "sha256"
    }

    fn digest_size(&self) -> usize {
        32
    }

    #[inline]
    fn digest_into(&self, block: &[u8], out: &mut [u8]) {
        out.copy_from_slice(&Sha256::digest(block));
    }
}

pub struct Crc32;

impl BlockHasher for Crc32 {
    fn name(&self) -> &'static str {
        "crc32"
    }

    fn digest_size(&self) -> usize {
        4
    }

    #[inline]
    fn digest_into(&self, block: &[u8], out: &mut [u8]) {
        out.copy_from_slice(&crc32fast::hash(block).to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: usize = 64;

    #[test]
    fn test_parse_known_names() {
        assert_eq!(HashAlgorithm::parse("blake3").unwrap(), HashAlgorithm::Blake3);
        assert_eq!(HashAlgorithm::parse("sha256").unwrap(), HashAlgorithm::Sha256);
        assert_eq!(HashAlgorithm::parse("crc32").unwrap(), HashAlgorithm::Crc32);
    }

    #[test]
    fn test_parse_unknown_name() {
        let err = HashAlgorithm::parse("skein").unwrap_err().to_string();
        assert!(err.contains("invalid hashing algorithm"));
        assert!(err.contains("blake3"));
    }

    #[test]
    fn test_one_digest_per_block() {
        let mut src = vec![0u8; 3 * BLOCK];
        src[BLOCK] = 1;

        for algorithm in [HashAlgorithm::Blake3, HashAlgorithm::Sha256, HashAlgorithm::Crc32] {
            let hasher = algorithm.hasher();
            let size = hasher.digest_size();
            let mut dst = vec![0u8; 3 * size];

            hasher.hash(&src, BLOCK, &mut dst).unwrap();

            // Blocks 0 and 2 are identical, block 1 differs.
            assert_eq!(dst[..size], dst[2 * size..], "{algorithm}");
            assert_ne!(dst[..size], dst[size..2 * size], "{algorithm}");
        }
    }

    #[test]
    fn test_digest_matches_reference() {
        let block = [7u8; BLOCK];
        let mut dst = [0u8; 32];

        Blake3.hash(&block, BLOCK, &mut dst).unwrap();
        assert_eq!(&dst, blake3::hash(&block).as_bytes());

        Sha256Blocks.hash(&block, BLOCK, &mut dst).unwrap();
        assert_eq!(dst[..], Sha256::digest(block)[..]);
    }

    #[test]
    fn test_partial_block_rejected() {
        let src = vec![0u8; BLOCK + 1];
        let mut dst = vec![0u8; 64];
        assert!(Blake3.hash(&src, BLOCK, &mut dst).is_err());
    }

    #[test]
    fn test_wrong_digest_buffer_rejected() {
        let src = vec![0u8; 2 * BLOCK];
        let mut dst = vec![0u8; 4];
        assert!(Crc32.hash(&src, BLOCK, &mut dst).is_err());
    }
}
