//! Fixed-size block reading.
//!
//! Inputs are cut into block-groups of `block_size * group_factor` bytes. A
//! final read that comes up short is dropped: it is never zero-filled to a
//! whole group and never reaches a worker.

use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read};
use std::path::Path;
use std::slice::ChunksExact;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::config::{STDIN_PATH, Settings};

/// A whole number of contiguous blocks held in memory.
///
/// The bytes are reference counted so the offload stage can hash a group
/// while the worker that owns it is still compressing the same bytes.
#[derive(Debug, Clone)]
pub struct BlockGroup {
    data: Arc<[u8]>,
    block_size: usize,
}

impl BlockGroup {
    /// Wraps `data` as a group of `block_size` blocks.
    ///
    /// # Panics
    ///
    /// Panics if `data` is not a whole, non-zero number of blocks.
    #[must_use]
    pub fn new(data: impl Into<Arc<[u8]>>, block_size: usize) -> Self {
        let data = data.into();
        assert!(block_size > 0 && !data.is_empty() && data.len() % block_size == 0, "block group of {} bytes is not a whole number of {block_size}-byte blocks", data.len());
        Self { data, block_size }
    }

    #[inline]
    #[must_use]
    pub fn data(&self) -> &Arc<[u8]> {
        &self.data
    }

    #[inline]
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.data.len() / self.block_size
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The blocks of this group, in input order.
    #[inline]
    pub fn blocks(&self) -> ChunksExact<'_, u8> {
        self.data.chunks_exact(self.block_size)
    }
}

/// Cuts inputs into block-groups.
#[derive(Debug, Clone, Copy)]
pub struct BlockSource {
    block_size: usize,
    group_factor: usize,
}

impl BlockSource {
    #[must_use]
    pub fn new(block_size: usize, group_factor: usize) -> Self {
        Self { block_size, group_factor }
    }

    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.block_size, settings.read_blocks)
    }

    #[inline]
    #[must_use]
    pub fn group_size(&self) -> usize {
        self.block_size * self.group_factor
    }

    /// Opens `path` (or standard input for `-`) as a stream of block-groups.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(&self, path: &Path) -> Result<BlockGroups<Box<dyn Read + Send>>> {
        let name = path.display().to_string();

        let reader: Box<dyn Read + Send> = if path.as_os_str() == STDIN_PATH {
            Box::new(io::stdin())
        } else {
            let file = File::open(path).with_context(|| format!("unable to open {name}"))?;
            Box::new(BufReader::new(file))
        };

        Ok(self.groups(reader, name))
    }

    /// Streams block-groups out of an arbitrary reader.
    pub fn groups<R: Read>(&self, reader: R, name: impl Into<String>) -> BlockGroups<R> {
        BlockGroups { reader, name: name.into(), block_size: self.block_size, group_size: self.group_size(), truncated: 0, done: false }
    }

    /// Reads every full block-group of `path` into memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or a read fails.
    pub fn read_all_blocks(&self, path: &Path) -> Result<Vec<BlockGroup>> {
        let mut groups = self.open(path)?;
        let loaded = groups.by_ref().collect::<Result<Vec<_>>>()?;
        if groups.truncated() > 0 {
            debug!(input = groups.name(), bytes = groups.truncated(), "truncated partial read");
        }
        Ok(loaded)
    }
}

/// Iterator over the full block-groups of one input.
pub struct BlockGroups<R> {
    reader: R,
    name: String,
    block_size: usize,
    group_size: usize,
    truncated: usize,
    done: bool,
}

impl<R> BlockGroups<R> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes dropped from the end of the input because they did not fill a group.
    #[must_use]
    pub fn truncated(&self) -> usize {
        self.truncated
    }
}

impl<R: Read> Iterator for BlockGroups<R> {
    type Item = Result<BlockGroup>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut buffer = vec![0u8; self.group_size];
        match fill(&mut self.reader, &mut buffer) {
            Ok(read) if read == self.group_size => Some(Ok(BlockGroup::new(buffer, self.block_size))),
            Ok(read) => {
                self.done = true;
                if read > 0 {
                    self.truncated = read;
                }
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e).with_context(|| format!("failed to read {}", self.name)))
            }
        }
    }
}

/// Reads until `buffer` is full or the input ends, returning the byte count.
fn fill<R: Read>(reader: &mut R, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;

    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    Ok(filled)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tempfile::tempdir;

    use super::*;

    /// Hands out at most three bytes per read call.
    struct Trickle<R>(R);

    impl<R: Read> Read for Trickle<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(3);
            self.0.read(&mut buf[..len])
        }
    }

    #[test]
    fn test_partial_tail_is_discarded() {
        let source = BlockSource::new(16, 1);
        let data: Vec<u8> = (0..=255u8).cycle().take(16 * 5 + 7).collect();

        let groups: Vec<BlockGroup> = source.groups(Cursor::new(&data), "mem").collect::<Result<_>>().unwrap();

        assert_eq!(groups.len(), data.len() / 16);
        let seen: Vec<u8> = groups.iter().flat_map(|g| g.data().iter().copied()).collect();
        assert_eq!(seen, data[..16 * 5]);
    }

    #[test]
    fn test_truncated_bytes_are_counted() {
        let source = BlockSource::new(8, 2);
        let mut groups = source.groups(Cursor::new(vec![1u8; 16 * 2 + 9]), "mem");

        assert_eq!(groups.by_ref().count(), 2);
        assert_eq!(groups.truncated(), 9);
    }

    #[test]
    fn test_short_reads_fill_whole_groups() {
        let source = BlockSource::new(8, 4);
        let data = vec![9u8; 32 * 3];

        let groups: Vec<BlockGroup> = source.groups(Trickle(Cursor::new(data)), "trickle").collect::<Result<_>>().unwrap();

        assert_eq!(groups.len(), 3);
        assert!(groups.iter().all(|g| g.block_count() == 4 && g.len() == 32));
    }

    #[test]
    fn test_input_smaller_than_group_yields_nothing() {
        let source = BlockSource::new(4096, 1);
        let mut groups = source.groups(Cursor::new(vec![0u8; 100]), "tiny");

        assert!(groups.next().is_none());
        assert_eq!(groups.truncated(), 100);
    }

    #[test]
    fn test_read_all_blocks_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("input.bin");
        std::fs::write(&path, vec![3u8; 4096 * 5 + 1000]).unwrap();

        let groups = BlockSource::new(4096, 2).read_all_blocks(&path).unwrap();

        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| g.block_count() == 2));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = BlockSource::new(4096, 1).read_all_blocks(Path::new("/nonexistent/input.bin")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/input.bin"));
    }

    #[test]
    fn test_blocks_iterate_in_order() {
        let group = BlockGroup::new(vec![0u8, 0, 1, 1, 2, 2], 2);
        let blocks: Vec<&[u8]> = group.blocks().collect();
        assert_eq!(blocks, vec![&[0u8, 0][..], &[1, 1][..], &[2, 2][..]]);
    }

    #[test]
    #[should_panic(expected = "not a whole number")]
    fn test_ragged_group_panics() {
        let _ = BlockGroup::new(vec![0u8; 5], 2);
    }
}
