#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `matching` finds blocks of a recorded file inside a local target file.
//! A [`Matcher`] is built from a stored checksum block: the full-block
//! tuples are sorted by rolling value behind a 256-bucket first-byte table
//! and a 64 Ki-bit negative filter. [`Matcher::scan`] then slides a
//! one-block window over the target byte by byte, probing the filter on
//! every position and confirming candidates with MD4 before reporting a
//! [`Hit`].
//!
//! The sentinel tuple covering a file's partial tail never enters the
//! index, so it can never produce a hit.

mod bitmap;

use std::path::Path;

use checksums::{Md4, RollingChecksum, RollingError};
use fast_io::{FastIoError, SlidingWindow};
use flist::ChecksumBlock;
use thiserror::Error;

use bitmap::Bitmap;

/// Error raised while scanning a target file.
#[derive(Debug, Error)]
pub enum MatchError {
    /// The target could not be mapped or read.
    #[error(transparent)]
    Io(#[from] FastIoError),
    /// The rolling window could not be advanced.
    #[error(transparent)]
    Rolling(#[from] RollingError),
}

/// One confirmed block match in the target file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Hit {
    /// Index of the matched block in the stored checksum array.
    pub block: usize,
    /// Byte offset of the matching window in the target file.
    pub offset: u64,
}

/// Search index over the full-block checksums of one stored file.
#[derive(Debug)]
pub struct Matcher<'a> {
    sums: &'a ChecksumBlock,
    /// Block indices sorted by rolling value.
    order: Vec<usize>,
    /// `buckets[b]` is the first position in `order` whose rolling value
    /// has a high byte of at least `b`; `buckets[256]` is the end.
    buckets: [usize; 257],
    /// One bit per `rolling >> 16` value for O(1) negative probes.
    fast: Bitmap,
}

impl<'a> Matcher<'a> {
    /// Builds the index over every full block of `sums`.
    ///
    /// The sentinel tuple for a trailing partial block is excluded.
    #[must_use]
    pub fn new(sums: &'a ChecksumBlock) -> Self {
        let full = sums.full_block_count();
        let mut order: Vec<usize> = (0..full).collect();
        order.sort_unstable_by_key(|&i| (sums.rolling(i), i));

        let mut fast = Bitmap::new(1 << 16);
        for &i in &order {
            fast.set((sums.rolling(i) >> 16) as usize);
        }

        let mut buckets = [0usize; 257];
        for (bucket, slot) in buckets.iter_mut().enumerate() {
            *slot = order.partition_point(|&i| (sums.rolling(i) >> 24) < bucket as u32);
        }

        Self {
            sums,
            order,
            buckets,
            fast,
        }
    }

    /// Number of blocks in the index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if the index holds no blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Confirms a 32-bit rolling match against the strong sums.
    fn confirm(&self, value: u32, window: &[u8]) -> Option<usize> {
        let hi = (value >> 24) as usize;
        let slice = &self.order[self.buckets[hi]..self.buckets[hi + 1]];
        let start = slice.partition_point(|&i| self.sums.rolling(i) < value);
        if start == slice.len() || self.sums.rolling(slice[start]) != value {
            return None;
        }
        let digest = Md4::digest(window);
        for &i in &slice[start..] {
            if self.sums.rolling(i) != value {
                break;
            }
            if self.sums.strong(i) == digest.as_slice() {
                return Some(i);
            }
        }
        None
    }

    /// Scans `target`, reporting every confirmed block match to `on_hit`.
    ///
    /// Matches are non-overlapping: after a hit the window jumps a whole
    /// block; otherwise it slides by one byte.
    pub fn scan<F>(&self, target: impl AsRef<Path>, mut on_hit: F) -> Result<(), MatchError>
    where
        F: FnMut(Hit),
    {
        let block = self.sums.block_size as usize;
        if block == 0 || self.order.is_empty() {
            return Ok(());
        }
        let mut window = SlidingWindow::with_min_size(target, self.sums.block_size.saturating_mul(2))?;
        let len = window.len();

        let mut pos = 0u64;
        'regions: while pos + block as u64 <= len {
            let win = window.advance(pos)?;
            let mut off = 0usize;
            let mut sum = RollingChecksum::new();
            sum.update(&win[..block]);

            loop {
                let value = sum.value();
                if self.fast.get((value >> 16) as usize) {
                    if let Some(index) = self.confirm(value, &win[off..off + block]) {
                        on_hit(Hit {
                            block: index,
                            offset: pos + off as u64,
                        });
                        // Jump a whole block; restart the rolling state.
                        if off + 2 * block <= win.len() {
                            off += block;
                            sum.update_from_block(&win[off..off + block]);
                            continue;
                        }
                        pos += (off + block) as u64;
                        continue 'regions;
                    }
                }

                if off + block < win.len() {
                    sum.roll(win[off], win[off + block])?;
                    off += 1;
                } else {
                    // Region exhausted: either the file ends here or the
                    // next window starts in a fresh mapping.
                    if pos + (off + block) as u64 >= len {
                        break 'regions;
                    }
                    pos += off as u64 + 1;
                    continue 'regions;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_of(data: &[u8], block_size: u64) -> ChecksumBlock {
        use checksums::rolling::block_checksum;
        let mut sums = Vec::new();
        let block = block_size as usize;
        let full = data.len() / block;
        for i in 0..full {
            let chunk = &data[i * block..(i + 1) * block];
            sums.extend_from_slice(&block_checksum(chunk).to_be_bytes());
            sums.extend_from_slice(&Md4::digest(chunk));
        }
        if data.len() % block != 0 {
            sums.extend_from_slice(&ChecksumBlock::SENTINEL.to_be_bytes());
            sums.extend_from_slice(&Md4::digest(&data[full * block..]));
        }
        ChecksumBlock {
            block_size,
            file_size: data.len() as u64,
            sums,
        }
    }

    #[test]
    fn index_excludes_the_sentinel() {
        let data: Vec<u8> = (0..100u8).collect();
        let block = block_of(&data, 32);
        assert_eq!(block.block_count(), 4);
        let matcher = Matcher::new(&block);
        assert_eq!(matcher.len(), 3);
    }

    #[test]
    fn exact_multiple_indexes_every_block() {
        let data = vec![1u8; 128];
        let block = block_of(&data, 32);
        let matcher = Matcher::new(&block);
        assert_eq!(matcher.len(), 4);
    }

    #[test]
    fn confirm_rejects_weak_collisions() {
        // Two different blocks with different strong sums; probing with the
        // wrong window bytes must not confirm.
        let data: Vec<u8> = (0..64u8).collect();
        let block = block_of(&data, 32);
        let matcher = Matcher::new(&block);
        let value = block.rolling(0);
        assert!(matcher.confirm(value, &data[..32]).is_some());
        assert!(matcher.confirm(value, &data[32..]).is_none());
    }
}
