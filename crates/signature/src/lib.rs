#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `signature` computes the per-block checksum record for one regular
//! file: a 4-byte big-endian rolling sum and a 16-byte MD4 digest for each
//! fixed-size block, with a sentinel tuple covering the trailing partial
//! block when the size is not a block multiple. The whole-file MD5 falls
//! out of the same pass, so large files are read exactly once through a
//! bounded sliding window.
//!
//! # Examples
//!
//! ```no_run
//! use signature::{generate, DEFAULT_BLOCK_SIZE};
//!
//! let (block, md5) = generate("/var/lib/archive/Packages", DEFAULT_BLOCK_SIZE)?;
//! assert_eq!(block.block_size, DEFAULT_BLOCK_SIZE);
//! println!("{} blocks, md5 {:02x?}", block.block_count(), md5);
//! # Ok::<(), signature::SignatureError>(())
//! ```

use std::path::Path;

use checksums::rolling::block_checksum;
use checksums::{Md4, Md5};
use fast_io::{FastIoError, SlidingWindow};
use flist::ChecksumBlock;
use thiserror::Error;

/// Default uniform block size for checksum generation.
pub const DEFAULT_BLOCK_SIZE: u64 = 8 * 1024;

/// Error raised while generating a checksum block.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// The file could not be mapped or read.
    #[error(transparent)]
    Io(#[from] FastIoError),
    /// A zero block size cannot describe a non-empty file.
    #[error("block size must be non-zero")]
    ZeroBlockSize,
    /// The pass produced a different number of tuples than the file size
    /// demands; the file changed underneath the scan.
    #[error("size mismatch generating checksums: got {got} tuples, expected {expected}")]
    SizeMismatch {
        /// Tuples produced.
        got: usize,
        /// Tuples the file size called for.
        expected: usize,
    },
}

/// Computes the checksum block and whole-file MD5 for `path`.
///
/// Every full block contributes a rolling-sum/MD4 tuple; a trailing
/// partial block contributes the sentinel tuple. The MD5 covers the exact
/// file bytes with no padding or framing.
pub fn generate(
    path: impl AsRef<Path>,
    block_size: u64,
) -> Result<(ChecksumBlock, [u8; 16]), SignatureError> {
    if block_size == 0 {
        return Err(SignatureError::ZeroBlockSize);
    }
    let path = path.as_ref();
    // Keep at least two blocks mapped so a block never straddles a remap.
    let mut window = SlidingWindow::with_min_size(path, block_size.saturating_mul(2))?;
    let file_size = window.len();
    let block = usize::try_from(block_size).map_err(|_| SignatureError::ZeroBlockSize)?;

    let expected = file_size.div_ceil(block_size) as usize;
    let mut sums = Vec::with_capacity(expected * ChecksumBlock::TUPLE_LEN);
    let mut md5 = Md5::new();

    let mut pos = 0u64;
    loop {
        let win = window.advance(pos)?;
        if win.len() >= block {
            // Consume every whole block the region holds.
            let mut off = 0usize;
            while win.len() - off >= block {
                let data = &win[off..off + block];
                sums.extend_from_slice(&block_checksum(data).to_be_bytes());
                sums.extend_from_slice(&Md4::digest(data));
                md5.update(data);
                off += block;
            }
            pos += off as u64;
            continue;
        }

        // Fewer than a block left: this is the tail of the file.
        if !win.is_empty() {
            sums.extend_from_slice(&ChecksumBlock::SENTINEL.to_be_bytes());
            sums.extend_from_slice(&Md4::digest(win));
            md5.update(win);
        }
        break;
    }

    let got = sums.len() / ChecksumBlock::TUPLE_LEN;
    if got != expected {
        return Err(SignatureError::SizeMismatch { got, expected });
    }

    Ok((
        ChecksumBlock {
            block_size,
            file_size,
            sums,
        },
        md5.finalize(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_temp(data: &[u8]) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(data).unwrap();
        tmp
    }

    #[test]
    fn empty_file_has_no_tuples() {
        let tmp = write_temp(b"");
        let (block, md5) = generate(tmp.path(), 8).unwrap();
        assert_eq!(block.file_size, 0);
        assert_eq!(block.block_count(), 0);
        assert_eq!(md5, Md5::digest(b""));
    }

    #[test]
    fn exact_multiple_has_no_sentinel() {
        let data = vec![7u8; 32];
        let tmp = write_temp(&data);
        let (block, md5) = generate(tmp.path(), 8).unwrap();
        assert_eq!(block.block_count(), 4);
        assert!(!block.has_sentinel());
        assert_eq!(md5, Md5::digest(&data));
        for i in 0..4 {
            assert_eq!(block.rolling(i), block_checksum(&data[i * 8..(i + 1) * 8]));
            assert_eq!(block.strong(i), &Md4::digest(&data[i * 8..(i + 1) * 8])[..]);
        }
    }

    #[test]
    fn partial_tail_gets_the_sentinel() {
        let data: Vec<u8> = (0..29u8).collect();
        let tmp = write_temp(&data);
        let (block, md5) = generate(tmp.path(), 8).unwrap();
        assert_eq!(block.block_count(), 4);
        assert!(block.has_sentinel());
        assert_eq!(block.rolling(3), ChecksumBlock::SENTINEL);
        assert_eq!(block.strong(3), &Md4::digest(&data[24..])[..]);
        assert_eq!(md5, Md5::digest(&data));
    }

    #[test]
    fn zero_block_size_is_rejected() {
        let tmp = write_temp(b"abc");
        assert!(matches!(
            generate(tmp.path(), 0),
            Err(SignatureError::ZeroBlockSize)
        ));
    }
}
