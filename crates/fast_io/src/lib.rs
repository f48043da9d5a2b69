#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `fast_io` provides the two memory-mapped building blocks the dsync
//! toolkit reads files through:
//!
//! - [`MmapFile`] maps a whole file read-only, for random access over frozen
//!   list files.
//! - [`SlidingWindow`] maps a large file in bounded, page-aligned regions so
//!   checksum passes can stream files of any size without paging the whole
//!   file in.
//!
//! All mapping failures surface as [`FastIoError`] with the path preserved.
//! The `unsafe` required by `memmap2` is confined to this crate; the mapped
//! files are frozen inputs (lists and source files mid-scan), matching the
//! usual mmap caveat that the underlying file must not be truncated while
//! mapped.

mod mmap;
mod window;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use mmap::MmapFile;
pub use window::SlidingWindow;

/// Error raised by mapping operations.
#[derive(Debug, Error)]
pub enum FastIoError {
    /// The file could not be opened.
    #[error("unable to open {path}")]
    Open {
        /// Path of the file being opened.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The file length could not be read.
    #[error("unable to stat {path}")]
    Stat {
        /// Path of the file being examined.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A region could not be mapped.
    #[error("unable to map {len} bytes of {path} at offset {offset}")]
    Map {
        /// Path of the file being mapped.
        path: PathBuf,
        /// File offset of the failed mapping.
        offset: u64,
        /// Length of the failed mapping.
        len: u64,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}
