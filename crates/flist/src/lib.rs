#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `flist` implements the compact binary file-list format at the heart of
//! the dsync toolkit. A list is a single linear stream: one [`Header`],
//! a sequence of typed records describing directories, files, symlinks,
//! devices and checksum blocks, and one [`Trailer`].
//!
//! # Design
//!
//! - [`ListStream`] is the minimal cursor contract (`read`, `write`, `seek`,
//!   `tell`). [`MmapStream`] provides random access over a frozen list;
//!   [`FileStream`] backs the producer's output.
//! - [`ListIo`] layers the framing codec on a stream: variable-byte
//!   integers, fixed-width little-endian integers, length-prefixed strings,
//!   plus the decoding context every record needs (the header's per-tag flag
//!   masks and the previous symlink target for target compression).
//! - [`Record`] is the typed sum of every record in the format, with
//!   [`Record::step`] as the forward cursor and [`Record::write`] as the
//!   symmetric encoder.
//! - [`ListIndex`] scans a list once and then answers random
//!   `(directory, name)` lookups, reusing the cursor position when queries
//!   stay within one directory.
//!
//! # Invariants
//!
//! - A valid list starts with exactly one header and ends with exactly one
//!   trailer; `DirStart`/`DirEnd` records nest without interleaving.
//! - The header's per-tag flag words are the sole authority on which
//!   optional fields are present; decoders never guess.
//! - After any [`FlistError`] from a decoder the stream position is
//!   unspecified and the cursor must not be stepped again.
//!
//! # Examples
//!
//! ```
//! use flist::{Entity, FileRecord, Header, ListIo, Record, Trailer, VecStream};
//!
//! let mut io = ListIo::new(VecStream::new());
//! io.write_header(Header::with_epoch(1_000_000))?;
//! Record::NormalFile(FileRecord {
//!     entity: Entity { mtime: 5, name: "hello".into(), ..Entity::default() },
//!     size: 3,
//!     md5: [0; 16],
//! })
//! .write(&mut io)?;
//! Record::Trailer(Trailer::new()).write(&mut io)?;
//!
//! io.seek(0)?;
//! assert!(matches!(Record::step(&mut io)?, Record::Header(_)));
//! assert!(matches!(Record::step(&mut io)?, Record::NormalFile(_)));
//! assert!(matches!(Record::step(&mut io)?, Record::Trailer(_)));
//! # Ok::<(), flist::FlistError>(())
//! ```

mod error;
mod index;
mod io;
mod record;

pub use error::FlistError;
pub use index::ListIndex;
pub use io::{FileStream, ListIo, ListStream, MmapStream, VecStream};
pub use record::{
    AggregateFile, ChecksumBlock, DeviceRecord, Entity, FileRecord, FilterKind, FilterRecord,
    HardLinkRecord, Header, IdMapRecord, Record, SymlinkRecord, Tag, Trailer, FL_MD5, FL_OWNER,
    FL_PERM, FL_REAL_ID, FLAG_WORDS, LIST_SIGNATURE, TRAILER_SIGNATURE,
};
