use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Error raised while reading or writing a binary file list.
///
/// Format variants mean the stream is corrupt (or truncated); the cursor
/// position is unspecified afterwards and the caller must abandon the
/// stream.
#[derive(Debug, Error)]
pub enum FlistError {
    /// An underlying I/O operation failed.
    #[error("list I/O failed on {path}")]
    Io {
        /// Path of the stream's backing file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A read ran past the end of the stream.
    #[error("unexpected end of list stream")]
    UnexpectedEof,
    /// A seek target lies outside the stream.
    #[error("attempt to seek past end of list stream")]
    SeekOutOfRange,
    /// A write was attempted on a read-only stream.
    #[error("attempt to write to a read-only list stream")]
    ReadOnly,
    /// A record tag byte is not part of the format.
    #[error("corrupted list: unknown record tag {tag:#04x}")]
    UnknownTag {
        /// The unrecognized tag byte.
        tag: u8,
    },
    /// A filter record's type byte is neither include nor exclude.
    #[error("corrupted list: filter record with unknown type {kind}")]
    BadFilterType {
        /// The unrecognized type byte.
        kind: u8,
    },
    /// The header signature does not match the format constant.
    #[error("corrupted list: bad header signature {found:#010x}")]
    BadSignature {
        /// The signature found on the wire.
        found: u32,
    },
    /// The trailer signature does not match the format constant.
    #[error("corrupted list: bad trailer signature {found:#010x}")]
    BadTrailerSignature {
        /// The signature found on the wire.
        found: u32,
    },
    /// A string exceeds the format's length cap.
    #[error("string of {len} bytes exceeds the record limit")]
    StringTooLong {
        /// Length of the offending string.
        len: usize,
    },
    /// String bytes are not valid UTF-8.
    #[error("string in list record is not valid UTF-8")]
    InvalidString,
    /// A variable-byte integer kept its continuation bit past 64 bits.
    #[error("variable-length integer overflows 64 bits")]
    IntegerOverflow,
    /// A modification-time offset does not fit the record's signed 32 bits.
    #[error("modification time offset {delta} does not fit the record")]
    TimeOutOfRange {
        /// The out-of-range offset in seconds.
        delta: i64,
    },
    /// A symlink record references more of the previous target than exists.
    #[error("corrupted list: symlink compression prefix of {prefix} exceeds previous target")]
    BadSymlinkCompression {
        /// The prefix length claimed by the record.
        prefix: usize,
    },
    /// A checksum record's geometry is inconsistent.
    #[error("corrupted list: checksum record with block size {block_size} over {file_size} bytes")]
    InvalidChecksumBlock {
        /// Block size claimed by the record.
        block_size: u64,
        /// File size claimed by the record.
        file_size: u64,
    },
}

impl From<fast_io::FastIoError> for FlistError {
    fn from(err: fast_io::FastIoError) -> Self {
        match err {
            fast_io::FastIoError::Open { path, source }
            | fast_io::FastIoError::Stat { path, source }
            | fast_io::FastIoError::Map { path, source, .. } => Self::Io { path, source },
        }
    }
}
