use std::ffi::OsString;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Error raised while producing a file list.
#[derive(Debug, Error)]
pub enum WalkError {
    /// An entry could not be stat'd.
    #[error("unable to stat {path}")]
    Stat {
        /// Path of the entry.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A directory could not be opened or read.
    #[error("unable to read directory {path}")]
    ReadDir {
        /// Path of the directory.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A symlink target could not be read.
    #[error("unable to read symbolic link {path}")]
    ReadLink {
        /// Path of the link.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A file could not be opened or read for digest computation.
    #[error("checksum read failed for {path}")]
    Digest {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// An entry is neither a file, directory, symlink nor device node.
    #[error("{path} is not a recognized file type")]
    UnknownFileType {
        /// Path of the entry.
        path: PathBuf,
    },
    /// A name cannot be represented in the list format.
    #[error("file name {name:?} is not valid UTF-8")]
    NonUtf8Name {
        /// The offending name.
        name: OsString,
    },
    /// Ownership recording was requested but is not supported.
    #[error("uid/gid recording is not supported")]
    OwnershipUnsupported,
    /// An mtime lies too far from the list epoch to encode.
    #[error("modification time of {path} does not fit the list epoch window")]
    TimeOutOfRange {
        /// Path of the entry.
        path: PathBuf,
    },
    /// The finished list could not be renamed into place.
    #[error("unable to replace {path}")]
    Rename {
        /// Path being replaced.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A path simplifies to something outside its root.
    #[error("invalid path {path:?}: too many parent references")]
    PathEscapes {
        /// The offending path.
        path: String,
    },
    /// Symlink resolution exceeded the recursion cap.
    #[error("exceeded allowed symlink depth resolving {path:?}")]
    LinkDepthExceeded {
        /// The path being resolved.
        path: String,
    },
    /// The output stream failed.
    #[error(transparent)]
    List(#[from] flist::FlistError),
    /// Checksum-block generation failed.
    #[error(transparent)]
    Signature(#[from] signature::SignatureError),
}
