use std::io;
use std::path::PathBuf;

use thiserror::Error;

use flist::Tag;

/// Error raised while comparing or correcting a local tree.
#[derive(Debug, Error)]
pub enum CompareError {
    /// The list stream failed or is corrupt.
    #[error(transparent)]
    List(#[from] flist::FlistError),
    /// An entry could not be stat'd.
    #[error("unable to stat {path}")]
    Stat {
        /// Path of the entry.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A local directory could not be read.
    #[error("unable to read directory {path}")]
    ReadDir {
        /// Path of the directory.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A directory could not be created.
    #[error("unable to create directory {path}")]
    CreateDir {
        /// Path of the directory.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A symlink could not be created or replaced.
    #[error("unable to create symlink {path}")]
    CreateSymlink {
        /// Path of the link.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A device node could not be created.
    #[error("unable to create device node {path}")]
    CreateDevice {
        /// Path of the node.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A device record carries no permission bits to create the node with.
    #[error("device record for {path} carries no permissions")]
    MissingDevicePermissions {
        /// Path of the node.
        path: PathBuf,
    },
    /// An entry could not be removed.
    #[error("unable to remove {path}")]
    Remove {
        /// Path of the entry.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The tree changed while a recursive delete was running.
    #[error("directory {path} changed while it was being removed")]
    DirectoryChanged {
        /// Path of the directory whose parent changed identity.
        path: PathBuf,
    },
    /// A modification time could not be set.
    #[error("unable to set modification time on {path}")]
    SetTime {
        /// Path of the entry.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Permissions could not be set.
    #[error("unable to set permissions on {path}")]
    SetPerm {
        /// Path of the entry.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A local digest could not be computed.
    #[error("checksum read failed for {path}")]
    Digest {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A record kind the fixer has no handling for reached it.
    #[error("record {tag:?} cannot be applied to a local tree")]
    UnsupportedRecord {
        /// Tag of the offending record.
        tag: Tag,
    },
    /// A directory the list requires could not be entered.
    #[error("unable to enter directory {path}")]
    MissingDirectory {
        /// Path of the directory.
        path: PathBuf,
    },
}
