#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![cfg(unix)]

//! # Overview
//!
//! `walk` produces binary file lists from a local directory tree. The
//! [`ListGenerator`] walks a base directory in one of three orders,
//! applies accept and delay filters, and emits one record per entry:
//! directories as `DirStart`/`DirEnd` spans, regular files with optional
//! MD5 digests and checksum blocks, symlinks, hard-link sets and device
//! nodes.
//!
//! # Traversal orders
//!
//! - [`Order::Tree`] recurses into each subdirectory before continuing at
//!   the current level.
//! - [`Order::Breadth`] finishes every directory at one depth before
//!   descending.
//! - [`Order::Depth`] lists every subdirectory's contents before the
//!   directory itself, announcing the directory early with a `DirMarker`.
//!
//! Directories rejected by the delay filter are queued and walked after
//! the rest of the tree.
//!
//! # Digest reuse
//!
//! With a previous list attached as an [`Md5Cache`], files whose recorded
//! mtime and size still match reuse the stored digest instead of being
//! re-read; `strip_depth` rebases lookups for lists captured under a
//! different root.
//!
//! # Atomic replacement
//!
//! [`produce`] writes `<list>.new` and only renames it over `<list>`
//! (via a `<list>~` backup) once the walk has succeeded, so an aborted
//! run never damages the previous list.
//!
//! The walker never changes the process working directory; every
//! filesystem call takes a base-joined path.

mod cache;
mod error;
mod generator;
pub mod paths;

pub use cache::Md5Cache;
pub use error::WalkError;
pub use generator::{produce, ListGenerator, Order, WalkOptions};
