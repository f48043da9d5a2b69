#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `checksums` provides the checksum primitives used by the dsync file-list
//! toolkit: the byte-incremental weak rolling checksum that locates candidate
//! block matches, and the MD4/MD5 strong digests that confirm them and
//! fingerprint whole files.
//!
//! # Design
//!
//! The crate has two modules:
//!
//! - [`rolling`] implements the Adler-style weak checksum over a fixed-size
//!   window. It can be recomputed from scratch for a block or advanced one
//!   byte at a time in O(1).
//! - [`strong`] wraps the RustCrypto MD4 and MD5 implementations in small
//!   streaming hashers. MD4 confirms weak-sum hits per block; MD5
//!   fingerprints entire files in the list records.
//!
//! # Invariants
//!
//! - `RollingChecksum` truncates both state components to 16 bits after every
//!   update, so the packed 32-bit value is stable across update strategies.
//! - Rolling an empty window is rejected rather than silently corrupting
//!   state.
//!
//! # Errors
//!
//! [`RollingError`] reports invalid rolling operations (an empty window or a
//! window length that overflows 32 bits) and implements
//! [`std::error::Error`].
//!
//! # Examples
//!
//! Compute a rolling checksum for a block and then advance the window.
//!
//! ```
//! use checksums::RollingChecksum;
//!
//! let mut rolling = RollingChecksum::new();
//! rolling.update(b"abcd");
//! rolling.roll(b'a', b'e').unwrap();
//!
//! let mut fresh = RollingChecksum::new();
//! fresh.update(b"bcde");
//! assert_eq!(rolling.value(), fresh.value());
//! ```

pub mod rolling;
pub mod strong;

pub use rolling::{RollingChecksum, RollingError};
pub use strong::{Md4, Md5};
