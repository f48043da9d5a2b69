#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![cfg(unix)]

//! # Overview
//!
//! `compare` walks a list stream against a local directory tree and
//! classifies every recorded entity as new, changed, metadata-only or
//! extra, driving an [`Events`] implementation with the outcome. The
//! bundled [`Corrector`] applies the events it can: it creates
//! directories, symlinks and device nodes, repairs mtimes and
//! permissions, and deletes extras. Regular-file content is left to an
//! external transport hooked into the same events.
//!
//! # Per-directory pass
//!
//! Entering a `DirStart` reads the local directory's names into a table;
//! each record consumes its name, and whatever is still live at `DirEnd`
//! is the delete set. A directory that cannot be read in verify mode
//! marks the whole span missing: every child reports as new and nothing
//! is deleted.
//!
//! The comparator never changes the process working directory; local
//! paths are built by joining onto the base.
//!
//! # Examples
//!
//! Count what a synchronization would do, without touching anything:
//!
//! ```no_run
//! use compare::{compare, CompareOptions, Entry, Events, CompareError};
//! use flist::{ListIo, MmapStream};
//!
//! #[derive(Default)]
//! struct Count(usize);
//!
//! impl Events for Count {
//!     fn on_new(&mut self, _: &Entry<'_>) -> Result<(), CompareError> {
//!         self.0 += 1;
//!         Ok(())
//!     }
//! }
//!
//! let mut io = ListIo::new(MmapStream::open("archive.list")?);
//! let mut count = Count::default();
//! compare(&mut io, "/srv/mirror".as_ref(), CompareOptions::default(), &mut count)?;
//! println!("{} entries missing locally", count.0);
//! # Ok::<(), compare::CompareError>(())
//! ```

mod compare;
mod correct;
mod error;
mod events;

pub use compare::{compare, CompareOptions, DirCompare, HashPolicy};
pub use correct::Corrector;
pub use error::CompareError;
pub use events::{Entry, Events};
