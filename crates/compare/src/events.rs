//! Event hooks driven by the comparator.

use std::path::{Path, PathBuf};

use flist::Record;

use crate::error::CompareError;

/// One classified record with the context a handler needs to act on it.
#[derive(Debug)]
pub struct Entry<'a> {
    /// The record being classified.
    pub record: &'a Record,
    /// Directory part of the record's location within the list (with
    /// trailing `/`, empty for the root).
    pub dir: &'a str,
    /// Absolute local path of the entity.
    pub path: PathBuf,
    /// Header flag word for the record's tag.
    pub flags: u32,
    /// Header epoch, the base for the record's mtime offset.
    pub epoch: u64,
}

impl Entry<'_> {
    /// Absolute recorded modification time in Unix seconds.
    #[must_use]
    pub fn mtime(&self) -> i64 {
        let delta = self.record.entity().map_or(0, |e| i64::from(e.mtime));
        self.epoch as i64 + delta
    }

    /// Recorded permission bits.
    #[must_use]
    pub fn perm(&self) -> u32 {
        self.record.entity().map_or(0, |e| u32::from(e.perm))
    }
}

/// Callbacks receiving the comparator's verdicts.
///
/// Every hook defaults to doing nothing, so an implementation only
/// overrides what it observes or applies. Returning an error aborts the
/// comparison; the local tree is left in whatever intermediate state the
/// earlier events produced.
#[allow(unused_variables)]
pub trait Events {
    /// The entity does not exist locally (or its broken replacement was
    /// just deleted). Correctors create directories, symlinks and device
    /// nodes here; file content arrives through a transport.
    fn on_new(&mut self, entry: &Entry<'_>) -> Result<(), CompareError> {
        Ok(())
    }

    /// A regular file exists locally but its content is out of date.
    fn on_changed(&mut self, entry: &Entry<'_>) -> Result<(), CompareError> {
        Ok(())
    }

    /// `path` exists locally but is not in the list (or must be replaced).
    /// `now` is set for in-place replacements ahead of an `on_new`.
    fn on_delete(&mut self, path: &Path, now: bool) -> Result<(), CompareError> {
        Ok(())
    }

    /// The entity's content is fine but its mtime differs.
    fn on_set_time(&mut self, entry: &Entry<'_>) -> Result<(), CompareError> {
        Ok(())
    }

    /// The entity's content is fine but its permissions differ.
    fn on_set_perm(&mut self, entry: &Entry<'_>) -> Result<(), CompareError> {
        Ok(())
    }

    /// The entity's recorded ownership differs. Ownership mutation is not
    /// implemented anywhere in the toolkit; handlers surface this as a
    /// diagnostic.
    fn on_set_owners(&mut self, entry: &Entry<'_>) -> Result<(), CompareError> {
        Ok(())
    }

    /// The comparator is about to hash the local file to decide between
    /// metadata repair and content transfer.
    fn on_check_hash(&mut self, entry: &Entry<'_>) -> Result<(), CompareError> {
        Ok(())
    }
}
