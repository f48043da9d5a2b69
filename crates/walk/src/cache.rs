//! Digest reuse against a previous list.

use std::path::Path;

use flist::{ListIndex, ListIo, MmapStream, Record};
use tracing::warn;

use crate::error::WalkError;
use crate::paths::{self, LinkCache};

/// Previous-list digest cache.
///
/// Wraps an indexed, memory-mapped list and answers "do we already know
/// this file's MD5" queries, guarded by an exact mtime and size match.
/// [`lookup`](Md5Cache::lookup) takes the `(directory, name)` pair the
/// walker already has in hand; [`lookup_path`](Md5Cache::lookup_path)
/// takes a raw local path, normalizing it and resolving its symlinks
/// first. `strip_depth` allows `(directory, name)` lookups against a
/// list captured under a different root by retrying with leading path
/// components removed.
#[derive(Debug)]
pub struct Md5Cache {
    io: ListIo<MmapStream>,
    index: ListIndex,
    links: LinkCache,
    strip_depth: usize,
}

impl Md5Cache {
    /// Opens and indexes a previous list.
    pub fn open(list: impl AsRef<Path>, strip_depth: usize) -> Result<Self, WalkError> {
        let mut io = ListIo::new(MmapStream::open(list)?);
        let index = ListIndex::build(&mut io)?;
        Ok(Self {
            io,
            index,
            links: LinkCache::default(),
            strip_depth,
        })
    }

    /// Looks up a stored digest for `(dir, name)`.
    ///
    /// Returns the digest only when the recorded mtime and size both equal
    /// the file's current values. Corrupt regions of the previous list are
    /// treated as misses, never as errors.
    pub fn lookup(&mut self, dir: &str, name: &str, mtime: i64, size: u64) -> Option<[u8; 16]> {
        let mut lookup_dir = dir;
        let mut strip = self.strip_depth;
        loop {
            match self.index.lookup(&mut self.io, lookup_dir, name) {
                Ok(Some(record)) => {
                    return self.digest_if_current(&record, mtime, size);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(error = %err, "previous list unreadable during digest lookup");
                    return None;
                }
            }

            // Retry with the leading path component stripped.
            if strip == 0 {
                return None;
            }
            strip -= 1;
            let slash = lookup_dir.find('/')?;
            if slash + 1 >= lookup_dir.len() {
                return None;
            }
            lookup_dir = &lookup_dir[slash + 1..];
        }
    }

    /// Looks up a stored digest by local path.
    ///
    /// The path is simplified and resolved symlink-free, final component
    /// included, before the `(directory, name)` query, so a path that
    /// reaches a listed file through links still hits. The same mtime and
    /// size guard applies as for [`lookup`](Md5Cache::lookup).
    pub fn lookup_path(&mut self, path: &str, mtime: i64, size: u64) -> Option<[u8; 16]> {
        match paths::lookup_path(path, &mut self.index, &mut self.io, &mut self.links) {
            Ok(Some(record)) => self.digest_if_current(&record, mtime, size),
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "path lookup against previous list failed");
                None
            }
        }
    }

    /// Returns the record's digest when its mtime and size still match.
    fn digest_if_current(&self, record: &Record, mtime: i64, size: u64) -> Option<[u8; 16]> {
        let entity = record.entity()?;
        let recorded = i64::from(entity.mtime) + self.io.header.epoch as i64;
        if recorded != mtime {
            return None;
        }
        let file = record.file()?;
        if file.size != size {
            return None;
        }
        Some(file.md5)
    }
}
