//! Random-access `(directory, name)` lookup over a frozen list.

use rustc_hash::FxHashMap;

use crate::error::FlistError;
use crate::io::{ListIo, ListStream};
use crate::record::{Record, Tag};

/// Saved position of one directory's contents within the list.
#[derive(Clone, Debug)]
struct Location {
    /// Stream offset just past the directory's `DirStart` record.
    offset: u64,
    /// Symlink-compression context in force at that offset.
    last_symlink: String,
}

/// Directory index over a list stream.
///
/// [`build`](ListIndex::build) makes one linear pass recording where each
/// directory's contents begin; [`lookup`](ListIndex::lookup) then answers
/// `(directory, name)` queries. Consecutive lookups within one directory
/// continue scanning from the cursor's current position instead of
/// re-seeking, which makes a pass over a largely unchanged directory cost
/// one scan of its records. When the scan runs off the end of the
/// directory it seeks back to the start exactly once; a second miss is a
/// negative result.
#[derive(Debug, Default)]
pub struct ListIndex {
    map: FxHashMap<String, Location>,
    last_dir: String,
}

impl ListIndex {
    /// Scans the whole list and records every directory's start position.
    pub fn build<S: ListStream>(io: &mut ListIo<S>) -> Result<Self, FlistError> {
        io.seek(0)?;
        io.last_symlink.clear();
        let mut map = FxHashMap::default();
        loop {
            let record = Record::step(io)?;
            // Record the position after the record so lookups resume at the
            // first content record.
            let offset = io.tell();
            match record {
                Record::Trailer(_) => {
                    return Ok(Self {
                        map,
                        last_dir: String::new(),
                    });
                }
                Record::DirStart(entity) => {
                    let last_symlink = io.last_symlink.clone();
                    map.insert(
                        entity.name,
                        Location {
                            offset,
                            last_symlink,
                        },
                    );
                }
                _ => {}
            }
        }
    }

    /// Returns `true` if the list contains a `DirStart` for `dir`.
    #[must_use]
    pub fn contains_dir(&self, dir: &str) -> bool {
        self.map.contains_key(dir)
    }

    /// Number of indexed directories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the list contained no directories.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Looks up the record named `file` inside `dir`.
    ///
    /// Returns `Ok(None)` when the directory is not indexed or the name is
    /// not among its contents.
    pub fn lookup<S: ListStream>(
        &mut self,
        io: &mut ListIo<S>,
        dir: &str,
        file: &str,
    ) -> Result<Option<Record>, FlistError> {
        let Some(location) = self.map.get(dir) else {
            return Ok(None);
        };

        // `restart` means the cursor is already inside this directory and
        // one seek back to its start is still allowed.
        let mut restart = true;
        if self.last_dir != dir || self.last_dir.is_empty() {
            restart = false;
            io.last_symlink = location.last_symlink.clone();
            io.seek(location.offset)?;
            self.last_dir = dir.to_owned();
        }

        loop {
            let record = Record::step(io)?;
            match record.tag() {
                Tag::DirEnd | Tag::DirStart | Tag::Trailer => {
                    if !restart {
                        self.last_dir.clear();
                        return Ok(None);
                    }
                    restart = false;
                    io.last_symlink = location.last_symlink.clone();
                    io.seek(location.offset)?;
                    continue;
                }
                Tag::DirMarker => continue,
                _ => {}
            }
            match record.entity() {
                Some(entity) if entity.name == file => return Ok(Some(record)),
                _ => {}
            }
        }
    }
}
