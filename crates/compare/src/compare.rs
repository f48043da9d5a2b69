//! The comparator: classify list records against a local tree.

use std::ffi::OsString;
use std::fs::{self, Metadata};
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};

use checksums::Md5;
use filters::PathFilter;
use flist::{ListIo, ListStream, Record, Tag, FL_MD5, FL_OWNER, FL_PERM};
use rustc_hash::FxHashSet;
use tracing::{debug, warn};

use crate::error::CompareError;
use crate::events::{Entry, Events};

/// When the comparator re-hashes local file content.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum HashPolicy {
    /// Trust sizes and mtimes, never hash.
    Never,
    /// Hash when the mtime disagrees with the record.
    #[default]
    Date,
    /// Hash every file that has a recorded digest.
    Always,
}

/// Switches for one comparison run.
#[derive(Clone, Copy, Debug)]
pub struct CompareOptions {
    /// Local-content hashing policy.
    pub hash: HashPolicy,
    /// Verify mode: an unreadable directory marks its span missing
    /// instead of failing, and missing entities are only reported.
    pub verify: bool,
    /// Allow deletions and in-place replacements.
    pub delete: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            hash: HashPolicy::Date,
            verify: true,
            delete: false,
        }
    }
}

/// Names of one local directory, consumed as records claim them.
///
/// Whatever is still live when the directory closes is the delete set.
#[derive(Debug, Default)]
struct NameTable {
    names: Vec<OsString>,
    live: Vec<bool>,
}

impl NameTable {
    fn load(&mut self, path: &Path) -> Result<(), CompareError> {
        self.clear();
        let iter = fs::read_dir(path).map_err(|source| CompareError::ReadDir {
            path: path.to_path_buf(),
            source,
        })?;
        for entry in iter {
            let entry = entry.map_err(|source| CompareError::ReadDir {
                path: path.to_path_buf(),
                source,
            })?;
            self.names.push(entry.file_name());
            self.live.push(true);
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.names.clear();
        self.live.clear();
    }

    /// Marks `name` consumed; returns whether it was present and live.
    fn consume(&mut self, name: &str) -> bool {
        for (index, entry) in self.names.iter().enumerate() {
            if self.live[index] && entry == name {
                self.live[index] = false;
                return true;
            }
        }
        false
    }

    fn live_names(&self) -> impl Iterator<Item = &OsString> {
        self.names
            .iter()
            .zip(&self.live)
            .filter_map(|(name, live)| live.then_some(name))
    }
}

/// Comparator over one list stream and one local base directory.
#[derive(Debug)]
pub struct DirCompare {
    base: PathBuf,
    options: CompareOptions,
    clean: Option<PathFilter>,
}

impl DirCompare {
    /// Creates a comparator rooted at `base`.
    pub fn new(base: impl AsRef<Path>, options: CompareOptions) -> Self {
        Self {
            base: base.as_ref().to_path_buf(),
            options,
            clean: None,
        }
    }

    /// Attaches a clean filter: non-directory records it rejects are
    /// routed to deletion instead of classification.
    #[must_use]
    pub fn with_clean_filter(mut self, clean: PathFilter) -> Self {
        self.clean = Some(clean);
        self
    }

    /// Drives `events` with the comparison of the list against the tree.
    ///
    /// Extra regular entries are reported the moment their directory span
    /// closes. Extra *directories* are only candidates at that point:
    /// subdirectories carry no record in their parent's span (their own
    /// `DirStart` is their listing), so a candidate is condemned only if
    /// the whole stream ends without a span or marker naming it.
    pub fn run<S: ListStream, E: Events>(
        &self,
        io: &mut ListIo<S>,
        events: &mut E,
    ) -> Result<(), CompareError> {
        let mut cur_dir = String::new();
        let mut cur_path = self.base.clone();
        let mut missing = false;
        let mut table = NameTable::default();
        let mut seen_dirs: FxHashSet<PathBuf> = FxHashSet::default();
        let mut dir_candidates: Vec<PathBuf> = Vec::new();

        loop {
            let mut record = Record::step(io)?;
            match &record {
                Record::Header(_) => continue,
                Record::Trailer(_) => {
                    self.flush_deletes(&cur_path, &mut table, &mut dir_candidates, events)?;
                    for candidate in std::mem::take(&mut dir_candidates) {
                        if !seen_dirs.contains(&candidate) {
                            debug!(path = %candidate.display(), "extra directory scheduled for deletion");
                            events.on_delete(&candidate, false)?;
                        }
                    }
                    return Ok(());
                }
                Record::DirMarker(_) => {
                    if let Some(path) = self.handle_marker(&mut record, io, events)? {
                        seen_dirs.insert(path);
                    }
                    continue;
                }
                Record::DirStart(entity) => {
                    // Anything the previous directory left live is extra.
                    self.flush_deletes(&cur_path, &mut table, &mut dir_candidates, events)?;
                    cur_dir = entity.name.clone();
                    cur_path = join_rel(&self.base, &cur_dir);
                    seen_dirs.insert(cur_path.clone());
                    missing = false;
                    table.clear();
                    debug!(dir = %cur_dir, "comparing directory");

                    if fs::symlink_metadata(&cur_path).is_err() {
                        if self.options.verify {
                            missing = true;
                            continue;
                        }
                        // Correction mode: the directory itself is new.
                        // Depth-ordered lists open subdirectories before
                        // their parents, so intermediate levels are
                        // created too and meta-fixed by their own spans.
                        let entry = self.entry(&record, &cur_dir, cur_path.clone(), io);
                        events.on_new(&entry)?;
                        if fs::symlink_metadata(&cur_path).is_err() {
                            return Err(CompareError::MissingDirectory {
                                path: cur_path.clone(),
                            });
                        }
                    }
                    table.load(&cur_path)?;
                    continue;
                }
                Record::DirEnd => {
                    self.flush_deletes(&cur_path, &mut table, &mut dir_candidates, events)?;
                    table.clear();
                    continue;
                }
                _ => {}
            }

            let Some(entity) = record.entity() else {
                continue;
            };
            let name = entity.name.clone();
            let path = cur_path.join(&name);

            // The clean filter condemns matching non-directory entries.
            if record.tag() != Tag::Directory {
                if let Some(clean) = &self.clean {
                    if !clean.allows(&cur_dir, &name) {
                        if table.consume(&name) {
                            debug!(path = %path.display(), "clean filter condemns entry");
                            events.on_delete(&path, false)?;
                        }
                        continue;
                    }
                }
            }

            let present = !missing && table.consume(&name);
            let stat = if present {
                fs::symlink_metadata(&path).ok()
            } else {
                None
            };
            let entry = self.entry(&record, &cur_dir, path, io);
            self.fetch(&entry, stat.as_ref(), events)?;
        }
    }

    /// Builds the event context for one record.
    fn entry<'a, S: ListStream>(
        &self,
        record: &'a Record,
        dir: &'a str,
        path: PathBuf,
        io: &ListIo<S>,
    ) -> Entry<'a> {
        Entry {
            record,
            dir,
            path,
            flags: io.header.flags_for(record.tag()),
            epoch: io.header.epoch,
        }
    }

    /// Handles a forward directory reference: the name becomes absolute
    /// and the directory is created or meta-fixed out of band. Returns
    /// the local path the marker names, if any.
    fn handle_marker<S: ListStream, E: Events>(
        &self,
        record: &mut Record,
        io: &ListIo<S>,
        events: &mut E,
    ) -> Result<Option<PathBuf>, CompareError> {
        let name = record.entity().map(|e| e.name.clone()).unwrap_or_default();
        if name.is_empty() || name == "./" {
            return Ok(None);
        }
        let path = join_rel(&self.base, &name);
        if let Some(entity) = record.entity_mut() {
            entity.name = path.display().to_string();
        }
        let entry = self.entry(record, "", path.clone(), io);
        match fs::symlink_metadata(&path) {
            Ok(stat) => self.fetch(&entry, Some(&stat), events)?,
            Err(_) => events.on_new(&entry)?,
        }
        Ok(Some(path))
    }

    /// Classifies one entity given its local stat (or absence).
    fn fetch<E: Events>(
        &self,
        entry: &Entry<'_>,
        stat: Option<&Metadata>,
        events: &mut E,
    ) -> Result<(), CompareError> {
        let tag = entry.record.tag();
        let Some(stat) = stat else {
            return events.on_new(entry);
        };

        // A local entity of the wrong type has to go before its
        // replacement can arrive.
        let file_type = stat.file_type();
        let file_like = matches!(tag, Tag::NormalFile | Tag::HardLink);
        let mismatch = (file_type.is_file() && !file_like)
            || (file_type.is_dir() && !matches!(tag, Tag::Directory | Tag::DirMarker))
            || (file_type.is_symlink() && tag != Tag::Symlink)
            || ((file_type.is_char_device()
                || file_type.is_block_device()
                || file_type.is_fifo())
                && tag != Tag::DeviceSpecial);
        if mismatch {
            if !self.options.delete {
                warn!(path = %entry.path.display(), "type mismatch left in place (deletions disabled)");
                return Ok(());
            }
            events.on_delete(&entry.path, true)?;
            return events.on_new(entry);
        }

        let mtime_matches = entry.mtime() == stat.mtime();

        match tag {
            Tag::NormalFile | Tag::HardLink => {
                let file = entry.record.file().expect("file-bearing record");
                if file.size != stat.size() {
                    return events.on_changed(entry);
                }
                let hash_wanted = matches!(self.options.hash, HashPolicy::Always)
                    || (matches!(self.options.hash, HashPolicy::Date) && !mtime_matches);
                if hash_wanted && entry.flags & FL_MD5 != 0 {
                    events.on_check_hash(entry)?;
                    if local_md5(&entry.path)? == file.md5 {
                        return self.fix_meta(entry, stat, events);
                    }
                    return events.on_changed(entry);
                }
                if mtime_matches {
                    return self.fix_meta(entry, stat, events);
                }
                events.on_changed(entry)
            }
            Tag::Symlink => {
                let Record::Symlink(link) = entry.record else {
                    unreachable!("tag matches record");
                };
                let local = fs::read_link(&entry.path).ok();
                if local.as_deref() != Some(Path::new(&link.target)) {
                    return events.on_new(entry);
                }
                self.fix_meta(entry, stat, events)
            }
            Tag::Directory | Tag::DirMarker | Tag::DeviceSpecial => {
                self.fix_meta(entry, stat, events)
            }
            tag => Err(CompareError::UnsupportedRecord { tag }),
        }
    }

    /// Emits the metadata repairs an otherwise-intact entity needs.
    fn fix_meta<E: Events>(
        &self,
        entry: &Entry<'_>,
        stat: &Metadata,
        events: &mut E,
    ) -> Result<(), CompareError> {
        if entry.mtime() != stat.mtime() {
            events.on_set_time(entry)?;
        }
        if entry.record.tag() != Tag::Symlink
            && entry.flags & FL_PERM != 0
            && entry.perm() != (stat.mode() & 0o7777)
        {
            events.on_set_perm(entry)?;
        }
        if entry.flags & FL_OWNER != 0 {
            let entity = entry.record.entity().expect("entity-bearing record");
            if entity.uid != u64::from(stat.uid()) || entity.gid != u64::from(stat.gid()) {
                events.on_set_owners(entry)?;
            }
        }
        Ok(())
    }

    /// Reports every name the directory span did not consume. Local
    /// directories become candidates instead; their fate is settled once
    /// the whole stream has been seen.
    fn flush_deletes<E: Events>(
        &self,
        dir_path: &Path,
        table: &mut NameTable,
        dir_candidates: &mut Vec<PathBuf>,
        events: &mut E,
    ) -> Result<(), CompareError> {
        if !self.options.delete {
            table.clear();
            return Ok(());
        }
        for name in table.live_names() {
            let path = dir_path.join(name);
            let is_dir = fs::symlink_metadata(&path).is_ok_and(|st| st.is_dir());
            if is_dir {
                dir_candidates.push(path);
            } else {
                debug!(path = %path.display(), "extra entry scheduled for deletion");
                events.on_delete(&path, false)?;
            }
        }
        table.clear();
        Ok(())
    }
}

/// Hashes the local file for comparison against the recorded digest.
fn local_md5(path: &Path) -> Result<[u8; 16], CompareError> {
    let mut file = fs::File::open(path).map_err(|source| CompareError::Digest {
        path: path.to_path_buf(),
        source,
    })?;
    let mut md5 = Md5::new();
    md5.update_reader(&mut file)
        .map_err(|source| CompareError::Digest {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(md5.finalize())
}

fn join_rel(base: &Path, rel: &str) -> PathBuf {
    if rel.is_empty() {
        base.to_path_buf()
    } else {
        base.join(rel)
    }
}

/// Compares a list stream against the tree at `base`, driving `events`.
pub fn compare<S: ListStream, E: Events>(
    io: &mut ListIo<S>,
    base: &Path,
    options: CompareOptions,
    events: &mut E,
) -> Result<(), CompareError> {
    DirCompare::new(base, options).run(io, events)
}
