//! Tree walker and list emitter.

use std::collections::VecDeque;
use std::fs::{self, File, Metadata};
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};

use checksums::Md5;
use filters::PathFilter;
use flist::{
    DeviceRecord, Entity, FileRecord, FileStream, FilterKind, FilterRecord, HardLinkRecord,
    Header, ListIo, ListStream, Record, SymlinkRecord, Tag, Trailer, FL_MD5, FL_PERM,
};
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::cache::Md5Cache;
use crate::error::WalkError;

/// Traversal order for list generation.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Order {
    /// Pre-order, depth-first: recurse into each subdirectory before
    /// continuing at the current level.
    #[default]
    Tree,
    /// Finish every directory at one depth before descending.
    Breadth,
    /// Contents after children: descend first, then list the directory,
    /// announcing it early with a `DirMarker`.
    Depth,
}

/// Feature switches for one generation run.
#[derive(Clone, Debug)]
pub struct WalkOptions {
    /// Traversal order.
    pub order: Order,
    /// Record whole-file MD5 digests for files and hard links.
    pub md5: bool,
    /// Record permission bits.
    pub permissions: bool,
    /// Record ownership. Not supported; requesting it is an error.
    pub ownership: bool,
    /// Emit rolling-checksum blocks for large files.
    pub rsync: bool,
    /// Files at or below this size never get checksum blocks.
    pub min_rsync_size: u64,
    /// Uniform block size for checksum blocks.
    pub block_size: u64,
    /// Leading path components stripped from digest-cache lookups.
    pub strip_depth: usize,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            order: Order::Tree,
            md5: false,
            permissions: false,
            ownership: false,
            rsync: false,
            min_rsync_size: 1,
            block_size: signature::DEFAULT_BLOCK_SIZE,
            strip_depth: 0,
        }
    }
}

/// Walks a base directory and emits a complete list stream.
///
/// The generator owns its output stream for the duration of one
/// [`run`](ListGenerator::run); it is single-threaded and reusable across
/// runs.
#[derive(Debug, Default)]
pub struct ListGenerator {
    options: WalkOptions,
    /// Entries rejected by this filter never appear in the output.
    pub accept: PathFilter,
    /// Directories rejected by this filter are walked after everything
    /// else.
    pub delay: PathFilter,
    /// Large files must pass this filter to get a checksum block.
    pub rsync_filter: PathFilter,
    cache: Option<Md5Cache>,
    serials: FxHashMap<(u64, u64), u64>,
    queue: VecDeque<String>,
    delay_queue: VecDeque<String>,
}

impl ListGenerator {
    /// Creates a generator with empty filters.
    #[must_use]
    pub fn new(options: WalkOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Returns the configured options.
    #[must_use]
    pub fn options(&self) -> &WalkOptions {
        &self.options
    }

    /// Attaches a previous-list digest cache.
    pub fn set_cache(&mut self, cache: Md5Cache) {
        self.cache = Some(cache);
    }

    /// Detaches the digest cache.
    pub fn clear_cache(&mut self) {
        self.cache = None;
    }

    /// Walks `base` and writes a complete list to `io`.
    pub fn run<S: ListStream>(
        &mut self,
        base: &Path,
        io: &mut ListIo<S>,
    ) -> Result<(), WalkError> {
        if self.options.ownership {
            return Err(WalkError::OwnershipUnsupported);
        }
        fs::metadata(base).map_err(|source| WalkError::Stat {
            path: base.to_path_buf(),
            source,
        })?;

        self.serials.clear();
        self.queue.clear();
        self.delay_queue.clear();

        let mut header = Header::new();
        if self.options.md5 {
            header.flags[Tag::NormalFile as usize] |= FL_MD5;
            header.flags[Tag::HardLink as usize] |= FL_MD5;
        }
        if self.options.permissions {
            for tag in [
                Tag::DirMarker,
                Tag::DirStart,
                Tag::Directory,
                Tag::NormalFile,
                Tag::HardLink,
                Tag::DeviceSpecial,
            ] {
                header.flags[tag as usize] |= FL_PERM;
            }
        }
        io.write_header(header)?;

        // Document the accept rules in the stream.
        for (kind, pattern) in self.accept.rules() {
            let kind = match kind {
                filters::RuleKind::Include => FilterKind::Include,
                filters::RuleKind::Exclude => FilterKind::Exclude,
            };
            Record::Filter(FilterRecord {
                kind,
                pattern: pattern.to_owned(),
            })
            .write(io)?;
        }

        match self.options.order {
            Order::Tree | Order::Breadth => {
                self.queue.push_back(String::new());
                while !self.queue.is_empty() || !self.delay_queue.is_empty() {
                    let dir = self
                        .queue
                        .pop_front()
                        .or_else(|| self.delay_queue.pop_front())
                        .expect("one queue is non-empty");
                    self.dir_tree(base, &dir, io)?;
                }
            }
            Order::Depth => {
                self.dir_depth_first(base, String::new(), io)?;
                while let Some(dir) = self.delay_queue.pop_front() {
                    self.dir_depth_first(base, dir, io)?;
                }
            }
        }

        Record::Trailer(Trailer::new()).write(io)?;
        Ok(())
    }

    /// Walks one directory under tree or breadth ordering.
    fn dir_tree<S: ListStream>(
        &mut self,
        base: &Path,
        dir: &str,
        io: &mut ListIo<S>,
    ) -> Result<(), WalkError> {
        let full = join_rel(base, dir);
        debug!(dir, "listing directory");
        let meta = fs::metadata(&full).map_err(|source| WalkError::Stat {
            path: full.clone(),
            source,
        })?;
        self.enter_dir(dir, &meta, io)?;

        let mut found = Vec::new();
        let mut delayed = Vec::new();
        for entry in read_dir_utf8(&full)? {
            let (name, meta) = entry;
            if meta.is_dir() {
                let with_slash = format!("{name}/");
                if !self.accept.allows(dir, &with_slash) {
                    continue;
                }
                let child = format!("{dir}{with_slash}");
                if !self.delay.allows(dir, &with_slash) {
                    trace!(dir = %child, "delaying directory");
                    delayed.push(child);
                } else {
                    found.push(child);
                }
            } else {
                if !self.accept.allows(dir, &name) {
                    continue;
                }
                self.do_file(&full, dir, &name, &meta, io)?;
            }
        }

        Record::DirEnd.write(io)?;

        // Tree order treats both queues as stacks so the first child found
        // is walked first; breadth appends and drains level by level.
        match self.options.order {
            Order::Tree => {
                for child in found.into_iter().rev() {
                    self.queue.push_front(child);
                }
                for child in delayed.into_iter().rev() {
                    self.delay_queue.push_front(child);
                }
            }
            _ => {
                self.queue.extend(found);
                self.delay_queue.extend(delayed);
            }
        }
        Ok(())
    }

    /// Walks one directory under depth ordering: children's contents come
    /// first, announced by a marker for the current directory.
    fn dir_depth_first<S: ListStream>(
        &mut self,
        base: &Path,
        dir: String,
        io: &mut ListIo<S>,
    ) -> Result<(), WalkError> {
        let full = join_rel(base, &dir);
        let entries = read_dir_utf8(&full)?;

        let mut emitted_marker = false;
        for (name, meta) in &entries {
            if !meta.is_dir() {
                continue;
            }
            let with_slash = format!("{name}/");
            if !self.accept.allows(&dir, &with_slash) {
                continue;
            }
            if !emitted_marker {
                emitted_marker = true;
                let meta = fs::metadata(&full).map_err(|source| WalkError::Stat {
                    path: full.clone(),
                    source,
                })?;
                let entity = self.entity(depth_name(&dir), &meta, &full, io)?;
                Record::DirMarker(entity).write(io)?;
            }
            let child = format!("{dir}{with_slash}");
            if !self.delay.allows(&dir, &with_slash) {
                trace!(dir = %child, "delaying directory");
                self.delay_queue.push_back(child);
            } else {
                self.dir_depth_first(base, child, io)?;
            }
        }

        let meta = fs::metadata(&full).map_err(|source| WalkError::Stat {
            path: full.clone(),
            source,
        })?;
        debug!(dir = %dir, "listing directory");
        let entity = self.entity(depth_name(&dir), &meta, &full, io)?;
        Record::DirStart(entity).write(io)?;
        for (name, meta) in &entries {
            if meta.is_dir() || !self.accept.allows(&dir, name) {
                continue;
            }
            self.do_file(&full, &dir, name, meta, io)?;
        }
        Record::DirEnd.write(io)?;
        Ok(())
    }

    /// Emits the `DirStart` record for one directory.
    fn enter_dir<S: ListStream>(
        &mut self,
        dir: &str,
        meta: &Metadata,
        io: &mut ListIo<S>,
    ) -> Result<(), WalkError> {
        let full = PathBuf::from(dir);
        let entity = self.entity(dir.to_owned(), meta, &full, io)?;
        Record::DirStart(entity).write(io)?;
        Ok(())
    }

    /// Emits the record for one non-directory entry.
    fn do_file<S: ListStream>(
        &mut self,
        full_dir: &Path,
        dir: &str,
        name: &str,
        meta: &Metadata,
        io: &mut ListIo<S>,
    ) -> Result<(), WalkError> {
        let path = full_dir.join(name);
        let file_type = meta.file_type();

        if file_type.is_file() {
            let entity = self.entity(name.to_owned(), meta, &path, io)?;
            let mut file = FileRecord {
                entity,
                size: meta.len(),
                md5: [0; 16],
            };

            if meta.nlink() > 1 {
                let next = self.serials.len() as u64 + 1;
                let serial = *self
                    .serials
                    .entry((meta.dev(), meta.ino()))
                    .or_insert(next);
                self.emit_md5(dir, name, meta, &path, Tag::HardLink, &mut file.md5, io)?;
                Record::HardLink(HardLinkRecord { file, serial }).write(io)?;
                return Ok(());
            }

            if self.needs_rsync(dir, name, &file) {
                trace!(path = %path.display(), "emitting checksum block");
                let (block, md5) = signature::generate(&path, self.options.block_size)?;
                file.md5 = md5;
                Record::NormalFile(file).write(io)?;
                Record::Checksums(block).write(io)?;
                return Ok(());
            }

            self.emit_md5(dir, name, meta, &path, Tag::NormalFile, &mut file.md5, io)?;
            Record::NormalFile(file).write(io)?;
            return Ok(());
        }

        if file_type.is_symlink() {
            let target = fs::read_link(&path).map_err(|source| WalkError::ReadLink {
                path: path.clone(),
                source,
            })?;
            let target = target
                .into_os_string()
                .into_string()
                .map_err(|name| WalkError::NonUtf8Name { name })?;
            let entity = self.entity(name.to_owned(), meta, &path, io)?;
            Record::Symlink(SymlinkRecord { entity, target }).write(io)?;
            return Ok(());
        }

        if file_type.is_char_device() || file_type.is_block_device() || file_type.is_fifo() {
            let entity = self.entity(name.to_owned(), meta, &path, io)?;
            Record::DeviceSpecial(DeviceRecord {
                entity,
                dev: meta.rdev(),
            })
            .write(io)?;
            return Ok(());
        }

        Err(WalkError::UnknownFileType { path })
    }

    /// Builds the shared entity attributes for one entry.
    fn entity<S: ListStream>(
        &self,
        name: String,
        meta: &Metadata,
        path: &Path,
        io: &ListIo<S>,
    ) -> Result<Entity, WalkError> {
        let delta = meta.mtime() - io.header.epoch as i64;
        let mtime = i32::try_from(delta).map_err(|_| WalkError::TimeOutOfRange {
            path: path.to_path_buf(),
        })?;
        Ok(Entity {
            mtime,
            perm: (meta.mode() & 0o7777) as u16,
            uid: u64::from(meta.uid()),
            gid: u64::from(meta.gid()),
            name,
        })
    }

    /// Decides whether a regular file gets a checksum block.
    fn needs_rsync(&self, dir: &str, name: &str, file: &FileRecord) -> bool {
        self.options.rsync
            && self.options.min_rsync_size != 0
            && file.size > self.options.min_rsync_size
            && self.rsync_filter.allows(dir, name)
    }

    /// Fills in the MD5 for a file record, reusing the previous list's
    /// digest when mtime and size still match.
    fn emit_md5<S: ListStream>(
        &mut self,
        dir: &str,
        name: &str,
        meta: &Metadata,
        path: &Path,
        tag: Tag,
        md5: &mut [u8; 16],
        io: &ListIo<S>,
    ) -> Result<(), WalkError> {
        if io.header.flags_for(tag) & FL_MD5 == 0 {
            return Ok(());
        }
        if let Some(cache) = self.cache.as_mut() {
            if let Some(cached) = cache.lookup(dir, name, meta.mtime(), meta.len()) {
                trace!(path = %path.display(), "digest reused from previous list");
                *md5 = cached;
                return Ok(());
            }
        }
        *md5 = file_md5(path)?;
        Ok(())
    }
}

/// Streams a file through MD5.
fn file_md5(path: &Path) -> Result<[u8; 16], WalkError> {
    let mut file = File::open(path).map_err(|source| WalkError::Digest {
        path: path.to_path_buf(),
        source,
    })?;
    let mut md5 = Md5::new();
    md5.update_reader(&mut file)
        .map_err(|source| WalkError::Digest {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(md5.finalize())
}

/// Joins a relative list path ("", `a/`, `a/b/`) onto the base.
fn join_rel(base: &Path, rel: &str) -> PathBuf {
    if rel.is_empty() {
        base.to_path_buf()
    } else {
        base.join(rel)
    }
}

/// Directory name as emitted under depth ordering: the root is `./`.
fn depth_name(dir: &str) -> String {
    if dir.is_empty() {
        "./".to_owned()
    } else {
        dir.to_owned()
    }
}

/// Reads a directory into `(name, metadata)` pairs, skipping nothing.
fn read_dir_utf8(path: &Path) -> Result<Vec<(String, Metadata)>, WalkError> {
    let iter = fs::read_dir(path).map_err(|source| WalkError::ReadDir {
        path: path.to_path_buf(),
        source,
    })?;
    let mut entries = Vec::new();
    for entry in iter {
        let entry = entry.map_err(|source| WalkError::ReadDir {
            path: path.to_path_buf(),
            source,
        })?;
        let name = entry
            .file_name()
            .into_string()
            .map_err(|name| WalkError::NonUtf8Name { name })?;
        let meta = entry.metadata().map_err(|source| WalkError::Stat {
            path: path.join(&name),
            source,
        })?;
        entries.push((name, meta));
    }
    Ok(entries)
}

/// Produces the list for `base` at `list`, atomically.
///
/// The stream is written to `<list>.new`; only after a fully successful
/// walk is the previous list moved to `<list>~`, the new list renamed into
/// place and the backup removed. Any failure leaves the original list
/// untouched.
///
/// When digests are enabled and a previous list exists it is attached as
/// the digest cache for the run; an unreadable previous list is logged and
/// ignored rather than failing the walk.
pub fn produce(
    base: &Path,
    list: &Path,
    generator: &mut ListGenerator,
) -> Result<(), WalkError> {
    if generator.options.md5 && list.exists() {
        match Md5Cache::open(list, generator.options.strip_depth) {
            Ok(cache) => generator.set_cache(cache),
            Err(err) => {
                warn!(list = %list.display(), error = %err, "previous list unusable as digest cache");
            }
        }
    }

    let new_path = append_ext(list, ".new");
    let backup = append_ext(list, "~");

    let result = (|| -> Result<(), WalkError> {
        let mut io = ListIo::new(FileStream::create(&new_path)?);
        generator.run(base, &mut io)
    })();
    generator.clear_cache();
    result?;

    let had_old = list.exists();
    if had_old {
        fs::rename(list, &backup).map_err(|source| WalkError::Rename {
            path: list.to_path_buf(),
            source,
        })?;
    }
    fs::rename(&new_path, list).map_err(|source| WalkError::Rename {
        path: list.to_path_buf(),
        source,
    })?;
    if had_old {
        fs::remove_file(&backup).map_err(|source| WalkError::Rename {
            path: backup.clone(),
            source,
        })?;
    }
    Ok(())
}

fn append_ext(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}
