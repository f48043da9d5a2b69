//! Path simplification and symlink-free path resolution.
//!
//! Callers that look up local paths in a list index first normalize them
//! here: [`simplify_path`] removes `.`/`..`/`//` components and
//! [`resolve_link`] rewrites the whole path, final component included, so
//! it traverses no symbolic links, with a small LRU cache over
//! directories to keep repeated lookups cheap.

use std::fs;

use flist::{ListIndex, ListIo, ListStream, Record};
use rustc_hash::FxHashMap;

use crate::error::WalkError;

/// Deepest chain of symlinks [`resolve_link`] will follow.
pub const MAX_LINK_DEPTH: usize = 50;

/// Removes `.` and empty components and applies `..` textually.
///
/// A path whose `..` components escape its root is an error. The leading
/// `/` of an absolute path and a trailing `/` are preserved.
pub fn simplify_path(path: &str) -> Result<String, WalkError> {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for comp in path.split('/') {
        match comp {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(WalkError::PathEscapes {
                        path: path.to_owned(),
                    });
                }
            }
            comp => parts.push(comp),
        }
    }

    let mut out = String::with_capacity(path.len());
    if absolute {
        out.push('/');
    }
    out.push_str(&parts.join("/"));
    if path.ends_with('/') && !parts.is_empty() {
        out.push('/');
    }
    Ok(out)
}

/// LRU cache of directory-path resolutions, keyed by the unresolved
/// directory prefix.
#[derive(Debug)]
pub struct LinkCache {
    capacity: usize,
    age: u64,
    entries: FxHashMap<String, (String, u64)>,
}

impl Default for LinkCache {
    fn default() -> Self {
        Self::new(400)
    }
}

impl LinkCache {
    /// Creates a cache holding up to `capacity` directories.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            age: 0,
            entries: FxHashMap::default(),
        }
    }

    fn get(&mut self, dir: &str) -> Option<String> {
        self.age += 1;
        let age = self.age;
        let (resolved, stamp) = self.entries.get_mut(dir)?;
        *stamp = age;
        Some(resolved.clone())
    }

    fn put(&mut self, dir: String, resolved: String) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&dir) {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, (_, stamp))| *stamp)
                .map(|(key, _)| key.clone())
            {
                self.entries.remove(&oldest);
            }
        }
        self.age += 1;
        self.entries.insert(dir, (resolved, self.age));
    }
}

/// Rewrites `path` so that none of its components, the final one
/// included, traverses a symbolic link.
///
/// Each component that names a symlink is replaced by its target, so a
/// path naming a symlink resolves to the link's ultimate target. Absolute
/// targets restart the accumulated prefix, and the whole chain is capped
/// at [`MAX_LINK_DEPTH`] hops. Resolved directory prefixes are cached so
/// repeated lookups under one directory stay cheap; the final component
/// is always chased afresh.
pub fn resolve_link(path: &str, cache: &mut LinkCache) -> Result<String, WalkError> {
    if path.is_empty() || path == "/" {
        return Ok(path.to_owned());
    }
    let (dir, file) = split_final(path).unwrap_or(("", path));
    let mut hops = 0usize;

    let prefix = if dir.is_empty() || dir == "/" {
        dir.to_owned()
    } else if let Some(resolved) = cache.get(dir) {
        resolved
    } else {
        let mut seed = String::new();
        if dir.starts_with('/') {
            seed.push('/');
        }
        let parts: Vec<String> = dir
            .split('/')
            .filter(|c| !c.is_empty())
            .rev()
            .map(str::to_owned)
            .collect();
        let resolved = chase(seed, parts, false, path, &mut hops)?;
        cache.put(dir.to_owned(), resolved.clone());
        resolved
    };

    let trailing = file.ends_with('/');
    let leaf = file.trim_end_matches('/');
    if leaf.is_empty() {
        return Ok(prefix);
    }
    let mut resolved = chase(prefix, vec![leaf.to_owned()], true, path, &mut hops)?;
    if trailing {
        resolved.push('/');
    }
    Ok(resolved)
}

/// Resolves queued components left to right onto `out`, splicing symlink
/// targets back into the queue. With `leaf` set the last component is
/// written without a trailing separator.
fn chase(
    mut out: String,
    mut pending: Vec<String>,
    leaf: bool,
    original: &str,
    hops: &mut usize,
) -> Result<String, WalkError> {
    while let Some(comp) = pending.pop() {
        match comp.as_str() {
            "." => continue,
            ".." => {
                let absolute = out.starts_with('/');
                pop_component(&mut out, absolute, original)?;
                continue;
            }
            _ => {}
        }

        let candidate = format!("{out}{comp}");
        match fs::read_link(&candidate) {
            Ok(target) => {
                *hops += 1;
                if *hops > MAX_LINK_DEPTH {
                    return Err(WalkError::LinkDepthExceeded {
                        path: original.to_owned(),
                    });
                }
                let target = target
                    .into_os_string()
                    .into_string()
                    .map_err(|name| WalkError::NonUtf8Name { name })?;
                if target.starts_with('/') {
                    out.clear();
                    out.push('/');
                }
                // Re-queue the target's components in place of this one.
                for comp in target.split('/').filter(|c| !c.is_empty()).rev() {
                    pending.push(comp.to_owned());
                }
            }
            Err(_) => {
                out.push_str(&comp);
                if !(leaf && pending.is_empty()) {
                    out.push('/');
                }
            }
        }
    }
    Ok(out)
}

/// Splits a path into its directory prefix (with trailing `/`) and final
/// component. Returns `None` when there is no directory part.
fn split_final(path: &str) -> Option<(&str, &str)> {
    let trimmed = path.trim_end_matches('/');
    let cut = trimmed.rfind('/')?;
    Some((&path[..cut + 1], &path[cut + 1..]))
}

fn pop_component(out: &mut String, absolute: bool, original: &str) -> Result<(), WalkError> {
    let trimmed = out.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(cut) => out.truncate(cut + 1),
        None if trimmed.is_empty() => {
            if !absolute {
                return Err(WalkError::PathEscapes {
                    path: original.to_owned(),
                });
            }
        }
        None => out.clear(),
    }
    Ok(())
}

/// Resolves a local path and looks it up in a list index.
///
/// The path is simplified, made symlink-free (final component included)
/// and the resulting `(directory, name)` pair is queried against the
/// index.
pub fn lookup_path<S: ListStream>(
    path: &str,
    index: &mut ListIndex,
    io: &mut ListIo<S>,
    cache: &mut LinkCache,
) -> Result<Option<Record>, WalkError> {
    let simplified = simplify_path(path)?;
    let resolved = resolve_link(&simplified, cache)?;
    let (dir, file) = split_final(&resolved).unwrap_or(("", resolved.as_str()));
    Ok(index.lookup(io, dir, file)?)
}
