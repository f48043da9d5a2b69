//! The corrector: apply comparator events to the local tree.

use std::fs;
use std::os::unix::fs::{symlink, MetadataExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};

use filetime::FileTime;
use flist::{Record, FL_PERM};
use tracing::{debug, warn};

use crate::error::CompareError;
use crate::events::{Entry, Events};

/// Applies comparator events to the local tree.
///
/// Directories, symlinks and device nodes are created in place; regular
/// files are not, since content arrives through whatever transport the
/// caller layers over the same events. Deletions are recursive, with an
/// identity re-check of the parent directory guarding against the tree
/// being swapped out mid-removal.
#[derive(Debug, Default)]
pub struct Corrector;

impl Corrector {
    /// Creates a corrector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn create(&mut self, entry: &Entry<'_>) -> Result<(), CompareError> {
        match entry.record {
            Record::DirStart(_) | Record::DirMarker(_) | Record::Directory(_) => {
                debug!(path = %entry.path.display(), "creating directory");
                fs::create_dir_all(&entry.path).map_err(|source| CompareError::CreateDir {
                    path: entry.path.clone(),
                    source,
                })?;
            }
            Record::Symlink(link) => {
                debug!(path = %entry.path.display(), target = %link.target, "creating symlink");
                replace_symlink(&link.target, &entry.path)?;
                // Symlink permissions are inherited; only the time is ours.
                set_symlink_time(&entry.path, entry.mtime())?;
                return Ok(());
            }
            Record::DeviceSpecial(dev) => {
                if entry.flags & FL_PERM == 0 {
                    return Err(CompareError::MissingDevicePermissions {
                        path: entry.path.clone(),
                    });
                }
                debug!(path = %entry.path.display(), dev = dev.dev, "creating device node");
                make_node(&entry.path, entry.perm(), dev.dev)?;
            }
            // File content comes from the transport, not from the list.
            Record::NormalFile(_) | Record::HardLink(_) => return Ok(()),
            record => {
                return Err(CompareError::UnsupportedRecord { tag: record.tag() });
            }
        }

        // Fresh entities still need their recorded metadata.
        let stat = fs::symlink_metadata(&entry.path).map_err(|source| CompareError::Stat {
            path: entry.path.clone(),
            source,
        })?;
        if entry.mtime() != stat.mtime() {
            self.on_set_time(entry)?;
        }
        if entry.flags & FL_PERM != 0 && entry.perm() != (stat.mode() & 0o7777) {
            self.on_set_perm(entry)?;
        }
        Ok(())
    }
}

impl Events for Corrector {
    fn on_new(&mut self, entry: &Entry<'_>) -> Result<(), CompareError> {
        self.create(entry)
    }

    fn on_delete(&mut self, path: &Path, _now: bool) -> Result<(), CompareError> {
        delete_entry(path)
    }

    fn on_set_time(&mut self, entry: &Entry<'_>) -> Result<(), CompareError> {
        let time = FileTime::from_unix_time(entry.mtime(), 0);
        if entry.record.tag() == flist::Tag::Symlink {
            return set_symlink_time(&entry.path, entry.mtime());
        }
        filetime::set_file_times(&entry.path, time, time).map_err(|source| {
            CompareError::SetTime {
                path: entry.path.clone(),
                source,
            }
        })
    }

    fn on_set_perm(&mut self, entry: &Entry<'_>) -> Result<(), CompareError> {
        fs::set_permissions(&entry.path, fs::Permissions::from_mode(entry.perm())).map_err(
            |source| CompareError::SetPerm {
                path: entry.path.clone(),
                source,
            },
        )
    }

    fn on_set_owners(&mut self, entry: &Entry<'_>) -> Result<(), CompareError> {
        // Ownership mutation is not implemented; surface and carry on.
        warn!(path = %entry.path.display(), "ownership repair is not supported");
        Ok(())
    }
}

/// Removes one entry, descending into directories.
fn delete_entry(path: &Path) -> Result<(), CompareError> {
    let stat = fs::symlink_metadata(path).map_err(|source| CompareError::Stat {
        path: path.to_path_buf(),
        source,
    })?;
    if stat.is_dir() {
        debug!(path = %path.display(), "removing directory tree");
        dir_unlink(path)
    } else {
        debug!(path = %path.display(), "removing entry");
        fs::remove_file(path).map_err(|source| CompareError::Remove {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Recursively empties and removes a directory.
///
/// The parent directory's identity is re-checked after the descent; if
/// its inode or device changed while we were below it, someone swapped
/// the tree and the removal stops.
fn dir_unlink(path: &Path) -> Result<(), CompareError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from(Component::CurDir.as_os_str()),
    };
    let before = fs::symlink_metadata(&parent).map_err(|source| CompareError::Stat {
        path: parent.clone(),
        source,
    })?;

    let iter = fs::read_dir(path).map_err(|source| CompareError::ReadDir {
        path: path.to_path_buf(),
        source,
    })?;
    for entry in iter {
        let entry = entry.map_err(|source| CompareError::ReadDir {
            path: path.to_path_buf(),
            source,
        })?;
        let child = entry.path();
        let stat = fs::symlink_metadata(&child).map_err(|source| CompareError::Stat {
            path: child.clone(),
            source,
        })?;
        if stat.is_dir() {
            dir_unlink(&child)?;
        } else {
            fs::remove_file(&child).map_err(|source| CompareError::Remove {
                path: child.clone(),
                source,
            })?;
        }
    }

    let after = fs::symlink_metadata(&parent).map_err(|source| CompareError::Stat {
        path: parent.clone(),
        source,
    })?;
    if before.ino() != after.ino() || before.dev() != after.dev() {
        return Err(CompareError::DirectoryChanged {
            path: path.to_path_buf(),
        });
    }

    fs::remove_dir(path).map_err(|source| CompareError::Remove {
        path: path.to_path_buf(),
        source,
    })
}

/// Creates (or atomically replaces) a symlink at `path`.
fn replace_symlink(target: &str, path: &Path) -> Result<(), CompareError> {
    match symlink(target, path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            // Build the replacement next to the destination and rename
            // over it so no observer sees a missing link.
            let temp = temp_sibling(path);
            symlink(target, &temp).map_err(|source| CompareError::CreateSymlink {
                path: path.to_path_buf(),
                source,
            })?;
            fs::rename(&temp, path).map_err(|source| CompareError::CreateSymlink {
                path: path.to_path_buf(),
                source,
            })
        }
        Err(source) => Err(CompareError::CreateSymlink {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".dsync-tmp");
    PathBuf::from(name)
}

fn set_symlink_time(path: &Path, mtime: i64) -> Result<(), CompareError> {
    let time = FileTime::from_unix_time(mtime, 0);
    filetime::set_symlink_file_times(path, time, time).map_err(|source| CompareError::SetTime {
        path: path.to_path_buf(),
        source,
    })
}

/// Creates a device or fifo node with the recorded permissions.
fn make_node(path: &Path, perm: u32, dev: u64) -> Result<(), CompareError> {
    use rustix::fs::{mknodat, FileType, Mode, CWD};

    // The record does not distinguish node kinds; fifos are recorded
    // with a zero device number, character devices otherwise.
    let kind = if dev == 0 {
        FileType::Fifo
    } else {
        FileType::CharacterDevice
    };
    mknodat(
        CWD,
        path,
        kind,
        Mode::from_bits_truncate(perm),
        dev,
    )
    .map_err(|errno| CompareError::CreateDevice {
        path: path.to_path_buf(),
        source: std::io::Error::from(errno),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flist::{DeviceRecord, Entity, Record, FL_PERM};

    fn device_entry(record: &Record, path: PathBuf, flags: u32) -> Entry<'_> {
        Entry {
            record,
            dir: "",
            path,
            flags,
            epoch: 1_000_000,
        }
    }

    #[test]
    fn device_without_permissions_is_rejected() {
        let record = Record::DeviceSpecial(DeviceRecord {
            entity: Entity {
                name: "null".into(),
                ..Entity::default()
            },
            dev: 0x0103,
        });
        let entry = device_entry(&record, PathBuf::from("/nonexistent/null"), 0);
        let mut corrector = Corrector::new();
        assert!(matches!(
            corrector.on_new(&entry),
            Err(CompareError::MissingDevicePermissions { .. })
        ));
    }

    #[test]
    fn fifo_nodes_are_created_with_permissions() {
        use std::os::unix::fs::FileTypeExt;

        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("pipe");
        let record = Record::DeviceSpecial(DeviceRecord {
            entity: Entity {
                name: "pipe".into(),
                perm: 0o600,
                ..Entity::default()
            },
            dev: 0,
        });
        let entry = device_entry(&record, path.clone(), FL_PERM);
        let mut corrector = Corrector::new();
        corrector.on_new(&entry).unwrap();

        let meta = fs::symlink_metadata(&path).unwrap();
        assert!(meta.file_type().is_fifo());
        assert_eq!(meta.mode() & 0o7777, 0o600);
        assert_eq!(meta.mtime(), 1_000_000);
    }

    #[test]
    fn replace_symlink_swaps_an_existing_link() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("ln");
        symlink("old-target", &path).unwrap();
        replace_symlink("new-target", &path).unwrap();
        assert_eq!(
            fs::read_link(&path).unwrap(),
            PathBuf::from("new-target")
        );
    }

    #[test]
    fn dir_unlink_removes_nested_trees() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("victim");
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::write(root.join("a/file"), b"x").unwrap();
        fs::write(root.join("a/b/deep"), b"y").unwrap();

        delete_entry(&root).unwrap();
        assert!(!root.exists());
        assert!(temp.path().exists());
    }
}
