use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::FastIoError;

/// A whole file mapped read-only.
///
/// Empty files are represented without a mapping, since zero-length mappings
/// are rejected by the kernel.
#[derive(Debug)]
pub struct MmapFile {
    map: Option<Mmap>,
    path: PathBuf,
}

impl MmapFile {
    /// Opens `path` and maps its entire contents read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FastIoError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| FastIoError::Open {
            path: path.clone(),
            source,
        })?;
        let len = file
            .metadata()
            .map_err(|source| FastIoError::Stat {
                path: path.clone(),
                source,
            })?
            .len();

        let map = if len == 0 {
            None
        } else {
            // SAFETY: the mapping is read-only and the file is a frozen
            // input; callers must not truncate it while the map is live.
            #[allow(unsafe_code)]
            let map = unsafe { Mmap::map(&file) }.map_err(|source| FastIoError::Map {
                path: path.clone(),
                offset: 0,
                len,
                source,
            })?;
            Some(map)
        };

        Ok(Self { map, path })
    }

    /// Returns the mapped bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }

    /// Returns the length of the mapped file in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.as_slice().len() as u64
    }

    /// Returns `true` if the mapped file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Returns the path the map was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
