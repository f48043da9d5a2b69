use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};

use crate::FastIoError;

/// Smallest region a [`SlidingWindow`] will map at a time.
pub const MIN_MAP_SIZE: u64 = 1024 * 1024;

/// A read-only window that slides forward over a file in bounded mappings.
///
/// Checksum passes read files far larger than memory; the window maps one
/// page-aligned region at a time and drops the previous region when it
/// advances. [`advance`](SlidingWindow::advance) with a position at or past
/// the end of the file returns an empty slice, which is the end-of-file
/// signal.
#[derive(Debug)]
pub struct SlidingWindow {
    file: File,
    path: PathBuf,
    len: u64,
    page: u64,
    min_map: u64,
    map: Option<Mmap>,
}

impl SlidingWindow {
    /// Opens `path` with the default minimum mapping size.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FastIoError> {
        Self::with_min_size(path, MIN_MAP_SIZE)
    }

    /// Opens `path`, mapping at least `min_size` bytes per region.
    ///
    /// `min_size` is clamped up to [`MIN_MAP_SIZE`] and rounded to a page
    /// boundary. Callers that process fixed-size blocks should pass at least
    /// twice their block size so a block never straddles a remap.
    pub fn with_min_size(path: impl AsRef<Path>, min_size: u64) -> Result<Self, FastIoError> {
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
        let page = page_size();
        let min_map = align_up(min_size.max(MIN_MAP_SIZE), page);

        Ok(Self {
            file,
            path,
            len,
            page,
            min_map,
            map: None,
        })
    }

    /// Returns the length of the underlying file in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` if the underlying file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Moves the window so it begins at file offset `pos` and returns the
    /// bytes from `pos` to the end of the new region.
    ///
    /// The previous region is unmapped first. At or past end of file the
    /// returned slice is empty and no mapping is made.
    pub fn advance(&mut self, pos: u64) -> Result<&[u8], FastIoError> {
        if pos >= self.len {
            self.map = None;
            return Ok(&[]);
        }

        // Release the old region before mapping the next one.
        self.map = None;

        let aligned = pos - (pos % self.page);
        let size = self.min_map.min(self.len - aligned);

        // SAFETY: read-only mapping of a file the caller is not mutating.
        #[allow(unsafe_code)]
        let map = unsafe {
            MmapOptions::new()
                .offset(aligned)
                .len(size as usize)
                .map(&self.file)
        }
        .map_err(|source| FastIoError::Map {
            path: self.path.clone(),
            offset: aligned,
            len: size,
            source,
        })?;

        self.map = Some(map);
        let skip = (pos - aligned) as usize;
        Ok(&self.map.as_deref().expect("mapping was just installed")[skip..])
    }
}

#[cfg(unix)]
fn page_size() -> u64 {
    use std::sync::OnceLock;
    static PAGE: OnceLock<u64> = OnceLock::new();
    *PAGE.get_or_init(|| {
        // SAFETY: sysconf has no preconditions.
        #[allow(unsafe_code)]
        let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        u64::try_from(page).unwrap_or(4096)
    })
}

#[cfg(not(unix))]
fn page_size() -> u64 {
    4096
}

const fn align_up(value: u64, page: u64) -> u64 {
    value.div_ceil(page) * page
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(len: usize) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        tmp.write_all(&data).unwrap();
        tmp
    }

    #[test]
    fn small_file_is_fully_visible() {
        let tmp = temp_file(1000);
        let mut window = SlidingWindow::open(tmp.path()).unwrap();
        let win = window.advance(0).unwrap();
        assert_eq!(win.len(), 1000);
        assert_eq!(win[0], 0);
        assert_eq!(win[999], (999 % 251) as u8);
    }

    #[test]
    fn advancing_past_end_returns_empty() {
        let tmp = temp_file(100);
        let mut window = SlidingWindow::open(tmp.path()).unwrap();
        assert!(window.advance(100).unwrap().is_empty());
        assert!(window.advance(5000).unwrap().is_empty());
    }

    #[test]
    fn empty_file_returns_empty() {
        let tmp = temp_file(0);
        let mut window = SlidingWindow::open(tmp.path()).unwrap();
        assert!(window.is_empty());
        assert!(window.advance(0).unwrap().is_empty());
    }

    #[test]
    fn advance_from_unaligned_position_keeps_bytes() {
        let tmp = temp_file(200_000);
        let mut window = SlidingWindow::open(tmp.path()).unwrap();
        let win = window.advance(12345).unwrap();
        assert_eq!(win[0], (12345 % 251) as u8);
        assert_eq!(win.len() as u64, window.len() - 12345);
    }

    #[test]
    fn window_covers_whole_file_when_walked() {
        let tmp = temp_file(300_000);
        let mut window = SlidingWindow::with_min_size(tmp.path(), 1).unwrap();
        let mut pos = 0u64;
        let mut total = 0u64;
        loop {
            let win = window.advance(pos).unwrap();
            if win.is_empty() {
                break;
            }
            for (i, &byte) in win.iter().enumerate() {
                assert_eq!(byte, ((pos as usize + i) % 251) as u8);
            }
            total += win.len() as u64;
            pos += win.len() as u64;
        }
        assert_eq!(total, 300_000);
    }
}
