//! Stream contract and the framing codec layered on top of it.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fast_io::MmapFile;

use crate::error::FlistError;
use crate::record::Header;

/// Longest string any record may carry, including the empty terminator slot
/// the original format reserved.
pub(crate) const MAX_STRING_LEN: usize = 1024;

/// Primitive cursor contract every list stream implements.
///
/// Readers fail fast: a short read is an error, not a partial result.
pub trait ListStream {
    /// Fills `buf` completely from the current position.
    fn read(&mut self, buf: &mut [u8]) -> Result<(), FlistError>;
    /// Writes all of `buf` at the current position.
    fn write(&mut self, buf: &[u8]) -> Result<(), FlistError>;
    /// Moves the cursor to an absolute byte offset.
    fn seek(&mut self, pos: u64) -> Result<(), FlistError>;
    /// Returns the current absolute byte offset.
    fn tell(&self) -> u64;
}

/// Framing codec plus the per-stream decoding context.
///
/// The context is the most recent [`Header`] (whose per-tag flag words gate
/// optional record fields) and the previous symlink target (the base for
/// symlink target compression).
#[derive(Debug)]
pub struct ListIo<S> {
    stream: S,
    /// Header context consulted by record codecs.
    pub header: Header,
    /// Previous symlink target, the base for target compression.
    pub last_symlink: String,
}

impl<S: ListStream> ListIo<S> {
    /// Wraps a stream with empty decoding context.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            header: Header::default(),
            last_symlink: String::new(),
        }
    }

    /// Returns the wrapped stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Installs `header` as the codec context and writes it to the stream.
    pub fn write_header(&mut self, header: Header) -> Result<(), FlistError> {
        self.header = header;
        let header = self.header.clone();
        header.write(self)
    }

    /// Moves the cursor to an absolute byte offset.
    pub fn seek(&mut self, pos: u64) -> Result<(), FlistError> {
        self.stream.seek(pos)
    }

    /// Returns the current absolute byte offset.
    pub fn tell(&self) -> u64 {
        self.stream.tell()
    }

    /// Fills `buf` completely from the stream.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), FlistError> {
        self.stream.read(buf)
    }

    /// Writes all of `buf` to the stream.
    pub fn write_bytes(&mut self, buf: &[u8]) -> Result<(), FlistError> {
        self.stream.write(buf)
    }

    /// Reads a variable-byte encoded unsigned integer.
    ///
    /// The low seven bits of each byte carry the value, least significant
    /// group first; the high bit is the continuation flag.
    pub fn read_num(&mut self) -> Result<u64, FlistError> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let mut byte = [0u8; 1];
            self.stream.read(&mut byte)?;
            if shift >= 64 {
                return Err(FlistError::IntegerOverflow);
            }
            value |= u64::from(byte[0] & 0x7f) << shift;
            if byte[0] & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    /// Writes an unsigned integer in variable-byte encoding.
    pub fn write_num(&mut self, mut value: u64) -> Result<(), FlistError> {
        let mut bytes = [0u8; 10];
        let mut used = 0;
        loop {
            bytes[used] = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                used += 1;
                break;
            }
            bytes[used] |= 0x80;
            used += 1;
        }
        self.stream.write(&bytes[..used])
    }

    /// Reads a little-endian unsigned integer of `width` bytes (at most 8).
    pub fn read_int(&mut self, width: usize) -> Result<u64, FlistError> {
        debug_assert!(width <= 8);
        let mut bytes = [0u8; 8];
        self.stream.read(&mut bytes[..width])?;
        let mut value = 0u64;
        for (i, &byte) in bytes[..width].iter().enumerate() {
            value |= u64::from(byte) << (i * 8);
        }
        Ok(value)
    }

    /// Writes a little-endian unsigned integer of `width` bytes (at most 8).
    pub fn write_int(&mut self, value: u64, width: usize) -> Result<(), FlistError> {
        debug_assert!(width <= 8);
        let mut bytes = [0u8; 8];
        for (i, byte) in bytes[..width].iter_mut().enumerate() {
            *byte = (value >> (i * 8)) as u8;
        }
        self.stream.write(&bytes[..width])
    }

    /// Reads a little-endian signed 32-bit integer.
    pub fn read_i32(&mut self) -> Result<i32, FlistError> {
        Ok(self.read_int(4)? as u32 as i32)
    }

    /// Writes a little-endian signed 32-bit integer.
    pub fn write_i32(&mut self, value: i32) -> Result<(), FlistError> {
        self.write_int(u64::from(value as u32), 4)
    }

    /// Reads a length-prefixed byte string.
    pub fn read_blob(&mut self) -> Result<Vec<u8>, FlistError> {
        let len = self.read_num()? as usize;
        if len >= MAX_STRING_LEN {
            return Err(FlistError::StringTooLong { len });
        }
        let mut bytes = vec![0u8; len];
        self.stream.read(&mut bytes)?;
        Ok(bytes)
    }

    /// Writes a length-prefixed byte string.
    pub fn write_blob(&mut self, bytes: &[u8]) -> Result<(), FlistError> {
        if bytes.len() >= MAX_STRING_LEN {
            return Err(FlistError::StringTooLong { len: bytes.len() });
        }
        self.write_num(bytes.len() as u64)?;
        self.stream.write(bytes)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, FlistError> {
        String::from_utf8(self.read_blob()?).map_err(|_| FlistError::InvalidString)
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) -> Result<(), FlistError> {
        self.write_blob(value.as_bytes())
    }
}

/// Read-only random-access stream over a memory-mapped list file.
///
/// Reads copy out of the mapping so decoded records own their storage;
/// writes fail with [`FlistError::ReadOnly`].
#[derive(Debug)]
pub struct MmapStream {
    map: MmapFile,
    pos: u64,
}

impl MmapStream {
    /// Maps `path` read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FlistError> {
        Ok(Self {
            map: MmapFile::open(path)?,
            pos: 0,
        })
    }

    /// Returns the length of the mapped list in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.map.len()
    }

    /// Returns `true` if the mapped list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl ListStream for MmapStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<(), FlistError> {
        let data = self.map.as_slice();
        let pos = self.pos as usize;
        let end = pos
            .checked_add(buf.len())
            .ok_or(FlistError::UnexpectedEof)?;
        if end > data.len() {
            return Err(FlistError::UnexpectedEof);
        }
        buf.copy_from_slice(&data[pos..end]);
        self.pos = end as u64;
        Ok(())
    }

    fn write(&mut self, _buf: &[u8]) -> Result<(), FlistError> {
        Err(FlistError::ReadOnly)
    }

    fn seek(&mut self, pos: u64) -> Result<(), FlistError> {
        if pos > self.map.len() {
            return Err(FlistError::SeekOutOfRange);
        }
        self.pos = pos;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.pos
    }
}

/// Read-write stream over an ordinary file, used for list production.
#[derive(Debug)]
pub struct FileStream {
    file: File,
    path: PathBuf,
    pos: u64,
}

impl FileStream {
    /// Creates (or truncates) `path` for writing a fresh list.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, FlistError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| FlistError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(Self { file, path, pos: 0 })
    }

    /// Opens an existing list read-only through the same stream type.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FlistError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| FlistError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(Self { file, path, pos: 0 })
    }

    fn io_err(&self, source: std::io::Error) -> FlistError {
        if source.kind() == std::io::ErrorKind::UnexpectedEof {
            FlistError::UnexpectedEof
        } else {
            FlistError::Io {
                path: self.path.clone(),
                source,
            }
        }
    }
}

impl ListStream for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<(), FlistError> {
        self.file.read_exact(buf).map_err(|e| self.io_err(e))?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), FlistError> {
        self.file.write_all(buf).map_err(|e| self.io_err(e))?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn seek(&mut self, pos: u64) -> Result<(), FlistError> {
        self.file
            .seek(SeekFrom::Start(pos))
            .map_err(|e| self.io_err(e))?;
        self.pos = pos;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.pos
    }
}

/// Growable in-memory stream, primarily for tests and round-trip checks.
#[derive(Debug, Default, Clone)]
pub struct VecStream {
    data: Vec<u8>,
    pos: usize,
}

impl VecStream {
    /// Creates an empty stream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps existing bytes for reading.
    #[must_use]
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns the bytes written so far.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl ListStream for VecStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<(), FlistError> {
        let end = self
            .pos
            .checked_add(buf.len())
            .ok_or(FlistError::UnexpectedEof)?;
        if end > self.data.len() {
            return Err(FlistError::UnexpectedEof);
        }
        buf.copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), FlistError> {
        let end = self.pos + buf.len();
        if self.pos == self.data.len() {
            self.data.extend_from_slice(buf);
        } else {
            if end > self.data.len() {
                self.data.resize(end, 0);
            }
            self.data[self.pos..end].copy_from_slice(buf);
        }
        self.pos = end;
        Ok(())
    }

    fn seek(&mut self, pos: u64) -> Result<(), FlistError> {
        let pos = usize::try_from(pos).map_err(|_| FlistError::SeekOutOfRange)?;
        if pos > self.data.len() {
            return Err(FlistError::SeekOutOfRange);
        }
        self.pos = pos;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.pos as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vbyte_round_trip_known_widths() {
        let mut io = ListIo::new(VecStream::new());
        for value in [0u64, 1, 127, 128, 16_383, 16_384, u64::from(u32::MAX)] {
            io.write_num(value).unwrap();
        }
        io.seek(0).unwrap();
        for value in [0u64, 1, 127, 128, 16_383, 16_384, u64::from(u32::MAX)] {
            assert_eq!(io.read_num().unwrap(), value);
        }
    }

    #[test]
    fn vbyte_uses_seven_bits_per_byte() {
        for (value, expected_len) in [(0u64, 1usize), (127, 1), (128, 2), (16_383, 2), (16_384, 3)]
        {
            let mut io = ListIo::new(VecStream::new());
            io.write_num(value).unwrap();
            assert_eq!(io.into_inner().as_slice().len(), expected_len, "{value}");
        }
    }

    #[test]
    fn fixed_ints_are_little_endian() {
        let mut io = ListIo::new(VecStream::new());
        io.write_int(0x0102_0304, 4).unwrap();
        assert_eq!(io.into_inner().as_slice(), &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn signed_ints_round_trip() {
        let mut io = ListIo::new(VecStream::new());
        for value in [0i32, 1, -1, i32::MIN, i32::MAX] {
            io.write_i32(value).unwrap();
        }
        io.seek(0).unwrap();
        for value in [0i32, 1, -1, i32::MIN, i32::MAX] {
            assert_eq!(io.read_i32().unwrap(), value);
        }
    }

    #[test]
    fn strings_are_length_prefixed() {
        let mut io = ListIo::new(VecStream::new());
        io.write_string("abc").unwrap();
        assert_eq!(io.into_inner().as_slice(), &[3, b'a', b'b', b'c']);
    }

    #[test]
    fn oversized_string_is_rejected() {
        let mut io = ListIo::new(VecStream::new());
        let long = "x".repeat(MAX_STRING_LEN);
        assert!(matches!(
            io.write_string(&long),
            Err(FlistError::StringTooLong { .. })
        ));
    }

    #[test]
    fn short_read_is_an_error() {
        let mut io = ListIo::new(VecStream::from_bytes(vec![1, 2]));
        let mut buf = [0u8; 4];
        assert!(matches!(
            io.read_exact(&mut buf),
            Err(FlistError::UnexpectedEof)
        ));
    }

    #[test]
    fn continuation_past_64_bits_overflows() {
        let mut io = ListIo::new(VecStream::from_bytes(vec![0x80; 16]));
        assert!(matches!(io.read_num(), Err(FlistError::IntegerOverflow)));
    }

    proptest::proptest! {
        /// Every value round-trips, in exactly ceil(bitlen/7) bytes.
        #[test]
        fn vbyte_round_trip(value in 0u64..(1u64 << 63)) {
            let mut io = ListIo::new(VecStream::new());
            io.write_num(value).unwrap();

            let bits = if value == 0 { 1 } else { 64 - value.leading_zeros() as usize };
            let expected_len = bits.div_ceil(7);
            proptest::prop_assert_eq!(io.tell() as usize, expected_len);

            io.seek(0).unwrap();
            proptest::prop_assert_eq!(io.read_num().unwrap(), value);
        }
    }
}
