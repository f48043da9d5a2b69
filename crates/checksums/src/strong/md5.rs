use std::io::{self, Read};

use digest::Digest;

/// Streaming MD5 hasher used to fingerprint whole files in list records.
#[derive(Clone, Debug)]
pub struct Md5 {
    inner: md5::Md5,
}

impl Default for Md5 {
    fn default() -> Self {
        Self::new()
    }
}

impl Md5 {
    /// Buffer length used by [`update_reader`](Self::update_reader).
    pub const READER_BUFFER_LEN: usize = 64 * 1024;

    /// Creates a hasher with an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: md5::Md5::new(),
        }
    }

    /// Feeds additional bytes into the digest state.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Updates the digest by consuming a reader to end of stream.
    ///
    /// Returns the number of bytes hashed. Interrupted reads are retried.
    pub fn update_reader<R: Read>(&mut self, reader: &mut R) -> io::Result<u64> {
        let mut buffer = vec![0u8; Self::READER_BUFFER_LEN];
        let mut total = 0u64;
        loop {
            match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    self.inner.update(&buffer[..n]);
                    total += n as u64;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(total)
    }

    /// Finalises the digest and returns the 128-bit MD5 output.
    #[must_use]
    pub fn finalize(self) -> [u8; 16] {
        self.inner.finalize().into()
    }

    /// Convenience helper that computes the MD5 digest for `data` in one shot.
    #[must_use]
    pub fn digest(data: &[u8]) -> [u8; 16] {
        md5::Md5::digest(data).into()
    }
}
