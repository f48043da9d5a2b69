//! Weak rolling checksum used for block matching.

use thiserror::Error;

/// Error returned when a rolling-checksum operation is invalid.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum RollingError {
    /// [`RollingChecksum::roll`] was called before any bytes were observed.
    #[error("cannot roll an empty checksum window")]
    EmptyWindow,
    /// The window grew past what the incremental update can represent.
    #[error("checksum window of {len} bytes is too large to roll")]
    WindowTooLarge {
        /// Length of the offending window in bytes.
        len: usize,
    },
}

/// Weak rolling checksum over a fixed-size block.
///
/// `s1` accumulates the byte sum and `s2` accumulates the running prefix
/// sums; both are truncated to 16 bits. The packed value
/// `(s2 << 16) | s1` is what the list format stores (big-endian) for each
/// block, and what the matcher index is keyed on.
///
/// The same state can be built by a single [`update`](Self::update) over a
/// block or maintained incrementally with [`roll`](Self::roll) while a
/// window slides over a target file one byte at a time.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RollingChecksum {
    s1: u32,
    s2: u32,
    len: usize,
}

impl RollingChecksum {
    /// Creates a new rolling checksum with zeroed state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            s1: 0,
            s2: 0,
            len: 0,
        }
    }

    /// Resets the checksum back to its initial state.
    pub const fn reset(&mut self) {
        self.s1 = 0;
        self.s2 = 0;
        self.len = 0;
    }

    /// Returns the number of bytes that contributed to the current state.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no bytes have been observed yet.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Updates the checksum with an additional slice of bytes.
    ///
    /// Splitting the input across several calls yields the same state as a
    /// single call over the concatenation.
    #[inline]
    pub fn update(&mut self, chunk: &[u8]) {
        let mut s1 = self.s1;
        let mut s2 = self.s2;
        for &byte in chunk {
            s1 = s1.wrapping_add(u32::from(byte));
            s2 = s2.wrapping_add(s1);
        }
        self.s1 = s1 & 0xffff;
        self.s2 = s2 & 0xffff;
        self.len += chunk.len();
    }

    /// Clears the state and updates with `block` in one step.
    pub fn update_from_block(&mut self, block: &[u8]) {
        self.reset();
        self.update(block);
    }

    /// Rolls the checksum by removing one byte and adding another.
    ///
    /// This is the O(1) sliding-window update: the window length stays
    /// constant while its contents shift by one byte.
    ///
    /// # Errors
    ///
    /// Returns [`RollingError::EmptyWindow`] if no bytes have been processed
    /// and [`RollingError::WindowTooLarge`] if the window length does not fit
    /// in 32 bits.
    #[inline]
    pub fn roll(&mut self, outgoing: u8, incoming: u8) -> Result<(), RollingError> {
        if self.len == 0 {
            return Err(RollingError::EmptyWindow);
        }
        let window_len =
            u32::try_from(self.len).map_err(|_| RollingError::WindowTooLarge { len: self.len })?;

        let out = u32::from(outgoing);
        let inn = u32::from(incoming);

        let new_s1 = self.s1.wrapping_sub(out).wrapping_add(inn) & 0xffff;
        let new_s2 = self
            .s2
            .wrapping_sub(window_len.wrapping_mul(out))
            .wrapping_add(new_s1)
            & 0xffff;

        self.s1 = new_s1;
        self.s2 = new_s2;
        Ok(())
    }

    /// Returns the checksum in its packed 32-bit representation.
    ///
    /// The format is `(s2 << 16) | s1`; the upper half is the prefix-sum
    /// accumulator, the lower half the byte sum.
    #[inline]
    #[must_use]
    pub const fn value(&self) -> u32 {
        (self.s2 << 16) | self.s1
    }
}

/// Computes the packed rolling checksum of one block from scratch.
#[must_use]
pub fn block_checksum(block: &[u8]) -> u32 {
    let mut sum = RollingChecksum::new();
    sum.update(block);
    sum.value()
}
