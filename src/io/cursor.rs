//! Little-endian cursor over an in-memory byte buffer.

use crate::errors::{PestError, PestResult};

/// A cursor-based reader over a byte slice, using little-endian conventions.
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    /// Create a new reader over the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current read position.
    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Remaining bytes from current position.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Read a sub-slice of `n` bytes, advancing the cursor.
    pub fn read_bytes(&mut self, n: usize) -> PestResult<&'a [u8]> {
        self.ensure(n)?;
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read a little-endian i32.
    pub fn read_i32(&mut self) -> PestResult<i32> {
        let b = self.read_bytes(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a little-endian f64.
    pub fn read_f64(&mut self) -> PestResult<f64> {
        let b = self.read_bytes(8)?;
        Ok(f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    /// Read a fixed-width, blank-padded text field.
    ///
    /// Trailing blanks and NULs are removed and the result is lowercased.
    pub fn read_name(&mut self, width: usize) -> PestResult<String> {
        let raw = self.read_bytes(width)?;
        let text = String::from_utf8_lossy(raw);
        Ok(text.trim_end_matches([' ', '\0']).to_lowercase())
    }

    fn ensure(&self, n: usize) -> PestResult<()> {
        if self.remaining() < n {
            return Err(PestError::Truncated {
                offset: self.pos,
                needed: n,
                available: self.remaining(),
            });
        }
        Ok(())
    }
}
