//! Binary buffer reader with cursor tracking.

use std::str;

use crate::flex;
use crate::BufferError;

/// A bounds-checked cursor over a borrowed byte slice.
///
/// The cursor never reads past `end`, so a child view created with
/// [`Reader::slice`] or [`Reader::cut`] cannot observe its parent's bytes.
/// Every fallible read leaves the cursor untouched when it fails.
///
/// # Example
///
/// ```
/// use ion_buffers::Reader;
///
/// let data = [0x03, 0x02, 0x02, 0xff];
/// let mut reader = Reader::new(&data);
///
/// assert_eq!(reader.flex_uint(), Ok(1));
/// assert_eq!(reader.flex_uint(), Ok(128));
/// assert_eq!(reader.fixed_int(1), Ok(-1));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Reader<'a> {
    /// The underlying byte slice.
    pub uint8: &'a [u8],
    /// Current cursor position.
    pub x: usize,
    /// End position (exclusive).
    pub end: usize,
}

impl<'a> Reader<'a> {
    /// Creates a new reader for the given byte slice.
    pub fn new(uint8: &'a [u8]) -> Self {
        let end = uint8.len();
        Self { uint8, x: 0, end }
    }

    /// Creates a reader over `uint8[x..end]`.
    pub fn from_slice(uint8: &'a [u8], x: usize, end: usize) -> Self {
        let end = end.min(uint8.len());
        Self { uint8, x, end }
    }

    /// Returns the number of remaining bytes.
    pub fn size(&self) -> usize {
        self.end.saturating_sub(self.x)
    }

    /// Returns `true` when the cursor reached its end.
    pub fn is_empty(&self) -> bool {
        self.x >= self.end
    }

    /// Returns the bytes between the cursor and the end.
    pub fn remaining(&self) -> &'a [u8] {
        &self.uint8[self.x.min(self.end)..self.end]
    }

    /// Advances the cursor by the given number of bytes.
    pub fn skip(&mut self, length: usize) -> Result<(), BufferError> {
        self.check(length)?;
        self.x += length;
        Ok(())
    }

    /// Creates a new Reader over `[x + start, x + end)` without advancing.
    pub fn slice(&self, start: usize, end: Option<usize>) -> Reader<'a> {
        let x = self.x;
        let actual_start = x + start;
        let actual_end = end.map(|e| x + e).unwrap_or(self.end).min(self.end);
        Reader::from_slice(self.uint8, actual_start, actual_end)
    }

    /// Creates a new Reader over the next `size` bytes and advances past them.
    pub fn cut(&mut self, size: usize) -> Result<Reader<'a>, BufferError> {
        self.check(size)?;
        let slice = self.slice(0, Some(size));
        self.x += size;
        Ok(slice)
    }

    /// Checks that `n` more bytes are available from the current cursor.
    #[inline]
    fn check(&self, n: usize) -> Result<(), BufferError> {
        match self.x.checked_add(n) {
            Some(needed) if needed <= self.end => Ok(()),
            _ => Err(BufferError::EndOfBuffer),
        }
    }

    /// Reads an unsigned 8-bit integer.
    #[inline]
    pub fn try_u8(&mut self) -> Result<u8, BufferError> {
        self.check(1)?;
        let val = self.uint8[self.x];
        self.x += 1;
        Ok(val)
    }

    /// Reads an unsigned 16-bit little-endian integer.
    #[inline]
    pub fn try_u16_le(&mut self) -> Result<u16, BufferError> {
        self.check(2)?;
        let val = u16::from_le_bytes([self.uint8[self.x], self.uint8[self.x + 1]]);
        self.x += 2;
        Ok(val)
    }

    /// Reads `size` raw bytes and advances the cursor.
    pub fn try_buf(&mut self, size: usize) -> Result<&'a [u8], BufferError> {
        self.check(size)?;
        let x = self.x;
        let end = x + size;
        let bin = &self.uint8[x..end];
        self.x = end;
        Ok(bin)
    }

    /// Reads a UTF-8 string of `size` bytes without copying.
    pub fn try_utf8(&mut self, size: usize) -> Result<&'a str, BufferError> {
        self.check(size)?;
        let start = self.x;
        let text = str::from_utf8(&self.uint8[start..start + size])
            .map_err(|_| BufferError::InvalidUtf8)?;
        self.x += size;
        Ok(text)
    }

    // -----------------------------------------------------------------------
    // Ion 1.1 primitives
    // -----------------------------------------------------------------------

    /// Reads a FlexUInt.
    pub fn flex_uint(&mut self) -> Result<u64, BufferError> {
        let (value, len) = flex::decode_flex_uint(self.remaining())?;
        self.x += len;
        Ok(value)
    }

    /// Reads a FlexInt.
    pub fn flex_int(&mut self) -> Result<i64, BufferError> {
        let (value, len) = flex::decode_flex_int(self.remaining())?;
        self.x += len;
        Ok(value)
    }

    /// Reads a FlexUInt that must fit in a `usize` (lengths, addresses).
    pub fn flex_usize(&mut self) -> Result<usize, BufferError> {
        let (value, len) = flex::decode_flex_uint(self.remaining())?;
        let value = usize::try_from(value).map_err(|_| BufferError::Overflow)?;
        self.x += len;
        Ok(value)
    }

    /// Reads an `n`-byte little-endian FixedUInt, `n <= 8`.
    pub fn fixed_uint(&mut self, n: usize) -> Result<u64, BufferError> {
        if n > 8 {
            return Err(BufferError::Overflow);
        }
        let bytes = self.try_buf(n)?;
        Ok(flex::fixed_uint_from_le(bytes)? as u64)
    }

    /// Reads an `n`-byte little-endian two's complement FixedInt, `n <= 8`.
    pub fn fixed_int(&mut self, n: usize) -> Result<i64, BufferError> {
        if n > 8 {
            return Err(BufferError::Overflow);
        }
        let bytes = self.try_buf(n)?;
        Ok(flex::fixed_int_from_le(bytes)? as i64)
    }

    /// Reads an `n`-byte FixedInt into an `i128`, `n <= 16`.
    pub fn fixed_int_i128(&mut self, n: usize) -> Result<i128, BufferError> {
        if n > 16 {
            return Err(BufferError::Overflow);
        }
        self.check(n)?;
        let value = flex::fixed_int_from_le(&self.uint8[self.x..self.x + n])?;
        self.x += n;
        Ok(value)
    }

    /// Reads a little-endian IEEE 754 half precision float.
    pub fn f16_le(&mut self) -> Result<f32, BufferError> {
        let bits = self.try_u16_le()?;
        Ok(f16_to_f32(bits))
    }

    /// Reads a little-endian 32-bit float.
    pub fn f32_le(&mut self) -> Result<f32, BufferError> {
        let bytes = self.try_buf(4)?;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a little-endian 64-bit float.
    pub fn f64_le(&mut self) -> Result<f64, BufferError> {
        let bytes = self.try_buf(8)?;
        let mut word = [0u8; 8];
        word.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(word))
    }

    // -----------------------------------------------------------------------
    // Ion 1.0 primitives
    // -----------------------------------------------------------------------

    /// Reads an Ion 1.0 VarUInt: 7 data bits per byte, MSB set on the last
    /// byte.
    pub fn var_uint(&mut self) -> Result<u64, BufferError> {
        let mut result: u64 = 0;
        let mut p = self.x;
        loop {
            if p >= self.end {
                return Err(BufferError::EndOfBuffer);
            }
            let b = self.uint8[p];
            p += 1;
            if result > (u64::MAX >> 7) {
                return Err(BufferError::Overflow);
            }
            result = (result << 7) | (b & 0x7f) as u64;
            if b & 0x80 != 0 {
                self.x = p;
                return Ok(result);
            }
        }
    }

    /// Reads an Ion 1.0 VarInt. The second element is `true` for negative
    /// zero, which Ion uses to mark an unknown timestamp offset.
    pub fn var_int(&mut self) -> Result<(i64, bool), BufferError> {
        let mut p = self.x;
        if p >= self.end {
            return Err(BufferError::EndOfBuffer);
        }
        let first = self.uint8[p];
        p += 1;
        let negative = first & 0x40 != 0;
        let mut magnitude = (first & 0x3f) as i64;
        let mut last = first & 0x80 != 0;
        while !last {
            if p >= self.end {
                return Err(BufferError::EndOfBuffer);
            }
            let b = self.uint8[p];
            p += 1;
            if magnitude > (i64::MAX >> 7) {
                return Err(BufferError::Overflow);
            }
            magnitude = (magnitude << 7) | (b & 0x7f) as i64;
            last = b & 0x80 != 0;
        }
        self.x = p;
        if negative {
            Ok((-magnitude, magnitude == 0))
        } else {
            Ok((magnitude, false))
        }
    }

    /// Reads an `n`-byte big-endian unsigned integer (Ion 1.0 UInt).
    pub fn uint_be(&mut self, n: usize) -> Result<u128, BufferError> {
        if n > 16 {
            return Err(BufferError::Overflow);
        }
        let bytes = self.try_buf(n)?;
        Ok(bytes.iter().fold(0u128, |acc, b| (acc << 8) | *b as u128))
    }

    /// Reads an `n`-byte big-endian sign-magnitude integer (Ion 1.0 Int).
    /// The second element is `true` for negative zero.
    pub fn int_be(&mut self, n: usize) -> Result<(i128, bool), BufferError> {
        if n == 0 {
            return Ok((0, false));
        }
        if n > 16 {
            return Err(BufferError::Overflow);
        }
        let bytes = self.try_buf(n)?;
        let negative = bytes[0] & 0x80 != 0;
        let magnitude = bytes
            .iter()
            .enumerate()
            .fold(0u128, |acc, (i, b)| {
                let b = if i == 0 { b & 0x7f } else { *b };
                (acc << 8) | b as u128
            });
        let magnitude = i128::try_from(magnitude).map_err(|_| BufferError::Overflow)?;
        if negative {
            Ok((-magnitude, magnitude == 0))
        } else {
            Ok((magnitude, false))
        }
    }
}

/// Widens IEEE 754 binary16 bits to an `f32`.
pub fn f16_to_f32(bits: u16) -> f32 {
    let sign = ((bits >> 15) as u32) << 31;
    let exponent = ((bits >> 10) & 0x1f) as u32;
    let mantissa = (bits & 0x3ff) as u32;
    let out = match (exponent, mantissa) {
        (0, 0) => sign,
        (0, m) => {
            // Subnormal: normalize the mantissa.
            let shift = m.leading_zeros() - 21;
            let m = (m << shift) & 0x3ff;
            let e = 127 - 15 + 1 - shift;
            sign | (e << 23) | (m << 13)
        }
        (0x1f, m) => sign | 0x7f80_0000 | (m << 13),
        (e, m) => sign | ((e + 127 - 15) << 23) | (m << 13),
    };
    f32::from_bits(out)
}
