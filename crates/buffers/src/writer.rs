//! Binary buffer writer with auto-growing capacity.

use crate::flex;

/// A binary buffer writer that grows automatically as needed.
///
/// # Example
///
/// ```
/// use ion_buffers::Writer;
///
/// let mut writer = Writer::new();
/// writer.u8(0x61);
/// writer.flex_uint(128);
/// writer.fixed_int(-1);
/// let data = writer.flush();
/// assert_eq!(data, [0x61, 0x02, 0x02, 0xff]);
/// ```
pub struct Writer {
    /// The underlying byte buffer.
    pub uint8: Vec<u8>,
    /// Position where last flush happened.
    pub x0: usize,
    /// Current cursor position.
    pub x: usize,
    /// Allocation size when buffer needs to grow.
    alloc_size: usize,
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

impl Writer {
    /// Creates a new writer with default allocation size (4KB).
    pub fn new() -> Self {
        Self::with_alloc_size(4 * 1024)
    }

    /// Creates a new writer with custom allocation size.
    pub fn with_alloc_size(alloc_size: usize) -> Self {
        let uint8 = vec![0u8; alloc_size];
        Self {
            uint8,
            x0: 0,
            x: 0,
            alloc_size,
        }
    }

    /// Ensures the buffer has at least `capacity` bytes available.
    pub fn ensure_capacity(&mut self, capacity: usize) {
        let remaining = self.uint8.len() - self.x;
        if remaining < capacity {
            let total = self.uint8.len() - self.x0;
            let required = capacity - remaining;
            let total_required = total + required;
            let new_size = if total_required <= self.alloc_size {
                self.alloc_size
            } else {
                total_required * 2
            };
            self.grow(new_size);
        }
    }

    fn grow(&mut self, new_size: usize) {
        let x0 = self.x0;
        let x = self.x;
        let mut new_buf = vec![0u8; new_size];
        new_buf[..x - x0].copy_from_slice(&self.uint8[x0..x]);
        self.uint8 = new_buf;
        self.x = x - x0;
        self.x0 = 0;
    }

    /// Number of bytes written since the last flush.
    pub fn len(&self) -> usize {
        self.x - self.x0
    }

    /// Returns `true` when nothing was written since the last flush.
    pub fn is_empty(&self) -> bool {
        self.x == self.x0
    }

    /// Bytes written since the last flush, without consuming them.
    pub fn as_slice(&self) -> &[u8] {
        &self.uint8[self.x0..self.x]
    }

    /// Resets the flush position.
    pub fn reset(&mut self) {
        self.x0 = self.x;
    }

    /// Drops everything written after `mark`, where `mark` was read from
    /// [`Writer::x`].
    pub fn truncate(&mut self, mark: usize) {
        if mark >= self.x0 && mark < self.x {
            self.x = mark;
        }
    }

    /// Returns the written data and advances the flush position.
    pub fn flush(&mut self) -> Vec<u8> {
        let result = self.uint8[self.x0..self.x].to_vec();
        self.x0 = self.x;
        result
    }

    /// Writes an unsigned 8-bit integer.
    #[inline]
    pub fn u8(&mut self, val: u8) {
        self.ensure_capacity(1);
        self.uint8[self.x] = val;
        self.x += 1;
    }

    /// Writes an unsigned 16-bit integer (little-endian).
    #[inline]
    pub fn u16_le(&mut self, val: u16) {
        self.buf(&val.to_le_bytes());
    }

    /// Writes a 32-bit float (little-endian).
    #[inline]
    pub fn f32_le(&mut self, val: f32) {
        self.buf(&val.to_le_bytes());
    }

    /// Writes a 64-bit float (little-endian).
    #[inline]
    pub fn f64_le(&mut self, val: f64) {
        self.buf(&val.to_le_bytes());
    }

    /// Writes a 64-bit float (big-endian), the Ion 1.0 float layout.
    #[inline]
    pub fn f64_be(&mut self, val: f64) {
        self.buf(&val.to_be_bytes());
    }

    /// Writes a byte slice.
    pub fn buf(&mut self, buf: &[u8]) {
        let length = buf.len();
        self.ensure_capacity(length);
        self.uint8[self.x..self.x + length].copy_from_slice(buf);
        self.x += length;
    }

    /// Writes a UTF-8 string. Returns the number of bytes written.
    pub fn utf8(&mut self, s: &str) -> usize {
        let bytes = s.as_bytes();
        self.buf(bytes);
        bytes.len()
    }

    // -----------------------------------------------------------------------
    // Ion 1.1 primitives
    // -----------------------------------------------------------------------

    /// Writes a FlexUInt. Returns the number of bytes written.
    pub fn flex_uint(&mut self, val: u64) -> usize {
        let mut out = [0u8; 16];
        let len = flex::encode_flex_uint(val, &mut out);
        self.buf(&out[..len]);
        len
    }

    /// Writes a FlexInt. Returns the number of bytes written.
    pub fn flex_int(&mut self, val: i64) -> usize {
        let mut out = [0u8; 16];
        let len = flex::encode_flex_int(val, &mut out);
        self.buf(&out[..len]);
        len
    }

    /// Writes the minimal little-endian two's complement form of `val`.
    /// Zero is written as no bytes. Returns the number of bytes written.
    pub fn fixed_int(&mut self, val: i128) -> usize {
        let len = flex::fixed_int_len(val);
        self.fixed_int_sized(val, len);
        len
    }

    /// Writes `val` as a FixedInt of exactly `len` bytes.
    pub fn fixed_int_sized(&mut self, val: i128, len: usize) {
        let bytes = val.to_le_bytes();
        self.buf(&bytes[..len.min(16)]);
    }

    /// Writes the minimal little-endian form of `val`. Returns the number of
    /// bytes written.
    pub fn fixed_uint(&mut self, val: u128) -> usize {
        let len = flex::fixed_uint_len(val);
        self.buf(&val.to_le_bytes()[..len]);
        len
    }

    // -----------------------------------------------------------------------
    // Ion 1.0 primitives
    // -----------------------------------------------------------------------

    /// Writes an Ion 1.0 VarUInt.
    pub fn var_uint(&mut self, val: u64) {
        let len = var_uint_len(val);
        for i in (0..len).rev() {
            let mut b = ((val >> (7 * i)) & 0x7f) as u8;
            if i == 0 {
                b |= 0x80;
            }
            self.u8(b);
        }
    }

    /// Writes an Ion 1.0 VarInt.
    pub fn var_int(&mut self, val: i64) {
        let magnitude = val.unsigned_abs();
        let len = var_int_len(val);
        for i in (0..len).rev() {
            let mut b = ((magnitude >> (7 * i)) & 0x7f) as u8;
            if i == len - 1 {
                b &= 0x3f;
                if val < 0 {
                    b |= 0x40;
                }
            }
            if i == 0 {
                b |= 0x80;
            }
            self.u8(b);
        }
    }

    /// Writes the minimal big-endian form of `val` (Ion 1.0 UInt).
    pub fn uint_be(&mut self, val: u128) -> usize {
        let len = flex::fixed_uint_len(val);
        self.buf(&val.to_be_bytes()[16 - len..]);
        len
    }

    /// Writes the minimal big-endian sign-magnitude form of `val` (Ion 1.0
    /// Int). Zero is written as no bytes unless `negative_zero` is set.
    pub fn int_be(&mut self, val: i128, negative_zero: bool) -> usize {
        let magnitude = val.unsigned_abs();
        let negative = val < 0 || (val == 0 && negative_zero);
        if magnitude == 0 && !negative {
            return 0;
        }
        let mut len = flex::fixed_uint_len(magnitude).max(1);
        let bytes = magnitude.to_be_bytes();
        let first = 16 - len;
        let start = self.x;
        if bytes[first] & 0x80 != 0 {
            // The magnitude's top bit collides with the sign bit.
            self.u8(0);
            len += 1;
        }
        self.buf(&bytes[first..]);
        if negative {
            self.uint8[start] |= 0x80;
        }
        len
    }
}

/// Number of bytes an Ion 1.0 VarUInt needs.
pub fn var_uint_len(val: u64) -> usize {
    let bits = (64 - val.leading_zeros() as usize).max(1);
    bits.div_ceil(7)
}

/// Number of bytes an Ion 1.0 VarInt needs.
pub fn var_int_len(val: i64) -> usize {
    let bits = 64 - val.unsigned_abs().leading_zeros() as usize;
    // The first byte carries the sign bit and only six magnitude bits.
    (bits + 1).div_ceil(7).max(1)
}

/// Number of bytes [`Writer::int_be`] writes for `val`.
pub fn int_be_len(val: i128) -> usize {
    let magnitude = val.unsigned_abs();
    if magnitude == 0 {
        return 0;
    }
    let bits = 128 - magnitude.leading_zeros() as usize;
    (bits + 1).div_ceil(8)
}
