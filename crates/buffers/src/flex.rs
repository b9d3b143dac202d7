//! FlexUInt, FlexInt and FixedInt framing.
//!
//! A Flex integer stores its own length in unary in the low bits of the
//! first byte: `trailing_zeros(first) + 1` is the total byte count. The
//! remaining bits hold the payload in little-endian order.
//!
//! ```text
//! 1 byte   xxxx_xxx1
//! 2 bytes  xxxx_xx10 xxxx_xxxx
//! 9 bytes  0000_0000 xxxx_xxx1 xxxx_xxxx ... (8 bytes after the first)
//! ```
//!
//! Only forms of up to 9 bytes (63 payload bits) are decoded; a 9-byte
//! header whose second byte has its low bit clear announces a wider form
//! and is rejected with [`BufferError::Overflow`].

use crate::BufferError;

/// Largest number of bytes a decodable Flex integer occupies.
pub const MAX_FLEX_LEN: usize = 9;

/// Returns the total length of a Flex integer from its first byte.
#[inline]
pub fn flex_len(first: u8) -> usize {
    first.trailing_zeros() as usize + 1
}

/// Number of bytes needed to encode `value` as a FlexUInt.
pub fn flex_uint_len(value: u64) -> usize {
    let bits = (64 - value.leading_zeros() as usize).max(1);
    bits.div_ceil(7)
}

/// Number of bytes needed to encode `value` as a FlexInt.
pub fn flex_int_len(value: i64) -> usize {
    let magnitude = if value < 0 { !value } else { value };
    let bits = 65 - magnitude.leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Minimal number of bytes for a FixedUInt; zero needs no bytes.
pub fn fixed_uint_len(value: u128) -> usize {
    let bits = 128 - value.leading_zeros() as usize;
    bits.div_ceil(8)
}

/// Minimal number of bytes for a two's complement FixedInt; zero needs no
/// bytes.
pub fn fixed_int_len(value: i128) -> usize {
    if value == 0 {
        return 0;
    }
    let magnitude = if value < 0 { !value } else { value };
    let bits = 129 - magnitude.leading_zeros() as usize;
    bits.div_ceil(8)
}

/// Decodes a FlexUInt at the start of `bytes`, returning the value and the
/// number of bytes it occupied.
pub fn decode_flex_uint(bytes: &[u8]) -> Result<(u64, usize), BufferError> {
    let first = *bytes.first().ok_or(BufferError::EndOfBuffer)?;
    let len = flex_len(first);
    if len == MAX_FLEX_LEN {
        let word = nine_byte_word(bytes)?;
        return Ok(((word as u64) >> 1, MAX_FLEX_LEN));
    }
    if bytes.len() < len {
        return Err(BufferError::EndOfBuffer);
    }
    let mut word = [0u8; 8];
    word[..len].copy_from_slice(&bytes[..len]);
    Ok((u64::from_le_bytes(word) >> len, len))
}

/// Decodes a FlexInt at the start of `bytes`, returning the value and the
/// number of bytes it occupied.
pub fn decode_flex_int(bytes: &[u8]) -> Result<(i64, usize), BufferError> {
    let first = *bytes.first().ok_or(BufferError::EndOfBuffer)?;
    let len = flex_len(first);
    if len == MAX_FLEX_LEN {
        let word = nine_byte_word(bytes)?;
        return Ok((word >> 1, MAX_FLEX_LEN));
    }
    if bytes.len() < len {
        return Err(BufferError::EndOfBuffer);
    }
    let mut word = [0u8; 8];
    word[..len].copy_from_slice(&bytes[..len]);
    let unused = 64 - 8 * len as u32;
    let signed = (i64::from_le_bytes(word) << unused) >> unused;
    Ok((signed >> len, len))
}

/// Reads the 8 payload bytes of a 9-byte Flex integer and checks the end
/// flag held in their lowest bit.
fn nine_byte_word(bytes: &[u8]) -> Result<i64, BufferError> {
    if let Some(second) = bytes.get(1) {
        if second & 1 == 0 {
            return Err(BufferError::Overflow);
        }
    }
    if bytes.len() < MAX_FLEX_LEN {
        return Err(BufferError::EndOfBuffer);
    }
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[1..MAX_FLEX_LEN]);
    Ok(i64::from_le_bytes(word))
}

/// Encodes `value` as a FlexUInt into `out`, returning the length used.
///
/// Values of 2^63 and above need a 10-byte form; it is produced here for
/// completeness but [`decode_flex_uint`] rejects it.
pub fn encode_flex_uint(value: u64, out: &mut [u8; 16]) -> usize {
    let len = flex_uint_len(value);
    let encoded = ((value as u128) << len) | (1u128 << (len - 1));
    out[..len].copy_from_slice(&encoded.to_le_bytes()[..len]);
    len
}

/// Encodes `value` as a FlexInt into `out`, returning the length used.
pub fn encode_flex_int(value: i64, out: &mut [u8; 16]) -> usize {
    let len = flex_int_len(value);
    let encoded = ((value as i128) << len) | (1i128 << (len - 1));
    out[..len].copy_from_slice(&encoded.to_le_bytes()[..len]);
    len
}

/// Sign-extends the `len` little-endian bytes of `bytes` into an `i128`.
pub fn fixed_int_from_le(bytes: &[u8]) -> Result<i128, BufferError> {
    let len = bytes.len();
    if len == 0 {
        return Ok(0);
    }
    if len > 16 {
        return Err(BufferError::Overflow);
    }
    let mut word = [0u8; 16];
    word[..len].copy_from_slice(bytes);
    let unused = 128 - 8 * len as u32;
    Ok((i128::from_le_bytes(word) << unused) >> unused)
}

/// Zero-extends the little-endian bytes of `bytes` into a `u128`.
pub fn fixed_uint_from_le(bytes: &[u8]) -> Result<u128, BufferError> {
    if bytes.len() > 16 {
        return Err(BufferError::Overflow);
    }
    let mut word = [0u8; 16];
    word[..bytes.len()].copy_from_slice(bytes);
    Ok(u128::from_le_bytes(word))
}
