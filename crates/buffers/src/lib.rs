//! Byte cursors and variable-width integer codecs for Ion binary.
//!
//! [`Reader`] is a bounds-checked cursor over a borrowed byte slice,
//! [`Writer`] is a growable output buffer. Both speak the Ion 1.1
//! self-framing integers (FlexUInt, FlexInt), the fixed-width little-endian
//! integers (FixedUInt, FixedInt) and the Ion 1.0 VarUInt/VarInt/UInt/Int
//! primitives.

pub mod flex;
mod reader;
mod writer;

pub use reader::{f16_to_f32, Reader};
pub use writer::{int_be_len, var_int_len, var_uint_len, Writer};

/// Errors raised by byte cursors and integer codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// Fewer bytes remain than the framing or the caller requires.
    #[error("unexpected end of buffer")]
    EndOfBuffer,
    /// The bytes are not valid UTF-8.
    #[error("invalid UTF-8")]
    InvalidUtf8,
    /// The encoded integer does not fit the target width.
    #[error("integer overflow")]
    Overflow,
}
