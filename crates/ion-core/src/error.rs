//! Error taxonomy shared by every layer of the crate.

use ion_buffers::BufferError;

/// Ion decoding, encoding and expansion error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IonError {
    /// Framing, opcode or bounds violation. Fatal for the current value.
    #[error("malformed data: {0}")]
    MalformedData(String),
    /// A FlexUInt/FlexInt wider than nine bytes, or an integer too wide for
    /// the target type.
    #[error("integer overflow")]
    Overflow,
    /// A symbol ID resolved to a table slot that has no text.
    #[error("unknown text for symbol ID {0}")]
    UnknownSymbolText(usize),
    #[error("macro compilation error: {0}")]
    MacroCompilationError(String),
    /// A recognized form that this implementation does not support.
    #[error("unimplemented feature: {0}")]
    UnimplementedFeature(String),
    /// API misuse, such as reading a value of the wrong type.
    #[error("usage error: {0}")]
    Usage(String),
}

/// Result alias used throughout the crate.
pub type IonResult<T> = Result<T, IonError>;

impl From<BufferError> for IonError {
    fn from(err: BufferError) -> Self {
        match err {
            BufferError::EndOfBuffer => IonError::MalformedData("unexpected end of input".into()),
            BufferError::InvalidUtf8 => IonError::MalformedData("invalid UTF-8".into()),
            BufferError::Overflow => IonError::Overflow,
        }
    }
}

pub(crate) fn malformed<T>(msg: impl Into<String>) -> IonResult<T> {
    Err(IonError::MalformedData(msg.into()))
}

pub(crate) fn usage<T>(msg: impl Into<String>) -> IonResult<T> {
    Err(IonError::Usage(msg.into()))
}

pub(crate) fn unimplemented<T>(msg: impl Into<String>) -> IonResult<T> {
    Err(IonError::UnimplementedFeature(msg.into()))
}
