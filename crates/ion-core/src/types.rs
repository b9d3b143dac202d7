//! Token tags and scalar value types.

use std::fmt;
use std::rc::Rc;

use crate::error::{IonError, IonResult};

/// Binary encoding version selected by the most recent version marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    V1_0,
    V1_1,
}

impl Version {
    /// The four bytes of this version's marker.
    pub fn marker(self) -> [u8; 4] {
        match self {
            Version::V1_0 => [0xE0, 0x01, 0x00, 0xEA],
            Version::V1_1 => [0xE0, 0x01, 0x01, 0xEA],
        }
    }
}

/// The Ion data model types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IonType {
    Null,
    Bool,
    Int,
    Float,
    Decimal,
    Timestamp,
    Symbol,
    String,
    Clob,
    Blob,
    List,
    Sexp,
    Struct,
}

impl IonType {
    /// Type code used by the typed-null opcode (`0xEB xx`).
    pub(crate) fn from_typed_null_code(code: u8) -> Option<IonType> {
        Some(match code {
            0x00 => IonType::Bool,
            0x01 => IonType::Int,
            0x02 => IonType::Float,
            0x03 => IonType::Decimal,
            0x04 => IonType::Timestamp,
            0x05 => IonType::String,
            0x06 => IonType::Symbol,
            0x07 => IonType::Blob,
            0x08 => IonType::Clob,
            0x09 => IonType::List,
            0x0A => IonType::Sexp,
            0x0B => IonType::Struct,
            _ => return None,
        })
    }

    pub(crate) fn typed_null_code(self) -> Option<u8> {
        Some(match self {
            IonType::Null => return None,
            IonType::Bool => 0x00,
            IonType::Int => 0x01,
            IonType::Float => 0x02,
            IonType::Decimal => 0x03,
            IonType::Timestamp => 0x04,
            IonType::String => 0x05,
            IonType::Symbol => 0x06,
            IonType::Blob => 0x07,
            IonType::Clob => 0x08,
            IonType::List => 0x09,
            IonType::Sexp => 0x0A,
            IonType::Struct => 0x0B,
        })
    }

    pub fn is_container(self) -> bool {
        matches!(self, IonType::List | IonType::Sexp | IonType::Struct)
    }

    /// Name as written in Ion text (`null.int`, `list`, ...).
    pub fn name(self) -> &'static str {
        match self {
            IonType::Null => "null",
            IonType::Bool => "bool",
            IonType::Int => "int",
            IonType::Float => "float",
            IonType::Decimal => "decimal",
            IonType::Timestamp => "timestamp",
            IonType::Symbol => "symbol",
            IonType::String => "string",
            IonType::Clob => "clob",
            IonType::Blob => "blob",
            IonType::List => "list",
            IonType::Sexp => "sexp",
            IonType::Struct => "struct",
        }
    }
}

impl fmt::Display for IonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A tag produced by a token source. The value behind it is read on demand
/// with the matching `read_*` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    Null,
    Bool,
    Int,
    Float,
    Decimal,
    Timestamp,
    String,
    Symbol,
    Clob,
    Blob,
    List,
    Sexp,
    Struct,
    Annotations,
    FieldName,
    End,
    VersionMarker,
    MacroInvocation,
    ExpressionGroup,
}

impl Token {
    /// The data model type of a value token.
    pub fn ion_type(self) -> Option<IonType> {
        Some(match self {
            Token::Null => IonType::Null,
            Token::Bool => IonType::Bool,
            Token::Int => IonType::Int,
            Token::Float => IonType::Float,
            Token::Decimal => IonType::Decimal,
            Token::Timestamp => IonType::Timestamp,
            Token::String => IonType::String,
            Token::Symbol => IonType::Symbol,
            Token::Clob => IonType::Clob,
            Token::Blob => IonType::Blob,
            Token::List => IonType::List,
            Token::Sexp => IonType::Sexp,
            Token::Struct => IonType::Struct,
            _ => return None,
        })
    }

    pub fn is_container(self) -> bool {
        matches!(self, Token::List | Token::Sexp | Token::Struct)
    }

    /// Whether the token stands for a value (scalar, null or container).
    pub fn is_value(self) -> bool {
        self.ion_type().is_some()
    }
}

/// Symbol text or, when the table slot declares none, the bare symbol ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Symbol {
    Text(Rc<str>),
    Unknown(usize),
}

impl Symbol {
    pub fn text(&self) -> IonResult<&str> {
        match self {
            Symbol::Text(text) => Ok(text),
            Symbol::Unknown(sid) => Err(IonError::UnknownSymbolText(*sid)),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Symbol::Text(text) => Some(text),
            Symbol::Unknown(_) => None,
        }
    }

    pub(crate) fn from_slot(sid: usize, slot: &Option<Rc<str>>) -> Symbol {
        match slot {
            Some(text) => Symbol::Text(text.clone()),
            None => Symbol::Unknown(sid),
        }
    }
}

impl From<&str> for Symbol {
    fn from(text: &str) -> Self {
        Symbol::Text(Rc::from(text))
    }
}

impl From<Rc<str>> for Symbol {
    fn from(text: Rc<str>) -> Self {
        Symbol::Text(text)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Text(text) => f.write_str(text),
            Symbol::Unknown(sid) => write!(f, "${sid}"),
        }
    }
}

/// Arbitrary precision decimal restricted to an `i128` coefficient.
///
/// `negative_zero` distinguishes `-0d0` from `0d0`; it is only meaningful
/// when `coefficient` is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Decimal {
    pub coefficient: i128,
    pub exponent: i64,
    pub negative_zero: bool,
}

impl Decimal {
    pub fn new(coefficient: i128, exponent: i64) -> Self {
        Self {
            coefficient,
            exponent,
            negative_zero: false,
        }
    }

    pub fn negative_zero(exponent: i64) -> Self {
        Self {
            coefficient: 0,
            exponent,
            negative_zero: true,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.coefficient == 0
    }

    pub fn is_negative(&self) -> bool {
        self.coefficient < 0 || (self.coefficient == 0 && self.negative_zero)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.coefficient == 0 && self.negative_zero {
            f.write_str("-")?;
        }
        write!(f, "{}d{}", self.coefficient, self.exponent)
    }
}

/// Timestamp precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Precision {
    Year,
    Month,
    Day,
    Minute,
    Second,
}

/// An Ion timestamp in local time plus offset.
///
/// `offset` is in minutes; `None` is the unknown offset (`-00:00`).
/// `fraction` holds fractional seconds as a decimal in `[0, 1)` and is only
/// present at [`Precision::Second`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub fraction: Option<Decimal>,
    pub offset: Option<i16>,
    pub precision: Precision,
}

impl Timestamp {
    pub fn year(year: u16) -> Self {
        Self {
            year,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
            fraction: None,
            offset: None,
            precision: Precision::Year,
        }
    }

    pub fn day(year: u16, month: u8, day: u8) -> Self {
        Self {
            month,
            day,
            precision: Precision::Day,
            ..Self::year(year)
        }
    }

    pub fn minute(year: u16, month: u8, day: u8, hour: u8, minute: u8, offset: Option<i16>) -> Self {
        Self {
            hour,
            minute,
            offset,
            precision: Precision::Minute,
            ..Self::day(year, month, day)
        }
    }

    pub fn with_second(mut self, second: u8, fraction: Option<Decimal>) -> Self {
        self.second = second;
        self.fraction = fraction;
        self.precision = Precision::Second;
        self
    }

    /// Checks field ranges after decoding.
    pub(crate) fn validate(self) -> IonResult<Self> {
        let bad = (self.precision >= Precision::Month && !(1..=12).contains(&self.month))
            || (self.precision >= Precision::Day && !(1..=31).contains(&self.day))
            || self.hour > 23
            || self.minute > 59
            || self.second > 59
            || self.offset.is_some_and(|o| o.abs() >= 24 * 60);
        if bad {
            return Err(IonError::MalformedData(format!(
                "timestamp field out of range: {self:?}"
            )));
        }
        if let Some(fraction) = self.fraction {
            if fraction.coefficient < 0 || (fraction.exponent > 0 && fraction.coefficient != 0) {
                return Err(IonError::MalformedData(
                    "timestamp fraction must be between 0 and 1".into(),
                ));
            }
        }
        Ok(self)
    }
}
