//! Ion 1.0 type descriptors and value bodies.
//!
//! Every 1.0 value starts with a one-byte descriptor `T << 4 | L`. `L == 14`
//! means a VarUInt length follows, `L == 15` is the typed null of `T`. The
//! descriptor never needs the body to be decoded, so the tokenizer can frame
//! a value and decode it later.

use ion_buffers::Reader;

use crate::error::{malformed, unimplemented, IonResult};
use crate::types::{Decimal, IonType, Precision, Timestamp, Token};

pub const NULL: u8 = 0x0;
pub const BOOL: u8 = 0x1;
pub const POS_INT: u8 = 0x2;
pub const NEG_INT: u8 = 0x3;
pub const FLOAT: u8 = 0x4;
pub const DECIMAL: u8 = 0x5;
pub const TIMESTAMP: u8 = 0x6;
pub const SYMBOL: u8 = 0x7;
pub const STRING: u8 = 0x8;
pub const CLOB: u8 = 0x9;
pub const BLOB: u8 = 0xA;
pub const LIST: u8 = 0xB;
pub const SEXP: u8 = 0xC;
pub const STRUCT: u8 = 0xD;
pub const ANNOTATION: u8 = 0xE;

/// Low nibble marking a VarUInt length.
pub const VAR_LENGTH: u8 = 14;
/// Low nibble of a typed null.
pub const NULL_LENGTH: u8 = 15;

/// The framing of one 1.0 value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    /// `None` for NOP padding.
    pub token: Option<Token>,
    pub op: u8,
    /// Body bounds. For an annotation wrapper these are the bounds of the
    /// annotation symbol IDs.
    pub start: usize,
    pub end: usize,
    /// End of the annotation wrapper, which must hold exactly one value.
    pub wrapper_end: Option<usize>,
}

fn token_of(type_code: u8) -> Option<Token> {
    Some(match type_code {
        NULL => Token::Null,
        BOOL => Token::Bool,
        POS_INT | NEG_INT => Token::Int,
        FLOAT => Token::Float,
        DECIMAL => Token::Decimal,
        TIMESTAMP => Token::Timestamp,
        SYMBOL => Token::Symbol,
        STRING => Token::String,
        CLOB => Token::Clob,
        BLOB => Token::Blob,
        LIST => Token::List,
        SEXP => Token::Sexp,
        STRUCT => Token::Struct,
        _ => return None,
    })
}

/// Reads the descriptor at `at`. `limit` is the end of the enclosing
/// container.
pub fn descriptor(data: &[u8], at: usize, limit: usize) -> IonResult<Descriptor> {
    let mut reader = Reader::from_slice(data, at, limit);
    let op = reader.try_u8()?;
    let type_code = op >> 4;
    let low = op & 0x0F;
    let framed = |token: Option<Token>, start: usize, len: usize| -> IonResult<Descriptor> {
        let end = start + len;
        if end > limit {
            return malformed(format!(
                "value at {at} overruns its container ({end} > {limit})"
            ));
        }
        Ok(Descriptor {
            token,
            op,
            start,
            end,
            wrapper_end: None,
        })
    };
    match type_code {
        NULL if low == NULL_LENGTH => framed(Some(Token::Null), reader.x, 0),
        NULL => {
            let len = if low == VAR_LENGTH {
                reader.var_uint()? as usize
            } else {
                low as usize
            };
            framed(None, reader.x, len)
        }
        BOOL => match low {
            0 | 1 => framed(Some(Token::Bool), reader.x, 0),
            NULL_LENGTH => framed(Some(Token::Null), reader.x, 0),
            _ => malformed(format!("invalid bool length {low}")),
        },
        ANNOTATION if op == 0xE0 => {
            let marker = reader.try_buf(3)?;
            if marker[2] != 0xEA {
                return malformed("invalid version marker");
            }
            framed(Some(Token::VersionMarker), at + 1, 3)
        }
        ANNOTATION => {
            let len = match low {
                NULL_LENGTH => return malformed("annotation wrappers cannot be null"),
                VAR_LENGTH => reader.var_uint()? as usize,
                low if low < 3 => {
                    return malformed(format!("annotation wrapper of length {low} is too short"))
                }
                low => low as usize,
            };
            let wrapper_end = reader.x + len;
            if wrapper_end > limit {
                return malformed("annotation wrapper overruns its container");
            }
            let mut inner = Reader::from_slice(data, reader.x, wrapper_end);
            let sids_len = inner.var_uint()? as usize;
            if sids_len == 0 {
                return malformed("annotation wrapper has no annotations");
            }
            let start = inner.x;
            let end = start + sids_len;
            if end >= wrapper_end {
                return malformed("annotation wrapper has no value");
            }
            Ok(Descriptor {
                token: Some(Token::Annotations),
                op,
                start,
                end,
                wrapper_end: Some(wrapper_end),
            })
        }
        0xF => malformed(format!("reserved type descriptor {op:#04x}")),
        _ if low == NULL_LENGTH => framed(Some(Token::Null), reader.x, 0),
        STRUCT if low == 1 => {
            let len = reader.var_uint()? as usize;
            if len == 0 {
                return malformed("sorted struct cannot be empty");
            }
            framed(token_of(STRUCT), reader.x, len)
        }
        _ => {
            let len = if low == VAR_LENGTH {
                reader.var_uint()? as usize
            } else {
                low as usize
            };
            framed(token_of(type_code), reader.x, len)
        }
    }
}

pub fn null_type(op: u8) -> IonResult<IonType> {
    Ok(match op >> 4 {
        NULL => IonType::Null,
        BOOL => IonType::Bool,
        POS_INT | NEG_INT => IonType::Int,
        FLOAT => IonType::Float,
        DECIMAL => IonType::Decimal,
        TIMESTAMP => IonType::Timestamp,
        SYMBOL => IonType::Symbol,
        STRING => IonType::String,
        CLOB => IonType::Clob,
        BLOB => IonType::Blob,
        LIST => IonType::List,
        SEXP => IonType::Sexp,
        STRUCT => IonType::Struct,
        _ => return malformed(format!("{op:#04x} is not a null")),
    })
}

pub fn read_bool(op: u8) -> bool {
    op & 0x0F == 1
}

fn magnitude(body: &[u8]) -> IonResult<i128> {
    if body.len() > 16 {
        return unimplemented(format!("{}-byte integers", body.len()));
    }
    let value = Reader::new(body).uint_be(body.len())?;
    match i128::try_from(value) {
        Ok(v) => Ok(v),
        Err(_) => unimplemented("integers wider than i128"),
    }
}

pub fn read_int(op: u8, body: &[u8]) -> IonResult<i128> {
    let value = magnitude(body)?;
    if op >> 4 == NEG_INT {
        if value == 0 {
            return malformed("negative zero int is illegal");
        }
        return Ok(-value);
    }
    Ok(value)
}

pub fn read_sid(body: &[u8]) -> IonResult<usize> {
    let value = magnitude(body)?;
    usize::try_from(value).map_err(|_| crate::IonError::Overflow)
}

pub fn read_float(body: &[u8]) -> IonResult<f64> {
    match body.len() {
        0 => Ok(0.0),
        4 => {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(body);
            Ok(f32::from_be_bytes(bytes) as f64)
        }
        8 => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(body);
            Ok(f64::from_be_bytes(bytes))
        }
        len => malformed(format!("unsupported float length {len}")),
    }
}

fn decimal_at(reader: &mut Reader<'_>) -> IonResult<Decimal> {
    let (exponent, _) = reader.var_int()?;
    let len = reader.end - reader.x;
    if len == 0 {
        return Ok(Decimal::new(0, exponent));
    }
    if len > 16 {
        return unimplemented(format!("{len}-byte decimal coefficients"));
    }
    let (coefficient, negative_zero) = reader.int_be(len)?;
    if negative_zero {
        return Ok(Decimal::negative_zero(exponent));
    }
    Ok(Decimal::new(coefficient, exponent))
}

pub fn read_decimal(body: &[u8]) -> IonResult<Decimal> {
    if body.is_empty() {
        return Ok(Decimal::new(0, 0));
    }
    decimal_at(&mut Reader::new(body))
}

fn narrow<T: TryFrom<u64>>(value: u64, what: &str) -> IonResult<T> {
    match T::try_from(value) {
        Ok(v) => Ok(v),
        Err(_) => malformed(format!("timestamp {what} out of range: {value}")),
    }
}

/// Decodes a 1.0 timestamp. The encoded fields are UTC; the result is in
/// local time at the encoded offset.
pub fn read_timestamp(body: &[u8]) -> IonResult<Timestamp> {
    let mut reader = Reader::new(body);
    let (offset, unknown_offset) = reader.var_int()?;
    let offset = if unknown_offset {
        None
    } else {
        Some(i16::try_from(offset).map_err(|_| crate::IonError::Overflow)?)
    };
    let mut ts = Timestamp::year(narrow(reader.var_uint()?, "year")?);
    if !reader.is_empty() {
        ts.month = narrow(reader.var_uint()?, "month")?;
        ts.precision = Precision::Month;
    }
    if !reader.is_empty() {
        ts.day = narrow(reader.var_uint()?, "day")?;
        ts.precision = Precision::Day;
    }
    if !reader.is_empty() {
        ts.hour = narrow(reader.var_uint()?, "hour")?;
        if reader.is_empty() {
            return malformed("timestamp has an hour but no minute");
        }
        ts.minute = narrow(reader.var_uint()?, "minute")?;
        ts.precision = Precision::Minute;
        ts.offset = offset;
    }
    if !reader.is_empty() {
        ts.second = narrow(reader.var_uint()?, "second")?;
        ts.precision = Precision::Second;
    }
    if !reader.is_empty() {
        let fraction = decimal_at(&mut reader)?;
        if fraction.coefficient != 0 || fraction.exponent != 0 {
            ts.fraction = Some(fraction);
        }
    }
    let ts = ts.validate()?;
    match ts.offset {
        Some(minutes) if ts.precision >= Precision::Minute => Ok(shift_minutes(ts, minutes as i32)),
        _ => Ok(ts),
    }
}

fn is_leap(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        2 if is_leap(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Moves the wall-clock fields of `ts` by `delta` minutes, carrying into
/// the date. Offsets are bounded by a day, so at most one day is crossed.
pub fn shift_minutes(mut ts: Timestamp, delta: i32) -> Timestamp {
    let total = ts.hour as i32 * 60 + ts.minute as i32 + delta;
    let day_shift = total.div_euclid(24 * 60);
    let in_day = total.rem_euclid(24 * 60);
    ts.hour = (in_day / 60) as u8;
    ts.minute = (in_day % 60) as u8;
    if day_shift > 0 {
        if ts.day >= days_in_month(ts.year, ts.month) {
            ts.day = 1;
            if ts.month == 12 {
                ts.month = 1;
                ts.year += 1;
            } else {
                ts.month += 1;
            }
        } else {
            ts.day += 1;
        }
    } else if day_shift < 0 {
        if ts.day <= 1 {
            if ts.month == 1 {
                ts.month = 12;
                ts.year = ts.year.saturating_sub(1);
            } else {
                ts.month -= 1;
            }
            ts.day = days_in_month(ts.year, ts.month);
        } else {
            ts.day -= 1;
        }
    }
    ts
}
