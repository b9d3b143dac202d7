//! Ion 1.1 timestamp bit layouts.
//!
//! Short forms (`0x80..=0x8C`) pack fields into a little-endian bit string:
//!
//! ```text
//! bits 0..7   year - 1970
//! bits 7..11  month
//! bits 11..16 day
//! bits 16..21 hour
//! bits 21..27 minute
//! 0x83..=0x87: bit 27 UTC flag, bits 28..34 second, fraction from bit 34
//! 0x88..=0x8C: bits 27..34 offset/15min + 56, bits 34..40 second,
//!              fraction from bit 40 (nanoseconds: 4 bytes after byte 5)
//! ```
//!
//! The long form (`0xF8`) uses a 14-bit year, a 12-bit offset in minutes
//! biased by 1440, and a FlexUInt scale plus FixedUInt coefficient for the
//! fraction.

use ion_buffers::flex;
use ion_buffers::Writer;

use crate::error::{malformed, IonError, IonResult};
use crate::types::{Decimal, Precision, Timestamp};

const YEAR_BIAS: u16 = 1970;
const SHORT_OFFSET_BIAS: i64 = 56;
const SHORT_OFFSET_UNKNOWN: u64 = 0x7F;
const LONG_OFFSET_BIAS: i64 = 1440;
const LONG_OFFSET_UNKNOWN: u64 = 0xFFF;

fn bits(data: u64, offset: u32, width: u32) -> u64 {
    (data >> offset) & ((1 << width) - 1)
}

fn le_word(bytes: &[u8]) -> u64 {
    let mut word = [0u8; 8];
    let n = bytes.len().min(8);
    word[..n].copy_from_slice(&bytes[..n]);
    u64::from_le_bytes(word)
}

fn short_offset(data: u64) -> Option<i16> {
    let raw = bits(data, 27, 7);
    if raw == SHORT_OFFSET_UNKNOWN {
        return None;
    }
    Some(((raw as i64 - SHORT_OFFSET_BIAS) * 15) as i16)
}

fn fraction(coefficient: u64, exponent: i64, max: u64) -> IonResult<Option<Decimal>> {
    if coefficient > max {
        return malformed("timestamp fraction must be between 0 and 1");
    }
    Ok(Some(Decimal::new(coefficient as i128, exponent)))
}

/// Decodes the body of a short-form timestamp with opcode `op`.
pub fn read_short(op: u8, body: &[u8]) -> IonResult<Timestamp> {
    let data = le_word(body);
    let year = bits(data, 0, 7) as u16 + YEAR_BIAS;
    let month = bits(data, 7, 4) as u8;
    let day = bits(data, 11, 5) as u8;
    let hour = bits(data, 16, 5) as u8;
    let minute = bits(data, 21, 6) as u8;
    let ts = match op {
        0x80 => Timestamp::year(year),
        0x81 => Timestamp {
            month,
            precision: Precision::Month,
            ..Timestamp::year(year)
        },
        0x82 => Timestamp::day(year, month, day),
        0x83..=0x87 => {
            let offset = if bits(data, 27, 1) == 1 { Some(0) } else { None };
            let base = Timestamp::minute(year, month, day, hour, minute, offset);
            if op == 0x83 {
                base
            } else {
                let second = bits(data, 28, 6) as u8;
                let frac = match op {
                    0x85 => fraction(bits(data, 34, 10), -3, 999)?,
                    0x86 => fraction(bits(data, 34, 20), -6, 999_999)?,
                    0x87 => fraction(bits(data, 34, 30), -9, 999_999_999)?,
                    _ => None,
                };
                base.with_second(second, frac)
            }
        }
        0x88..=0x8C => {
            let base = Timestamp::minute(year, month, day, hour, minute, short_offset(data));
            if op == 0x88 {
                base
            } else {
                let second = bits(data, 34, 6) as u8;
                let frac = match op {
                    0x8A => fraction(bits(data, 40, 10), -3, 999)?,
                    0x8B => fraction(bits(data, 40, 20), -6, 999_999)?,
                    0x8C => {
                        let nanos = le_word(body.get(5..9).unwrap_or_default()) & 0x3FFF_FFFF;
                        fraction(nanos, -9, 999_999_999)?
                    }
                    _ => None,
                };
                base.with_second(second, frac)
            }
        }
        _ => return malformed(format!("0x{op:02X} is not a short timestamp opcode")),
    };
    ts.validate()
}

/// Decodes the body of a long-form timestamp.
pub fn read_long(body: &[u8]) -> IonResult<Timestamp> {
    let data = le_word(body);
    let year = bits(data, 0, 14) as u16;
    let month = bits(data, 14, 4) as u8;
    let day = bits(data, 18, 5) as u8;
    let hour = bits(data, 23, 5) as u8;
    let minute = bits(data, 28, 6) as u8;
    let raw_offset = bits(data, 34, 12);
    let offset = if raw_offset == LONG_OFFSET_UNKNOWN {
        None
    } else {
        Some((raw_offset as i64 - LONG_OFFSET_BIAS) as i16)
    };
    let second = bits(data, 46, 6) as u8;
    let ts = match body.len() {
        2 => Timestamp::year(year),
        3 if day == 0 => Timestamp {
            month,
            precision: Precision::Month,
            ..Timestamp::year(year)
        },
        3 => Timestamp::day(year, month, day),
        6 => Timestamp::minute(year, month, day, hour, minute, offset),
        7 => Timestamp::minute(year, month, day, hour, minute, offset).with_second(second, None),
        n if n > 7 => {
            let (scale, scale_len) = flex::decode_flex_uint(&body[7..])?;
            let coefficient = flex::fixed_uint_from_le(&body[7 + scale_len..])?;
            let coefficient = i128::try_from(coefficient).map_err(|_| IonError::Overflow)?;
            let exponent = -(i64::try_from(scale).map_err(|_| IonError::Overflow)?);
            let frac = Decimal::new(coefficient, exponent);
            Timestamp::minute(year, month, day, hour, minute, offset).with_second(second, Some(frac))
        }
        n => return malformed(format!("invalid timestamp length {n}")),
    };
    ts.validate()
}

/// Offset in 15-minute steps for the short form, if representable.
fn short_offset_bits(offset: Option<i16>) -> Option<u64> {
    match offset {
        None => Some(SHORT_OFFSET_UNKNOWN),
        Some(o) if o % 15 == 0 && (-14 * 60..=14 * 60).contains(&o) => {
            Some((o as i64 / 15 + SHORT_OFFSET_BIAS) as u64)
        }
        Some(_) => None,
    }
}

fn date_bits(ts: &Timestamp) -> u64 {
    (ts.year - YEAR_BIAS) as u64
        | (ts.month as u64) << 7
        | (ts.day as u64) << 11
        | (ts.hour as u64) << 16
        | (ts.minute as u64) << 21
}

fn write_bits(writer: &mut Writer, op: u8, data: u64, len: usize) {
    writer.u8(op);
    writer.buf(&data.to_le_bytes()[..len]);
}

/// Writes `ts` in the short form when its fields fit, returning `false`
/// otherwise.
fn write_short(writer: &mut Writer, ts: &Timestamp) -> bool {
    if !(YEAR_BIAS..YEAR_BIAS + 128).contains(&ts.year) {
        return false;
    }
    let date = date_bits(ts);
    match ts.precision {
        Precision::Year => write_bits(writer, 0x80, date & 0x7F, 1),
        Precision::Month => write_bits(writer, 0x81, date & 0x7FF, 2),
        Precision::Day => write_bits(writer, 0x82, date, 2),
        Precision::Minute | Precision::Second => {
            let frac = match ts.fraction {
                None => None,
                Some(d)
                    if matches!(d.exponent, -3 | -6 | -9)
                        && (0..10i128.pow(d.exponent.unsigned_abs() as u32)).contains(&d.coefficient) =>
                {
                    Some((d.coefficient as u64, d.exponent))
                }
                Some(_) => return false,
            };
            let second = ts.second as u64;
            if matches!(ts.offset, None | Some(0)) {
                let utc = if ts.offset == Some(0) { 1u64 << 27 } else { 0 };
                let data = date | utc;
                match (ts.precision, frac) {
                    (Precision::Minute, _) => write_bits(writer, 0x83, data, 4),
                    (_, None) => write_bits(writer, 0x84, data | second << 28, 5),
                    (_, Some((c, -3))) => write_bits(writer, 0x85, data | second << 28 | c << 34, 6),
                    (_, Some((c, -6))) => write_bits(writer, 0x86, data | second << 28 | c << 34, 7),
                    (_, Some((c, _))) => write_bits(writer, 0x87, data | second << 28 | c << 34, 8),
                }
                return true;
            }
            let Some(offset) = short_offset_bits(ts.offset) else {
                return false;
            };
            let data = date | offset << 27;
            match (ts.precision, frac) {
                (Precision::Minute, _) => write_bits(writer, 0x88, data, 5),
                (_, None) => write_bits(writer, 0x89, data | second << 34, 5),
                (_, Some((c, -3))) => write_bits(writer, 0x8A, data | second << 34 | c << 40, 7),
                (_, Some((c, -6))) => write_bits(writer, 0x8B, data | second << 34 | c << 40, 8),
                (_, Some((c, _))) => {
                    write_bits(writer, 0x8C, data | second << 34, 5);
                    writer.buf(&(c as u32).to_le_bytes());
                }
            }
        }
    }
    true
}

fn write_long(writer: &mut Writer, ts: &Timestamp) {
    let offset = match ts.offset {
        None => LONG_OFFSET_UNKNOWN,
        Some(o) => (o as i64 + LONG_OFFSET_BIAS) as u64,
    };
    let data = ts.year as u64
        | (ts.month as u64) << 14
        | (ts.day as u64) << 18
        | (ts.hour as u64) << 23
        | (ts.minute as u64) << 28
        | offset << 34
        | (ts.second as u64) << 46;
    let mut body = Writer::with_alloc_size(32);
    match ts.precision {
        Precision::Year => body.buf(&(data & 0x3FFF).to_le_bytes()[..2]),
        Precision::Month => body.buf(&(data & !(0x1F << 18)).to_le_bytes()[..3]),
        Precision::Day => body.buf(&data.to_le_bytes()[..3]),
        Precision::Minute => body.buf(&data.to_le_bytes()[..6]),
        Precision::Second => {
            body.buf(&data.to_le_bytes()[..7]);
            if let Some(frac) = ts.fraction {
                body.flex_uint(frac.exponent.unsigned_abs());
                body.fixed_uint(frac.coefficient as u128);
            }
        }
    }
    let body = body.flush();
    writer.u8(0xF8);
    writer.flex_uint(body.len() as u64);
    writer.buf(&body);
}

/// Writes `ts` with its opcode, preferring the short form.
pub fn write(writer: &mut Writer, ts: &Timestamp) {
    if !write_short(writer, ts) {
        write_long(writer, ts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ion_buffers::Reader;

    fn encode(ts: &Timestamp) -> Vec<u8> {
        let mut writer = Writer::new();
        write(&mut writer, ts);
        writer.flush()
    }

    fn decode(bytes: &[u8]) -> Timestamp {
        if bytes[0] == 0xF8 {
            let mut reader = Reader::new(&bytes[1..]);
            let len = reader.flex_usize().unwrap();
            read_long(reader.try_buf(len).unwrap()).unwrap()
        } else {
            read_short(bytes[0], &bytes[1..]).unwrap()
        }
    }

    #[test]
    fn year_only() {
        let ts = Timestamp::year(2024);
        let bytes = encode(&ts);
        assert_eq!(bytes, [0x80, 54]);
        assert_eq!(decode(&bytes), ts);
    }

    #[test]
    fn short_forms_roundtrip() {
        let cases = [
            Timestamp::day(2000, 12, 31),
            Timestamp::minute(2024, 5, 6, 7, 8, Some(0)),
            Timestamp::minute(2024, 5, 6, 7, 8, None).with_second(9, None),
            Timestamp::minute(2024, 5, 6, 7, 8, Some(0)).with_second(9, Some(Decimal::new(123, -3))),
            Timestamp::minute(2024, 5, 6, 7, 8, Some(-300)).with_second(59, Some(Decimal::new(123_456, -6))),
            Timestamp::minute(2024, 5, 6, 7, 8, Some(330)).with_second(1, Some(Decimal::new(999_999_999, -9))),
            Timestamp::minute(2024, 5, 6, 23, 59, Some(-840)),
        ];
        for ts in cases {
            let bytes = encode(&ts);
            assert!(bytes[0] < 0x8D, "{ts:?} used {:02X}", bytes[0]);
            assert_eq!(decode(&bytes), ts);
        }
    }

    #[test]
    fn long_forms_roundtrip() {
        let cases = [
            Timestamp::year(1900),
            Timestamp {
                month: 7,
                precision: Precision::Month,
                ..Timestamp::year(2200)
            },
            Timestamp::day(1066, 10, 14),
            Timestamp::minute(2024, 1, 1, 0, 0, Some(7)),
            Timestamp::minute(2300, 1, 1, 0, 0, None).with_second(30, None),
            Timestamp::minute(2024, 1, 1, 0, 0, Some(-1)).with_second(1, Some(Decimal::new(5, -1))),
        ];
        for ts in cases {
            let bytes = encode(&ts);
            assert_eq!(bytes[0], 0xF8, "{ts:?}");
            assert_eq!(decode(&bytes), ts);
        }
    }

    #[test]
    fn fraction_out_of_range() {
        // 0x85 with millisecond bits all set (1023).
        let data: u64 = 54 | 1 << 7 | 1 << 11 | 0x3FF << 34;
        let bytes = data.to_le_bytes();
        assert!(read_short(0x85, &bytes[..6]).is_err());
    }
}
