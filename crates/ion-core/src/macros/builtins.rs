//! Native implementations of the system macros that are not templates.
//!
//! Every function receives one `Vec<Element>` per parameter, in signature
//! order, holding the values the argument expanded to.

use std::rc::Rc;

use crate::element::{read_all, Element, Value};
use crate::error::{malformed, unimplemented, IonError, IonResult};
use crate::reader::IonReader;
use crate::types::{Decimal, Precision, Symbol, Timestamp};

fn arg(args: &[Vec<Element>], index: usize) -> &[Element] {
    args.get(index).map(Vec::as_slice).unwrap_or_default()
}

fn single<'a>(args: &'a [Vec<Element>], index: usize, what: &str) -> IonResult<&'a Element> {
    match arg(args, index) {
        [value] => Ok(value),
        values => malformed(format!("{what} expects one value, found {}", values.len())),
    }
}

fn optional<'a>(args: &'a [Vec<Element>], index: usize, what: &str) -> IonResult<Option<&'a Element>> {
    match arg(args, index) {
        [] => Ok(None),
        [value] => Ok(Some(value)),
        values => malformed(format!("{what} expects at most one value, found {}", values.len())),
    }
}

fn int(value: &Element, what: &str) -> IonResult<i128> {
    match value.value {
        Value::Int(i) => Ok(i),
        _ => malformed(format!("{what} must be an int, found {}", value.ion_type())),
    }
}

fn text<'a>(value: &'a Element, what: &str) -> IonResult<&'a str> {
    match &value.value {
        Value::String(s) => Ok(s),
        Value::Symbol(Symbol::Text(s)) => Ok(s),
        Value::Symbol(Symbol::Unknown(sid)) => Err(IonError::UnknownSymbolText(*sid)),
        _ => malformed(format!("{what} must be text, found {}", value.ion_type())),
    }
}

fn concat_text(values: &[Element], what: &str) -> IonResult<String> {
    let mut out = String::new();
    for value in values {
        out.push_str(text(value, what)?);
    }
    Ok(out)
}

/// Upper bound on the values a single `repeat` may produce.
pub const MAX_REPEATED_VALUES: usize = 1 << 20;

pub fn none(_args: Vec<Vec<Element>>) -> IonResult<Vec<Element>> {
    Ok(Vec::new())
}

pub fn default(mut args: Vec<Vec<Element>>) -> IonResult<Vec<Element>> {
    let fallback = args.pop().unwrap_or_default();
    let expr = args.pop().unwrap_or_default();
    Ok(if expr.is_empty() { fallback } else { expr })
}

pub fn repeat(args: Vec<Vec<Element>>) -> IonResult<Vec<Element>> {
    let n = int(single(&args, 0, "repeat count")?, "repeat count")?;
    let Ok(n) = usize::try_from(n) else {
        return malformed(format!("repeat count must not be negative: {n}"));
    };
    let values = arg(&args, 1);
    if values.is_empty() {
        return Ok(Vec::new());
    }
    match n.checked_mul(values.len()) {
        Some(total) if total <= MAX_REPEATED_VALUES => {}
        _ => {
            return unimplemented(format!(
                "repeat of {} values {n} times exceeds {MAX_REPEATED_VALUES} values",
                values.len()
            ))
        }
    }
    let mut out = Vec::new();
    for _ in 0..n {
        out.extend_from_slice(values);
    }
    Ok(out)
}

pub fn flatten(args: Vec<Vec<Element>>) -> IonResult<Vec<Element>> {
    let mut out = Vec::new();
    for value in args.into_iter().flatten() {
        match value.value {
            Value::List(items) | Value::Sexp(items) => out.extend(items),
            other => {
                return malformed(format!("flatten expects sequences, found {}", other.ion_type()))
            }
        }
    }
    Ok(out)
}

pub fn delta(args: Vec<Vec<Element>>) -> IonResult<Vec<Element>> {
    let mut total: i128 = 0;
    let mut out = Vec::new();
    for value in arg(&args, 0) {
        total = total.checked_add(int(value, "delta")?).ok_or(IonError::Overflow)?;
        out.push(Element::int(total));
    }
    Ok(out)
}

pub fn sum(args: Vec<Vec<Element>>) -> IonResult<Vec<Element>> {
    let a = int(single(&args, 0, "sum")?, "sum operand")?;
    let b = int(single(&args, 1, "sum")?, "sum operand")?;
    Ok(vec![Element::int(a.checked_add(b).ok_or(IonError::Overflow)?)])
}

pub fn annotate(args: Vec<Vec<Element>>) -> IonResult<Vec<Element>> {
    let mut annotations = Vec::new();
    for value in arg(&args, 0) {
        annotations.push(match &value.value {
            Value::Symbol(symbol) => symbol.clone(),
            Value::String(s) => Symbol::from(s.as_str()),
            _ => return malformed(format!("annotations must be text, found {}", value.ion_type())),
        });
    }
    let mut value = single(&args, 1, "annotate")?.clone();
    annotations.append(&mut value.annotations);
    value.annotations = annotations;
    Ok(vec![value])
}

pub fn make_string(args: Vec<Vec<Element>>) -> IonResult<Vec<Element>> {
    let text = concat_text(arg(&args, 0), "make_string argument")?;
    Ok(vec![Value::String(text).into()])
}

pub fn make_symbol(args: Vec<Vec<Element>>) -> IonResult<Vec<Element>> {
    let text = concat_text(arg(&args, 0), "make_symbol argument")?;
    Ok(vec![Value::Symbol(Symbol::Text(Rc::from(text))).into()])
}

pub fn make_decimal(args: Vec<Vec<Element>>) -> IonResult<Vec<Element>> {
    let coefficient = int(single(&args, 0, "make_decimal")?, "coefficient")?;
    let exponent = int(single(&args, 1, "make_decimal")?, "exponent")?;
    let exponent = i64::try_from(exponent).map_err(|_| IonError::Overflow)?;
    Ok(vec![Value::Decimal(Decimal::new(coefficient, exponent)).into()])
}

fn field<T: TryFrom<i128>>(value: Option<&Element>, what: &str) -> IonResult<Option<T>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let i = int(value, what)?;
    match T::try_from(i) {
        Ok(v) => Ok(Some(v)),
        Err(_) => malformed(format!("{what} out of range: {i}")),
    }
}

/// Splits seconds given as an int or a decimal into whole seconds and a
/// fraction.
fn seconds(value: &Element) -> IonResult<(u8, Option<Decimal>)> {
    let (whole, fraction) = match value.value {
        Value::Int(i) => (i, None),
        Value::Decimal(d) if d.coefficient >= 0 && d.exponent >= 0 => {
            let scale = 10i128.checked_pow(d.exponent as u32).ok_or(IonError::Overflow)?;
            (d.coefficient.checked_mul(scale).ok_or(IonError::Overflow)?, None)
        }
        Value::Decimal(d) if d.coefficient >= 0 => {
            let scale = u32::try_from(-d.exponent)
                .ok()
                .and_then(|e| 10i128.checked_pow(e))
                .ok_or(IonError::Overflow)?;
            (
                d.coefficient / scale,
                Some(Decimal::new(d.coefficient % scale, d.exponent)),
            )
        }
        _ => return malformed(format!("second must be an int or a non-negative decimal, found {value:?}")),
    };
    match u8::try_from(whole) {
        Ok(s) => Ok((s, fraction)),
        Err(_) => malformed(format!("second out of range: {whole}")),
    }
}

pub fn make_timestamp(args: Vec<Vec<Element>>) -> IonResult<Vec<Element>> {
    let year: u16 = match field(Some(single(&args, 0, "make_timestamp")?), "year")? {
        Some(y) => y,
        None => return malformed("make_timestamp requires a year"),
    };
    let month: Option<u8> = field(optional(&args, 1, "month")?, "month")?;
    let day: Option<u8> = field(optional(&args, 2, "day")?, "day")?;
    let hour: Option<u8> = field(optional(&args, 3, "hour")?, "hour")?;
    let minute: Option<u8> = field(optional(&args, 4, "minute")?, "minute")?;
    let second = optional(&args, 5, "second")?;
    let offset: Option<i16> = field(optional(&args, 6, "offset_minutes")?, "offset_minutes")?;

    let mut ts = Timestamp::year(year);
    if let Some(month) = month {
        ts.month = month;
        ts.precision = Precision::Month;
    }
    match (month, day) {
        (None, Some(_)) => return malformed("make_timestamp: day requires month"),
        (Some(_), Some(day)) => {
            ts.day = day;
            ts.precision = Precision::Day;
        }
        _ => {}
    }
    match (day, hour, minute) {
        (_, None, None) => {}
        (Some(day), Some(hour), Some(minute)) => {
            ts = Timestamp::minute(year, ts.month, day, hour, minute, offset);
        }
        _ => return malformed("make_timestamp: hour and minute must be given together, after day"),
    }
    if let Some(second) = second {
        if hour.is_none() {
            return malformed("make_timestamp: second requires hour and minute");
        }
        let (whole, fraction) = seconds(second)?;
        ts = ts.with_second(whole, fraction);
    } else if hour.is_none() && offset.is_some() {
        return malformed("make_timestamp: offset requires a time of day");
    }
    Ok(vec![Value::Timestamp(ts.validate()?).into()])
}

pub fn make_blob(args: Vec<Vec<Element>>) -> IonResult<Vec<Element>> {
    let mut bytes = Vec::new();
    for value in arg(&args, 0) {
        match &value.value {
            Value::Blob(b) | Value::Clob(b) => bytes.extend_from_slice(b),
            _ => return malformed(format!("make_blob expects lobs, found {}", value.ion_type())),
        }
    }
    Ok(vec![Value::Blob(bytes).into()])
}

pub fn make_field(args: Vec<Vec<Element>>) -> IonResult<Vec<Element>> {
    let name = match &single(&args, 0, "make_field")?.value {
        Value::Symbol(symbol) => symbol.clone(),
        Value::String(s) => Symbol::from(s.as_str()),
        other => return malformed(format!("field name must be text, found {}", other.ion_type())),
    };
    let value = single(&args, 1, "make_field")?.clone();
    Ok(vec![Value::Struct(vec![(name, value)]).into()])
}

pub fn make_struct(args: Vec<Vec<Element>>) -> IonResult<Vec<Element>> {
    let mut fields = Vec::new();
    for value in args.into_iter().flatten() {
        match value.value {
            Value::Struct(f) => fields.extend(f),
            other => {
                return malformed(format!("make_struct expects structs, found {}", other.ion_type()))
            }
        }
    }
    Ok(vec![Value::Struct(fields).into()])
}

/// Decodes binary Ion held in blobs and clobs. Each argument is a complete
/// stream with its own encoding context.
pub fn parse_ion(args: Vec<Vec<Element>>) -> IonResult<Vec<Element>> {
    let mut out = Vec::new();
    for value in arg(&args, 0) {
        let bytes = match &value.value {
            Value::Blob(b) | Value::Clob(b) => b,
            Value::String(_) => return unimplemented("parse_ion of Ion text"),
            _ => return malformed(format!("parse_ion expects lobs, found {}", value.ion_type())),
        };
        if bytes.first() != Some(&0xE0) {
            return unimplemented("parse_ion of Ion text");
        }
        let mut reader = IonReader::new(bytes);
        out.extend(read_all(&mut reader)?);
    }
    Ok(out)
}
