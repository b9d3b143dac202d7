//! Ion 1.0 binary encoder.
//!
//! Every symbol text is interned: a first pass collects field names,
//! annotations and symbol values into a local symbol table that is written
//! as a `$ion_symbol_table` struct right after the version marker.

use std::rc::Rc;

use ion_buffers::{var_uint_len, Writer};

use crate::address_map::AddressMap;
use crate::element::{Element, Value};
use crate::error::{usage, IonResult};
use crate::symbols::{SID_ION_SYMBOL_TABLE, SID_SYMBOLS, SYSTEM_SYMBOLS_1_0};
use crate::types::{Decimal, IonType, Precision, Symbol, Timestamp, Version};

use super::legacy::{self, NULL_LENGTH, VAR_LENGTH};

const FIRST_USER_SID: usize = SYSTEM_SYMBOLS_1_0.len() + 1;

/// Ion 1.0 binary encoder.
pub struct LegacyEncoder {
    pub writer: Writer,
    symbols: AddressMap<Rc<str>>,
}

impl Default for LegacyEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl LegacyEncoder {
    pub fn new() -> Self {
        Self {
            writer: Writer::new(),
            symbols: AddressMap::new(),
        }
    }

    pub fn encode(&mut self, values: &[Element]) -> IonResult<Vec<u8>> {
        self.writer.reset();
        self.symbols = AddressMap::new();

        for value in values {
            self.collect_symbols(value);
        }
        self.write_ivm();
        if !self.symbols.is_empty() {
            self.write_symbol_table();
        }
        for value in values {
            self.write_any(value)?;
        }
        Ok(self.writer.flush())
    }

    fn collect_text(&mut self, symbol: &Symbol) {
        if let Symbol::Text(text) = symbol {
            if system_sid(text).is_none() {
                self.symbols.get_or_assign(text.clone());
            }
        }
    }

    fn collect_symbols(&mut self, value: &Element) {
        for annotation in &value.annotations {
            self.collect_text(annotation);
        }
        match &value.value {
            Value::Symbol(symbol) => self.collect_text(symbol),
            Value::List(items) | Value::Sexp(items) => {
                for item in items {
                    self.collect_symbols(item);
                }
            }
            Value::Struct(fields) => {
                for (name, field) in fields {
                    self.collect_text(name);
                    self.collect_symbols(field);
                }
            }
            _ => {}
        }
    }

    fn write_ivm(&mut self) {
        self.writer.buf(&Version::V1_0.marker());
    }

    /// `$ion_symbol_table::{symbols: ["a", "b", ...]}`
    fn write_symbol_table(&mut self) {
        let mut list = Writer::new();
        for text in self.symbols.keys() {
            write_typed(&mut list, legacy::STRING, text.as_bytes());
        }
        let list = list.flush();

        let mut fields = Writer::new();
        fields.var_uint(SID_SYMBOLS as u64);
        write_typed(&mut fields, legacy::LIST, &list);
        let fields = fields.flush();

        let mut wrapped = Writer::new();
        wrapped.var_uint(var_uint_len(SID_ION_SYMBOL_TABLE as u64) as u64);
        wrapped.var_uint(SID_ION_SYMBOL_TABLE as u64);
        write_typed(&mut wrapped, legacy::STRUCT, &fields);
        let wrapped = wrapped.flush();

        write_typed(&mut self.writer, legacy::ANNOTATION, &wrapped);
    }

    fn sid(&self, symbol: &Symbol) -> IonResult<usize> {
        match symbol {
            Symbol::Unknown(0) => Ok(0),
            Symbol::Unknown(sid) => usage(format!("symbol ${sid} has no text to write")),
            Symbol::Text(text) => match system_sid(text) {
                Some(sid) => Ok(sid),
                None => match self.symbols.get(text) {
                    Some(address) => Ok(address + FIRST_USER_SID),
                    None => usage(format!("symbol {text:?} was not collected")),
                },
            },
        }
    }

    pub fn write_any(&mut self, value: &Element) -> IonResult<()> {
        if value.annotations.is_empty() {
            return self.write_value(&value.value);
        }
        let mut sids = Writer::new();
        for annotation in &value.annotations {
            sids.var_uint(self.sid(annotation)? as u64);
        }
        let sids = sids.flush();
        let body = self.encode_nested(|encoder| encoder.write_value(&value.value))?;
        let mut wrapped = Writer::new();
        wrapped.var_uint(sids.len() as u64);
        wrapped.buf(&sids);
        wrapped.buf(&body);
        write_typed(&mut self.writer, legacy::ANNOTATION, &wrapped.flush());
        Ok(())
    }

    fn write_value(&mut self, value: &Value) -> IonResult<()> {
        match value {
            Value::Null(ion_type) => self.write_null(*ion_type),
            Value::Bool(b) => self.writer.u8(legacy::BOOL << 4 | *b as u8),
            Value::Int(n) => self.write_int(*n),
            Value::Float(f) => self.write_float(*f),
            Value::Decimal(d) => {
                let mut body = Writer::new();
                write_decimal_body(&mut body, d);
                write_typed(&mut self.writer, legacy::DECIMAL, &body.flush());
            }
            Value::Timestamp(ts) => self.write_timestamp(ts),
            Value::String(s) => write_typed(&mut self.writer, legacy::STRING, s.as_bytes()),
            Value::Symbol(symbol) => {
                let sid = self.sid(symbol)?;
                let mut body = Writer::new();
                body.uint_be(sid as u128);
                write_typed(&mut self.writer, legacy::SYMBOL, &body.flush());
            }
            Value::Blob(bytes) => write_typed(&mut self.writer, legacy::BLOB, bytes),
            Value::Clob(bytes) => write_typed(&mut self.writer, legacy::CLOB, bytes),
            Value::List(items) => self.write_seq(legacy::LIST, items)?,
            Value::Sexp(items) => self.write_seq(legacy::SEXP, items)?,
            Value::Struct(fields) => self.write_struct(fields)?,
        }
        Ok(())
    }

    pub fn write_null(&mut self, ion_type: IonType) {
        let code = match ion_type {
            IonType::Null => legacy::NULL,
            IonType::Bool => legacy::BOOL,
            IonType::Int => legacy::POS_INT,
            IonType::Float => legacy::FLOAT,
            IonType::Decimal => legacy::DECIMAL,
            IonType::Timestamp => legacy::TIMESTAMP,
            IonType::Symbol => legacy::SYMBOL,
            IonType::String => legacy::STRING,
            IonType::Clob => legacy::CLOB,
            IonType::Blob => legacy::BLOB,
            IonType::List => legacy::LIST,
            IonType::Sexp => legacy::SEXP,
            IonType::Struct => legacy::STRUCT,
        };
        self.writer.u8(code << 4 | NULL_LENGTH);
    }

    pub fn write_int(&mut self, n: i128) {
        let code = if n < 0 { legacy::NEG_INT } else { legacy::POS_INT };
        let mut body = Writer::new();
        body.uint_be(n.unsigned_abs());
        write_typed(&mut self.writer, code, &body.flush());
    }

    pub fn write_float(&mut self, f: f64) {
        if f.to_bits() == 0 {
            self.writer.u8(legacy::FLOAT << 4);
            return;
        }
        self.writer.u8(legacy::FLOAT << 4 | 8);
        self.writer.f64_be(f);
    }

    /// Fields are written in UTC; the offset is written as is.
    fn write_timestamp(&mut self, ts: &Timestamp) {
        let mut body = Writer::new();
        let utc = match ts.offset {
            Some(offset) if ts.precision >= Precision::Minute => {
                body.var_int(offset as i64);
                legacy::shift_minutes(*ts, -(offset as i32))
            }
            _ => {
                // -0: unknown offset
                body.u8(0xC0);
                *ts
            }
        };
        body.var_uint(utc.year as u64);
        if utc.precision >= Precision::Month {
            body.var_uint(utc.month as u64);
        }
        if utc.precision >= Precision::Day {
            body.var_uint(utc.day as u64);
        }
        if utc.precision >= Precision::Minute {
            body.var_uint(utc.hour as u64);
            body.var_uint(utc.minute as u64);
        }
        if utc.precision >= Precision::Second {
            body.var_uint(utc.second as u64);
            if let Some(fraction) = &utc.fraction {
                write_decimal_body(&mut body, fraction);
            }
        }
        write_typed(&mut self.writer, legacy::TIMESTAMP, &body.flush());
    }

    fn write_seq(&mut self, code: u8, items: &[Element]) -> IonResult<()> {
        let content = self.encode_nested(|encoder| {
            for item in items {
                encoder.write_any(item)?;
            }
            Ok(())
        })?;
        write_typed(&mut self.writer, code, &content);
        Ok(())
    }

    fn write_struct(&mut self, fields: &[(Symbol, Element)]) -> IonResult<()> {
        let content = self.encode_nested(|encoder| {
            for (name, value) in fields {
                let sid = encoder.sid(name)?;
                encoder.writer.var_uint(sid as u64);
                encoder.write_any(value)?;
            }
            Ok(())
        })?;
        write_typed(&mut self.writer, legacy::STRUCT, &content);
        Ok(())
    }

    /// Encodes into a fresh buffer sharing this encoder's symbol table.
    ///
    /// Temporarily swaps writers so the closure targets a fresh buffer; the
    /// parent writer is restored afterwards.
    fn encode_nested<F>(&mut self, f: F) -> IonResult<Vec<u8>>
    where
        F: FnOnce(&mut Self) -> IonResult<()>,
    {
        let mut tmp_writer = Writer::new();
        std::mem::swap(&mut self.writer, &mut tmp_writer);
        let result = f(self);
        std::mem::swap(&mut self.writer, &mut tmp_writer);
        result?;
        Ok(tmp_writer.flush())
    }
}

fn system_sid(text: &str) -> Option<usize> {
    SYSTEM_SYMBOLS_1_0
        .iter()
        .position(|s| *s == text)
        .map(|i| i + 1)
}

/// Exponent VarInt followed by the sign-magnitude coefficient. Positive
/// zero with a zero exponent is the empty body.
fn write_decimal_body(out: &mut Writer, d: &Decimal) {
    if d.coefficient == 0 && d.exponent == 0 && !d.negative_zero {
        return;
    }
    out.var_int(d.exponent);
    out.int_be(d.coefficient, d.negative_zero);
}

/// Writes a type descriptor for a body of `body.len()` bytes, then the body.
fn write_typed(writer: &mut Writer, code: u8, body: &[u8]) {
    let len = body.len();
    if len < VAR_LENGTH as usize {
        writer.u8(code << 4 | len as u8);
    } else {
        writer.u8(code << 4 | VAR_LENGTH);
        writer.var_uint(len as u64);
    }
    writer.buf(body);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(values: &[Element]) -> Vec<u8> {
        LegacyEncoder::new().encode(values).unwrap()
    }

    #[test]
    fn scalars() {
        assert_eq!(
            encode(&[Element::int(0), Element::int(-7), Element::bool(true), Element::null()]),
            [0xE0, 0x01, 0x00, 0xEA, 0x20, 0x31, 0x07, 0x11, 0x0F]
        );
    }

    #[test]
    fn long_strings_use_var_length() {
        let text = "abcdefghijklmnop";
        let data = encode(&[Element::string(text)]);
        assert_eq!(&data[4..6], [0x8E, 0x90]);
        assert_eq!(&data[6..], text.as_bytes());
    }

    #[test]
    fn local_symbols_table_precedes_values() {
        let data = encode(&[Element::symbol("foo"), Element::symbol("name")]);
        assert_eq!(
            &data[4..],
            [
                0xE9, 0x81, 0x83, // $ion_symbol_table::
                0xD6, 0x87, // {symbols:
                0xB4, 0x83, b'f', b'o', b'o', // ["foo"]}
                0x71, 0x0A, // foo
                0x71, 0x04, // name
            ]
        );
    }

    #[test]
    fn timestamps_are_written_in_utc() {
        let ts = Timestamp::minute(2024, 1, 1, 0, 30, Some(60));
        let data = encode(&[Element {
            annotations: vec![],
            value: Value::Timestamp(ts),
        }]);
        // offset +60, 2023-12-31T23:30Z
        assert_eq!(
            &data[4..],
            [0x67, 0xBC, 0x0F, 0xE7, 0x8C, 0x9F, 0x97, 0x9E]
        );
    }
}
