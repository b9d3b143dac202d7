//! Ion 1.1 binary encoder.

use std::rc::Rc;

use ion_buffers::Writer;

use crate::address_map::AddressMap;
use crate::element::{Element, Value};
use crate::error::{usage, IonResult};
use crate::macros::SystemMacro;
use crate::options::{ContainerEncoding, SymbolEncoding, WriterOptions};
use crate::symbols::{system_symbol_1_1_address, SYSTEM_SYMBOLS_1_1};
use crate::types::{Decimal, IonType, Symbol, Version};

use super::opcode::{END, SYSTEM_MACRO, SYSTEM_SYMBOL};
use super::timestamp;

/// First symbol ID after the system symbols of the default module.
const FIRST_USER_SID: usize = SYSTEM_SYMBOLS_1_1.len() + 1;

/// Encodes [`Element`]s as an Ion 1.1 stream.
///
/// With [`SymbolEncoding::Interned`] a first pass collects every symbol
/// text that is not a system symbol and declares it with a single
/// `add_symbols` e-expression after the version marker.
pub struct IonEncoder {
    pub writer: Writer,
    options: WriterOptions,
    symbols: AddressMap<Rc<str>>,
}

impl Default for IonEncoder {
    fn default() -> Self {
        Self::new(WriterOptions::default())
    }
}

impl IonEncoder {
    pub fn new(options: WriterOptions) -> Self {
        Self {
            writer: Writer::new(),
            options,
            symbols: AddressMap::new(),
        }
    }

    pub fn encode(&mut self, values: &[Element]) -> IonResult<Vec<u8>> {
        self.writer.reset();
        self.symbols = AddressMap::new();
        self.writer.buf(&Version::V1_1.marker());
        if self.options.symbols == SymbolEncoding::Interned {
            for value in values {
                self.collect_symbols(value);
            }
            if !self.symbols.is_empty() {
                self.write_symbol_declaration();
            }
        }
        for value in values {
            self.write_any(value)?;
        }
        Ok(self.writer.flush())
    }

    fn collect_text(&mut self, symbol: &Symbol) {
        if let Symbol::Text(text) = symbol {
            if system_symbol_1_1_address(text).is_none() {
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

    /// `(:$ion::add_symbols "a" "b" ...)` with the arguments in one
    /// length-prefixed expression group.
    fn write_symbol_declaration(&mut self) {
        let mut group = Writer::new();
        for text in self.symbols.keys() {
            write_string(&mut group, text);
        }
        let group = group.flush();
        self.writer.u8(SYSTEM_MACRO);
        self.writer.u8(SystemMacro::AddSymbols.address() as u8);
        self.writer.u8(0b10);
        self.writer.flex_uint(group.len() as u64);
        self.writer.buf(&group);
    }

    fn sid(&self, text: &Rc<str>) -> Option<usize> {
        system_symbol_1_1_address(text)
            .or_else(|| self.symbols.get(text).map(|address| address + FIRST_USER_SID))
    }

    pub fn write_any(&mut self, value: &Element) -> IonResult<()> {
        if !value.annotations.is_empty() {
            self.write_annotations(&value.annotations)?;
        }
        match &value.value {
            Value::Null(ion_type) => self.write_null(*ion_type),
            Value::Bool(b) => self.writer.u8(if *b { 0x6E } else { 0x6F }),
            Value::Int(n) => self.write_int(*n),
            Value::Float(f) => self.write_float(*f),
            Value::Decimal(d) => self.write_decimal(d),
            Value::Timestamp(ts) => timestamp::write(&mut self.writer, ts),
            Value::String(s) => write_string(&mut self.writer, s),
            Value::Symbol(symbol) => self.write_symbol(symbol)?,
            Value::Blob(bytes) => self.write_lob(0xFE, bytes),
            Value::Clob(bytes) => self.write_lob(0xFF, bytes),
            Value::List(items) => self.write_seq(0xB0, 0xFB, 0xF1, items)?,
            Value::Sexp(items) => self.write_seq(0xC0, 0xFC, 0xF2, items)?,
            Value::Struct(fields) => self.write_struct(fields)?,
        }
        Ok(())
    }

    pub fn write_null(&mut self, ion_type: IonType) {
        match ion_type.typed_null_code() {
            None => self.writer.u8(0xEA),
            Some(code) => {
                self.writer.u8(0xEB);
                self.writer.u8(code);
            }
        }
    }

    pub fn write_int(&mut self, n: i128) {
        let len = ion_buffers::flex::fixed_int_len(n);
        if len <= 8 {
            self.writer.u8(0x60 | len as u8);
        } else {
            self.writer.u8(0xF6);
            self.writer.flex_uint(len as u64);
        }
        self.writer.fixed_int_sized(n, len);
    }

    pub fn write_float(&mut self, f: f64) {
        if f.to_bits() == 0 {
            self.writer.u8(0x6A);
        } else if !f.is_nan() && (f as f32) as f64 == f {
            self.writer.u8(0x6C);
            self.writer.f32_le(f as f32);
        } else {
            self.writer.u8(0x6D);
            self.writer.f64_le(f);
        }
    }

    /// Zero coefficients are written without coefficient bytes; a single
    /// zero byte marks negative zero.
    pub fn write_decimal(&mut self, d: &Decimal) {
        if d.coefficient == 0 && d.exponent == 0 && !d.negative_zero {
            self.writer.u8(0x70);
            return;
        }
        let mut body = Writer::new();
        body.flex_int(d.exponent);
        if d.coefficient != 0 {
            body.fixed_int(d.coefficient);
        } else if d.negative_zero {
            body.u8(0x00);
        }
        let body = body.flush();
        self.write_header(0x70, 0xF7, body.len());
        self.writer.buf(&body);
    }

    fn write_header(&mut self, short: u8, long: u8, len: usize) {
        if len <= 15 {
            self.writer.u8(short | len as u8);
        } else {
            self.writer.u8(long);
            self.writer.flex_uint(len as u64);
        }
    }

    pub fn write_symbol(&mut self, symbol: &Symbol) -> IonResult<()> {
        match symbol {
            Symbol::Unknown(0) => {
                self.writer.u8(SYSTEM_SYMBOL);
                self.writer.u8(0);
            }
            Symbol::Unknown(sid) => return usage(format!("symbol ${sid} has no text to write")),
            Symbol::Text(text) => match (self.options.symbols, self.sid(text)) {
                (SymbolEncoding::Interned, Some(sid)) => write_sid(&mut self.writer, sid),
                _ => {
                    self.write_header(0xA0, 0xFA, text.len());
                    self.writer.utf8(text);
                }
            },
        }
        Ok(())
    }

    fn write_lob(&mut self, op: u8, bytes: &[u8]) {
        self.writer.u8(op);
        self.writer.flex_uint(bytes.len() as u64);
        self.writer.buf(bytes);
    }

    fn write_annotations(&mut self, annotations: &[Symbol]) -> IonResult<()> {
        let sids: Option<Vec<usize>> = match self.options.symbols {
            SymbolEncoding::Interned => annotations
                .iter()
                .map(|a| match a {
                    Symbol::Text(text) => self.sid(text),
                    Symbol::Unknown(_) => None,
                })
                .collect(),
            SymbolEncoding::Inline => None,
        };
        let mut body = Writer::new();
        let base = match &sids {
            Some(sids) => {
                for sid in sids {
                    body.flex_uint(*sid as u64);
                }
                0xE4
            }
            None => {
                for annotation in annotations {
                    self.write_flex_sym(&mut body, annotation)?;
                }
                0xE7
            }
        };
        let body = body.flush();
        match annotations.len() {
            1 => self.writer.u8(base),
            2 => self.writer.u8(base + 1),
            _ => {
                self.writer.u8(base + 2);
                self.writer.flex_uint(body.len() as u64);
            }
        }
        self.writer.buf(&body);
        Ok(())
    }

    fn write_flex_sym(&self, out: &mut Writer, symbol: &Symbol) -> IonResult<()> {
        match symbol {
            Symbol::Unknown(0) => {
                out.flex_int(0);
                out.u8(0x60);
            }
            Symbol::Unknown(sid) => return usage(format!("symbol ${sid} has no text to write")),
            Symbol::Text(text) => match (self.options.symbols, self.sid(text)) {
                (SymbolEncoding::Interned, Some(sid)) => {
                    out.flex_int(sid as i64);
                }
                _ if text.is_empty() => {
                    // Empty text only has a system symbol form.
                    let address = system_symbol_1_1_address("").unwrap_or_default();
                    out.flex_int(0);
                    out.u8(0x60 + address as u8);
                }
                _ => {
                    out.flex_int(-(text.len() as i64));
                    out.utf8(text);
                }
            },
        }
        Ok(())
    }

    fn delimited(&self) -> bool {
        self.options.containers == ContainerEncoding::Delimited
    }

    fn write_seq(&mut self, short: u8, long: u8, open: u8, items: &[Element]) -> IonResult<()> {
        if self.delimited() {
            self.writer.u8(open);
            for item in items {
                self.write_any(item)?;
            }
            self.writer.u8(END);
            return Ok(());
        }
        let content = self.encode_nested(|encoder| {
            for item in items {
                encoder.write_any(item)?;
            }
            Ok(())
        })?;
        self.write_header(short, long, content.len());
        self.writer.buf(&content);
        Ok(())
    }

    fn write_struct(&mut self, fields: &[(Symbol, Element)]) -> IonResult<()> {
        if self.delimited() {
            self.writer.u8(0xF3);
            for (name, value) in fields {
                let mut out = Writer::new();
                self.write_flex_sym(&mut out, name)?;
                self.writer.buf(&out.flush());
                self.write_any(value)?;
            }
            self.writer.flex_int(0);
            self.writer.u8(END);
            return Ok(());
        }
        let sids: Option<Vec<usize>> = match self.options.symbols {
            SymbolEncoding::Interned => fields
                .iter()
                .map(|(name, _)| match name {
                    Symbol::Text(text) => self.sid(text),
                    Symbol::Unknown(_) => None,
                })
                .collect(),
            SymbolEncoding::Inline => None,
        };
        let content = self.encode_nested(|encoder| {
            match &sids {
                Some(sids) => {
                    for (sid, (_, value)) in sids.iter().zip(fields) {
                        encoder.writer.flex_uint(*sid as u64);
                        encoder.write_any(value)?;
                    }
                }
                None if fields.is_empty() => {}
                None => {
                    // SID 0 switches the struct to FlexSym field names.
                    encoder.writer.flex_uint(0);
                    for (name, value) in fields {
                        let mut out = Writer::new();
                        encoder.write_flex_sym(&mut out, name)?;
                        encoder.writer.buf(&out.flush());
                        encoder.write_any(value)?;
                    }
                }
            }
            Ok(())
        })?;
        if content.len() == 1 {
            // 0xD1 is reserved.
            self.writer.u8(0xFD);
            self.writer.flex_uint(1);
        } else {
            self.write_header(0xD0, 0xFD, content.len());
        }
        self.writer.buf(&content);
        Ok(())
    }

    /// Runs `f` against a fresh buffer sharing this encoder's symbols and
    /// returns what it wrote.
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

fn write_string(writer: &mut Writer, s: &str) {
    if s.len() <= 15 {
        writer.u8(0x90 | s.len() as u8);
    } else {
        writer.u8(0xF9);
        writer.flex_uint(s.len() as u64);
    }
    writer.utf8(s);
}

fn write_sid(writer: &mut Writer, sid: usize) {
    if sid < 256 {
        writer.u8(0xE1);
        writer.u8(sid as u8);
    } else if sid < 65792 {
        writer.u8(0xE2);
        writer.u16_le((sid - 256) as u16);
    } else {
        writer.u8(0xE3);
        writer.flex_uint((sid - 65792) as u64);
    }
}
