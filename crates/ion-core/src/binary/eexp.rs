//! E-expression framing and the scans that walk Ion 1.1 values without
//! decoding them.
//!
//! Delimited containers and unprefixed e-expressions carry no length, so
//! skipping one means walking every child. Walking an e-expression needs the
//! invoked macro's signature, which is why the scanner holds the tables.

use std::rc::Rc;

use ion_buffers::Reader;

use crate::context::Tables;
use crate::element::Element;
use crate::error::{malformed, unimplemented, IonResult};
use crate::macros::{Arg, Encoding, Macro};
use crate::symbols::system_symbol_1_1;
use crate::types::{Symbol, Token};

use super::opcode::{self, Length};

/// Nesting accepted by the scanner before it gives up.
const MAX_SCAN_DEPTH: usize = 512;

/// A decoded FlexSym.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexSym<'a> {
    Sid(usize),
    Text(&'a str),
    /// Address in the Ion 1.1 system symbol table.
    System(usize),
    /// The end marker of a delimited struct.
    End,
}

/// Reads the FlexSym at `at`, returning it and the position after it.
pub fn read_flex_sym(data: &[u8], at: usize, limit: usize) -> IonResult<(FlexSym<'_>, usize)> {
    let mut reader = Reader::from_slice(data, at, limit);
    let value = reader.flex_int()?;
    let sym = match value {
        v if v > 0 => FlexSym::Sid(v as usize),
        v if v < 0 => FlexSym::Text(reader.try_utf8(v.unsigned_abs() as usize)?),
        _ => match reader.try_u8()? {
            opcode::END => FlexSym::End,
            b @ 0x60..=0xDF => FlexSym::System((b - 0x60) as usize),
            b => return malformed(format!("invalid FlexSym escape {b:#04x}")),
        },
    };
    Ok((sym, reader.x))
}

/// Resolves a FlexSym against `tables`.
pub fn flex_sym_symbol(sym: FlexSym<'_>, tables: &Tables) -> IonResult<Symbol> {
    match sym {
        FlexSym::Sid(sid) => tables.symbol(sid),
        FlexSym::Text(text) => Ok(Symbol::from(text)),
        FlexSym::System(0) => Ok(Symbol::Unknown(0)),
        FlexSym::System(address) => match system_symbol_1_1(address) {
            Some(text) => Ok(Symbol::from(text)),
            None => malformed(format!("system symbol {address} out of range")),
        },
        FlexSym::End => malformed("unexpected end marker in place of a symbol"),
    }
}

/// The address part of an e-expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation {
    /// The address refers to the system module.
    pub system: bool,
    pub address: usize,
    /// First byte of the arguments.
    pub start: usize,
    /// End of the arguments when the e-expression is length-prefixed.
    pub end: Option<usize>,
}

/// Decodes the macro address of the e-expression whose opcode is at `at`.
pub fn invocation(data: &[u8], at: usize, limit: usize) -> IonResult<Invocation> {
    let mut reader = Reader::from_slice(data, at, limit);
    let op = reader.try_u8()?;
    let high = (op & 0x0F) as usize;
    let (system, address, end) = match op {
        0x00..=0x3F => (false, op as usize, None),
        0x40..=0x4F => (false, high * 256 + reader.try_u8()? as usize + 64, None),
        0x50..=0x5F => (false, high * 65536 + reader.try_u16_le()? as usize + 4160, None),
        opcode::SYSTEM_MACRO => (true, reader.try_u8()? as usize, None),
        opcode::EEXP_FLEX_ADDRESS => (false, reader.flex_usize()?, None),
        opcode::EEXP_PREFIXED => {
            let address = reader.flex_usize()?;
            let len = reader.flex_usize()?;
            (false, address, Some(reader.x + len))
        }
        _ => return malformed(format!("{op:#04x} is not an e-expression")),
    };
    if end.is_some_and(|end| end > limit) {
        return malformed("e-expression overruns its container");
    }
    Ok(Invocation {
        system,
        address,
        start: reader.x,
        end,
    })
}

/// Walks Ion 1.1 data using the macro definitions of one table snapshot.
pub struct Scanner<'a, 't> {
    data: &'a [u8],
    tables: &'t Rc<Tables>,
}

impl<'a, 't> Scanner<'a, 't> {
    pub fn new(data: &'a [u8], tables: &'t Rc<Tables>) -> Self {
        Self { data, tables }
    }

    pub fn resolve(&self, invocation: &Invocation) -> IonResult<Rc<Macro>> {
        if invocation.system {
            self.tables.system_macro(invocation.address)
        } else {
            self.tables.macro_at(invocation.address)
        }
    }

    fn byte(&self, at: usize, limit: usize) -> IonResult<u8> {
        if at >= limit {
            return malformed(format!("unexpected end of data at {at}"));
        }
        Ok(self.data[at])
    }

    /// End of the annotation sequence whose opcode is at `at`.
    pub fn annotations_end(&self, at: usize, limit: usize) -> IonResult<usize> {
        let mut reader = Reader::from_slice(self.data, at, limit);
        let op = reader.try_u8()?;
        match op {
            0xE4 => {
                reader.flex_uint()?;
            }
            0xE5 => {
                reader.flex_uint()?;
                reader.flex_uint()?;
            }
            0xE7 | 0xE8 => {
                let mut pos = reader.x;
                for _ in 0..(op - 0xE6) {
                    pos = read_flex_sym(self.data, pos, limit)?.1;
                }
                return Ok(pos);
            }
            0xE6 | 0xE9 => {
                let len = reader.flex_usize()?;
                if len == 0 {
                    return malformed("empty annotation sequence");
                }
                reader.skip(len)?;
            }
            _ => return malformed(format!("{op:#04x} is not an annotation sequence")),
        }
        Ok(reader.x)
    }

    /// Position just past the expression at `at`: a value with its
    /// annotations, a NOP or an e-expression.
    pub fn value_end(&self, at: usize, limit: usize) -> IonResult<usize> {
        self.value_end_at(at, limit, 0)
    }

    fn value_end_at(&self, at: usize, limit: usize, depth: usize) -> IonResult<usize> {
        if depth > MAX_SCAN_DEPTH {
            return malformed("data is nested too deeply");
        }
        let op = self.byte(at, limit)?;
        let info = opcode::lookup(op);
        let end = match info.length {
            Length::Invalid => return malformed(format!("invalid opcode {op:#04x} at {at}")),
            _ if op == opcode::END => return malformed(format!("unexpected end marker at {at}")),
            Length::Fixed(n) => at + 1 + n as usize,
            Length::Prefixed if op == opcode::EEXP_PREFIXED => {
                let invocation = invocation(self.data, at, limit)?;
                invocation.end.unwrap_or(invocation.start)
            }
            Length::Prefixed => {
                let mut reader = Reader::from_slice(self.data, at + 1, limit);
                let len = reader.flex_usize()?;
                reader.x + len
            }
            Length::Delimited => match info.token {
                Some(Token::Struct) => self.struct_end_at(at + 1, limit, depth + 1)?,
                _ => self.sequence_end_at(at + 1, limit, depth + 1)?,
            },
            Length::Computed => match info.token {
                Some(Token::Symbol) => {
                    let mut reader = Reader::from_slice(self.data, at + 1, limit);
                    reader.flex_uint()?;
                    reader.x
                }
                Some(Token::Annotations) => {
                    let value = self.annotations_end(at, limit)?;
                    self.value_end_at(value, limit, depth)?
                }
                _ => {
                    let invocation = invocation(self.data, at, limit)?;
                    let invoked = self.resolve(&invocation)?;
                    self.args_at(&invoked, invocation.start, limit, depth + 1)?.1
                }
            },
        };
        if end > limit {
            return malformed(format!("value at {at} overruns its container"));
        }
        Ok(end)
    }

    /// Position just past the end marker of the delimited list or sexp whose
    /// children start at `start`.
    pub fn sequence_end(&self, start: usize, limit: usize) -> IonResult<usize> {
        self.sequence_end_at(start, limit, 0)
    }

    fn sequence_end_at(&self, start: usize, limit: usize, depth: usize) -> IonResult<usize> {
        let mut pos = start;
        loop {
            if pos >= limit {
                return malformed("delimited container is not terminated");
            }
            if self.data[pos] == opcode::END {
                return Ok(pos + 1);
            }
            pos = self.value_end_at(pos, limit, depth)?;
        }
    }

    /// Position just past the end marker of the delimited struct whose
    /// fields start at `start`.
    pub fn struct_end(&self, start: usize, limit: usize) -> IonResult<usize> {
        self.struct_end_at(start, limit, 0)
    }

    fn struct_end_at(&self, start: usize, limit: usize, depth: usize) -> IonResult<usize> {
        let mut pos = start;
        loop {
            if pos >= limit {
                return malformed("delimited struct is not terminated");
            }
            let (name, after) = read_flex_sym(self.data, pos, limit)?;
            if name == FlexSym::End {
                return Ok(after);
            }
            pos = self.value_end_at(after, limit, depth)?;
        }
    }

    /// Captures the arguments of an invocation of `invoked` starting at
    /// `start`. Returns them with the position just past the last one.
    pub fn args(&self, invoked: &Macro, start: usize, limit: usize) -> IonResult<(Vec<Arg>, usize)> {
        self.args_at(invoked, start, limit, 0)
    }

    fn raw(&self, start: usize, end: usize) -> Arg {
        if start == end {
            return Arg::Absent;
        }
        Arg::Raw {
            start,
            end,
            tables: self.tables.clone(),
        }
    }

    fn args_at(
        &self,
        invoked: &Macro,
        start: usize,
        limit: usize,
        depth: usize,
    ) -> IonResult<(Vec<Arg>, usize)> {
        let mut reader = Reader::from_slice(self.data, start, limit);
        let presence = reader.try_buf(invoked.presence_bytes())?;
        let mut pos = reader.x;
        let mut slot = 0;
        let mut args = Vec::with_capacity(invoked.signature.len());
        for param in &invoked.signature {
            let code = if param.has_presence_bits() {
                let bits = (presence[slot / 4] >> ((slot % 4) * 2)) & 0b11;
                slot += 1;
                bits
            } else {
                1
            };
            let arg = match code {
                0 => {
                    if !param.cardinality.allows_none() {
                        return malformed(format!("missing argument for parameter '{}'", param.name));
                    }
                    Arg::Absent
                }
                1 if param.encoding.is_tagged() => {
                    let end = self.value_end_at(pos, limit, depth)?;
                    let arg = self.raw(pos, end);
                    pos = end;
                    arg
                }
                1 => {
                    let (value, end) = self.tagless(param.encoding, pos, limit)?;
                    pos = end;
                    Arg::values(vec![value])
                }
                2 => {
                    let mut reader = Reader::from_slice(self.data, pos, limit);
                    let len = reader.flex_usize()?;
                    let body = reader.x;
                    if len == 0 {
                        if !param.encoding.is_tagged() {
                            return unimplemented("delimited tagless expression groups");
                        }
                        let end = self.sequence_end_at(body, limit, depth)?;
                        pos = end;
                        self.raw(body, end - 1)
                    } else {
                        let end = body + len;
                        if end > limit {
                            return malformed("expression group overruns its e-expression");
                        }
                        pos = end;
                        if param.encoding.is_tagged() {
                            self.raw(body, end)
                        } else {
                            let mut values = Vec::new();
                            let mut at = body;
                            while at < end {
                                let (value, next) = self.tagless(param.encoding, at, end)?;
                                values.push(value);
                                at = next;
                            }
                            Arg::values(values)
                        }
                    }
                }
                _ => return malformed("invalid presence bits"),
            };
            args.push(arg);
        }
        Ok((args, pos))
    }

    /// Decodes one tagless argument.
    fn tagless(&self, encoding: Encoding, at: usize, limit: usize) -> IonResult<(Element, usize)> {
        let mut reader = Reader::from_slice(self.data, at, limit);
        let value = match encoding {
            Encoding::FlexUInt => Element::int(reader.flex_uint()? as i128),
            Encoding::FlexInt => Element::int(reader.flex_int()? as i128),
            Encoding::Int8 | Encoding::Int16 | Encoding::Int32 | Encoding::Int64 => {
                let width = encoding.fixed_width().unwrap_or(8);
                Element::int(reader.fixed_int(width)? as i128)
            }
            Encoding::UInt8 | Encoding::UInt16 | Encoding::UInt32 | Encoding::UInt64 => {
                let width = encoding.fixed_width().unwrap_or(8);
                Element::int(reader.fixed_uint(width)? as i128)
            }
            Encoding::Float16 => Element::float(reader.f16_le()? as f64),
            Encoding::Float32 => Element::float(reader.f32_le()? as f64),
            Encoding::Float64 => Element::float(reader.f64_le()?),
            Encoding::FlexSym => {
                let (sym, end) = read_flex_sym(self.data, at, limit)?;
                let symbol = flex_sym_symbol(sym, self.tables)?;
                return Ok((crate::Value::Symbol(symbol).into(), end));
            }
            Encoding::Tagged => return malformed("tagged parameter decoded as tagless"),
        };
        Ok((value, reader.x))
    }
}
