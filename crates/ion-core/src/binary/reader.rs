//! The raw pull tokenizer over Ion 1.0 and Ion 1.1 binary data.
//!
//! [`BinaryReader`] surfaces e-expressions as [`Token::MacroInvocation`]
//! without expanding them; [`crate::IonReader`] layers expansion and
//! directive handling on top.

use std::borrow::Cow;
use std::rc::Rc;

use ion_buffers::{flex, Reader};

use crate::context::Tables;
use crate::error::{malformed, unimplemented, usage, IonResult};
use crate::macros::{Arg, Macro};
use crate::options::ReaderOptions;
use crate::pool::{CursorId, ReaderPool, Shape};
use crate::source::TokenSource;
use crate::symbols::system_symbol_1_1;
use crate::types::{Decimal, IonType, Symbol, Timestamp, Token, Version};

use super::eexp::{self, flex_sym_symbol, read_flex_sym, FlexSym, Scanner};
use super::opcode::{self, Length};
use super::{legacy, timestamp};

/// Field name encodings, stored in [`Header::op`] of a `FieldName` header.
const FIELD_SID: u8 = 0;
const FIELD_FLEX_SYM: u8 = 1;
const FIELD_VAR_UINT: u8 = 2;

/// Framing of the token the reader is positioned on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    token: Token,
    op: u8,
    /// Position of the opcode.
    at: usize,
    /// Start of the body.
    start: usize,
    /// Exclusive end of the body; unknown for delimited containers and
    /// unprefixed e-expressions.
    end: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Positioned(Header),
    AfterAnnotation,
    AfterFieldName,
    End,
}

/// What the next opcode may be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    /// A field (in structs) or an item, including end markers and NOPs.
    Item,
    /// A field value: annotations, a value or an e-expression.
    Value,
    /// The value an annotation sequence applies to.
    AnnotatedValue,
}

enum Field {
    Name(Header),
    /// The end marker of a delimited struct, and the position after it.
    End(usize),
}

/// Pull tokenizer over a resident byte buffer.
pub struct BinaryReader<'a> {
    data: &'a [u8],
    version: Version,
    tables: Rc<Tables>,
    capacity: usize,
    pool: ReaderPool,
    stack: Vec<CursorId>,
    /// Effective limit of each open cursor whose own end is not known yet.
    bounds: Vec<usize>,
    state: State,
    /// End of the Ion 1.0 annotation wrapper around the next value.
    wrapper_end: Option<usize>,
    max_depth: usize,
}

impl std::fmt::Debug for BinaryReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryReader")
            .field("version", &self.version)
            .field("depth", &self.depth())
            .field("state", &self.state)
            .finish()
    }
}

impl<'a> BinaryReader<'a> {
    /// A reader over a whole stream. Until a version marker says otherwise
    /// the data is Ion 1.0.
    pub fn new(data: &'a [u8], options: &ReaderOptions) -> Self {
        let tables = Rc::new(Tables::v1_0(options.symbol_table_capacity));
        let mut reader = Self {
            data,
            version: Version::V1_0,
            tables: tables.clone(),
            capacity: options.symbol_table_capacity,
            pool: ReaderPool::new(),
            stack: Vec::new(),
            bounds: Vec::new(),
            state: State::Idle,
            wrapper_end: None,
            max_depth: options.max_depth,
        };
        reader.reset(tables, 0, data.len());
        reader
    }

    /// A reader over the top-level values in `data[start..end]`, decoded
    /// with `tables`.
    pub fn over(data: &'a [u8], tables: Rc<Tables>, start: usize, end: usize, max_depth: usize) -> Self {
        let mut reader = Self {
            data,
            version: tables.version(),
            tables: tables.clone(),
            capacity: tables.symbol_count(),
            pool: ReaderPool::new(),
            stack: Vec::new(),
            bounds: Vec::new(),
            state: State::Idle,
            wrapper_end: None,
            max_depth,
        };
        reader.reset(tables, start, end);
        reader
    }

    /// Repositions the reader on `data[start..end]`, keeping its pool.
    pub fn reset(&mut self, tables: Rc<Tables>, start: usize, end: usize) {
        for id in self.stack.drain(..) {
            self.pool.release(id);
        }
        self.bounds.clear();
        self.version = tables.version();
        self.tables = tables;
        let end = end.min(self.data.len());
        let top = self.pool.acquire(Shape::TopLevel, None, start, Some(end));
        self.stack.push(top);
        self.bounds.push(end);
        self.state = State::Idle;
        self.wrapper_end = None;
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn tables(&self) -> &Rc<Tables> {
        &self.tables
    }

    /// Replaces the tables used to resolve symbols and macros from here on.
    pub fn set_tables(&mut self, tables: Rc<Tables>) {
        if !Rc::ptr_eq(&self.tables, &tables) {
            tracing::trace!(appended = tables.extends(&self.tables), "tokenizer tables replaced");
        }
        self.tables = tables;
    }

    fn top(&self) -> CursorId {
        self.stack[self.stack.len() - 1]
    }

    fn pos(&self) -> usize {
        self.pool.get(self.top()).pos
    }

    fn set_pos(&mut self, pos: usize) {
        let top = self.top();
        self.pool.get_mut(top).pos = pos;
    }

    fn limit(&self) -> usize {
        let cursor = self.pool.get(self.top());
        cursor.end.unwrap_or(self.bounds[self.bounds.len() - 1])
    }

    fn scanner(&self) -> Scanner<'a, '_> {
        Scanner::new(self.data, &self.tables)
    }

    fn body(&self, header: &Header) -> &'a [u8] {
        let data = self.data;
        &data[header.start..header.end.unwrap_or(header.start)]
    }

    fn current(&self, token: Token) -> IonResult<Header> {
        match self.state {
            State::Positioned(header) if header.token == token => Ok(header),
            _ => usage(format!("not positioned on {token:?}")),
        }
    }

    /// Moves past a scalar that has been read.
    fn consume(&mut self, header: &Header) {
        if let Some(end) = header.end {
            self.set_pos(end);
        }
        self.state = State::Idle;
    }

    fn positioned(&mut self, header: Header) -> Token {
        self.state = State::Positioned(header);
        header.token
    }

    fn at_end(&mut self, next: Next) -> IonResult<Token> {
        if next != Next::Item {
            return malformed("expected a value before the end of the container");
        }
        if self.pos() > self.limit() {
            return malformed("value overruns its container");
        }
        self.state = State::End;
        Ok(Token::End)
    }

    /// End of the value described by `header`, scanning when its length
    /// is not encoded.
    fn value_end(&self, header: &Header) -> IonResult<usize> {
        if let Some(end) = header.end {
            return Ok(end);
        }
        let limit = self.limit();
        let scanner = self.scanner();
        match header.token {
            Token::List | Token::Sexp => scanner.sequence_end(header.start, limit),
            Token::Struct => scanner.struct_end(header.start, limit),
            Token::MacroInvocation => {
                let invocation = eexp::invocation(self.data, header.at, limit)?;
                let invoked = scanner.resolve(&invocation)?;
                Ok(scanner.args(&invoked, invocation.start, limit)?.1)
            }
            other => malformed(format!("{other:?} has no encoded length")),
        }
    }

    /// End of the (possibly annotated) value that starts at `at`.
    fn skip_value_at(&self, at: usize) -> IonResult<usize> {
        let limit = self.limit();
        match self.version {
            Version::V1_1 => self.scanner().value_end(at, limit),
            Version::V1_0 => {
                let descriptor = legacy::descriptor(self.data, at, limit)?;
                Ok(descriptor.wrapper_end.unwrap_or(descriptor.end))
            }
        }
    }

    /// Moves the cursor past the current value and whatever precedes it.
    fn finish_current(&mut self) -> IonResult<()> {
        let end = match self.state {
            State::Positioned(header) => match header.token {
                Token::Annotations if self.version == Version::V1_0 => {
                    match self.wrapper_end {
                        Some(end) => Some(end),
                        None => return malformed("annotation wrapper without bounds"),
                    }
                }
                Token::FieldName | Token::Annotations => {
                    let value = header.end.unwrap_or(header.start);
                    Some(self.skip_value_at(value)?)
                }
                _ => Some(self.value_end(&header)?),
            },
            State::AfterFieldName => Some(self.skip_value_at(self.pos())?),
            State::AfterAnnotation => match self.wrapper_end {
                Some(end) => Some(end),
                None => Some(self.skip_value_at(self.pos())?),
            },
            State::Idle | State::End => None,
        };
        if let Some(end) = end {
            self.set_pos(end);
        }
        self.wrapper_end = None;
        Ok(())
    }

    fn switch_version(&mut self, at: usize) -> IonResult<Version> {
        let mut reader = Reader::from_slice(self.data, at + 1, self.limit());
        let marker = reader.try_buf(3)?;
        if marker[2] != 0xEA {
            return malformed("invalid version marker");
        }
        let version = match (marker[0], marker[1]) {
            (1, 0) => Version::V1_0,
            (1, 1) => Version::V1_1,
            (major, minor) => return unimplemented(format!("Ion {major}.{minor}")),
        };
        if version != self.version {
            tracing::trace!(?version, at, "tokenizer switches version");
        }
        self.version = version;
        self.tables = Rc::new(Tables::new(version, self.capacity)?);
        Ok(version)
    }

    fn version_marker(&mut self, at: usize, next: Next) -> IonResult<Token> {
        if self.stack.len() != 1 || next != Next::Item {
            return malformed("version marker inside a value");
        }
        self.switch_version(at)?;
        Ok(self.positioned(Header {
            token: Token::VersionMarker,
            op: opcode::IVM,
            at,
            start: at + 1,
            end: Some(at + 4),
        }))
    }

    fn advance(&mut self, next: Next) -> IonResult<Token> {
        match self.version {
            Version::V1_0 => self.advance_1_0(next),
            Version::V1_1 => self.advance_1_1(next),
        }
    }

    fn field_name_1_1(&mut self, at: usize, limit: usize) -> IonResult<Field> {
        let top = self.top();
        let mut pos = at;
        if !self.pool.get(top).flex_sym {
            let mut reader = Reader::from_slice(self.data, at, limit);
            let sid = reader.flex_usize()?;
            if sid != 0 {
                return Ok(Field::Name(Header {
                    token: Token::FieldName,
                    op: FIELD_SID,
                    at,
                    start: at,
                    end: Some(reader.x),
                }));
            }
            // SID 0 switches the rest of the struct to FlexSym field names.
            self.pool.get_mut(top).flex_sym = true;
            pos = reader.x;
        }
        let (name, after) = read_flex_sym(self.data, pos, limit)?;
        if name == FlexSym::End {
            if self.pool.get(top).shape != Shape::DelimitedStruct {
                return malformed("end marker in a length-prefixed struct");
            }
            return Ok(Field::End(after));
        }
        Ok(Field::Name(Header {
            token: Token::FieldName,
            op: FIELD_FLEX_SYM,
            at: pos,
            start: pos,
            end: Some(after),
        }))
    }

    fn advance_1_1(&mut self, next: Next) -> IonResult<Token> {
        loop {
            let cursor = *self.pool.get(self.top());
            let limit = self.limit();
            let pos = cursor.pos;
            if pos >= limit {
                if cursor.end.is_none() {
                    return malformed("delimited container is not terminated");
                }
                return self.at_end(next);
            }
            if cursor.shape.is_struct() && next == Next::Item {
                match self.field_name_1_1(pos, limit)? {
                    Field::End(after) => {
                        let top = self.top();
                        let cursor = self.pool.get_mut(top);
                        cursor.pos = after;
                        cursor.end = Some(after);
                        self.state = State::End;
                        return Ok(Token::End);
                    }
                    Field::Name(header) => {
                        let value = header.end.unwrap_or(header.start);
                        if value < limit && opcode::lookup(self.data[value]).is_nop() {
                            // A field whose value is a NOP is dropped.
                            let end = self.scanner().value_end(value, limit)?;
                            self.set_pos(end);
                            continue;
                        }
                        return Ok(self.positioned(header));
                    }
                }
            }
            let op = self.data[pos];
            let info = opcode::lookup(op);
            if info.is_nop() {
                if next != Next::Item {
                    return malformed(format!("NOP at {pos} where a value is required"));
                }
                let end = self.scanner().value_end(pos, limit)?;
                self.set_pos(end);
                continue;
            }
            let Some(token) = info.token else {
                return malformed(format!("invalid opcode {op:#04x} at {pos}"));
            };
            let header = match token {
                Token::End => {
                    if cursor.shape != Shape::DelimitedSequence || next != Next::Item {
                        return malformed(format!("unexpected end marker at {pos}"));
                    }
                    let top = self.top();
                    let cursor = self.pool.get_mut(top);
                    cursor.pos = pos + 1;
                    cursor.end = Some(pos + 1);
                    self.state = State::End;
                    return Ok(Token::End);
                }
                Token::VersionMarker => return self.version_marker(pos, next),
                Token::Annotations => {
                    if next == Next::AnnotatedValue {
                        return malformed("annotations cannot annotate annotations");
                    }
                    let end = self.scanner().annotations_end(pos, limit)?;
                    Header {
                        token,
                        op,
                        at: pos,
                        start: pos + 1,
                        end: Some(end),
                    }
                }
                Token::MacroInvocation => {
                    if next == Next::AnnotatedValue {
                        return malformed("annotations cannot precede an e-expression");
                    }
                    let invocation = eexp::invocation(self.data, pos, limit)?;
                    Header {
                        token,
                        op,
                        at: pos,
                        start: invocation.start,
                        end: invocation.end,
                    }
                }
                _ => {
                    let (start, end) = match info.length {
                        Length::Fixed(n) => (pos + 1, Some(pos + 1 + n as usize)),
                        Length::Prefixed => {
                            let mut reader = Reader::from_slice(self.data, pos + 1, limit);
                            let len = reader.flex_usize()?;
                            (reader.x, Some(reader.x + len))
                        }
                        Length::Delimited => (pos + 1, None),
                        Length::Computed => {
                            let mut reader = Reader::from_slice(self.data, pos + 1, limit);
                            reader.flex_uint()?;
                            (pos + 1, Some(reader.x))
                        }
                        Length::Invalid => return malformed(format!("invalid opcode {op:#04x}")),
                    };
                    if end.is_some_and(|end| end > limit) {
                        return malformed(format!("value at {pos} overruns its container"));
                    }
                    Header {
                        token,
                        op,
                        at: pos,
                        start,
                        end,
                    }
                }
            };
            return Ok(self.positioned(header));
        }
    }

    fn advance_1_0(&mut self, next: Next) -> IonResult<Token> {
        loop {
            let cursor = *self.pool.get(self.top());
            let limit = self.limit();
            let pos = cursor.pos;
            if pos >= limit {
                return self.at_end(next);
            }
            if cursor.shape.is_struct() && next == Next::Item {
                let mut reader = Reader::from_slice(self.data, pos, limit);
                reader.var_uint()?;
                let name_end = reader.x;
                let value = legacy::descriptor(self.data, name_end, limit)?;
                if value.token.is_none() {
                    // Padding with a field name.
                    self.set_pos(value.end);
                    continue;
                }
                return Ok(self.positioned(Header {
                    token: Token::FieldName,
                    op: FIELD_VAR_UINT,
                    at: pos,
                    start: pos,
                    end: Some(name_end),
                }));
            }
            let descriptor = legacy::descriptor(self.data, pos, limit)?;
            let Some(token) = descriptor.token else {
                if next != Next::Item {
                    return malformed(format!("padding at {pos} where a value is required"));
                }
                self.set_pos(descriptor.end);
                continue;
            };
            match token {
                Token::VersionMarker => return self.version_marker(pos, next),
                Token::Annotations => {
                    if next == Next::AnnotatedValue {
                        return malformed("annotation wrappers cannot be nested");
                    }
                    self.wrapper_end = descriptor.wrapper_end;
                }
                _ if next == Next::AnnotatedValue => {
                    if self.wrapper_end != Some(descriptor.end) {
                        return malformed("annotation wrapper length does not match its value");
                    }
                    self.wrapper_end = None;
                }
                _ => {}
            }
            return Ok(self.positioned(Header {
                token,
                op: descriptor.op,
                at: pos,
                start: descriptor.start,
                end: Some(descriptor.end),
            }));
        }
    }

    /// Reads the version of the current version marker. The reader has
    /// already switched to it.
    pub fn read_version_marker(&mut self) -> IonResult<Version> {
        let header = self.current(Token::VersionMarker)?;
        self.consume(&header);
        Ok(self.version)
    }

    /// Resolves the current e-expression and captures its arguments.
    pub fn read_eexp(&mut self) -> IonResult<(Rc<Macro>, Vec<Arg>)> {
        let header = self.current(Token::MacroInvocation)?;
        let limit = self.limit();
        let invocation = eexp::invocation(self.data, header.at, limit)?;
        let scanner = self.scanner();
        let invoked = scanner.resolve(&invocation)?;
        let (args, end) = scanner.args(&invoked, invocation.start, invocation.end.unwrap_or(limit))?;
        if invocation.end.is_some_and(|prefixed| prefixed != end) {
            return malformed("e-expression arguments do not fill their length prefix");
        }
        self.set_pos(end);
        self.state = State::Idle;
        Ok((invoked, args))
    }

    fn symbol_id(&self, sid: usize) -> IonResult<Symbol> {
        self.tables.symbol(sid)
    }

    fn annotations_1_1(&mut self, header: &Header) -> IonResult<Vec<Symbol>> {
        let end = header.end.unwrap_or(header.start);
        let mut reader = Reader::from_slice(self.data, header.start, end);
        if matches!(header.op, 0xE6 | 0xE9) {
            reader.flex_usize()?;
        }
        let flex_sym = header.op >= 0xE7;
        let id = self.pool.acquire(Shape::Annotations, None, reader.x, Some(end));
        let result = self.collect_annotations(id, flex_sym, end);
        self.pool.release(id);
        result
    }

    fn collect_annotations(&mut self, id: CursorId, flex_sym: bool, end: usize) -> IonResult<Vec<Symbol>> {
        let mut annotations = Vec::new();
        while self.pool.get(id).pos < end {
            let pos = self.pool.get(id).pos;
            let (symbol, next) = if flex_sym {
                let (sym, next) = read_flex_sym(self.data, pos, end)?;
                (flex_sym_symbol(sym, &self.tables)?, next)
            } else {
                let mut reader = Reader::from_slice(self.data, pos, end);
                let sid = reader.flex_usize()?;
                (self.symbol_id(sid)?, reader.x)
            };
            annotations.push(symbol);
            self.pool.get_mut(id).pos = next;
        }
        Ok(annotations)
    }
}

impl TokenSource for BinaryReader<'_> {
    fn next_token(&mut self) -> IonResult<Token> {
        let next = match self.state {
            State::End => return Ok(Token::End),
            State::Idle => Next::Item,
            State::AfterFieldName => Next::Value,
            State::AfterAnnotation => Next::AnnotatedValue,
            State::Positioned(header) => match header.token {
                Token::FieldName => {
                    self.set_pos(header.end.unwrap_or(header.start));
                    Next::Value
                }
                Token::Annotations => {
                    self.set_pos(header.end.unwrap_or(header.start));
                    Next::AnnotatedValue
                }
                _ => {
                    let end = self.value_end(&header)?;
                    self.set_pos(end);
                    Next::Item
                }
            },
        };
        self.state = State::Idle;
        self.advance(next)
    }

    fn skip(&mut self) -> IonResult<()> {
        self.finish_current()?;
        if self.state != State::End {
            self.state = State::Idle;
        }
        Ok(())
    }

    fn read_null(&mut self) -> IonResult<IonType> {
        let header = self.current(Token::Null)?;
        let ion_type = match self.version {
            Version::V1_0 => legacy::null_type(header.op)?,
            Version::V1_1 if header.op == 0xEA => IonType::Null,
            Version::V1_1 => {
                let code = self.body(&header)[0];
                match IonType::from_typed_null_code(code) {
                    Some(ion_type) => ion_type,
                    None => return malformed(format!("invalid typed null {code:#04x}")),
                }
            }
        };
        self.consume(&header);
        Ok(ion_type)
    }

    fn read_bool(&mut self) -> IonResult<bool> {
        let header = self.current(Token::Bool)?;
        self.consume(&header);
        Ok(match self.version {
            Version::V1_0 => legacy::read_bool(header.op),
            Version::V1_1 => header.op == 0x6E,
        })
    }

    fn read_int(&mut self) -> IonResult<i128> {
        let header = self.current(Token::Int)?;
        let body = self.body(&header);
        let value = match self.version {
            Version::V1_0 => legacy::read_int(header.op, body)?,
            Version::V1_1 => {
                if body.len() > 16 {
                    return unimplemented(format!("{}-byte integers", body.len()));
                }
                Reader::new(body).fixed_int_i128(body.len())?
            }
        };
        self.consume(&header);
        Ok(value)
    }

    fn read_float(&mut self) -> IonResult<f64> {
        let header = self.current(Token::Float)?;
        let body = self.body(&header);
        let value = match self.version {
            Version::V1_0 => legacy::read_float(body)?,
            Version::V1_1 => {
                let mut reader = Reader::new(body);
                match header.op {
                    0x6A => 0.0,
                    0x6B => reader.f16_le()? as f64,
                    0x6C => reader.f32_le()? as f64,
                    _ => reader.f64_le()?,
                }
            }
        };
        self.consume(&header);
        Ok(value)
    }

    fn read_decimal(&mut self) -> IonResult<Decimal> {
        let header = self.current(Token::Decimal)?;
        let body = self.body(&header);
        let value = match self.version {
            Version::V1_0 => legacy::read_decimal(body)?,
            Version::V1_1 if body.is_empty() => Decimal::new(0, 0),
            Version::V1_1 => {
                let mut reader = Reader::new(body);
                let exponent = reader.flex_int()?;
                let coefficient = reader.remaining();
                match coefficient.len() {
                    0 => Decimal::new(0, exponent),
                    n if n > 16 => return unimplemented(format!("{n}-byte decimal coefficients")),
                    _ => match flex::fixed_int_from_le(coefficient)? {
                        0 => Decimal::negative_zero(exponent),
                        c => Decimal::new(c, exponent),
                    },
                }
            }
        };
        self.consume(&header);
        Ok(value)
    }

    fn read_timestamp(&mut self) -> IonResult<Timestamp> {
        let header = self.current(Token::Timestamp)?;
        let body = self.body(&header);
        let value = match self.version {
            Version::V1_0 => legacy::read_timestamp(body)?,
            Version::V1_1 if header.op == 0xF8 => timestamp::read_long(body)?,
            Version::V1_1 => timestamp::read_short(header.op, body)?,
        };
        self.consume(&header);
        Ok(value)
    }

    fn read_string(&mut self) -> IonResult<Cow<'_, str>> {
        let header = self.current(Token::String)?;
        let body = self.body(&header);
        let text = Reader::new(body).try_utf8(body.len())?;
        self.consume(&header);
        Ok(Cow::Borrowed(text))
    }

    fn read_symbol(&mut self) -> IonResult<Symbol> {
        let header = self.current(Token::Symbol)?;
        let body = self.body(&header);
        let symbol = match self.version {
            Version::V1_0 => self.symbol_id(legacy::read_sid(body)?)?,
            Version::V1_1 => match header.op {
                0xA0..=0xAF | 0xFA => Symbol::from(Reader::new(body).try_utf8(body.len())?),
                0xE1 => self.symbol_id(body[0] as usize)?,
                0xE2 => self.symbol_id(Reader::new(body).try_u16_le()? as usize + 256)?,
                0xE3 => self.symbol_id(Reader::new(body).flex_usize()? + 65792)?,
                opcode::SYSTEM_SYMBOL => match body[0] {
                    0 => Symbol::Unknown(0),
                    address => match system_symbol_1_1(address as usize) {
                        Some(text) => Symbol::from(text),
                        None => return malformed(format!("system symbol {address} out of range")),
                    },
                },
                op => return malformed(format!("{op:#04x} is not a symbol")),
            },
        };
        self.consume(&header);
        Ok(symbol)
    }

    fn read_lob(&mut self) -> IonResult<Cow<'_, [u8]>> {
        let header = match self.state {
            State::Positioned(header) if matches!(header.token, Token::Blob | Token::Clob) => header,
            _ => return usage("not positioned on a lob"),
        };
        let body = self.body(&header);
        self.consume(&header);
        Ok(Cow::Borrowed(body))
    }

    fn read_annotations(&mut self) -> IonResult<Vec<Symbol>> {
        let header = self.current(Token::Annotations)?;
        let annotations = match self.version {
            Version::V1_1 => self.annotations_1_1(&header)?,
            Version::V1_0 => {
                let mut reader = Reader::from_slice(self.data, header.start, header.end.unwrap_or(header.start));
                let mut annotations = Vec::new();
                while !reader.is_empty() {
                    annotations.push(self.symbol_id(reader.var_uint()? as usize)?);
                }
                annotations
            }
        };
        self.set_pos(header.end.unwrap_or(header.start));
        self.state = State::AfterAnnotation;
        Ok(annotations)
    }

    fn read_field_name(&mut self) -> IonResult<Symbol> {
        let header = self.current(Token::FieldName)?;
        let end = header.end.unwrap_or(header.start);
        let name = match header.op {
            FIELD_SID => self.symbol_id(Reader::from_slice(self.data, header.start, end).flex_usize()?)?,
            FIELD_VAR_UINT => {
                self.symbol_id(Reader::from_slice(self.data, header.start, end).var_uint()? as usize)?
            }
            _ => flex_sym_symbol(read_flex_sym(self.data, header.start, end)?.0, &self.tables)?,
        };
        self.set_pos(end);
        self.state = State::AfterFieldName;
        Ok(name)
    }

    fn step_in(&mut self) -> IonResult<()> {
        let header = match self.state {
            State::Positioned(header) if header.token.is_container() => header,
            _ => return usage("not positioned on a container"),
        };
        if self.depth() >= self.max_depth {
            return malformed(format!("nesting exceeds the maximum depth of {}", self.max_depth));
        }
        let shape = match (header.token, header.end.is_some()) {
            (Token::Struct, true) => Shape::Struct,
            (Token::Struct, false) => Shape::DelimitedStruct,
            (_, true) => Shape::Sequence,
            (_, false) => Shape::DelimitedSequence,
        };
        let bound = self.limit();
        if let Some(end) = header.end {
            self.set_pos(end);
        }
        let id = self
            .pool
            .acquire(shape, header.token.ion_type(), header.start, header.end);
        self.stack.push(id);
        self.bounds.push(bound);
        self.state = State::Idle;
        Ok(())
    }

    fn step_out(&mut self) -> IonResult<()> {
        if self.stack.len() <= 1 {
            return usage("step_out at depth 0");
        }
        self.finish_current()?;
        let cursor = *self.pool.get(self.top());
        let end = match cursor.end {
            Some(end) => end,
            None => {
                let limit = self.limit();
                let scanner = self.scanner();
                if cursor.shape == Shape::DelimitedStruct {
                    scanner.struct_end(cursor.pos, limit)?
                } else {
                    scanner.sequence_end(cursor.pos, limit)?
                }
            }
        };
        if let Some(id) = self.stack.pop() {
            self.pool.release(id);
        }
        self.bounds.pop();
        self.set_pos(end);
        self.state = State::Idle;
        Ok(())
    }

    fn depth(&self) -> usize {
        self.stack.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{read_all, Element};

    const IVM_1_1: [u8; 4] = [0xE0, 0x01, 0x01, 0xEA];

    fn reader(data: &[u8]) -> BinaryReader<'_> {
        BinaryReader::new(data, &ReaderOptions::default())
    }

    fn v11(body: &[u8]) -> Vec<u8> {
        let mut data = IVM_1_1.to_vec();
        data.extend_from_slice(body);
        data
    }

    /// Reads every value after the leading version marker.
    fn values(data: &[u8]) -> IonResult<Vec<Element>> {
        let mut reader = reader(data);
        assert_eq!(reader.next_token()?, Token::VersionMarker);
        reader.read_version_marker()?;
        read_all(&mut reader)
    }

    fn tokens(data: &[u8]) -> Vec<Token> {
        let mut reader = reader(data);
        let mut out = Vec::new();
        loop {
            let token = reader.next_token().unwrap();
            out.push(token);
            if token == Token::End && reader.depth() == 0 {
                return out;
            }
            if token.is_container() {
                reader.step_in().unwrap();
            } else if token == Token::End {
                reader.step_out().unwrap();
            }
        }
    }

    #[test]
    fn int_then_list() {
        let data = v11(&[0x60, 0xB4, 0x61, 0x01, 0x61, 0x02]);
        assert_eq!(
            tokens(&data),
            [
                Token::VersionMarker,
                Token::Int,
                Token::List,
                Token::Int,
                Token::Int,
                Token::End,
                Token::End,
            ]
        );
    }

    #[test]
    fn scalars_1_1() {
        let data = v11(&[
            0x62, 0x2C, 0x01, // 300
            0x6B, 0x00, 0x3C, // 1.0 as f16
            0x6F, // false
            0x72, 0x03, 0x05, // 5d1
            0x93, b'a', b'b', b'c', // "abc"
            0xA1, b's', // s
            0xEB, 0x05, // null.string
            0xFE, 0x05, 0x01, 0x02, // blob
        ]);
        let mut reader = reader(&data);
        assert_eq!(reader.next_token().unwrap(), Token::VersionMarker);
        assert_eq!(reader.read_version_marker().unwrap(), Version::V1_1);
        assert_eq!(reader.next_token().unwrap(), Token::Int);
        assert_eq!(reader.read_int().unwrap(), 300);
        assert_eq!(reader.next_token().unwrap(), Token::Float);
        assert_eq!(reader.read_float().unwrap(), 1.0);
        assert_eq!(reader.next_token().unwrap(), Token::Bool);
        assert!(!reader.read_bool().unwrap());
        assert_eq!(reader.next_token().unwrap(), Token::Decimal);
        assert_eq!(reader.read_decimal().unwrap(), Decimal::new(5, 1));
        assert_eq!(reader.next_token().unwrap(), Token::String);
        assert_eq!(reader.read_string().unwrap(), "abc");
        assert_eq!(reader.next_token().unwrap(), Token::Symbol);
        assert_eq!(reader.read_symbol().unwrap(), Symbol::from("s"));
        assert_eq!(reader.next_token().unwrap(), Token::Null);
        assert_eq!(reader.read_null().unwrap(), IonType::String);
        assert_eq!(reader.next_token().unwrap(), Token::Blob);
        assert_eq!(&*reader.read_lob().unwrap(), &[0x01, 0x02]);
        assert_eq!(reader.next_token().unwrap(), Token::End);
        assert_eq!(reader.next_token().unwrap(), Token::End);
    }

    #[test]
    fn decimal_zeros() {
        let data = v11(&[0x70, 0x71, 0x01, 0x72, 0x01, 0x00]);
        let mut reader = reader(&data);
        reader.next_token().unwrap();
        reader.next_token().unwrap();
        assert_eq!(reader.read_decimal().unwrap(), Decimal::new(0, 0));
        reader.next_token().unwrap();
        assert_eq!(reader.read_decimal().unwrap(), Decimal::new(0, 0));
        reader.next_token().unwrap();
        assert_eq!(reader.read_decimal().unwrap(), Decimal::negative_zero(0));
    }

    #[test]
    fn delimited_list_ends_at_terminator() {
        let data = v11(&[0xF1, 0x61, 0x01, 0xF1, 0xF0, 0xF0, 0x61, 0x07]);
        let mut reader = reader(&data);
        reader.next_token().unwrap();
        assert_eq!(reader.next_token().unwrap(), Token::List);
        reader.step_in().unwrap();
        assert_eq!(reader.next_token().unwrap(), Token::Int);
        assert_eq!(reader.next_token().unwrap(), Token::List);
        assert_eq!(reader.next_token().unwrap(), Token::End);
        reader.step_out().unwrap();
        assert_eq!(reader.next_token().unwrap(), Token::Int);
        assert_eq!(reader.read_int().unwrap(), 7);
    }

    #[test]
    fn early_step_out_of_delimited_list() {
        let data = v11(&[0xF1, 0x61, 0x01, 0xF1, 0x61, 0x02, 0xF0, 0xF0, 0x61, 0x07]);
        let mut reader = reader(&data);
        reader.next_token().unwrap();
        reader.next_token().unwrap();
        reader.step_in().unwrap();
        assert_eq!(reader.next_token().unwrap(), Token::Int);
        reader.step_out().unwrap();
        assert_eq!(reader.next_token().unwrap(), Token::Int);
        assert_eq!(reader.read_int().unwrap(), 7);
    }

    #[test]
    fn structs_with_sid_and_flex_sym_names() {
        // The second field name overruns the struct.
        let data = v11(&[0xD6, 0x09, 0x61, 0x01, 0x01, 0xFD, b'a']);
        assert!(matches!(values(&data), Err(crate::IonError::MalformedData(_))));

        // {name: 1, "ab": 2} {"c": 3}
        let data = v11(&[
            0xD9, 0x09, 0x61, 0x01, 0x01, 0xFD, b'a', b'b', 0x61, 0x02, //
            0xF3, 0xFF, b'c', 0x61, 0x03, 0x01, 0xF0,
        ]);
        assert_eq!(
            values(&data).unwrap(),
            vec![
                Element::strukt(vec![("name", Element::int(1)), ("ab", Element::int(2))]),
                Element::strukt(vec![("c", Element::int(3))]),
            ]
        );
    }

    #[test]
    fn nop_fields_are_dropped() {
        // {$4: NOP, $5: 1}
        let data = v11(&[0xD5, 0x09, 0xEC, 0x0B, 0x61, 0x01]);
        assert_eq!(
            values(&data).unwrap(),
            vec![Element::strukt(vec![("version", Element::int(1))])]
        );
    }

    #[test]
    fn annotations_1_1() {
        // $ion::name::1, then "x"::2
        let data = v11(&[0xE5, 0x03, 0x09, 0x61, 0x01, 0xE7, 0xFF, b'x', 0x61, 0x02]);
        assert_eq!(
            values(&data).unwrap(),
            vec![
                Element::int(1).with_annotations(vec!["$ion", "name"]),
                Element::int(2).with_annotations(vec!["x"]),
            ]
        );
    }

    #[test]
    fn unread_annotations_move_on_to_the_value() {
        let data = v11(&[0xE4, 0x03, 0x61, 0x05]);
        let mut reader = reader(&data);
        reader.next_token().unwrap();
        assert_eq!(reader.next_token().unwrap(), Token::Annotations);
        assert_eq!(reader.next_token().unwrap(), Token::Int);
        assert_eq!(reader.read_int().unwrap(), 5);
    }

    #[test]
    fn symbol_ids_resolve_against_tables() {
        let data = v11(&[0xE1, 0x04, 0xEE, 0x05, 0xE1, 0xC8]);
        let mut reader = reader(&data);
        reader.next_token().unwrap();
        reader.next_token().unwrap();
        assert_eq!(reader.read_symbol().unwrap(), Symbol::from("name"));
        reader.next_token().unwrap();
        assert_eq!(reader.read_symbol().unwrap(), Symbol::from("version"));
        reader.next_token().unwrap();
        assert!(matches!(reader.read_symbol(), Err(crate::IonError::MalformedData(_))));
    }

    #[test]
    fn system_eexp_captures_arguments() {
        // (:$ion::sum 1 2)
        let data = v11(&[0xEF, 0x07, 0x61, 0x01, 0x61, 0x02, 0x6E]);
        let mut reader = reader(&data);
        reader.next_token().unwrap();
        assert_eq!(reader.next_token().unwrap(), Token::MacroInvocation);
        let (invoked, args) = reader.read_eexp().unwrap();
        assert_eq!(invoked.name(), Some("sum"));
        assert!(matches!(args[0], Arg::Raw { start: 6, end: 8, .. }));
        assert!(matches!(args[1], Arg::Raw { start: 8, end: 10, .. }));
        assert_eq!(reader.next_token().unwrap(), Token::Bool);
    }

    #[test]
    fn unread_eexp_is_skipped() {
        let data = v11(&[0xEF, 0x07, 0x61, 0x01, 0x61, 0x02, 0x6E]);
        let mut reader = reader(&data);
        reader.next_token().unwrap();
        assert_eq!(reader.next_token().unwrap(), Token::MacroInvocation);
        assert_eq!(reader.next_token().unwrap(), Token::Bool);
    }

    #[test]
    fn ion_1_0_values() {
        let data = [
            0xE0, 0x01, 0x00, 0xEA, // IVM
            0x21, 0x07, // 7
            0x31, 0x07, // -7
            0xB4, 0x21, 0x01, 0x11, 0x0F, // [1, true, null]
            0xD3, 0x84, 0x21, 0x02, // {name: 2}
            0xE3, 0x81, 0x84, 0x20, // name::0
            0x01, 0x00, // pad
        ];
        assert_eq!(
            values(&data).unwrap(),
            vec![
                Element::int(7),
                Element::int(-7),
                Element::list(vec![Element::int(1), Element::bool(true), Element::null()]),
                Element::strukt(vec![("name", Element::int(2))]),
                Element::int(0).with_annotations(vec!["name"]),
            ]
        );
    }

    #[test]
    fn wrapper_length_must_match() {
        let data = [0xE0, 0x01, 0x00, 0xEA, 0xE4, 0x81, 0x84, 0x20, 0x20];
        assert!(matches!(values(&data), Err(crate::IonError::MalformedData(_))));
    }

    #[test]
    fn unsupported_version() {
        let data = [0xE0, 0x02, 0x00, 0xEA];
        assert!(matches!(
            reader(&data).next_token(),
            Err(crate::IonError::UnimplementedFeature(_))
        ));
    }

    #[test]
    fn depth_limit() {
        let data = v11(&[0xB2, 0xB1, 0xB0]);
        let options = ReaderOptions::default().with_max_depth(1);
        let mut reader = BinaryReader::new(&data, &options);
        reader.next_token().unwrap();
        reader.next_token().unwrap();
        reader.step_in().unwrap();
        reader.next_token().unwrap();
        assert!(reader.step_in().is_err());
    }

    #[test]
    fn cursors_return_to_the_pool() {
        let data = v11(&[0xB2, 0xB1, 0xB0, 0xB2, 0xB1, 0xB0]);
        let mut reader = reader(&data);
        reader.next_token().unwrap();
        for _ in 0..2 {
            assert_eq!(reader.next_token().unwrap(), Token::List);
            reader.step_in().unwrap();
            reader.next_token().unwrap();
            reader.step_in().unwrap();
            reader.step_out().unwrap();
            reader.step_out().unwrap();
        }
        assert_eq!(reader.pool.allocated(), 3);
        assert_eq!(reader.pool.outstanding(), 1);
    }
}
