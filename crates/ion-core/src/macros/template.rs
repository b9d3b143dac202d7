//! Bytecode interpreter exposing a template body as a token stream.

use std::borrow::Cow;
use std::rc::Rc;

use crate::error::{malformed, usage, IonResult};
use crate::source::TokenSource;
use crate::symbols::system_symbol_1_1;
use crate::types::{Decimal, IonType, Symbol, Timestamp, Token};

use super::bytecode::{self as bc, word_at};
use super::{Arg, Constant, Env, Macro};

/// What the expanding reader must splice in at an `ExpressionGroup` or
/// `MacroInvocation` token.
#[derive(Debug, Clone)]
pub enum Expansion {
    /// The values bound to a parameter.
    Splice(Arg),
    /// A nested invocation whose arguments are evaluated in the caller's
    /// environment.
    Invoke { invoked: Rc<Macro>, args: Vec<Arg> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    FieldName(usize),
    Annotations { start: usize, count: usize },
    Value(usize),
    End,
}

/// Interprets one range of template bytecode against bound arguments.
///
/// `i` is the next instruction to decode. Positioning on a value moves `i`
/// past the whole expression, so an unread value is skipped for free.
#[derive(Debug)]
pub struct TemplateReader {
    env: Rc<Env>,
    i: usize,
    end: usize,
    /// Index of the `CONTAINER_END` of each open container.
    limits: Vec<usize>,
    state: State,
}

impl TemplateReader {
    /// Evaluates the whole template body.
    pub fn new(env: Rc<Env>) -> Self {
        let end = env.template.bytecode.len();
        Self::with_range(env, 0, end)
    }

    /// Evaluates bytecode `start..end`, typically one argument of a nested
    /// invocation.
    pub fn with_range(env: Rc<Env>, start: usize, end: usize) -> Self {
        Self {
            env,
            i: start,
            end,
            limits: Vec::new(),
            state: State::Idle,
        }
    }

    fn code(&self) -> &[u32] {
        &self.env.template.bytecode
    }

    fn limit(&self) -> usize {
        self.limits.last().copied().unwrap_or(self.end)
    }

    fn constant(&self, index: u32) -> IonResult<&Constant> {
        match self.env.template.constants.get(index as usize) {
            Some(c) => Ok(c),
            None => malformed(format!("constant pool index {index} out of bounds")),
        }
    }

    fn value_word(&self) -> IonResult<(usize, u32)> {
        match self.state {
            State::Value(idx) => Ok((idx, word_at(self.code(), idx)?)),
            _ => usage("not positioned on a value"),
        }
    }

    /// Like `value_word`, but a second read of the same value is an error.
    fn take_value(&mut self) -> IonResult<(usize, u32)> {
        let value = self.value_word()?;
        self.state = State::Idle;
        Ok(value)
    }

    fn symbol_constant(&self, index: u32) -> IonResult<Symbol> {
        match self.constant(index)? {
            Constant::Symbol(symbol) => Ok(symbol.clone()),
            Constant::String(text) => Ok(Symbol::Text(text.clone())),
            other => malformed(format!("expected a symbol constant, found {other:?}")),
        }
    }

    fn system_symbol(address: u32) -> IonResult<Symbol> {
        match system_symbol_1_1(address as usize) {
            Some(text) => Ok(Symbol::from(text)),
            None => malformed(format!("system symbol {address} out of range")),
        }
    }

    fn token_for(&self, word: u32) -> IonResult<Token> {
        Ok(match bc::op(word) {
            bc::NULL_NULL | bc::NULL_TYPED => Token::Null,
            bc::BOOL => Token::Bool,
            bc::SMALL_INT | bc::INLINE_INT | bc::INLINE_LONG | bc::CP_BIG_INT => Token::Int,
            bc::INLINE_FLOAT | bc::INLINE_DOUBLE | bc::FLOAT_ZERO => Token::Float,
            bc::DECIMAL_ZERO | bc::CP_DECIMAL => Token::Decimal,
            bc::CP_TIMESTAMP => Token::Timestamp,
            bc::EMPTY_STRING | bc::CP_STRING => Token::String,
            bc::SYSTEM_SYMBOL | bc::UNKNOWN_SYMBOL | bc::CP_SYMBOL => Token::Symbol,
            bc::CP_BLOB => Token::Blob,
            bc::CP_CLOB => Token::Clob,
            bc::LIST_START => Token::List,
            bc::SEXP_START => Token::Sexp,
            bc::STRUCT_START => Token::Struct,
            bc::ARGUMENT_REF => Token::ExpressionGroup,
            bc::INVOKE => Token::MacroInvocation,
            op => return malformed(format!("unexpected instruction {op:#04x}")),
        })
    }

    /// Index just past the value at `i`, including its annotations.
    fn value_end(&self, mut i: usize) -> IonResult<usize> {
        while bc::op(word_at(self.code(), i)?) == bc::CP_ANNOTATION {
            i += 1;
        }
        Ok(i + bc::expression_len(self.code(), i)?)
    }

    /// Returns what the current `ExpressionGroup` or `MacroInvocation`
    /// token expands to.
    pub fn read_expansion(&mut self) -> IonResult<Expansion> {
        let (idx, word) = self.value_word()?;
        let expansion = match bc::op(word) {
            bc::ARGUMENT_REF => Expansion::Splice(self.argument(bc::data(word))?),
            bc::INVOKE => {
                let invoked = match self.constant(bc::data(word))? {
                    Constant::Macro(m) => m.clone(),
                    other => return malformed(format!("expected a macro constant, found {other:?}")),
                };
                let words = word_at(self.code(), idx + 1)? as usize;
                let end = idx + 2 + words;
                let mut args = Vec::with_capacity(invoked.signature.len());
                let mut block = idx + 2;
                while block < end {
                    let header = word_at(self.code(), block)?;
                    if bc::op(header) != bc::ARGUMENT {
                        return malformed("expected an argument block");
                    }
                    let close = block + bc::data(header) as usize;
                    args.push(self.argument_block(block + 1, close)?);
                    block = close + 1;
                }
                Expansion::Invoke { invoked, args }
            }
            _ => return usage("not positioned on an expansion"),
        };
        self.state = State::Idle;
        Ok(expansion)
    }

    fn argument(&self, index: u32) -> IonResult<Arg> {
        match self.env.args.get(index as usize) {
            Some(arg) => Ok(arg.clone()),
            None => malformed(format!("argument {index} out of bounds")),
        }
    }

    /// Binds the argument expressions in `start..close`, where `close` is
    /// the block's `ARGUMENT_END`.
    fn argument_block(&self, start: usize, close: usize) -> IonResult<Arg> {
        if bc::op(word_at(self.code(), close)?) != bc::ARGUMENT_END {
            return malformed("argument block is not terminated");
        }
        if start == close {
            return Ok(Arg::Absent);
        }
        let first = word_at(self.code(), start)?;
        if close == start + 1 && bc::op(first) == bc::ARGUMENT_REF {
            // A bare variable is forwarded as-is.
            return self.argument(bc::data(first));
        }
        Ok(Arg::Template {
            env: self.env.clone(),
            start,
            end: close,
        })
    }
}

impl TokenSource for TemplateReader {
    fn next_token(&mut self) -> IonResult<Token> {
        if self.state == State::End {
            return Ok(Token::End);
        }
        let limit = self.limit();
        if self.i >= limit {
            if self.limits.is_empty() {
                self.state = State::End;
            } else {
                self.state = State::Idle;
            }
            return Ok(Token::End);
        }
        let idx = self.i;
        let word = word_at(self.code(), idx)?;
        match bc::op(word) {
            bc::CP_FIELD_NAME | bc::SYSTEM_FIELD_NAME => {
                self.i = idx + 1;
                self.state = State::FieldName(idx);
                Ok(Token::FieldName)
            }
            bc::CP_ANNOTATION => {
                let mut count = 0;
                while bc::op(word_at(self.code(), idx + count)?) == bc::CP_ANNOTATION {
                    count += 1;
                }
                self.i = idx + count;
                self.state = State::Annotations { start: idx, count };
                Ok(Token::Annotations)
            }
            _ => {
                let token = self.token_for(word)?;
                let next = idx + bc::expression_len(self.code(), idx)?;
                if next > limit {
                    return malformed("template expression overruns its container");
                }
                self.i = next;
                self.state = State::Value(idx);
                Ok(token)
            }
        }
    }

    fn skip(&mut self) -> IonResult<()> {
        match self.state {
            State::FieldName(idx) => self.i = self.value_end(idx + 1)?,
            State::Annotations { start, count } => self.i = self.value_end(start + count)?,
            _ => {}
        }
        if self.state != State::End {
            self.state = State::Idle;
        }
        Ok(())
    }

    fn read_null(&mut self) -> IonResult<IonType> {
        let (_, word) = self.take_value()?;
        match bc::op(word) {
            bc::NULL_NULL => Ok(IonType::Null),
            bc::NULL_TYPED => match IonType::from_typed_null_code(bc::data(word) as u8) {
                Some(t) => Ok(t),
                None => malformed(format!("invalid typed null {}", bc::data(word))),
            },
            _ => usage("expected null"),
        }
    }

    fn read_bool(&mut self) -> IonResult<bool> {
        let (_, word) = self.take_value()?;
        match bc::op(word) {
            bc::BOOL => Ok(bc::data(word) != 0),
            _ => usage("expected bool"),
        }
    }

    fn read_int(&mut self) -> IonResult<i128> {
        let (idx, word) = self.take_value()?;
        match bc::op(word) {
            bc::SMALL_INT => Ok(bc::small_int(word) as i128),
            bc::INLINE_INT => Ok(word_at(self.code(), idx + 1)? as i32 as i128),
            bc::INLINE_LONG => Ok(bc::long_at(self.code(), idx + 1)? as i64 as i128),
            bc::CP_BIG_INT => match self.constant(bc::data(word))? {
                Constant::Int(i) => Ok(*i),
                other => malformed(format!("expected an int constant, found {other:?}")),
            },
            _ => usage("expected int"),
        }
    }

    fn read_float(&mut self) -> IonResult<f64> {
        let (idx, word) = self.take_value()?;
        match bc::op(word) {
            bc::FLOAT_ZERO => Ok(0.0),
            bc::INLINE_FLOAT => Ok(f32::from_bits(word_at(self.code(), idx + 1)?) as f64),
            bc::INLINE_DOUBLE => Ok(f64::from_bits(bc::long_at(self.code(), idx + 1)?)),
            _ => usage("expected float"),
        }
    }

    fn read_decimal(&mut self) -> IonResult<Decimal> {
        let (_, word) = self.take_value()?;
        match bc::op(word) {
            bc::DECIMAL_ZERO => Ok(Decimal::new(0, 0)),
            bc::CP_DECIMAL => match self.constant(bc::data(word))? {
                Constant::Decimal(d) => Ok(*d),
                other => malformed(format!("expected a decimal constant, found {other:?}")),
            },
            _ => usage("expected decimal"),
        }
    }

    fn read_timestamp(&mut self) -> IonResult<Timestamp> {
        let (_, word) = self.take_value()?;
        match bc::op(word) {
            bc::CP_TIMESTAMP => match self.constant(bc::data(word))? {
                Constant::Timestamp(ts) => Ok(*ts),
                other => malformed(format!("expected a timestamp constant, found {other:?}")),
            },
            _ => usage("expected timestamp"),
        }
    }

    fn read_string(&mut self) -> IonResult<Cow<'_, str>> {
        let (_, word) = self.take_value()?;
        match bc::op(word) {
            bc::EMPTY_STRING => Ok(Cow::Borrowed("")),
            bc::CP_STRING => match self.constant(bc::data(word))? {
                Constant::String(s) => Ok(Cow::Borrowed(&**s)),
                other => malformed(format!("expected a string constant, found {other:?}")),
            },
            _ => usage("expected string"),
        }
    }

    fn read_symbol(&mut self) -> IonResult<Symbol> {
        let (_, word) = self.take_value()?;
        match bc::op(word) {
            bc::SYSTEM_SYMBOL => Self::system_symbol(bc::data(word)),
            bc::UNKNOWN_SYMBOL => Ok(Symbol::Unknown(0)),
            bc::CP_SYMBOL => self.symbol_constant(bc::data(word)),
            _ => usage("expected symbol"),
        }
    }

    fn read_lob(&mut self) -> IonResult<Cow<'_, [u8]>> {
        let (_, word) = self.take_value()?;
        match bc::op(word) {
            bc::CP_BLOB | bc::CP_CLOB => match self.constant(bc::data(word))? {
                Constant::Lob(bytes) => Ok(Cow::Borrowed(&**bytes)),
                other => malformed(format!("expected a lob constant, found {other:?}")),
            },
            _ => usage("expected lob"),
        }
    }

    fn read_annotations(&mut self) -> IonResult<Vec<Symbol>> {
        let State::Annotations { start, count } = self.state else {
            return usage("not positioned on annotations");
        };
        (start..start + count)
            .map(|i| self.symbol_constant(bc::data(word_at(self.code(), i)?)))
            .collect()
    }

    fn read_field_name(&mut self) -> IonResult<Symbol> {
        let State::FieldName(idx) = self.state else {
            return usage("not positioned on a field name");
        };
        let word = word_at(self.code(), idx)?;
        match bc::op(word) {
            bc::SYSTEM_FIELD_NAME => Self::system_symbol(bc::data(word)),
            _ => self.symbol_constant(bc::data(word)),
        }
    }

    fn step_in(&mut self) -> IonResult<()> {
        let (idx, word) = self.value_word()?;
        if !matches!(bc::op(word), bc::LIST_START | bc::SEXP_START | bc::STRUCT_START) {
            return usage("not positioned on a container");
        }
        let close = idx + bc::data(word) as usize;
        if bc::op(word_at(self.code(), close)?) != bc::CONTAINER_END {
            return malformed("container is not terminated");
        }
        self.limits.push(close);
        self.i = idx + 1;
        self.state = State::Idle;
        Ok(())
    }

    fn step_out(&mut self) -> IonResult<()> {
        match self.limits.pop() {
            Some(close) => {
                self.i = close + 1;
                self.state = State::Idle;
                Ok(())
            }
            None => usage("step_out at depth 0"),
        }
    }

    fn depth(&self) -> usize {
        self.limits.len()
    }
}
