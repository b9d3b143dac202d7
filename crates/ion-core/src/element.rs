//! A minimal value tree and the materializer that builds it from tokens.
//!
//! Elements are the exchange format between the token-level machinery and
//! the parts that need whole values: directives, built-in macros, the
//! writers and tests.

use std::borrow::Cow;

use crate::error::{malformed, usage, IonResult};
use crate::source::TokenSource;
use crate::types::{Decimal, IonType, Symbol, Timestamp, Token};

/// An annotated Ion value.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub annotations: Vec<Symbol>,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null(IonType),
    Bool(bool),
    Int(i128),
    Float(f64),
    Decimal(Decimal),
    Timestamp(Timestamp),
    String(String),
    Symbol(Symbol),
    Blob(Vec<u8>),
    Clob(Vec<u8>),
    List(Vec<Element>),
    Sexp(Vec<Element>),
    Struct(Vec<(Symbol, Element)>),
}

impl Value {
    pub fn ion_type(&self) -> IonType {
        match self {
            Value::Null(_) => IonType::Null,
            Value::Bool(_) => IonType::Bool,
            Value::Int(_) => IonType::Int,
            Value::Float(_) => IonType::Float,
            Value::Decimal(_) => IonType::Decimal,
            Value::Timestamp(_) => IonType::Timestamp,
            Value::String(_) => IonType::String,
            Value::Symbol(_) => IonType::Symbol,
            Value::Blob(_) => IonType::Blob,
            Value::Clob(_) => IonType::Clob,
            Value::List(_) => IonType::List,
            Value::Sexp(_) => IonType::Sexp,
            Value::Struct(_) => IonType::Struct,
        }
    }

    fn token(&self) -> Token {
        match self {
            Value::Null(_) => Token::Null,
            Value::Bool(_) => Token::Bool,
            Value::Int(_) => Token::Int,
            Value::Float(_) => Token::Float,
            Value::Decimal(_) => Token::Decimal,
            Value::Timestamp(_) => Token::Timestamp,
            Value::String(_) => Token::String,
            Value::Symbol(_) => Token::Symbol,
            Value::Blob(_) => Token::Blob,
            Value::Clob(_) => Token::Clob,
            Value::List(_) => Token::List,
            Value::Sexp(_) => Token::Sexp,
            Value::Struct(_) => Token::Struct,
        }
    }
}

impl From<Value> for Element {
    fn from(value: Value) -> Self {
        Element {
            annotations: Vec::new(),
            value,
        }
    }
}

impl Element {
    pub fn null() -> Self {
        Value::Null(IonType::Null).into()
    }

    pub fn bool(value: bool) -> Self {
        Value::Bool(value).into()
    }

    pub fn int(value: i128) -> Self {
        Value::Int(value).into()
    }

    pub fn float(value: f64) -> Self {
        Value::Float(value).into()
    }

    pub fn string(value: &str) -> Self {
        Value::String(value.to_owned()).into()
    }

    pub fn symbol(text: &str) -> Self {
        Value::Symbol(Symbol::from(text)).into()
    }

    pub fn list(items: Vec<Element>) -> Self {
        Value::List(items).into()
    }

    pub fn sexp(items: Vec<Element>) -> Self {
        Value::Sexp(items).into()
    }

    pub fn strukt<S: Into<Symbol>>(fields: Vec<(S, Element)>) -> Self {
        Value::Struct(fields.into_iter().map(|(k, v)| (k.into(), v)).collect()).into()
    }

    pub fn with_annotations<S: Into<Symbol>>(mut self, annotations: Vec<S>) -> Self {
        self.annotations = annotations.into_iter().map(Into::into).collect();
        self
    }

    pub fn ion_type(&self) -> IonType {
        self.value.ion_type()
    }

    pub fn is_null(&self) -> bool {
        matches!(self.value, Value::Null(_))
    }

    /// Symbol or string text, if this is one.
    pub fn as_text(&self) -> Option<&str> {
        match &self.value {
            Value::String(text) => Some(text),
            Value::Symbol(symbol) => symbol.as_text(),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self.value {
            Value::Int(i) => Some(i),
            _ => None,
        }
    }

    /// Children of a list or sexp.
    pub fn as_sequence(&self) -> Option<&[Element]> {
        match &self.value {
            Value::List(items) | Value::Sexp(items) => Some(items),
            _ => None,
        }
    }

    pub fn has_annotation(&self, text: &str) -> bool {
        self.annotations.iter().any(|a| a.as_text() == Some(text))
    }
}

/// Reads the value whose first token is `token` into an [`Element`].
pub fn read_element<S: TokenSource + ?Sized>(source: &mut S, token: Token) -> IonResult<Element> {
    let mut token = token;
    let mut annotations = Vec::new();
    if token == Token::Annotations {
        annotations = source.read_annotations()?;
        token = source.next_token()?;
    }
    let value = match token {
        Token::Null => Value::Null(source.read_null()?),
        Token::Bool => Value::Bool(source.read_bool()?),
        Token::Int => Value::Int(source.read_int()?),
        Token::Float => Value::Float(source.read_float()?),
        Token::Decimal => Value::Decimal(source.read_decimal()?),
        Token::Timestamp => Value::Timestamp(source.read_timestamp()?),
        Token::String => Value::String(source.read_string()?.into_owned()),
        Token::Symbol => Value::Symbol(source.read_symbol()?),
        Token::Blob => Value::Blob(source.read_lob()?.into_owned()),
        Token::Clob => Value::Clob(source.read_lob()?.into_owned()),
        Token::List | Token::Sexp => {
            source.step_in()?;
            let mut items = Vec::new();
            loop {
                let child = source.next_token()?;
                if child == Token::End {
                    break;
                }
                items.push(read_element(source, child)?);
            }
            source.step_out()?;
            if token == Token::List {
                Value::List(items)
            } else {
                Value::Sexp(items)
            }
        }
        Token::Struct => {
            source.step_in()?;
            let mut fields = Vec::new();
            loop {
                let child = source.next_token()?;
                if child == Token::End {
                    break;
                }
                if child != Token::FieldName {
                    return malformed(format!("expected a field name, found {child:?}"));
                }
                let name = source.read_field_name()?;
                let child = source.next_token()?;
                fields.push((name, read_element(source, child)?));
            }
            source.step_out()?;
            Value::Struct(fields)
        }
        other => return usage(format!("cannot materialize a {other:?} token")),
    };
    Ok(Element { annotations, value })
}

/// Reads every remaining value at the current depth.
pub fn read_all<S: TokenSource + ?Sized>(source: &mut S) -> IonResult<Vec<Element>> {
    let mut out = Vec::new();
    loop {
        let token = source.next_token()?;
        if token == Token::End {
            return Ok(out);
        }
        out.push(read_element(source, token)?);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    FieldName,
    Annotations,
    Value,
    End,
}

#[derive(Debug)]
struct Level {
    items: Vec<(Option<Symbol>, Element)>,
    index: Option<usize>,
}

/// Replays a sequence of [`Element`]s as tokens.
#[derive(Debug)]
pub struct ElementReader {
    stack: Vec<Level>,
    phase: Phase,
}

impl ElementReader {
    pub fn new(values: Vec<Element>) -> Self {
        Self {
            stack: vec![Level {
                items: values.into_iter().map(|e| (None, e)).collect(),
                index: None,
            }],
            phase: Phase::Idle,
        }
    }

    fn current(&self) -> Option<&(Option<Symbol>, Element)> {
        let level = self.stack.last()?;
        level.items.get(level.index?)
    }

    fn value(&self) -> IonResult<&Value> {
        if self.phase != Phase::Value {
            return usage("not positioned on a value");
        }
        match self.current() {
            Some((_, element)) => Ok(&element.value),
            None => usage("not positioned on a value"),
        }
    }

    fn advance(&mut self) -> Token {
        let Some(level) = self.stack.last_mut() else {
            return Token::End;
        };
        let next = level.index.map_or(0, |i| i + 1);
        if next >= level.items.len() {
            level.index = Some(level.items.len());
            self.phase = Phase::End;
            return Token::End;
        }
        level.index = Some(next);
        let (field, element) = &level.items[next];
        if field.is_some() {
            self.phase = Phase::FieldName;
            Token::FieldName
        } else if !element.annotations.is_empty() {
            self.phase = Phase::Annotations;
            Token::Annotations
        } else {
            self.phase = Phase::Value;
            element.value.token()
        }
    }
}

impl TokenSource for ElementReader {
    fn next_token(&mut self) -> IonResult<Token> {
        let token = match self.phase {
            Phase::End => Token::End,
            Phase::Idle | Phase::Value => self.advance(),
            Phase::FieldName => match self.current() {
                Some((_, element)) if !element.annotations.is_empty() => {
                    self.phase = Phase::Annotations;
                    Token::Annotations
                }
                Some((_, element)) => {
                    let token = element.value.token();
                    self.phase = Phase::Value;
                    token
                }
                None => Token::End,
            },
            Phase::Annotations => match self.current() {
                Some((_, element)) => {
                    let token = element.value.token();
                    self.phase = Phase::Value;
                    token
                }
                None => Token::End,
            },
        };
        Ok(token)
    }

    fn skip(&mut self) -> IonResult<()> {
        if matches!(self.phase, Phase::FieldName | Phase::Annotations) {
            self.phase = Phase::Value;
        }
        Ok(())
    }

    fn read_null(&mut self) -> IonResult<IonType> {
        match self.value()? {
            Value::Null(t) => Ok(*t),
            other => usage(format!("expected null, found {}", other.ion_type())),
        }
    }

    fn read_bool(&mut self) -> IonResult<bool> {
        match self.value()? {
            Value::Bool(b) => Ok(*b),
            other => usage(format!("expected bool, found {}", other.ion_type())),
        }
    }

    fn read_int(&mut self) -> IonResult<i128> {
        match self.value()? {
            Value::Int(i) => Ok(*i),
            other => usage(format!("expected int, found {}", other.ion_type())),
        }
    }

    fn read_float(&mut self) -> IonResult<f64> {
        match self.value()? {
            Value::Float(f) => Ok(*f),
            other => usage(format!("expected float, found {}", other.ion_type())),
        }
    }

    fn read_decimal(&mut self) -> IonResult<Decimal> {
        match self.value()? {
            Value::Decimal(d) => Ok(*d),
            other => usage(format!("expected decimal, found {}", other.ion_type())),
        }
    }

    fn read_timestamp(&mut self) -> IonResult<Timestamp> {
        match self.value()? {
            Value::Timestamp(t) => Ok(*t),
            other => usage(format!("expected timestamp, found {}", other.ion_type())),
        }
    }

    fn read_string(&mut self) -> IonResult<Cow<'_, str>> {
        match self.value()? {
            Value::String(s) => Ok(Cow::Borrowed(s.as_str())),
            other => usage(format!("expected string, found {}", other.ion_type())),
        }
    }

    fn read_symbol(&mut self) -> IonResult<Symbol> {
        match self.value()? {
            Value::Symbol(s) => Ok(s.clone()),
            other => usage(format!("expected symbol, found {}", other.ion_type())),
        }
    }

    fn read_lob(&mut self) -> IonResult<Cow<'_, [u8]>> {
        match self.value()? {
            Value::Blob(b) | Value::Clob(b) => Ok(Cow::Borrowed(b.as_slice())),
            other => usage(format!("expected lob, found {}", other.ion_type())),
        }
    }

    fn read_annotations(&mut self) -> IonResult<Vec<Symbol>> {
        if self.phase != Phase::Annotations {
            return usage("not positioned on annotations");
        }
        Ok(self
            .current()
            .map(|(_, e)| e.annotations.clone())
            .unwrap_or_default())
    }

    fn read_field_name(&mut self) -> IonResult<Symbol> {
        if self.phase != Phase::FieldName {
            return usage("not positioned on a field name");
        }
        match self.current() {
            Some((Some(name), _)) => Ok(name.clone()),
            _ => usage("not positioned on a field name"),
        }
    }

    fn step_in(&mut self) -> IonResult<()> {
        let items = match self.value()? {
            Value::List(items) | Value::Sexp(items) => {
                items.iter().map(|e| (None, e.clone())).collect()
            }
            Value::Struct(fields) => fields
                .iter()
                .map(|(k, v)| (Some(k.clone()), v.clone()))
                .collect(),
            other => return usage(format!("cannot step into {}", other.ion_type())),
        };
        self.stack.push(Level { items, index: None });
        self.phase = Phase::Idle;
        Ok(())
    }

    fn step_out(&mut self) -> IonResult<()> {
        if self.stack.len() <= 1 {
            return usage("step_out at depth 0");
        }
        self.stack.pop();
        self.phase = Phase::Value;
        Ok(())
    }

    fn depth(&self) -> usize {
        self.stack.len().saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_reads_back_the_same_tree() {
        let values = vec![
            Element::int(1).with_annotations(vec!["a", "b"]),
            Element::strukt(vec![
                ("x", Element::list(vec![Element::bool(true), Element::null()])),
                ("y", Element::string("hi").with_annotations(vec!["z"])),
            ]),
        ];
        let mut reader = ElementReader::new(values.clone());
        assert_eq!(read_all(&mut reader).unwrap(), values);
        assert_eq!(reader.next_token().unwrap(), Token::End);
    }

    #[test]
    fn unread_containers_are_skipped() {
        let mut reader = ElementReader::new(vec![
            Element::list(vec![Element::int(1), Element::int(2)]),
            Element::int(3),
        ]);
        assert_eq!(reader.next_token().unwrap(), Token::List);
        assert_eq!(reader.next_token().unwrap(), Token::Int);
        assert_eq!(reader.read_int().unwrap(), 3);
    }

    #[test]
    fn step_out_mid_container() {
        let mut reader = ElementReader::new(vec![
            Element::sexp(vec![Element::int(1), Element::int(2)]),
            Element::symbol("s"),
        ]);
        reader.next_token().unwrap();
        reader.step_in().unwrap();
        assert_eq!(reader.depth(), 1);
        assert_eq!(reader.next_token().unwrap(), Token::Int);
        reader.step_out().unwrap();
        assert_eq!(reader.next_token().unwrap(), Token::Symbol);
        assert_eq!(reader.read_symbol().unwrap(), Symbol::from("s"));
    }

    #[test]
    fn wrong_type_is_usage_error() {
        let mut reader = ElementReader::new(vec![Element::int(1)]);
        reader.next_token().unwrap();
        assert!(matches!(reader.read_bool(), Err(crate::IonError::Usage(_))));
    }
}
