//! The expanding reader.
//!
//! [`IonReader`] drives a stack of token sources. The bottom frame is the
//! raw [`BinaryReader`] over the whole stream; every macro invocation it
//! meets pushes a frame that replays the expansion: a [`TemplateReader`]
//! for template macros, an [`ElementReader`] over the result of a built-in,
//! or a binary reader over an argument's bytes. A frame that runs out at
//! its own top level is popped, so consumers only ever see plain values.
//!
//! At the top level of the stream the reader also applies version markers,
//! local symbol tables and `$ion::` directives to its [`EncodingContext`].

use std::borrow::Cow;
use std::rc::Rc;

use crate::binary::BinaryReader;
use crate::context::EncodingContext;
use crate::element::{read_all, read_element, Element, ElementReader};
use crate::error::{malformed, usage, IonResult};
use crate::macros::{Arg, Env, Expansion, Macro, MacroKind, SystemMacro, TemplateReader};
use crate::options::ReaderOptions;
use crate::source::TokenSource;
use crate::types::{Decimal, IonType, Symbol, Timestamp, Token, Version};

enum Frame<'a> {
    Binary(BinaryReader<'a>),
    Template(TemplateReader),
    Elements(ElementReader),
}

impl Frame<'_> {
    fn source(&mut self) -> &mut dyn TokenSource {
        match self {
            Frame::Binary(reader) => reader,
            Frame::Template(reader) => reader,
            Frame::Elements(reader) => reader,
        }
    }

    fn depth(&self) -> usize {
        match self {
            Frame::Binary(reader) => reader.depth(),
            Frame::Template(reader) => reader.depth(),
            Frame::Elements(reader) => reader.depth(),
        }
    }
}

/// A token handed out before the top frame moved on to the one after it.
#[derive(Debug, Default)]
enum Slot {
    #[default]
    None,
    /// The top frame is positioned on `then`, the field's value.
    FieldName { name: Symbol, then: Token },
    /// Top-level annotations read ahead to look for directives. The top
    /// frame is positioned on the annotated value `then`.
    Annotations { annotations: Vec<Symbol>, then: Token },
}

/// Reads an Ion 1.0 or 1.1 binary stream with every macro expanded.
///
/// # Example
///
/// ```
/// use ion_core::{read_all, Element, IonReader};
///
/// // IVM, (:$ion::repeat 2 "a")
/// let data = [0xE0, 0x01, 0x01, 0xEA, 0xEF, 0x04, 0x01, 0x61, 0x02, 0x91, b'a'];
/// let values = read_all(&mut IonReader::new(&data)).unwrap();
/// assert_eq!(values, vec![Element::string("a"), Element::string("a")]);
/// ```
pub struct IonReader<'a> {
    data: &'a [u8],
    context: EncodingContext,
    frames: Vec<Frame<'a>>,
    /// Argument readers waiting to be reused.
    idle_readers: Vec<BinaryReader<'a>>,
    /// Field names whose values are expansions, with the index of the frame
    /// the field was read from.
    fields: Vec<(usize, Symbol)>,
    slot: Slot,
    /// The next token belongs to the value whose annotations were just
    /// handed out.
    after_prefix: bool,
    /// Index of the frame whose end is the end of the stream. Raised while
    /// a built-in's argument is materialized.
    base: usize,
    max_depth: usize,
}

impl std::fmt::Debug for IonReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IonReader")
            .field("version", &self.version())
            .field("frames", &self.frames.len())
            .field("depth", &self.depth())
            .finish()
    }
}

impl<'a> IonReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_options(data, ReaderOptions::default())
    }

    pub fn with_options(data: &'a [u8], options: ReaderOptions) -> Self {
        let base = BinaryReader::new(data, &options);
        Self {
            data,
            context: EncodingContext::new(&options),
            frames: vec![Frame::Binary(base)],
            idle_readers: Vec::new(),
            fields: Vec::new(),
            slot: Slot::None,
            after_prefix: false,
            base: 0,
            max_depth: options.max_depth,
        }
    }

    pub fn context(&self) -> &EncodingContext {
        &self.context
    }

    pub fn version(&self) -> Version {
        self.context.version()
    }

    fn top(&mut self) -> &mut dyn TokenSource {
        let top = self.frames.len() - 1;
        self.frames[top].source()
    }

    /// The top frame, once no look-ahead token is pending.
    fn value_source(&mut self) -> IonResult<&mut dyn TokenSource> {
        match self.slot {
            Slot::None => Ok(self.top()),
            _ => usage("not positioned on a value"),
        }
    }

    fn at_top_level(&self) -> bool {
        self.base == 0 && self.depth() == 0
    }

    /// Hands the current tables to the stream's tokenizer.
    fn publish_tables(&mut self) {
        if let Some(Frame::Binary(reader)) = self.frames.first_mut() {
            reader.set_tables(self.context.tables());
        }
    }

    fn pop_frame(&mut self) {
        if let Some(Frame::Binary(reader)) = self.frames.pop() {
            self.idle_readers.push(reader);
        }
        while self
            .fields
            .last()
            .is_some_and(|(owner, _)| owner + 1 >= self.frames.len())
        {
            self.fields.pop();
        }
    }

    /// The field name that a value at the top level of the top frame
    /// inherits from an enclosing invocation.
    fn inherited_field(&self) -> Option<Symbol> {
        let (owner, name) = self.fields.last()?;
        let expansion = self.frames.get(owner + 1..)?;
        if expansion.iter().all(|frame| frame.depth() == 0) {
            Some(name.clone())
        } else {
            None
        }
    }

    fn binary_frame(&mut self, tables: Rc<crate::Tables>, start: usize, end: usize) -> Frame<'a> {
        match self.idle_readers.pop() {
            Some(mut reader) => {
                reader.reset(tables, start, end);
                Frame::Binary(reader)
            }
            None => Frame::Binary(BinaryReader::over(self.data, tables, start, end, self.max_depth)),
        }
    }

    fn arg_frame(&mut self, arg: Arg) -> Option<Frame<'a>> {
        Some(match arg {
            Arg::Absent => return None,
            Arg::Raw { start, end, tables } => self.binary_frame(tables, start, end),
            Arg::Values(values) => Frame::Elements(ElementReader::new(values.to_vec())),
            Arg::Template { env, start, end } => Frame::Template(TemplateReader::with_range(env, start, end)),
        })
    }

    /// Reads everything an argument expands to.
    fn materialize(&mut self, arg: Arg) -> IonResult<Vec<Element>> {
        if let Arg::Values(values) = &arg {
            return Ok(values.to_vec());
        }
        let Some(frame) = self.arg_frame(arg) else {
            return Ok(Vec::new());
        };
        let base = self.base;
        let fields = std::mem::take(&mut self.fields);
        let after_prefix = std::mem::take(&mut self.after_prefix);
        self.frames.push(frame);
        self.base = self.frames.len() - 1;
        let result = read_all(&mut *self);
        while self.frames.len() > self.base {
            self.pop_frame();
        }
        self.base = base;
        self.fields = fields;
        self.after_prefix = after_prefix;
        self.slot = Slot::None;
        result
    }

    /// Replaces the invocation the top frame is positioned on with its
    /// expansion.
    fn expand(&mut self) -> IonResult<()> {
        let top = self.frames.len() - 1;
        let expansion = match &mut self.frames[top] {
            Frame::Binary(reader) => {
                let (invoked, args) = reader.read_eexp()?;
                Expansion::Invoke { invoked, args }
            }
            Frame::Template(reader) => reader.read_expansion()?,
            Frame::Elements(_) => return malformed("materialized values cannot hold invocations"),
        };
        match expansion {
            Expansion::Splice(arg) => {
                if let Some(frame) = self.arg_frame(arg) {
                    self.frames.push(frame);
                }
                Ok(())
            }
            Expansion::Invoke { invoked, args } => self.invoke(invoked, args),
        }
    }

    fn invoke(&mut self, invoked: Rc<Macro>, args: Vec<Arg>) -> IonResult<()> {
        tracing::trace!(name = invoked.name(), args = args.len(), "expanding macro");
        if self.at_top_level() {
            if let Some(
                system @ (SystemMacro::SetSymbols
                | SystemMacro::AddSymbols
                | SystemMacro::SetMacros
                | SystemMacro::AddMacros),
            ) = invoked.system
            {
                return self.apply_system(system, args);
            }
        }
        match &invoked.kind {
            MacroKind::Template(template) => {
                let env = Rc::new(Env {
                    template: template.clone(),
                    args,
                });
                self.frames.push(Frame::Template(TemplateReader::new(env)));
            }
            MacroKind::BuiltIn(f) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.materialize(arg)?);
                }
                let produced = f(values)?;
                self.frames.push(Frame::Elements(ElementReader::new(produced)));
            }
        }
        Ok(())
    }

    /// Top-level symbol and macro table updates go straight to the context.
    fn apply_system(&mut self, system: SystemMacro, args: Vec<Arg>) -> IonResult<()> {
        let mut values = Vec::new();
        for arg in args {
            values.extend(self.materialize(arg)?);
        }
        let texts = || {
            values
                .iter()
                .map(|value| value.as_text().map(Rc::from))
                .collect::<Vec<_>>()
        };
        match system {
            SystemMacro::SetSymbols => self.context.set_symbols(texts()),
            SystemMacro::AddSymbols => self.context.add_symbols(texts()),
            SystemMacro::SetMacros => self.context.set_macros(&values)?,
            _ => self.context.add_macros(&values)?,
        }
        self.publish_tables();
        Ok(())
    }

    /// Looks past top-level annotations for a local symbol table or a
    /// directive. Returns `None` when the value was consumed.
    fn top_level_annotations(&mut self) -> IonResult<Option<Token>> {
        let annotations = self.top().read_annotations()?;
        let then = self.top().next_token()?;
        let first = annotations.first().and_then(Symbol::as_text);
        let directive = match (first, then) {
            (Some("$ion_symbol_table"), Token::Struct) => true,
            (Some("$ion"), Token::Sexp) => self.version() == Version::V1_1,
            _ => false,
        };
        if !directive {
            self.slot = Slot::Annotations { annotations, then };
            return Ok(Some(Token::Annotations));
        }
        let value = read_element(&mut *self, then)?;
        if then == Token::Struct {
            self.context.legacy_symbol_table(&value)?;
        } else {
            self.context.directive(&value)?;
        }
        self.publish_tables();
        Ok(None)
    }
}

impl TokenSource for IonReader<'_> {
    fn next_token(&mut self) -> IonResult<Token> {
        match std::mem::take(&mut self.slot) {
            Slot::FieldName { then, .. } => {
                self.after_prefix = then == Token::Annotations;
                return Ok(then);
            }
            Slot::Annotations { then, .. } => {
                self.after_prefix = false;
                return Ok(then);
            }
            Slot::None => {}
        }
        let continuing = std::mem::take(&mut self.after_prefix);
        loop {
            let top = self.frames.len() - 1;
            let token = self.frames[top].source().next_token()?;
            match token {
                Token::End => {
                    if top > self.base && self.frames[top].depth() == 0 {
                        self.pop_frame();
                        continue;
                    }
                    return Ok(Token::End);
                }
                Token::MacroInvocation | Token::ExpressionGroup => {
                    self.expand()?;
                    continue;
                }
                Token::FieldName => {
                    let source = self.frames[top].source();
                    let name = source.read_field_name()?;
                    let then = source.next_token()?;
                    if matches!(then, Token::MacroInvocation | Token::ExpressionGroup) {
                        self.fields.push((top, name));
                        self.expand()?;
                        continue;
                    }
                    self.slot = Slot::FieldName { name, then };
                    return Ok(Token::FieldName);
                }
                Token::VersionMarker => {
                    let Frame::Binary(reader) = &mut self.frames[top] else {
                        return malformed("version marker inside an expansion");
                    };
                    let version = reader.read_version_marker()?;
                    if top != 0 {
                        return malformed("version marker inside a macro argument");
                    }
                    self.context.ivm(version)?;
                    self.publish_tables();
                    continue;
                }
                _ => {}
            }
            if !continuing && self.frames[top].depth() == 0 {
                if let Some(name) = self.inherited_field() {
                    self.slot = Slot::FieldName { name, then: token };
                    return Ok(Token::FieldName);
                }
            }
            if token == Token::Annotations {
                if self.at_top_level() {
                    match self.top_level_annotations()? {
                        Some(token) => return Ok(token),
                        None => continue,
                    }
                }
                self.after_prefix = true;
            }
            return Ok(token);
        }
    }

    fn skip(&mut self) -> IonResult<()> {
        self.slot = Slot::None;
        self.after_prefix = false;
        self.top().skip()
    }

    fn read_null(&mut self) -> IonResult<IonType> {
        self.value_source()?.read_null()
    }

    fn read_bool(&mut self) -> IonResult<bool> {
        self.value_source()?.read_bool()
    }

    fn read_int(&mut self) -> IonResult<i128> {
        self.value_source()?.read_int()
    }

    fn read_float(&mut self) -> IonResult<f64> {
        self.value_source()?.read_float()
    }

    fn read_decimal(&mut self) -> IonResult<Decimal> {
        self.value_source()?.read_decimal()
    }

    fn read_timestamp(&mut self) -> IonResult<Timestamp> {
        self.value_source()?.read_timestamp()
    }

    fn read_string(&mut self) -> IonResult<Cow<'_, str>> {
        self.value_source()?.read_string()
    }

    fn read_symbol(&mut self) -> IonResult<Symbol> {
        self.value_source()?.read_symbol()
    }

    fn read_lob(&mut self) -> IonResult<Cow<'_, [u8]>> {
        self.value_source()?.read_lob()
    }

    fn read_annotations(&mut self) -> IonResult<Vec<Symbol>> {
        match &self.slot {
            Slot::Annotations { annotations, .. } => Ok(annotations.clone()),
            Slot::FieldName { .. } => usage("not positioned on annotations"),
            Slot::None => self.top().read_annotations(),
        }
    }

    fn read_field_name(&mut self) -> IonResult<Symbol> {
        match &self.slot {
            Slot::FieldName { name, .. } => Ok(name.clone()),
            _ => usage("not positioned on a field name"),
        }
    }

    fn step_in(&mut self) -> IonResult<()> {
        if self.depth() >= self.max_depth {
            return malformed(format!("nesting exceeds the maximum depth of {}", self.max_depth));
        }
        self.value_source()?.step_in()
    }

    fn step_out(&mut self) -> IonResult<()> {
        self.slot = Slot::None;
        self.after_prefix = false;
        while self.frames.len() - 1 > self.base && self.frames[self.frames.len() - 1].depth() == 0 {
            self.pop_frame();
        }
        self.top().step_out()
    }

    fn depth(&self) -> usize {
        self.frames[self.base..].iter().map(Frame::depth).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;

    const IVM_1_1: [u8; 4] = [0xE0, 0x01, 0x01, 0xEA];

    fn v11(body: &[u8]) -> Vec<u8> {
        let mut data = IVM_1_1.to_vec();
        data.extend_from_slice(body);
        data
    }

    fn read(data: &[u8]) -> Vec<Element> {
        read_all(&mut IonReader::new(data)).unwrap()
    }

    #[test]
    fn version_markers_are_not_surfaced() {
        let data = v11(&[0x60, 0xE0, 0x01, 0x00, 0xEA, 0x21, 0x05]);
        let mut reader = IonReader::new(&data);
        assert_eq!(reader.next_token().unwrap(), Token::Int);
        assert_eq!(reader.version(), Version::V1_1);
        assert_eq!(reader.next_token().unwrap(), Token::Int);
        assert_eq!(reader.read_int().unwrap(), 5);
        assert_eq!(reader.version(), Version::V1_0);
        assert_eq!(reader.next_token().unwrap(), Token::End);
    }

    #[test]
    fn built_in_expands_in_place() {
        // [(:$ion::sum 1 2), 9]
        let data = v11(&[0xB8, 0xEF, 0x07, 0x61, 0x01, 0x61, 0x02, 0x61, 0x09]);
        assert_eq!(
            read(&data),
            vec![Element::list(vec![Element::int(3), Element::int(9)])]
        );
    }

    #[test]
    fn expansion_values_inherit_the_field_name() {
        // {name: (:$ion::values 1 2), version: 3}
        let data = v11(&[
            0xDC, 0x09, 0xEF, 0x01, 0x02, 0x09, 0x61, 0x01, 0x61, 0x02, 0x0B, 0x61, 0x03,
        ]);
        assert_eq!(
            read(&data),
            vec![Element::strukt(vec![
                ("name", Element::int(1)),
                ("name", Element::int(2)),
                ("version", Element::int(3)),
            ])]
        );
    }

    #[test]
    fn empty_expansion_drops_the_field() {
        // {name: (:$ion::none), version: 3}
        let data = v11(&[0xD6, 0x09, 0xEF, 0x00, 0x0B, 0x61, 0x03]);
        assert_eq!(
            read(&data),
            vec![Element::strukt(vec![("version", Element::int(3))])]
        );
    }

    #[test]
    fn add_symbols_short_circuits_into_the_context() {
        // (:$ion::add_symbols "foo"), then $66
        let data = v11(&[0xEF, 0x14, 0x01, 0x93, b'f', b'o', b'o', 0xE1, 0x42]);
        let mut reader = IonReader::new(&data);
        assert_eq!(reader.next_token().unwrap(), Token::Symbol);
        assert_eq!(reader.read_symbol().unwrap(), Symbol::from("foo"));
        assert_eq!(reader.context().tables().symbol_count(), 67);
    }

    #[test]
    fn step_out_abandons_an_expansion() {
        // [(:$ion::repeat 3 1)] 5
        let data = v11(&[0xB7, 0xEF, 0x04, 0x01, 0x61, 0x03, 0x61, 0x01, 0x61, 0x05]);
        let mut reader = IonReader::new(&data);
        assert_eq!(reader.next_token().unwrap(), Token::List);
        reader.step_in().unwrap();
        assert_eq!(reader.next_token().unwrap(), Token::Int);
        assert_eq!(reader.read_int().unwrap(), 1);
        reader.step_out().unwrap();
        assert_eq!(reader.depth(), 0);
        assert_eq!(reader.next_token().unwrap(), Token::Int);
        assert_eq!(reader.read_int().unwrap(), 5);
    }

    #[test]
    fn annotations_that_are_not_directives_pass_through() {
        // $ion::1
        let data = v11(&[0xE4, 0x03, 0x61, 0x01]);
        let values = read(&data);
        assert_eq!(values, vec![Element::int(1).with_annotations(vec!["$ion"])]);
        assert!(matches!(values[0].value, Value::Int(1)));
    }

    #[test]
    fn reading_past_a_field_name_is_a_usage_error() {
        let data = v11(&[0xD3, 0x09, 0x61, 0x01]);
        let mut reader = IonReader::new(&data);
        reader.next_token().unwrap();
        reader.step_in().unwrap();
        assert_eq!(reader.next_token().unwrap(), Token::FieldName);
        assert!(matches!(reader.read_int(), Err(crate::IonError::Usage(_))));
        assert_eq!(reader.read_field_name().unwrap(), Symbol::from("name"));
        assert_eq!(reader.next_token().unwrap(), Token::Int);
        assert_eq!(reader.read_int().unwrap(), 1);
    }
}
