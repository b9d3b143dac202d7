//! Compiles `(macro name (signature...) body)` definitions to bytecode.
//!
//! Template bodies use the operator forms `(% name)` for a variable,
//! `(. name args...)` for an invocation and `(.. exprs...)` for an
//! expression group. Any other s-expression is a literal sexp.

use std::rc::Rc;

use crate::element::{Element, Value};
use crate::error::{IonError, IonResult};
use crate::symbols::system_symbol_1_1_address;
use crate::types::{IonType, Symbol};

use super::bytecode::{self, instruction};
use super::{Cardinality, Constant, Encoding, Macro, MacroKind, Parameter, Template};

const VARIABLE: &str = "%";
const INVOCATION: &str = ".";
const GROUP: &str = "..";

/// Resolves macro references made from template bodies.
pub trait MacroLookup {
    /// `module` is the qualifier of `$ion::name` style references.
    fn macro_named(&self, module: Option<&str>, name: &str) -> Option<Rc<Macro>>;
    fn macro_at(&self, module: Option<&str>, address: usize) -> Option<Rc<Macro>>;
}

impl MacroLookup for Vec<Rc<Macro>> {
    fn macro_named(&self, _module: Option<&str>, name: &str) -> Option<Rc<Macro>> {
        self.iter().rev().find(|m| m.name() == Some(name)).cloned()
    }

    fn macro_at(&self, _module: Option<&str>, address: usize) -> Option<Rc<Macro>> {
        self.get(address).cloned()
    }
}

fn fail<T>(msg: impl Into<String>) -> IonResult<T> {
    Err(IonError::MacroCompilationError(msg.into()))
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if matches!(text, "true" | "false" | "null" | "nan") {
        return false;
    }
    (first.is_ascii_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Symbol text, for places where only a plain symbol is acceptable.
fn symbol_text(element: &Element) -> Option<&str> {
    match &element.value {
        Value::Symbol(symbol) => symbol.as_text(),
        _ => None,
    }
}

/// Operator symbol at the head of a sexp, if any.
fn operator(items: &[Element]) -> Option<&str> {
    let head = items.first()?;
    match symbol_text(head)? {
        op @ (VARIABLE | INVOCATION | GROUP) => Some(op),
        _ => None,
    }
}

pub struct MacroCompiler<'m> {
    lookup: &'m dyn MacroLookup,
    signature: Vec<Parameter>,
    bytecode: Vec<u32>,
    constants: Vec<Constant>,
}

impl<'m> MacroCompiler<'m> {
    pub fn new(lookup: &'m dyn MacroLookup) -> Self {
        Self {
            lookup,
            signature: Vec::new(),
            bytecode: Vec::new(),
            constants: Vec::new(),
        }
    }

    /// Compiles one macro definition.
    pub fn compile(mut self, definition: &Element) -> IonResult<Macro> {
        let items = match &definition.value {
            Value::Sexp(items) if symbol_text_is(items.first(), "macro") => items,
            _ => return fail("macro definition must be a sexp starting with `macro`"),
        };
        if !definition.annotations.is_empty() {
            return fail("found annotations on a macro definition");
        }
        let name = match items.get(1) {
            Some(element) if !element.annotations.is_empty() => {
                return fail("found annotations on the macro name")
            }
            Some(Element {
                value: Value::Null(_),
                ..
            }) => None,
            Some(element) => match symbol_text(element) {
                Some(text) if is_identifier(text) => Some(Rc::<str>::from(text)),
                Some(text) => return fail(format!("invalid macro name: '{text}'")),
                None => return fail("macro name must be a symbol or null"),
            },
            None => return fail("macro definition is missing a name"),
        };
        match items.get(2) {
            Some(element) => self.read_signature(element)?,
            None => return fail("macro definition is missing a signature"),
        }
        match items.len() {
            0..=3 => return fail("macro definition is missing a template body expression"),
            4 => self.compile_expression(&items[3])?,
            _ => return fail("unexpected value after the template body expression"),
        }
        tracing::debug!(
            name = name.as_deref().unwrap_or("<anonymous>"),
            parameters = self.signature.len(),
            words = self.bytecode.len(),
            constants = self.constants.len(),
            "compiled macro",
        );
        Ok(Macro {
            name,
            signature: self.signature,
            kind: MacroKind::Template(Template {
                bytecode: self.bytecode.into(),
                constants: self.constants.into(),
            }),
            system: None,
        })
    }

    fn read_signature(&mut self, element: &Element) -> IonResult<()> {
        if !element.annotations.is_empty() {
            return fail("found annotations on the macro signature");
        }
        let Value::Sexp(params) = &element.value else {
            return fail("macro signature must be a sexp");
        };
        let mut pending: Option<Parameter> = None;
        for param in params {
            let Some(text) = symbol_text(param) else {
                return fail(format!("parameter must be a symbol; found {}", param.ion_type()));
            };
            if let Some(cardinality) = Cardinality::from_sigil(text) {
                if !param.annotations.is_empty() {
                    return fail("found annotations on a cardinality sigil");
                }
                match pending.take() {
                    Some(mut p) => {
                        p.cardinality = cardinality;
                        self.signature.push(p);
                    }
                    None => return fail("found an orphaned cardinality in macro signature"),
                }
                continue;
            }
            if let Some(p) = pending.take() {
                self.signature.push(p);
            }
            let encoding = match param.annotations.as_slice() {
                [] => Encoding::Tagged,
                [single] => match single.as_text().and_then(Encoding::from_name) {
                    Some(encoding) => encoding,
                    None => return fail(format!("unsupported parameter encoding {single}")),
                },
                _ => return fail(format!("parameter '{text}' has more than one encoding")),
            };
            if !is_identifier(text) {
                return fail(format!("invalid parameter name: '{text}'"));
            }
            let redeclared = self.signature.iter().any(|p| &*p.name == text)
                || pending.as_ref().is_some_and(|p| &*p.name == text);
            if redeclared {
                return fail(format!("redeclaration of parameter '{text}'"));
            }
            pending = Some(Parameter::new(text, encoding, Cardinality::ExactlyOne));
        }
        if let Some(p) = pending {
            self.signature.push(p);
        }
        Ok(())
    }

    fn constant(&mut self, constant: Constant) -> IonResult<u32> {
        let index = self.constants.len();
        if index > bytecode::MAX_DATA as usize {
            return fail("constant pool is full");
        }
        self.constants.push(constant);
        Ok(index as u32)
    }

    fn emit(&mut self, op: u8, data: u32) {
        self.bytecode.push(instruction(op, data));
    }

    /// Reserves a header word whose operand is patched by [`Self::close`].
    fn open(&mut self, op: u8) -> usize {
        self.bytecode.push(instruction(op, 0));
        self.bytecode.len() - 1
    }

    fn close(&mut self, header: usize) -> IonResult<()> {
        let words = self.bytecode.len() - header - 1;
        if words > bytecode::MAX_DATA as usize {
            return fail("template body is too large");
        }
        let op = bytecode::op(self.bytecode[header]);
        self.bytecode[header] = instruction(op, words as u32);
        Ok(())
    }

    fn compile_expression(&mut self, element: &Element) -> IonResult<()> {
        if let Value::Sexp(items) = &element.value {
            match operator(items) {
                Some(VARIABLE) => return self.compile_variable(element, items),
                Some(INVOCATION) => return self.compile_invocation(element, items),
                Some(_) => return fail("expression group is only allowed as a macro argument"),
                None => {}
            }
        }
        for annotation in &element.annotations {
            let index = self.constant(Constant::Symbol(annotation.clone()))?;
            self.emit(bytecode::CP_ANNOTATION, index);
        }
        self.compile_value(&element.value)
    }

    fn compile_value(&mut self, value: &Value) -> IonResult<()> {
        match value {
            Value::Null(IonType::Null) => self.emit(bytecode::NULL_NULL, 0),
            Value::Null(ion_type) => {
                let code = ion_type.typed_null_code().unwrap_or_default();
                self.emit(bytecode::NULL_TYPED, code as u32);
            }
            Value::Bool(b) => self.emit(bytecode::BOOL, *b as u32),
            Value::Int(i) => self.compile_int(*i)?,
            Value::Float(f) => {
                if *f == 0.0 && f.is_sign_positive() {
                    self.emit(bytecode::FLOAT_ZERO, 0);
                } else if (*f as f32) as f64 == *f || f.is_nan() {
                    self.emit(bytecode::INLINE_FLOAT, 0);
                    self.bytecode.push((*f as f32).to_bits());
                } else {
                    self.emit(bytecode::INLINE_DOUBLE, 0);
                    bytecode::push_long(&mut self.bytecode, f.to_bits());
                }
            }
            Value::Decimal(d) => {
                if d.coefficient == 0 && d.exponent == 0 && !d.negative_zero {
                    self.emit(bytecode::DECIMAL_ZERO, 0);
                } else {
                    let index = self.constant(Constant::Decimal(*d))?;
                    self.emit(bytecode::CP_DECIMAL, index);
                }
            }
            Value::Timestamp(ts) => {
                let index = self.constant(Constant::Timestamp(*ts))?;
                self.emit(bytecode::CP_TIMESTAMP, index);
            }
            Value::String(s) if s.is_empty() => self.emit(bytecode::EMPTY_STRING, 0),
            Value::String(s) => {
                let index = self.constant(Constant::String(Rc::from(s.as_str())))?;
                self.emit(bytecode::CP_STRING, index);
            }
            Value::Symbol(Symbol::Unknown(0)) => self.emit(bytecode::UNKNOWN_SYMBOL, 0),
            Value::Symbol(symbol) => match symbol.as_text().and_then(system_symbol_1_1_address) {
                Some(address) => self.emit(bytecode::SYSTEM_SYMBOL, address as u32),
                None => {
                    let index = self.constant(Constant::Symbol(symbol.clone()))?;
                    self.emit(bytecode::CP_SYMBOL, index);
                }
            },
            Value::Blob(bytes) => {
                let index = self.constant(Constant::Lob(Rc::from(bytes.as_slice())))?;
                self.emit(bytecode::CP_BLOB, index);
            }
            Value::Clob(bytes) => {
                let index = self.constant(Constant::Lob(Rc::from(bytes.as_slice())))?;
                self.emit(bytecode::CP_CLOB, index);
            }
            Value::List(items) | Value::Sexp(items) => {
                let op = if matches!(value, Value::List(_)) {
                    bytecode::LIST_START
                } else {
                    bytecode::SEXP_START
                };
                let header = self.open(op);
                for item in items {
                    self.compile_expression(item)?;
                }
                self.emit(bytecode::CONTAINER_END, 0);
                self.close(header)?;
            }
            Value::Struct(fields) => {
                let header = self.open(bytecode::STRUCT_START);
                for (name, value) in fields {
                    match name.as_text().and_then(system_symbol_1_1_address) {
                        Some(address) => self.emit(bytecode::SYSTEM_FIELD_NAME, address as u32),
                        None => {
                            let index = self.constant(Constant::Symbol(name.clone()))?;
                            self.emit(bytecode::CP_FIELD_NAME, index);
                        }
                    }
                    self.compile_expression(value)?;
                }
                self.emit(bytecode::CONTAINER_END, 0);
                self.close(header)?;
            }
        }
        Ok(())
    }

    fn compile_int(&mut self, value: i128) -> IonResult<()> {
        if (bytecode::SMALL_INT_MIN..=bytecode::SMALL_INT_MAX).contains(&value) {
            self.emit(bytecode::SMALL_INT, value as i32 as u32);
        } else if let Ok(v) = i32::try_from(value) {
            self.emit(bytecode::INLINE_INT, 0);
            self.bytecode.push(v as u32);
        } else if let Ok(v) = i64::try_from(value) {
            self.emit(bytecode::INLINE_LONG, 0);
            bytecode::push_long(&mut self.bytecode, v as u64);
        } else {
            let index = self.constant(Constant::Int(value))?;
            self.emit(bytecode::CP_BIG_INT, index);
        }
        Ok(())
    }

    fn compile_variable(&mut self, sexp: &Element, items: &[Element]) -> IonResult<()> {
        if !sexp.annotations.is_empty() || !items[0].annotations.is_empty() {
            return fail("variable expansion may not be annotated");
        }
        let name = match items {
            [_, name] => name,
            _ => return fail("variable expansion should contain only the variable name"),
        };
        if !name.annotations.is_empty() {
            return fail("found annotations on a variable reference");
        }
        let Some(text) = symbol_text(name) else {
            return fail("variable names must be symbols");
        };
        match self.signature.iter().position(|p| &*p.name == text) {
            Some(index) => {
                self.emit(bytecode::ARGUMENT_REF, index as u32);
                Ok(())
            }
            None => fail(format!("variable '{text}' is not recognized")),
        }
    }

    fn resolve(&self, reference: &Element) -> IonResult<Rc<Macro>> {
        let module = match reference.annotations.as_slice() {
            [] => None,
            [module] => module.as_text(),
            _ => return fail("macro reference has more than one qualifier"),
        };
        let found = match &reference.value {
            Value::Symbol(symbol) => match symbol.as_text() {
                Some(name) => self.lookup.macro_named(module, name),
                None => return fail("macro reference has unknown text"),
            },
            Value::Int(address) => match usize::try_from(*address) {
                Ok(address) => self.lookup.macro_at(module, address),
                Err(_) => return fail(format!("macro address must be non-negative: {address}")),
            },
            other => {
                return fail(format!(
                    "macro invocation must start with an address or a name; found {}",
                    other.ion_type()
                ))
            }
        };
        match found {
            Some(m) => Ok(m),
            None => fail(format!("unrecognized macro: {:?}", reference.value)),
        }
    }

    fn compile_invocation(&mut self, sexp: &Element, items: &[Element]) -> IonResult<()> {
        if !sexp.annotations.is_empty() || !items[0].annotations.is_empty() {
            return fail("macro invocation may not be annotated");
        }
        let Some(reference) = items.get(1) else {
            return fail("macro invocation is missing a macro reference");
        };
        let invoked = self.resolve(reference)?;
        let args = &items[2..];
        let params = &invoked.signature;
        let label = invoked.name().unwrap_or("<anonymous>").to_owned();

        let variadic_tail = params.last().is_some_and(|p| p.cardinality.allows_many());
        if args.len() > params.len() && !variadic_tail {
            return fail(format!(
                "too many arguments for '{label}': expected {}, found {}",
                params.len(),
                args.len()
            ));
        }
        if let Some(p) = params.iter().skip(args.len()).find(|p| !p.cardinality.allows_none()) {
            return fail(format!("too few arguments for '{label}': missing '{}'", p.name));
        }

        let index = self.constant(Constant::Macro(invoked.clone()))?;
        self.emit(bytecode::INVOKE, index);
        let count_at = self.bytecode.len();
        self.bytecode.push(0);
        for (i, param) in params.iter().enumerate() {
            let header = self.open(bytecode::ARGUMENT);
            let bound: &[Element] = if i + 1 == params.len() && variadic_tail {
                args.get(i..).unwrap_or_default()
            } else {
                args.get(i..i + 1).unwrap_or_default()
            };
            for arg in bound {
                self.compile_argument(param, arg, bound.len() > 1)?;
            }
            self.emit(bytecode::ARGUMENT_END, 0);
            self.close(header)?;
        }
        self.bytecode[count_at] = (self.bytecode.len() - count_at - 1) as u32;
        Ok(())
    }

    fn compile_argument(&mut self, param: &Parameter, arg: &Element, in_tail: bool) -> IonResult<()> {
        let group = match &arg.value {
            Value::Sexp(items) if operator(items) == Some(GROUP) => Some(items),
            _ => None,
        };
        let Some(items) = group else {
            return self.compile_expression(arg);
        };
        if !arg.annotations.is_empty() || !items[0].annotations.is_empty() {
            return fail("expression group may not be annotated");
        }
        if param.cardinality == Cardinality::ExactlyOne {
            return fail(format!(
                "expression group is not allowed for exactly-one parameter '{}'",
                param.name
            ));
        }
        if in_tail {
            return fail("expression group cannot be mixed with other trailing arguments");
        }
        for item in &items[1..] {
            self.compile_expression(item)?;
        }
        Ok(())
    }
}

fn symbol_text_is(element: Option<&Element>, text: &str) -> bool {
    element.and_then(symbol_text) == Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macros::bytecode::*;

    fn sym(text: &str) -> Element {
        Element::symbol(text)
    }

    fn sexp(items: Vec<Element>) -> Element {
        Element::sexp(items)
    }

    fn var(name: &str) -> Element {
        sexp(vec![sym("%"), sym(name)])
    }

    fn definition(name: &str, params: Vec<Element>, body: Vec<Element>) -> Element {
        let mut items = vec![sym("macro"), sym(name), sexp(params)];
        items.extend(body);
        sexp(items)
    }

    fn compile(def: &Element) -> IonResult<Macro> {
        MacroCompiler::new(&Vec::<Rc<Macro>>::new()).compile(def)
    }

    fn bytecode_of(m: &Macro) -> Vec<u32> {
        match &m.kind {
            MacroKind::Template(t) => t.bytecode.to_vec(),
            MacroKind::BuiltIn(_) => panic!("expected a template"),
        }
    }

    fn assert_error(def: Element, needle: &str) {
        match compile(&def) {
            Err(IonError::MacroCompilationError(msg)) => {
                assert!(msg.contains(needle), "{msg:?} does not mention {needle:?}")
            }
            other => panic!("expected a compilation error, got {other:?}"),
        }
    }

    #[test]
    fn list_with_variable() {
        let def = definition(
            "foo",
            vec![sym("x")],
            vec![Element::list(vec![Element::int(100), var("x")])],
        );
        let m = compile(&def).unwrap();
        assert_eq!(m.name(), Some("foo"));
        assert_eq!(
            bytecode_of(&m),
            vec![
                instruction(LIST_START, 3),
                instruction(SMALL_INT, 100),
                instruction(ARGUMENT_REF, 0),
                instruction(CONTAINER_END, 0),
            ]
        );
    }

    #[test]
    fn signature_encodings_and_cardinalities() {
        let def = definition(
            "m",
            vec![
                sym("a").with_annotations(vec!["flex_uint"]),
                sym("b"),
                sym("*"),
                sym("c"),
                sym("?"),
            ],
            vec![Element::null()],
        );
        let m = compile(&def).unwrap();
        let shapes: Vec<_> = m
            .signature
            .iter()
            .map(|p| (&*p.name, p.encoding, p.cardinality))
            .collect();
        assert_eq!(
            shapes,
            vec![
                ("a", Encoding::FlexUInt, Cardinality::ExactlyOne),
                ("b", Encoding::Tagged, Cardinality::ZeroOrMore),
                ("c", Encoding::Tagged, Cardinality::ZeroOrOne),
            ]
        );
        assert_eq!(m.presence_bytes(), 1);
    }

    #[test]
    fn scalars_pick_compact_forms() {
        let def = definition(
            "m",
            vec![],
            vec![Element::list(vec![
                Element::int(1 << 30),
                Element::int(1 << 40),
                Element::int(1 << 70),
                Element::float(0.0),
                Element::float(1.5),
                Element::float(0.1),
                Element::string(""),
                sym("name"),
            ])],
        );
        let code = bytecode_of(&compile(&def).unwrap());
        let ops: Vec<u8> = {
            let mut i = 1;
            let mut ops = Vec::new();
            while i < code.len() {
                ops.push(op(code[i]));
                i += expression_len(&code, i).unwrap();
            }
            ops
        };
        assert_eq!(
            ops,
            vec![
                INLINE_INT,
                INLINE_LONG,
                CP_BIG_INT,
                FLOAT_ZERO,
                INLINE_FLOAT,
                INLINE_DOUBLE,
                EMPTY_STRING,
                SYSTEM_SYMBOL,
                CONTAINER_END,
            ]
        );
    }

    #[test]
    fn invocation_of_an_earlier_macro() {
        let inner = Rc::new(
            compile(&definition("inner", vec![sym("x"), sym("*")], vec![var("x")])).unwrap(),
        );
        let table = vec![inner];
        let def = definition(
            "outer",
            vec![sym("y")],
            vec![sexp(vec![sym("."), sym("inner"), Element::int(1), var("y")])],
        );
        let m = MacroCompiler::new(&table).compile(&def).unwrap();
        assert_eq!(
            bytecode_of(&m),
            vec![
                instruction(INVOKE, 0),
                4,
                instruction(ARGUMENT, 3),
                instruction(SMALL_INT, 1),
                instruction(ARGUMENT_REF, 0),
                instruction(ARGUMENT_END, 0),
            ]
        );
    }

    #[test]
    fn missing_optional_arguments_are_empty_blocks() {
        let inner = Rc::new(
            compile(&definition("inner", vec![sym("a"), sym("b"), sym("?")], vec![var("a")]))
                .unwrap(),
        );
        let table = vec![inner];
        let def = definition(
            "outer",
            vec![],
            vec![sexp(vec![sym("."), sym("inner"), Element::bool(true)])],
        );
        let m = MacroCompiler::new(&table).compile(&def).unwrap();
        assert_eq!(
            bytecode_of(&m),
            vec![
                instruction(INVOKE, 0),
                5,
                instruction(ARGUMENT, 2),
                instruction(BOOL, 1),
                instruction(ARGUMENT_END, 0),
                instruction(ARGUMENT, 1),
                instruction(ARGUMENT_END, 0),
            ]
        );
    }

    #[test]
    fn rejects_malformed_definitions() {
        assert_error(Element::list(vec![]), "must be a sexp");
        assert_error(
            definition("m", vec![sym("x"), sym("x")], vec![Element::null()]),
            "redeclaration",
        );
        assert_error(definition("m", vec![sym("*")], vec![Element::null()]), "orphaned");
        assert_error(
            definition("m", vec![Element::int(1)], vec![Element::null()]),
            "parameter must be a symbol",
        );
        assert_error(
            definition(
                "m",
                vec![sym("x").with_annotations(vec!["bogus"])],
                vec![Element::null()],
            ),
            "unsupported parameter encoding",
        );
        assert_error(
            definition(
                "m",
                vec![sym("x").with_annotations(vec!["int8", "int16"])],
                vec![Element::null()],
            ),
            "more than one encoding",
        );
        assert_error(definition("m", vec![sym("true")], vec![Element::null()]), "invalid parameter name");
        assert_error(definition("m", vec![], vec![]), "missing a template body");
        assert_error(
            definition("m", vec![], vec![Element::null(), Element::null()]),
            "unexpected value after",
        );
        assert_error(definition("m", vec![], vec![var("nope")]), "not recognized");
        assert_error(
            definition("m", vec![], vec![sexp(vec![sym("."), sym("nope")])]),
            "unrecognized macro",
        );
        assert_error(
            definition("m", vec![], vec![sexp(vec![sym(".."), Element::int(1)])]),
            "only allowed as a macro argument",
        );
        assert_error(
            definition(
                "m",
                vec![sym("x")],
                vec![var("x").with_annotations(vec!["a"])],
            ),
            "may not be annotated",
        );
    }

    #[test]
    fn rejects_bad_names() {
        let annotated = sexp(vec![
            sym("macro"),
            sym("m").with_annotations(vec!["a"]),
            sexp(vec![]),
            Element::null(),
        ]);
        assert_error(annotated, "annotations on the macro name");
        let numeric = sexp(vec![sym("macro"), Element::int(3), sexp(vec![]), Element::null()]);
        assert_error(numeric, "symbol or null");
        let anonymous = sexp(vec![
            sym("macro"),
            Element::null(),
            sexp(vec![]),
            Element::int(1),
        ]);
        assert_eq!(compile(&anonymous).unwrap().name(), None);
    }

    #[test]
    fn argument_count_is_checked() {
        let inner = Rc::new(compile(&definition("one", vec![sym("x")], vec![var("x")])).unwrap());
        let table = vec![inner];
        let too_many = definition(
            "m",
            vec![],
            vec![sexp(vec![sym("."), sym("one"), Element::int(1), Element::int(2)])],
        );
        let err = MacroCompiler::new(&table).compile(&too_many).unwrap_err();
        assert!(err.to_string().contains("too many"));
        let too_few = definition("m", vec![], vec![sexp(vec![sym("."), sym("one")])]);
        let err = MacroCompiler::new(&table).compile(&too_few).unwrap_err();
        assert!(err.to_string().contains("too few"));
        let group = definition(
            "m",
            vec![],
            vec![sexp(vec![
                sym("."),
                sym("one"),
                sexp(vec![sym(".."), Element::int(1)]),
            ])],
        );
        let err = MacroCompiler::new(&table).compile(&group).unwrap_err();
        assert!(err.to_string().contains("exactly-one"));
    }
}
