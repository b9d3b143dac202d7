//! The Ion 1.1 system macro table.
//!
//! Most system macros are native functions; the ones that only rearrange
//! their arguments into a directive or a container are templates compiled
//! once per thread on first use.

use std::rc::Rc;

use crate::element::Element;
use crate::error::IonResult;

use super::builtins;
use super::compiler::MacroCompiler;
use super::{Cardinality, Macro, MacroKind, Parameter, SystemFn};

/// System macros by address in the `$ion` module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemMacro {
    None,
    Values,
    Default,
    Meta,
    Repeat,
    Flatten,
    Delta,
    Sum,
    Annotate,
    MakeString,
    MakeSymbol,
    MakeDecimal,
    MakeTimestamp,
    MakeBlob,
    MakeList,
    MakeSexp,
    MakeField,
    MakeStruct,
    ParseIon,
    SetSymbols,
    AddSymbols,
    SetMacros,
    AddMacros,
    Use,
}

impl SystemMacro {
    pub const ALL: [SystemMacro; 24] = [
        SystemMacro::None,
        SystemMacro::Values,
        SystemMacro::Default,
        SystemMacro::Meta,
        SystemMacro::Repeat,
        SystemMacro::Flatten,
        SystemMacro::Delta,
        SystemMacro::Sum,
        SystemMacro::Annotate,
        SystemMacro::MakeString,
        SystemMacro::MakeSymbol,
        SystemMacro::MakeDecimal,
        SystemMacro::MakeTimestamp,
        SystemMacro::MakeBlob,
        SystemMacro::MakeList,
        SystemMacro::MakeSexp,
        SystemMacro::MakeField,
        SystemMacro::MakeStruct,
        SystemMacro::ParseIon,
        SystemMacro::SetSymbols,
        SystemMacro::AddSymbols,
        SystemMacro::SetMacros,
        SystemMacro::AddMacros,
        SystemMacro::Use,
    ];

    pub fn address(self) -> usize {
        self as usize
    }

    pub fn from_address(address: usize) -> Option<Self> {
        Self::ALL.get(address).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            SystemMacro::None => "none",
            SystemMacro::Values => "values",
            SystemMacro::Default => "default",
            SystemMacro::Meta => "meta",
            SystemMacro::Repeat => "repeat",
            SystemMacro::Flatten => "flatten",
            SystemMacro::Delta => "delta",
            SystemMacro::Sum => "sum",
            SystemMacro::Annotate => "annotate",
            SystemMacro::MakeString => "make_string",
            SystemMacro::MakeSymbol => "make_symbol",
            SystemMacro::MakeDecimal => "make_decimal",
            SystemMacro::MakeTimestamp => "make_timestamp",
            SystemMacro::MakeBlob => "make_blob",
            SystemMacro::MakeList => "make_list",
            SystemMacro::MakeSexp => "make_sexp",
            SystemMacro::MakeField => "make_field",
            SystemMacro::MakeStruct => "make_struct",
            SystemMacro::ParseIon => "parse_ion",
            SystemMacro::SetSymbols => "set_symbols",
            SystemMacro::AddSymbols => "add_symbols",
            SystemMacro::SetMacros => "set_macros",
            SystemMacro::AddMacros => "add_macros",
            SystemMacro::Use => "use",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }
}

enum Body {
    Native(SystemFn, Vec<Parameter>),
    Template(Vec<Element>, Element),
}

fn p(name: &str, cardinality: Cardinality) -> Parameter {
    Parameter::tagged(name, cardinality)
}

fn sym(text: &str) -> Element {
    Element::symbol(text)
}

fn var(name: &str) -> Element {
    Element::sexp(vec![sym("%"), sym(name)])
}

fn invoke(name: &str, args: Vec<Element>) -> Element {
    let mut items = vec![sym("."), sym(name).with_annotations(vec!["$ion"])];
    items.extend(args);
    Element::sexp(items)
}

/// `$ion::(module _ clauses...)`
fn module(clauses: Vec<Element>) -> Element {
    let mut items = vec![sym("module"), sym("_")];
    items.extend(clauses);
    Element::sexp(items).with_annotations(vec!["$ion"])
}

fn clause(name: &str, items: Vec<Element>) -> Element {
    let mut sexp = vec![sym(name)];
    sexp.extend(items);
    Element::sexp(sexp)
}

fn body(m: SystemMacro) -> Body {
    use Cardinality::*;
    use SystemMacro as S;
    let native = |f: SystemFn, params: Vec<Parameter>| Body::Native(f, params);
    match m {
        S::None => native(builtins::none, vec![]),
        S::Values => Body::Template(vec![sym("values"), sym("*")], var("values")),
        S::Default => native(
            builtins::default,
            vec![p("expr", ZeroOrMore), p("default_expr", ZeroOrMore)],
        ),
        S::Meta => native(builtins::none, vec![p("anything", ZeroOrMore)]),
        S::Repeat => native(
            builtins::repeat,
            vec![p("n", ExactlyOne), p("value", ZeroOrMore)],
        ),
        S::Flatten => native(builtins::flatten, vec![p("sequences", ZeroOrMore)]),
        S::Delta => native(builtins::delta, vec![p("deltas", ZeroOrMore)]),
        S::Sum => native(builtins::sum, vec![p("a", ExactlyOne), p("b", ExactlyOne)]),
        S::Annotate => native(
            builtins::annotate,
            vec![p("annotations", ZeroOrMore), p("value", ExactlyOne)],
        ),
        S::MakeString => native(builtins::make_string, vec![p("content", ZeroOrMore)]),
        S::MakeSymbol => native(builtins::make_symbol, vec![p("content", ZeroOrMore)]),
        S::MakeDecimal => native(
            builtins::make_decimal,
            vec![p("coefficient", ExactlyOne), p("exponent", ExactlyOne)],
        ),
        S::MakeTimestamp => native(
            builtins::make_timestamp,
            vec![
                p("year", ExactlyOne),
                p("month", ZeroOrOne),
                p("day", ZeroOrOne),
                p("hour", ZeroOrOne),
                p("minute", ZeroOrOne),
                p("second", ZeroOrOne),
                p("offset_minutes", ZeroOrOne),
            ],
        ),
        S::MakeBlob => native(builtins::make_blob, vec![p("bytes", ZeroOrMore)]),
        S::MakeList => Body::Template(
            vec![sym("sequences"), sym("*")],
            Element::list(vec![invoke("flatten", vec![var("sequences")])]),
        ),
        S::MakeSexp => Body::Template(
            vec![sym("sequences"), sym("*")],
            Element::sexp(vec![invoke("flatten", vec![var("sequences")])]),
        ),
        S::MakeField => native(
            builtins::make_field,
            vec![p("field_name", ExactlyOne), p("value", ExactlyOne)],
        ),
        S::MakeStruct => native(builtins::make_struct, vec![p("structs", ZeroOrMore)]),
        S::ParseIon => native(builtins::parse_ion, vec![p("data", ZeroOrMore)]),
        S::SetSymbols => Body::Template(
            vec![sym("symbols"), sym("*")],
            module(vec![
                clause("macros", vec![sym("_")]),
                clause("symbols", vec![Element::list(vec![var("symbols")])]),
            ]),
        ),
        S::AddSymbols => Body::Template(
            vec![sym("symbols"), sym("*")],
            module(vec![
                clause("macros", vec![sym("_")]),
                clause("symbols", vec![sym("_"), Element::list(vec![var("symbols")])]),
            ]),
        ),
        S::SetMacros => Body::Template(
            vec![sym("macros"), sym("*")],
            module(vec![
                clause("macros", vec![var("macros")]),
                clause("symbols", vec![sym("_")]),
            ]),
        ),
        S::AddMacros => Body::Template(
            vec![sym("macros"), sym("*")],
            module(vec![
                clause("macros", vec![sym("_"), var("macros")]),
                clause("symbols", vec![sym("_")]),
            ]),
        ),
        S::Use => Body::Template(
            vec![sym("catalog_key"), sym("version"), sym("?")],
            module(vec![
                clause(
                    "import",
                    vec![sym("the_module"), var("catalog_key"), var("version")],
                ),
                clause("macros", vec![sym("_"), sym("the_module")]),
                clause("symbols", vec![sym("_"), sym("the_module")]),
            ]),
        ),
    }
}

fn build() -> IonResult<Rc<[Rc<Macro>]>> {
    let mut table: Vec<Rc<Macro>> = Vec::with_capacity(SystemMacro::ALL.len());
    for m in SystemMacro::ALL {
        let compiled = match body(m) {
            Body::Native(f, signature) => Macro {
                name: Some(Rc::from(m.name())),
                signature,
                kind: MacroKind::BuiltIn(f),
                system: Some(m),
            },
            Body::Template(params, template) => {
                let definition =
                    Element::sexp(vec![sym("macro"), sym(m.name()), Element::sexp(params), template]);
                let mut compiled = MacroCompiler::new(&table).compile(&definition)?;
                compiled.system = Some(m);
                compiled
            }
        };
        table.push(Rc::new(compiled));
    }
    Ok(table.into())
}

thread_local! {
    static SYSTEM_MACROS: IonResult<Rc<[Rc<Macro>]>> = build();
}

/// The system macros, indexed by address.
pub fn system_macros() -> IonResult<Rc<[Rc<Macro>]>> {
    SYSTEM_MACROS.with(Clone::clone)
}
