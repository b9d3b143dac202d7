//! Macro definitions, the template compiler and the evaluation engine.

pub mod builtins;
pub mod bytecode;
pub mod compiler;
pub mod system;
pub mod template;

use std::fmt;
use std::rc::Rc;

use crate::context::Tables;
use crate::element::Element;
use crate::error::IonResult;
use crate::types::{Decimal, Symbol, Timestamp};

pub use compiler::{MacroCompiler, MacroLookup};
pub use system::{system_macros, SystemMacro};
pub use template::{Expansion, TemplateReader};

/// How many values a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    ExactlyOne,
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
}

impl Cardinality {
    pub fn from_sigil(sigil: &str) -> Option<Self> {
        Some(match sigil {
            "!" => Cardinality::ExactlyOne,
            "?" => Cardinality::ZeroOrOne,
            "*" => Cardinality::ZeroOrMore,
            "+" => Cardinality::OneOrMore,
            _ => return None,
        })
    }

    pub fn sigil(self) -> &'static str {
        match self {
            Cardinality::ExactlyOne => "!",
            Cardinality::ZeroOrOne => "?",
            Cardinality::ZeroOrMore => "*",
            Cardinality::OneOrMore => "+",
        }
    }

    pub fn allows_none(self) -> bool {
        matches!(self, Cardinality::ZeroOrOne | Cardinality::ZeroOrMore)
    }

    pub fn allows_many(self) -> bool {
        matches!(self, Cardinality::ZeroOrMore | Cardinality::OneOrMore)
    }
}

/// Binary encoding of a parameter's argument in an e-expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Tagged,
    FlexSym,
    FlexInt,
    FlexUInt,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float16,
    Float32,
    Float64,
}

impl Encoding {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "flex_symbol" => Encoding::FlexSym,
            "flex_int" => Encoding::FlexInt,
            "flex_uint" => Encoding::FlexUInt,
            "int8" => Encoding::Int8,
            "int16" => Encoding::Int16,
            "int32" => Encoding::Int32,
            "int64" => Encoding::Int64,
            "uint8" => Encoding::UInt8,
            "uint16" => Encoding::UInt16,
            "uint32" => Encoding::UInt32,
            "uint64" => Encoding::UInt64,
            "float16" => Encoding::Float16,
            "float32" => Encoding::Float32,
            "float64" => Encoding::Float64,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Encoding::Tagged => "tagged",
            Encoding::FlexSym => "flex_symbol",
            Encoding::FlexInt => "flex_int",
            Encoding::FlexUInt => "flex_uint",
            Encoding::Int8 => "int8",
            Encoding::Int16 => "int16",
            Encoding::Int32 => "int32",
            Encoding::Int64 => "int64",
            Encoding::UInt8 => "uint8",
            Encoding::UInt16 => "uint16",
            Encoding::UInt32 => "uint32",
            Encoding::UInt64 => "uint64",
            Encoding::Float16 => "float16",
            Encoding::Float32 => "float32",
            Encoding::Float64 => "float64",
        }
    }

    pub fn is_tagged(self) -> bool {
        self == Encoding::Tagged
    }

    /// Byte width of fixed-size encodings.
    pub fn fixed_width(self) -> Option<usize> {
        Some(match self {
            Encoding::Int8 | Encoding::UInt8 => 1,
            Encoding::Int16 | Encoding::UInt16 | Encoding::Float16 => 2,
            Encoding::Int32 | Encoding::UInt32 | Encoding::Float32 => 4,
            Encoding::Int64 | Encoding::UInt64 | Encoding::Float64 => 8,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: Rc<str>,
    pub encoding: Encoding,
    pub cardinality: Cardinality,
}

impl Parameter {
    pub fn new(name: &str, encoding: Encoding, cardinality: Cardinality) -> Self {
        Self {
            name: Rc::from(name),
            encoding,
            cardinality,
        }
    }

    pub fn tagged(name: &str, cardinality: Cardinality) -> Self {
        Self::new(name, Encoding::Tagged, cardinality)
    }

    /// Whether the e-expression encodes presence bits for this parameter.
    pub fn has_presence_bits(&self) -> bool {
        self.cardinality != Cardinality::ExactlyOne
    }
}

/// Native implementation of a built-in macro. Receives each argument fully
/// materialized and returns the produced values.
pub type SystemFn = fn(Vec<Vec<Element>>) -> IonResult<Vec<Element>>;

/// Compiled template body.
#[derive(Debug, Clone)]
pub struct Template {
    pub bytecode: Rc<[u32]>,
    pub constants: Rc<[Constant]>,
}

/// Constant pool entry.
#[derive(Debug, Clone)]
pub enum Constant {
    Int(i128),
    Decimal(Decimal),
    Timestamp(Timestamp),
    String(Rc<str>),
    Symbol(Symbol),
    Lob(Rc<[u8]>),
    Macro(Rc<Macro>),
}

#[derive(Clone)]
pub enum MacroKind {
    BuiltIn(SystemFn),
    Template(Template),
}

impl fmt::Debug for MacroKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MacroKind::BuiltIn(_) => f.write_str("BuiltIn"),
            MacroKind::Template(t) => f
                .debug_struct("Template")
                .field("bytecode", &t.bytecode.len())
                .field("constants", &t.constants.len())
                .finish(),
        }
    }
}

/// A macro definition.
#[derive(Debug, Clone)]
pub struct Macro {
    pub name: Option<Rc<str>>,
    pub signature: Vec<Parameter>,
    pub kind: MacroKind,
    /// Set for the macros of the system module.
    pub system: Option<SystemMacro>,
}

impl Macro {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Number of presence-bit bytes an e-expression of this macro carries.
    pub fn presence_bytes(&self) -> usize {
        let params = self
            .signature
            .iter()
            .filter(|p| p.has_presence_bits())
            .count();
        (params * 2).div_ceil(8)
    }
}

/// Variables bound for one template evaluation.
#[derive(Debug)]
pub struct Env {
    pub template: Template,
    pub args: Vec<Arg>,
}

/// One argument captured at invocation, read only when referenced.
#[derive(Debug, Clone)]
pub enum Arg {
    Absent,
    /// Tagged values in `data[start..end]` of the stream being read.
    Raw {
        start: usize,
        end: usize,
        tables: Rc<Tables>,
    },
    /// Already decoded values.
    Values(Rc<[Element]>),
    /// Bytecode `start..end` of the caller's template, evaluated in the
    /// caller's environment.
    Template {
        env: Rc<Env>,
        start: usize,
        end: usize,
    },
}

impl Arg {
    pub fn values(values: Vec<Element>) -> Self {
        if values.is_empty() {
            Arg::Absent
        } else {
            Arg::Values(values.into())
        }
    }
}
