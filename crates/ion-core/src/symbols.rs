//! System symbol tables.

use std::rc::Rc;

use crate::address_map::AddressMap;

/// Symbol table slot: text, or `None` for a slot without declared text.
pub type SymbolText = Option<Rc<str>>;

/// Ion 1.0 system symbols, SIDs 1..=9.
pub const SYSTEM_SYMBOLS_1_0: [&str; 9] = [
    "$ion",
    "$ion_1_0",
    "$ion_symbol_table",
    "name",
    "version",
    "imports",
    "symbols",
    "max_id",
    "$ion_shared_symbol_table",
];

/// Ion 1.1 system symbols, addresses 1..=65 of the system module.
pub const SYSTEM_SYMBOLS_1_1: [&str; 65] = [
    "$ion",
    "$ion_1_0",
    "$ion_symbol_table",
    "name",
    "version",
    "imports",
    "symbols",
    "max_id",
    "$ion_shared_symbol_table",
    "encoding",
    "$ion_literal",
    "$ion_shared_module",
    "macro",
    "macro_table",
    "symbol_table",
    "module",
    "retain",
    "export",
    "catalog_key",
    "import",
    "",
    "literal",
    "if_none",
    "if_some",
    "if_single",
    "if_multi",
    "for",
    "default",
    "values",
    "annotate",
    "make_string",
    "make_symbol",
    "make_blob",
    "make_decimal",
    "make_timestamp",
    "make_list",
    "make_sexp",
    "make_struct",
    "parse_ion",
    "repeat",
    "delta",
    "flatten",
    "sum",
    "set_symbols",
    "add_symbols",
    "set_macros",
    "add_macros",
    "use",
    "meta",
    "flex_symbol",
    "flex_int",
    "flex_uint",
    "uint8",
    "uint16",
    "uint32",
    "uint64",
    "int8",
    "int16",
    "int32",
    "int64",
    "float16",
    "float32",
    "float64",
    "none",
    "make_field",
];

pub const SID_ION: usize = 1;
pub const SID_ION_SYMBOL_TABLE: usize = 3;
pub const SID_NAME: usize = 4;
pub const SID_VERSION: usize = 5;
pub const SID_IMPORTS: usize = 6;
pub const SID_SYMBOLS: usize = 7;
pub const SID_MAX_ID: usize = 8;

/// Text of the Ion 1.1 system symbol at `address`, if any.
pub fn system_symbol_1_1(address: usize) -> Option<&'static str> {
    address
        .checked_sub(1)
        .and_then(|i| SYSTEM_SYMBOLS_1_1.get(i).copied())
}

/// Address of `text` in the Ion 1.1 system symbol table.
pub fn system_symbol_1_1_address(text: &str) -> Option<usize> {
    SYSTEM_SYMBOLS_1_1
        .iter()
        .position(|s| *s == text)
        .map(|i| i + 1)
}

/// The Ion 1.0 symbol table in effect right after a version marker:
/// `$0` followed by the system symbols.
pub fn symbol_table_1_0(capacity: usize) -> AddressMap<SymbolText> {
    let mut map = AddressMap::with_capacity(capacity);
    map.assign(None);
    for text in SYSTEM_SYMBOLS_1_0 {
        map.assign(Some(Rc::from(text)));
    }
    map
}

/// The default module's symbols right after an Ion 1.1 version marker:
/// `$0` followed by the 1.1 system symbols.
pub fn symbol_table_1_1(capacity: usize) -> AddressMap<SymbolText> {
    let mut map = AddressMap::with_capacity(capacity);
    map.assign(None);
    for text in SYSTEM_SYMBOLS_1_1 {
        map.assign(Some(Rc::from(text)));
    }
    map
}
