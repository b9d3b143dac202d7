//! Symbol and macro tables across version markers and directives.
//!
//! The [`EncodingContext`] owns the default module and publishes it to
//! readers as an immutable [`Tables`] snapshot. Updates go through
//! `Rc::make_mut`, so a reader still holding an older snapshot keeps seeing
//! the tables that were in effect when its data was written.

use std::collections::HashMap;
use std::rc::Rc;

use crate::address_map::AddressMap;
use crate::catalog::Catalog;
use crate::element::{Element, Value};
use crate::error::{malformed, unimplemented, IonResult};
use crate::macros::{system_macros, Macro, MacroCompiler, MacroLookup};
use crate::options::ReaderOptions;
use crate::symbols::{self, SymbolText};
use crate::types::{Symbol, Version};

const DEFAULT_MODULE: &str = "_";
const SYSTEM_MODULE: &str = "$ion";

/// A named pair of a symbol table and a macro table.
#[derive(Debug, Clone)]
pub struct Module {
    name: Rc<str>,
    symbols: AddressMap<SymbolText>,
    macro_names: AddressMap<Option<Rc<str>>>,
    macros: Vec<Rc<Macro>>,
}

impl Module {
    /// An empty module. Address 0 of the symbol table is the `$0` slot.
    pub fn new(name: &str, capacity: usize) -> Self {
        let mut symbols = AddressMap::with_capacity(capacity);
        symbols.assign(None);
        Self {
            name: Rc::from(name),
            symbols,
            macro_names: AddressMap::new(),
            macros: Vec::new(),
        }
    }

    fn with_symbols(name: &str, symbols: AddressMap<SymbolText>) -> Self {
        Self {
            name: Rc::from(name),
            symbols,
            macro_names: AddressMap::new(),
            macros: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbols(&self) -> &AddressMap<SymbolText> {
        &self.symbols
    }

    pub fn macros(&self) -> &[Rc<Macro>] {
        &self.macros
    }

    pub fn add_symbol(&mut self, text: SymbolText) -> usize {
        self.symbols.assign(text)
    }

    /// Symbols after the `$0` slot.
    fn user_symbols(&self) -> impl Iterator<Item = &SymbolText> + '_ {
        self.symbols.keys().skip(1)
    }

    pub fn add_macro(&mut self, definition: Rc<Macro>) -> usize {
        self.macro_names.assign(definition.name.clone());
        self.macros.push(definition);
        self.macros.len() - 1
    }

    pub fn macro_named(&self, name: &str) -> Option<Rc<Macro>> {
        let address = self.macro_names.get(&Some(Rc::from(name)))?;
        self.macros.get(address).cloned()
    }

    fn from_shared(name: &str, shared: &crate::catalog::SharedTable, capacity: usize) -> Self {
        let mut module = Module::new(name, capacity);
        for text in &shared.symbols {
            module.add_symbol(text.clone());
        }
        module
    }
}

/// The symbol and macro tables in effect at some point of a stream.
#[derive(Debug, Clone)]
pub struct Tables {
    version: Version,
    default: Module,
    system: Rc<[Rc<Macro>]>,
}

impl Tables {
    pub fn v1_0(capacity: usize) -> Self {
        Self {
            version: Version::V1_0,
            default: Module::with_symbols(DEFAULT_MODULE, symbols::symbol_table_1_0(capacity)),
            system: Rc::from(Vec::new()),
        }
    }

    /// Ion 1.1 tables right after a version marker: the system symbols and
    /// the system macros are in the default module.
    pub fn v1_1(capacity: usize) -> IonResult<Self> {
        let system = system_macros()?;
        let mut default =
            Module::with_symbols(DEFAULT_MODULE, symbols::symbol_table_1_1(capacity));
        for m in system.iter() {
            default.add_macro(m.clone());
        }
        Ok(Self {
            version: Version::V1_1,
            default,
            system,
        })
    }

    pub fn new(version: Version, capacity: usize) -> IonResult<Self> {
        match version {
            Version::V1_0 => Ok(Self::v1_0(capacity)),
            Version::V1_1 => Self::v1_1(capacity),
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn default_module(&self) -> &Module {
        &self.default
    }

    pub fn symbol_count(&self) -> usize {
        self.default.symbols.len()
    }

    /// Resolves a symbol ID against the default module.
    pub fn symbol(&self, sid: usize) -> IonResult<Symbol> {
        match self.default.symbols.key(sid) {
            Some(slot) => Ok(Symbol::from_slot(sid, slot)),
            None => malformed(format!(
                "symbol ID {sid} is out of range (table has {})",
                self.default.symbols.len()
            )),
        }
    }

    /// The macro at `address` of the default module.
    pub fn macro_at(&self, address: usize) -> IonResult<Rc<Macro>> {
        match self.default.macros.get(address) {
            Some(m) => Ok(m.clone()),
            None => malformed(format!("no macro at address {address}")),
        }
    }

    /// Whether every symbol ID and macro address of `earlier` still means the
    /// same thing here.
    pub fn extends(&self, earlier: &Tables) -> bool {
        self.version == earlier.version
            && self.default.symbols.is_extension_of(&earlier.default.symbols)
            && self.default.macro_names.is_extension_of(&earlier.default.macro_names)
    }

    pub fn system_macro(&self, address: usize) -> IonResult<Rc<Macro>> {
        match self.system.get(address) {
            Some(m) => Ok(m.clone()),
            None => malformed(format!("no system macro at address {address}")),
        }
    }

    fn module_mut(&mut self) -> &mut Module {
        &mut self.default
    }
}

impl MacroLookup for Tables {
    fn macro_named(&self, module: Option<&str>, name: &str) -> Option<Rc<Macro>> {
        if module == Some(SYSTEM_MODULE) {
            return self.system.iter().find(|m| m.name() == Some(name)).cloned();
        }
        self.default
            .macro_named(name)
            .or_else(|| self.system.iter().find(|m| m.name() == Some(name)).cloned())
    }

    fn macro_at(&self, module: Option<&str>, address: usize) -> Option<Rc<Macro>> {
        if module == Some(SYSTEM_MODULE) {
            self.system.get(address).cloned()
        } else {
            self.default.macros.get(address).cloned()
        }
    }
}

/// Resolves names against the definitions of the group being compiled
/// first, then against the tables.
struct GroupLookup<'a> {
    group: &'a [Rc<Macro>],
    tables: &'a Tables,
}

impl MacroLookup for GroupLookup<'_> {
    fn macro_named(&self, module: Option<&str>, name: &str) -> Option<Rc<Macro>> {
        if module.is_none() {
            if let Some(m) = self.group.iter().rev().find(|m| m.name() == Some(name)) {
                return Some(m.clone());
            }
        }
        self.tables.macro_named(module, name)
    }

    fn macro_at(&self, module: Option<&str>, address: usize) -> Option<Rc<Macro>> {
        MacroLookup::macro_at(self.tables, module, address)
    }
}

/// Position of a clause in a module definition; clauses must come in this
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Clause {
    Import,
    Module,
    Macros,
    Symbols,
}

fn clause_kind(name: &str) -> Option<Clause> {
    Some(match name {
        "import" => Clause::Import,
        "module" => Clause::Module,
        "macros" | "macro_table" => Clause::Macros,
        "symbols" | "symbol_table" => Clause::Symbols,
        _ => return None,
    })
}

fn text_of(element: &Element) -> Option<&str> {
    element.as_text()
}

/// Splits a sexp into its keyword and the remaining items.
fn keyword(element: &Element) -> Option<(&str, &[Element])> {
    let Value::Sexp(items) = &element.value else {
        return None;
    };
    let (head, rest) = items.split_first()?;
    match &head.value {
        Value::Symbol(symbol) => Some((symbol.as_text()?, rest)),
        _ => None,
    }
}

/// Tracks the active encoding across version markers and directives.
pub struct EncodingContext {
    tables: Rc<Tables>,
    /// Named modules defined or imported at the top level.
    modules: HashMap<Rc<str>, Module>,
    catalog: Option<Rc<dyn Catalog>>,
    capacity: usize,
}

impl std::fmt::Debug for EncodingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodingContext")
            .field("tables", &self.tables)
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for EncodingContext {
    fn default() -> Self {
        Self::new(&ReaderOptions::default())
    }
}

impl EncodingContext {
    /// Starts in Ion 1.0, the encoding of a stream without a version marker.
    pub fn new(options: &ReaderOptions) -> Self {
        Self {
            tables: Rc::new(Tables::v1_0(options.symbol_table_capacity)),
            modules: HashMap::new(),
            catalog: options.catalog.clone(),
            capacity: options.symbol_table_capacity,
        }
    }

    /// The current snapshot.
    pub fn tables(&self) -> Rc<Tables> {
        self.tables.clone()
    }

    pub fn version(&self) -> Version {
        self.tables.version
    }

    fn publish(&self, reason: &'static str) {
        tracing::trace!(
            reason,
            symbols = self.tables.symbol_count(),
            macros = self.tables.default.macros.len(),
            "table snapshot published",
        );
    }

    /// Resets every table for a version marker.
    pub fn ivm(&mut self, version: Version) -> IonResult<()> {
        tracing::debug!(?version, "version marker");
        self.tables = Rc::new(Tables::new(version, self.capacity)?);
        self.modules.clear();
        self.publish("version marker");
        Ok(())
    }

    /// Appends symbols to the default module.
    pub fn add_symbols<I: IntoIterator<Item = SymbolText>>(&mut self, symbols: I) {
        let module = Rc::make_mut(&mut self.tables).module_mut();
        let before = module.symbols.len();
        for text in symbols {
            module.add_symbol(text);
        }
        tracing::debug!(added = module.symbols.len() - before, "add_symbols");
        self.publish("add_symbols");
    }

    /// Replaces the default module's symbols.
    pub fn set_symbols<I: IntoIterator<Item = SymbolText>>(&mut self, symbols: I) {
        let module = Rc::make_mut(&mut self.tables).module_mut();
        // Keep the $0 slot.
        module.symbols.truncate(1);
        for text in symbols {
            module.add_symbol(text);
        }
        tracing::debug!(symbols = module.symbols.len(), "set_symbols");
        self.publish("set_symbols");
    }

    fn compile_group(&self, definitions: &[Element]) -> IonResult<Vec<Rc<Macro>>> {
        let mut group = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let lookup = GroupLookup {
                group: &group,
                tables: &self.tables,
            };
            let compiled = MacroCompiler::new(&lookup).compile(definition)?;
            group.push(Rc::new(compiled));
        }
        Ok(group)
    }

    /// Compiles `(macro ...)` definitions and appends them to the default
    /// module. Nothing changes if any definition fails to compile.
    pub fn add_macros(&mut self, definitions: &[Element]) -> IonResult<()> {
        let group = self.compile_group(definitions)?;
        let module = Rc::make_mut(&mut self.tables).module_mut();
        for m in group {
            module.add_macro(m);
        }
        tracing::debug!(macros = module.macros.len(), "add_macros");
        self.publish("add_macros");
        Ok(())
    }

    /// Compiles `(macro ...)` definitions and makes them the default
    /// module's only macros.
    pub fn set_macros(&mut self, definitions: &[Element]) -> IonResult<()> {
        let group = self.compile_group(definitions)?;
        let module = Rc::make_mut(&mut self.tables).module_mut();
        module.macro_names.clear();
        module.macros.clear();
        for m in group {
            module.add_macro(m);
        }
        tracing::debug!(macros = module.macros.len(), "set_macros");
        self.publish("set_macros");
        Ok(())
    }

    /// Applies a `$ion_symbol_table::{imports, symbols, max_id}` struct.
    pub fn legacy_symbol_table(&mut self, table: &Element) -> IonResult<()> {
        let Value::Struct(fields) = &table.value else {
            return malformed("a local symbol table must be a struct");
        };
        let mut append = false;
        let mut imports: Vec<SymbolText> = Vec::new();
        let mut declared: Vec<SymbolText> = Vec::new();
        let mut seen_imports = false;
        let mut seen_symbols = false;
        for (name, value) in fields {
            match name.as_text() {
                Some("imports") => {
                    if seen_imports {
                        return malformed("duplicate imports field in a local symbol table");
                    }
                    seen_imports = true;
                    match &value.value {
                        Value::Symbol(s) if s.as_text() == Some("$ion_symbol_table") => {
                            append = true
                        }
                        Value::List(items) => {
                            for import in items {
                                self.resolve_legacy_import(import, &mut imports)?;
                            }
                        }
                        _ => {}
                    }
                }
                Some("symbols") => {
                    if seen_symbols {
                        return malformed("duplicate symbols field in a local symbol table");
                    }
                    seen_symbols = true;
                    if let Value::List(items) = &value.value {
                        declared.extend(items.iter().map(|item| match &item.value {
                            Value::String(s) => Some(Rc::from(s.as_str())),
                            _ => None,
                        }));
                    }
                }
                _ => {}
            }
        }
        tracing::debug!(
            append,
            imported = imports.len(),
            declared = declared.len(),
            "local symbol table"
        );
        if append {
            self.add_symbols(imports.into_iter().chain(declared));
        } else {
            let version = self.tables.version;
            let mut base = match version {
                Version::V1_0 => symbols::symbol_table_1_0(self.capacity),
                Version::V1_1 => symbols::symbol_table_1_1(self.capacity),
            };
            base.extend(imports.into_iter().chain(declared));
            Rc::make_mut(&mut self.tables).module_mut().symbols = base;
            self.publish("local symbol table");
        }
        Ok(())
    }

    fn resolve_legacy_import(&self, import: &Element, out: &mut Vec<SymbolText>) -> IonResult<()> {
        let Value::Struct(fields) = &import.value else {
            return Ok(());
        };
        let field = |name: &str| fields.iter().find(|(k, _)| k.as_text() == Some(name)).map(|(_, v)| v);
        let Some(name) = field("name").and_then(text_of) else {
            return Ok(());
        };
        if name == "$ion" {
            return Ok(());
        }
        let version = field("version")
            .and_then(Element::as_int)
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v >= 1)
            .unwrap_or(1);
        let max_id = field("max_id")
            .and_then(Element::as_int)
            .and_then(|v| usize::try_from(v).ok());
        let shared = self.catalog.as_ref().and_then(|c| c.get(name, version));
        let exact = shared.as_ref().is_some_and(|t| t.version == version);
        let max_id = match (max_id, &shared) {
            (Some(max_id), _) => max_id,
            (None, Some(table)) if exact => table.symbols.len(),
            _ => {
                return malformed(format!(
                    "import of '{name}' version {version} needs max_id: the exact table is not in the catalog"
                ))
            }
        };
        let symbols = shared.as_ref().map(|t| t.symbols.as_slice()).unwrap_or_default();
        for i in 0..max_id {
            out.push(symbols.get(i).cloned().flatten());
        }
        Ok(())
    }

    /// Applies a `$ion::(...)` directive.
    pub fn directive(&mut self, directive: &Element) -> IonResult<()> {
        let Some((word, rest)) = keyword(directive) else {
            return malformed("a directive must be a sexp starting with a keyword");
        };
        match word {
            "module" => {
                let (name, module) = self.define_module(rest, &HashMap::new())?;
                if &*name == DEFAULT_MODULE {
                    let tables = Rc::make_mut(&mut self.tables);
                    tables.default = module;
                    tracing::debug!(
                        symbols = tables.default.symbols.len(),
                        macros = tables.default.macros.len(),
                        "default module redefined",
                    );
                    self.publish("module directive");
                } else {
                    tracing::debug!(name = %name, "module defined");
                    self.modules.insert(name, module);
                }
                Ok(())
            }
            "import" => {
                let (name, module) = self.import(rest)?;
                tracing::debug!(name = %name, "module imported");
                self.modules.insert(name, module);
                Ok(())
            }
            "encoding" => unimplemented("the encoding directive"),
            other => malformed(format!("unknown directive '{other}'")),
        }
    }

    /// `(import name catalog_key version?)`, without the keyword.
    fn import(&self, items: &[Element]) -> IonResult<(Rc<str>, Module)> {
        let (name, key, version) = match items {
            [name, key] => (name, key, None),
            [name, key, version] => (name, key, Some(version)),
            _ => return malformed("import expects a name, a catalog key and an optional version"),
        };
        let (Some(name), Some(key)) = (text_of(name), text_of(key)) else {
            return malformed("import name and catalog key must be text");
        };
        let version = match version {
            Some(v) => match v.as_int().and_then(|v| u32::try_from(v).ok()) {
                Some(v) => v,
                None => return malformed("import version must be a positive int"),
            },
            None => 1,
        };
        match self.catalog.as_ref().and_then(|c| c.get(key, version)) {
            Some(shared) => Ok((Rc::from(name), Module::from_shared(name, &shared, self.capacity))),
            None => unimplemented(format!("import of '{key}' version {version}: not in the catalog")),
        }
    }

    fn lookup_module<'m>(
        &'m self,
        name: &str,
        local: &'m HashMap<Rc<str>, Module>,
    ) -> IonResult<&'m Module> {
        if name == DEFAULT_MODULE {
            return Ok(&self.tables.default);
        }
        match local.get(name).or_else(|| self.modules.get(name)) {
            Some(module) => Ok(module),
            None => malformed(format!("unknown module '{name}'")),
        }
    }

    /// `(module name clauses...)`, without the keyword.
    fn define_module(
        &self,
        items: &[Element],
        outer: &HashMap<Rc<str>, Module>,
    ) -> IonResult<(Rc<str>, Module)> {
        let Some((name, clauses)) = items.split_first() else {
            return malformed("module definition is missing a name");
        };
        let Some(name) = name.as_text() else {
            return malformed("module name must be a symbol");
        };
        let mut local = outer.clone();
        let mut module = Module::new(name, self.capacity);
        let mut last: Option<Clause> = None;
        for clause in clauses {
            let Some((word, args)) = keyword(clause) else {
                return malformed("module clauses must be sexps");
            };
            let Some(kind) = clause_kind(word) else {
                return malformed(format!("unknown module clause '{word}'"));
            };
            let out_of_order = match last {
                Some(prev) => kind < prev || (kind == prev && kind >= Clause::Macros),
                None => false,
            };
            if out_of_order {
                return malformed(format!("module clause '{word}' is out of order"));
            }
            last = Some(kind);
            match kind {
                Clause::Import => {
                    let (alias, imported) = self.import(args)?;
                    local.insert(alias, imported);
                }
                Clause::Module => {
                    let (inner, defined) = self.define_module(args, &local)?;
                    local.insert(inner, defined);
                }
                Clause::Macros => self.macros_clause(args, &local, &mut module)?,
                Clause::Symbols => self.symbols_clause(args, &local, &mut module)?,
            }
        }
        Ok((Rc::from(name), module))
    }

    fn macros_clause(
        &self,
        items: &[Element],
        local: &HashMap<Rc<str>, Module>,
        module: &mut Module,
    ) -> IonResult<()> {
        let mut definitions = Vec::new();
        let flush = |definitions: &mut Vec<Element>, module: &mut Module| -> IonResult<()> {
            for m in self.compile_group_into(definitions, module)? {
                module.add_macro(m);
            }
            definitions.clear();
            Ok(())
        };
        for item in items {
            match &item.value {
                Value::Symbol(symbol) => {
                    flush(&mut definitions, module)?;
                    let Some(name) = symbol.as_text() else {
                        return malformed("module reference has unknown text");
                    };
                    for m in self.lookup_module(name, local)?.macros.clone() {
                        module.add_macro(m);
                    }
                }
                Value::Sexp(_) => definitions.push(item.clone()),
                Value::Null(_) => {}
                _ => return malformed(format!("unexpected {} in a macros clause", item.ion_type())),
            }
        }
        flush(&mut definitions, module)
    }

    /// Compiles a run of definitions that may refer to each other and to the
    /// macros already added to `module`.
    fn compile_group_into(&self, definitions: &[Element], module: &Module) -> IonResult<Vec<Rc<Macro>>> {
        let mut group: Vec<Rc<Macro>> = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let mut scope = module.macros.clone();
            scope.extend(group.iter().cloned());
            let lookup = GroupLookup {
                group: &scope,
                tables: &self.tables,
            };
            group.push(Rc::new(MacroCompiler::new(&lookup).compile(definition)?));
        }
        Ok(group)
    }

    fn symbols_clause(
        &self,
        items: &[Element],
        local: &HashMap<Rc<str>, Module>,
        module: &mut Module,
    ) -> IonResult<()> {
        for item in items {
            match &item.value {
                Value::Symbol(symbol) => {
                    let Some(name) = symbol.as_text() else {
                        return malformed("module reference has unknown text");
                    };
                    let source = self.lookup_module(name, local)?;
                    for text in source.user_symbols() {
                        module.add_symbol(text.clone());
                    }
                }
                Value::List(texts) => {
                    for text in texts {
                        module.add_symbol(match &text.value {
                            Value::String(s) => Some(Rc::from(s.as_str())),
                            Value::Symbol(Symbol::Text(s)) => Some(s.clone()),
                            Value::Null(_) | Value::Symbol(Symbol::Unknown(_)) => None,
                            _ => {
                                return malformed(format!(
                                    "symbol list entries must be text, found {}",
                                    text.ion_type()
                                ))
                            }
                        });
                    }
                }
                Value::String(s) => {
                    module.add_symbol(Some(Rc::from(s.as_str())));
                }
                Value::Null(_) => {}
                _ => return malformed(format!("unexpected {} in a symbols clause", item.ion_type())),
            }
        }
        Ok(())
    }
}
