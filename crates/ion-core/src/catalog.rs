//! Shared symbol table resolution.

use std::collections::HashMap;
use std::rc::Rc;

use crate::symbols::SymbolText;

/// A named, versioned list of symbols that local tables can import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedTable {
    pub name: String,
    pub version: u32,
    pub symbols: Vec<SymbolText>,
}

impl SharedTable {
    pub fn new<I, S>(name: &str, version: u32, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            name: name.to_owned(),
            version,
            symbols: symbols
                .into_iter()
                .map(|s| Some(Rc::from(s.as_ref())))
                .collect(),
        }
    }
}

/// Looks up shared tables by name and version.
pub trait Catalog {
    /// Returns the table with this exact version, or the highest version
    /// available when the exact one is missing.
    fn get(&self, name: &str, version: u32) -> Option<Rc<SharedTable>>;
}

/// In-memory [`Catalog`].
#[derive(Debug, Default, Clone)]
pub struct MapCatalog {
    tables: HashMap<String, Vec<Rc<SharedTable>>>,
}

impl MapCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: SharedTable) {
        let versions = self.tables.entry(table.name.clone()).or_default();
        versions.retain(|t| t.version != table.version);
        versions.push(Rc::new(table));
        versions.sort_by_key(|t| t.version);
    }

    pub fn with(mut self, table: SharedTable) -> Self {
        self.insert(table);
        self
    }
}

impl Catalog for MapCatalog {
    fn get(&self, name: &str, version: u32) -> Option<Rc<SharedTable>> {
        let versions = self.tables.get(name)?;
        versions
            .iter()
            .find(|t| t.version == version)
            .or_else(|| versions.last())
            .cloned()
    }
}
