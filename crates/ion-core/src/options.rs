//! Reader and writer configuration.

use std::fmt;
use std::rc::Rc;

use crate::catalog::Catalog;
use crate::types::Version;

/// Options for [`crate::IonReader`].
#[derive(Clone)]
pub struct ReaderOptions {
    /// Initial capacity of the symbol address map.
    pub symbol_table_capacity: usize,
    /// Deepest container nesting accepted before the input is rejected.
    pub max_depth: usize,
    /// Resolves shared symbol table imports.
    pub catalog: Option<Rc<dyn Catalog>>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            symbol_table_capacity: 64,
            max_depth: 512,
            catalog: None,
        }
    }
}

impl ReaderOptions {
    pub fn with_catalog(mut self, catalog: Rc<dyn Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_symbol_table_capacity(mut self, capacity: usize) -> Self {
        self.symbol_table_capacity = capacity;
        self
    }
}

impl fmt::Debug for ReaderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderOptions")
            .field("symbol_table_capacity", &self.symbol_table_capacity)
            .field("max_depth", &self.max_depth)
            .field("catalog", &self.catalog.is_some())
            .finish()
    }
}

/// How the writer emits symbol text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SymbolEncoding {
    /// Text is written inline (Ion 1.1 only; the 1.0 writer always interns).
    Inline,
    /// Text is added to the local symbol table and written as a symbol ID.
    #[default]
    Interned,
}

/// How the writer frames lists, sexps and structs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContainerEncoding {
    #[default]
    LengthPrefixed,
    /// Open with a delimited opcode and close with an end marker (Ion 1.1
    /// only).
    Delimited,
}

/// Options for the binary writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterOptions {
    pub version: Version,
    pub symbols: SymbolEncoding,
    pub containers: ContainerEncoding,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            version: Version::V1_1,
            symbols: SymbolEncoding::default(),
            containers: ContainerEncoding::default(),
        }
    }
}

impl WriterOptions {
    pub fn v1_0() -> Self {
        Self {
            version: Version::V1_0,
            ..Self::default()
        }
    }
}
