//! Ion 1.0/1.1 binary decoding and encoding core.
//!
//! The crate is organised leaf-first:
//!
//! - [`address_map`]: dense integer addresses for symbols and macros.
//! - [`pool`]: recycled cursor state for the binary tokenizer.
//! - [`binary`]: the pull tokenizer and the 1.0/1.1 writers.
//! - [`macros`]: the template compiler, the bytecode interpreter and the
//!   built-in system macros.
//! - [`context`]: symbol and macro tables across version markers and
//!   directives.
//! - [`reader`]: the expanding reader that stitches everything into a single
//!   token stream.
//!
//! # Example
//!
//! ```
//! use ion_core::{IonReader, Token, TokenSource};
//!
//! // IVM, int 0, list [1, 2]
//! let data = [0xE0, 0x01, 0x01, 0xEA, 0x60, 0xB4, 0x61, 0x01, 0x61, 0x02];
//! let mut reader = IonReader::new(&data);
//!
//! assert_eq!(reader.next_token().unwrap(), Token::Int);
//! assert_eq!(reader.read_int().unwrap(), 0);
//! assert_eq!(reader.next_token().unwrap(), Token::List);
//! reader.step_in().unwrap();
//! assert_eq!(reader.next_token().unwrap(), Token::Int);
//! assert_eq!(reader.read_int().unwrap(), 1);
//! ```

pub mod address_map;
pub mod binary;
pub mod catalog;
pub mod context;
pub mod element;
mod error;
pub mod macros;
mod options;
pub mod pool;
pub mod reader;
mod source;
pub mod symbols;
mod types;

pub use address_map::AddressMap;
pub use binary::{encode, BinaryReader, IonEncoder, LegacyEncoder};
pub use catalog::{Catalog, MapCatalog, SharedTable};
pub use context::{EncodingContext, Tables};
pub use element::{read_all, read_element, Element, ElementReader, Value};
pub use error::{IonError, IonResult};
pub use options::{ContainerEncoding, ReaderOptions, SymbolEncoding, WriterOptions};
pub use reader::IonReader;
pub use source::TokenSource;
pub use types::{Decimal, IonType, Precision, Symbol, Timestamp, Token, Version};
