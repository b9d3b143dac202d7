//! Ion binary encoding: the opcode table, the raw tokenizer and the writers.

pub mod eexp;
pub mod legacy;
pub mod opcode;
pub mod reader;
pub mod timestamp;
pub mod writer;
pub mod writer_1_0;

pub use reader::BinaryReader;
pub use writer::IonEncoder;
pub use writer_1_0::LegacyEncoder;

use crate::element::Element;
use crate::error::IonResult;
use crate::options::WriterOptions;
use crate::types::Version;

/// Encodes `values` as a complete stream in the version `options` selects.
pub fn encode(values: &[Element], options: WriterOptions) -> IonResult<Vec<u8>> {
    match options.version {
        Version::V1_0 => LegacyEncoder::new().encode(values),
        Version::V1_1 => IonEncoder::new(options).encode(values),
    }
}
