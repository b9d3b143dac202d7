//! `ion-pack`: encode JSON values (stdin) as an Ion binary stream (stdout).
//!
//! Usage:
//!   ion-pack [--v1.0] [--inline] [--delimited]
//!
//! Ion 1.1 with interned symbols and length-prefixed containers by default.

use ion_cli::{init_logging, pack, CliError};
use ion_core::{ContainerEncoding, SymbolEncoding, Version, WriterOptions};
use std::io::{self, Read, Write};

fn run() -> Result<(), CliError> {
    let mut options = WriterOptions::default();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--v1.0" => options.version = Version::V1_0,
            "--inline" => options.symbols = SymbolEncoding::Inline,
            "--delimited" => options.containers = ContainerEncoding::Delimited,
            _ => return Err(CliError::UnknownFlag(arg)),
        }
    }

    let mut json = String::new();
    io::stdin().read_to_string(&mut json)?;

    let bytes = pack(json.trim(), options)?;
    io::stdout().write_all(&bytes)?;
    Ok(())
}

fn main() {
    init_logging();
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
