//! `ion-dump`: decode an Ion binary stream (stdin) to JSON lines (stdout).
//!
//! Usage:
//!   ion-dump [--pretty] [--tokens]
//!
//! Set `ION_LOG=debug` for decoder diagnostics on stderr.

use ion_cli::{dump_json, dump_tokens, init_logging, CliError};
use std::io::{self, Read, Write};

fn run() -> Result<(), CliError> {
    let mut pretty = false;
    let mut tokens = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--pretty" => pretty = true,
            "--tokens" => tokens = true,
            _ => return Err(CliError::UnknownFlag(arg)),
        }
    }

    let mut bytes = Vec::new();
    io::stdin().read_to_end(&mut bytes)?;

    let out = if tokens {
        dump_tokens(&bytes)?
    } else {
        dump_json(&bytes, pretty)?
    };
    io::stdout().write_all(out.as_bytes())?;
    Ok(())
}

fn main() {
    init_logging();
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
