//! Core logic of the `ion-dump` and `ion-pack` binaries.
//!
//! - `ion-dump` decodes an Ion 1.0/1.1 binary stream (macros expanded) and
//!   prints it as JSON, or as an indented token listing.
//! - `ion-pack` encodes JSON as an Ion binary stream.

use std::fmt::Write as _;

use base64::Engine;
use ion_core::{
    encode, read_all, Element, IonError, IonReader, IonType, Precision, Symbol, Timestamp, Token,
    TokenSource, Value, WriterOptions,
};
use serde_json::{Map, Number, Value as Json};

// ── Errors ────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Ion(#[from] IonError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Fmt(#[from] std::fmt::Error),
    #[error("unknown flag: {0}")]
    UnknownFlag(String),
}

// ── Logging ───────────────────────────────────────────────────────────────

/// Installs a stderr subscriber filtered by `ION_LOG` (default `warn`).
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("ION_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    // A second call in the same process keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

// ── ion-dump ──────────────────────────────────────────────────────────────

/// Decodes every top-level value of `bytes` to JSON, one value per line.
pub fn dump_json(bytes: &[u8], pretty: bool) -> Result<String, CliError> {
    let values = read_all(&mut IonReader::new(bytes))?;
    tracing::debug!(values = values.len(), "decoded stream");
    let mut out = String::new();
    for value in &values {
        let json = to_json(value);
        if pretty {
            out.push_str(&serde_json::to_string_pretty(&json)?);
        } else {
            out.push_str(&serde_json::to_string(&json)?);
        }
        out.push('\n');
    }
    Ok(out)
}

/// Lists the expanded token stream, indented by container depth.
pub fn dump_tokens(bytes: &[u8]) -> Result<String, CliError> {
    let mut reader = IonReader::new(bytes);
    let mut out = String::new();
    loop {
        let token = reader.next_token()?;
        let depth = reader.depth();
        if token == Token::End {
            if depth == 0 {
                return Ok(out);
            }
            reader.step_out()?;
            writeln!(out, "{:width$}end", "", width = 2 * (depth - 1))?;
            continue;
        }
        write!(out, "{:width$}", "", width = 2 * depth)?;
        match token {
            Token::FieldName => writeln!(out, "field {}", reader.read_field_name()?)?,
            Token::Annotations => {
                let annotations = reader.read_annotations()?;
                let texts: Vec<String> = annotations.iter().map(Symbol::to_string).collect();
                writeln!(out, "annotations {}", texts.join(" "))?;
            }
            Token::Null => writeln!(out, "null.{}", reader.read_null()?)?,
            Token::Bool => writeln!(out, "bool {}", reader.read_bool()?)?,
            Token::Int => writeln!(out, "int {}", reader.read_int()?)?,
            Token::Float => writeln!(out, "float {}", reader.read_float()?)?,
            Token::Decimal => writeln!(out, "decimal {}", reader.read_decimal()?)?,
            Token::Timestamp => {
                writeln!(out, "timestamp {}", format_timestamp(&reader.read_timestamp()?))?
            }
            Token::String => writeln!(out, "string {:?}", reader.read_string()?)?,
            Token::Symbol => writeln!(out, "symbol {}", reader.read_symbol()?)?,
            Token::Blob | Token::Clob => {
                let kind = if token == Token::Blob { "blob" } else { "clob" };
                let bytes = reader.read_lob()?;
                writeln!(out, "{kind} {}", base64::engine::general_purpose::STANDARD.encode(&*bytes))?
            }
            Token::List | Token::Sexp | Token::Struct => {
                writeln!(out, "{}", token.ion_type().map_or("?", IonType::name))?;
                reader.step_in()?;
            }
            other => writeln!(out, "{other:?}")?,
        }
    }
}

fn to_json(element: &Element) -> Json {
    match &element.value {
        Value::Null(_) => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(n) => match i64::try_from(*n) {
            Ok(n) => Json::Number(n.into()),
            Err(_) => match u64::try_from(*n) {
                Ok(n) => Json::Number(n.into()),
                Err(_) => Json::String(n.to_string()),
            },
        },
        Value::Float(f) => match Number::from_f64(*f) {
            Some(n) => Json::Number(n),
            None => Json::String(f.to_string()),
        },
        Value::Decimal(d) => Json::String(d.to_string()),
        Value::Timestamp(ts) => Json::String(format_timestamp(ts)),
        Value::String(s) => Json::String(s.clone()),
        Value::Symbol(symbol) => Json::String(symbol.to_string()),
        Value::Blob(bytes) | Value::Clob(bytes) => {
            Json::String(base64::engine::general_purpose::STANDARD.encode(bytes))
        }
        Value::List(items) | Value::Sexp(items) => Json::Array(items.iter().map(to_json).collect()),
        Value::Struct(fields) => {
            let mut map = Map::new();
            for (name, value) in fields {
                map.insert(name.to_string(), to_json(value));
            }
            Json::Object(map)
        }
    }
}

/// Formats `ts` in Ion text notation, which is ISO 8601 at day precision
/// and finer.
pub fn format_timestamp(ts: &Timestamp) -> String {
    let mut out = format!("{:04}", ts.year);
    if ts.precision == Precision::Year {
        out.push('T');
        return out;
    }
    let _ = write!(out, "-{:02}", ts.month);
    if ts.precision == Precision::Month {
        out.push('T');
        return out;
    }
    let _ = write!(out, "-{:02}", ts.day);
    if ts.precision == Precision::Day {
        return out;
    }
    let _ = write!(out, "T{:02}:{:02}", ts.hour, ts.minute);
    if ts.precision == Precision::Second {
        let _ = write!(out, ":{:02}", ts.second);
        if let Some(fraction) = ts.fraction.filter(|f| f.exponent < 0) {
            let digits = (-fraction.exponent) as usize;
            let _ = write!(out, ".{:0digits$}", fraction.coefficient);
        }
    }
    match ts.offset {
        None => out.push_str("-00:00"),
        Some(0) => out.push('Z'),
        Some(offset) => {
            let sign = if offset < 0 { '-' } else { '+' };
            let offset = offset.unsigned_abs();
            let _ = write!(out, "{sign}{:02}:{:02}", offset / 60, offset % 60);
        }
    }
    out
}

// ── ion-pack ──────────────────────────────────────────────────────────────

/// Encodes every JSON value in `json` (whitespace separated) as one stream.
pub fn pack(json: &str, options: WriterOptions) -> Result<Vec<u8>, CliError> {
    let mut values = Vec::new();
    for value in serde_json::Deserializer::from_str(json).into_iter::<Json>() {
        values.push(from_json(&value?));
    }
    tracing::debug!(values = values.len(), ?options, "encoding");
    Ok(encode(&values, options)?)
}

fn from_json(json: &Json) -> Element {
    match json {
        Json::Null => Element::null(),
        Json::Bool(b) => Element::bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Element::int(i as i128)
            } else if let Some(u) = n.as_u64() {
                Element::int(u as i128)
            } else {
                Element::float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Json::String(s) => Element::string(s),
        Json::Array(items) => Element::list(items.iter().map(from_json).collect()),
        Json::Object(map) => Element::strukt(
            map.iter()
                .map(|(name, value)| (name.as_str(), from_json(value)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ion_core::{ContainerEncoding, Decimal, SymbolEncoding};

    #[test]
    fn timestamps_in_text_notation() {
        assert_eq!(format_timestamp(&Timestamp::year(2024)), "2024T");
        assert_eq!(format_timestamp(&Timestamp::day(2024, 2, 29)), "2024-02-29");
        assert_eq!(
            format_timestamp(&Timestamp::minute(2024, 2, 29, 23, 30, Some(-300))),
            "2024-02-29T23:30-05:00"
        );
        assert_eq!(
            format_timestamp(
                &Timestamp::minute(2024, 1, 2, 3, 4, Some(0)).with_second(5, Some(Decimal::new(7, -3)))
            ),
            "2024-01-02T03:04:05.007Z"
        );
        assert_eq!(
            format_timestamp(&Timestamp::minute(2024, 1, 2, 3, 4, None)),
            "2024-01-02T03:04-00:00"
        );
    }

    #[test]
    fn pack_then_dump() {
        let json = r#"{"b": [1, 2.5, "x", null, true], "a": {}} 7"#;
        for options in [
            WriterOptions::default(),
            WriterOptions::v1_0(),
            WriterOptions {
                symbols: SymbolEncoding::Inline,
                containers: ContainerEncoding::Delimited,
                ..WriterOptions::default()
            },
        ] {
            let bytes = pack(json, options).unwrap();
            assert_eq!(
                dump_json(&bytes, false).unwrap(),
                "{\"b\":[1,2.5,\"x\",null,true],\"a\":{}}\n7\n"
            );
        }
    }

    #[test]
    fn dumps_lobs_as_base64_and_big_ints_as_strings() {
        let values = vec![
            Value::Blob(vec![1, 2, 3]).into(),
            Element::int(1 << 80),
            Element::symbol("sym"),
        ];
        let bytes = encode(&values, WriterOptions::default()).unwrap();
        assert_eq!(
            dump_json(&bytes, false).unwrap(),
            "\"AQID\"\n\"1208925819614629174706176\"\n\"sym\"\n"
        );
    }

    #[test]
    fn token_listing() {
        let values = vec![Element::strukt(vec![(
            "k",
            Element::list(vec![Element::int(1).with_annotations(vec!["a"])]),
        )])];
        let bytes = encode(&values, WriterOptions::default()).unwrap();
        assert_eq!(
            dump_tokens(&bytes).unwrap(),
            "struct\n  field k\n  list\n    annotations a\n    int 1\n  end\nend\n"
        );
    }

    #[test]
    fn malformed_input_is_reported() {
        let err = dump_json(&[0xE0, 0x01, 0x01, 0xEA, 0xD1], false).unwrap_err();
        assert!(matches!(err, CliError::Ion(IonError::MalformedData(_))));
        assert!(pack("{", WriterOptions::default()).is_err());
    }
}
