use std::rc::Rc;

use ion_buffers::Writer;
use ion_core::{
    encode, read_all, Decimal, Element, IonError, IonReader, MapCatalog, ReaderOptions,
    SharedTable, Symbol, Value, WriterOptions,
};

const IVM_1_0: [u8; 4] = [0xE0, 0x01, 0x00, 0xEA];

// System symbol IDs.
const ION_SYMBOL_TABLE: u8 = 3;
const NAME: u8 = 4;
const VERSION: u8 = 5;
const IMPORTS: u8 = 6;
const SYMBOLS: u8 = 7;
const MAX_ID: u8 = 8;

fn typed(code: u8, body: &[u8]) -> Vec<u8> {
    let mut writer = Writer::new();
    if body.len() < 14 {
        writer.u8(code << 4 | body.len() as u8);
    } else {
        writer.u8(code << 4 | 14);
        writer.var_uint(body.len() as u64);
    }
    writer.buf(body);
    writer.flush()
}

fn int(n: u8) -> Vec<u8> {
    typed(2, &[n])
}

fn string(s: &str) -> Vec<u8> {
    typed(8, s.as_bytes())
}

fn symbol(sid: u8) -> Vec<u8> {
    typed(7, &[sid])
}

fn list(items: &[Vec<u8>]) -> Vec<u8> {
    typed(11, &items.concat())
}

fn strukt(fields: &[(u8, Vec<u8>)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (sid, value) in fields {
        body.push(0x80 | sid);
        body.extend_from_slice(value);
    }
    typed(13, &body)
}

fn annotated(sid: u8, value: &[u8]) -> Vec<u8> {
    let mut body = vec![0x81, 0x80 | sid];
    body.extend_from_slice(value);
    typed(14, &body)
}

fn local_table(fields: &[(u8, Vec<u8>)]) -> Vec<u8> {
    annotated(ION_SYMBOL_TABLE, &strukt(fields))
}

fn stream(parts: &[Vec<u8>]) -> Vec<u8> {
    let mut data = IVM_1_0.to_vec();
    for part in parts {
        data.extend_from_slice(part);
    }
    data
}

fn shared_import(max_id: u8) -> Vec<u8> {
    list(&[strukt(&[
        (NAME, string("shared")),
        (VERSION, int(1)),
        (MAX_ID, int(max_id)),
    ])])
}

#[test]
fn local_symbols_follow_the_system_table() {
    let data = stream(&[
        local_table(&[(SYMBOLS, list(&[string("foo"), string("bar")]))]),
        symbol(10),
        symbol(11),
        symbol(NAME),
    ]);
    assert_eq!(
        read_all(&mut IonReader::new(&data)).unwrap(),
        vec![Element::symbol("foo"), Element::symbol("bar"), Element::symbol("name")]
    );
}

#[test]
fn imports_resolve_through_the_catalog() {
    let catalog = MapCatalog::new().with(SharedTable::new("shared", 1, ["a", "b", "c"]));
    let options = ReaderOptions::default().with_catalog(Rc::new(catalog));
    let data = stream(&[
        local_table(&[(IMPORTS, shared_import(2)), (SYMBOLS, list(&[string("local")]))]),
        symbol(10),
        symbol(11),
        symbol(12),
    ]);
    let values = read_all(&mut IonReader::with_options(&data, options)).unwrap();
    assert_eq!(
        values,
        vec![Element::symbol("a"), Element::symbol("b"), Element::symbol("local")]
    );
}

#[test]
fn unresolved_imports_leave_gaps() {
    let data = stream(&[
        local_table(&[(IMPORTS, shared_import(2)), (SYMBOLS, list(&[string("local")]))]),
        symbol(11),
        symbol(12),
    ]);
    assert_eq!(
        read_all(&mut IonReader::new(&data)).unwrap(),
        vec![Value::Symbol(Symbol::Unknown(11)).into(), Element::symbol("local")]
    );
}

#[test]
fn appending_table_keeps_earlier_symbols() {
    let data = stream(&[
        local_table(&[(SYMBOLS, list(&[string("first")]))]),
        local_table(&[
            (IMPORTS, symbol(ION_SYMBOL_TABLE)),
            (SYMBOLS, list(&[string("second")])),
        ]),
        symbol(10),
        symbol(11),
    ]);
    assert_eq!(
        read_all(&mut IonReader::new(&data)).unwrap(),
        vec![Element::symbol("first"), Element::symbol("second")]
    );
}

#[test]
fn replacing_table_drops_earlier_symbols() {
    let data = stream(&[
        local_table(&[(SYMBOLS, list(&[string("first")]))]),
        local_table(&[(SYMBOLS, list(&[string("second")]))]),
        symbol(10),
        symbol(11),
    ]);
    let mut reader = IonReader::new(&data);
    assert!(matches!(read_all(&mut reader), Err(IonError::MalformedData(_))));
}

#[test]
fn non_string_symbols_are_gaps() {
    let data = stream(&[
        local_table(&[(SYMBOLS, list(&[int(1), string("x")]))]),
        symbol(10),
        symbol(11),
    ]);
    assert_eq!(
        read_all(&mut IonReader::new(&data)).unwrap(),
        vec![Value::Symbol(Symbol::Unknown(10)).into(), Element::symbol("x")]
    );
}

#[test]
fn scalars_and_padding() {
    let data = stream(&[
        vec![0x00],                   // one byte pad
        vec![0x03, 0xAA, 0xBB, 0xCC], // pad with a body
        vec![0x44, 0x3F, 0xC0, 0x00, 0x00],
        vec![0x48, 0x3F, 0xF8, 0, 0, 0, 0, 0, 0],
        vec![0x40],
        vec![0x52, 0xC1, 0x05],
        vec![0x50],
        vec![0x8F],
        vec![0x21, 0x00],
    ]);
    assert_eq!(
        read_all(&mut IonReader::new(&data)).unwrap(),
        vec![
            Element::float(1.5),
            Element::float(1.5),
            Element::float(0.0),
            Value::Decimal(Decimal::new(5, -1)).into(),
            Value::Decimal(Decimal::new(0, 0)).into(),
            Value::Null(ion_core::IonType::String).into(),
            Element::int(0),
        ]
    );
}

#[test]
fn negative_zero_int_is_malformed() {
    let data = stream(&[vec![0x30]]);
    assert!(matches!(
        read_all(&mut IonReader::new(&data)),
        Err(IonError::MalformedData(_))
    ));
}

#[test]
fn writer_output_reads_back_with_shared_texts() {
    let values = vec![
        Element::strukt(vec![("name", Element::symbol("custom")), ("custom", Element::int(1))]),
        Element::symbol("custom").with_annotations(vec!["custom"]),
    ];
    let bytes = encode(&values, WriterOptions::v1_0()).unwrap();
    let needle = b"custom";
    assert_eq!(bytes.windows(needle.len()).filter(|w| w == needle).count(), 1);
    assert_eq!(read_all(&mut IonReader::new(&bytes)).unwrap(), values);
}
