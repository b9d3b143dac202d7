use std::rc::Rc;

use ion_core::{
    read_all, ContainerEncoding, Element, IonEncoder, IonError, IonReader, MapCatalog,
    ReaderOptions, SharedTable, Symbol, SymbolEncoding, Token, TokenSource, Version, WriterOptions,
};

fn sym(text: &str) -> Element {
    Element::symbol(text)
}

fn clause(name: &str, items: Vec<Element>) -> Element {
    let mut sexp = vec![sym(name)];
    sexp.extend(items);
    Element::sexp(sexp)
}

fn directive(items: Vec<Element>) -> Element {
    Element::sexp(items).with_annotations(vec!["$ion"])
}

fn strings(texts: &[&str]) -> Element {
    Element::list(texts.iter().map(|t| Element::string(t)).collect())
}

/// An Ion 1.1 stream with `values` written inline, followed by raw bytes.
fn stream(values: &[Element], raw: &[u8]) -> Vec<u8> {
    let options = WriterOptions {
        version: Version::V1_1,
        symbols: SymbolEncoding::Inline,
        containers: ContainerEncoding::LengthPrefixed,
    };
    let mut data = IonEncoder::new(options).encode(values).unwrap();
    data.extend_from_slice(raw);
    data
}

fn read(data: &[u8]) -> Vec<Element> {
    read_all(&mut IonReader::new(data)).unwrap()
}

#[test]
fn module_directive_appends_symbols() {
    let data = stream(
        &[directive(vec![
            sym("module"),
            sym("_"),
            clause("macros", vec![sym("_")]),
            clause("symbols", vec![sym("_"), strings(&["a", "b"])]),
        ])],
        &[0xE1, 0x42, 0xE1, 0x43, 0xE1, 0x04],
    );
    assert_eq!(read(&data), vec![sym("a"), sym("b"), sym("name")]);
}

#[test]
fn module_directive_without_underscore_replaces_symbols() {
    let data = stream(
        &[directive(vec![
            sym("module"),
            sym("_"),
            clause("symbols", vec![strings(&["only"])]),
        ])],
        &[0xE1, 0x01, 0xE1, 0x02],
    );
    let mut reader = IonReader::new(&data);
    assert_eq!(reader.next_token().unwrap(), Token::Symbol);
    assert_eq!(reader.read_symbol().unwrap(), Symbol::from("only"));
    assert_eq!(reader.next_token().unwrap(), Token::Symbol);
    assert!(matches!(reader.read_symbol(), Err(IonError::MalformedData(_))));
}

#[test]
fn set_and_add_symbols_invocations() {
    // (:set_symbols "x" "y") (:add_symbols "z") $1 $2 $3
    let raw = [
        0xEF, 0x13, 0x02, 0x09, 0x91, b'x', 0x91, b'y', //
        0xEF, 0x14, 0x01, 0x91, b'z', //
        0xE1, 0x01, 0xE1, 0x02, 0xE1, 0x03,
    ];
    let data = stream(&[], &raw);
    let mut reader = IonReader::new(&data);
    assert_eq!(
        read_all(&mut reader).unwrap(),
        vec![sym("x"), sym("y"), sym("z")]
    );
    assert_eq!(reader.context().tables().symbol_count(), 4);
}

#[test]
fn legacy_symbol_table_in_ion_1_1() {
    let table = Element::strukt(vec![("symbols", strings(&["legacy"]))])
        .with_annotations(vec!["$ion_symbol_table"]);
    let data = stream(&[table], &[0xE1, 0x42]);
    assert_eq!(read(&data), vec![sym("legacy")]);
}

#[test]
fn nested_directives_are_plain_data() {
    let nested = Element::list(vec![directive(vec![
        sym("module"),
        sym("_"),
        clause("symbols", vec![strings(&["ignored"])]),
    ])]);
    let data = stream(std::slice::from_ref(&nested), &[0xE1, 0x04]);
    let mut reader = IonReader::new(&data);
    assert_eq!(read_all(&mut reader).unwrap(), vec![nested, sym("name")]);
    assert_eq!(reader.context().tables().symbol_count(), 66);
}

#[test]
fn catalog_import_feeds_module_symbols() {
    let catalog = MapCatalog::new().with(SharedTable::new("com.example", 2, ["p", "q"]));
    let options = ReaderOptions::default().with_catalog(Rc::new(catalog));
    let data = stream(
        &[
            directive(vec![
                sym("import"),
                sym("ex"),
                Element::string("com.example"),
                Element::int(2),
            ]),
            directive(vec![
                sym("module"),
                sym("_"),
                clause("symbols", vec![sym("_"), sym("ex")]),
            ]),
        ],
        &[0xE1, 0x42, 0xE1, 0x43],
    );
    let values = read_all(&mut IonReader::with_options(&data, options)).unwrap();
    assert_eq!(values, vec![sym("p"), sym("q")]);
}

#[test]
fn missing_import_is_unimplemented() {
    let data = stream(
        &[directive(vec![
            sym("import"),
            sym("ex"),
            Element::string("nowhere"),
        ])],
        &[],
    );
    assert!(matches!(
        read_all(&mut IonReader::new(&data)),
        Err(IonError::UnimplementedFeature(_))
    ));
}

#[test]
fn encoding_directive_is_unimplemented() {
    let data = stream(&[directive(vec![sym("encoding")])], &[]);
    assert!(matches!(
        read_all(&mut IonReader::new(&data)),
        Err(IonError::UnimplementedFeature(_))
    ));
}

#[test]
fn version_marker_discards_the_module() {
    let mut data = stream(
        &[directive(vec![
            sym("module"),
            sym("_"),
            clause("symbols", vec![sym("_"), strings(&["gone"])]),
        ])],
        &[],
    );
    data.extend_from_slice(&[0xE0, 0x01, 0x01, 0xEA, 0xE1, 0x42]);
    assert!(matches!(
        read_all(&mut IonReader::new(&data)),
        Err(IonError::MalformedData(_))
    ));
}

#[test]
fn macros_defined_by_directive() {
    let definition = Element::sexp(vec![
        sym("macro"),
        sym("pair"),
        Element::sexp(vec![sym("a")]),
        Element::list(vec![
            Element::sexp(vec![sym("%"), sym("a")]),
            Element::sexp(vec![sym("%"), sym("a")]),
        ]),
    ]);
    let data = stream(
        &[directive(vec![
            sym("module"),
            sym("_"),
            clause("macros", vec![sym("_"), definition]),
        ])],
        // (:pair 7) at the first address after the system macros
        &[0x18, 0x61, 0x07],
    );
    assert_eq!(
        read(&data),
        vec![Element::list(vec![Element::int(7), Element::int(7)])]
    );
}
