use ion_buffers::Writer;
use ion_core::{
    read_all, ContainerEncoding, Element, IonEncoder, IonError, IonReader, SymbolEncoding, Token,
    TokenSource, Version, WriterOptions,
};

const IVM_1_1: [u8; 4] = [0xE0, 0x01, 0x01, 0xEA];

fn sym(text: &str) -> Element {
    Element::symbol(text)
}

fn var(name: &str) -> Element {
    Element::sexp(vec![sym("%"), sym(name)])
}

fn definition(name: &str, params: &[&str], body: Element) -> Element {
    Element::sexp(vec![
        sym("macro"),
        sym(name),
        Element::sexp(params.iter().map(|p| sym(p)).collect()),
        body,
    ])
}

/// Binary Ion 1.1 for `values` without the version marker.
fn tdl(values: &[Element]) -> Vec<u8> {
    let options = WriterOptions {
        version: Version::V1_1,
        symbols: SymbolEncoding::Inline,
        containers: ContainerEncoding::LengthPrefixed,
    };
    let bytes = IonEncoder::new(options).encode(values).unwrap();
    bytes[4..].to_vec()
}

fn flex_uint(value: usize) -> Vec<u8> {
    let mut writer = Writer::new();
    writer.flex_uint(value as u64);
    writer.flush()
}

/// `(:$ion::set_macros definitions...)` as one expression group.
fn set_macros(definitions: &[Element]) -> Vec<u8> {
    let group = tdl(definitions);
    let mut out = vec![0xEF, 0x15, 0x02];
    out.extend(flex_uint(group.len()));
    out.extend(group);
    out
}

fn stream(parts: &[&[u8]]) -> Vec<u8> {
    let mut data = IVM_1_1.to_vec();
    for part in parts {
        data.extend_from_slice(part);
    }
    data
}

fn read(data: &[u8]) -> Vec<Element> {
    read_all(&mut IonReader::new(data)).unwrap()
}

fn user_macros() -> Vec<u8> {
    set_macros(&[
        // (macro foo (x) [100, (%x)])
        definition(
            "foo",
            &["x"],
            Element::list(vec![Element::int(100), var("x")]),
        ),
        // (macro pt (x y ?) {x: (%x), y: (.$ion::default (%y) 0)})
        definition(
            "pt",
            &["x", "y", "?"],
            Element::strukt(vec![
                ("x", var("x")),
                (
                    "y",
                    Element::sexp(vec![
                        sym("."),
                        sym("default").with_annotations(vec!["$ion"]),
                        var("y"),
                        Element::int(0),
                    ]),
                ),
            ]),
        ),
        // (macro wrap (x) [(.foo (%x))])
        definition(
            "wrap",
            &["x"],
            Element::list(vec![Element::sexp(vec![sym("."), sym("foo"), var("x")])]),
        ),
    ])
}

#[test]
fn template_with_argument_tokens() {
    let data = stream(&[&user_macros(), &[0x00, 0x6E]]);
    let mut reader = IonReader::new(&data);
    assert_eq!(reader.next_token().unwrap(), Token::List);
    reader.step_in().unwrap();
    assert_eq!(reader.next_token().unwrap(), Token::Int);
    assert_eq!(reader.read_int().unwrap(), 100);
    assert_eq!(reader.next_token().unwrap(), Token::Bool);
    assert!(reader.read_bool().unwrap());
    assert_eq!(reader.next_token().unwrap(), Token::End);
    reader.step_out().unwrap();
    assert_eq!(reader.next_token().unwrap(), Token::End);
}

#[test]
fn optional_argument_falls_back_to_default() {
    let data = stream(&[
        &user_macros(),
        &[0x01, 0x00, 0x61, 0x05],
        &[0x01, 0x01, 0x61, 0x05, 0x61, 0x07],
    ]);
    assert_eq!(
        read(&data),
        vec![
            Element::strukt(vec![("x", Element::int(5)), ("y", Element::int(0))]),
            Element::strukt(vec![("x", Element::int(5)), ("y", Element::int(7))]),
        ]
    );
}

#[test]
fn nested_template_invocation_sees_caller_arguments() {
    let data = stream(&[&user_macros(), &[0x02, 0x91, b'z']]);
    assert_eq!(
        read(&data),
        vec![Element::list(vec![Element::list(vec![
            Element::int(100),
            Element::string("z"),
        ])])]
    );
}

#[test]
fn argument_can_be_an_invocation() {
    // (:foo (:$ion::sum 1 2))
    let data = stream(&[&user_macros(), &[0x00, 0xEF, 0x07, 0x61, 0x01, 0x61, 0x02]]);
    assert_eq!(
        read(&data),
        vec![Element::list(vec![Element::int(100), Element::int(3)])]
    );
}

#[test]
fn unknown_macro_address_is_malformed() {
    let data = stream(&[&user_macros(), &[0x05, 0x6E]]);
    assert!(matches!(
        read_all(&mut IonReader::new(&data)),
        Err(IonError::MalformedData(_))
    ));
}

#[test]
fn set_macros_drops_the_system_macros_from_the_default_module() {
    let data = stream(&[&user_macros()]);
    let mut reader = IonReader::new(&data);
    assert_eq!(reader.next_token().unwrap(), Token::End);
    let tables = reader.context().tables();
    assert_eq!(tables.macro_at(0).unwrap().name(), Some("foo"));
    assert_eq!(tables.macro_at(2).unwrap().name(), Some("wrap"));
    assert!(tables.macro_at(3).is_err());
    assert_eq!(tables.system_macro(7).unwrap().name(), Some("sum"));
}

#[test]
fn system_macro_matrix() {
    let cases: Vec<(&[u8], Vec<Element>)> = vec![
        // (:values 1 2)
        (
            &[0xEF, 0x01, 0x02, 0x09, 0x61, 0x01, 0x61, 0x02],
            vec![Element::int(1), Element::int(2)],
        ),
        // (:default (::) 5)
        (&[0xEF, 0x02, 0x04, 0x61, 0x05], vec![Element::int(5)]),
        // (:default 1 5)
        (&[0xEF, 0x02, 0x05, 0x61, 0x01, 0x61, 0x05], vec![Element::int(1)]),
        // (:repeat 2 x)
        (&[0xEF, 0x04, 0x01, 0x61, 0x02, 0xA1, b'x'], vec![sym("x"), sym("x")]),
        // (:sum 2 3)
        (&[0xEF, 0x07, 0x61, 0x02, 0x61, 0x03], vec![Element::int(5)]),
        // (:delta 1 2 3)
        (
            &[0xEF, 0x06, 0x02, 0x0D, 0x61, 0x01, 0x61, 0x02, 0x61, 0x03],
            vec![Element::int(1), Element::int(3), Element::int(6)],
        ),
        // (:annotate (:: "a" b) 1)
        (
            &[0xEF, 0x08, 0x02, 0x09, 0x91, b'a', 0xA1, b'b', 0x61, 0x01],
            vec![Element::int(1).with_annotations(vec!["a", "b"])],
        ),
        // (:make_string "a" b)
        (
            &[0xEF, 0x09, 0x02, 0x09, 0x91, b'a', 0xA1, b'b'],
            vec![Element::string("ab")],
        ),
        // (:make_list [1] [2, 3])
        (
            &[0xEF, 0x0E, 0x02, 0x11, 0xB2, 0x61, 0x01, 0xB4, 0x61, 0x02, 0x61, 0x03],
            vec![Element::list(vec![Element::int(1), Element::int(2), Element::int(3)])],
        ),
        // (:make_struct {name: 1} {version: 2})
        (
            &[0xEF, 0x11, 0x02, 0x11, 0xD3, 0x09, 0x61, 0x01, 0xD3, 0x0B, 0x61, 0x02],
            vec![Element::strukt(vec![("name", Element::int(1)), ("version", Element::int(2))])],
        ),
        // (:make_field k 1)
        (
            &[0xEF, 0x10, 0xA1, b'k', 0x61, 0x01],
            vec![Element::strukt(vec![("k", Element::int(1))])],
        ),
        // (:flatten [1] (2))
        (
            &[0xEF, 0x05, 0x02, 0x0D, 0xB2, 0x61, 0x01, 0xC2, 0x61, 0x02],
            vec![Element::int(1), Element::int(2)],
        ),
        // (:parse_ion {{ IVM 5 }})
        (
            &[0xEF, 0x12, 0x01, 0xFE, 0x0D, 0xE0, 0x01, 0x01, 0xEA, 0x61, 0x05],
            vec![Element::int(5)],
        ),
        // (:none)
        (&[0xEF, 0x00], vec![]),
    ];
    for (eexp, expected) in cases {
        let data = stream(&[eexp]);
        assert_eq!(read(&data), expected, "e-expression {eexp:02X?}");
    }
}

#[test]
fn builtin_type_errors_are_malformed() {
    // (:sum a 1)
    let data = stream(&[&[0xEF, 0x07, 0xA1, b'a', 0x61, 0x01]]);
    assert!(matches!(
        read_all(&mut IonReader::new(&data)),
        Err(IonError::MalformedData(_))
    ));
}

#[test]
fn oversized_repeat_is_an_error() {
    // (:repeat 4611686018427387904 1)
    let data = stream(&[&[
        0xEF, 0x04, 0x01, 0x68, 0, 0, 0, 0, 0, 0, 0, 0x40, 0x61, 0x01,
    ]]);
    assert!(matches!(
        read_all(&mut IonReader::new(&data)),
        Err(IonError::UnimplementedFeature(_))
    ));
    // (:repeat 4611686018427387904) produces nothing
    let data = stream(&[&[0xEF, 0x04, 0x00, 0x68, 0, 0, 0, 0, 0, 0, 0, 0x40]]);
    assert_eq!(read(&data), vec![]);
}

#[test]
fn expansion_inside_a_container_ends_with_the_container() {
    // [(:repeat 2 1), 9] (:values)
    let data = stream(&[&[
        0xB9, 0xEF, 0x04, 0x01, 0x61, 0x02, 0x61, 0x01, 0x61, 0x09, 0xEF, 0x01, 0x00,
    ]]);
    assert_eq!(
        read(&data),
        vec![Element::list(vec![Element::int(1), Element::int(1), Element::int(9)])]
    );
}
