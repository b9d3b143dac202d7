use ion_core::{
    encode, read_all, ContainerEncoding, Decimal, Element, IonReader, IonType, Precision, Symbol,
    SymbolEncoding, Timestamp, Value, Version, WriterOptions,
};

fn sample() -> Vec<Element> {
    vec![
        Element::null(),
        Value::Null(IonType::Int).into(),
        Value::Null(IonType::Struct).into(),
        Element::bool(true),
        Element::bool(false),
        Element::int(0),
        Element::int(-1),
        Element::int(300),
        Element::int(i64::MIN as i128),
        Element::int(1 << 100),
        Element::int(-(1 << 90)),
        Element::float(0.0),
        Element::float(1.5),
        Element::float(0.1),
        Element::float(-2.5e300),
        Value::Decimal(Decimal::new(0, 0)).into(),
        Value::Decimal(Decimal::new(0, -2)).into(),
        Value::Decimal(Decimal::negative_zero(-1)).into(),
        Value::Decimal(Decimal::new(-12345, -2)).into(),
        Value::Decimal(Decimal::new(7, 3)).into(),
        Value::Timestamp(Timestamp::year(2024)).into(),
        Value::Timestamp(Timestamp {
            month: 7,
            precision: Precision::Month,
            ..Timestamp::year(1999)
        })
        .into(),
        Value::Timestamp(Timestamp::day(2024, 2, 29)).into(),
        Value::Timestamp(Timestamp::minute(2024, 2, 29, 23, 30, Some(-300))).into(),
        Value::Timestamp(Timestamp::minute(2010, 1, 1, 0, 0, None).with_second(5, None)).into(),
        Value::Timestamp(
            Timestamp::minute(2024, 12, 31, 23, 59, Some(60)).with_second(59, Some(Decimal::new(123, -3))),
        )
        .into(),
        Element::string(""),
        Element::string("hello"),
        Element::string("a string that needs a long length"),
        Element::symbol("name"),
        Element::symbol("user_symbol"),
        Element::symbol(""),
        Value::Blob(vec![0, 1, 2, 0xFF]).into(),
        Value::Clob(b"clob".to_vec()).into(),
        Value::Blob(Vec::new()).into(),
        Element::int(42).with_annotations(vec!["a", "b"]),
        Element::string("x").with_annotations(vec!["name"]),
        Element::list(vec![]),
        Element::list(vec![
            Element::int(1),
            Element::list(vec![Element::symbol("deep")]),
            Element::sexp(vec![Element::symbol("+"), Element::int(2)]),
        ]),
        Element::strukt::<&str>(vec![]),
        Element::strukt(vec![
            ("name", Element::string("n")),
            ("field", Element::int(1)),
            ("field", Element::int(2)),
            ("nested", Element::strukt(vec![("inner", Element::null())])),
        ])
        .with_annotations(vec!["tagged"]),
    ]
}

fn round_trip(options: WriterOptions) {
    let values = sample();
    let bytes = encode(&values, options).unwrap();
    assert_eq!(&bytes[..4], &options.version.marker());
    let decoded = read_all(&mut IonReader::new(&bytes)).unwrap();
    assert_eq!(decoded.len(), values.len());
    for (decoded, value) in decoded.iter().zip(&values) {
        assert_eq!(decoded, value, "{options:?}");
    }
}

#[test]
fn v1_1_interned_length_prefixed() {
    round_trip(WriterOptions::default());
}

#[test]
fn v1_1_inline_symbols() {
    round_trip(WriterOptions {
        symbols: SymbolEncoding::Inline,
        ..WriterOptions::default()
    });
}

#[test]
fn v1_1_delimited_containers() {
    round_trip(WriterOptions {
        containers: ContainerEncoding::Delimited,
        ..WriterOptions::default()
    });
}

#[test]
fn v1_1_inline_delimited() {
    round_trip(WriterOptions {
        version: Version::V1_1,
        symbols: SymbolEncoding::Inline,
        containers: ContainerEncoding::Delimited,
    });
}

#[test]
fn v1_0() {
    round_trip(WriterOptions::v1_0());
}

#[test]
fn interned_output_declares_each_text_once() {
    let values = vec![Element::symbol("repeated"); 10];
    let interned = encode(&values, WriterOptions::default()).unwrap();
    let inline = encode(
        &values,
        WriterOptions {
            symbols: SymbolEncoding::Inline,
            ..WriterOptions::default()
        },
    )
    .unwrap();
    assert!(interned.len() < inline.len());
    let needle = b"repeated";
    let count = interned.windows(needle.len()).filter(|w| w == needle).count();
    assert_eq!(count, 1);
}

#[test]
fn concatenated_streams_reset_the_context() {
    let first = encode(&[Element::symbol("alpha")], WriterOptions::default()).unwrap();
    let second = encode(&[Element::symbol("beta")], WriterOptions::v1_0()).unwrap();
    let mut data = first;
    data.extend(second);
    let mut reader = IonReader::new(&data);
    let values = read_all(&mut reader).unwrap();
    assert_eq!(values, vec![Element::symbol("alpha"), Element::symbol("beta")]);
    assert_eq!(reader.version(), Version::V1_0);
}

#[test]
fn unknown_symbol_zero_survives() {
    let values = vec![Value::Symbol(Symbol::Unknown(0)).into()];
    for options in [WriterOptions::default(), WriterOptions::v1_0()] {
        let bytes = encode(&values, options).unwrap();
        assert_eq!(read_all(&mut IonReader::new(&bytes)).unwrap(), values);
    }
}

#[test]
fn empty_structs_in_every_mode() {
    let values = vec![
        Element::strukt::<&str>(vec![]),
        Element::strukt::<&str>(vec![]).with_annotations(vec!["tag"]),
        Element::list(vec![Element::strukt::<&str>(vec![])]),
        Element::strukt(vec![("outer", Element::strukt::<&str>(vec![]))]),
    ];
    for version in [Version::V1_0, Version::V1_1] {
        for symbols in [SymbolEncoding::Interned, SymbolEncoding::Inline] {
            for containers in [ContainerEncoding::LengthPrefixed, ContainerEncoding::Delimited] {
                let options = WriterOptions {
                    version,
                    symbols,
                    containers,
                };
                let bytes = encode(&values, options).unwrap();
                assert_eq!(
                    read_all(&mut IonReader::new(&bytes)).unwrap(),
                    values,
                    "{options:?}"
                );
            }
        }
    }
}
