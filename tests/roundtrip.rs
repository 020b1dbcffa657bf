use wbxml::dom::{Document, Element, Node};
use wbxml::{
    Decoder, DecoderOptions, Encoder, EncoderOptions, OpaqueEncoding, WbxmlError, decode, encode,
};

const SYNC_REQUEST: &str = r#"<?xml version="1.0" encoding="utf-8"?><Sync xmlns="AirSync" xmlns:email="Email"><Collections><Collection><CollectionId>1</CollectionId><Status>1</Status></Collection></Collections></Sync>"#;

const SYNC_REQUEST_WBXML: [u8; 20] = [
    3, 1, 106, 0, 69, 92, 79, 82, 3, 49, 0, 1, 78, 3, 49, 0, 1, 1, 1, 1,
];

const SYNC_RESPONSE_XML: &str = concat!(
    r#"<?xml version="1.0"?>"#,
    r#"<!DOCTYPE ActiveSync PUBLIC "-//MICROSOFT//DTD ActiveSync//EN" "http://www.microsoft.com/">"#,
    r#"<Sync xmlns="AirSync:"><Collections><Collection><CollectionId>1</CollectionId><Status>1</Status></Collection></Collections></Sync>"#
);

fn roundtrip(xml: &str) -> Document {
    let encoder = Encoder::default();
    let decoder = Decoder::default();
    let wbxml = encoder.encode(xml.as_bytes()).unwrap();
    decoder.decode_document(&wbxml).unwrap()
}

#[test]
fn test_sync_request_vector() {
    let wbxml = encode(SYNC_REQUEST.as_bytes(), &EncoderOptions::default()).unwrap();
    assert_eq!(wbxml, SYNC_REQUEST_WBXML);

    let xml = decode(&wbxml, &DecoderOptions::default()).unwrap();
    assert_eq!(String::from_utf8(xml).unwrap(), SYNC_RESPONSE_XML);
}

#[test]
fn test_decoded_output_encodes_to_the_same_bytes() {
    let xml = decode(&SYNC_REQUEST_WBXML, &DecoderOptions::default()).unwrap();
    let wbxml = encode(&xml, &EncoderOptions::default()).unwrap();
    assert_eq!(wbxml, SYNC_REQUEST_WBXML);
}

#[test]
fn test_multi_page_document() {
    let xml = r#"<Sync xmlns="AirSync" xmlns:airsyncbase="AirSyncBase" xmlns:email="Email"><Collections><Collection><SyncKey>0</SyncKey><CollectionId>5</CollectionId><Options><airsyncbase:BodyPreference><airsyncbase:Type>2</airsyncbase:Type><airsyncbase:TruncationSize>5120</airsyncbase:TruncationSize></airsyncbase:BodyPreference></Options><Commands><Change><ServerId>5:1</ServerId><ApplicationData><email:Read>1</email:Read></ApplicationData></Change></Commands></Collection></Collections></Sync>"#;
    let document = roundtrip(xml);

    let collection = document
        .root
        .child_elements()
        .next()
        .and_then(|collections| collections.child_elements().next())
        .unwrap();
    let names: Vec<&str> = collection.child_elements().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["SyncKey", "CollectionId", "Options", "Commands"]);

    let preference = collection
        .child_elements()
        .nth(2)
        .and_then(|options| options.child_elements().next())
        .unwrap();
    assert_eq!(preference.name, "BodyPreference");
    assert_eq!(preference.namespace.as_deref(), Some("AirSyncBase:"));
    let size = preference.child_elements().nth(1).unwrap();
    assert_eq!(size.name, "TruncationSize");
    assert_eq!(size.text(), "5120");

    let xml = String::from_utf8(decode(
        &encode(xml.as_bytes(), &EncoderOptions::default()).unwrap(),
        &DecoderOptions::default(),
    )
    .unwrap())
    .unwrap();
    assert!(xml.contains(r#"<Options><BodyPreference xmlns="AirSyncBase:"><Type>2</Type>"#));
    assert!(xml.contains(r#"<ApplicationData><Read xmlns="Email:">1</Read></ApplicationData>"#));
}

#[test]
fn test_whitespace_survives() {
    let document = roundtrip("<Sync xmlns=\"AirSync\"><Status>\n  \t</Status></Sync>");
    let status = document.root.child_elements().next().unwrap();
    assert_eq!(status.children, vec![Node::Text("\n  \t".to_string())]);
}

#[test]
fn test_literal_element_roundtrip() {
    let wbxml = encode(b"<foo/>", &EncoderOptions::default()).unwrap();
    let xml = String::from_utf8(decode(&wbxml, &DecoderOptions::default()).unwrap()).unwrap();
    assert!(xml.ends_with("<foo/>"));

    let options = EncoderOptions {
        use_string_table: true,
        ..EncoderOptions::default()
    };
    let wbxml = encode(br#"<Sync xmlns="AirSync"><X-Custom>v</X-Custom><X-Custom>v</X-Custom></Sync>"#, &options).unwrap();
    let document = Decoder::default().decode_document(&wbxml).unwrap();
    let names: Vec<&str> = document.root.child_elements().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["X-Custom", "X-Custom"]);
    assert!(document.root.child_elements().all(|e| e.text() == "v"));
}

#[test]
fn test_string_table_text_roundtrip() {
    let options = EncoderOptions {
        use_string_table: true,
        ..EncoderOptions::default()
    };
    let xml = r#"<Sync xmlns="AirSync"><Class>Email</Class><Class>Email</Class></Sync>"#;
    let wbxml = encode(xml.as_bytes(), &options).unwrap();
    let plain = encode(xml.as_bytes(), &EncoderOptions::default()).unwrap();
    assert!(wbxml.len() < plain.len());

    let document = Decoder::default().decode_document(&wbxml).unwrap();
    assert!(document.root.child_elements().all(|e| e.text() == "Email"));
}

#[test]
fn test_public_id_roundtrip() {
    let options = EncoderOptions {
        include_public_id: true,
        ..EncoderOptions::default()
    };
    let wbxml = encode(br#"<Ping xmlns="Ping"><Status>1</Status></Ping>"#, &options).unwrap();
    assert_eq!(wbxml[1], 0x00);
    let document = Decoder::default().decode_document(&wbxml).unwrap();
    assert_eq!(document.root.name, "Ping");
    assert_eq!(document.root.namespace.as_deref(), Some("Ping:"));
}

#[test]
fn test_opaque_roundtrip() {
    let xml = r#"<Sync xmlns="AirSync" xmlns:email2="Email2"><email2:ConversationIndex>CA2CFA8A23</email2:ConversationIndex></Sync>"#;
    let options = EncoderOptions {
        opaque_encoding: OpaqueEncoding::Hex,
        ..EncoderOptions::default()
    };
    let wbxml = encode(xml.as_bytes(), &options).unwrap();
    assert!(wbxml.windows(7).any(|w| w == [0xC3, 0x05, 0xCA, 0x2C, 0xFA, 0x8A, 0x23]));

    let options = DecoderOptions {
        opaque_encoding: OpaqueEncoding::Hex,
        ..DecoderOptions::default()
    };
    let document = Decoder::new(options).decode_document(&wbxml).unwrap();
    let index = document.root.child_elements().next().unwrap();
    assert_eq!(index.text(), "CA2CFA8A23");
}

#[test]
fn test_document_api() {
    let document = Document::new(
        Element::new("FolderSync")
            .with_namespace("FolderHierarchy")
            .with_child(Element::new("SyncKey").with_text("0")),
    );
    let wbxml = Encoder::default().encode_document(&document).unwrap();
    assert_eq!(
        wbxml,
        [0x03, 0x01, 0x6A, 0x00, 0x00, 0x07, 0x56, 0x52, 0x03, b'0', 0x00, 0x01, 0x01]
    );
}

#[test]
fn test_truncated_streams() {
    for len in 0..SYNC_REQUEST_WBXML.len() {
        let err = Decoder::default()
            .decode_document(&SYNC_REQUEST_WBXML[..len])
            .unwrap_err();
        assert!(
            matches!(
                err,
                WbxmlError::TruncatedStream { .. } | WbxmlError::UnterminatedString { .. }
            ),
            "prefix of {len} bytes gave {err}"
        );
        assert!(err.is_input_error());
    }
}

#[test]
fn test_errors_have_codes() {
    let err = encode(b"abcdef", &EncoderOptions::default()).unwrap_err();
    assert_eq!(err.code(), wbxml::ERROR_MALFORMED_XML);
    let err = decode(&[0, 0, 0], &DecoderOptions::default()).unwrap_err();
    assert_eq!(err.code(), wbxml::ERROR_TRUNCATED_STREAM);
    assert_eq!(wbxml::error_message(err.code()), err.message());
}

fn thread_document(i: usize) -> String {
    format!(
        r#"<Sync xmlns="AirSync" xmlns:email="Email"><Collections><Collection><CollectionId>{i}</CollectionId><email:Subject>subject {i}</email:Subject><X-Thread-{i}/></Collection></Collections></Sync>"#
    )
}

#[test]
fn test_concurrent_use() {
    let encoder = Encoder::default();
    let decoder = Decoder::default();
    let inputs: Vec<String> = (0..8).map(thread_document).collect();
    let expected: Vec<(Vec<u8>, Vec<u8>)> = inputs
        .iter()
        .map(|xml| {
            let wbxml = encoder.encode(xml.as_bytes()).unwrap();
            let xml = decoder.decode(&wbxml).unwrap();
            (wbxml, xml)
        })
        .collect();

    let outputs: Vec<(Vec<u8>, Vec<u8>)> = std::thread::scope(|scope| {
        let handles: Vec<_> = inputs
            .iter()
            .map(|xml| {
                let (encoder, decoder) = (&encoder, &decoder);
                scope.spawn(move || {
                    let wbxml = encoder.encode(xml.as_bytes()).unwrap();
                    let xml = decoder.decode(&wbxml).unwrap();
                    (wbxml, xml)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(outputs.len(), inputs.len());
    for (i, ((wbxml, xml), (expected_wbxml, expected_xml))) in
        outputs.iter().zip(&expected).enumerate()
    {
        assert_eq!(wbxml, expected_wbxml, "thread {i}");
        assert_eq!(xml, expected_xml, "thread {i}");
        let text = String::from_utf8(xml.clone()).unwrap();
        assert!(text.contains(&format!("<CollectionId>{i}</CollectionId>")));
        assert!(text.contains(&format!("<X-Thread-{i}/>")));
    }
    let distinct: std::collections::HashSet<&Vec<u8>> = outputs.iter().map(|(w, _)| w).collect();
    assert_eq!(distinct.len(), outputs.len());
}
