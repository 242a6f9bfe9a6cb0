use sereal::{
    Compression, Decoder, DecoderConfig, Encoder, EncoderConfig, Error, Object, ObjectRef,
};

/// A body that compresses well: one long run of repeated bytes.
fn compressible() -> ObjectRef {
    Object::Bytes(vec![0x61; 4096]).into_ref()
}

fn encoding_nibble(document: &[u8]) -> u8 {
    document[4] >> 4
}

fn version_nibble(document: &[u8]) -> u8 {
    document[4] & 0x0F
}

fn assert_roundtrip(document: &[u8], expected: &ObjectRef) {
    let decoded = Decoder::new().decode(document).unwrap();
    assert_eq!(*decoded.body.borrow(), *expected.borrow());
}

#[test]
fn test_snappy_frame_roundtrip() {
    let value = compressible();
    let mut encoder = Encoder::with_config(EncoderConfig {
        compression: Compression::Snappy,
        ..EncoderConfig::default()
    });
    let document = encoder.encode(&value).unwrap().to_vec();
    assert_eq!(encoding_nibble(&document), 2);
    assert!(document.len() < 4096);
    assert_roundtrip(&document, &value);
}

#[test]
fn test_snappy_legacy_frame_roundtrip() {
    let value = compressible();
    let mut encoder = Encoder::with_config(EncoderConfig {
        protocol_version: 1,
        compression: Compression::Snappy,
        ..EncoderConfig::default()
    });
    let document = encoder.encode(&value).unwrap().to_vec();
    assert_eq!(version_nibble(&document), 1);
    assert_eq!(encoding_nibble(&document), 1);
    assert_roundtrip(&document, &value);
}

#[test]
fn test_zlib_frame_roundtrip() {
    let value = compressible();
    let mut encoder = Encoder::with_config(EncoderConfig {
        compression: Compression::Zlib { level: 6 },
        ..EncoderConfig::default()
    });
    let document = encoder.encode(&value).unwrap().to_vec();
    assert_eq!(encoding_nibble(&document), 3);
    assert!(document.len() < 4096);
    assert_roundtrip(&document, &value);
}

#[test]
fn test_zstd_frame_roundtrip() {
    let value = compressible();
    let mut encoder = Encoder::with_config(EncoderConfig {
        protocol_version: 4,
        compression: Compression::Zstd { level: 3 },
        ..EncoderConfig::default()
    });
    let document = encoder.encode(&value).unwrap().to_vec();
    assert_eq!(version_nibble(&document), 4);
    assert_eq!(encoding_nibble(&document), 4);
    assert!(document.len() < 4096);
    assert_roundtrip(&document, &value);
}

#[test]
fn test_body_below_threshold_stays_raw() {
    let value = Object::Bytes(vec![0x61; 64]).into_ref();
    let mut encoder = Encoder::with_config(EncoderConfig {
        compression: Compression::Zlib { level: 6 },
        compression_threshold: 1024,
        ..EncoderConfig::default()
    });
    let document = encoder.encode(&value).unwrap().to_vec();
    // The encoding nibble is cleared back to raw.
    assert_eq!(encoding_nibble(&document), 0);
    assert_roundtrip(&document, &value);
}

#[test]
fn test_incompressible_frame_is_abandoned() {
    // A pseudo-random byte string defeats the codec; the raw document
    // must win and carry the raw encoding nibble.
    let mut state = 0x2545F4914F6CDD1Du64;
    let noise: Vec<u8> = (0..4096)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state as u8
        })
        .collect();
    let value = Object::Bytes(noise).into_ref();
    let mut encoder = Encoder::with_config(EncoderConfig {
        compression: Compression::Snappy,
        compression_threshold: 0,
        ..EncoderConfig::default()
    });
    let document = encoder.encode(&value).unwrap().to_vec();
    assert_eq!(encoding_nibble(&document), 0);
    assert_roundtrip(&document, &value);
}

#[test]
fn test_compressed_document_with_user_header() {
    let header = Object::Bytes(b"meta".to_vec()).into_ref();
    let value = compressible();
    let mut encoder = Encoder::with_config(EncoderConfig {
        compression: Compression::Snappy,
        ..EncoderConfig::default()
    });
    let document = encoder
        .encode_with_header(Some(&header), &value)
        .unwrap()
        .to_vec();
    assert_eq!(encoding_nibble(&document), 2);

    let decoded = Decoder::new().decode(&document).unwrap();
    assert_eq!(
        *decoded.header.expect("header survives compression").borrow(),
        Object::Bytes(b"meta".to_vec())
    );
    assert_eq!(*decoded.body.borrow(), *value.borrow());
}

#[test]
fn test_back_references_inside_compressed_body() {
    let shared = Object::Array(vec![Object::Bytes(vec![0x61; 2048]).into_ref()]).into_ref();
    let outer = Object::Array(vec![shared.clone(), shared]).into_ref();
    let mut encoder = Encoder::with_config(EncoderConfig {
        protocol_version: 4,
        compression: Compression::Zstd { level: 3 },
        ..EncoderConfig::default()
    });
    let document = encoder.encode(&outer).unwrap().to_vec();
    assert_eq!(encoding_nibble(&document), 4);

    let decoded = Decoder::new().decode(&document).unwrap();
    let body = decoded.body.borrow();
    match &*body {
        Object::Array(items) => assert!(std::rc::Rc::ptr_eq(&items[0], &items[1])),
        other => panic!("expected array, got {:?}", other),
    }
}

#[test]
fn test_zlib_requires_protocol_three() {
    let mut encoder = Encoder::with_config(EncoderConfig {
        protocol_version: 2,
        compression: Compression::Zlib { level: 6 },
        ..EncoderConfig::default()
    });
    assert_eq!(
        encoder.encode(&Object::Integer(1).into_ref()).err(),
        Some(Error::BadEncoding)
    );
}

#[test]
fn test_zstd_requires_protocol_four() {
    let mut encoder = Encoder::with_config(EncoderConfig {
        protocol_version: 3,
        compression: Compression::Zstd { level: 3 },
        ..EncoderConfig::default()
    });
    assert_eq!(
        encoder.encode(&Object::Integer(1).into_ref()).err(),
        Some(Error::BadEncoding)
    );
}

#[test]
fn test_refusal_flags() {
    let value = compressible();

    let mut snappy = Encoder::with_config(EncoderConfig {
        compression: Compression::Snappy,
        ..EncoderConfig::default()
    });
    let snappy_document = snappy.encode(&value).unwrap().to_vec();
    let decoder = Decoder::with_config(DecoderConfig {
        refuse_snappy: true,
        ..DecoderConfig::default()
    });
    assert!(matches!(
        decoder.decode(&snappy_document).err(),
        Some(Error::BadEncoding)
    ));

    let mut zstd = Encoder::with_config(EncoderConfig {
        protocol_version: 4,
        compression: Compression::Zstd { level: 3 },
        ..EncoderConfig::default()
    });
    let zstd_document = zstd.encode(&value).unwrap().to_vec();
    let decoder = Decoder::with_config(DecoderConfig {
        refuse_zstd: true,
        ..DecoderConfig::default()
    });
    assert!(matches!(
        decoder.decode(&zstd_document).err(),
        Some(Error::BadEncoding)
    ));
}

#[test]
fn test_decode_from_reader_stream_mode() {
    let value = compressible();
    let mut encoder = Encoder::with_config(EncoderConfig {
        compression: Compression::Zlib { level: 6 },
        ..EncoderConfig::default()
    });
    let document = encoder.encode(&value).unwrap().to_vec();

    let mut reader: &[u8] = &document;
    let mut decoder = Decoder::new();
    let decoded = decoder.decode_from_reader(&mut reader).unwrap();
    assert_eq!(*decoded.body.borrow(), *value.borrow());
}

#[test]
fn test_incremental_decoding_of_two_documents() {
    let mut encoder = Encoder::new();
    let mut stream = encoder
        .encode(&Object::Integer(1).into_ref())
        .unwrap()
        .to_vec();
    stream.extend_from_slice(
        encoder
            .encode(&Object::Bytes(b"second".to_vec()).into_ref())
            .unwrap(),
    );

    let mut reader: &[u8] = &stream;
    let mut decoder = Decoder::with_config(DecoderConfig {
        incremental: true,
        ..DecoderConfig::default()
    });
    let first = decoder.decode_from_reader(&mut reader).unwrap();
    assert_eq!(*first.body.borrow(), Object::Integer(1));
    let second = decoder.decode_from_reader(&mut reader).unwrap();
    assert_eq!(*second.body.borrow(), Object::Bytes(b"second".to_vec()));
}

#[test]
fn test_stream_truncation_is_reported() {
    let value = compressible();
    let mut encoder = Encoder::with_config(EncoderConfig {
        compression: Compression::Snappy,
        ..EncoderConfig::default()
    });
    let document = encoder.encode(&value).unwrap().to_vec();

    let mut reader: &[u8] = &document[..document.len() - 3];
    let mut decoder = Decoder::new();
    assert!(matches!(
        decoder.decode_from_reader(&mut reader).err(),
        Some(Error::Truncated)
    ));
}
