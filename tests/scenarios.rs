use std::rc::Rc;

use sereal::document::tag;
use sereal::{Decoder, DecoderConfig, Encoder, EncoderConfig, Error, Object};

fn v2_encoder() -> Encoder {
    Encoder::with_config(EncoderConfig {
        protocol_version: 2,
        ..EncoderConfig::default()
    })
}

fn body_of(document: &[u8]) -> &[u8] {
    &document[6..]
}

#[test]
fn test_encode_small_positive_integer() {
    let mut encoder = v2_encoder();
    let document = encoder.encode(&Object::Integer(7).into_ref()).unwrap();
    assert_eq!(document, &[0x3D, 0x73, 0x72, 0x6C, 0x02, 0x00, 0x07]);
}

#[test]
fn test_encode_small_negative_integer() {
    let mut encoder = v2_encoder();
    let document = encoder.encode(&Object::Integer(-3).into_ref()).unwrap();
    assert_eq!(body_of(document), &[0x1D]);
}

#[test]
fn test_encode_short_binary() {
    let mut encoder = v2_encoder();
    let document = encoder
        .encode(&Object::Bytes(b"hi".to_vec()).into_ref())
        .unwrap();
    assert_eq!(body_of(document), &[0x62, 0x68, 0x69]);
}

#[test]
fn test_encode_repeated_string_as_copy() {
    let mut encoder = v2_encoder();
    let array = Object::Array(vec![
        Object::Bytes(b"a".to_vec()).into_ref(),
        Object::Bytes(b"a".to_vec()).into_ref(),
    ])
    .into_ref();
    let document = encoder.encode(&array).unwrap();
    assert_eq!(
        body_of(document),
        &[0x28, 0x2B, 0x02, 0x61, 0x61, 0x2F, 0x04]
    );
}

#[test]
fn test_encode_cyclic_list() {
    let mut encoder = v2_encoder();
    let list = Object::Array(Vec::new()).into_ref();
    match &mut *list.borrow_mut() {
        Object::Array(items) => items.push(list.clone()),
        _ => unreachable!(),
    }
    let document = encoder.encode(&list).unwrap();
    // REFN carries the track bit; REFP points back at its offset.
    assert_eq!(body_of(document), &[0xA8, 0x2B, 0x01, 0x29, 0x01]);
}

#[test]
fn test_encode_single_entry_hash() {
    let mut encoder = v2_encoder();
    let mut entries = std::collections::BTreeMap::new();
    entries.insert(b"k".to_vec(), Object::Bytes(b"v".to_vec()).into_ref());
    let document = encoder.encode(&Object::Hash(entries).into_ref()).unwrap();
    assert_eq!(
        body_of(document),
        &[0x28, 0x2A, 0x01, 0x61, 0x6B, 0x61, 0x76]
    );

    let decoded = Decoder::new().decode(document).unwrap();
    let body = decoded.body.borrow();
    match &*body {
        Object::Hash(entries) => {
            assert_eq!(entries.len(), 1);
            assert_eq!(
                *entries[&b"k".to_vec()].borrow(),
                Object::Bytes(b"v".to_vec())
            );
        }
        other => panic!("expected hash, got {:?}", other),
    }
}

#[test]
fn test_decode_cyclic_list_shares_cell() {
    let document = [0x3D, 0x73, 0x72, 0x6C, 0x02, 0x00, 0xA8, 0x2B, 0x01, 0x29, 0x01];
    let decoded = Decoder::new().decode(&document).unwrap();
    let body = decoded.body.borrow();
    match &*body {
        Object::Array(items) => {
            assert_eq!(items.len(), 1);
            assert!(Rc::ptr_eq(&items[0], &decoded.body));
        }
        other => panic!("expected array, got {:?}", other),
    }
}

#[test]
fn test_decode_non_minimal_varint() {
    // VARINT 7 encoded as 0x87 0x00: non-minimal but valid.
    let document = [0x3D, 0xF3, 0x72, 0x6C, 0x03, 0x00, 0x20, 0x87, 0x00];
    let decoded = Decoder::new().decode(&document).unwrap();
    assert_eq!(*decoded.body.borrow(), Object::Integer(7));
}

#[test]
fn test_decode_arrayref_short_form() {
    // ARRAYREF with two packed elements; accepted although the encoder
    // always emits the long form.
    let document = [0x3D, 0xF3, 0x72, 0x6C, 0x03, 0x00, 0x42, 0x01, 0x02];
    let decoded = Decoder::new().decode(&document).unwrap();
    assert_eq!(
        *decoded.body.borrow(),
        Object::Array(vec![
            Object::Integer(1).into_ref(),
            Object::Integer(2).into_ref(),
        ])
    );
}

#[test]
fn test_decode_pad_is_skipped() {
    let document = [0x3D, 0xF3, 0x72, 0x6C, 0x03, 0x00, 0x3F, 0x3F, 0x07];
    let decoded = Decoder::new().decode(&document).unwrap();
    assert_eq!(*decoded.body.borrow(), Object::Integer(7));
}

#[test]
fn test_decode_bad_magic() {
    assert!(matches!(
        Decoder::new().decode(b"bplist00\x07").err(),
        Some(Error::BadMagic)
    ));
}

#[test]
fn test_decode_truncated_preamble() {
    assert!(matches!(
        Decoder::new().decode(&[0x3D, 0x73, 0x72, 0x6C]).err(),
        Some(Error::Truncated)
    ));
}

#[test]
fn test_decode_version_zero() {
    assert!(matches!(
        Decoder::new()
            .decode(&[0x3D, 0x73, 0x72, 0x6C, 0x00, 0x00, 0x07])
            .err(),
        Some(Error::BadVersion)
    ));
}

#[test]
fn test_decode_magic_version_mismatch() {
    // Version 3 behind the pre-3 magic number.
    assert!(matches!(
        Decoder::new()
            .decode(&[0x3D, 0x73, 0x72, 0x6C, 0x03, 0x00, 0x07])
            .err(),
        Some(Error::BadVersion)
    ));
}

#[test]
fn test_decode_unknown_encoding() {
    assert!(matches!(
        Decoder::new()
            .decode(&[0x3D, 0xF3, 0x72, 0x6C, 0x53, 0x00, 0x07])
            .err(),
        Some(Error::BadEncoding)
    ));
}

#[test]
fn test_decode_reserved_tag() {
    assert!(matches!(
        Decoder::new()
            .decode(&[0x3D, 0xF3, 0x72, 0x6C, 0x03, 0x00, 0x34])
            .err(),
        Some(Error::InvalidTag(0x34))
    ));
}

#[test]
fn test_decode_dangling_refp() {
    assert!(matches!(
        Decoder::new()
            .decode(&[0x3D, 0xF3, 0x72, 0x6C, 0x03, 0x00, 0x29, 0x05])
            .err(),
        Some(Error::InvalidBackReference)
    ));
}

#[test]
fn test_decode_invalid_utf8() {
    assert!(matches!(
        Decoder::new()
            .decode(&[0x3D, 0xF3, 0x72, 0x6C, 0x03, 0x00, 0x27, 0x01, 0xFF])
            .err(),
        Some(Error::InvalidUtf8)
    ));
}

#[test]
fn test_decode_varint_overflow() {
    let mut document = vec![0x3D, 0xF3, 0x72, 0x6C, 0x03, 0x00, 0x20];
    document.extend_from_slice(&[0xFF; 12]);
    assert!(matches!(
        Decoder::new().decode(&document).err(),
        Some(Error::OverflowError)
    ));
}

#[test]
fn test_decode_truncated_string_payload() {
    // SHORT_BINARY promising five bytes with two present.
    assert!(matches!(
        Decoder::new()
            .decode(&[0x3D, 0xF3, 0x72, 0x6C, 0x03, 0x00, 0x65, 0x61, 0x62])
            .err(),
        Some(Error::Truncated)
    ));
}

#[test]
fn test_decode_copy_must_target_a_string() {
    // COPY pointing at a REFN tag.
    let document = [
        0x3D, 0xF3, 0x72, 0x6C, 0x03, 0x00, 0x28, 0x2B, 0x01, 0x2F, 0x01,
    ];
    assert!(matches!(
        Decoder::new().decode(&document).err(),
        Some(Error::InvalidBackReference)
    ));
}

#[test]
fn test_encoder_depth_limit() {
    let mut encoder = Encoder::with_config(EncoderConfig {
        max_recursion_depth: 10,
        ..EncoderConfig::default()
    });
    let mut value = Object::Integer(1).into_ref();
    for _ in 0..40 {
        value = Object::Array(vec![value]).into_ref();
    }
    assert_eq!(encoder.encode(&value).err(), Some(Error::RecursionLimit));
    assert_eq!(encoder.data(), None);
}

#[test]
fn test_decoder_depth_limit() {
    // Forty nested REFN ARRAY wrappers around one integer.
    let mut document = vec![0x3D, 0xF3, 0x72, 0x6C, 0x03, 0x00];
    for _ in 0..40 {
        document.extend_from_slice(&[tag::REFN, tag::ARRAY, 0x01]);
    }
    document.push(0x01);
    let decoder = Decoder::with_config(DecoderConfig {
        max_recursion_depth: 10,
        ..DecoderConfig::default()
    });
    assert!(matches!(
        decoder.decode(&document).err(),
        Some(Error::RecursionLimit)
    ));
}

#[test]
fn test_encoder_entry_limit() {
    let mut encoder = Encoder::with_config(EncoderConfig {
        max_array_entries: 2,
        ..EncoderConfig::default()
    });
    let array = Object::Array(vec![
        Object::Integer(1).into_ref(),
        Object::Integer(2).into_ref(),
        Object::Integer(3).into_ref(),
    ])
    .into_ref();
    assert_eq!(encoder.encode(&array).err(), Some(Error::EntryLimit));
}

#[test]
fn test_decoder_entry_limit() {
    let document = [
        0x3D, 0xF3, 0x72, 0x6C, 0x03, 0x00, tag::REFN, tag::ARRAY, 0x03, 0x01, 0x02, 0x03,
    ];
    let decoder = Decoder::with_config(DecoderConfig {
        max_array_entries: 2,
        ..DecoderConfig::default()
    });
    assert!(matches!(
        decoder.decode(&document).err(),
        Some(Error::EntryLimit)
    ));
}

#[test]
fn test_decoder_string_length_limit() {
    let document = [0x3D, 0xF3, 0x72, 0x6C, 0x03, 0x00, 0x65, 0x61, 0x62, 0x63, 0x64, 0x65];
    let decoder = Decoder::with_config(DecoderConfig {
        max_string_length: 4,
        ..DecoderConfig::default()
    });
    assert!(matches!(
        decoder.decode(&document).err(),
        Some(Error::LengthLimit)
    ));
}

#[test]
fn test_track_bit_set_on_every_refp_target() {
    // Two slots sharing one array: the REFP offset must carry the track
    // bit in the final stream.
    let mut encoder = v2_encoder();
    let shared = Object::Array(vec![Object::Integer(1).into_ref()]).into_ref();
    let outer = Object::Array(vec![shared.clone(), shared]).into_ref();
    let document = encoder.encode(&outer).unwrap().to_vec();
    let body = body_of(&document);

    // Find the REFP and its offset.
    let refp_at = body
        .iter()
        .position(|&byte| byte == tag::REFP)
        .expect("REFP emitted for the shared array");
    let offset = body[refp_at + 1] as usize;
    assert_eq!(body[offset - 1] & 0x80, 0x80);
}
