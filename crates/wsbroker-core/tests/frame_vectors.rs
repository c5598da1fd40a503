//! Wire vector tests for the frame decoder.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use bytes::Bytes;

use wsbroker_core::protocol::frame::Frame;

use vector_loader::load;

#[test]
fn frame_vectors() {
    let files = [
        "text_unmasked.json",
        "text_masked.json",
        "ping_hello.json",
        "pong_masked.json",
        "binary_len_256.json",
        "close_normal.json",
        "rsv_bits_preserved.json",
        "continuation_not_final.json",
        "reserved_opcode.json",
        "len64_msb_set.json",
        "truncated_header.json",
        "truncated_mask.json",
        "truncated_payload.json",
    ];

    for f in files {
        let v = load(f);
        let raw = v.frame.decode();
        let res = Frame::decode(&mut Bytes::from(raw));

        if let Some(err) = v.expect_error {
            let e = res.expect_err("expected error");
            assert_eq!(e.client_code().as_str(), err.code, "vector={}", v.description);
            continue;
        }

        let frame = res.expect("expected ok frame");
        let ex = v.expect.expect("missing expect block");
        let h = frame.header;

        assert_eq!(h.fin, ex["fin"].as_bool().unwrap(), "vector={}", v.description);
        assert_eq!(h.rsv1, ex["rsv1"].as_bool().unwrap(), "vector={}", v.description);
        assert_eq!(h.rsv2, ex["rsv2"].as_bool().unwrap(), "vector={}", v.description);
        assert_eq!(h.rsv3, ex["rsv3"].as_bool().unwrap(), "vector={}", v.description);
        assert_eq!(h.opcode.as_u8() as u64, ex["opcode"].as_u64().unwrap(), "vector={}", v.description);
        assert_eq!(h.length, ex["length"].as_u64().unwrap(), "vector={}", v.description);

        if ex["mask"].is_null() {
            assert!(h.mask.is_none(), "vector={}", v.description);
        } else {
            assert_eq!(h.mask.unwrap() as u64, ex["mask"].as_u64().unwrap(), "vector={}", v.description);
        }

        assert_eq!(
            hex::encode(&frame.payload),
            ex["payload_hex"].as_str().unwrap(),
            "vector={}",
            v.description
        );
    }
}

#[test]
fn unmasked_vectors_reencode_to_identical_bytes() {
    for f in ["text_unmasked.json", "ping_hello.json", "binary_len_256.json", "rsv_bits_preserved.json"] {
        let v = load(f);
        let raw = v.frame.decode();
        let frame = Frame::decode(&mut Bytes::from(raw.clone())).unwrap();
        assert_eq!(frame.encode().to_vec(), raw, "vector={}", v.description);
    }
}

#[test]
fn masked_vector_reencodes_with_same_key() {
    let v = load("text_masked.json");
    let raw = v.frame.decode();
    let frame = Frame::decode(&mut Bytes::from(raw.clone())).unwrap();
    assert_eq!(&frame.payload[..], b"Hello");
    assert_eq!(frame.encode().to_vec(), raw);
}
