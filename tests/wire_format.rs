use pawl::md5_xor;
use pawl::PLHeader;
use pawl::PLPacket;
use pawl::PLTACType;
use pawl::PLTACVersion;

// The pad seed is session_id ++ key ++ version ++ seq_no, recomputed
// here by hand so the library is checked against the RFC and not
// against itself.
fn pad_seed(sesid: u32, key: &[u8], version: u8, seq: u8) -> Vec<u8> {
    let mut seed = vec![];
    seed.extend(&sesid.to_be_bytes());
    seed.extend(key);
    seed.push(version);
    seed.push(seq);
    seed
}

fn sample_header(length: u32) -> PLHeader {
    PLHeader {
        tacp_hdr_version: PLTACVersion::TAC_PLUS_MINOR_VER_DEFAULT,
        tacp_hdr_type: PLTACType::TAC_PLUS_AUTHEN,
        tacp_hdr_seqno: 1,
        tacp_hdr_flags: 0,
        tacp_hdr_sesid: 1,
        tacp_hdr_length: length,
    }
}

#[test]
fn header_round_trip_preserves_fields() {
    let hdr = PLHeader {
        tacp_hdr_version: PLTACVersion::TAC_PLUS_MINOR_VER_ONE,
        tacp_hdr_type: PLTACType::TAC_PLUS_ACCT,
        tacp_hdr_seqno: 42,
        tacp_hdr_flags: 5,
        tacp_hdr_sesid: 0xDEADBEEF,
        tacp_hdr_length: 0xFEEDFACE,
    };

    let raw = hdr.serialize();
    assert_eq!(raw.len(), 12, "headers are always exactly 12 bytes");

    let parsed = PLHeader::from_bytes(&raw).expect("round trip should decode");
    assert!(
        matches!(parsed.tacp_hdr_version, PLTACVersion::TAC_PLUS_MINOR_VER_ONE),
        "version should survive the round trip"
    );
    assert!(
        matches!(parsed.tacp_hdr_type, PLTACType::TAC_PLUS_ACCT),
        "type should survive the round trip"
    );
    assert_eq!(parsed.tacp_hdr_seqno, 42, "seq_no should survive the round trip");
    assert_eq!(parsed.tacp_hdr_flags, 5, "flags pass through untouched");
    assert_eq!(parsed.tacp_hdr_sesid, 0xDEADBEEF, "session id should survive the round trip");
    assert_eq!(parsed.tacp_hdr_length, 0xFEEDFACE, "length should survive the round trip");
}

#[test]
fn version_nibbles_split() {
    let hdr = PLHeader {
        tacp_hdr_version: PLTACVersion::TAC_PLUS_MINOR_VER_ONE,
        tacp_hdr_type: PLTACType::TAC_PLUS_AUTHEN,
        tacp_hdr_seqno: 1,
        tacp_hdr_flags: 0,
        tacp_hdr_sesid: 305419896,
        tacp_hdr_length: 0,
    };

    let raw = hdr.serialize();
    assert_eq!(
        raw,
        vec![0xc1, 0x01, 0x01, 0x00, 0x12, 0x34, 0x56, 0x78, 0x00, 0x00, 0x00, 0x00],
        "fixed layout: version, type, seq, flags, then two big-endian u32s"
    );

    let parsed = PLHeader::from_bytes(&raw).expect("round trip should decode");
    assert_eq!(parsed.get_version_major(), 12, "major version rides the high nibble");
    assert_eq!(parsed.get_version_minor(), 1, "minor version rides the low nibble");
    assert_eq!(parsed.tacp_hdr_sesid, 305419896, "session id should survive the round trip");
    assert_eq!(parsed.tacp_hdr_length, 0, "zero-length bodies are legal");
}

#[test]
fn short_header_is_rejected() {
    assert!(PLHeader::from_bytes(&[]).is_err(), "empty input is not a header");
    assert!(
        PLHeader::from_bytes(&[0xc0, 0x01, 0x01]).is_err(),
        "three bytes are not a header"
    );

    // Enough for the fixed fields, not enough for the two u32s.
    let full = sample_header(0).serialize();
    assert!(
        PLHeader::from_bytes(&full[..8]).is_err(),
        "a header cut inside the u32s is not a header"
    );

    let err = PLHeader::from_bytes(&[0xc0]).expect_err("one byte is not a header");
    assert!(
        err.contains("key does not match"),
        "the short-read error should point at the usual suspect"
    );
}

#[test]
fn pad_matches_requested_length() {
    for length in [0u32, 1, 5, 15, 16, 17, 40, 64, 333] {
        let pad = sample_header(length).compute_md5_pad(b"testkey");
        assert_eq!(pad.len(), length as usize, "pad must truncate to the body length");
    }
}

#[test]
fn single_hash_pad_covers_short_bodies() {
    let hdr = sample_header(5);
    let pad = hdr.compute_md5_pad(b"testkey");

    let seed = pad_seed(0x00000001, b"testkey", 0xc0, 1);
    let hash_1 = md5::compute(&seed).to_vec();
    assert_eq!(pad, hash_1[..5].to_vec(), "five bytes fit inside the first hash");

    let once = md5_xor(b"hello", &pad);
    let twice = md5_xor(&once, &pad);
    assert_eq!(twice, b"hello".to_vec(), "the pad undoes itself");
}

#[test]
fn chained_hashes_cover_longer_bodies() {
    let hdr = sample_header(40);
    let pad = hdr.compute_md5_pad(b"testkey");

    let seed = pad_seed(0x00000001, b"testkey", 0xc0, 1);
    let hash_1 = md5::compute(&seed).to_vec();
    let hash_2 = md5::compute([seed.clone(), hash_1.clone()].concat()).to_vec();
    let hash_3 = md5::compute([seed.clone(), hash_2.clone()].concat()).to_vec();

    let chained = [hash_1, hash_2, hash_3].concat();
    assert_eq!(
        pad,
        chained[..40].to_vec(),
        "forty bytes take three chained hashes, truncated"
    );
}

#[test]
fn obfuscation_is_its_own_inverse() {
    let body = b"user wants to log in".to_vec();
    #[allow(clippy::cast_possible_truncation)]
    let hdr = sample_header(body.len() as u32);

    let pkt = PLPacket::from_parts(hdr, body.clone(), Some(b"testing123"));
    assert!(pkt.is_encrypted(), "a keyed packet is obfuscated");

    let wire = pkt.serialize();
    assert_eq!(wire.len(), 12 + body.len(), "obfuscation preserves length");
    assert_ne!(wire[12..].to_vec(), body, "the wire body should not be cleartext");

    let rx = PLPacket::from_wire(&wire[..12], &wire[12..], Some(b"testing123"))
        .expect("well-formed wire bytes should reassemble");
    assert_eq!(rx.cleartext_body(), body, "two applications of the pad cancel out");
}

#[test]
fn unkeyed_packet_passes_body_through() {
    let body = b"plaintext peering".to_vec();
    #[allow(clippy::cast_possible_truncation)]
    let hdr = sample_header(body.len() as u32);
    let hdr_bytes = hdr.serialize();

    let pkt = PLPacket::from_parts(hdr, body.clone(), None);
    assert!(!pkt.is_encrypted(), "no key, no obfuscation");
    assert_eq!(pkt.wire_body(), body, "the body must ride unchanged");

    let wire = pkt.serialize();
    assert_eq!(wire[..12].to_vec(), hdr_bytes, "header leads the segment");
    assert_eq!(wire[12..].to_vec(), body, "body trails the header verbatim");
}

#[test]
fn truncated_body_is_refused() {
    let body = b"does not all arrive".to_vec();
    #[allow(clippy::cast_possible_truncation)]
    let hdr = sample_header(body.len() as u32);
    let wire = PLPacket::from_parts(hdr, body, Some(b"testing123")).serialize();

    let short = PLPacket::from_wire(&wire[..12], &wire[12..20], Some(b"testing123"));
    assert!(short.is_err(), "a short body is a framing fault, not a packet");

    let long = PLPacket::from_wire(&wire[..12], &[&wire[12..], &[0u8][..]].concat(), Some(b"testing123"));
    assert!(long.is_err(), "extra trailing bytes don't add up either");
}
