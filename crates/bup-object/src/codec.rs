//! Pack-record and loose-object encodings.
//!
//! A pack record is a variable-length size prefix followed by the
//! zlib-compressed payload:
//!
//! ```text
//! byte 0:  C T T T S S S S   (C = continuation, TTT = type code,
//!                             SSSS = low 4 bits of the size)
//! byte n:  C S S S S S S S   (7 more size bits, increasing significance)
//! ```
//!
//! A loose object is `deflate("<type> <len>\0<content>")`.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::{ObjectError, ObjectType};

/// Encode one pack record: size prefix + deflated payload.
pub fn encode_pack_object(obj_type: ObjectType, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() / 2 + 16);

    let mut sz = content.len() as u64;
    let mut byte = ((sz & 0x0f) as u8) | (obj_type.code() << 4);
    sz >>= 4;
    loop {
        if sz != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if sz == 0 {
            break;
        }
        byte = (sz & 0x7f) as u8;
        sz >>= 7;
    }

    let mut enc = ZlibEncoder::new(out, Compression::fast());
    enc.write_all(content).expect("write to Vec cannot fail");
    enc.finish().expect("write to Vec cannot fail")
}

/// Decode the size prefix of a pack record.
///
/// Returns `(type, uncompressed size, prefix length)`. Never reads past the
/// end of `buf`; a prefix that does or that overflows 64 bits is rejected.
pub fn decode_pack_prefix(buf: &[u8]) -> Result<(ObjectType, u64, usize), ObjectError> {
    let first = *buf.first().ok_or(ObjectError::Truncated)?;
    let obj_type = ObjectType::from_code((first & 0x70) >> 4)?;
    let mut sz = (first & 0x0f) as u64;
    let mut shift = 4;
    let mut i = 0;
    let mut c = first;
    while c & 0x80 != 0 {
        i += 1;
        c = *buf.get(i).ok_or(ObjectError::Truncated)?;
        if shift >= 64 {
            return Err(ObjectError::SizeOverflow);
        }
        let bits = (c & 0x7f) as u64;
        let add = bits << shift;
        if add >> shift != bits {
            return Err(ObjectError::SizeOverflow);
        }
        sz |= add;
        shift += 7;
    }
    Ok((obj_type, sz, i + 1))
}

/// Decode one pack record into `(type, content)`.
pub fn decode_pack_object(buf: &[u8]) -> Result<(ObjectType, Vec<u8>), ObjectError> {
    let (obj_type, sz, prefix_len) = decode_pack_prefix(buf)?;
    // The declared size is untrusted; let the vec grow instead of
    // preallocating whatever the prefix claims.
    let mut content = Vec::with_capacity(sz.min(1 << 20) as usize);
    ZlibDecoder::new(&buf[prefix_len..])
        .read_to_end(&mut content)
        .map_err(ObjectError::Zlib)?;
    if content.len() as u64 != sz {
        return Err(ObjectError::SizeMismatch {
            expected: sz,
            actual: content.len(),
        });
    }
    Ok((obj_type, content))
}

/// Encode a loose object: deflated `"<type> <len>\0<content>"`.
pub fn encode_loose(obj_type: ObjectType, content: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::fast());
    enc.write_all(format!("{obj_type} {}\0", content.len()).as_bytes())
        .expect("write to Vec cannot fail");
    enc.write_all(content).expect("write to Vec cannot fail");
    enc.finish().expect("write to Vec cannot fail")
}

/// Decode a loose object into `(type, content)`.
pub fn decode_loose(buf: &[u8]) -> Result<(ObjectType, Vec<u8>), ObjectError> {
    let mut raw = Vec::new();
    ZlibDecoder::new(buf)
        .read_to_end(&mut raw)
        .map_err(ObjectError::Zlib)?;

    let nul = raw
        .iter()
        .position(|&b| b == 0)
        .ok_or(ObjectError::Truncated)?;
    let header = std::str::from_utf8(&raw[..nul]).map_err(|_| ObjectError::MalformedPayload {
        kind: "loose header",
        offset: 0,
    })?;
    let (type_name, len_str) = header.split_once(' ').ok_or(ObjectError::MalformedPayload {
        kind: "loose header",
        offset: 0,
    })?;
    let obj_type = ObjectType::from_name(type_name)?;
    let expected: u64 = len_str.parse().map_err(|_| ObjectError::MalformedPayload {
        kind: "loose header",
        offset: type_name.len() + 1,
    })?;

    let content = raw.split_off(nul + 1);
    if content.len() as u64 != expected {
        return Err(ObjectError::SizeMismatch {
            expected,
            actual: content.len(),
        });
    }
    Ok((obj_type, content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_roundtrip_small() {
        let data = b"hello pack";
        let rec = encode_pack_object(ObjectType::Blob, data);
        let (t, content) = decode_pack_object(&rec).unwrap();
        assert_eq!(t, ObjectType::Blob);
        assert_eq!(content, data);
    }

    #[test]
    fn pack_roundtrip_empty() {
        let rec = encode_pack_object(ObjectType::Tree, b"");
        // Empty payload fits the low nibble; single prefix byte.
        assert_eq!(rec[0] & 0x80, 0);
        assert_eq!((rec[0] & 0x70) >> 4, 2);
        let (t, content) = decode_pack_object(&rec).unwrap();
        assert_eq!(t, ObjectType::Tree);
        assert!(content.is_empty());
    }

    #[test]
    fn pack_roundtrip_multi_byte_prefix() {
        // 300 bytes needs a second prefix byte (300 >> 4 = 18).
        let data = vec![0x5a; 300];
        let rec = encode_pack_object(ObjectType::Blob, &data);
        assert_eq!(rec[0] & 0x80, 0x80);
        let (t, sz, n) = decode_pack_prefix(&rec).unwrap();
        assert_eq!(t, ObjectType::Blob);
        assert_eq!(sz, 300);
        assert_eq!(n, 2);
        let (_, content) = decode_pack_object(&rec).unwrap();
        assert_eq!(content, data);
    }

    #[test]
    fn prefix_never_reads_past_end() {
        assert!(matches!(
            decode_pack_prefix(&[]),
            Err(ObjectError::Truncated)
        ));
        // Continuation bit set, but no next byte.
        assert!(matches!(
            decode_pack_prefix(&[0xb0]),
            Err(ObjectError::Truncated)
        ));
    }

    #[test]
    fn prefix_size_overflow_rejected() {
        // 10 continuation bytes push the shift past 64 bits.
        let mut buf = vec![0xbf];
        buf.extend(std::iter::repeat(0xff).take(9));
        buf.push(0x7f);
        assert!(matches!(
            decode_pack_prefix(&buf),
            Err(ObjectError::SizeOverflow)
        ));
    }

    #[test]
    fn declared_size_must_match_payload() {
        let mut rec = encode_pack_object(ObjectType::Blob, b"abcd");
        // Corrupt the low size nibble: claim 5 bytes instead of 4.
        rec[0] = (rec[0] & 0xf0) | 5;
        assert!(matches!(
            decode_pack_object(&rec),
            Err(ObjectError::SizeMismatch {
                expected: 5,
                actual: 4
            })
        ));
    }

    #[test]
    fn loose_roundtrip() {
        let data = b"loose content";
        let enc = encode_loose(ObjectType::Blob, data);
        let (t, content) = decode_loose(&enc).unwrap();
        assert_eq!(t, ObjectType::Blob);
        assert_eq!(content, data);
    }

    #[test]
    fn loose_header_validated() {
        use flate2::write::ZlibEncoder;
        use std::io::Write;

        let mut enc = ZlibEncoder::new(Vec::new(), Compression::fast());
        enc.write_all(b"blob 99\0short").unwrap();
        let bad = enc.finish().unwrap();
        assert!(matches!(
            decode_loose(&bad),
            Err(ObjectError::SizeMismatch { expected: 99, .. })
        ));
    }
}
