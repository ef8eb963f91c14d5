//! Hex codec and id ordering properties.

use proptest::prelude::*;

use bup_hash::ObjectId;

proptest! {
    #[test]
    fn hex_roundtrip(bytes in any::<[u8; 20]>()) {
        let oid = ObjectId(bytes);
        let hex = oid.to_hex();
        prop_assert_eq!(hex.len(), 40);
        prop_assert_eq!(ObjectId::from_hex(&hex).unwrap(), oid);
    }

    #[test]
    fn ordering_matches_byte_order(a in any::<[u8; 20]>(), b in any::<[u8; 20]>()) {
        let (oa, ob) = (ObjectId(a), ObjectId(b));
        prop_assert_eq!(oa.cmp(&ob), a.cmp(&b));
        // Hex ordering agrees with byte ordering for lowercase hex.
        prop_assert_eq!(oa.to_hex().cmp(&ob.to_hex()), a.cmp(&b));
    }

    #[test]
    fn top_bits_prefix_of_first_bytes(bytes in any::<[u8; 20]>(), bits in 0u32..=32) {
        let oid = ObjectId(bytes);
        let word = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let expected = if bits == 0 { 0 } else { word >> (32 - bits) };
        prop_assert_eq!(oid.top_bits(bits), expected);
    }
}
