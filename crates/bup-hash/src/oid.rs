use std::fmt;
use std::str::FromStr;

use crate::hex::{hex_decode, hex_to_string};
use crate::HashError;

/// Number of bytes in an object id.
pub const OID_LEN: usize = 20;

/// A content address — the SHA-1 of an object's typed payload.
///
/// Equality is byte equality; ordering is lexicographic over the raw bytes,
/// which is the order every index and merge in the store relies on.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub [u8; OID_LEN]);

impl ObjectId {
    /// The null id (all zeros), used for entries whose hash is not yet known.
    pub const NULL: Self = Self([0u8; OID_LEN]);

    /// Create an ObjectId from a raw byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HashError> {
        if bytes.len() != OID_LEN {
            return Err(HashError::InvalidHashLength {
                expected: OID_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; OID_LEN];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Create an ObjectId from a 40-character hex string.
    pub fn from_hex(hex: &str) -> Result<Self, HashError> {
        let mut bytes = [0u8; OID_LEN];
        hex_decode(hex, &mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; OID_LEN] {
        &self.0
    }

    pub fn is_null(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex_to_string(&self.0)
    }

    /// First byte of the hash (fan-out bucket).
    pub fn first_byte(&self) -> u8 {
        self.0[0]
    }

    /// Top `bits` bits of the hash, read big-endian.
    ///
    /// Used by the parameterised midx fan-out and the pack bitmap. `bits`
    /// must be at most 32.
    pub fn top_bits(&self, bits: u32) -> u32 {
        debug_assert!(bits <= 32);
        if bits == 0 {
            return 0;
        }
        let word = u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        word >> (32 - bits)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", &self.to_hex()[..8])
    }
}

impl FromStr for ObjectId {
    type Err = HashError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}
