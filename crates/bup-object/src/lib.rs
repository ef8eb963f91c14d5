//! Object model and wire codec for the bup storage core.
//!
//! Objects are immutable, content-addressed byte strings with a type tag.
//! This crate defines the type tags, the compressed pack-record and loose
//! encodings, and the canonical tree/commit payload formats.

pub mod codec;
pub mod commit;
pub mod tree;

use bup_hash::{Hasher, ObjectId};

/// Errors from object encoding and decoding.
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("unknown object type code {0}")]
    UnknownTypeCode(u8),

    #[error("unknown object type {0:?}")]
    UnknownTypeName(String),

    #[error("truncated object record")]
    Truncated,

    #[error("object size prefix overflows 64 bits")]
    SizeOverflow,

    #[error("object size mismatch: header says {expected}, payload is {actual}")]
    SizeMismatch { expected: u64, actual: usize },

    #[error("malformed {kind} payload at offset {offset}")]
    MalformedPayload { kind: &'static str, offset: usize },

    #[error("zlib: {0}")]
    Zlib(std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The object types stored in a pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl ObjectType {
    /// Type code as stored in a pack record's size prefix.
    pub fn code(self) -> u8 {
        match self {
            ObjectType::Commit => 1,
            ObjectType::Tree => 2,
            ObjectType::Blob => 3,
            ObjectType::Tag => 4,
        }
    }

    /// Inverse of [`code`](ObjectType::code).
    pub fn from_code(code: u8) -> Result<Self, ObjectError> {
        match code {
            1 => Ok(ObjectType::Commit),
            2 => Ok(ObjectType::Tree),
            3 => Ok(ObjectType::Blob),
            4 => Ok(ObjectType::Tag),
            other => Err(ObjectError::UnknownTypeCode(other)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectType::Commit => "commit",
            ObjectType::Tree => "tree",
            ObjectType::Blob => "blob",
            ObjectType::Tag => "tag",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, ObjectError> {
        match name {
            "commit" => Ok(ObjectType::Commit),
            "tree" => Ok(ObjectType::Tree),
            "blob" => Ok(ObjectType::Blob),
            "tag" => Ok(ObjectType::Tag),
            other => Err(ObjectError::UnknownTypeName(other.to_string())),
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compute the id of an object: SHA-1 of `"<type> <len>\0<content>"`.
pub fn calc_hash(obj_type: ObjectType, content: &[u8]) -> ObjectId {
    Hasher::hash_object(obj_type.as_str(), content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_codes_roundtrip() {
        for t in [
            ObjectType::Commit,
            ObjectType::Tree,
            ObjectType::Blob,
            ObjectType::Tag,
        ] {
            assert_eq!(ObjectType::from_code(t.code()).unwrap(), t);
            assert_eq!(ObjectType::from_name(t.as_str()).unwrap(), t);
        }
    }

    #[test]
    fn blob_is_code_three() {
        assert_eq!(ObjectType::Blob.code(), 3);
        assert_eq!(ObjectType::Commit.code(), 1);
    }

    #[test]
    fn unknown_code_rejected() {
        assert!(matches!(
            ObjectType::from_code(0),
            Err(ObjectError::UnknownTypeCode(0))
        ));
        assert!(matches!(
            ObjectType::from_code(5),
            Err(ObjectError::UnknownTypeCode(5))
        ));
    }

    #[test]
    fn known_empty_blob_hash() {
        assert_eq!(
            calc_hash(ObjectType::Blob, b"").to_hex(),
            "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391"
        );
    }
}
