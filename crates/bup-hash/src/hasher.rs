use sha1::{Digest, Sha1};

use crate::ObjectId;

/// Streaming SHA-1 computation.
///
/// Data can be fed incrementally with [`update`](Hasher::update) or through
/// the [`std::io::Write`] implementation, then finalised into an
/// [`ObjectId`].
pub struct Hasher {
    inner: Sha1,
}

impl Hasher {
    pub fn new() -> Self {
        Self { inner: Sha1::new() }
    }

    /// Feed data into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalise and return the digest as an ObjectId.
    pub fn finalize(self) -> ObjectId {
        let digest = self.inner.finalize();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest);
        ObjectId(bytes)
    }

    /// Convenience: hash a buffer in one call.
    pub fn digest(data: &[u8]) -> ObjectId {
        let mut h = Self::new();
        h.update(data);
        h.finalize()
    }

    /// Compute an object id: SHA-1 of `"<type> <len>\0<content>"`.
    pub fn hash_object(obj_type: &str, content: &[u8]) -> ObjectId {
        let mut h = Self::new();
        h.update(format!("{obj_type} {}\0", content.len()).as_bytes());
        h.update(content);
        h.finalize()
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::io::Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input() {
        // SHA-1 of the empty string.
        assert_eq!(
            Hasher::digest(b"").to_hex(),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
    }

    #[test]
    fn incremental_matches_oneshot() {
        let mut h = Hasher::new();
        h.update(b"hello ");
        h.update(b"world");
        assert_eq!(h.finalize(), Hasher::digest(b"hello world"));
    }

    #[test]
    fn empty_blob_id() {
        // `git hash-object -t blob /dev/null`
        assert_eq!(
            Hasher::hash_object("blob", b"").to_hex(),
            "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391"
        );
    }

    #[test]
    fn blob_header_includes_length() {
        assert_ne!(
            Hasher::hash_object("blob", b"a"),
            Hasher::hash_object("blob", b"b")
        );
        assert_ne!(
            Hasher::hash_object("blob", b"a"),
            Hasher::hash_object("tree", b"a")
        );
    }

    #[test]
    fn write_impl_feeds_hasher() {
        use std::io::Write;
        let mut h = Hasher::new();
        h.write_all(b"via write").unwrap();
        assert_eq!(h.finalize(), Hasher::digest(b"via write"));
    }
}
