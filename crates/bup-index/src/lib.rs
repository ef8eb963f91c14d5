//! The filesystem index: a reverse-sorted metadata log.
//!
//! Each entry records one path's stat data, content hash, and flag bits.
//! Entries are kept in strictly descending name order, matching the
//! depth-first reverse-alphabetical walk used during updates, so old and
//! new state can be merged in lockstep. Readers and writers both depend on
//! that ordering.

pub mod entry;
pub mod merge;
pub mod read;
pub mod update;
pub mod walk;
pub mod write;

use bstr::BString;
use bup_hash::ObjectId;
use std::path::PathBuf;

/// File header: magic plus format version 1.
pub const INDEX_HDR: &[u8; 8] = b"BUPI\x00\x00\x00\x01";

/// The path was present at the last scan.
pub const IX_EXISTS: u16 = 0x8000;
/// The recorded hash matches the file's current contents.
pub const IX_HASHVALID: u16 = 0x4000;

/// Placeholder hash for entries whose content has not been read yet.
pub const EMPTY_SHA: ObjectId = ObjectId([0u8; 20]);
/// Hash stamped by `--fake-valid`, marking entries valid without reading.
pub const FAKE_SHA: ObjectId = ObjectId([1u8; 20]);

/// Errors from index reading, writing, and updating.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("{path}: bad index header")]
    BadHeader { path: PathBuf },

    #[error("truncated index entry at offset {0}")]
    Truncated(usize),

    #[error("{name:?} must sort before {last:?}")]
    Disorder { name: BString, last: BString },

    #[error(transparent)]
    Util(#[from] bup_utils::UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
