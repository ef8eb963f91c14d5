//! Foundation utilities shared by the bup storage crates.
//!
//! Nothing in here knows about packs or indexes; this is the plumbing layer:
//! RAII temp files, a subprocess builder, a stderr progress display, byte-path
//! helpers, and the saved-error sink used by long-running scans.

pub mod error;
pub mod path;
pub mod progress;
pub mod subprocess;
pub mod tempfile;
pub mod user;

pub use bstr::{BStr, BString, ByteSlice, ByteVec};
pub use error::{SavedErrors, UtilError};

pub type Result<T> = std::result::Result<T, UtilError>;
