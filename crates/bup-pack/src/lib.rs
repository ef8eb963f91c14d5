//! Pack storage: index lookup, presence bitmaps, the multi-pack fan-in,
//! the streaming pack writer, and the second-level midx table.
//!
//! A pack is an append-only concatenation of compressed objects with a
//! trailing checksum. Its `.idx` sidecar maps ids to offsets; a `.map`
//! bitmap short-circuits negative lookups; a `.midx` merges many `.idx`
//! files into one sorted table once packs accumulate.

pub mod bitmap;
pub mod index;
pub mod midx;
pub mod multi;
pub mod writer;

/// Errors that can occur during pack operations.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("invalid pack index: {0}")]
    InvalidIndex(String),

    #[error("invalid pack bitmap: {0}")]
    InvalidBitmap(String),

    #[error("invalid midx: {0}")]
    InvalidMidx(String),

    #[error("git index-pack produced no output")]
    IndexPackSilent,

    #[error(transparent)]
    Object(#[from] bup_object::ObjectError),

    #[error(transparent)]
    Util(#[from] bup_utils::UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Pack file constants.
pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
pub const PACK_VERSION: u32 = 2;
/// Signature, version 2, zero object count: the header every temp pack
/// starts with; the count is patched in at finalisation.
pub const PACK_HEADER: &[u8; 12] = b"PACK\x00\x00\x00\x02\x00\x00\x00\x00";

/// Pack index v2 constants.
pub const IDX_SIGNATURE: [u8; 4] = [0xff, 0x74, 0x4f, 0x63]; // "\377tOc"
pub const IDX_VERSION: u32 = 2;

/// Midx v2 constants.
pub const MIDX_SIGNATURE: &[u8; 4] = b"MIDX";
pub const MIDX_VERSION: u32 = 2;
