//! Object identity for the bup storage core.
//!
//! Provides the 20-byte `ObjectId`, streaming SHA-1 computation, and the hex
//! codec. The hash algorithm is fixed: every object id in the store is the
//! SHA-1 of `"<type> <len>\0<content>"`.

mod error;
pub mod hasher;
pub mod hex;
mod oid;

pub use error::HashError;
pub use hasher::Hasher;
pub use oid::ObjectId;
