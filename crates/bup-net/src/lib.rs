//! Framed client/server transport.
//!
//! Commands are line-framed; bulk data moves in `u32`-length-prefixed
//! chunks. Every command ends with the peer writing a blank line then
//! `ok`. The client enforces a single-slot busy interlock so streaming
//! commands cannot be interleaved with anything else.

pub mod client;
pub mod conn;
pub mod server;

pub use client::{CatStream, Client, RemotePackWriter};
pub use conn::Conn;
pub use server::serve;

/// Errors from the framed channel, either side.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("expected \"ok\", got {0:?}")]
    Protocol(String),

    #[error("server exited unexpectedly")]
    ServerClosed,

    #[error("already busy with command {0:?}")]
    Busy(&'static str),

    #[error("server tunnel returned exit code {0}")]
    TunnelExit(i32),

    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("{0:?}: malformed request")]
    BadRequest(String),

    #[error("cannot {0} before a repository is selected")]
    NoRepository(&'static str),

    #[error("indexes not synced yet")]
    IndexesNotSynced,

    #[error(transparent)]
    Hash(#[from] bup_hash::HashError),

    #[error(transparent)]
    Pack(#[from] bup_pack::PackError),

    #[error(transparent)]
    Repo(#[from] bup_repo::RepoError),

    #[error(transparent)]
    Util(#[from] bup_utils::UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
