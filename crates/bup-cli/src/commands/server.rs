use anyhow::Result;

use bup_net::{serve, Conn};

/// Serve the framed protocol over stdin/stdout. The peer selects the
/// repository with `init-dir`/`set-dir`.
pub fn run() -> Result<i32> {
    serve(Conn::new(std::io::stdin(), std::io::stdout()))?;
    Ok(0)
}
