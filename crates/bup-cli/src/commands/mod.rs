pub mod index;
pub mod init;
pub mod midx;
pub mod server;

use anyhow::Result;
use clap::Subcommand;

use crate::Cli;

#[derive(Subcommand)]
pub enum Commands {
    /// Update or print the filesystem index
    Index(index::IndexArgs),
    /// Initialise a repository
    Init,
    /// Merge .idx files into a midx
    Midx(midx::MidxArgs),
    /// Serve a repository over stdin/stdout
    Server,
}

pub fn run(cli: Cli) -> Result<i32> {
    let bup_dir = cli.bup_dir.as_deref();
    match cli.command {
        Commands::Index(args) => index::run(args, bup_dir),
        Commands::Init => init::run(bup_dir),
        Commands::Midx(args) => midx::run(args, bup_dir),
        Commands::Server => server::run(),
    }
}
