mod commands;

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::Parser;

use commands::Commands;

#[derive(Parser)]
#[command(name = "bup", about = "Deduplicating backup storage")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Repository directory (overrides BUP_DIR and ~/.bup)
    #[arg(short = 'd', long = "bup-dir", global = true)]
    bup_dir: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    match commands::run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("bup: {e:#}");
            process::exit(1);
        }
    }
}
