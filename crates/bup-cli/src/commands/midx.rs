use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::Args;

use bup_pack::midx::{write_midx, PackMidx};
use bup_repo::Repository;

#[derive(Args)]
pub struct MidxArgs {
    /// Output midx filename (default: auto-generated)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Automatically create .midx from any unindexed .idx files
    #[arg(short = 'a', long = "auto")]
    auto: bool,

    /// Automatically create .midx from *all* .idx files
    #[arg(short = 'f', long = "force")]
    force: bool,

    idxnames: Vec<PathBuf>,
}

pub fn run(args: MidxArgs, bup_dir: Option<&Path>) -> Result<i32> {
    if !args.idxnames.is_empty() && (args.auto || args.force) {
        bail!("you can't use -f/-a and also provide filenames");
    }

    let repo = Repository::open(bup_dir)?;

    if !args.idxnames.is_empty() {
        if let Some(out) = write_midx(&repo.pack_dir(), args.output, &args.idxnames)? {
            println!("{}", out.display());
        }
        return Ok(0);
    }

    if !(args.auto || args.force) {
        bail!("you must use -f or -a or provide input filenames");
    }

    // The repository's own packs, plus every remote's index cache.
    let mut dirs = vec![repo.pack_dir()];
    let cache_root = repo.join("index-cache");
    if cache_root.is_dir() {
        for entry in std::fs::read_dir(&cache_root)? {
            let path = entry?.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
    }

    for dir in dirs {
        let inputs = if args.force {
            all_idx_files(&dir)?
        } else {
            unindexed_idx_files(&dir)?
        };
        if inputs.is_empty() {
            continue;
        }
        if let Some(out) = write_midx(&dir, args.output.clone(), &inputs)? {
            println!("{}", out.display());
        }
    }
    Ok(0)
}

fn all_idx_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    if dir.is_dir() {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("idx") {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

/// The `.idx` files not yet covered by any `.midx` in the same directory.
fn unindexed_idx_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut covered = HashSet::new();
    if dir.is_dir() {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("midx") {
                let midx = PackMidx::open(&path)?;
                covered.extend(midx.idx_names().iter().cloned());
            }
        }
    }
    Ok(all_idx_files(dir)?
        .into_iter()
        .filter(|p| {
            p.file_name()
                .map(|n| !covered.contains(&n.to_string_lossy().into_owned()))
                .unwrap_or(false)
        })
        .collect())
}
