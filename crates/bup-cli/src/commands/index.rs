use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use bstr::{BStr, ByteSlice};
use clap::Args;

use bup_hash::ObjectId;
use bup_index::read::Reader;
use bup_index::update::{update_index, UpdateOptions};
use bup_index::FAKE_SHA;
use bup_repo::Repository;
use bup_utils::path::{bytes_to_path, reduce_paths};
use bup_utils::SavedErrors;

#[derive(Args)]
pub struct IndexArgs {
    /// Print the index entries for the given names (also works with -u)
    #[arg(short = 'p', long = "print")]
    print: bool,

    /// Print only added/deleted/modified files (implies -p)
    #[arg(short = 'm', long = "modified")]
    modified: bool,

    /// Print each filename with a status char (A/M/D) (implies -p)
    #[arg(short = 's', long = "status")]
    status: bool,

    /// (Recursively) update the index entries for the given filenames
    #[arg(short = 'u', long = "update")]
    update: bool,

    /// Don't cross filesystem boundaries
    #[arg(short = 'x', long = "xdev", visible_alias = "one-file-system")]
    xdev: bool,

    /// Mark all index entries as up-to-date even if they aren't
    #[arg(long = "fake-valid")]
    fake_valid: bool,

    /// The name of the index file (default: <repo>/bupindex)
    #[arg(short = 'f', long = "indexfile")]
    indexfile: Option<PathBuf>,

    paths: Vec<PathBuf>,
}

pub fn run(args: IndexArgs, bup_dir: Option<&Path>) -> Result<i32> {
    if !(args.print || args.modified || args.status || args.update) {
        bail!("you must supply one or more of -p, -s, -m, or -u");
    }
    if args.fake_valid && !args.update {
        bail!("--fake-valid is meaningless without -u");
    }

    let repo = Repository::open(bup_dir)?;
    let indexfile = args
        .indexfile
        .clone()
        .unwrap_or_else(|| repo.join("bupindex"));

    let errors = SavedErrors::new();

    if args.update {
        if args.paths.is_empty() {
            bail!("update (-u) requested but no paths given");
        }
        let stamp = |_: &BStr| -> Option<ObjectId> { Some(FAKE_SHA) };
        let opts = UpdateOptions {
            one_file_system: args.xdev,
            hashgen: args.fake_valid.then_some(&stamp as &dyn Fn(&BStr) -> Option<ObjectId>),
        };
        for (resolved, _) in reduce_paths(&args.paths)? {
            let trimmed = resolved.trim_end_with(|c| c == '/');
            let root = if trimmed.is_empty() {
                PathBuf::from("/")
            } else {
                bytes_to_path(trimmed)
            };
            update_index(&indexfile, &root, &opts, &errors)?;
        }
    }

    if args.print || args.status || args.modified {
        let requested = if args.paths.is_empty() {
            vec![PathBuf::from(".")]
        } else {
            args.paths.clone()
        };
        let paths = reduce_paths(&requested)?;
        let reader = Reader::open(&indexfile)?;
        for (name, entry) in reader.filter(&paths) {
            if args.modified && entry.hash_valid() {
                continue;
            }
            if args.status {
                println!("{} {}", entry.status_char(), name);
            } else {
                println!("{name}");
            }
        }
    }

    if !errors.is_empty() {
        eprintln!("WARNING: {} errors encountered.", errors.len());
        return Ok(1);
    }
    Ok(0)
}
