use std::path::Path;

use anyhow::Result;

use bup_repo::Repository;

pub fn run(bup_dir: Option<&Path>) -> Result<i32> {
    let repo = Repository::init(bup_dir)?;
    eprintln!("Initialised repository at {}", repo.path().display());
    Ok(0)
}
