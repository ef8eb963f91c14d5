//! Repository handling: discovery, initialisation, refs, and the git
//! collaborator subprocesses.
//!
//! The repository root is an explicit value threaded through all
//! operations. Discovery order: explicit path, then `BUP_DIR`, then
//! `~/.bup`; only the `~/.bup` default is auto-initialised.

pub mod cat;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use bup_hash::ObjectId;
use bup_utils::subprocess::{Cmd, StdioMode};

/// Errors from repository operations and git collaborators.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("{0} is not a repository")]
    NotRepository(PathBuf),

    #[error("{0} exists but is not a directory")]
    NotADirectory(PathBuf),

    #[error("git version {needed} or higher is required; you have {found}")]
    GitVersion { found: String, needed: String },

    #[error("unexpected git output: {0}")]
    GitParse(String),

    #[error("object {0} is missing")]
    MissingObject(String),

    #[error("invalid object id {0:?}")]
    BadId(String),

    #[error(transparent)]
    Hash(#[from] bup_hash::HashError),

    #[error(transparent)]
    Object(#[from] bup_object::ObjectError),

    #[error(transparent)]
    Util(#[from] bup_utils::UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The default repository location, `~/.bup`.
pub fn default_repo_dir() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_else(|| ".".into());
    PathBuf::from(home).join(".bup")
}

/// Resolve the repository root: explicit path, else `BUP_DIR`, else the
/// default. A `.git` subdirectory redirects into itself.
pub fn resolve_repo_dir(path: Option<&Path>) -> PathBuf {
    let dir = match path {
        Some(p) => p.to_path_buf(),
        None => std::env::var_os("BUP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_repo_dir),
    };
    let gd = dir.join(".git");
    if gd.exists() {
        gd
    } else {
        dir
    }
}

/// An opened repository root.
#[derive(Debug, Clone)]
pub struct Repository {
    path: PathBuf,
}

impl Repository {
    /// Open an existing repository, or initialise the `~/.bup` default if
    /// that is what was asked for and it does not exist yet. Any other
    /// missing path is an error.
    pub fn open(path: Option<&Path>) -> Result<Self, RepoError> {
        let dir = resolve_repo_dir(path);
        if dir.join("objects/pack").is_dir() {
            return Ok(Self { path: dir });
        }
        if dir == default_repo_dir() {
            return Self::init(Some(&dir));
        }
        Err(RepoError::NotRepository(dir))
    }

    /// Initialise a repository (`git --bare init` with index version 2).
    pub fn init(path: Option<&Path>) -> Result<Self, RepoError> {
        let dir = resolve_repo_dir(path);
        if dir.exists() && !dir.is_dir() {
            return Err(RepoError::NotADirectory(dir));
        }
        std::fs::create_dir_all(&dir)?;
        let repo = Self { path: dir };
        repo.git()
            .arg("--bare")
            .arg("init")
            .arg("-q")
            .stdout(StdioMode::Null)
            .run_ok()?;
        repo.git()
            .args(["config", "pack.indexVersion", "2"])
            .run_ok()?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A path inside the repository.
    pub fn join(&self, sub: impl AsRef<Path>) -> PathBuf {
        self.path.join(sub)
    }

    /// The pack directory, `objects/pack/`.
    pub fn pack_dir(&self) -> PathBuf {
        self.join("objects/pack")
    }

    /// The client-side mirror directory for one remote's indexes.
    pub fn index_cache(&self, remote: &str) -> PathBuf {
        self.join("index-cache").join(remote)
    }

    /// A git command with `GIT_DIR` pointing here.
    pub fn git(&self) -> Cmd {
        let dir = std::fs::canonicalize(&self.path).unwrap_or_else(|_| self.path.clone());
        Cmd::new("git").env("GIT_DIR", dir)
    }

    /// Read a ref; `None` if it does not exist.
    pub fn read_ref(&self, refname: &str) -> Result<Option<ObjectId>, RepoError> {
        let out = self
            .git()
            .args(["show-ref", "--", refname])
            .stdout(StdioMode::Pipe)
            .run()?;
        let text = String::from_utf8_lossy(&out.stdout);
        let text = text.trim();
        // show-ref exits non-zero for a missing ref; that is not fatal.
        if text.is_empty() {
            return Ok(None);
        }
        let hex = text
            .split_whitespace()
            .next()
            .ok_or_else(|| RepoError::GitParse(text.to_string()))?;
        Ok(Some(ObjectId::from_hex(hex)?))
    }

    /// Compare-and-swap a ref. `old` of `None` means "must not exist yet";
    /// git enforces the precondition.
    pub fn update_ref(
        &self,
        refname: &str,
        new: &ObjectId,
        old: Option<&ObjectId>,
    ) -> Result<(), RepoError> {
        self.git()
            .args(["update-ref", "--", refname])
            .arg(new.to_hex())
            .arg(old.map(|o| o.to_hex()).unwrap_or_default())
            .run_ok()?;
        Ok(())
    }
}

/// The installed git version, parsed from `git --version` once per
/// process. Fails below 1.5.4 (`index-pack --index-version` appeared
/// there).
pub fn git_version() -> Result<(u32, u32, u32), RepoError> {
    static VERSION: OnceLock<Result<(u32, u32, u32), String>> = OnceLock::new();
    let cached = VERSION.get_or_init(|| {
        let out = Cmd::new("git")
            .arg("--version")
            .stdout(StdioMode::Pipe)
            .run_ok()
            .map_err(|e| e.to_string())?;
        let text = String::from_utf8_lossy(&out.stdout);
        parse_git_version(&text).ok_or_else(|| text.trim().to_string())
    });
    let ver = cached.clone().map_err(|found| RepoError::GitVersion {
        found,
        needed: "1.5.4".to_string(),
    })?;
    if ver < (1, 5, 4) {
        return Err(RepoError::GitVersion {
            found: format!("{}.{}.{}", ver.0, ver.1, ver.2),
            needed: "1.5.4".to_string(),
        });
    }
    Ok(ver)
}

fn parse_git_version(text: &str) -> Option<(u32, u32, u32)> {
    let rest = text.strip_prefix("git version ")?;
    let mut parts = rest.trim().split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts
        .next()
        .and_then(|p| {
            p.chars()
                .take_while(|c| c.is_ascii_digit())
                .collect::<String>()
                .parse()
                .ok()
        })
        .unwrap_or(0);
    Some((major, minor, patch))
}
