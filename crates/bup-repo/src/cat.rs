//! Object reconstruction through `git cat-file`.
//!
//! A `CatPipe` keeps one `git cat-file --batch` child alive and streams
//! object payloads out of it. `join` reconstructs the full content of an
//! object graph: blobs verbatim, trees by joining each child in order,
//! commits by joining their tree.

use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, ChildStdout};

use bup_object::{tree, ObjectType};
use bup_utils::progress;
use bup_utils::subprocess::StdioMode;

use crate::{git_version, RepoError, Repository};

/// Streaming reader over the repository's object graph.
pub struct CatPipe {
    repo: Repository,
    /// The long-lived `cat-file --batch` child; absent on git older than
    /// 1.5.6, where every object costs its own subprocess.
    batch: Option<Batch>,
}

struct Batch {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl CatPipe {
    pub fn new(repo: &Repository) -> Result<Self, RepoError> {
        let batch = if git_version()? >= (1, 5, 6) {
            let mut child = repo
                .git()
                .args(["cat-file", "--batch"])
                .stdin(StdioMode::Pipe)
                .stdout(StdioMode::Pipe)
                .spawn()?;
            let stdin = child.stdin.take().expect("piped stdin");
            let stdout = BufReader::new(child.stdout.take().expect("piped stdout"));
            Some(Batch {
                child,
                stdin,
                stdout,
            })
        } else {
            progress::log("warning: git version < 1.5.6; object reads will be slow.\n");
            None
        };
        Ok(Self {
            repo: repo.clone(),
            batch,
        })
    }

    /// Fetch one object by textual id (hex or any name git resolves).
    pub fn get(&mut self, id: &str) -> Result<(ObjectType, Vec<u8>), RepoError> {
        if id.contains('\n') || id.contains('\r') || id.starts_with('-') || id.is_empty() {
            return Err(RepoError::BadId(id.to_string()));
        }
        match &mut self.batch {
            Some(batch) => batch.get(id),
            None => self.slow_get(id),
        }
    }

    /// Write the concatenated content of the graph rooted at `id`.
    ///
    /// Trees are joined child-by-child in tree order; commits contribute
    /// their tree. The traversal keeps an explicit stack, children pushed
    /// in reverse so output order matches tree order.
    pub fn join(&mut self, id: &str, out: &mut dyn Write) -> Result<(), RepoError> {
        let mut pending = vec![id.to_string()];
        while let Some(id) = pending.pop() {
            let (obj_type, content) = self.get(&id)?;
            match obj_type {
                ObjectType::Blob => out.write_all(&content)?,
                ObjectType::Tree => {
                    let entries = tree::parse_tree(&content)?;
                    for entry in entries.iter().rev() {
                        pending.push(entry.oid.to_hex());
                    }
                }
                ObjectType::Commit => {
                    pending.push(tree::commit_tree_id(&content)?.to_hex());
                }
                ObjectType::Tag => {
                    return Err(RepoError::GitParse(format!(
                        "invalid object type tag for {id}: expected blob/tree/commit"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Per-object fallback for old git: one `cat-file -t` plus one
    /// `cat-file <type>` round trip each.
    fn slow_get(&mut self, id: &str) -> Result<(ObjectType, Vec<u8>), RepoError> {
        let out = self
            .repo
            .git()
            .args(["cat-file", "-t", id])
            .stdout(StdioMode::Pipe)
            .run_ok()?;
        let type_name = String::from_utf8_lossy(&out.stdout).trim().to_string();
        let obj_type = ObjectType::from_name(&type_name)?;

        let out = self
            .repo
            .git()
            .args(["cat-file", type_name.as_str(), id])
            .stdout(StdioMode::Pipe)
            .run_ok()?;
        Ok((obj_type, out.stdout))
    }
}

impl Batch {
    fn get(&mut self, id: &str) -> Result<(ObjectType, Vec<u8>), RepoError> {
        writeln!(self.stdin, "{id}")?;
        self.stdin.flush()?;

        let mut header = String::new();
        self.stdout.read_line(&mut header)?;
        let header = header.trim_end_matches('\n');
        if header.ends_with(" missing") || header.is_empty() {
            return Err(RepoError::MissingObject(id.to_string()));
        }
        let mut parts = header.split(' ');
        let (hex, type_name, size) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(hex), Some(t), Some(s), None) if hex.len() == 40 => (hex, t, s),
            _ => return Err(RepoError::GitParse(format!("expected object header, got {header:?}"))),
        };
        let _ = hex;
        let obj_type = ObjectType::from_name(type_name)?;
        let size: usize = size
            .parse()
            .map_err(|_| RepoError::GitParse(format!("bad size in {header:?}")))?;

        let mut content = vec![0u8; size];
        self.stdout.read_exact(&mut content)?;
        let mut newline = [0u8; 1];
        self.stdout.read_exact(&mut newline)?;
        if newline != [b'\n'] {
            return Err(RepoError::GitParse("missing trailer after object".into()));
        }
        Ok((obj_type, content))
    }
}

impl Drop for CatPipe {
    fn drop(&mut self) {
        if let Some(mut batch) = self.batch.take() {
            drop(batch.stdin);
            let _ = batch.child.wait();
        }
    }
}
