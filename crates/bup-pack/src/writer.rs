//! Streaming pack writer.
//!
//! The writer is lazy: nothing touches the disk until the first object is
//! written, at which point `objects/bup<pid>.pack` is created with a
//! zero-count header. Finalisation patches the object count, appends the
//! trailing SHA-1, hands the file to `git index-pack` for `.idx`
//! generation, and renames both into `objects/pack/`. Objects are stable
//! only after that rename.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use bup_hash::{Hasher, ObjectId};
use bup_object::tree::TreeEntry;
use bup_object::{calc_hash, codec, commit, ObjectType};
use bup_utils::subprocess::{Cmd, StdioMode};
use bup_utils::user;

use crate::multi::MultiPackIndex;
use crate::{PackError, PACK_HEADER};

type ObjcacheMaker = Box<dyn Fn() -> Result<MultiPackIndex, PackError>>;

/// Append-only builder for one pack at a time.
pub struct PackWriter {
    repo_dir: PathBuf,
    file: Option<std::fs::File>,
    /// Temp path without extension (`objects/bup<pid>`), set while open.
    tmp_base: Option<PathBuf>,
    count: u32,
    outbytes: u64,
    objcache: Option<MultiPackIndex>,
    objcache_maker: ObjcacheMaker,
}

impl PackWriter {
    /// Create a writer for the repository at `repo_dir`. No file is opened
    /// until the first write.
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        let repo_dir = repo_dir.into();
        let pack_dir = repo_dir.join("objects/pack");
        Self::with_objcache_maker(
            repo_dir,
            Box::new(move || MultiPackIndex::open(&pack_dir)),
        )
    }

    /// Like [`new`](PackWriter::new), with a custom object-cache factory
    /// (the remote writer dedups against a synced index cache instead).
    pub fn with_objcache_maker(repo_dir: impl Into<PathBuf>, maker: ObjcacheMaker) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            file: None,
            tmp_base: None,
            count: 0,
            outbytes: 0,
            objcache: None,
            objcache_maker: maker,
        }
    }

    /// Objects written to the current pack so far.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Bytes appended to the current pack so far (excluding the header).
    pub fn outbytes(&self) -> u64 {
        self.outbytes
    }

    fn ensure_open(&mut self) -> Result<(), PackError> {
        if self.file.is_none() {
            let base = self.repo_dir.join(format!("objects/bup{}", std::process::id()));
            let mut f = std::fs::File::options()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(base.with_extension("pack"))?;
            f.write_all(PACK_HEADER)?;
            self.tmp_base = Some(base);
            self.file = Some(f);
        }
        Ok(())
    }

    fn objcache(&mut self) -> Result<&mut MultiPackIndex, PackError> {
        if self.objcache.is_none() {
            self.objcache = Some((self.objcache_maker)()?);
        }
        Ok(self.objcache.as_mut().expect("just created"))
    }

    /// Is the object already in the store (or the in-flight pack)?
    pub fn exists(&mut self, oid: &ObjectId) -> Result<bool, PackError> {
        Ok(self.objcache()?.contains(oid))
    }

    /// Append one pre-encoded object record. Used by the server side of
    /// `receive-objects`, where records arrive one frame at a time.
    pub fn append_record(&mut self, record: &[u8]) -> Result<(), PackError> {
        self.ensure_open()?;
        let f = self.file.as_mut().expect("opened above");
        f.write_all(record)?;
        self.outbytes += record.len() as u64;
        self.count += 1;
        Ok(())
    }

    /// Unconditionally append an object; returns its id.
    pub fn write(&mut self, obj_type: ObjectType, content: &[u8]) -> Result<ObjectId, PackError> {
        let oid = calc_hash(obj_type, content);
        self.append_record(&codec::encode_pack_object(obj_type, content))?;
        Ok(oid)
    }

    /// Append an object unless the store already has it; returns its id
    /// either way.
    pub fn maybe_write(
        &mut self,
        obj_type: ObjectType,
        content: &[u8],
    ) -> Result<ObjectId, PackError> {
        let oid = calc_hash(obj_type, content);
        if !self.exists(&oid)? {
            self.append_record(&codec::encode_pack_object(obj_type, content))?;
            self.objcache()?.note_written(oid);
        }
        Ok(oid)
    }

    pub fn new_blob(&mut self, content: &[u8]) -> Result<ObjectId, PackError> {
        self.maybe_write(ObjectType::Blob, content)
    }

    pub fn new_tree(&mut self, entries: Vec<TreeEntry>) -> Result<ObjectId, PackError> {
        self.maybe_write(ObjectType::Tree, &bup_object::tree::encode_tree(entries))
    }

    pub fn new_commit(
        &mut self,
        parent: Option<&ObjectId>,
        tree: Option<&ObjectId>,
        msg: &str,
    ) -> Result<ObjectId, PackError> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let tz = commit::local_tz_offset();
        let who = user::user_line();
        let payload = commit::encode_commit(
            tree,
            parent,
            Some((&who, now, tz)),
            Some((&who, now, tz)),
            msg,
        );
        self.maybe_write(ObjectType::Commit, &payload)
    }

    /// Finalise the current pack and start a fresh one on the next write.
    /// Returns the finished pack's base path, if anything was written.
    pub fn breakpoint(&mut self) -> Result<Option<PathBuf>, PackError> {
        let id = self.end()?;
        self.count = 0;
        self.outbytes = 0;
        Ok(id)
    }

    /// Finalise and consume the writer. Returns the new pack's base path
    /// (without extension) under `objects/pack/`, or `None` if nothing was
    /// written.
    pub fn close(mut self) -> Result<Option<PathBuf>, PackError> {
        self.end()
    }

    /// Discard the in-flight pack.
    pub fn abort(mut self) -> Result<(), PackError> {
        self.discard();
        Ok(())
    }

    fn discard(&mut self) {
        self.objcache = None;
        if self.file.take().is_some() {
            if let Some(base) = self.tmp_base.take() {
                let _ = std::fs::remove_file(base.with_extension("pack"));
            }
        }
    }

    fn end(&mut self) -> Result<Option<PathBuf>, PackError> {
        let mut f = match self.file.take() {
            Some(f) => f,
            None => return Ok(None),
        };
        self.objcache = None;
        let base = self.tmp_base.take().expect("open file implies temp path");
        let pack_path = base.with_extension("pack");

        // Patch the object count into the header.
        f.seek(SeekFrom::Start(8))?;
        f.write_all(&self.count.to_be_bytes())?;

        // Stream the whole file through SHA-1 and append the digest.
        f.seek(SeekFrom::Start(0))?;
        let mut hasher = Hasher::new();
        let mut buf = [0u8; 65536];
        loop {
            let n = f.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        f.write_all(hasher.finalize().as_bytes())?;
        drop(f);

        // Hand the finished pack to the index-pack collaborator. On failure
        // the temp pack stays where it is for the caller to inspect.
        let git_dir = std::fs::canonicalize(&self.repo_dir)?;
        let out = Cmd::new("git")
            .arg("index-pack")
            .arg("-v")
            .arg("--index-version=2")
            .arg(&pack_path)
            .env("GIT_DIR", &git_dir)
            .stdout(StdioMode::Pipe)
            .run_ok()?;
        let name = String::from_utf8_lossy(&out.stdout).trim().to_string();
        if name.is_empty() {
            return Err(PackError::IndexPackSilent);
        }

        let stale_map = base.with_extension("map");
        if stale_map.exists() {
            std::fs::remove_file(&stale_map)?;
        }

        let prefix = self.repo_dir.join("objects/pack").join(&name);
        std::fs::rename(&pack_path, prefix.with_extension("pack"))?;
        std::fs::rename(base.with_extension("idx"), prefix.with_extension("idx"))?;
        Ok(Some(prefix))
    }
}

impl Drop for PackWriter {
    fn drop(&mut self) {
        // Abandonment discards the temp pack; `close` and `abort` have
        // already taken the file by the time Drop runs.
        self.discard();
    }
}
