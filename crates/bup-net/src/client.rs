//! Client side of the framed transport.
//!
//! A `Client` owns the server tunnel (a `bup server` subprocess, reached
//! directly or through ssh) and enforces the busy interlock: while a
//! streaming command (`receive-objects`, `cat`) is outstanding, every
//! other command fails with [`NetError::Busy`]. Streaming handles share
//! the connection state and clear the interlock from their terminators.

use std::cell::RefCell;
use std::io::Write;
use std::path::PathBuf;
use std::process::Child;
use std::rc::Rc;

use bup_hash::ObjectId;
use bup_object::tree::TreeEntry;
use bup_object::{calc_hash, codec, commit, ObjectType};
use bup_pack::multi::MultiPackIndex;
use bup_repo::Repository;
use bup_utils::progress;
use bup_utils::subprocess::{Cmd, StdioMode};
use bup_utils::user;

use crate::conn::Conn;
use crate::NetError;

struct ClientInner {
    conn: Conn,
    tunnel: Option<Child>,
    busy: Option<&'static str>,
    cachedir: PathBuf,
    indexes_synced: bool,
}

impl ClientInner {
    fn check_busy(&self) -> Result<(), NetError> {
        match self.busy {
            Some(cmd) => Err(NetError::Busy(cmd)),
            None => Ok(()),
        }
    }
}

/// Connection to a (possibly remote) repository over the framed channel.
pub struct Client {
    inner: Rc<RefCell<ClientInner>>,
}

impl Client {
    /// Connect to `remote`: either `host:dir` (tunnelled through ssh) or a
    /// plain directory served by a local `bup server` subprocess. With
    /// `create`, the server initialises the directory first.
    pub fn connect(remote: &str, create: bool, repo: &Repository) -> Result<Self, NetError> {
        let (host, dir) = match remote.split_once(':') {
            Some((host, dir)) => (host.to_string(), dir.to_string()),
            None => ("NONE".to_string(), remote.to_string()),
        };
        let cmd = if host == "NONE" {
            Cmd::new("bup").arg("server")
        } else {
            Cmd::new("ssh")
                .arg(&host)
                .arg("--")
                .arg("bup")
                .arg("server")
        };
        let mut tunnel = cmd
            .stdin(StdioMode::Pipe)
            .stdout(StdioMode::Pipe)
            .spawn()?;
        let conn = Conn::new(
            tunnel.stdout.take().expect("piped stdout"),
            tunnel.stdin.take().expect("piped stdin"),
        );
        let cachedir = repo.index_cache(&sanitize_cache_name(&format!("{host}:{dir}")));
        Self::setup(conn, Some(tunnel), cachedir, &dir, create)
    }

    /// Build a client over caller-supplied streams (an existing socket, or
    /// an in-process server under test). No tunnel subprocess is owned.
    pub fn from_streams(
        reader: impl std::io::Read + Send + 'static,
        writer: impl std::io::Write + Send + 'static,
        cachedir: PathBuf,
        dir: &str,
        create: bool,
    ) -> Result<Self, NetError> {
        Self::setup(Conn::new(reader, writer), None, cachedir, dir, create)
    }

    fn setup(
        mut conn: Conn,
        tunnel: Option<Child>,
        cachedir: PathBuf,
        dir: &str,
        create: bool,
    ) -> Result<Self, NetError> {
        if !dir.is_empty() {
            let dir = dir.replace(['\r', '\n'], " ");
            if create {
                conn.write_line(format!("init-dir {dir}"))?;
            } else {
                conn.write_line(format!("set-dir {dir}"))?;
            }
            conn.check_ok()?;
        }
        Ok(Self {
            inner: Rc::new(RefCell::new(ClientInner {
                conn,
                tunnel,
                busy: None,
                cachedir,
                indexes_synced: false,
            })),
        })
    }

    /// Mirror the server's `.idx` files into the local cache directory:
    /// fetch what is missing, prune what the server no longer has.
    pub fn sync_indexes(&self) -> Result<(), NetError> {
        let mut inner = self.inner.borrow_mut();
        inner.check_busy()?;
        inner.conn.write_line("list-indexes")?;

        std::fs::create_dir_all(&inner.cachedir)?;
        let mut all = Vec::new();
        let mut needed = Vec::new();
        loop {
            match inner.conn.read_line()? {
                None => return Err(NetError::ServerClosed),
                Some(line) if line.is_empty() => break,
                Some(name) => {
                    if name.contains('/') {
                        return Err(NetError::Protocol(name));
                    }
                    if !inner.cachedir.join(&name).exists() {
                        needed.push(name.clone());
                    }
                    all.push(name);
                }
            }
        }
        inner.conn.check_ok()?;

        for entry in std::fs::read_dir(&inner.cachedir)? {
            let path = entry?.path();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if name.ends_with(".idx") && !all.contains(&name) {
                progress::log(&format!("pruning old index: {name}\n"));
                std::fs::remove_file(&path)?;
            }
        }

        for name in needed {
            progress::log(&format!("requesting {name}\n"));
            inner.conn.write_line(format!("send-index {name}"))?;
            let mut len_bytes = [0u8; 4];
            inner.conn.read_exact(&mut len_bytes)?;
            let len = u32::from_be_bytes(len_bytes) as usize;

            let final_path = inner.cachedir.join(&name);
            let tmp_path = inner.cachedir.join(format!("{name}.tmp"));
            let mut f = std::fs::File::create(&tmp_path)?;
            let mut remaining = len;
            let mut buf = [0u8; 65536];
            while remaining > 0 {
                let n = remaining.min(buf.len());
                inner.conn.read_exact(&mut buf[..n])?;
                f.write_all(&buf[..n])?;
                remaining -= n;
            }
            inner.conn.check_ok()?;
            drop(f);
            std::fs::rename(&tmp_path, &final_path)?;
        }

        inner.indexes_synced = true;
        Ok(())
    }

    /// Begin `receive-objects`: the returned writer streams one frame per
    /// object and holds the busy slot until closed.
    ///
    /// Indexes must be synced first; deduplication runs against the local
    /// mirror of the server's indexes.
    pub fn new_packwriter(&self) -> Result<RemotePackWriter, NetError> {
        let mut inner = self.inner.borrow_mut();
        if !inner.indexes_synced {
            return Err(NetError::IndexesNotSynced);
        }
        inner.check_busy()?;
        inner.busy = Some("receive-objects");
        inner.conn.write_line("receive-objects")?;
        let objcache = MultiPackIndex::open(&inner.cachedir)?;
        drop(inner);
        Ok(RemotePackWriter {
            client: Rc::clone(&self.inner),
            objcache,
            count: 0,
            closed: false,
        })
    }

    pub fn read_ref(&self, refname: &str) -> Result<Option<ObjectId>, NetError> {
        let mut inner = self.inner.borrow_mut();
        inner.check_busy()?;
        inner.conn.write_line(format!("read-ref {refname}"))?;
        let line = inner.conn.read_line()?.ok_or(NetError::ServerClosed)?;
        inner.conn.check_ok()?;
        let line = line.trim();
        if line.is_empty() {
            Ok(None)
        } else {
            Ok(Some(ObjectId::from_hex(line)?))
        }
    }

    pub fn update_ref(
        &self,
        refname: &str,
        new: &ObjectId,
        old: Option<&ObjectId>,
    ) -> Result<(), NetError> {
        let mut inner = self.inner.borrow_mut();
        inner.check_busy()?;
        inner.conn.write_line(format!(
            "update-ref {refname}\n{}\n{}",
            new.to_hex(),
            old.map(|o| o.to_hex()).unwrap_or_default()
        ))?;
        inner.conn.check_ok()
    }

    /// Begin streaming an object graph's content. The stream holds the
    /// busy slot until its terminating frame has been consumed.
    pub fn cat_start(&self, id: &str) -> Result<CatStream, NetError> {
        let mut inner = self.inner.borrow_mut();
        inner.check_busy()?;
        inner.busy = Some("cat");
        let id = id.replace(['\r', '\n'], "_");
        inner.conn.write_line(format!("cat {id}"))?;
        Ok(CatStream {
            client: Rc::clone(&self.inner),
            done: false,
        })
    }

    /// Convenience: stream a whole `cat` into a writer.
    pub fn cat(&self, id: &str, out: &mut dyn Write) -> Result<(), NetError> {
        let mut stream = self.cat_start(id)?;
        while let Some(chunk) = stream.next_chunk()? {
            out.write_all(&chunk)?;
        }
        Ok(())
    }

    /// Shut the connection down and reap the tunnel. Idempotent; also run
    /// (best-effort) on drop.
    pub fn close(&self) -> Result<(), NetError> {
        let mut inner = self.inner.borrow_mut();
        if inner.busy.is_none() {
            let _ = inner.conn.write_line("quit");
            let _ = inner.conn.flush();
        }
        // Close our end of the pipes before reaping the tunnel.
        drop(std::mem::replace(
            &mut inner.conn,
            Conn::new(std::io::empty(), std::io::sink()),
        ));
        if let Some(mut tunnel) = inner.tunnel.take() {
            let status = tunnel.wait()?;
            if !status.success() {
                return Err(NetError::TunnelExit(status.code().unwrap_or(-1)));
            }
        }
        Ok(())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if Rc::strong_count(&self.inner) == 1 {
            let _ = self.close();
        }
    }
}

/// Streaming response of a `cat` command.
pub struct CatStream {
    client: Rc<RefCell<ClientInner>>,
    done: bool,
}

impl CatStream {
    /// Next content chunk, or `None` once the zero-length terminator and
    /// the final `ok` have been consumed (which releases the busy slot).
    pub fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, NetError> {
        if self.done {
            return Ok(None);
        }
        let mut inner = self.client.borrow_mut();
        let chunk = inner.conn.read_frame()?;
        if chunk.is_empty() {
            inner.conn.check_ok()?;
            inner.busy = None;
            self.done = true;
            return Ok(None);
        }
        Ok(Some(chunk))
    }
}

/// Pack writer that ships objects over the framed channel.
///
/// Each object record is sent as one frame; a zero-length frame ends the
/// stream and the server finalises the pack on its side. Deduplication
/// uses the synced index cache plus the in-flight set.
pub struct RemotePackWriter {
    client: Rc<RefCell<ClientInner>>,
    objcache: MultiPackIndex,
    count: u32,
    closed: bool,
}

impl RemotePackWriter {
    /// Objects actually shipped (after deduplication).
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn maybe_write(
        &mut self,
        obj_type: ObjectType,
        content: &[u8],
    ) -> Result<ObjectId, NetError> {
        let oid = calc_hash(obj_type, content);
        if !self.objcache.contains(&oid) {
            let record = codec::encode_pack_object(obj_type, content);
            self.client.borrow_mut().conn.write_frame(&record)?;
            self.count += 1;
            self.objcache.note_written(oid);
        }
        Ok(oid)
    }

    pub fn new_blob(&mut self, content: &[u8]) -> Result<ObjectId, NetError> {
        self.maybe_write(ObjectType::Blob, content)
    }

    pub fn new_tree(&mut self, entries: Vec<TreeEntry>) -> Result<ObjectId, NetError> {
        self.maybe_write(ObjectType::Tree, &bup_object::tree::encode_tree(entries))
    }

    pub fn new_commit(
        &mut self,
        parent: Option<&ObjectId>,
        tree: Option<&ObjectId>,
        msg: &str,
    ) -> Result<ObjectId, NetError> {
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

    /// End the stream: zero frame, wait for `ok`, release the busy slot.
    pub fn close(mut self) -> Result<(), NetError> {
        self.finish()
    }

    fn finish(&mut self) -> Result<(), NetError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut inner = self.client.borrow_mut();
        inner.conn.write_frame(&[])?;
        inner.conn.check_ok()?;
        inner.busy = None;
        Ok(())
    }
}

impl Drop for RemotePackWriter {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

/// Cache directory name for a remote: anything outside `[A-Za-z0-9_@:]`
/// becomes `_`.
fn sanitize_cache_name(remote: &str) -> String {
    remote
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '@' || c == ':' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_names_are_flat() {
        assert_eq!(
            sanitize_cache_name("host:/var/backups/bup"),
            "host:_var_backups_bup"
        );
        assert_eq!(sanitize_cache_name("me@host:dir"), "me@host:dir");
    }
}
