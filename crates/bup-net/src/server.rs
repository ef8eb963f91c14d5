//! Server side of the framed transport.
//!
//! One command loop per connection. Every successful command ends with a
//! blank line and `ok`; an error inside a command tears the connection
//! down (the client sees EOF and reports the tunnel's exit). The busy
//! interlock is enforced by the client; the server just follows the
//! command sequence.

use std::io::Write;
use std::path::Path;

use bup_pack::writer::PackWriter;
use bup_repo::cat::CatPipe;
use bup_repo::Repository;

use crate::conn::Conn;
use crate::NetError;

/// Serve one connection until `quit` or EOF.
pub fn serve(mut conn: Conn) -> Result<(), NetError> {
    let mut repo: Option<Repository> = None;

    loop {
        let Some(line) = conn.read_line()? else {
            break; // client went away
        };
        if line.is_empty() {
            continue;
        }
        let (cmd, arg) = match line.split_once(' ') {
            Some((cmd, arg)) => (cmd, Some(arg)),
            None => (line.as_str(), None),
        };
        match cmd {
            "quit" => break,
            "init-dir" => {
                let dir = required(arg, &line)?;
                repo = Some(Repository::init(Some(Path::new(dir)))?);
                conn.write_ok()?;
            }
            "set-dir" => {
                let dir = required(arg, &line)?;
                repo = Some(Repository::open(Some(Path::new(dir)))?);
                conn.write_ok()?;
            }
            "list-indexes" => {
                let repo = need_repo(&repo, "list indexes")?;
                let pack_dir = repo.pack_dir();
                if pack_dir.is_dir() {
                    for entry in std::fs::read_dir(&pack_dir)? {
                        let path = entry?.path();
                        if path.extension().and_then(|e| e.to_str()) == Some("idx") {
                            if let Some(name) = path.file_name() {
                                conn.write_line(name.to_string_lossy())?;
                            }
                        }
                    }
                }
                conn.write_ok()?;
            }
            "send-index" => {
                let repo = need_repo(&repo, "send an index")?;
                let name = required(arg, &line)?;
                if name.contains('/') || !name.ends_with(".idx") {
                    return Err(NetError::BadRequest(line.clone()));
                }
                let data = std::fs::read(repo.pack_dir().join(name))?;
                conn.write_all(&(data.len() as u32).to_be_bytes())?;
                conn.write_all(&data)?;
                conn.write_ok()?;
            }
            "receive-objects" => {
                let repo = need_repo(&repo, "receive objects")?;
                let mut writer = PackWriter::new(repo.path());
                loop {
                    let frame = conn.read_frame()?;
                    if frame.is_empty() {
                        writer.close()?;
                        conn.write_ok()?;
                        break;
                    }
                    writer.append_record(&frame)?;
                }
            }
            "read-ref" => {
                let repo = need_repo(&repo, "read a ref")?;
                let refname = required(arg, &line)?;
                match repo.read_ref(refname)? {
                    Some(oid) => conn.write_line(oid.to_hex())?,
                    None => conn.write_line("")?,
                }
                conn.write_ok()?;
            }
            "update-ref" => {
                let repo = need_repo(&repo, "update a ref")?;
                let refname = required(arg, &line)?.to_string();
                let new_hex = conn.read_line()?.ok_or(NetError::ServerClosed)?;
                let old_hex = conn.read_line()?.ok_or(NetError::ServerClosed)?;
                let new = bup_hash::ObjectId::from_hex(&new_hex)?;
                let old = if old_hex.is_empty() {
                    None
                } else {
                    Some(bup_hash::ObjectId::from_hex(&old_hex)?)
                };
                repo.update_ref(&refname, &new, old.as_ref())?;
                conn.write_ok()?;
            }
            "cat" => {
                let repo = need_repo(&repo, "cat an object")?;
                let id = required(arg, &line)?;
                let mut cat = CatPipe::new(repo)?;
                cat.join(id, &mut FrameWriter { conn: &mut conn })?;
                conn.write_frame(&[])?;
                conn.write_ok()?;
            }
            _ => return Err(NetError::UnknownCommand(line.clone())),
        }
    }
    Ok(())
}

fn required<'a>(arg: Option<&'a str>, line: &str) -> Result<&'a str, NetError> {
    match arg {
        Some(arg) if !arg.is_empty() => Ok(arg),
        _ => Err(NetError::BadRequest(line.to_string())),
    }
}

fn need_repo<'a>(
    repo: &'a Option<Repository>,
    what: &'static str,
) -> Result<&'a Repository, NetError> {
    repo.as_ref().ok_or(NetError::NoRepository(what))
}

/// Adapter chunking a content stream into wire frames.
struct FrameWriter<'a> {
    conn: &'a mut Conn,
}

impl Write for FrameWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        for chunk in buf.chunks(65536) {
            self.conn
                .write_frame(chunk)
                .map_err(|e| std::io::Error::other(e.to_string()))?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.conn
            .flush()
            .map_err(|e| std::io::Error::other(e.to_string()))
    }
}
