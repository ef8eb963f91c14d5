//! Index writing.
//!
//! The writer appends to a temp file beside the target (same filesystem,
//! so the final rename is atomic) and enforces strictly descending entry
//! names. A crash at any point leaves either the old index or a complete
//! new one — never a half-written file at the index path.

use std::fs::Metadata;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bstr::{BStr, BString, ByteSlice};
use bup_hash::ObjectId;
use bup_utils::tempfile::TempFile;

use crate::entry::{stat_fields, Entry};
use crate::read::Reader;
use crate::{IndexError, EMPTY_SHA, INDEX_HDR, IX_EXISTS, IX_HASHVALID};

/// Appending writer for a fresh index file.
pub struct Writer {
    f: Option<BufWriter<TempFile>>,
    tmp_path: PathBuf,
    filename: PathBuf,
    count: usize,
    last_name: Option<BString>,
}

impl Writer {
    pub fn new(filename: impl AsRef<Path>) -> Result<Self, IndexError> {
        let filename = filename.as_ref().to_path_buf();
        let mut tmp = TempFile::new_for(&filename)?;
        let tmp_path = tmp.path().to_path_buf();
        tmp.write_all(INDEX_HDR)?;
        Ok(Self {
            f: Some(BufWriter::with_capacity(65536, tmp)),
            tmp_path,
            filename,
            count: 0,
            last_name: None,
        })
    }

    /// Entries written so far.
    pub fn count(&self) -> usize {
        self.count
    }

    fn check_order(&mut self, name: &BStr) -> Result<(), IndexError> {
        if let Some(last) = &self.last_name {
            if last.as_slice() <= name.as_bytes() {
                return Err(IndexError::Disorder {
                    name: name.to_owned(),
                    last: last.clone(),
                });
            }
        }
        self.last_name = Some(name.to_owned());
        Ok(())
    }

    fn write_record(&mut self, name: &BStr, rec: &[u8]) -> Result<(), IndexError> {
        let f = self.f.as_mut().expect("writer already closed");
        f.write_all(name)?;
        f.write_all(&[0])?;
        f.write_all(rec)?;
        self.count += 1;
        Ok(())
    }

    /// Append a brand-new entry for a freshly statted path.
    ///
    /// With a hash the entry starts `EXISTS|HASHVALID`; without one it
    /// starts `EXISTS` and a null hash, to be filled in by a later save.
    pub fn add(
        &mut self,
        name: &BStr,
        meta: &Metadata,
        sha: Option<ObjectId>,
    ) -> Result<(), IndexError> {
        self.check_order(name)?;
        let (dev, ctime, mtime, uid, gid, size) = stat_fields(meta);
        let e = Entry {
            name: name.to_owned(),
            dev,
            ctime,
            mtime,
            uid,
            gid,
            size,
            sha: sha.unwrap_or(EMPTY_SHA),
            flags: if sha.is_some() {
                IX_EXISTS | IX_HASHVALID
            } else {
                IX_EXISTS
            },
            ofs: 0,
        };
        self.write_record(name, &e.packed())
    }

    /// Append an existing entry (merge path).
    pub fn add_entry(&mut self, e: &Entry) -> Result<(), IndexError> {
        self.check_order(e.name.as_ref())?;
        self.write_record(e.name.as_ref(), &e.packed())
    }

    /// Open a reader over the entries written so far.
    pub fn new_reader(&mut self) -> Result<Reader, IndexError> {
        self.f.as_mut().expect("writer already closed").flush()?;
        Reader::open(&self.tmp_path)
    }

    /// Commit: flush and rename over the target.
    pub fn close(mut self) -> Result<(), IndexError> {
        let f = self.f.take().expect("writer already closed");
        let tmp = f.into_inner().map_err(|e| e.into_error())?;
        tmp.persist(&self.filename)?;
        Ok(())
    }

    /// Drop the temp file without touching the target. Also what plain
    /// dropping does; both are idempotent.
    pub fn abort(mut self) -> Result<(), IndexError> {
        self.f.take();
        Ok(())
    }
}
