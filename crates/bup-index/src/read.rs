//! Index reading.
//!
//! The reader maps the file read-write: entries are mutated in place via
//! [`repack`](Reader::repack) during an update walk. A missing index file
//! yields an empty reader, so first runs need no special casing. Iteration
//! is restartable; the merge step walks the same reader twice.

use std::io::Read;
use std::path::{Path, PathBuf};

use bstr::{BString, ByteSlice};
use memmap2::MmapMut;

use crate::entry::{Entry, ENTLEN};
use crate::{IndexError, INDEX_HDR};

/// Memory-mapped index reader.
pub struct Reader {
    map: Option<MmapMut>,
    filename: PathBuf,
    tstart: u32,
}

impl Reader {
    /// Open an index file; a nonexistent file gives an empty reader.
    ///
    /// Records the scan start time used by entry dirty checks.
    pub fn open(filename: impl AsRef<Path>) -> Result<Self, IndexError> {
        let filename = filename.as_ref().to_path_buf();
        let tstart = now_secs();

        let mut file = match std::fs::File::options()
            .read(true)
            .write(true)
            .open(&filename)
        {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self {
                    map: None,
                    filename,
                    tstart,
                })
            }
            Err(e) => return Err(e.into()),
        };

        let mut header = [0u8; INDEX_HDR.len()];
        if file.read_exact(&mut header).is_err() || header != *INDEX_HDR {
            return Err(IndexError::BadHeader { path: filename });
        }
        let map = unsafe { MmapMut::map_mut(&file)? };

        // Validate the record structure once so iteration can't run off
        // the end.
        let mut ofs = INDEX_HDR.len();
        while ofs < map.len() {
            let nul = map[ofs..]
                .find_byte(0)
                .ok_or(IndexError::Truncated(ofs))?;
            let rec = ofs + nul + 1;
            if rec + ENTLEN > map.len() {
                return Err(IndexError::Truncated(ofs));
            }
            ofs = rec + ENTLEN;
        }

        Ok(Self {
            map: Some(map),
            filename,
            tstart,
        })
    }

    /// Scan start time (seconds) recorded when the reader was opened.
    pub fn tstart(&self) -> u32 {
        self.tstart
    }

    pub fn path(&self) -> &Path {
        &self.filename
    }

    /// Iterate entries in file order (strictly descending names).
    pub fn iter(&self) -> EntryIter<'_> {
        EntryIter {
            map: self.map.as_deref().unwrap_or(&[]),
            ofs: INDEX_HDR.len(),
        }
    }

    /// Write an entry's packed record back to its slot in the mapping.
    pub fn repack(&mut self, e: &Entry) -> Result<(), IndexError> {
        let map = self
            .map
            .as_mut()
            .ok_or_else(|| IndexError::Truncated(e.ofs))?;
        if e.ofs + ENTLEN > map.len() {
            return Err(IndexError::Truncated(e.ofs));
        }
        map[e.ofs..e.ofs + ENTLEN].copy_from_slice(&e.packed());
        Ok(())
    }

    /// Flush in-place mutations to disk.
    pub fn save(&mut self) -> Result<(), IndexError> {
        if let Some(map) = &self.map {
            map.flush()?;
        }
        Ok(())
    }

    /// Yield `(display_name, entry)` for entries under the given prefixes.
    ///
    /// `paths` are `(resolved_prefix, display_prefix)` pairs in descending
    /// order with no prefix containing another (see
    /// [`reduce_paths`](bup_utils::path::reduce_paths)); the stream advances
    /// to the next prefix when entries sort below the current one.
    pub fn filter<'a>(
        &'a self,
        paths: &'a [(BString, BString)],
    ) -> impl Iterator<Item = (BString, Entry)> + 'a {
        let mut pi = paths.iter();
        let mut cur = pi.next();
        self.iter().filter_map(move |ent| {
            loop {
                let (rpin, pin) = cur?;
                if ent.name < *rpin {
                    cur = pi.next();
                    continue;
                }
                if !ent.name.starts_with(rpin.as_slice()) {
                    return None; // not under this prefix; keep scanning
                }
                let mut display = pin.clone();
                display.extend_from_slice(&ent.name[rpin.len()..]);
                if display.is_empty() {
                    display = BString::from("./");
                }
                return Some((display, ent));
            }
        })
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        let _ = self.save();
    }
}

/// Iterator over the entries of one mapping.
pub struct EntryIter<'a> {
    map: &'a [u8],
    ofs: usize,
}

impl<'a> Iterator for EntryIter<'a> {
    type Item = Entry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.ofs >= self.map.len() {
            return None;
        }
        let nul = self.map[self.ofs..]
            .find_byte(0)
            .expect("record structure validated at open");
        let name = BString::from(&self.map[self.ofs..self.ofs + nul]);
        let rec = self.ofs + nul + 1;
        let entry = Entry::unpack(name, self.map, rec);
        self.ofs = rec + ENTLEN;
        Some(entry)
    }
}

fn now_secs() -> u32 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}
