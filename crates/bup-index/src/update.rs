//! The update walk: fold the current filesystem state into the index.
//!
//! The walker (descending) and the existing index (also descending) are
//! consumed in lockstep. Entries the walker no longer sees are marked
//! deleted in place; matching entries are refreshed via `from_stat`; new
//! paths are appended through a writer and merged in at the end. Parents
//! of the walked root lose `IX_HASHVALID` whenever anything below them
//! changed. The index file itself is only ever replaced by an atomic
//! rename, so a crash leaves either the old or the new index, never a mix.

use std::path::Path;

use bstr::{BStr, BString};
use bup_hash::ObjectId;
use bup_utils::path::{path_to_bytes, slash_append};
use bup_utils::SavedErrors;

use crate::entry::Entry;
use crate::merge::merge_into;
use crate::read::Reader;
use crate::walk::Walker;
use crate::write::Writer;
use crate::{IndexError, IX_HASHVALID};

/// Options for one update pass.
#[derive(Default)]
pub struct UpdateOptions<'a> {
    /// Skip children on other filesystems.
    pub one_file_system: bool,
    /// Optional hash stamper: called for new and dirty paths; returning a
    /// hash marks the entry `IX_HASHVALID` without reading the file.
    pub hashgen: Option<&'a dyn Fn(&BStr) -> Option<ObjectId>>,
}

/// Cursor over a snapshot of the reader's entries.
struct Cursor {
    entries: std::vec::IntoIter<Entry>,
    cur: Option<Entry>,
}

impl Cursor {
    fn new(reader: &Reader) -> Self {
        let entries: Vec<Entry> = reader.iter().collect();
        let mut it = entries.into_iter();
        let cur = it.next();
        Self { entries: it, cur }
    }

    fn advance(&mut self) {
        self.cur = self.entries.next();
    }
}

/// Update `indexfile` for the tree rooted at `path`.
///
/// Returns the number of dirtied entries (new, changed, or deleted).
pub fn update_index(
    indexfile: &Path,
    path: &Path,
    opts: &UpdateOptions<'_>,
    errors: &SavedErrors,
) -> Result<u64, IndexError> {
    let rpath = std::fs::canonicalize(path)?;
    let root_meta = std::fs::symlink_metadata(&rpath)?;

    let mut ri = Reader::open(indexfile)?;
    let tstart = ri.tstart();
    let mut wi = Writer::new(indexfile)?;
    let mut cursor = Cursor::new(&ri);

    let can_delete = root_meta.is_dir();
    let root_prefix = slash_append(path_to_bytes(&rpath));
    let mut dirty: u64 = 0;

    for (name, meta) in Walker::new(&rpath, opts.one_file_system, errors)? {
        // Entries sorting above the walk position were not seen by the
        // walker: anything under the walked root is gone.
        while let Some(e) = cursor.cur.as_mut() {
            if e.name <= name {
                break;
            }
            if can_delete && e.name.starts_with(root_prefix.as_slice()) {
                e.mark_deleted();
                ri.repack(e)?;
                dirty += 1;
            }
            cursor.advance();
        }

        match cursor.cur.as_mut() {
            Some(e) if e.name == name => {
                if e.from_stat(&meta, tstart) {
                    dirty += 1;
                }
                if dirty > 0 || !e.hash_valid() {
                    if let Some(hashgen) = opts.hashgen {
                        if let Some(sha) = hashgen(name.as_ref()) {
                            e.sha = sha;
                            e.flags |= IX_HASHVALID;
                        }
                    }
                    ri.repack(e)?;
                }
                cursor.advance();
            }
            _ => {
                let sha = opts.hashgen.and_then(|h| h(name.as_ref()));
                wi.add(name.as_ref(), &meta, sha)?;
                dirty += 1;
            }
        }
    }

    // Every parent of the root must exist in the index, and loses its
    // valid bit when anything below changed. The recorded sha is left
    // alone; tree hashes are recomputed lazily by the save driver.
    let mut rp = rpath.clone();
    while let Some(parent) = rp.parent() {
        rp = parent.to_path_buf();
        let p: BString = if rp == Path::new("/") {
            BString::from("/")
        } else {
            slash_append(path_to_bytes(&rp))
        };

        while let Some(e) = cursor.cur.as_ref() {
            if e.name <= p {
                break;
            }
            cursor.advance();
        }
        match cursor.cur.as_mut() {
            Some(e) if e.name == p => {
                if dirty > 0 {
                    e.flags &= !IX_HASHVALID;
                    ri.repack(e)?;
                }
            }
            _ => {
                let pmeta = std::fs::symlink_metadata(&rp)?;
                wi.add(p.as_ref(), &pmeta, None)?;
            }
        }
        if p == "/" {
            break;
        }
    }

    ri.save()?;
    if wi.count() > 0 {
        let wr = wi.new_reader()?;
        let mut mi = Writer::new(indexfile)?;
        merge_into(&mut mi, &[&ri, &wr])?;
        mi.close()?;
        drop(wr);
    }
    wi.abort()?;
    Ok(dirty)
}
