//! Last-writer-wins merge of sorted entry streams.
//!
//! All inputs are in descending name order, so the merge repeatedly takes
//! the greatest head. When several streams present the same name, the
//! stream latest in the input list wins — callers order newer streams
//! last — and every stream holding that name advances past it.

use crate::entry::Entry;
use crate::read::{EntryIter, Reader};
use crate::write::Writer;
use crate::IndexError;

/// Merge `readers` into `out`. Later readers supersede earlier ones on
/// equal names; descending order is preserved.
pub fn merge_into(out: &mut Writer, readers: &[&Reader]) -> Result<(), IndexError> {
    let mut cursors: Vec<(Entry, EntryIter<'_>)> = readers
        .iter()
        .filter_map(|r| {
            let mut it = r.iter();
            it.next().map(|e| (e, it))
        })
        .collect();

    while !cursors.is_empty() {
        // Greatest head; `>=` so the latest stream with that name wins.
        let mut winner = 0;
        for i in 1..cursors.len() {
            if cursors[i].0.name >= cursors[winner].0.name {
                winner = i;
            }
        }
        let name = cursors[winner].0.name.clone();
        out.add_entry(&cursors[winner].0)?;

        // Advance every stream past the emitted name.
        let mut i = 0;
        while i < cursors.len() {
            if cursors[i].0.name == name {
                match cursors[i].1.next() {
                    Some(e) => {
                        cursors[i].0 = e;
                        i += 1;
                    }
                    None => {
                        cursors.remove(i);
                    }
                }
            } else {
                i += 1;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::Reader;
    use crate::{IX_EXISTS, IX_HASHVALID};
    use bstr::BStr;
    use bup_hash::ObjectId;
    use std::path::Path;

    fn write_index(path: &Path, entries: &[(&str, Option<ObjectId>)]) {
        let meta = std::fs::symlink_metadata(path.parent().unwrap()).unwrap();
        let mut w = Writer::new(path).unwrap();
        for (name, sha) in entries {
            w.add(BStr::new(name), &meta, *sha).unwrap();
        }
        w.close().unwrap();
    }

    #[test]
    fn disjoint_streams_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        write_index(&a, &[("/d", None), ("/b", None)]);
        write_index(&b, &[("/c", None), ("/a", None)]);

        let out_path = dir.path().join("merged");
        let ra = Reader::open(&a).unwrap();
        let rb = Reader::open(&b).unwrap();
        let mut out = Writer::new(&out_path).unwrap();
        merge_into(&mut out, &[&ra, &rb]).unwrap();
        out.close().unwrap();

        let merged = Reader::open(&out_path).unwrap();
        let names: Vec<_> = merged.iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["/d", "/c", "/b", "/a"]);
    }

    #[test]
    fn later_stream_wins_equal_names() {
        let dir = tempfile::tempdir().unwrap();
        let older = dir.path().join("older");
        let newer = dir.path().join("newer");
        write_index(&older, &[("/same", None), ("/only-old", None)]);
        write_index(&newer, &[("/same", Some(ObjectId([9u8; 20])))]);

        let out_path = dir.path().join("merged");
        let ro = Reader::open(&older).unwrap();
        let rn = Reader::open(&newer).unwrap();
        let mut out = Writer::new(&out_path).unwrap();
        merge_into(&mut out, &[&ro, &rn]).unwrap();
        out.close().unwrap();

        let merged = Reader::open(&out_path).unwrap();
        let entries: Vec<_> = merged.iter().collect();
        assert_eq!(entries.len(), 2);
        // The newer stream's record for "/same" prevailed.
        assert_eq!(entries[0].name, "/same");
        assert_eq!(entries[0].sha, ObjectId([9u8; 20]));
        assert_eq!(entries[0].flags, IX_EXISTS | IX_HASHVALID);
        assert_eq!(entries[1].name, "/only-old");
    }

    #[test]
    fn three_way_tie_takes_last() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<_> = (0..3).map(|i| dir.path().join(format!("ix{i}"))).collect();
        for (i, p) in paths.iter().enumerate() {
            write_index(p, &[("/k", Some(ObjectId([i as u8 + 1; 20])))]);
        }

        let readers: Vec<_> = paths.iter().map(|p| Reader::open(p).unwrap()).collect();
        let refs: Vec<&Reader> = readers.iter().collect();
        let out_path = dir.path().join("merged");
        let mut out = Writer::new(&out_path).unwrap();
        merge_into(&mut out, &refs).unwrap();
        out.close().unwrap();

        let merged = Reader::open(&out_path).unwrap();
        let entries: Vec<_> = merged.iter().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].sha, ObjectId([3u8; 20]));
    }

    #[test]
    fn empty_inputs_merge_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("merged");
        let r = Reader::open(dir.path().join("missing")).unwrap();
        let mut out = Writer::new(&out_path).unwrap();
        merge_into(&mut out, &[&r]).unwrap();
        out.close().unwrap();
        assert_eq!(Reader::open(&out_path).unwrap().iter().count(), 0);
    }
}
