//! Property tests over the index file: write/read round-trips preserve
//! the descending entry sequence exactly, and the last-writer-wins merge
//! law holds for arbitrary overlapping name sets.

use std::collections::BTreeSet;
use std::path::Path;

use bstr::{BString, ByteSlice};
use proptest::prelude::*;

use bup_hash::ObjectId;
use bup_index::read::Reader;
use bup_index::write::Writer;
use bup_index::{merge::merge_into, IX_EXISTS, IX_HASHVALID};

/// Entry names: arbitrary NUL-free byte strings.
fn name_set() -> impl Strategy<Value = BTreeSet<Vec<u8>>> {
    prop::collection::btree_set(prop::collection::vec(1u8..=255, 1..16), 0..25)
}

fn descending(set: &BTreeSet<Vec<u8>>) -> Vec<BString> {
    set.iter().rev().map(|n| BString::from(n.clone())).collect()
}

fn write_names(path: &Path, names: &[BString], sha: Option<ObjectId>) {
    let meta = std::fs::symlink_metadata(path.parent().unwrap()).unwrap();
    let mut w = Writer::new(path).unwrap();
    for name in names {
        w.add(name.as_bstr(), &meta, sha).unwrap();
    }
    w.close().unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn write_read_roundtrip_preserves_sequence(names in name_set()) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bupindex");
        let names = descending(&names);
        write_names(&path, &names, None);

        let r = Reader::open(&path).unwrap();
        let back: Vec<BString> = r.iter().map(|e| e.name).collect();
        prop_assert_eq!(&back, &names);
        // Strictly descending throughout.
        prop_assert!(back.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn merge_law_newer_wins_and_order_holds(
        old in name_set(),
        new in name_set(),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let old_path = dir.path().join("old");
        let new_path = dir.path().join("new");
        let old_names = descending(&old);
        let new_names = descending(&new);
        // Old entries carry no hash; new ones are stamped, so provenance
        // of each merged record is visible in its flags.
        write_names(&old_path, &old_names, None);
        write_names(&new_path, &new_names, Some(ObjectId([9u8; 20])));

        let ro = Reader::open(&old_path).unwrap();
        let rn = Reader::open(&new_path).unwrap();
        let merged_path = dir.path().join("merged");
        let mut out = Writer::new(&merged_path).unwrap();
        merge_into(&mut out, &[&ro, &rn]).unwrap();
        out.close().unwrap();

        let union: BTreeSet<Vec<u8>> = old.union(&new).cloned().collect();
        let expected = descending(&union);

        let merged = Reader::open(&merged_path).unwrap();
        let entries: Vec<_> = merged.iter().collect();
        let got: Vec<BString> = entries.iter().map(|e| e.name.clone()).collect();
        prop_assert_eq!(&got, &expected);

        for e in &entries {
            let in_new = new.contains(e.name.as_slice() as &[u8]);
            if in_new {
                prop_assert_eq!(e.flags, IX_EXISTS | IX_HASHVALID);
                prop_assert_eq!(e.sha, ObjectId([9u8; 20]));
            } else {
                prop_assert_eq!(e.flags, IX_EXISTS);
            }
        }
    }
}
