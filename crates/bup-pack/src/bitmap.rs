//! Per-pack presence bitmap.
//!
//! A `.map` sidecar holds a 2^20-bit table; the bit for each id in the pack
//! (indexed by the top 20 bits of the hash, big-endian) is set. Consulting
//! the 128 KiB map answers "might this id exist here?" without touching the
//! 20-byte binary-search region of the `.idx` — no false negatives, a
//! controlled rate of false positives.

use std::io::Write;
use std::path::{Path, PathBuf};

use bup_hash::ObjectId;
use bup_utils::progress;
use bup_utils::tempfile::TempFile;
use memmap2::Mmap;

use crate::index::PackIndex;
use crate::PackError;

/// Number of hash bits used to index the table.
pub const MAP_BITS: u32 = 20;

/// On-disk size of the table in bytes.
const MAP_BYTES: usize = 1 << (MAP_BITS - 3);

/// Memory-mapped presence bitmap for one pack.
pub struct PackBitmap {
    map: Mmap,
    map_path: PathBuf,
}

impl PackBitmap {
    /// Open the bitmap belonging to `idx`, generating it first if missing.
    pub fn open(idx: &PackIndex) -> Result<Self, PackError> {
        let map_path = idx.path().with_extension("map");
        if !map_path.exists() {
            generate(idx, &map_path)?;
        }
        let file = std::fs::File::open(&map_path)?;
        let map = unsafe { Mmap::map(&file)? };
        if map.len() < MAP_BYTES {
            return Err(PackError::InvalidBitmap(format!(
                "{}: expected {MAP_BYTES} bytes, got {}",
                map_path.display(),
                map.len()
            )));
        }
        Ok(Self { map, map_path })
    }

    /// May the id exist in the pack? `false` is authoritative.
    pub fn might_exist(&self, oid: &ObjectId) -> bool {
        let idx = oid.top_bits(MAP_BITS) as usize;
        let byte = self.map[idx / 8];
        (byte >> (7 - (idx % 8))) & 1 != 0
    }

    pub fn path(&self) -> &Path {
        &self.map_path
    }
}

/// Build the bitmap for `idx` and write it atomically next to the index.
fn generate(idx: &PackIndex, map_path: &Path) -> Result<(), PackError> {
    if let Some(name) = map_path.file_name() {
        progress::log(&format!("Generating map for {}...\n", name.to_string_lossy()));
    }
    let mut table = vec![0u8; MAP_BYTES];
    for oid in idx.iter() {
        let bit = oid.top_bits(MAP_BITS) as usize;
        table[bit / 8] |= 1 << (7 - (bit % 8));
    }
    let mut tmp = TempFile::new_for(map_path)?;
    tmp.write_all(&table)?;
    tmp.persist(map_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::testutil::{build_test_index, make_oid, write_test_index};

    fn open_index_with(dir: &Path, oids: &[ObjectId]) -> PackIndex {
        let entries: Vec<_> = oids.iter().map(|&o| (o, 1u64)).collect();
        let data = build_test_index(&entries);
        let path = write_test_index(dir, "t.idx", &data);
        PackIndex::open(path).unwrap()
    }

    #[test]
    fn generated_on_first_open() {
        let dir = tempfile::tempdir().unwrap();
        let idx = open_index_with(dir.path(), &[make_oid(0xab, 1)]);
        assert!(!dir.path().join("t.map").exists());

        let bm = PackBitmap::open(&idx).unwrap();
        assert!(dir.path().join("t.map").exists());
        assert_eq!(
            std::fs::metadata(bm.path()).unwrap().len(),
            MAP_BYTES as u64
        );
    }

    #[test]
    fn no_false_negatives() {
        let dir = tempfile::tempdir().unwrap();
        let oids: Vec<_> = (0..32u8)
            .map(|i| make_oid(i.wrapping_mul(37), i))
            .collect();
        let idx = open_index_with(dir.path(), &oids);
        let bm = PackBitmap::open(&idx).unwrap();
        for oid in &oids {
            assert!(bm.might_exist(oid));
        }
    }

    #[test]
    fn distinct_prefixes_miss() {
        let dir = tempfile::tempdir().unwrap();
        let idx = open_index_with(dir.path(), &[make_oid(0x00, 1)]);
        let bm = PackBitmap::open(&idx).unwrap();
        // The top 20 bits differ, so the filter must answer no.
        assert!(!bm.might_exist(&make_oid(0xff, 1)));
    }

    #[test]
    fn ids_sharing_top_bits_collide() {
        let dir = tempfile::tempdir().unwrap();
        let idx = open_index_with(dir.path(), &[make_oid(0xab, 1)]);
        let bm = PackBitmap::open(&idx).unwrap();
        // Same top 20 bits (bytes 0-1 and the high nibble of byte 2), so
        // the filter may (and here does) answer yes for an absent id.
        let mut bytes = [0u8; 20];
        bytes[0] = 0xab;
        bytes[19] = 0x7f;
        assert!(bm.might_exist(&ObjectId(bytes)));
    }

    #[test]
    fn reuses_existing_map() {
        let dir = tempfile::tempdir().unwrap();
        let idx = open_index_with(dir.path(), &[make_oid(0x10, 1)]);
        let bm = PackBitmap::open(&idx).unwrap();
        drop(bm);
        let before = std::fs::metadata(dir.path().join("t.map"))
            .unwrap()
            .modified()
            .unwrap();
        let bm = PackBitmap::open(&idx).unwrap();
        let after = std::fs::metadata(bm.path()).unwrap().modified().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn bit_order_is_msb_first() {
        let dir = tempfile::tempdir().unwrap();
        // Id with top 20 bits all zero → bit 0 → MSB of byte 0.
        let idx = open_index_with(dir.path(), &[make_oid(0x00, 1)]);
        let _ = PackBitmap::open(&idx).unwrap();
        let map = std::fs::read(dir.path().join("t.map")).unwrap();
        assert_eq!(map[0], 0b1000_0000);
    }
}
