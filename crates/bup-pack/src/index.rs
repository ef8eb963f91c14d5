//! Pack index (v2) reading and lookup.
//!
//! The index provides id → pack-offset mapping via a fan-out table and
//! binary search. Format:
//!
//! ```text
//! Header:  \xff tOc (4 bytes) | version (4 bytes = 2)
//! Fanout:  256 × 4-byte big-endian cumulative counts
//! Ids:     N × 20-byte sorted hashes
//! CRC32:   N × 4-byte values
//! Offsets: N × 4-byte offsets (high bit set → index into 64-bit table)
//! 64-bit:  M × 8-byte offsets (for packs > 2GB)
//! Trailer: 20-byte pack checksum | 20-byte index checksum
//! ```

use std::path::{Path, PathBuf};

use bup_hash::ObjectId;
use memmap2::Mmap;

use crate::{PackError, IDX_SIGNATURE, IDX_VERSION};

/// Byte offset where the sorted hashes start.
const OID_OFFSET: usize = 8 + 256 * 4;

/// Memory-mapped pack index.
pub struct PackIndex {
    data: Mmap,
    /// Cumulative counts with a synthetic `fanout[-1] = 0` at slot 0, so
    /// bucket `b` covers `fanout[b] .. fanout[b + 1]`.
    fanout: [u32; 257],
    num_objects: u32,
    idx_path: PathBuf,
}

impl PackIndex {
    /// Open and validate a `.idx` file.
    pub fn open(idx_path: impl AsRef<Path>) -> Result<Self, PackError> {
        let idx_path = idx_path.as_ref().to_path_buf();
        let file = std::fs::File::open(&idx_path)?;
        let data = unsafe { Mmap::map(&file)? };

        // Minimum: header(8) + fanout(1024) + trailer(40)
        if data.len() < OID_OFFSET + 40 {
            return Err(PackError::InvalidIndex(format!(
                "{}: file too small",
                idx_path.display()
            )));
        }
        if data[0..4] != IDX_SIGNATURE {
            return Err(PackError::InvalidIndex(format!(
                "{}: bad signature",
                idx_path.display()
            )));
        }
        let version = read_u32(&data, 4);
        if version != IDX_VERSION {
            return Err(PackError::InvalidIndex(format!(
                "{}: unsupported version {version}",
                idx_path.display()
            )));
        }

        let mut fanout = [0u32; 257];
        for i in 0..256 {
            fanout[i + 1] = read_u32(&data, 8 + i * 4);
            if fanout[i + 1] < fanout[i] {
                return Err(PackError::InvalidIndex(format!(
                    "{}: fan-out not monotonic at bucket {i}",
                    idx_path.display()
                )));
            }
        }
        let num_objects = fanout[256];

        let n = num_objects as usize;
        // hashes + crc32 + ofs32; the 64-bit table is variable-length.
        let min_size = OID_OFFSET + n * 28 + 40;
        if data.len() < min_size {
            return Err(PackError::InvalidIndex(format!(
                "{}: file too small: {} < {min_size}",
                idx_path.display(),
                data.len()
            )));
        }

        Ok(Self {
            data,
            fanout,
            num_objects,
            idx_path,
        })
    }

    /// Look up an id, returning its byte offset in the pack.
    pub fn find_offset(&self, oid: &ObjectId) -> Option<u64> {
        self.find_index(oid).map(|i| self.offset_at(i))
    }

    /// Is the id present in this index?
    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.find_index(oid).is_some()
    }

    /// Binary-search the id's bucket; returns the sorted position on a hit.
    fn find_index(&self, oid: &ObjectId) -> Option<u32> {
        let b = oid.first_byte() as usize;
        let mut lo = self.fanout[b] as usize;
        let mut hi = self.fanout[b + 1] as usize;
        let want = oid.as_bytes().as_slice();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.oid_bytes_at(mid).cmp(want) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Some(mid as u32),
            }
        }
        None
    }

    /// Id at the given sorted position.
    pub fn oid_at(&self, index: u32) -> ObjectId {
        ObjectId::from_bytes(self.oid_bytes_at(index as usize)).expect("20-byte slice")
    }

    /// Pack offset at the given sorted position.
    pub fn offset_at(&self, index: u32) -> u64 {
        let n = self.num_objects as usize;
        let pos = OID_OFFSET + n * 24 + index as usize * 4;
        let ofs = read_u32(&self.data, pos);
        if ofs & 0x8000_0000 != 0 {
            let idx64 = (ofs & 0x7fff_ffff) as usize;
            let pos64 = OID_OFFSET + n * 28 + idx64 * 8;
            read_u64(&self.data, pos64)
        } else {
            ofs as u64
        }
    }

    /// Number of objects in this index.
    pub fn len(&self) -> u32 {
        self.num_objects
    }

    pub fn is_empty(&self) -> bool {
        self.num_objects == 0
    }

    /// Path to the `.idx` file.
    pub fn path(&self) -> &Path {
        &self.idx_path
    }

    /// File name without directory, as listed over the wire.
    pub fn base_name(&self) -> String {
        self.idx_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Iterate all ids in sorted order. Finite and restartable.
    pub fn iter(&self) -> PackIndexIter<'_> {
        PackIndexIter {
            index: self,
            pos: 0,
        }
    }

    fn oid_bytes_at(&self, index: usize) -> &[u8] {
        let start = OID_OFFSET + index * 20;
        &self.data[start..start + 20]
    }
}

fn read_u32(data: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

fn read_u64(data: &[u8], pos: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[pos..pos + 8]);
    u64::from_be_bytes(bytes)
}

/// Sorted iterator over the ids of a pack index.
pub struct PackIndexIter<'a> {
    index: &'a PackIndex,
    pos: u32,
}

impl<'a> Iterator for PackIndexIter<'a> {
    type Item = ObjectId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.index.num_objects {
            return None;
        }
        let oid = self.index.oid_at(self.pos);
        self.pos += 1;
        Some(oid)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.index.num_objects - self.pos) as usize;
        (remaining, Some(remaining))
    }
}

impl<'a> ExactSizeIterator for PackIndexIter<'a> {}
