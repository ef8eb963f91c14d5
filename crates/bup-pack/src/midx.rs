//! Multi-pack index (midx): one sorted table over many `.idx` files.
//!
//! Format:
//!
//! ```text
//! Header:  MIDX (4) | version (4 bytes = 2) | bits (4 bytes)
//! Fanout:  2^bits × 4-byte big-endian cumulative counts
//! Ids:     N × 20-byte sorted hashes
//! Names:   NUL-joined base names of the merged .idx inputs
//! ```
//!
//! `bits` is sized so one fan-out bucket covers roughly a page of hashes.
//! Duplicate ids across inputs appear once in the output.

use std::collections::BinaryHeap;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bup_hash::{Hasher, ObjectId};
use bup_utils::progress::{log, Progress};
use bup_utils::tempfile::TempFile;
use memmap2::Mmap;

use crate::index::PackIndex;
use crate::{PackError, MIDX_SIGNATURE, MIDX_VERSION};

/// Hashes per fan-out bucket the table is sized for (one 4 KiB page of
/// ~200-byte index lines).
const SHA_PER_PAGE: f64 = 4096.0 / 200.0;

/// Merge the given `.idx` files into a midx in `outdir`.
///
/// The output name defaults to `midx-<sha1 of the NUL-joined input
/// names>.midx`. Returns `None` (and writes nothing) when the inputs hold
/// no objects.
pub fn write_midx(
    outdir: &Path,
    outfilename: Option<PathBuf>,
    idx_paths: &[PathBuf],
) -> Result<Option<PathBuf>, PackError> {
    let mut inputs = Vec::with_capacity(idx_paths.len());
    let mut total: u64 = 0;
    for path in idx_paths {
        let ix = PackIndex::open(path)?;
        total += ix.len() as u64;
        inputs.push(ix);
    }
    if total == 0 {
        log("No new .idx files: nothing to do.\n");
        return Ok(None);
    }

    let outfilename = outfilename.unwrap_or_else(|| {
        let mut hasher = Hasher::new();
        for (i, path) in idx_paths.iter().enumerate() {
            if i > 0 {
                hasher.update(b"\0");
            }
            hasher.update(path.to_string_lossy().as_bytes());
        }
        outdir.join(format!("midx-{}.midx", hasher.finalize().to_hex()))
    });

    let pages = (total as f64 / SHA_PER_PAGE).max(1.0);
    let bits = pages.log2().ceil() as u32;
    let entries = 1usize << bits;
    log(&format!(
        "Merging {} indexes ({total} objects).\n",
        inputs.len()
    ));

    let mut f = TempFile::new_for(&outfilename)?;
    f.write_all(MIDX_SIGNATURE)?;
    f.write_all(&MIDX_VERSION.to_be_bytes())?;
    f.write_all(&bits.to_be_bytes())?;
    f.write_all(&vec![0u8; entries * 4])?; // fan-out placeholder

    // K-way merge: a min-heap of (head, cursor) pairs. Equal ids are
    // emitted once; every cursor holding one advances past it.
    let mut table = vec![0u32; entries];
    let mut iters: Vec<_> = inputs.iter().map(|ix| ix.iter()).collect();
    let mut heap = BinaryHeap::new();
    for (i, it) in iters.iter_mut().enumerate() {
        if let Some(h) = it.next() {
            heap.push(std::cmp::Reverse((h, i)));
        }
    }
    let mut progress = Progress::new("Merging", Some(total));
    let mut last: Option<ObjectId> = None;
    let mut count: u32 = 0;
    while let Some(std::cmp::Reverse((h, i))) = heap.pop() {
        if let Some(next) = iters[i].next() {
            heap.push(std::cmp::Reverse((next, i)));
        }
        if last == Some(h) {
            continue;
        }
        last = Some(h);
        f.write_all(h.as_bytes())?;
        count += 1;
        table[h.top_bits(bits) as usize] = count;
        progress.update(count as u64);
    }
    progress.done();

    let mut names = Vec::new();
    for (i, path) in idx_paths.iter().enumerate() {
        if i > 0 {
            names.push(0);
        }
        let base = path.file_name().map(|n| n.to_string_lossy().into_owned());
        names.extend_from_slice(base.unwrap_or_default().as_bytes());
    }
    f.write_all(&names)?;

    // Make the fan-out cumulative (empty buckets inherit their
    // predecessor) and patch it over the placeholder.
    for i in 1..entries {
        if table[i] < table[i - 1] {
            table[i] = table[i - 1];
        }
    }
    f.seek(SeekFrom::Start(12))?;
    for v in &table {
        f.write_all(&v.to_be_bytes())?;
    }
    f.persist(&outfilename)?;
    Ok(Some(outfilename))
}

/// Memory-mapped reader over a midx file.
pub struct PackMidx {
    data: Mmap,
    bits: u32,
    entries: usize,
    num: u32,
    idx_names: Vec<String>,
    midx_path: PathBuf,
}

impl PackMidx {
    pub fn open(midx_path: impl AsRef<Path>) -> Result<Self, PackError> {
        let midx_path = midx_path.as_ref().to_path_buf();
        let file = std::fs::File::open(&midx_path)?;
        let data = unsafe { Mmap::map(&file)? };

        if data.len() < 12 {
            return Err(PackError::InvalidMidx(format!(
                "{}: file too small",
                midx_path.display()
            )));
        }
        if &data[0..4] != MIDX_SIGNATURE {
            return Err(PackError::InvalidMidx(format!(
                "{}: bad signature",
                midx_path.display()
            )));
        }
        let version = read_u32(&data, 4);
        if version != MIDX_VERSION {
            return Err(PackError::InvalidMidx(format!(
                "{}: unsupported version {version}",
                midx_path.display()
            )));
        }
        let bits = read_u32(&data, 8);
        if bits > 29 {
            return Err(PackError::InvalidMidx(format!(
                "{}: absurd fan-out ({bits} bits)",
                midx_path.display()
            )));
        }
        let entries = 1usize << bits;
        if data.len() < 12 + entries * 4 {
            return Err(PackError::InvalidMidx(format!(
                "{}: truncated fan-out",
                midx_path.display()
            )));
        }
        let num = read_u32(&data, 12 + (entries - 1) * 4);
        let names_ofs = 12 + entries * 4 + num as usize * 20;
        if data.len() < names_ofs {
            return Err(PackError::InvalidMidx(format!(
                "{}: truncated hash table",
                midx_path.display()
            )));
        }
        let idx_names = data[names_ofs..]
            .split(|&b| b == 0)
            .filter(|s| !s.is_empty())
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect();

        Ok(Self {
            data,
            bits,
            entries,
            num,
            idx_names,
            midx_path,
        })
    }

    /// Is the id in any of the merged packs?
    pub fn exists(&self, oid: &ObjectId) -> bool {
        let prefix = oid.top_bits(self.bits) as usize;
        let mut lo = if prefix == 0 {
            0
        } else {
            self.fanout_entry(prefix - 1) as usize
        };
        let mut hi = self.fanout_entry(prefix) as usize;
        let want = oid.as_bytes().as_slice();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.oid_bytes_at(mid).cmp(want) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return true,
            }
        }
        false
    }

    pub fn len(&self) -> u32 {
        self.num
    }

    pub fn is_empty(&self) -> bool {
        self.num == 0
    }

    /// Fan-out width in bits.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Cumulative fan-out entry `i`.
    pub fn fanout_entry(&self, i: usize) -> u32 {
        read_u32(&self.data, 12 + i * 4)
    }

    /// Base names of the merged `.idx` inputs.
    pub fn idx_names(&self) -> &[String] {
        &self.idx_names
    }

    pub fn path(&self) -> &Path {
        &self.midx_path
    }

    /// Iterate all ids in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = ObjectId> + '_ {
        (0..self.num as usize)
            .map(|i| ObjectId::from_bytes(self.oid_bytes_at(i)).expect("20-byte slice"))
    }

    fn oid_bytes_at(&self, index: usize) -> &[u8] {
        let start = 12 + self.entries * 4 + index * 20;
        &self.data[start..start + 20]
    }
}

fn read_u32(data: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}
