//! Midx over a real finalised pack: write many random blobs through the
//! pack writer, merge the resulting index, and check the merged table
//! yields exactly the index's hash sequence.

use bup_object::ObjectType;
use bup_pack::index::PackIndex;
use bup_pack::midx::{write_midx, PackMidx};
use bup_pack::writer::PackWriter;
use bup_utils::subprocess::{Cmd, StdioMode};

fn git_available() -> bool {
    Cmd::new("git")
        .arg("--version")
        .stdout(StdioMode::Null)
        .stderr(StdioMode::Null)
        .run()
        .map(|o| o.success())
        .unwrap_or(false)
}

fn make_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    Cmd::new("git")
        .arg("init")
        .arg("-q")
        .arg("--bare")
        .arg(dir.path())
        .stdout(StdioMode::Null)
        .stderr(StdioMode::Null)
        .run_ok()
        .unwrap();
    dir
}

/// Deterministic pseudo-random 32-byte payloads (xorshift64*).
struct Rng(u64);

impl Rng {
    fn next_block(&mut self) -> [u8; 32] {
        let mut out = [0u8; 32];
        for chunk in out.chunks_mut(8) {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            chunk.copy_from_slice(&self.0.to_be_bytes());
        }
        out
    }
}

#[test]
fn midx_over_ten_thousand_blobs_matches_idx() {
    if !git_available() {
        return;
    }
    let repo = make_repo();
    let mut w = PackWriter::new(repo.path());
    let mut rng = Rng(0x2545_f491_4f6c_dd1d);
    for _ in 0..10_000 {
        w.write(ObjectType::Blob, &rng.next_block()).unwrap();
    }
    assert_eq!(w.count(), 10_000);
    let prefix = w.close().unwrap().expect("pack written");

    let idx_path = prefix.with_extension("idx");
    let idx = PackIndex::open(&idx_path).unwrap();
    assert_eq!(idx.len(), 10_000);

    let pack_dir = repo.path().join("objects/pack");
    let out = write_midx(&pack_dir, None, &[idx_path])
        .unwrap()
        .expect("non-empty input");
    let midx = PackMidx::open(&out).unwrap();
    assert_eq!(midx.len(), 10_000);

    // 10_000 objects over ~20 hashes per page lands at 9 fan-out bits.
    assert_eq!(midx.bits(), 9);

    let from_idx: Vec<_> = idx.iter().collect();
    let from_midx: Vec<_> = midx.iter().collect();
    assert_eq!(from_idx, from_midx);

    for oid in from_idx.iter().step_by(997) {
        assert!(midx.exists(oid));
    }
}
