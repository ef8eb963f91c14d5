//! Multi-pack fan-in over a directory of `.idx` files.
//!
//! Lookup cost stays amortised as packs accumulate: each pack's bitmap is
//! consulted before its index, and a hit moves the pack to the front of the
//! search order. A transient `also` set covers objects already written to
//! the in-flight pack, which has no index yet.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use bup_hash::ObjectId;

use crate::bitmap::PackBitmap;
use crate::index::PackIndex;
use crate::PackError;

/// Construction serialiser: at most one live instance per process.
static INSTANCE: Mutex<()> = Mutex::new(());

/// Where a lookup found its id.
#[derive(Debug, PartialEq, Eq)]
pub enum Location<'a> {
    /// In the in-flight pack (noted via [`MultiPackIndex::note_written`]).
    Pending,
    /// In the pack whose `.idx` lives at this path.
    Pack(&'a Path),
}

/// Aggregated lookup over every pack index in a directory.
pub struct MultiPackIndex {
    dir: PathBuf,
    also: HashSet<ObjectId>,
    packs: Vec<PackIndex>,
    maps: Vec<PackBitmap>,
    _guard: MutexGuard<'static, ()>,
}

impl MultiPackIndex {
    /// Open all `.idx` files under `dir` (generating missing `.map`s).
    ///
    /// Blocks until any previous instance has been dropped; the object
    /// cache is exclusive by design.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, PackError> {
        let guard = INSTANCE.lock().unwrap_or_else(|e| e.into_inner());
        let mut this = Self {
            dir: dir.into(),
            also: HashSet::new(),
            packs: Vec::new(),
            maps: Vec::new(),
            _guard: guard,
        };
        this.refresh()?;
        Ok(this)
    }

    /// Where is this id, if anywhere?
    ///
    /// Packs are probed in most-recently-hit order; a hit moves the winning
    /// pack to the front.
    pub fn find(&mut self, oid: &ObjectId) -> Option<Location<'_>> {
        if self.also.contains(oid) {
            return Some(Location::Pending);
        }
        for i in 0..self.packs.len() {
            if !self.maps[i].might_exist(oid) {
                continue;
            }
            if self.packs[i].contains(oid) {
                // Most recently used pack moves to the front of the probe
                // order, in both lists.
                self.packs[..=i].rotate_right(1);
                self.maps[..=i].rotate_right(1);
                return Some(Location::Pack(self.packs[0].path()));
            }
        }
        None
    }

    /// Convenience wrapper for deduplication checks.
    pub fn contains(&mut self, oid: &ObjectId) -> bool {
        self.find(oid).is_some()
    }

    /// Record an id as written to the in-flight pack.
    pub fn note_written(&mut self, oid: ObjectId) {
        self.also.insert(oid);
    }

    /// Forget the in-flight set (after the pack is finalised and indexed).
    pub fn clear_written(&mut self) {
        self.also.clear();
    }

    /// Pick up `.idx` files that appeared since the last scan.
    pub fn refresh(&mut self) -> Result<(), PackError> {
        let known: HashSet<PathBuf> = self.packs.iter().map(|p| p.path().to_path_buf()).collect();
        if !self.dir.exists() {
            return Ok(());
        }
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("idx") || known.contains(&path) {
                continue;
            }
            let idx = PackIndex::open(&path)?;
            self.maps.push(PackBitmap::open(&idx)?);
            self.packs.push(idx);
        }
        Ok(())
    }

    /// Paths of the tracked `.idx` files, in current probe order.
    pub fn idx_paths(&self) -> impl Iterator<Item = &Path> {
        self.packs.iter().map(|p| p.path())
    }

    pub fn num_packs(&self) -> usize {
        self.packs.len()
    }
}
