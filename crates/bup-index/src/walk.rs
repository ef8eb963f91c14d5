//! Depth-first directory walker.
//!
//! Emits `(path, lstat)` pairs in strictly descending path order: children
//! of each directory are visited in reverse-alphabetical order and a
//! directory follows its own subtree. Directory names carry a trailing
//! `/`, which is also what makes `foo/` sort after `foo` as a plain
//! string. Per-entry stat or listing failures go to the error sink and the
//! walk continues.

use std::fs::Metadata;
use std::path::Path;

use bstr::{BString, ByteVec};
use bup_utils::path::{bytes_to_path, path_to_bytes, slash_append};
use bup_utils::{progress, SavedErrors};

use crate::IndexError;

/// One directory level of the traversal.
struct Level {
    /// Children in descending name order, names relative with `/` appended
    /// for directories.
    entries: std::vec::IntoIter<(BString, Metadata)>,
    /// The directory itself, emitted once its subtree is exhausted.
    pending: Option<(BString, Metadata)>,
}

/// Iterator form of the walk; an explicit level stack, no recursion.
pub struct Walker<'a> {
    stack: Vec<Level>,
    xdev: Option<u64>,
    errors: &'a SavedErrors,
}

impl<'a> Walker<'a> {
    /// Start a walk at `root` (which must exist).
    ///
    /// With `one_file_system`, children on a different device than the
    /// root are skipped. The emitted root path is `root` itself, with a
    /// trailing slash if it is a directory.
    pub fn new(
        root: &Path,
        one_file_system: bool,
        errors: &'a SavedErrors,
    ) -> Result<Self, IndexError> {
        let meta = std::fs::symlink_metadata(root)?;
        let xdev = if one_file_system {
            Some(dev_of(&meta))
        } else {
            None
        };

        let mut walker = Self {
            stack: Vec::new(),
            xdev,
            errors,
        };
        let name = path_to_bytes(root);
        if meta.is_dir() {
            let name = slash_append(name);
            let level = walker.descend(name, meta);
            walker.stack.push(level);
        } else {
            walker.stack.push(Level {
                entries: Vec::new().into_iter(),
                pending: Some((name, meta)),
            });
        }
        Ok(walker)
    }

    /// List a directory into a level. On failure the error is recorded and
    /// the directory is dropped entirely (not emitted).
    fn descend(&mut self, dir_name: BString, dir_meta: Metadata) -> Level {
        let dir_path = bytes_to_path(&dir_name);
        let listing = match std::fs::read_dir(&dir_path) {
            Ok(l) => l,
            Err(e) => {
                self.errors.add(format!("in {dir_name}: {e}"));
                return Level {
                    entries: Vec::new().into_iter(),
                    pending: None,
                };
            }
        };

        let mut children: Vec<(BString, Metadata)> = Vec::new();
        for dirent in listing {
            let dirent = match dirent {
                Ok(d) => d,
                Err(e) => {
                    self.errors.add(format!("in {dir_name}: {e}"));
                    continue;
                }
            };
            let meta = match std::fs::symlink_metadata(dirent.path()) {
                Ok(m) => m,
                Err(e) => {
                    self.errors.add(format!("in {dir_name}: {e}"));
                    continue;
                }
            };
            if let Some(dev) = self.xdev {
                if dev_of(&meta) != dev {
                    progress::log(&format!(
                        "Skipping {}: different filesystem.\n",
                        dirent.path().display()
                    ));
                    continue;
                }
            }
            let mut name = path_to_bytes(Path::new(&dirent.file_name()));
            if meta.is_dir() {
                name = slash_append(name);
            }
            children.push((name, meta));
        }
        children.sort_by(|a, b| b.0.cmp(&a.0));

        Level {
            entries: children.into_iter(),
            pending: Some((dir_name, dir_meta)),
        }
    }
}

impl<'a> Iterator for Walker<'a> {
    type Item = (BString, Metadata);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.stack.last_mut()?;
            match top.entries.next() {
                None => {
                    let level = self.stack.pop().expect("stack non-empty");
                    if let Some(done) = level.pending {
                        return Some(done);
                    }
                }
                Some((name, meta)) => {
                    let parent = self
                        .stack
                        .last()
                        .and_then(|l| l.pending.as_ref())
                        .map(|(n, _)| n.clone())
                        .unwrap_or_default();
                    let mut full = parent;
                    full.push_str(&name);
                    if meta.is_dir() {
                        let level = self.descend(full, meta);
                        self.stack.push(level);
                    } else {
                        return Some((full, meta));
                    }
                }
            }
        }
    }
}

#[cfg(unix)]
fn dev_of(meta: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.dev()
}
