use std::path::{Path, PathBuf};

use bstr::{BString, ByteSlice, ByteVec};

use crate::Result;

/// Convert a path to its raw byte representation.
#[cfg(unix)]
pub fn path_to_bytes(path: &Path) -> BString {
    use std::os::unix::ffi::OsStrExt;
    BString::from(path.as_os_str().as_bytes())
}

/// Convert raw bytes back to a path.
#[cfg(unix)]
pub fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(OsStr::from_bytes(bytes))
}

/// Append a trailing slash unless the name is empty or already has one.
pub fn slash_append(mut name: BString) -> BString {
    if !name.is_empty() && !name.ends_with(b"/") {
        name.push_byte(b'/');
    }
    name
}

/// Resolve and reduce a list of requested paths to `(resolved, display)`
/// pairs in descending order, dropping any path already covered by another.
///
/// Directories get a trailing slash on both halves so prefix matching over
/// the descending index stream works without special cases.
pub fn reduce_paths(paths: &[PathBuf]) -> Result<Vec<(BString, BString)>> {
    let mut xpaths = Vec::with_capacity(paths.len());
    for p in paths {
        let rp = std::fs::canonicalize(p)?;
        let meta = std::fs::symlink_metadata(&rp)?;
        let mut resolved = path_to_bytes(&rp);
        let mut display = path_to_bytes(p);
        if meta.is_dir() {
            resolved = slash_append(resolved);
            display = slash_append(display);
        }
        xpaths.push((resolved, display));
    }
    xpaths.sort();

    let mut reduced: Vec<(BString, BString)> = Vec::new();
    for (rp, p) in xpaths {
        if let Some((prev, _)) = reduced.last() {
            if *prev == rp || (prev.ends_with(b"/") && rp.starts_with(prev.as_bstr())) {
                continue; // superseded by the previous path
            }
        }
        reduced.push((rp, p));
    }
    reduced.sort_by(|a, b| b.cmp(a));
    Ok(reduced)
}
