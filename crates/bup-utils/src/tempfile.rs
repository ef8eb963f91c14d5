use std::fs;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

use crate::Result;

/// A temporary file committed by atomic rename.
///
/// The file is created in the same directory as its eventual target so the
/// rename cannot cross a filesystem boundary. Dropping an uncommitted
/// `TempFile` unlinks it; `persist` consumes the guard and renames the file
/// into place.
pub struct TempFile {
    inner: Option<::tempfile::NamedTempFile>,
}

impl TempFile {
    /// Create a temporary file in `dir` with a unique name.
    pub fn new_in(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let named = ::tempfile::NamedTempFile::new_in(dir)?;
        Ok(Self { inner: Some(named) })
    }

    /// Create a temporary file in the same directory as `target`.
    pub fn new_for(target: impl AsRef<Path>) -> Result<Self> {
        let dir = target.as_ref().parent().unwrap_or(Path::new("."));
        Self::new_in(dir)
    }

    /// Path of the temporary file while it exists.
    pub fn path(&self) -> &Path {
        self.inner
            .as_ref()
            .map(|n| n.path())
            .unwrap_or(Path::new(""))
    }

    /// Mutable handle to the underlying file (for seeking back into it).
    pub fn file_mut(&mut self) -> &mut fs::File {
        self.inner
            .as_mut()
            .expect("temp file already persisted")
            .as_file_mut()
    }

    /// Rename the temporary file over `target`, consuming the guard.
    pub fn persist(mut self, target: impl AsRef<Path>) -> Result<()> {
        if let Some(named) = self.inner.take() {
            named
                .persist(target.as_ref())
                .map_err(|e| crate::UtilError::Io(e.error))?;
        }
        Ok(())
    }
}

impl Write for TempFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::other("temp file already persisted"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::other("temp file already persisted"))?
            .flush()
    }
}

impl Seek for TempFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file_mut().seek(pos)
    }
}
