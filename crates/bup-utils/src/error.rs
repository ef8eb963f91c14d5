use std::cell::RefCell;

/// Base error type for bup-utils operations.
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    #[error("subprocess failed: {command}: {source}")]
    Subprocess {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} returned {code}")]
    ExitStatus { command: String, code: i32 },

    #[error("path error: {0}")]
    Path(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Sink for recoverable per-entry failures during a filesystem scan.
///
/// A scan records each failure here and keeps going; the caller inspects the
/// sink afterwards and exits non-zero if anything accumulated. Passed by
/// shared reference so iterators can report while the caller still holds the
/// sink.
#[derive(Debug, Default)]
pub struct SavedErrors {
    errors: RefCell<Vec<String>>,
}

impl SavedErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error and echo it to stderr.
    pub fn add(&self, err: impl Into<String>) {
        let err = err.into();
        eprintln!("\n{err}");
        self.errors.borrow_mut().push(err);
    }

    pub fn len(&self) -> usize {
        self.errors.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.borrow().is_empty()
    }

    /// Drain the accumulated errors.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.errors.borrow_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_errors_accumulate() {
        let sink = SavedErrors::new();
        assert!(sink.is_empty());
        sink.add("first");
        sink.add(format!("second {}", 2));
        assert_eq!(sink.len(), 2);
        let drained = sink.take();
        assert_eq!(drained, vec!["first".to_string(), "second 2".to_string()]);
        assert!(sink.is_empty());
    }
}
