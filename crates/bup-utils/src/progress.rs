use std::io::{self, Write};

/// Simple progress display on stderr.
///
/// Rewrites a single line like `Merging: 42.00% (4200/10000)` and clears it
/// when done. Updates are suppressed until the percentage (or, without a
/// total, the reported count bucket) changes, so tight loops stay cheap.
pub struct Progress {
    title: String,
    total: Option<u64>,
    last_shown: Option<u64>,
}

impl Progress {
    pub fn new(title: &str, total: Option<u64>) -> Self {
        Self {
            title: title.to_string(),
            total,
            last_shown: None,
        }
    }

    /// Update the displayed count.
    pub fn update(&mut self, current: u64) {
        let bucket = match self.total {
            Some(total) if total > 0 => current * 100 / total,
            _ => current / 10000,
        };
        if self.last_shown == Some(bucket) {
            return;
        }
        self.last_shown = Some(bucket);
        let mut err = io::stderr();
        let _ = match self.total {
            Some(total) if total > 0 => write!(
                err,
                "\r{}: {:.2}% ({current}/{total})",
                self.title,
                current as f64 * 100.0 / total as f64
            ),
            _ => write!(err, "\r{}: {current}", self.title),
        };
        let _ = err.flush();
    }

    /// Finish the line.
    pub fn done(&mut self) {
        if self.last_shown.is_some() {
            let mut err = io::stderr();
            let _ = writeln!(err, "\r{}: done.{:30}", self.title, "");
            let _ = err.flush();
        }
    }
}

/// One-shot message to stderr, for the occasional status line.
pub fn log(msg: &str) {
    let mut err = io::stderr();
    let _ = err.write_all(msg.as_bytes());
    let _ = err.flush();
}
