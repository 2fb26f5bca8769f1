//! Rolling text display and the sinks it is rendered into.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;

const CLEAR_SCREEN: &str = "\x1b[H\x1b[2J";

/// Receives a full rewrite of the display on every change.
#[async_trait]
pub trait DisplaySink: Send + Sync {
    /// Replace the sink's contents with `rows`, top to bottom.
    async fn render(&self, rows: &[String]) -> Result<()>;
}

/// Writes the display to a file path (a terminal device, a FIFO, or a regular file).
pub struct FileSink {
    path: PathBuf,
    clear_screen: bool,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>, clear_screen: bool) -> Self {
        Self {
            path: path.into(),
            clear_screen,
        }
    }

    /// The exact bytes written for `rows`.
    #[must_use]
    pub fn format(&self, rows: &[String]) -> String {
        let mut out = String::new();
        if self.clear_screen {
            out.push_str(CLEAR_SCREEN);
        }
        for row in rows {
            out.push_str(row);
            out.push('\n');
        }
        out
    }
}

#[async_trait]
impl DisplaySink for FileSink {
    async fn render(&self, rows: &[String]) -> Result<()> {
        tokio::fs::write(&self.path, self.format(rows)).await?;
        Ok(())
    }
}

/// Fixed-height window of the most recent lines, newest at the bottom.
#[derive(Debug, Clone)]
pub struct RollingDisplay {
    lines: VecDeque<String>,
    capacity: usize,
    dirty: bool,
}

impl RollingDisplay {
    /// Create a display of `capacity` rows (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
            dirty: false,
        }
    }

    /// Append a line, scrolling the oldest out when full.
    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
        self.dirty = true;
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.dirty = true;
    }

    /// Clear, then show a single line.
    pub fn single_line(&mut self, line: impl Into<String>) {
        self.clear();
        self.push(line);
    }

    /// Lines currently held, oldest first, without padding.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// All rows, blank-padded at the top to the display height.
    #[must_use]
    pub fn rows(&self) -> Vec<String> {
        let padding = self.capacity - self.lines.len();
        std::iter::repeat_n(String::new(), padding)
            .chain(self.lines.iter().cloned())
            .collect()
    }

    /// Whether anything changed since the last call, resetting the flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_pad_top() {
        let mut display = RollingDisplay::new(3);
        display.push("a");
        assert_eq!(display.rows(), vec!["", "", "a"]);
    }

    #[test]
    fn test_push_scrolls_oldest_out() {
        let mut display = RollingDisplay::new(2);
        display.push("a");
        display.push("b");
        display.push("c");
        assert_eq!(display.lines().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn test_zero_capacity_becomes_one() {
        let mut display = RollingDisplay::new(0);
        display.push("a");
        display.push("b");
        assert_eq!(display.rows(), vec!["b"]);
    }

    #[test]
    fn test_dirty_tracking() {
        let mut display = RollingDisplay::new(2);
        assert!(!display.take_dirty());
        display.single_line("x");
        assert!(display.take_dirty());
        assert!(!display.take_dirty());
    }

    #[test]
    fn test_file_sink_format() {
        let rows = vec![String::new(), "line".to_string()];
        assert_eq!(FileSink::new("/dev/null", false).format(&rows), "\nline\n");
        assert_eq!(
            FileSink::new("/dev/null", true).format(&rows),
            "\x1b[H\x1b[2J\nline\n"
        );
    }

    #[tokio::test]
    async fn test_file_sink_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let sink = FileSink::new(&path, false);

        sink.render(&["one".into(), "two".into()]).await.unwrap();
        sink.render(&["three".into()]).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "three\n");
    }
}
