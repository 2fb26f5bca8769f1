//! Lyric timing offset, either fixed or re-read from a file on every tick.

use crate::config::ListenConfig;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{info, warn};

const LOG_TARGET: &str = "lyricline::offset";

/// Where the lyric timing offset (milliseconds) comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OffsetSource {
    Static(i64),
    /// Re-read on every resolve; `last` is kept when the file is unreadable
    File { path: PathBuf, last: i64 },
}

impl OffsetSource {
    /// The offset file wins over the static value when both are configured.
    #[must_use]
    pub fn from_config(listen: &ListenConfig) -> Self {
        match listen.offset_file {
            Some(ref path) => Self::File {
                path: path.clone(),
                last: listen.offset_ms,
            },
            None => Self::Static(listen.offset_ms),
        }
    }

    /// Current offset in milliseconds.
    ///
    /// A missing offset file is created containing `0`. Any other read or parse
    /// failure is logged and the last known value is returned.
    pub async fn resolve(&mut self) -> i64 {
        let (path, last) = match self {
            Self::Static(offset) => return *offset,
            Self::File { path, last } => (path, last),
        };

        match tokio::fs::read_to_string(&*path).await {
            Ok(content) => match content.trim().parse::<i64>() {
                Ok(offset) => *last = offset,
                Err(e) => {
                    warn!(target: LOG_TARGET, "Invalid offset in {}: {}", path.display(), e);
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                match tokio::fs::write(&*path, "0").await {
                    Ok(()) => {
                        info!(target: LOG_TARGET, "Created offset file {} with 0", path.display());
                        *last = 0;
                    }
                    Err(e) => {
                        warn!(target: LOG_TARGET, "Failed to create offset file {}: {}", path.display(), e);
                    }
                }
            }
            Err(e) => {
                warn!(target: LOG_TARGET, "Failed to read offset file {}: {}", path.display(), e);
            }
        }
        *last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_offset() {
        let mut source = OffsetSource::Static(-250);
        assert_eq!(source.resolve().await, -250);
    }

    #[test]
    fn test_file_wins_over_static() {
        let listen = ListenConfig {
            offset_ms: 100,
            offset_file: Some(PathBuf::from("/tmp/offset")),
            ..Default::default()
        };
        assert!(matches!(
            OffsetSource::from_config(&listen),
            OffsetSource::File { last: 100, .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_file_created_with_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offset");
        let mut source = OffsetSource::File {
            path: path.clone(),
            last: 500,
        };

        assert_eq!(source.resolve().await, 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0");
    }

    #[tokio::test]
    async fn test_file_reread_each_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offset");
        std::fs::write(&path, "120\n").unwrap();
        let mut source = OffsetSource::File {
            path: path.clone(),
            last: 0,
        };

        assert_eq!(source.resolve().await, 120);
        std::fs::write(&path, "-40").unwrap();
        assert_eq!(source.resolve().await, -40);
    }

    #[tokio::test]
    async fn test_bad_content_keeps_last_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offset");
        std::fs::write(&path, "300").unwrap();
        let mut source = OffsetSource::File { path: path.clone(), last: 0 };
        assert_eq!(source.resolve().await, 300);

        std::fs::write(&path, "fast").unwrap();
        assert_eq!(source.resolve().await, 300);
    }
}
