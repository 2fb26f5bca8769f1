//! On-disk lyrics cache: one human-readable LRC file per track.

use crate::config::RefetchPolicy;
use crate::error::{CoreError, Result};
use crate::lrc::{CacheEntry, LyricSet, NegativeKind};
use crate::paths::lyrics_cache_path;
use crate::time::Clock;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const LOG_TARGET: &str = "lyricline::cache";

/// Result of looking a track up in the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// No cache file exists
    Miss,
    /// A lyric set, or a negative marker that is still authoritative
    /// (returned as an error set)
    Fresh(LyricSet),
    /// A negative marker old enough to warrant a refetch
    Stale(NegativeKind),
}

/// File-backed lyrics cache
pub struct LyricsCache {
    dir: PathBuf,
    policy: RefetchPolicy,
    clock: Arc<dyn Clock>,
}

impl LyricsCache {
    /// Create a cache rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>, policy: RefetchPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            dir: dir.into(),
            policy,
            clock,
        }
    }

    /// Cache file for a track
    #[must_use]
    pub fn path_for(&self, track_id: &str) -> PathBuf {
        lyrics_cache_path(&self.dir, track_id)
    }

    /// Look up a track.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CacheDecode`] if the file exists but is corrupt, or an
    /// IO error if it cannot be read.
    pub async fn load(&self, track_id: &str) -> Result<CacheLookup> {
        let path = self.path_for(track_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(target: LOG_TARGET, "Cache miss for {}", track_id);
                return Ok(CacheLookup::Miss);
            }
            Err(e) => return Err(e.into()),
        };

        let entry = CacheEntry::decode(&content)
            .map_err(|reason| CoreError::CacheDecode { path, reason })?;

        Ok(match entry {
            CacheEntry::Lyrics(set) => {
                debug!(target: LOG_TARGET, "Cache hit for {} ({} lines)", track_id, set.lines().len());
                CacheLookup::Fresh(set)
            }
            CacheEntry::Negative { kind, fetched_at } => {
                if self.is_stale(kind, fetched_at) {
                    debug!(target: LOG_TARGET, "Negative marker for {} is stale ({:?})", track_id, kind);
                    CacheLookup::Stale(kind)
                } else {
                    debug!(target: LOG_TARGET, "Negative marker for {} is fresh ({:?})", track_id, kind);
                    CacheLookup::Fresh(LyricSet::error())
                }
            }
        })
    }

    /// Whether a marker fetched at `fetched_at` (Unix seconds) has reached its
    /// kind's refetch threshold.
    #[must_use]
    pub fn is_stale(&self, kind: NegativeKind, fetched_at: i64) -> bool {
        let threshold = match kind {
            NegativeKind::NotFound => self.policy.not_found,
            NegativeKind::Error => self.policy.error,
        };
        let age_secs = self.clock.now().timestamp().saturating_sub(fetched_at);
        // A marker from the future has age zero
        let age = Duration::from_secs(u64::try_from(age_secs).unwrap_or(0));
        age >= threshold
    }

    /// Persist a lyric set.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save(&self, track_id: &str, lyrics: &LyricSet) -> Result<()> {
        if lyrics.is_error() {
            return self.save_error_marker(track_id, NegativeKind::Error).await;
        }
        info!(
            target: LOG_TARGET,
            "Caching {} lines for {} (synced: {})",
            lyrics.lines().len(),
            track_id,
            lyrics.is_line_synced()
        );
        self.write(track_id, &CacheEntry::Lyrics(lyrics.clone()).encode())
            .await
    }

    /// Persist a negative marker stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save_error_marker(&self, track_id: &str, kind: NegativeKind) -> Result<()> {
        info!(target: LOG_TARGET, "Caching {:?} marker for {}", kind, track_id);
        let entry = CacheEntry::Negative {
            kind,
            fetched_at: self.clock.now().timestamp(),
        };
        self.write(track_id, &entry.encode()).await
    }

    /// Delete the cache file for one track. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub async fn remove(&self, track_id: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(track_id)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Delete every lyrics cache file, leaving other files in the directory alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed or a file cannot be removed.
    pub async fn clear_all(&self) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path
                .extension()
                .is_some_and(|ext| ext == crate::paths::LYRICS_FILE_EXTENSION)
            {
                tokio::fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        info!(target: LOG_TARGET, "Removed {} cached lyrics files", removed);
        Ok(removed)
    }

    async fn write(&self, track_id: &str, content: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.path_for(track_id), content).await?;
        Ok(())
    }
}
