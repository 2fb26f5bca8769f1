//! Lyrics fetcher that orchestrates the primary and secondary lyrics sources.

use crate::cache::{CacheLookup, LyricsCache};
use crate::config::RetryPolicy;
use crate::error::CoreError;
use crate::lrc::{LyricSet, NegativeKind};
use crate::playback::Track;
use crate::provider::{LyricsQuery, LyricsSource, SourceOutcome};
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "lyricline::fetcher";

/// How a source's retry budget ended
#[derive(Debug)]
enum Attempt {
    Found(LyricSet),
    NotFound,
    Failed(CoreError),
}

impl Attempt {
    const fn failure(&self) -> Option<&CoreError> {
        match self {
            Self::Failed(e) => Some(e),
            Self::Found(_) | Self::NotFound => None,
        }
    }
}

/// Acquires lyrics for a track: cache first, then primary, then secondary.
///
/// Never surfaces transport errors to the caller; every failure path degrades
/// to a cached negative marker and an error [`LyricSet`].
pub struct LyricsFetcher {
    primary: Box<dyn LyricsSource>,
    secondary: Box<dyn LyricsSource>,
    cache: LyricsCache,
    retry: RetryPolicy,
}

impl LyricsFetcher {
    pub fn new(
        primary: Box<dyn LyricsSource>,
        secondary: Box<dyn LyricsSource>,
        cache: LyricsCache,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            primary,
            secondary,
            cache,
            retry,
        }
    }

    #[must_use]
    pub const fn cache(&self) -> &LyricsCache {
        &self.cache
    }

    /// Get lyrics for `track`, consulting the cache before either source.
    pub async fn acquire(&self, track: &Track) -> LyricSet {
        match self.cache.load(&track.id).await {
            Ok(CacheLookup::Fresh(lyrics)) => {
                info!(target: LOG_TARGET, "Using cached lyrics for {}", track.display_title());
                return lyrics;
            }
            Ok(CacheLookup::Stale(kind)) => {
                info!(target: LOG_TARGET, "Cached {:?} marker for {} expired, refetching", kind, track.id);
            }
            Ok(CacheLookup::Miss) => {}
            Err(e) => {
                warn!(target: LOG_TARGET, "Ignoring unreadable cache entry for {}: {}", track.id, e);
            }
        }

        self.fetch_and_store(track).await
    }

    /// Query the sources, bypassing the cache for reads, and persist the result.
    pub async fn fetch_and_store(&self, track: &Track) -> LyricSet {
        let query = LyricsQuery::from_track(track);
        info!(
            target: LOG_TARGET,
            "Fetching lyrics for: {} (sources: {}, {})",
            track.display_title(),
            self.primary.name(),
            self.secondary.name()
        );

        let primary = self.attempt_source(self.primary.as_ref(), &query).await;
        if let Attempt::Found(ref lyrics) = primary {
            if lyrics.is_usable_synced() {
                self.store(&track.id, lyrics).await;
                return lyrics.clone();
            }
            info!(
                target: LOG_TARGET,
                "{} returned unsynced lyrics, trying {}",
                self.primary.name(),
                self.secondary.name()
            );
        }

        let secondary = self.attempt_source(self.secondary.as_ref(), &query).await;
        if let Attempt::Found(ref lyrics) = secondary {
            if lyrics.is_usable_synced() {
                self.store(&track.id, lyrics).await;
                return lyrics.clone();
            }
        }

        // Unsynced text still beats nothing
        for attempt in [&primary, &secondary] {
            if let Attempt::Found(lyrics) = attempt {
                if !lyrics.is_empty() {
                    self.store(&track.id, lyrics).await;
                    return lyrics.clone();
                }
            }
        }

        let kind = if matches!(primary, Attempt::NotFound) && matches!(secondary, Attempt::NotFound)
        {
            NegativeKind::NotFound
        } else {
            NegativeKind::Error
        };
        info!(target: LOG_TARGET, "No lyrics found for {} ({:?})", track.display_title(), kind);
        let failures: Vec<String> = [
            (self.primary.name(), &primary),
            (self.secondary.name(), &secondary),
        ]
        .into_iter()
        .filter_map(|(name, attempt)| attempt.failure().map(|e| format!("{name}: {e}")))
        .collect();
        if !failures.is_empty() {
            warn!(target: LOG_TARGET, "Caching error marker after: {}", failures.join("; "));
        }

        if let Err(e) = self.cache.save_error_marker(&track.id, kind).await {
            warn!(target: LOG_TARGET, "Failed to cache negative marker: {}", e);
        }
        LyricSet::error()
    }

    /// Run one source under the retry policy.
    ///
    /// `NotFound` and non-retryable errors end the budget early.
    async fn attempt_source(&self, source: &dyn LyricsSource, query: &LyricsQuery) -> Attempt {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!(target: LOG_TARGET, "{} attempt {}/{}", source.name(), attempt, attempts);
            match source.fetch(query).await {
                Ok(SourceOutcome::Found(lyrics)) => {
                    info!(
                        target: LOG_TARGET,
                        "Found lyrics from {} ({} lines, synced: {})",
                        source.name(),
                        lyrics.lines().len(),
                        lyrics.is_line_synced()
                    );
                    return Attempt::Found(lyrics);
                }
                Ok(SourceOutcome::NotFound) => {
                    info!(target: LOG_TARGET, "{} has no lyrics for this track", source.name());
                    return Attempt::NotFound;
                }
                Err(e) if !e.is_retryable() => {
                    warn!(target: LOG_TARGET, "{} failed: {}", source.name(), e);
                    return Attempt::Failed(e);
                }
                Err(e) if attempt >= attempts => {
                    warn!(
                        target: LOG_TARGET,
                        "{} failed after {} attempts: {}",
                        source.name(),
                        attempts,
                        e
                    );
                    return Attempt::Failed(e);
                }
                Err(e) => {
                    warn!(
                        target: LOG_TARGET,
                        "{} attempt {} failed: {}, retrying in {:?}",
                        source.name(),
                        attempt,
                        e,
                        self.retry.interval
                    );
                    tokio::time::sleep(self.retry.interval).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn store(&self, track_id: &str, lyrics: &LyricSet) {
        if let Err(e) = self.cache.save(track_id, lyrics).await {
            warn!(target: LOG_TARGET, "Failed to cache lyrics: {}", e);
        }
    }
}
