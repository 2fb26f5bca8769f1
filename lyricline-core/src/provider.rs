use crate::error::CoreError;
use crate::lrc::{LyricSet, LyricsMetadata};
use crate::playback::Track;
use async_trait::async_trait;

/// Query parameters for fetching lyrics
#[derive(Debug, Clone)]
pub struct LyricsQuery {
    /// Player track identifier (used by id-keyed sources)
    pub track_id: String,
    /// Track name
    pub track_name: String,
    /// Artist name
    pub artist_name: String,
    /// Album name
    pub album_name: String,
    /// Track duration in seconds (for matching)
    pub duration_secs: u32,
}

impl LyricsQuery {
    /// Build a query from a captured track snapshot
    #[must_use]
    pub fn from_track(track: &Track) -> Self {
        Self {
            track_id: track.id.clone(),
            track_name: track.title.clone(),
            artist_name: track.artist.clone(),
            album_name: track.album.clone(),
            duration_secs: track.length_secs(),
        }
    }

    /// ID tags describing the queried track
    #[must_use]
    pub fn metadata(&self) -> LyricsMetadata {
        let tag = |value: &str| Some(value.to_string()).filter(|v| !v.is_empty());
        LyricsMetadata {
            title: tag(&self.track_name),
            artist: tag(&self.artist_name),
            album: tag(&self.album_name),
        }
    }
}

/// Successful answer from a lyrics source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    /// Lyrics were returned (possibly not line-synced)
    Found(LyricSet),
    /// The source definitively has no lyrics for this track
    NotFound,
}

/// Trait for lyrics sources
#[async_trait]
pub trait LyricsSource: Send + Sync {
    /// Get the source name
    fn name(&self) -> &'static str;

    /// Fetch lyrics for a query.
    ///
    /// Transport and payload failures are errors; a definitive absence is
    /// [`SourceOutcome::NotFound`].
    async fn fetch(&self, query: &LyricsQuery) -> Result<SourceOutcome, CoreError>;
}
