use crate::error::Result;
use crate::lrc::LyricSet;
use crate::time::DurationExt;
use async_trait::async_trait;
use std::time::Duration;

/// Snapshot of the track the player reported at track-change time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Player track identifier
    pub id: String,
    /// Artist name(s)
    pub artist: String,
    /// Track name
    pub title: String,
    /// Album name
    pub album: String,
    /// Track length in milliseconds
    pub length_ms: u64,
}

impl Track {
    /// Create a new track snapshot
    pub fn new(
        id: impl Into<String>,
        artist: impl Into<String>,
        title: impl Into<String>,
        album: impl Into<String>,
        length_ms: u64,
    ) -> Self {
        Self {
            id: id.into(),
            artist: artist.into(),
            title: title.into(),
            album: album.into(),
            length_ms,
        }
    }

    /// Get length in whole seconds (for lyrics query).
    #[must_use]
    pub fn length_secs(&self) -> u32 {
        Duration::from_millis(self.length_ms).as_secs_u32()
    }

    /// `"Artist - Title"`, or a placeholder when the player gave neither
    #[must_use]
    pub fn display_title(&self) -> String {
        match (self.artist.is_empty(), self.title.is_empty()) {
            (true, true) => "Unknown Track".to_string(),
            (true, false) => self.title.clone(),
            (false, true) => self.artist.clone(),
            (false, false) => format!("{} - {}", self.artist, self.title),
        }
    }
}

/// The desktop media player the synchronizer follows.
#[async_trait]
pub trait PlayerBridge: Send + Sync {
    /// Identifier of the current track.
    async fn track_id(&self) -> Result<String>;

    /// Current playback position in milliseconds.
    async fn position_ms(&self) -> Result<u64>;

    /// Length of the current track in milliseconds.
    async fn length_ms(&self) -> Result<u64>;

    /// Artist of the current track, empty if unknown.
    async fn artist(&self) -> String;

    /// Title of the current track, empty if unknown.
    async fn title(&self) -> String;

    /// Album of the current track, empty if unknown.
    async fn album(&self) -> String;

    /// Whether the player is currently playing.
    async fn playing_status(&self) -> bool;

    /// Seek to `position_ms`.
    async fn set_position(&self, position_ms: u64) -> Result<()>;

    /// Capture a [`Track`] snapshot for `id`.
    async fn snapshot(&self, id: &str) -> Track {
        Track::new(
            id,
            self.artist().await,
            self.title().await,
            self.album().await,
            self.length_ms().await.unwrap_or(0),
        )
    }
}

/// Lyrics state of the current track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackStatus {
    /// No track reported by the player
    #[default]
    NoTrack,
    /// Lyrics are being acquired
    Pending,
    /// Line-synced lyrics are being followed
    Synced,
    /// Lyrics exist but carry no usable timing
    Unsynced,
    /// No lyrics could be obtained
    Unavailable,
}

/// Mutable synchronizer state, owned by whichever tick holds the admission slot.
#[derive(Debug, Clone, Default)]
pub struct PlaybackState {
    pub current_track_id: Option<String>,
    pub status: TrackStatus,
    pub lyrics: LyricSet,
    /// Index of the next line whose start has not been reached
    pub next_line_index: usize,
    /// Last resolved lyric timing offset
    pub offset_ms: i64,
    pub has_emitted_lookahead: bool,
    pub previous_position_ms: Option<u64>,
}

impl PlaybackState {
    /// Forget everything about the current track's progress.
    pub fn rewind(&mut self) {
        self.next_line_index = 0;
        self.has_emitted_lookahead = false;
        self.previous_position_ms = None;
    }

    /// Enter a new track, dropping the previous track's lyrics.
    pub fn begin_track(&mut self, track_id: String) {
        self.current_track_id = Some(track_id);
        self.status = TrackStatus::Pending;
        self.lyrics = LyricSet::default();
        self.rewind();
    }

    /// Whether a position earlier than the previous poll was observed.
    #[must_use]
    pub fn is_backward_seek(&self, position_ms: u64) -> bool {
        self.previous_position_ms
            .is_some_and(|previous| position_ms < previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_new() {
        let track = Track::new("id1", "Test Artist", "Test Song", "Test Album", 183_500);

        assert_eq!(track.id, "id1");
        assert_eq!(track.artist, "Test Artist");
        assert_eq!(track.title, "Test Song");
        assert_eq!(track.album, "Test Album");
        assert_eq!(track.length_secs(), 183);
    }

    #[test]
    fn test_display_title() {
        assert_eq!(
            Track::new("id", "Artist", "Song", "", 0).display_title(),
            "Artist - Song"
        );
        assert_eq!(Track::new("id", "", "Song", "", 0).display_title(), "Song");
        assert_eq!(Track::new("id", "", "", "", 0).display_title(), "Unknown Track");
    }

    #[test]
    fn test_playback_state_default() {
        let state = PlaybackState::default();
        assert!(state.current_track_id.is_none());
        assert_eq!(state.status, TrackStatus::NoTrack);
        assert_eq!(state.next_line_index, 0);
        assert!(!state.has_emitted_lookahead);
    }

    #[test]
    fn test_begin_track_resets_progress() {
        let mut state = PlaybackState {
            next_line_index: 4,
            has_emitted_lookahead: true,
            previous_position_ms: Some(9_000),
            status: TrackStatus::Synced,
            ..Default::default()
        };

        state.begin_track("next".into());

        assert_eq!(state.current_track_id.as_deref(), Some("next"));
        assert_eq!(state.status, TrackStatus::Pending);
        assert_eq!(state.next_line_index, 0);
        assert!(!state.has_emitted_lookahead);
        assert!(state.previous_position_ms.is_none());
    }

    #[test]
    fn test_backward_seek_detection() {
        let mut state = PlaybackState::default();
        assert!(!state.is_backward_seek(0));

        state.previous_position_ms = Some(5_000);
        assert!(state.is_backward_seek(4_999));
        assert!(!state.is_backward_seek(5_000));
        assert!(!state.is_backward_seek(6_000));
    }
}
