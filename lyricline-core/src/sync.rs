//! Polling synchronizer that follows the player and scrolls lyrics through a display.

use crate::display::{DisplaySink, RollingDisplay};
use crate::fetcher::LyricsFetcher;
use crate::gate::{Admission, AdmissionGate};
use crate::offset::OffsetSource;
use crate::playback::{PlaybackState, PlayerBridge, TrackStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "lyricline::sync";

pub const NO_TRACK_MESSAGE: &str = "No track found";
pub const FETCHING_MESSAGE: &str = "Fetching lyrics...";
pub const UNAVAILABLE_MESSAGE: &str = "Lyrics unavailable";
pub const UNSYNCED_MESSAGE: &str = "Lyrics unsynchronized";

/// Everything a tick mutates. Only the tick holding the admission slot sees it.
#[derive(Debug)]
pub struct TickState {
    pub playback: PlaybackState,
    pub display: RollingDisplay,
    pub offset: OffsetSource,
}

impl TickState {
    #[must_use]
    pub fn new(lines: usize, offset: OffsetSource) -> Self {
        Self {
            playback: PlaybackState::default(),
            display: RollingDisplay::new(lines),
            offset,
        }
    }
}

/// Follows the player on a fixed interval, one tick at a time.
pub struct Synchronizer {
    bridge: Arc<dyn PlayerBridge>,
    fetcher: Arc<LyricsFetcher>,
    sink: Arc<dyn DisplaySink>,
    gate: AdmissionGate<TickState>,
    interval: Duration,
    ahead: usize,
}

impl Synchronizer {
    pub fn new(
        bridge: Arc<dyn PlayerBridge>,
        fetcher: Arc<LyricsFetcher>,
        sink: Arc<dyn DisplaySink>,
        state: TickState,
        interval: Duration,
        ahead: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            bridge,
            fetcher,
            sink,
            gate: AdmissionGate::new(state),
            interval,
            ahead,
        })
    }

    /// Poll until `cancel` fires. Ticks that would overlap a running one are dropped.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(target: LOG_TARGET, "Listening with a {:?} poll interval", self.interval);

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!(target: LOG_TARGET, "Synchronizer shutting down");
                    break;
                }
                _ = interval.tick() => {
                    // Detached; the gate guard travels with the task
                    let _ = self.try_tick();
                }
            }
        }
    }

    /// Start a tick in the background unless one is still running.
    pub fn try_tick(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        match self.gate.try_enter() {
            Admission::Acquired(mut state) => {
                let this = Arc::clone(self);
                Some(tokio::spawn(async move {
                    this.tick_once(&mut state).await;
                }))
            }
            Admission::AlreadyRunning => {
                debug!(target: LOG_TARGET, "Previous tick still running, skipping");
                None
            }
        }
    }

    /// Run a single tick to completion. Does nothing if a tick is already running.
    ///
    /// Used for one-shot rendering where no timer is involved.
    pub async fn tick(self: &Arc<Self>) {
        if let Some(handle) = self.try_tick() {
            if let Err(e) = handle.await {
                warn!(target: LOG_TARGET, "Tick task failed: {}", e);
            }
        }
    }

    async fn tick_once(&self, state: &mut TickState) {
        match self.bridge.track_id().await {
            Ok(track_id) if !track_id.is_empty() => {
                if state.playback.current_track_id.as_deref() != Some(track_id.as_str()) {
                    self.change_track(state, track_id).await;
                }
            }
            result => {
                if let Err(e) = result {
                    debug!(target: LOG_TARGET, "No track from player: {}", e);
                }
                if state.playback.current_track_id.is_some() {
                    info!(target: LOG_TARGET, "Track stopped");
                    state.playback = PlaybackState::default();
                }
                if !state.display.lines().eq([NO_TRACK_MESSAGE]) {
                    state.display.single_line(NO_TRACK_MESSAGE);
                }
                self.flush(state).await;
                return;
            }
        }

        if state.playback.status == TrackStatus::Synced {
            self.advance(state).await;
        }
        self.flush(state).await;
    }

    async fn change_track(&self, state: &mut TickState, track_id: String) {
        info!(target: LOG_TARGET, "Switching to track {}", track_id);
        let track = self.bridge.snapshot(&track_id).await;
        let title = track.display_title();

        state.playback.begin_track(track_id);
        state.display.clear();
        state.display.push(title.clone());
        state.display.push(FETCHING_MESSAGE);
        self.flush(state).await;

        let lyrics = self.fetcher.acquire(&track).await;
        let status = if lyrics.is_error() || lyrics.is_empty() {
            TrackStatus::Unavailable
        } else if lyrics.is_line_synced() {
            TrackStatus::Synced
        } else {
            TrackStatus::Unsynced
        };
        info!(target: LOG_TARGET, "Lyrics for {}: {:?}", title, status);

        state.display.clear();
        match status {
            TrackStatus::Unavailable => {
                state.display.push(title);
                state.display.push(UNAVAILABLE_MESSAGE);
            }
            TrackStatus::Unsynced => {
                state.display.push(title);
                state.display.push(UNSYNCED_MESSAGE);
            }
            _ => {}
        }

        state.playback.status = status;
        state.playback.lyrics = lyrics;
    }

    /// Emit every line whose (offset) start time has been reached.
    async fn advance(&self, state: &mut TickState) {
        let position = match self.bridge.position_ms().await {
            Ok(position) => position,
            Err(e) => {
                warn!(target: LOG_TARGET, "Failed to read playback position: {}", e);
                return;
            }
        };
        let offset = state.offset.resolve().await;
        let playback = &mut state.playback;
        playback.offset_ms = offset;

        if playback.is_backward_seek(position) {
            debug!(target: LOG_TARGET, "Seek backwards to {}ms, rewinding", position);
            state.display.clear();
            playback.rewind();
        }
        playback.previous_position_ms = Some(position);

        let lines = playback.lyrics.lines();
        if !playback.has_emitted_lookahead {
            for line in lines.iter().take(self.ahead) {
                state.display.push(line.text.clone());
            }
            playback.has_emitted_lookahead = true;
        }

        let position = i64::try_from(position).unwrap_or(i64::MAX);
        while let Some(line) = lines.get(playback.next_line_index) {
            let start = i64::try_from(line.start_time_ms)
                .unwrap_or(i64::MAX)
                .saturating_add(offset);
            if start > position {
                break;
            }
            let shown = lines
                .get(playback.next_line_index.saturating_add(self.ahead))
                .map(|l| l.text.clone())
                .unwrap_or_default();
            state.display.push(shown);
            playback.next_line_index += 1;
        }
    }

    async fn flush(&self, state: &mut TickState) {
        if !state.display.take_dirty() {
            return;
        }
        if let Err(e) = self.sink.render(&state.display.rows()).await {
            warn!(target: LOG_TARGET, "Failed to write display: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LyricsCache;
    use crate::config::{RefetchPolicy, RetryPolicy};
    use crate::display::testing::RecordingSink;
    use crate::error::{CoreError, Result};
    use crate::lrc::{LyricLine, LyricSet, LyricsMetadata};
    use crate::provider::{LyricsQuery, LyricsSource, SourceOutcome};
    use crate::time::FixedClock;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Semaphore;

    struct FakePlayer {
        track_id: Mutex<Option<String>>,
        position: AtomicU64,
        track_id_calls: AtomicUsize,
        // Each track_id call takes a permit when set
        hold: Option<Arc<Semaphore>>,
    }

    impl FakePlayer {
        fn new(track_id: Option<&str>) -> Self {
            Self {
                track_id: Mutex::new(track_id.map(str::to_string)),
                position: AtomicU64::new(0),
                track_id_calls: AtomicUsize::new(0),
                hold: None,
            }
        }

        fn seek(&self, position: u64) {
            self.position.store(position, Ordering::SeqCst);
        }

        fn switch(&self, track_id: Option<&str>) {
            *self.track_id.lock().unwrap() = track_id.map(str::to_string);
        }
    }

    #[async_trait]
    impl PlayerBridge for FakePlayer {
        async fn track_id(&self) -> Result<String> {
            self.track_id_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(ref hold) = self.hold {
                hold.acquire().await.unwrap().forget();
            }
            self.track_id
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| CoreError::Player {
                    reason: "no player".into(),
                })
        }
        async fn position_ms(&self) -> Result<u64> {
            Ok(self.position.load(Ordering::SeqCst))
        }
        async fn length_ms(&self) -> Result<u64> {
            Ok(180_000)
        }
        async fn artist(&self) -> String {
            "Artist".into()
        }
        async fn title(&self) -> String {
            "Song".into()
        }
        async fn album(&self) -> String {
            String::new()
        }
        async fn playing_status(&self) -> bool {
            true
        }
        async fn set_position(&self, position_ms: u64) -> Result<()> {
            self.seek(position_ms);
            Ok(())
        }
    }

    struct FixedSource(Option<LyricSet>);

    #[async_trait]
    impl LyricsSource for FixedSource {
        fn name(&self) -> &'static str {
            "fixed"
        }
        async fn fetch(&self, _query: &LyricsQuery) -> Result<SourceOutcome> {
            Ok(self
                .0
                .clone()
                .map_or(SourceOutcome::NotFound, SourceOutcome::Found))
        }
    }

    fn three_lines(synced: bool) -> LyricSet {
        LyricSet::new(
            vec![
                LyricLine::new(0, "zero"),
                LyricLine::new(1_000, "one"),
                LyricLine::new(2_000, "two"),
            ],
            synced,
            LyricsMetadata::default(),
        )
    }

    struct Harness {
        sync: Arc<Synchronizer>,
        player: Arc<FakePlayer>,
        sink: Arc<RecordingSink>,
        _dir: tempfile::TempDir,
    }

    fn harness(player: FakePlayer, lyrics: Option<LyricSet>, ahead: usize) -> Harness {
        harness_with_offset(player, lyrics, ahead, OffsetSource::Static(0))
    }

    fn harness_with_offset(
        player: FakePlayer,
        lyrics: Option<LyricSet>,
        ahead: usize,
        offset: OffsetSource,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let cache = LyricsCache::new(
            dir.path(),
            RefetchPolicy::default(),
            Arc::new(FixedClock::at_secs(1_700_000_000)),
        );
        let fetcher = LyricsFetcher::new(
            Box::new(FixedSource(lyrics)),
            Box::new(FixedSource(None)),
            cache,
            RetryPolicy::default(),
        );
        let player = Arc::new(player);
        let sink = Arc::new(RecordingSink::default());
        let sync = Synchronizer::new(
            player.clone(),
            Arc::new(fetcher),
            sink.clone(),
            TickState::new(3, offset),
            Duration::from_millis(100),
            ahead,
        );
        Harness {
            sync,
            player,
            sink,
            _dir: dir,
        }
    }

    fn rows(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn test_lookahead_window() {
        let h = harness(FakePlayer::new(Some("t1")), Some(three_lines(true)), 1);

        h.player.seek(500);
        h.sync.tick().await;
        assert_eq!(h.sink.last().unwrap(), rows(&["", "zero", "one"]));

        h.player.seek(1_000);
        h.sync.tick().await;
        assert_eq!(h.sink.last().unwrap(), rows(&["zero", "one", "two"]));

        h.player.seek(2_500);
        h.sync.tick().await;
        assert_eq!(h.sink.last().unwrap(), rows(&["one", "two", ""]));
    }

    #[tokio::test]
    async fn test_huge_lookahead_pads_with_blanks() {
        let h = harness(FakePlayer::new(Some("t1")), Some(three_lines(true)), usize::MAX);

        h.player.seek(1_000);
        h.sync.tick().await;
        assert_eq!(h.sink.last().unwrap(), rows(&["two", "", ""]));
    }

    #[tokio::test]
    async fn test_negative_offset_reaches_lines_early() {
        let h = harness_with_offset(
            FakePlayer::new(Some("t1")),
            Some(three_lines(true)),
            0,
            OffsetSource::Static(-500),
        );

        h.player.seek(500);
        h.sync.tick().await;
        assert_eq!(h.sink.last().unwrap(), rows(&["", "zero", "one"]));
    }

    #[tokio::test]
    async fn test_offset_file_reread_between_ticks() {
        let offset_dir = tempfile::tempdir().unwrap();
        let offset_path = offset_dir.path().join("offset");
        std::fs::write(&offset_path, "0").unwrap();
        let h = harness_with_offset(
            FakePlayer::new(Some("t1")),
            Some(three_lines(true)),
            0,
            OffsetSource::File {
                path: offset_path.clone(),
                last: 0,
            },
        );

        h.player.seek(500);
        h.sync.tick().await;
        assert_eq!(h.sink.last().unwrap(), rows(&["", "", "zero"]));

        std::fs::write(&offset_path, "-1000\n").unwrap();
        h.sync.tick().await;
        assert_eq!(h.sink.last().unwrap(), rows(&["", "zero", "one"]));

        std::fs::write(&offset_path, "not a number").unwrap();
        h.player.seek(900);
        h.sync.tick().await;
        assert_eq!(h.sink.last().unwrap(), rows(&["", "zero", "one"]));
    }

    #[tokio::test]
    async fn test_unchanged_display_is_not_rewritten() {
        let h = harness(FakePlayer::new(Some("t1")), Some(three_lines(true)), 0);

        h.player.seek(1_500);
        h.sync.tick().await;
        let frames = h.sink.frames().len();

        h.player.seek(1_600);
        h.sync.tick().await;
        assert_eq!(h.sink.frames().len(), frames);
    }

    #[tokio::test]
    async fn test_backward_seek_rewinds() {
        let h = harness(FakePlayer::new(Some("t1")), Some(three_lines(true)), 0);

        h.player.seek(2_500);
        h.sync.tick().await;
        assert_eq!(h.sink.last().unwrap(), rows(&["zero", "one", "two"]));

        h.player.seek(100);
        h.sync.tick().await;
        assert_eq!(h.sink.last().unwrap(), rows(&["", "", "zero"]));
    }

    #[tokio::test]
    async fn test_track_change_shows_fetching_then_status() {
        let h = harness(FakePlayer::new(Some("t1")), Some(three_lines(false)), 0);

        h.sync.tick().await;

        let frames = h.sink.frames();
        assert_eq!(frames[0], rows(&["", "Artist - Song", FETCHING_MESSAGE]));
        assert_eq!(
            frames.last().unwrap(),
            &rows(&["", "Artist - Song", UNSYNCED_MESSAGE])
        );
    }

    #[tokio::test]
    async fn test_unavailable_lyrics() {
        let h = harness(FakePlayer::new(Some("t1")), None, 0);

        h.sync.tick().await;

        assert_eq!(
            h.sink.last().unwrap(),
            rows(&["", "Artist - Song", UNAVAILABLE_MESSAGE])
        );
    }

    #[tokio::test]
    async fn test_no_track_then_track_stops() {
        let h = harness(FakePlayer::new(None), Some(three_lines(true)), 0);

        h.sync.tick().await;
        assert_eq!(h.sink.last().unwrap(), rows(&["", "", NO_TRACK_MESSAGE]));
        let frames = h.sink.frames().len();

        h.sync.tick().await;
        assert_eq!(h.sink.frames().len(), frames);

        h.player.switch(Some("t1"));
        h.player.seek(1_200);
        h.sync.tick().await;
        assert_eq!(h.sink.last().unwrap(), rows(&["", "zero", "one"]));

        h.player.switch(None);
        h.sync.tick().await;
        assert_eq!(h.sink.last().unwrap(), rows(&["", "", NO_TRACK_MESSAGE]));
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_dropped() {
        let hold = Arc::new(Semaphore::new(0));
        let player = FakePlayer {
            hold: Some(hold.clone()),
            ..FakePlayer::new(Some("t1"))
        };
        let h = harness(player, Some(three_lines(true)), 0);

        let running = h.sync.try_tick().unwrap();
        tokio::task::yield_now().await;

        assert!(h.sync.try_tick().is_none());
        assert!(h.sync.try_tick().is_none());

        hold.add_permits(1);
        running.await.unwrap();
        assert_eq!(h.player.track_id_calls.load(Ordering::SeqCst), 1);

        hold.add_permits(1);
        assert!(h.sync.try_tick().is_some());
    }
}
