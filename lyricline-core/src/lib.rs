pub mod cache;
pub mod config;
pub mod display;
pub mod error;
pub mod fetcher;
pub mod gate;
pub mod lrc;
pub mod offset;
pub mod paths;
pub mod playback;
pub mod provider;
pub mod sync;
pub mod time;

pub use cache::{CacheLookup, LyricsCache};
pub use config::{
    build_config_template, FetchConfig, ListenConfig, LyriclineConfig, ProvidersConfig,
    RefetchPolicy, RetryPolicy,
};
pub use display::{DisplaySink, FileSink, RollingDisplay};
pub use error::{CoreError, Result};
pub use fetcher::LyricsFetcher;
pub use gate::{Admission, AdmissionGate, InstanceLock, LockOutcome};
pub use lrc::{CacheEntry, LyricLine, LyricSet, LyricsMetadata, NegativeKind};
pub use offset::OffsetSource;
pub use paths::{
    cache_dir, config_dir, config_path, ensure_cache_dir, lock_path, token_cache_path,
    APP_DIR_NAME, CONFIG_FILE_NAME,
};
pub use playback::{PlaybackState, PlayerBridge, Track, TrackStatus};
pub use provider::{LyricsQuery, LyricsSource, SourceOutcome};
pub use sync::{Synchronizer, TickState};
pub use time::{Clock, DurationExt, FixedClock, SystemClock};
