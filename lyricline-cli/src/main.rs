mod playerctl;

use crate::playerctl::PlayerctlBridge;
use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use lyricline_core::{
    ensure_cache_dir, lock_path, Clock, CoreError, FileSink, InstanceLock, ListenConfig,
    LockOutcome, LyricsCache, LyricsFetcher, LyriclineConfig, OffsetSource, PlayerBridge,
    Synchronizer, SystemClock, TickState, Track,
};
use lyricline_lyrics_lrclib::{LrclibProviderConfig, LrclibSource};
use lyricline_lyrics_spotify::config::SP_DC_ENV;
use lyricline_lyrics_spotify::{SpotifyLyricsSource, SpotifyProviderConfig};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "lyricline",
    version,
    about = "Time-synchronized lyrics for the track playing in Spotify"
)]
struct Cli {
    /// Override config file path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Continuously display lyrics as the track plays.
    Listen {
        #[command(flatten)]
        display: DisplayArgs,
        /// Milliseconds between player polls.
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Render the display for the current position once.
    Print {
        #[command(flatten)]
        display: DisplayArgs,
    },
    /// Fetch lyrics for the current track and print them as LRC.
    Fetch {
        /// Print the lyric text without timestamps.
        #[arg(short, long)]
        pure: bool,
    },
    /// Clear all cached lyrics, or only those of one track.
    Clear { track_id: Option<String> },
    /// Print the current track id.
    Trackid,
    /// Print the playback position in milliseconds.
    Position,
    /// Seek to a position in milliseconds.
    SetPosition { position_ms: u64 },
    /// Print the track length in milliseconds.
    Length,
    /// Print "artist - title" of the current track.
    Info,
    /// Exit successfully only while the player is playing.
    Status,
}

/// Display overrides shared by `listen` and `print`.
#[derive(Debug, Args)]
struct DisplayArgs {
    /// Number of lines to display.
    #[arg(short, long)]
    lines: Option<usize>,
    /// File the display is written to.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Lyric timing offset in milliseconds (ignored when an offset file is used).
    #[arg(short = 'O', long, allow_negative_numbers = true)]
    offset: Option<i64>,
    /// File the offset is re-read from on every tick.
    #[arg(short = 'f', long)]
    offset_file: Option<PathBuf>,
    /// Number of upcoming lines shown beyond the current one.
    #[arg(short, long)]
    ahead: Option<usize>,
    /// Clear the terminal before every render.
    #[arg(short, long)]
    cls: bool,
}

impl DisplayArgs {
    fn apply(self, listen: &mut ListenConfig) {
        if let Some(lines) = self.lines {
            if lines == 0 {
                warn!("Number of lines must be positive, using 1");
            }
            listen.lines = lines.max(1);
        }
        if let Some(output) = self.output {
            listen.output = output;
        }
        if let Some(offset) = self.offset {
            listen.offset_ms = offset;
        }
        if self.offset_file.is_some() {
            listen.offset_file = self.offset_file;
        }
        if let Some(ahead) = self.ahead {
            listen.ahead = ahead;
        }
        listen.clear_screen |= self.cls;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    let bridge = Arc::new(PlayerctlBridge::default());

    match cli.command {
        Command::Listen { display, interval } => {
            display.apply(&mut config.listen);
            if let Some(interval) = interval {
                config.listen.interval_ms = interval;
            }
            listen(&config, bridge).await?;
        }
        Command::Print { display } => {
            display.apply(&mut config.listen);
            let cache_dir = ensure_cache_dir().context("create cache directory")?;
            let synchronizer = build_synchronizer(&config, &cache_dir, bridge)?;
            synchronizer.tick().await;
        }
        Command::Fetch { pure } => {
            let cache_dir = ensure_cache_dir().context("create cache directory")?;
            let fetcher = build_fetcher(&config, &cache_dir)?;
            let track = current_track(bridge.as_ref()).await?;
            let lyrics = fetcher.acquire(&track).await;
            if lyrics.is_error() {
                error!("No lyrics available for {}", track.display_title());
                return Ok(ExitCode::FAILURE);
            }
            if pure {
                println!("{}", lyrics.text());
            } else {
                print!("{}", lyrics.to_lrc());
            }
        }
        Command::Clear { track_id } => {
            let cache_dir = ensure_cache_dir().context("create cache directory")?;
            let clock: Arc<dyn Clock> = Arc::new(SystemClock);
            let cache = LyricsCache::new(cache_dir, config.fetch.refetch_policy(), clock);
            match track_id {
                Some(track_id) => {
                    cache
                        .remove(&track_id)
                        .await
                        .with_context(|| format!("remove cached lyrics for {track_id}"))?;
                    info!("Cache for track ID {} cleared", track_id);
                }
                None => {
                    let removed = cache.clear_all().await.context("clear lyrics cache")?;
                    info!("Cleared {} cached lyrics file(s)", removed);
                }
            }
        }
        Command::Trackid => println!("{}", bridge.track_id().await?),
        Command::Position => println!("{}", bridge.position_ms().await?),
        Command::SetPosition { position_ms } => {
            bridge.set_position(position_ms).await?;
            info!("Track position set to: {} ms", position_ms);
        }
        Command::Length => println!("{}", bridge.length_ms().await?),
        Command::Info => {
            let track = Track::new("", bridge.artist().await, bridge.title().await, "", 0);
            println!("{}", track.display_title());
        }
        Command::Status => {
            return Ok(if bridge.playing_status().await {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            });
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Log to stderr; stdout belongs to the display and command output.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load the config file, falling back to defaults when a template was just created.
fn load_config(path: Option<&Path>) -> anyhow::Result<LyriclineConfig> {
    let templates = [
        lyricline_lyrics_spotify::CONFIG_TEMPLATE,
        lyricline_lyrics_lrclib::CONFIG_TEMPLATE,
    ];
    let path = path.map_or_else(LyriclineConfig::config_path, Path::to_path_buf);

    match LyriclineConfig::load_or_create_at(&path, &templates) {
        Ok(config) => Ok(config),
        Err(CoreError::ConfigNotFound { path }) => {
            info!("Created config template at {}, using defaults", path.display());
            Ok(LyriclineConfig::default())
        }
        Err(e) => Err(e).with_context(|| format!("load config from {}", path.display())),
    }
}

fn build_fetcher(config: &LyriclineConfig, cache_dir: &Path) -> anyhow::Result<LyricsFetcher> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let timeout = config.fetch.request_timeout();

    let spotify_config = SpotifyProviderConfig::from_providers(&config.providers)?
        .with_credential_override(std::env::var(SP_DC_ENV).ok());
    if spotify_config.credential().is_none() {
        info!("No sp_dc configured, Spotify lyrics need a cached token");
    }
    let primary = SpotifyLyricsSource::new(spotify_config, cache_dir, timeout, Arc::clone(&clock))?;
    let secondary = LrclibSource::new(
        LrclibProviderConfig::from_providers(&config.providers)?,
        timeout,
    )?;

    let cache = LyricsCache::new(cache_dir, config.fetch.refetch_policy(), clock);
    Ok(LyricsFetcher::new(
        Box::new(primary),
        Box::new(secondary),
        cache,
        config.fetch.retry_policy(),
    ))
}

fn build_synchronizer(
    config: &LyriclineConfig,
    cache_dir: &Path,
    bridge: Arc<dyn PlayerBridge>,
) -> anyhow::Result<Arc<Synchronizer>> {
    let listen = &config.listen;
    let fetcher = Arc::new(build_fetcher(config, cache_dir)?);
    let sink = Arc::new(FileSink::new(listen.output.clone(), listen.clear_screen));
    let state = TickState::new(listen.lines, OffsetSource::from_config(listen));

    Ok(Synchronizer::new(
        bridge,
        fetcher,
        sink,
        state,
        listen.poll_interval(),
        listen.ahead,
    ))
}

async fn listen(config: &LyriclineConfig, bridge: Arc<dyn PlayerBridge>) -> anyhow::Result<()> {
    let cache_dir = ensure_cache_dir().context("create cache directory")?;
    let lock_file = lock_path(&cache_dir);

    let _lock: InstanceLock = match InstanceLock::try_acquire(&lock_file)
        .with_context(|| format!("open lock file {}", lock_file.display()))?
    {
        LockOutcome::Acquired(lock) => lock,
        LockOutcome::AlreadyRunning => {
            bail!("another instance is already running ({})", lock_file.display())
        }
    };

    let synchronizer = build_synchronizer(config, &cache_dir, bridge)?;

    // Create shared cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();
    let ctrlc_token = cancel_token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received Ctrl+C, shutting down gracefully...");
        ctrlc_token.cancel();
    }) {
        error!("Failed to set Ctrl+C handler: {}", e);
    }

    synchronizer.run(cancel_token).await;
    Ok(())
}

async fn current_track(bridge: &dyn PlayerBridge) -> anyhow::Result<Track> {
    let id = bridge.track_id().await.context("read current track")?;
    Ok(bridge.snapshot(&id).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_args_override_config() {
        let cli = Cli::try_parse_from([
            "lyricline", "listen", "-l", "3", "-O", "-250", "-a", "1", "-c", "-i", "100",
        ])
        .unwrap();
        let Command::Listen { display, interval } = cli.command else {
            panic!("expected listen");
        };

        let mut listen = ListenConfig::default();
        display.apply(&mut listen);

        assert_eq!(listen.lines, 3);
        assert_eq!(listen.offset_ms, -250);
        assert_eq!(listen.ahead, 1);
        assert!(listen.clear_screen);
        assert_eq!(listen.output, PathBuf::from("/dev/stdout"));
        assert_eq!(interval, Some(100));
    }

    #[test]
    fn test_zero_lines_corrected() {
        let cli = Cli::try_parse_from(["lyricline", "print", "--lines", "0"]).unwrap();
        let Command::Print { display } = cli.command else {
            panic!("expected print");
        };

        let mut listen = ListenConfig::default();
        display.apply(&mut listen);
        assert_eq!(listen.lines, 1);
    }

    #[test]
    fn test_subcommand_arguments() {
        let cli = Cli::try_parse_from(["lyricline", "set-position", "61500"]).unwrap();
        assert!(matches!(cli.command, Command::SetPosition { position_ms: 61_500 }));

        let cli = Cli::try_parse_from(["lyricline", "clear"]).unwrap();
        assert!(matches!(cli.command, Command::Clear { track_id: None }));

        let cli = Cli::try_parse_from(["lyricline", "fetch", "--pure"]).unwrap();
        assert!(matches!(cli.command, Command::Fetch { pure: true }));
    }

    #[test]
    fn test_load_config_creates_template_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.listen.lines, 5);
        assert!(path.exists());

        let reloaded = load_config(Some(&path)).unwrap();
        assert_eq!(reloaded.fetch.retry_times, 3);
        assert!(SpotifyProviderConfig::from_providers(&reloaded.providers)
            .unwrap()
            .credential()
            .is_none());
    }
}
