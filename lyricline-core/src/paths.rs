//! Path constants for configuration and cache files.

use std::path::{Path, PathBuf};

/// The name of the configuration and cache directories
pub const APP_DIR_NAME: &str = "lyricline";

/// The name of the main configuration file
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// The name of the shared access token cache file
pub const TOKEN_CACHE_FILE_NAME: &str = "spotify_token.json";

/// The name of the single-instance lock file
pub const LOCK_FILE_NAME: &str = "lyricline.lock";

/// Extension of per-track lyrics cache files
pub const LYRICS_FILE_EXTENSION: &str = "lrc";

/// Get the configuration directory path (~/.config/lyricline/)
#[must_use]
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join(APP_DIR_NAME)
}

/// Get the config file path (~/.config/lyricline/config.toml)
#[must_use]
pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Get the cache directory (`~/.cache/lyricline/` on Linux), falling back to the
/// system temp directory when the platform has no cache directory.
#[must_use]
pub fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
}

/// Get the cache directory, creating it if needed.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_cache_dir() -> std::io::Result<PathBuf> {
    let dir = cache_dir();
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Get the token cache file path inside `cache_dir`
#[must_use]
pub fn token_cache_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(TOKEN_CACHE_FILE_NAME)
}

/// Get the lock file path inside `cache_dir`
#[must_use]
pub fn lock_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(LOCK_FILE_NAME)
}

/// Get the lyrics cache file for a track.
///
/// Only the last `/`-separated segment of the id is used, so player object
/// paths such as `/com/spotify/track/abc` map to `abc.lrc`.
#[must_use]
pub fn lyrics_cache_path(cache_dir: &Path, track_id: &str) -> PathBuf {
    let file_stem = track_id.rsplit('/').next().unwrap_or(track_id);
    cache_dir.join(format!("{file_stem}.{LYRICS_FILE_EXTENSION}"))
}
