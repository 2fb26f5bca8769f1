//! Spotify unofficial lyrics provider using TOTP-based authentication.
//!
//! **WARNING:** This uses an unofficial Spotify API that requires the `sp_dc` cookie
//! from a logged-in Spotify web session. This may violate Spotify's Terms of Service.
//! Use at your own risk.

mod auth;
pub mod config;
mod token_manager;
mod totp;

#[cfg(test)]
mod test_server;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use lyricline_core::{
    token_cache_path, Clock, CoreError, LyricLine, LyricSet, LyricsMetadata, LyricsQuery,
    LyricsSource, SourceOutcome,
};

pub use auth::{decode_secret, SpotifyAuthError, TokenRecord};
pub use config::{SpotifyProviderConfig, CONFIG_TEMPLATE, PROVIDER_NAME};
pub use token_manager::SpotifyTokenManager;
pub use totp::{generate_totp, TotpError};

const LOG_TARGET: &str = "lyricline::spotify";

const LINE_SYNCED: &str = "LINE_SYNCED";

/// Primary lyrics source: Spotify's web player lyrics endpoint, keyed by track id.
pub struct SpotifyLyricsSource {
    token_manager: SpotifyTokenManager,
    client: reqwest::Client,
    lyrics_url: String,
    user_agent: String,
}

impl SpotifyLyricsSource {
    /// Create the source, caching tokens under `cache_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(
        config: SpotifyProviderConfig,
        cache_dir: &Path,
        timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CoreError> {
        if config.credential().is_some() {
            warn!(
                target: LOG_TARGET,
                "Spotify lyrics enabled. WARNING: This uses an unofficial Spotify API \
                 that may violate Spotify's Terms of Service. Use at your own risk."
            );
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let lyrics_url = config.lyrics_url.trim_end_matches('/').to_string();
        let user_agent = config.user_agent.clone();
        let token_manager =
            SpotifyTokenManager::new(config, client.clone(), token_cache_path(cache_dir), clock);

        Ok(Self {
            token_manager,
            client,
            lyrics_url,
            user_agent,
        })
    }

    /// Fetch lyrics for `track_id` with an already obtained bearer token.
    ///
    /// A 401 removes the cached token so the next call derives a fresh one.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-success status other than 404,
    /// or an undecodable body.
    pub async fn fetch_with_token(
        &self,
        track_id: &str,
        token: &str,
    ) -> Result<SourceOutcome, CoreError> {
        let url = format!("{}/{}", self.lyrics_url, extract_track_id(track_id));
        debug!(target: LOG_TARGET, "Spotify GET: {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[("format", "json"), ("market", "from_token")])
            .header("Authorization", format!("Bearer {token}"))
            .header("App-Platform", "WebPlayer")
            .header("User-Agent", &self.user_agent)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            info!(target: LOG_TARGET, "No Spotify lyrics for track: {}", track_id);
            return Ok(SourceOutcome::NotFound);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            warn!(target: LOG_TARGET, "Received 401 Unauthorized - invalidating cached token");
            self.token_manager.invalidate_token().await;
        }
        if !status.is_success() {
            return Err(invalid_response(format!("lyrics endpoint returned {status}")));
        }

        let body: SpotifyLyricsResponse = response
            .json()
            .await
            .map_err(|e| invalid_response(e.to_string()))?;

        Ok(SourceOutcome::Found(normalize_lyrics(body.lyrics)))
    }
}

fn invalid_response(reason: String) -> CoreError {
    CoreError::InvalidResponse {
        provider: PROVIDER_NAME.into(),
        reason,
    }
}

impl From<SpotifyAuthError> for CoreError {
    fn from(e: SpotifyAuthError) -> Self {
        match e {
            SpotifyAuthError::NoCredential => Self::CredentialMissing,
            SpotifyAuthError::Network(e) => Self::Network(e),
            SpotifyAuthError::Totp(e) => Self::Integrity {
                reason: e.to_string(),
            },
            other => invalid_response(other.to_string()),
        }
    }
}

/// Extract the bare track id from a Spotify URI, object path or URL.
#[must_use]
pub fn extract_track_id(id: &str) -> &str {
    let id = id.strip_prefix("spotify:track:").unwrap_or(id);
    let id = id.rsplit('/').next().unwrap_or(id);
    id.split('?').next().unwrap_or(id)
}

#[derive(Debug, Deserialize)]
struct SpotifyLyricsResponse {
    lyrics: SpotifyLyrics,
}

#[derive(Debug, Deserialize)]
struct SpotifyLyrics {
    #[serde(rename = "syncType", default)]
    sync_type: String,
    #[serde(default)]
    lines: Vec<SpotifyLyricsLine>,
}

#[derive(Debug, Deserialize)]
struct SpotifyLyricsLine {
    #[serde(rename = "startTimeMs")]
    start_time_ms: String,
    #[serde(default)]
    words: String,
}

/// Convert the provider's line format into a [`LyricSet`].
///
/// Lines whose start time is not an integer are skipped.
fn normalize_lyrics(lyrics: SpotifyLyrics) -> LyricSet {
    let is_line_synced = lyrics.sync_type == LINE_SYNCED;
    let lines = lyrics
        .lines
        .into_iter()
        .filter_map(|line| match line.start_time_ms.trim().parse::<u64>() {
            Ok(ms) => Some(LyricLine::new(ms, line.words)),
            Err(e) => {
                warn!(
                    target: LOG_TARGET,
                    "Skipping line with bad start time '{}': {}",
                    line.start_time_ms,
                    e
                );
                None
            }
        })
        .collect();

    LyricSet::new(lines, is_line_synced, LyricsMetadata::default())
}

#[async_trait]
impl LyricsSource for SpotifyLyricsSource {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn fetch(&self, query: &LyricsQuery) -> Result<SourceOutcome, CoreError> {
        let token = self.token_manager.get_access_token().await?;
        let outcome = self.fetch_with_token(&query.track_id, &token).await?;

        Ok(match outcome {
            SourceOutcome::Found(lyrics) => {
                SourceOutcome::Found(lyrics.with_metadata(query.metadata()))
            }
            SourceOutcome::NotFound => SourceOutcome::NotFound,
        })
    }
}
