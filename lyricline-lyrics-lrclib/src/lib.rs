//! LRCLIB.net lyrics source, queried by track metadata.

use async_trait::async_trait;
use const_format::concatcp;
use lyricline_core::{CoreError, LyricSet, LyricsQuery, LyricsSource, ProvidersConfig, SourceOutcome};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const LOG_TARGET: &str = "lyricline::lrclib";

/// Provider name used in config file
pub const PROVIDER_NAME: &str = "lrclib";

pub const DEFAULT_API_URL: &str = "https://lrclib.net/api";

/// LRCLIB asks clients to identify themselves honestly
pub const DEFAULT_USER_AGENT: &str = concatcp!(
    "lyricline/",
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("CARGO_PKG_REPOSITORY"),
    ")"
);

/// LRCLIB-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LrclibProviderConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.into()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.into()
}

impl Default for LrclibProviderConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            user_agent: default_user_agent(),
        }
    }
}

impl LrclibProviderConfig {
    /// Extract LRCLIB config from the dynamic providers config, defaulting when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be parsed.
    pub fn from_providers(providers: &ProvidersConfig) -> Result<Self, CoreError> {
        Ok(providers.get(PROVIDER_NAME)?.unwrap_or_default())
    }
}

/// Config template for the LRCLIB provider.
pub const CONFIG_TEMPLATE: &str = concatcp!(
    "[providers.lrclib]\napi_url = \"",
    DEFAULT_API_URL,
    "\"\n# user_agent = \"",
    DEFAULT_USER_AGENT,
    "\"\n"
);

/// LRCLIB.net lyrics source
pub struct LrclibSource {
    client: reqwest::Client,
    api_url: String,
}

impl LrclibSource {
    /// Create a new LRCLIB source.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: LrclibProviderConfig, timeout: Duration) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(config.user_agent)
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build the exact-match lookup URL.
    #[must_use]
    pub fn get_url(&self, title: &str, artist: &str, album: &str, duration_secs: u32) -> String {
        format!(
            "{}/get?track_name={}&artist_name={}&album_name={}&duration={duration_secs}",
            self.api_url,
            urlencoding::encode(title),
            urlencoding::encode(artist),
            urlencoding::encode(album)
        )
    }

    /// Look lyrics up by title, artist, album and length.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-success status other than 404,
    /// an undecodable body, or a synced lyrics blob with no usable lines.
    pub async fn fetch_lyrics(
        &self,
        title: &str,
        artist: &str,
        album: &str,
        duration_secs: u32,
    ) -> Result<SourceOutcome, CoreError> {
        let url = self.get_url(title, artist, album, duration_secs);
        debug!(target: LOG_TARGET, "LRCLIB GET: {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            info!(target: LOG_TARGET, "LRCLIB has no lyrics for {} - {}", artist, title);
            return Ok(SourceOutcome::NotFound);
        }
        if !status.is_success() {
            return Err(invalid_response(format!("LRCLIB returned status: {status}")));
        }

        let body: LrclibResponse = response
            .json()
            .await
            .map_err(|e| invalid_response(e.to_string()))?;

        parse_synced_lyrics(body.synced_lyrics.as_deref().unwrap_or_default())
            .map(SourceOutcome::Found)
    }
}

fn invalid_response(reason: String) -> CoreError {
    CoreError::InvalidResponse {
        provider: PROVIDER_NAME.into(),
        reason,
    }
}

/// Response from LRCLIB API. Only the synced blob is used.
#[derive(Debug, Deserialize)]
struct LrclibResponse {
    #[serde(rename = "syncedLyrics", default)]
    synced_lyrics: Option<String>,
}

/// Parse a newline-delimited `[mm:ss.cc]text` blob into a line-synced set.
///
/// # Errors
///
/// An empty blob, or one without a single decodable line, is an invalid response.
pub fn parse_synced_lyrics(blob: &str) -> Result<LyricSet, CoreError> {
    let blob = blob.trim();
    if blob.is_empty() {
        return Err(invalid_response("empty synced lyrics".into()));
    }

    let set = LyricSet::parse_lrc(blob);
    if set.is_empty() {
        return Err(invalid_response("no timed lines in synced lyrics".into()));
    }
    Ok(set)
}

#[async_trait]
impl LyricsSource for LrclibSource {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn fetch(&self, query: &LyricsQuery) -> Result<SourceOutcome, CoreError> {
        info!(
            target: LOG_TARGET,
            "Fetching lyrics from LRCLIB for: {} - {} ({}s)",
            query.artist_name,
            query.track_name,
            query.duration_secs
        );

        let outcome = self
            .fetch_lyrics(
                &query.track_name,
                &query.artist_name,
                &query.album_name,
                query.duration_secs,
            )
            .await?;

        Ok(match outcome {
            SourceOutcome::Found(lyrics) => {
                SourceOutcome::Found(lyrics.with_metadata(query.metadata()))
            }
            SourceOutcome::NotFound => SourceOutcome::NotFound,
        })
    }
}
