//! Spotify lyrics provider configuration.

use const_format::concatcp;
use lyricline_core::{CoreError, ProvidersConfig};
use serde::{Deserialize, Serialize};

/// Provider name used in config file
pub const PROVIDER_NAME: &str = "spotify";

/// Environment variable that overrides `sp_dc`
pub const SP_DC_ENV: &str = "SP_DC";

/// Default URL for fetching Spotify TOTP secret keys
pub const DEFAULT_SECRET_KEY_URL: &str =
    "https://raw.githubusercontent.com/xyloflake/spot-secrets-go/refs/heads/main/secrets/secrets.json";

pub const DEFAULT_SERVER_TIME_URL: &str = "https://open.spotify.com/api/server-time";
pub const DEFAULT_TOKEN_URL: &str = "https://open.spotify.com/api/token";
pub const DEFAULT_LYRICS_URL: &str = "https://spclient.wg.spotify.com/color-lyrics/v2/track";

/// Browser user agent expected by the web player endpoints
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:143.0) Gecko/20100101 Firefox/143.0";

/// Spotify-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyProviderConfig {
    /// `sp_dc` cookie from a logged-in web session (use at your own risk)
    #[serde(default)]
    pub sp_dc: Option<String>,
    #[serde(default = "default_secret_key_url")]
    pub secret_key_url: String,
    #[serde(default = "default_server_time_url")]
    pub server_time_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_lyrics_url")]
    pub lyrics_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_secret_key_url() -> String {
    DEFAULT_SECRET_KEY_URL.into()
}

fn default_server_time_url() -> String {
    DEFAULT_SERVER_TIME_URL.into()
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.into()
}

fn default_lyrics_url() -> String {
    DEFAULT_LYRICS_URL.into()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.into()
}

impl Default for SpotifyProviderConfig {
    fn default() -> Self {
        Self {
            sp_dc: None,
            secret_key_url: default_secret_key_url(),
            server_time_url: default_server_time_url(),
            token_url: default_token_url(),
            lyrics_url: default_lyrics_url(),
            user_agent: default_user_agent(),
        }
    }
}

impl SpotifyProviderConfig {
    /// Extract Spotify config from the dynamic providers config, defaulting when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be parsed.
    pub fn from_providers(providers: &ProvidersConfig) -> Result<Self, CoreError> {
        Ok(providers.get(PROVIDER_NAME)?.unwrap_or_default())
    }

    /// Replace `sp_dc` with `value` when it is set and non-empty.
    #[must_use]
    pub fn with_credential_override(mut self, value: Option<String>) -> Self {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            self.sp_dc = Some(value);
        }
        self
    }

    /// The configured cookie, if any.
    #[must_use]
    pub fn credential(&self) -> Option<&str> {
        self.sp_dc
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// Config template for Spotify provider.
/// This is appended to the base config template when creating a new config file.
pub const CONFIG_TEMPLATE: &str = concatcp!(
    r#"[providers.spotify]
# sp_dc cookie from a logged-in open.spotify.com session (may violate TOS, use at your own risk)
# The SP_DC environment variable takes precedence
# sp_dc = ""
secret_key_url = ""#,
    DEFAULT_SECRET_KEY_URL,
    "\"\nserver_time_url = \"",
    DEFAULT_SERVER_TIME_URL,
    "\"\ntoken_url = \"",
    DEFAULT_TOKEN_URL,
    "\"\nlyrics_url = \"",
    DEFAULT_LYRICS_URL,
    "\"\nuser_agent = \"",
    DEFAULT_USER_AGENT,
    "\"\n"
);
