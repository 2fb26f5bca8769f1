//! Token lifecycle management for Spotify TOTP authentication.
//!
//! This module handles the complete authentication flow:
//! 1. Reuse the token cache file while its token is unexpired
//! 2. Fetch server time from Spotify
//! 3. Fetch and decode secret key (memoized in-process)
//! 4. Generate TOTP code
//! 5. Exchange `sp_dc` + TOTP for an access token and persist it

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use lyricline_core::Clock;

use crate::auth::{fetch_secret_key, CachedSecret, ServerTimeResponse, SpotifyAuthError, TokenRecord};
use crate::config::SpotifyProviderConfig;
use crate::totp::generate_totp;

const LOG_TARGET: &str = "lyricline::spotify::token";

/// Maximum age for cached secret key (24 hours)
const SECRET_CACHE_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Manages the Spotify access token, shared across runs through a cache file.
pub struct SpotifyTokenManager {
    config: SpotifyProviderConfig,
    client: reqwest::Client,
    cache_path: PathBuf,
    clock: Arc<dyn Clock>,
    cached_secret: RwLock<Option<CachedSecret>>,
}

impl SpotifyTokenManager {
    /// Create a new token manager persisting tokens at `cache_path`.
    pub fn new(
        config: SpotifyProviderConfig,
        client: reqwest::Client,
        cache_path: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            client,
            cache_path: cache_path.into(),
            clock,
            cached_secret: RwLock::new(None),
        }
    }

    /// Get a valid access token, requesting a new one if the cached token expired.
    ///
    /// # Errors
    ///
    /// Returns [`SpotifyAuthError::NoCredential`] if a new token is needed and no
    /// `sp_dc` is configured, or another [`SpotifyAuthError`] if the exchange fails.
    pub async fn get_access_token(&self) -> Result<String, SpotifyAuthError> {
        if let Some(record) = self.load_cached().await {
            debug!(target: LOG_TARGET, "Using cached Spotify access token");
            return Ok(record.access_token);
        }

        let sp_dc = self
            .config
            .credential()
            .ok_or(SpotifyAuthError::NoCredential)?;

        self.refresh_token(sp_dc).await
    }

    /// Read the token cache file, returning the record only if still valid.
    pub async fn load_cached(&self) -> Option<TokenRecord> {
        let content = match tokio::fs::read_to_string(&self.cache_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(target: LOG_TARGET, "No token cache file");
                return None;
            }
            Err(e) => {
                warn!(target: LOG_TARGET, "Failed to read token cache: {}", e);
                return None;
            }
        };

        let record: TokenRecord = match serde_json::from_str(&content) {
            Ok(record) => record,
            Err(e) => {
                warn!(target: LOG_TARGET, "Ignoring corrupt token cache: {}", e);
                return None;
            }
        };

        if record.is_valid_at(self.clock.now_ms()) {
            Some(record)
        } else {
            debug!(target: LOG_TARGET, "Cached token has expired");
            None
        }
    }

    async fn refresh_token(&self, sp_dc: &str) -> Result<String, SpotifyAuthError> {
        info!(target: LOG_TARGET, "Requesting Spotify access token via TOTP");

        let secret = self.ensure_secret().await?;
        let server_time = self.fetch_server_time().await?;
        let totp_code = generate_totp(&secret.secret, server_time)?;
        debug!(
            target: LOG_TARGET,
            "Generated TOTP (version: {}, server_time: {})",
            secret.version,
            server_time
        );

        let record = self
            .fetch_access_token(sp_dc, &totp_code, secret.version)
            .await?;

        if !record.is_valid_at(self.clock.now_ms()) {
            return Err(SpotifyAuthError::InvalidResponse(format!(
                "token already expired at {}",
                record.expires_at_ms
            )));
        }

        // Anonymous tokens are cached too, bounding request frequency when sp_dc is bad
        if record.is_anonymous {
            warn!(target: LOG_TARGET, "Received anonymous token - sp_dc cookie may be invalid or expired");
        }
        if let Err(e) = self.persist(&record).await {
            warn!(target: LOG_TARGET, "Failed to write token cache: {}", e);
        }

        info!(target: LOG_TARGET, "Obtained Spotify access token");
        Ok(record.access_token)
    }

    /// Ensure we have a valid (non-stale) secret key.
    async fn ensure_secret(&self) -> Result<CachedSecret, SpotifyAuthError> {
        {
            let secret_guard = self.cached_secret.read().await;
            if let Some(ref secret) = *secret_guard {
                if !secret.should_refresh(SECRET_CACHE_MAX_AGE) {
                    return Ok(secret.clone());
                }
                debug!(target: LOG_TARGET, "Secret key cache is stale, refreshing");
            }
        }

        info!(target: LOG_TARGET, "Fetching secret key from: {}", self.config.secret_key_url);
        let secret = fetch_secret_key(&self.client, &self.config.secret_key_url).await?;
        info!(target: LOG_TARGET, "Fetched secret key version: {}", secret.version);

        *self.cached_secret.write().await = Some(secret.clone());
        Ok(secret)
    }

    /// Fetch server time from Spotify.
    async fn fetch_server_time(&self) -> Result<u64, SpotifyAuthError> {
        let response: ServerTimeResponse = self
            .client
            .get(&self.config.server_time_url)
            .header("User-Agent", &self.config.user_agent)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| SpotifyAuthError::ServerTimeFailed(e.to_string()))?
            .json()
            .await
            .map_err(|e| SpotifyAuthError::ServerTimeFailed(e.to_string()))?;

        Ok(response.server_time)
    }

    async fn fetch_access_token(
        &self,
        sp_dc: &str,
        totp: &str,
        version: u32,
    ) -> Result<TokenRecord, SpotifyAuthError> {
        let version = version.to_string();
        let timestamp = self.clock.now().timestamp().to_string();

        let response = self
            .client
            .get(&self.config.token_url)
            .query(&[
                ("reason", "transport"),
                ("productType", "web-player"),
                ("totp", totp),
                ("totpVer", version.as_str()),
                ("ts", timestamp.as_str()),
            ])
            .header("Cookie", format!("sp_dc={sp_dc}"))
            .header("User-Agent", &self.config.user_agent)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            warn!(target: LOG_TARGET, "Token request failed: HTTP {}", status);
            return Err(SpotifyAuthError::TokenFetchFailed(format!("HTTP {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| SpotifyAuthError::InvalidResponse(e.to_string()))
    }

    async fn persist(&self, record: &TokenRecord) -> std::io::Result<()> {
        if let Some(parent) = self.cache_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string(record).map_err(std::io::Error::other)?;
        tokio::fs::write(&self.cache_path, content).await
    }

    /// Delete the token cache file, forcing a new token on next request.
    pub async fn invalidate_token(&self) {
        match tokio::fs::remove_file(&self.cache_path).await {
            Ok(()) => debug!(target: LOG_TARGET, "Removed cached Spotify access token"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(target: LOG_TARGET, "Failed to remove token cache: {}", e),
        }
    }
}
