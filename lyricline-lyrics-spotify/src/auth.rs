//! Authentication types and secret key fetching for Spotify TOTP authentication.

use crate::totp::TotpError;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;

/// Authentication errors for Spotify TOTP flow
#[derive(Debug, Error)]
pub enum SpotifyAuthError {
    /// No `sp_dc` cookie configured
    #[error("sp_dc cookie is not configured")]
    NoCredential,

    /// Failed to fetch server time from Spotify
    #[error("Failed to fetch server time: {0}")]
    ServerTimeFailed(String),

    /// Failed to fetch secret key from remote URL
    #[error("Failed to fetch secret key: {0}")]
    SecretKeyFailed(String),

    /// Failed to decode the secret key
    #[error("Failed to decode secret key: no versions found")]
    SecretDecodeError,

    /// Failed to get access token from Spotify
    #[error("Failed to get access token: {0}")]
    TokenFetchFailed(String),

    /// Token endpoint answered with an unusable token
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    #[error("TOTP generation failed: {0}")]
    Totp(#[from] TotpError),

    /// Network error during authentication
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Token endpoint response, stored verbatim in the token cache file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// The Bearer token for API requests
    #[serde(rename = "accessToken")]
    pub access_token: String,

    /// Token expiration timestamp in milliseconds since Unix epoch
    #[serde(rename = "accessTokenExpirationTimestampMs")]
    pub expires_at_ms: i64,

    /// Whether this is an anonymous token (indicates invalid `sp_dc`)
    #[serde(rename = "isAnonymous", default)]
    pub is_anonymous: bool,
}

impl TokenRecord {
    /// A token is usable until its expiration timestamp.
    #[must_use]
    pub const fn is_valid_at(&self, now_ms: i64) -> bool {
        self.expires_at_ms > now_ms
    }
}

/// Cached secret key for TOTP generation
#[derive(Debug, Clone)]
pub struct CachedSecret {
    /// Decoded secret bytes
    pub secret: Vec<u8>,
    /// Version number sent as `totpVer`
    pub version: u32,
    /// When this was fetched
    pub fetched_at: Instant,
}

impl CachedSecret {
    /// Check if secret cache should be refreshed.
    #[must_use]
    pub fn should_refresh(&self, max_age: std::time::Duration) -> bool {
        self.fetched_at.elapsed() > max_age
    }
}

/// Response from Spotify server time endpoint
#[derive(Debug, Deserialize)]
pub struct ServerTimeResponse {
    /// Server time in seconds since Unix epoch
    #[serde(rename = "serverTime")]
    pub server_time: u64,
}

/// One entry of the remote secret list
#[derive(Debug, Clone, Deserialize)]
pub struct SecretEntry {
    pub version: u32,
    /// Obfuscated secret
    pub secret: String,
}

/// De-obfuscate a secret.
///
/// Each character code is XORed with `(i % 33) + 9`, where `i` is the
/// character's byte index, and the decimal results are concatenated. The bytes
/// of that decimal string are the HMAC key.
#[must_use]
pub fn decode_secret(obfuscated: &str) -> Vec<u8> {
    obfuscated
        .char_indices()
        .map(|(i, c)| {
            let key = u32::try_from(i % 33 + 9).unwrap_or(0);
            (u32::from(c) ^ key).to_string()
        })
        .collect::<String>()
        .into_bytes()
}

/// Pick the highest version from a secret list and decode it.
///
/// # Errors
///
/// Returns [`SpotifyAuthError::SecretDecodeError`] if the list is empty.
pub fn latest_secret(entries: Vec<SecretEntry>) -> Result<CachedSecret, SpotifyAuthError> {
    let latest = entries
        .into_iter()
        .max_by_key(|entry| entry.version)
        .ok_or(SpotifyAuthError::SecretDecodeError)?;

    Ok(CachedSecret {
        secret: decode_secret(&latest.secret),
        version: latest.version,
        fetched_at: Instant::now(),
    })
}

/// Fetch and decode the latest secret key from the configured URL.
///
/// # Errors
///
/// Returns [`SpotifyAuthError::SecretKeyFailed`] if the network request fails or JSON is invalid.
/// Returns [`SpotifyAuthError::SecretDecodeError`] if no versions are found.
pub async fn fetch_secret_key(
    client: &reqwest::Client,
    secret_key_url: &str,
) -> Result<CachedSecret, SpotifyAuthError> {
    let response = client
        .get(secret_key_url)
        .send()
        .await?
        .error_for_status()
        .map_err(|e| SpotifyAuthError::SecretKeyFailed(e.to_string()))?;

    let entries: Vec<SecretEntry> = response
        .json()
        .await
        .map_err(|e| SpotifyAuthError::SecretKeyFailed(e.to_string()))?;

    latest_secret(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_secret_xor_by_index() {
        // 'A' (65) ^ 9 = 72, 'B' (66) ^ 10 = 72, 'C' (67) ^ 11 = 72
        assert_eq!(decode_secret("ABC"), b"727272".to_vec());
    }

    #[test]
    fn test_decode_secret_key_wraps_after_33() {
        let input = "a".repeat(34);
        let decoded = String::from_utf8(decode_secret(&input)).unwrap();
        // Index 0 and 33 share the key 9: 'a' (97) ^ 9 = 104
        assert!(decoded.starts_with("104"));
        assert!(decoded.ends_with("104"));
    }

    #[test]
    fn test_decode_secret_uses_byte_index() {
        // 'é' spans two bytes, so 'a' after it sits at byte index 2 (key 11)
        let decoded = String::from_utf8(decode_secret("éa")).unwrap();
        let e_acute = (0xE9_u32 ^ 9).to_string();
        let a = (97_u32 ^ 11).to_string();
        assert_eq!(decoded, format!("{e_acute}{a}"));
    }

    #[test]
    fn test_latest_secret_picks_highest_version() {
        let entries: Vec<SecretEntry> = serde_json::from_str(
            r#"[{"version": 61, "secret": "A"}, {"version": 63, "secret": "B"}, {"version": 62, "secret": "C"}]"#,
        )
        .unwrap();

        let secret = latest_secret(entries).unwrap();
        assert_eq!(secret.version, 63);
        // 'B' (66) ^ 9 = 75
        assert_eq!(secret.secret, b"75".to_vec());
    }

    #[test]
    fn test_latest_secret_empty_list() {
        assert!(matches!(
            latest_secret(Vec::new()),
            Err(SpotifyAuthError::SecretDecodeError)
        ));
    }

    #[test]
    fn test_token_record_json_shape() {
        let record: TokenRecord = serde_json::from_str(
            r#"{"accessToken":"abc","accessTokenExpirationTimestampMs":1700000000000,"isAnonymous":false,"clientId":"x"}"#,
        )
        .unwrap();
        assert_eq!(record.access_token, "abc");
        assert!(record.is_valid_at(1_699_999_999_999));
        assert!(!record.is_valid_at(1_700_000_000_000));

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"accessTokenExpirationTimestampMs\":1700000000000"));
    }
}
