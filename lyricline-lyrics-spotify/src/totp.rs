//! TOTP (Time-based One-Time Password) generation for Spotify authentication.
//!
//! Implements RFC 6238 TOTP using HMAC-SHA1.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use thiserror::Error;

type HmacSha1 = Hmac<Sha1>;

/// Time step in seconds
pub const PERIOD_SECS: u64 = 30;

/// Number of digits in a code
pub const DIGITS: u32 = 6;

/// TOTP generation errors
#[derive(Debug, Error)]
pub enum TotpError {
    /// The provided secret key has an invalid length for HMAC
    #[error("Invalid HMAC key length")]
    InvalidKeyLength,

    /// The digest does not have four bytes after the truncation offset
    #[error("HMAC digest too short for dynamic truncation")]
    Integrity,
}

/// Generate a TOTP code with the standard 30 second step and 6 digits.
///
/// # Errors
///
/// See [`generate_totp_with`].
pub fn generate_totp(secret: &[u8], server_time_seconds: u64) -> Result<String, TotpError> {
    generate_totp_with(secret, server_time_seconds, PERIOD_SECS, DIGITS)
}

/// Generate a TOTP code using HMAC-SHA1 (RFC 6238).
///
/// # Arguments
///
/// * `secret` - The decoded secret key bytes
/// * `server_time_seconds` - Server time in seconds (from Spotify server-time endpoint)
/// * `period` - Time step in seconds
/// * `digits` - Length of the zero-padded code
///
/// # Errors
///
/// Returns [`TotpError::InvalidKeyLength`] if the secret key is invalid for HMAC-SHA1,
/// or [`TotpError::Integrity`] if dynamic truncation runs past the digest.
pub fn generate_totp_with(
    secret: &[u8],
    server_time_seconds: u64,
    period: u64,
    digits: u32,
) -> Result<String, TotpError> {
    let counter = server_time_seconds / period.max(1);

    let mut mac = HmacSha1::new_from_slice(secret).map_err(|_| TotpError::InvalidKeyLength)?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    truncate(&digest, digits)
}

/// Dynamic truncation (RFC 4226 section 5.3)
fn truncate(digest: &[u8], digits: u32) -> Result<String, TotpError> {
    let last = digest.last().ok_or(TotpError::Integrity)?;
    let offset = usize::from(last & 0x0F);

    let window = digest
        .get(offset..offset + 4)
        .ok_or(TotpError::Integrity)?;
    let binary = u32::from_be_bytes([window[0] & 0x7F, window[1], window[2], window[3]]);

    let code = u64::from(binary) % 10u64.pow(digits);
    let width = usize::try_from(digits).unwrap_or(usize::MAX);
    Ok(format!("{code:0width$}"))
}
