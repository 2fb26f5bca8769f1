//! Player bridge backed by the `playerctl` command line tool.

use async_trait::async_trait;
use lyricline_core::{CoreError, DurationExt, PlayerBridge, Result};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

const LOG_TARGET: &str = "lyricline::playerctl";

const PLAYERCTL: &str = "playerctl";
const DEFAULT_PLAYER: &str = "spotify";

/// Talks to one MPRIS player through `playerctl --player=<name>`.
pub struct PlayerctlBridge {
    player: String,
}

impl Default for PlayerctlBridge {
    fn default() -> Self {
        Self::new(DEFAULT_PLAYER)
    }
}

impl PlayerctlBridge {
    pub fn new(player: impl Into<String>) -> Self {
        Self {
            player: player.into(),
        }
    }

    /// Run `playerctl` with `args` and return its trimmed standard output.
    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(PLAYERCTL)
            .args(args)
            .arg(format!("--player={}", self.player))
            .output()
            .await
            .map_err(|e| player_error(format!("failed to run {PLAYERCTL}: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(player_error(format!(
                "{PLAYERCTL} {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn metadata(&self, key: &str) -> Result<String> {
        self.run(&["metadata", key]).await
    }

    /// Metadata field that is allowed to be missing.
    async fn optional_metadata(&self, key: &str) -> String {
        self.metadata(key).await.unwrap_or_else(|e| {
            debug!(target: LOG_TARGET, "No {} metadata: {}", key, e);
            String::new()
        })
    }
}

fn player_error(reason: String) -> CoreError {
    CoreError::Player { reason }
}

/// `mpris:trackid` is an object path such as `/com/spotify/track/<id>`; keep the last segment.
fn parse_track_id(raw: &str) -> Result<String> {
    let id = raw.trim().rsplit('/').next().unwrap_or_default();
    if id.is_empty() {
        return Err(player_error("no track id reported".into()));
    }
    Ok(id.to_string())
}

/// `playerctl position` prints fractional seconds.
fn parse_position_ms(raw: &str) -> Result<u64> {
    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|e| player_error(format!("invalid position '{}': {e}", raw.trim())))?;
    Duration::try_from_secs_f64(secs)
        .map(|d| d.as_millis_u64())
        .map_err(|e| player_error(format!("invalid position '{}': {e}", raw.trim())))
}

/// `mpris:length` is in microseconds.
fn parse_length_ms(raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map(|micros| Duration::from_micros(micros).as_millis_u64())
        .map_err(|e| player_error(format!("invalid length '{}': {e}", raw.trim())))
}

fn format_position_arg(position_ms: u64) -> String {
    format!("{:.3}", Duration::from_millis(position_ms).as_secs_f64())
}

#[async_trait]
impl PlayerBridge for PlayerctlBridge {
    async fn track_id(&self) -> Result<String> {
        parse_track_id(&self.metadata("mpris:trackid").await?)
    }

    async fn position_ms(&self) -> Result<u64> {
        parse_position_ms(&self.run(&["position"]).await?)
    }

    async fn length_ms(&self) -> Result<u64> {
        parse_length_ms(&self.metadata("mpris:length").await?)
    }

    async fn artist(&self) -> String {
        self.optional_metadata("artist").await
    }

    async fn title(&self) -> String {
        self.optional_metadata("title").await
    }

    async fn album(&self) -> String {
        self.optional_metadata("album").await
    }

    async fn playing_status(&self) -> bool {
        matches!(self.run(&["status"]).await.as_deref(), Ok("Playing"))
    }

    async fn set_position(&self, position_ms: u64) -> Result<()> {
        let position = format_position_arg(position_ms);
        self.run(&["position", &position]).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_track_id() {
        assert_eq!(
            parse_track_id("/com/spotify/track/4iV5W9uYEdYUVa79Axb7Rh\n").unwrap(),
            "4iV5W9uYEdYUVa79Axb7Rh"
        );
        assert_eq!(parse_track_id("plain").unwrap(), "plain");
        assert!(matches!(parse_track_id(""), Err(CoreError::Player { .. })));
        assert!(parse_track_id("/com/spotify/track/").is_err());
    }

    #[test]
    fn test_parse_position_ms() {
        assert_eq!(parse_position_ms("12.345678\n").unwrap(), 12_345);
        assert_eq!(parse_position_ms("0").unwrap(), 0);
        assert!(parse_position_ms("-1.0").is_err());
        assert!(parse_position_ms("soon").is_err());
    }

    #[test]
    fn test_parse_length_ms() {
        assert_eq!(parse_length_ms("215000000").unwrap(), 215_000);
        assert!(parse_length_ms("").is_err());
    }

    #[test]
    fn test_format_position_arg() {
        assert_eq!(format_position_arg(61_500), "61.500");
        assert_eq!(format_position_arg(7), "0.007");
    }
}
