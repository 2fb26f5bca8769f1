use crate::error::{CoreError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

const LOG_TARGET: &str = "lyricline::config";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LyriclineConfig {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub listen: ListenConfig,
    /// Provider-specific tables, each owned by its provider crate
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// Retry and cache-invalidation policy for lyrics acquisition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Total attempts per lyrics source before giving up on it
    #[serde(default = "default_retry_times")]
    pub retry_times: u32,
    /// Delay between attempts against the same source
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Timeout applied to every HTTP request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Age after which an "error" cache marker is refetched
    #[serde(default = "default_refetch_interval_error_secs")]
    pub refetch_interval_error_secs: u64,
    /// Age after which a "not found" cache marker is refetched
    #[serde(default = "default_refetch_interval_not_found_secs")]
    pub refetch_interval_not_found_secs: u64,
}

const fn default_retry_times() -> u32 {
    3
}

const fn default_retry_interval_ms() -> u64 {
    1000
}

const fn default_request_timeout_secs() -> u64 {
    30
}

const fn default_refetch_interval_error_secs() -> u64 {
    300
}

const fn default_refetch_interval_not_found_secs() -> u64 {
    24 * 60 * 60
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            retry_times: default_retry_times(),
            retry_interval_ms: default_retry_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            refetch_interval_error_secs: default_refetch_interval_error_secs(),
            refetch_interval_not_found_secs: default_refetch_interval_not_found_secs(),
        }
    }
}

impl FetchConfig {
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_times,
            interval: Duration::from_millis(self.retry_interval_ms),
        }
    }

    #[must_use]
    pub const fn refetch_policy(&self) -> RefetchPolicy {
        RefetchPolicy {
            error: Duration::from_secs(self.refetch_interval_error_secs),
            not_found: Duration::from_secs(self.refetch_interval_not_found_secs),
        }
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Fixed retry budget applied to each lyrics source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts; zero is treated as one
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        FetchConfig::default().retry_policy()
    }
}

/// How long negative cache markers stay authoritative
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefetchPolicy {
    pub error: Duration,
    pub not_found: Duration,
}

impl Default for RefetchPolicy {
    fn default() -> Self {
        FetchConfig::default().refetch_policy()
    }
}

/// Playback synchronizer and display settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    /// Poll interval in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Lower bound for `interval_ms`
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    /// Number of rows in the rolling display
    #[serde(default = "default_lines")]
    pub lines: usize,
    /// Number of upcoming lines shown beyond the current one
    #[serde(default)]
    pub ahead: usize,
    /// Static lyric timing offset (ignored when `offset_file` is set)
    #[serde(default)]
    pub offset_ms: i64,
    /// File re-read on every tick for the lyric timing offset
    #[serde(default)]
    pub offset_file: Option<PathBuf>,
    /// Where the display is written
    #[serde(default = "default_output")]
    pub output: PathBuf,
    /// Prefix every render with a clear-screen escape sequence
    #[serde(default)]
    pub clear_screen: bool,
}

const fn default_interval_ms() -> u64 {
    200
}

const fn default_min_interval_ms() -> u64 {
    50
}

const fn default_lines() -> usize {
    5
}

fn default_output() -> PathBuf {
    PathBuf::from("/dev/stdout")
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            min_interval_ms: default_min_interval_ms(),
            lines: default_lines(),
            ahead: 0,
            offset_ms: 0,
            offset_file: None,
            output: default_output(),
            clear_screen: false,
        }
    }
}

impl ListenConfig {
    /// Poll interval clamped to the configured minimum.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        let floor = self.min_interval_ms.max(1);
        if self.interval_ms < floor {
            warn!(
                target: LOG_TARGET,
                "Interval {}ms is below the minimum, using {}ms",
                self.interval_ms,
                floor
            );
        }
        Duration::from_millis(self.interval_ms.max(floor))
    }
}

/// Opaque per-provider configuration tables (`[providers.<name>]`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvidersConfig(toml::Table);

impl ProvidersConfig {
    /// Deserialize the table for `name`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the table exists but does not match `T`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        self.0
            .get(name)
            .map(|value| {
                value.clone().try_into().map_err(|e: toml::de::Error| {
                    CoreError::ConfigInvalid {
                        message: format!("providers.{name}: {e}"),
                    }
                })
            })
            .transpose()
    }
}

impl LyriclineConfig {
    /// Get the config file path (~/.config/lyricline/config.toml)
    #[must_use]
    pub fn config_path() -> PathBuf {
        crate::paths::config_path()
    }

    /// Load config from the default location or create a template on first run.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigNotFound`] after writing a template, or an error if
    /// the file cannot be read or parsed.
    pub fn load_or_create(provider_templates: &[&str]) -> Result<Self> {
        Self::load_or_create_at(&Self::config_path(), provider_templates)
    }

    /// Load config from `config_path` or create a template there.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigNotFound`] after writing a template, or an error if
    /// the file cannot be read or parsed.
    pub fn load_or_create_at(config_path: &Path, provider_templates: &[&str]) -> Result<Self> {
        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(config_path, build_config_template(provider_templates))?;

            return Err(CoreError::ConfigNotFound {
                path: config_path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(config_path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigInvalid`] describing the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.listen.lines == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "listen.lines must be at least 1".into(),
            });
        }
        if self.fetch.retry_times == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "fetch.retry_times must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Build the full config template: base sections followed by provider sections.
#[must_use]
pub fn build_config_template(provider_templates: &[&str]) -> String {
    let mut template = String::from(BASE_CONFIG_TEMPLATE);
    for provider in provider_templates {
        template.push('\n');
        template.push_str(provider);
    }
    template
}

const BASE_CONFIG_TEMPLATE: &str = r#"# Lyricline Configuration
# ~/.config/lyricline/config.toml

[fetch]
# Total attempts per lyrics source, and the delay between them
retry_times = 3
retry_interval_ms = 1000
request_timeout_secs = 30
# How long a failed lookup is remembered before trying again
refetch_interval_error_secs = 300
# How long a definitive "no lyrics" answer is remembered
refetch_interval_not_found_secs = 86400

[listen]
interval_ms = 200
min_interval_ms = 50
lines = 5
# Upcoming lines shown beyond the current one
ahead = 0
# Lyric timing offset in milliseconds, ignored when offset_file is set
offset_ms = 0
# offset_file = "/tmp/lyricline.offset"
output = "/dev/stdout"
clear_screen = false
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct DummyProvider {
        api_url: String,
    }

    #[test]
    fn test_defaults_from_empty_file() {
        let config: LyriclineConfig = toml::from_str("").unwrap();
        assert_eq!(config.fetch.retry_times, 3);
        assert_eq!(config.fetch.refetch_interval_not_found_secs, 86_400);
        assert_eq!(config.listen.lines, 5);
        assert_eq!(config.listen.output, PathBuf::from("/dev/stdout"));
        assert!(config.listen.offset_file.is_none());
    }

    #[test]
    fn test_template_parses_to_defaults() {
        let config: LyriclineConfig = toml::from_str(&build_config_template(&[])).unwrap();
        assert_eq!(config.fetch.retry_interval_ms, 1000);
        assert_eq!(config.listen.interval_ms, 200);
        assert_eq!(config.listen.ahead, 0);
    }

    #[test]
    fn test_poll_interval_clamped_to_minimum() {
        let listen = ListenConfig {
            interval_ms: 10,
            ..Default::default()
        };
        assert_eq!(listen.poll_interval(), Duration::from_millis(50));

        let listen = ListenConfig {
            interval_ms: 500,
            ..Default::default()
        };
        assert_eq!(listen.poll_interval(), Duration::from_millis(500));

        let listen = ListenConfig {
            interval_ms: 0,
            min_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(listen.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_providers_get() {
        let config: LyriclineConfig = toml::from_str(
            r#"
[providers.dummy]
api_url = "http://localhost:1234"
"#,
        )
        .unwrap();

        let dummy: Option<DummyProvider> = config.providers.get("dummy").unwrap();
        assert_eq!(
            dummy,
            Some(DummyProvider {
                api_url: "http://localhost:1234".into()
            })
        );
        let missing: Option<DummyProvider> = config.providers.get("missing").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_providers_get_type_mismatch() {
        let config: LyriclineConfig = toml::from_str(
            r"
[providers.dummy]
api_url = 5
",
        )
        .unwrap();
        let result: Result<Option<DummyProvider>> = config.providers.get("dummy");
        assert!(matches!(result, Err(CoreError::ConfigInvalid { .. })));
    }

    #[test]
    fn test_load_or_create_writes_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let first = LyriclineConfig::load_or_create_at(&path, &["[providers.dummy]\n"]);
        assert!(matches!(first, Err(CoreError::ConfigNotFound { .. })));
        assert!(path.exists());

        let second = LyriclineConfig::load_or_create_at(&path, &[]).unwrap();
        assert_eq!(second.listen.lines, 5);
    }

    #[test]
    fn test_validate_rejects_zero_lines() {
        let config: LyriclineConfig = toml::from_str("[listen]\nlines = 0\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(CoreError::ConfigInvalid { .. })
        ));
    }
}
