//! Normalized lyrics model and the line-oriented LRC text format used by the cache.
//!
//! A cache file is one of:
//!
//! ```text
//! 404                 error
//! 1700000000          1700000000
//! ```
//!
//! for negative markers (kind, then the Unix fetch time), or
//!
//! ```text
//! [sync:line]
//! [ti:Title]
//! [ar:Artist]
//! [al:Album]
//! [00:12.34]First line
//! ```
//!
//! for a lyric set. Times are stored at centisecond resolution.

use std::fmt::Write;
use tracing::warn;

const LOG_TARGET: &str = "lyricline::lrc";

const SYNC_LINE_TAG: &str = "[sync:line]";
const SYNC_UNKNOWN_TAG: &str = "[sync:unknown]";
const NOT_FOUND_MARKER: &str = "404";
const ERROR_MARKER: &str = "error";

/// A single line of lyrics with its start time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricLine {
    pub start_time_ms: u64,
    pub text: String,
}

impl LyricLine {
    pub fn new(start_time_ms: u64, text: impl Into<String>) -> Self {
        Self {
            start_time_ms,
            text: text.into(),
        }
    }
}

/// Track metadata carried alongside the lyrics as LRC ID tags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LyricsMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
}

/// An immutable, time-ordered set of lyric lines.
///
/// An error set never has lines; a regular set always has its lines sorted by
/// start time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LyricSet {
    lines: Vec<LyricLine>,
    metadata: LyricsMetadata,
    is_line_synced: bool,
    is_error: bool,
}

impl LyricSet {
    /// Build a lyric set, sorting lines by start time.
    #[must_use]
    pub fn new(mut lines: Vec<LyricLine>, is_line_synced: bool, metadata: LyricsMetadata) -> Self {
        lines.sort_by_key(|line| line.start_time_ms);
        Self {
            lines,
            metadata,
            is_line_synced,
            is_error: false,
        }
    }

    /// The set handed out when no usable lyrics could be obtained.
    #[must_use]
    pub fn error() -> Self {
        Self {
            is_error: true,
            ..Self::default()
        }
    }

    /// Replace the metadata tags.
    #[must_use]
    pub fn with_metadata(mut self, metadata: LyricsMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn lines(&self) -> &[LyricLine] {
        &self.lines
    }

    #[must_use]
    pub const fn metadata(&self) -> &LyricsMetadata {
        &self.metadata
    }

    #[must_use]
    pub const fn is_line_synced(&self) -> bool {
        self.is_line_synced
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.is_error
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Line-synced, non-error, and non-empty.
    #[must_use]
    pub fn is_usable_synced(&self) -> bool {
        !self.is_error && self.is_line_synced && !self.lines.is_empty()
    }

    /// Plain text of all lines joined by newlines
    #[must_use]
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Parse an LRC blob (ID tags, optional sync tag, timed lines).
    ///
    /// Lines that are neither tags nor valid `[mm:ss.cc]` lines are skipped with a
    /// warning. A blob without a sync tag is treated as line-synced since every
    /// kept line carries a timestamp.
    #[must_use]
    pub fn parse_lrc(input: &str) -> Self {
        let body = decode_body(input.lines());
        Self::new(body.lines, body.is_line_synced.unwrap_or(true), body.metadata)
    }

    /// Serialize to the cache text format.
    #[must_use]
    pub fn to_lrc(&self) -> String {
        let mut output = String::new();

        output.push_str(if self.is_line_synced {
            SYNC_LINE_TAG
        } else {
            SYNC_UNKNOWN_TAG
        });
        output.push('\n');

        if let Some(ref title) = self.metadata.title {
            let _ = writeln!(output, "[ti:{}]", single_line(title));
        }
        if let Some(ref artist) = self.metadata.artist {
            let _ = writeln!(output, "[ar:{}]", single_line(artist));
        }
        if let Some(ref album) = self.metadata.album {
            let _ = writeln!(output, "[al:{}]", single_line(album));
        }

        for line in &self.lines {
            output.push_str(&encode_line(line));
            output.push('\n');
        }

        output
    }
}

/// Kind of a negative cache marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegativeKind {
    /// Every source gave a definitive "no lyrics" answer
    NotFound,
    /// Acquisition failed for transient reasons
    Error,
}

impl NegativeKind {
    const fn as_marker(self) -> &'static str {
        match self {
            Self::NotFound => NOT_FOUND_MARKER,
            Self::Error => ERROR_MARKER,
        }
    }

    fn from_marker(s: &str) -> Option<Self> {
        match s {
            NOT_FOUND_MARKER => Some(Self::NotFound),
            ERROR_MARKER => Some(Self::Error),
            _ => None,
        }
    }
}

/// Decoded contents of a cache file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEntry {
    Lyrics(LyricSet),
    Negative {
        kind: NegativeKind,
        /// Unix timestamp (seconds) of the failed fetch
        fetched_at: i64,
    },
}

impl CacheEntry {
    /// Serialize to the cache text format.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Lyrics(set) => set.to_lrc(),
            Self::Negative { kind, fetched_at } => {
                format!("{}\n{fetched_at}\n", kind.as_marker())
            }
        }
    }

    /// Parse cache text. The error is a human-readable reason.
    ///
    /// # Errors
    ///
    /// Returns an error when the discriminator line is unknown, a negative marker
    /// has no valid timestamp, or a lyric entry contains no decodable lines.
    pub fn decode(input: &str) -> Result<Self, String> {
        let mut lines = input.lines().map(str::trim).skip_while(|l| l.is_empty());
        let first = lines.next().ok_or_else(|| "empty file".to_string())?;

        if let Some(kind) = NegativeKind::from_marker(first) {
            let timestamp = lines.next().unwrap_or_default();
            let fetched_at = timestamp
                .parse::<i64>()
                .map_err(|e| format!("invalid marker timestamp '{timestamp}': {e}"))?;
            return Ok(Self::Negative { kind, fetched_at });
        }

        if first != SYNC_LINE_TAG && first != SYNC_UNKNOWN_TAG {
            return Err(format!("unknown discriminator line '{first}'"));
        }

        let body = decode_body(input.lines());
        if body.lines.is_empty() {
            return Err("no lyric lines".into());
        }
        Ok(Self::Lyrics(LyricSet::new(
            body.lines,
            body.is_line_synced.unwrap_or(false),
            body.metadata,
        )))
    }
}

struct DecodedBody {
    metadata: LyricsMetadata,
    lines: Vec<LyricLine>,
    is_line_synced: Option<bool>,
}

fn decode_body<'a>(input: impl Iterator<Item = &'a str>) -> DecodedBody {
    let mut body = DecodedBody {
        metadata: LyricsMetadata::default(),
        lines: Vec::new(),
        is_line_synced: None,
    };

    for line in input {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(title) = tag_value(line, "ti") {
            body.metadata.title = Some(title.to_string());
        } else if let Some(artist) = tag_value(line, "ar") {
            body.metadata.artist = Some(artist.to_string());
        } else if let Some(album) = tag_value(line, "al") {
            body.metadata.album = Some(album.to_string());
        } else if line == SYNC_LINE_TAG {
            body.is_line_synced = Some(true);
        } else if line == SYNC_UNKNOWN_TAG {
            body.is_line_synced = Some(false);
        } else if let Some(lyric) = decode_line(line) {
            body.lines.push(lyric);
        } else {
            warn!(target: LOG_TARGET, "Skipping undecodable LRC line '{}'", line);
        }
    }

    body
}

fn tag_value<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    line.strip_prefix('[')?
        .strip_prefix(tag)?
        .strip_prefix(':')?
        .strip_suffix(']')
}

fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

/// Format a line as `[mm:ss.cc]text`, rounding to the nearest centisecond.
#[must_use]
pub fn encode_line(line: &LyricLine) -> String {
    let centis = line.start_time_ms.saturating_add(5) / 10;
    let minutes = centis / 6000;
    let seconds = (centis / 100) % 60;
    let hundredths = centis % 100;

    format!(
        "[{minutes:02}:{seconds:02}.{hundredths:02}]{}",
        single_line(&line.text)
    )
}

/// Parse a `[mm:ss.cc]text` line.
///
/// The fractional part is read by its digit count: one digit is tenths, two are
/// hundredths, three are milliseconds.
#[must_use]
pub fn decode_line(line: &str) -> Option<LyricLine> {
    let rest = line.strip_prefix('[')?;
    let end = rest.find(']')?;
    let (stamp, text) = (&rest[..end], &rest[end + 1..]);

    let (minutes, rest) = stamp.split_once(':')?;
    let (seconds, fraction) = rest.split_once('.')?;

    let minutes = parse_digits(minutes)?;
    let seconds = parse_digits(seconds)?;
    let fraction_ms = match fraction.len() {
        1 => parse_digits(fraction)? * 100,
        2 => parse_digits(fraction)? * 10,
        3 => parse_digits(fraction)?,
        _ => return None,
    };

    let start_time_ms = minutes
        .checked_mul(60_000)?
        .checked_add(seconds.checked_mul(1000)?)?
        .checked_add(fraction_ms)?;

    Some(LyricLine::new(start_time_ms, text.trim()))
}

fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
