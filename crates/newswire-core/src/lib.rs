pub mod article;
pub mod config;
pub mod post;
pub mod record;
pub mod score;

use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use std::{fmt, ops};

use snafu::Snafu;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub use self::article::{Article, ArticleError};
pub use self::config::{AutomationConfig, ClockTime, ConfigFieldError, ScheduleSkip};
pub use self::post::{ComposeTier, ComposedPost};
pub use self::record::{LedgerEntry, PendingEntry, PendingId, PendingStatus, PublishReceipt};
pub use self::score::{Audience, Importance, ScoreResult, ScoreSource};

/// Maximum post length on the target platform, in characters.
pub const PLATFORM_LIMIT: usize = 280;

pub const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Seconds since the Unix epoch.
#[cfg_attr(feature = "bincode", derive(::bincode::Encode, ::bincode::Decode))]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Self = Self(0);

    pub fn now() -> Self {
        Self(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        )
    }

    pub fn as_secs(self) -> u64 {
        self.0
    }

    /// Seconds elapsed from `earlier` to `self`; zero if `earlier` is later.
    pub fn secs_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    pub fn to_offset_date_time(self) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp(i64::try_from(self.0).ok()?).ok()
    }
}

impl From<u64> for Timestamp {
    fn from(secs: u64) -> Self {
        Self(secs)
    }
}

impl From<OffsetDateTime> for Timestamp {
    fn from(dt: OffsetDateTime) -> Self {
        Self(u64::try_from(dt.unix_timestamp()).unwrap_or_default())
    }
}

impl ops::Sub<u64> for Timestamp {
    type Output = Timestamp;

    fn sub(self, secs: u64) -> Self::Output {
        Self(self.0.saturating_sub(secs))
    }
}

impl ops::Add<u64> for Timestamp {
    type Output = Timestamp;

    fn add(self, secs: u64) -> Self::Output {
        Self(self.0.saturating_add(secs))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_offset_date_time().and_then(|dt| dt.format(&Rfc3339).ok()) {
            Some(s) => f.write_str(&s),
            None => write!(f, "@{}", self.0),
        }
    }
}

/// Stable identity of an article: BLAKE3 digest of its trimmed title.
///
/// Independent of the URL, so redirects, tracking parameters or URL casing
/// never make an already-published article look new.
#[cfg_attr(feature = "bincode", derive(::bincode::Encode, ::bincode::Decode))]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn of_title(title: &str) -> Self {
        Self(*blake3::hash(title.trim().as_bytes()).as_bytes())
    }

    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        data_encoding::HEXLOWER.encode_write(self.as_slice(), f)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({self})")
    }
}

#[derive(Debug, Snafu)]
pub enum ContentHashParseError {
    #[snafu(display("Invalid hex encoding"))]
    Encoding { source: data_encoding::DecodeError },
    #[snafu(display("Invalid length: {len}"))]
    Length { len: usize },
}

impl FromStr for ContentHash {
    type Err = ContentHashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = data_encoding::HEXLOWER_PERMISSIVE
            .decode(s.as_bytes())
            .map_err(|source| ContentHashParseError::Encoding { source })?;
        let len = bytes.len();
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ContentHashParseError::Length { len })?;
        Ok(Self(bytes))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for ContentHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for ContentHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Length of `s` as the platform counts it (Unicode scalar values).
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_ignores_surrounding_whitespace() {
        assert_eq!(
            ContentHash::of_title("OpenAI ships a thing"),
            ContentHash::of_title("  OpenAI ships a thing\n")
        );
        assert_ne!(
            ContentHash::of_title("OpenAI ships a thing"),
            ContentHash::of_title("OpenAI ships another thing")
        );
    }

    #[test]
    fn content_hash_display_parses_back() {
        let hash = ContentHash::of_title("title");
        let s = hash.to_string();
        assert_eq!(s.len(), 64);
        assert_eq!(s.parse::<ContentHash>().expect("valid"), hash);
        assert!("abcd".parse::<ContentHash>().is_err());
    }

    #[test]
    fn timestamp_arithmetic_saturates() {
        let t = Timestamp::from(100u64);
        assert_eq!(t.secs_since(Timestamp::from(40u64)), 60);
        assert_eq!(Timestamp::from(40u64).secs_since(t), 0);
        assert_eq!(t - 1000, Timestamp::ZERO);
    }

    #[test]
    fn timestamp_displays_rfc3339() {
        assert_eq!(
            Timestamp::from(1_700_000_000u64).to_string(),
            "2023-11-14T22:13:20Z"
        );
    }
}
