use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use snafu::Snafu;
use time::{UtcOffset, Weekday};

use crate::Timestamp;

/// Wall-clock time of day with minute precision.
#[cfg_attr(feature = "bincode", derive(::bincode::Encode, ::bincode::Decode))]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime {
    hour: u8,
    minute: u8,
}

impl ClockTime {
    pub const fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    pub fn minute_of_day(self) -> u16 {
        u16::from(self.hour) * 60 + u16::from(self.minute)
    }

    fn is_valid(self) -> bool {
        Self::new(self.hour, self.minute).is_some()
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

#[derive(Debug, Snafu)]
#[snafu(display("Invalid time of day `{value}`, expected HH:MM"))]
pub struct ClockTimeParseError {
    value: String,
}

impl FromStr for ClockTime {
    type Err = ClockTimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = s.trim().split_once(':').and_then(|(h, m)| {
            if h.is_empty() || 2 < h.len() || m.len() != 2 {
                return None;
            }
            ClockTime::new(h.parse().ok()?, m.parse().ok()?)
        });
        parsed.ok_or_else(|| ClockTimeParseError { value: s.to_owned() })
    }
}

/// A single validation failure of [`AutomationConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFieldError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigFieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Why a batch is not run right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleSkip {
    Weekend,
    OutsideWorkingHours { start: ClockTime, end: ClockTime },
}

impl fmt::Display for ScheduleSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleSkip::Weekend => f.write_str("weekend runs are disabled"),
            ScheduleSkip::OutsideWorkingHours { start, end } => {
                write!(f, "outside working hours ({start}-{end})")
            }
        }
    }
}

/// Process-wide automation settings.
///
/// Persisted in the store; re-read at the start of every batch.
#[cfg_attr(feature = "bincode", derive(::bincode::Encode, ::bincode::Decode))]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct AutomationConfig {
    /// Scheduler processes batches on its own.
    pub auto_mode: bool,
    pub min_score: u8,
    pub check_interval_hours: f64,
    pub max_articles_per_run: u32,
    pub auto_post_enabled: bool,
    pub require_manual_approval: bool,
    pub rate_limit_secs: f64,
    pub working_hours_only: bool,
    pub working_hours_start: ClockTime,
    pub working_hours_end: ClockTime,
    pub weekend_enabled: bool,
    /// Offset from UTC that working hours and weekends are evaluated in.
    pub utc_offset_minutes: i16,
    pub telegram_notifications: bool,
    pub telegram_chat_id: Option<String>,
    pub last_updated: Option<Timestamp>,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            auto_mode: false,
            min_score: 5,
            check_interval_hours: 3.0,
            max_articles_per_run: 10,
            auto_post_enabled: false,
            require_manual_approval: true,
            rate_limit_secs: 2.0,
            working_hours_only: false,
            working_hours_start: ClockTime { hour: 9, minute: 0 },
            working_hours_end: ClockTime { hour: 18, minute: 0 },
            weekend_enabled: true,
            utc_offset_minutes: 0,
            telegram_notifications: true,
            telegram_chat_id: None,
            last_updated: None,
        }
    }
}

impl AutomationConfig {
    pub const MIN_SCORE_RANGE: (u8, u8) = (1, 10);
    pub const CHECK_INTERVAL_HOURS_RANGE: (f64, f64) = (0.5, 24.0);
    pub const MAX_ARTICLES_RANGE: (u32, u32) = (1, 50);
    pub const RATE_LIMIT_SECS_RANGE: (f64, f64) = (0.0, 60.0);
    pub const UTC_OFFSET_MINUTES_RANGE: (i16, i16) = (-14 * 60, 14 * 60);

    /// Check every field, collecting all problems instead of stopping at the
    /// first one. Nothing is clamped.
    pub fn validate(&self) -> Result<(), Vec<ConfigFieldError>> {
        let mut errors = vec![];
        let mut fail = |field: &'static str, message: String| {
            errors.push(ConfigFieldError { field, message });
        };

        let (lo, hi) = Self::MIN_SCORE_RANGE;
        if !(lo..=hi).contains(&self.min_score) {
            fail("min_score", format!("must be between {lo} and {hi}"));
        }

        let (lo, hi) = Self::CHECK_INTERVAL_HOURS_RANGE;
        if !(lo..=hi).contains(&self.check_interval_hours) {
            fail(
                "check_interval_hours",
                format!("must be between {lo} and {hi} hours"),
            );
        }

        let (lo, hi) = Self::MAX_ARTICLES_RANGE;
        if !(lo..=hi).contains(&self.max_articles_per_run) {
            fail(
                "max_articles_per_run",
                format!("must be between {lo} and {hi}"),
            );
        }

        let (lo, hi) = Self::RATE_LIMIT_SECS_RANGE;
        if !(lo..=hi).contains(&self.rate_limit_secs) {
            fail(
                "rate_limit_secs",
                format!("must be between {lo} and {hi} seconds"),
            );
        }

        if !self.working_hours_start.is_valid() {
            fail("working_hours_start", "must be a valid HH:MM time".into());
        }
        if !self.working_hours_end.is_valid() {
            fail("working_hours_end", "must be a valid HH:MM time".into());
        }

        let (lo, hi) = Self::UTC_OFFSET_MINUTES_RANGE;
        if !(lo..=hi).contains(&self.utc_offset_minutes) {
            fail(
                "utc_offset_minutes",
                format!("must be between {lo} and {hi} minutes"),
            );
        }

        if self
            .telegram_chat_id
            .as_deref()
            .is_some_and(|id| id.trim().is_empty())
        {
            fail("telegram_chat_id", "must not be blank".into());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Whether a composed post goes straight to the network instead of the
    /// pending queue.
    pub fn posts_automatically(&self) -> bool {
        self.auto_post_enabled && !self.require_manual_approval
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs_f64(self.check_interval_hours.max(0.0) * 3600.0)
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_secs_f64(self.rate_limit_secs.max(0.0))
    }

    /// Batch-level gate: `Some` if no batch should run at `now`.
    pub fn schedule_gate(&self, now: Timestamp) -> Option<ScheduleSkip> {
        let offset = UtcOffset::from_whole_seconds(i32::from(self.utc_offset_minutes) * 60)
            .unwrap_or(UtcOffset::UTC);
        let local = now.to_offset_date_time()?.to_offset(offset);

        if !self.weekend_enabled && matches!(local.weekday(), Weekday::Saturday | Weekday::Sunday)
        {
            return Some(ScheduleSkip::Weekend);
        }

        if self.working_hours_only {
            let minute = u16::from(local.hour()) * 60 + u16::from(local.minute());
            let start = self.working_hours_start.minute_of_day();
            let end = self.working_hours_end.minute_of_day();
            let inside = if start <= end {
                start <= minute && minute <= end
            } else {
                // Window wraps past midnight, e.g. 22:00-06:00.
                start <= minute || minute <= end
            };
            if !inside {
                return Some(ScheduleSkip::OutsideWorkingHours {
                    start: self.working_hours_start,
                    end: self.working_hours_end,
                });
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2023-11-14 was a Tuesday; 22:13:20 UTC.
    const TUESDAY_2213: u64 = 1_700_000_000;
    // 2023-11-18, Saturday, 22:13:20 UTC.
    const SATURDAY_2213: u64 = TUESDAY_2213 + 4 * 24 * 3600;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(AutomationConfig::default().validate(), Ok(()));
    }

    #[test]
    fn validation_lists_every_bad_field() {
        let config = AutomationConfig {
            min_score: 11,
            check_interval_hours: 0.1,
            max_articles_per_run: 0,
            rate_limit_secs: 61.0,
            utc_offset_minutes: 15 * 60,
            ..AutomationConfig::default()
        };
        let errors = config.validate().expect_err("invalid");
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            [
                "min_score",
                "check_interval_hours",
                "max_articles_per_run",
                "rate_limit_secs",
                "utc_offset_minutes"
            ]
        );
        assert_eq!(config.min_score, 11, "never clamped");
    }

    #[test]
    fn nan_interval_is_rejected() {
        let config = AutomationConfig {
            check_interval_hours: f64::NAN,
            ..AutomationConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn clock_time_parsing() {
        assert_eq!("09:30".parse::<ClockTime>().ok(), ClockTime::new(9, 30));
        assert_eq!("7:05".parse::<ClockTime>().ok(), ClockTime::new(7, 5));
        assert!("24:00".parse::<ClockTime>().is_err());
        assert!("12:60".parse::<ClockTime>().is_err());
        assert!("12".parse::<ClockTime>().is_err());
        assert!("12:5".parse::<ClockTime>().is_err());
    }

    #[test]
    fn posts_automatically_needs_both_flags() {
        let mut config = AutomationConfig::default();
        assert!(!config.posts_automatically());
        config.auto_post_enabled = true;
        assert!(!config.posts_automatically());
        config.require_manual_approval = false;
        assert!(config.posts_automatically());
    }

    #[test]
    fn weekend_gate() {
        let mut config = AutomationConfig::default();
        assert_eq!(config.schedule_gate(Timestamp::from(SATURDAY_2213)), None);
        config.weekend_enabled = false;
        assert_eq!(
            config.schedule_gate(Timestamp::from(SATURDAY_2213)),
            Some(ScheduleSkip::Weekend)
        );
        assert_eq!(config.schedule_gate(Timestamp::from(TUESDAY_2213)), None);
    }

    #[test]
    fn weekend_gate_respects_offset() {
        // Tuesday 22:13 UTC is already Wednesday in UTC+3, but Saturday
        // 22:13 UTC is Sunday 01:13 in UTC+3: still weekend.
        let config = AutomationConfig {
            weekend_enabled: false,
            utc_offset_minutes: 180,
            ..AutomationConfig::default()
        };
        assert_eq!(
            config.schedule_gate(Timestamp::from(SATURDAY_2213 + 3600)),
            Some(ScheduleSkip::Weekend)
        );
        // Sunday 22:13 UTC + 3h = Monday 01:13 local.
        assert_eq!(
            config.schedule_gate(Timestamp::from(SATURDAY_2213 + 24 * 3600)),
            None
        );
    }

    #[test]
    fn working_hours_gate() {
        let mut config = AutomationConfig {
            working_hours_only: true,
            ..AutomationConfig::default()
        };
        assert!(matches!(
            config.schedule_gate(Timestamp::from(TUESDAY_2213)),
            Some(ScheduleSkip::OutsideWorkingHours { .. })
        ));

        config.working_hours_end = ClockTime::new(22, 13).expect("valid");
        assert_eq!(config.schedule_gate(Timestamp::from(TUESDAY_2213)), None);

        config.working_hours_start = ClockTime::new(22, 0).expect("valid");
        config.working_hours_end = ClockTime::new(6, 0).expect("valid");
        assert_eq!(config.schedule_gate(Timestamp::from(TUESDAY_2213)), None);
        assert!(
            config
                .schedule_gate(Timestamp::from(TUESDAY_2213 - 10 * 3600))
                .is_some()
        );
    }
}
