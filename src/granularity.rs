use crate::errors::Error;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::str::FromStr;

/// Calendar unit a bucket width is expressed in.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    pub fn minutes(&self) -> u32 {
        match self {
            TimeUnit::Minute => 1,
            TimeUnit::Hour => 60,
            TimeUnit::Day => 1440,
        }
    }
}

impl std::fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeUnit::Minute => write!(f, "minute"),
            TimeUnit::Hour => write!(f, "hour"),
            TimeUnit::Day => write!(f, "day"),
        }
    }
}

/// Bucket geometry for one granularity.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GranularityDescriptor {
    pub unit: TimeUnit,
    pub bin_size: u32,
    /// `bin_size` expressed in minutes
    pub minutes: u32,
    /// Largest number of buckets a query window should span
    pub max_span: u32,
}

impl GranularityDescriptor {
    pub fn bucket_width(&self) -> Duration {
        Duration::minutes(self.minutes as i64)
    }

    /// Widest window allowed for this granularity, `minutes * max_span`.
    pub fn max_window(&self) -> Duration {
        Duration::minutes(self.minutes as i64 * self.max_span as i64)
    }
}

/// Supported bucket widths.
///
/// Deserializes through [`FromStr`], so unknown tokens are `InvalidGranularity`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Granularity {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl Granularity {
    pub const ALL: [Granularity; 6] = [
        Granularity::OneMinute,
        Granularity::FiveMinutes,
        Granularity::ThirtyMinutes,
        Granularity::OneHour,
        Granularity::TwelveHours,
        Granularity::OneDay,
    ];

    pub fn describe(&self) -> GranularityDescriptor {
        let (unit, bin_size, max_span) = match self {
            Granularity::OneMinute => (TimeUnit::Minute, 1, 120),
            Granularity::FiveMinutes => (TimeUnit::Minute, 5, 144),
            Granularity::ThirtyMinutes => (TimeUnit::Minute, 30, 48),
            Granularity::OneHour => (TimeUnit::Hour, 1, 48),
            Granularity::TwelveHours => (TimeUnit::Hour, 12, 60),
            Granularity::OneDay => (TimeUnit::Day, 1, 120),
        };
        GranularityDescriptor {
            unit,
            bin_size,
            minutes: bin_size * unit.minutes(),
            max_span,
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            Granularity::OneMinute => "1m",
            Granularity::FiveMinutes => "5m",
            Granularity::ThirtyMinutes => "30m",
            Granularity::OneHour => "1h",
            Granularity::TwelveHours => "12h",
            Granularity::OneDay => "1d",
        }
    }

    /// Default chart window ending at `now`, `max_span - 1` buckets wide.
    pub fn default_window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let d = self.describe();
        let span = Duration::minutes(d.minutes as i64 * (d.max_span as i64 - 1));
        (now - span, now)
    }

    /// Pulls `end` back so that `[start, end]` never exceeds the window cap.
    ///
    /// An `end` before `start` snaps to `start`. A window wider than
    /// `minutes * max_span` is shortened to `max_span - 1` buckets.
    pub fn clamp_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> (DateTime<Utc>, DateTime<Utc>) {
        let d = self.describe();
        if end < start {
            (start, start)
        } else if end - start > d.max_window() {
            let span = Duration::minutes(d.minutes as i64 * (d.max_span as i64 - 1));
            (start, start + span)
        } else {
            (start, end)
        }
    }
}

impl FromStr for Granularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Granularity::ALL
            .iter()
            .find(|g| g.token() == s)
            .cloned()
            .ok_or_else(|| Error::InvalidGranularity(s.to_owned()))
    }
}

impl TryFrom<String> for Granularity {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// Looks up the descriptor for a granularity token such as `"5m"`.
pub fn describe(token: &str) -> Result<GranularityDescriptor, Error> {
    token.parse::<Granularity>().map(|g| g.describe())
}
