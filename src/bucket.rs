//! Bucket arithmetic shared by every time-series query.
//!
//! This is the only place a timestamp is mapped to its bucket. The pushed-down
//! `$dateTrunc` expression evaluates through [`truncate`] as well, so the
//! in-store grouping and the client-side apportionment cannot disagree.
use crate::granularity::Granularity;

use chrono::{DateTime, Duration, FixedOffset, Utc};

/// Start of the bucket enclosing `ts`, measured on the wall clock at `offset`.
///
/// Every bucket width in the catalog divides a day, so flooring the local
/// epoch seconds gives the same result as zeroing the clock fields:
/// 1m zeroes seconds, 5m/30m floor the minute, 1h zeroes the minute, 12h
/// floors the hour, 1d zeroes the hour.
pub fn truncate(ts: DateTime<Utc>, granularity: Granularity, offset: FixedOffset) -> DateTime<Utc> {
    let width = granularity.describe().minutes as i64 * 60;
    let local = ts.timestamp() + offset.local_minus_utc() as i64;
    let into_bucket = local.rem_euclid(width);
    ts - Duration::seconds(into_bucket) - Duration::nanoseconds(ts.timestamp_subsec_nanos() as i64)
}

/// Bucket starts whose buckets overlap `[start, end)`.
pub fn spanned(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    granularity: Granularity,
    offset: FixedOffset,
) -> impl Iterator<Item = DateTime<Utc>> {
    let width = granularity.describe().bucket_width();
    let first = truncate(start, granularity, offset);
    let mut next = Some(first);
    std::iter::from_fn(move || match next {
        Some(current) if current < end || current == first => {
            next = current.checked_add_signed(width);
            Some(current)
        }
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn plus_two() -> FixedOffset {
        FixedOffset::east_opt(2 * 3600).unwrap()
    }

    #[test]
    fn truncates_each_granularity() {
        let ts = Utc
            .with_ymd_and_hms(2024, 3, 14, 15, 47, 33)
            .unwrap()
            .with_nanosecond(250_000_000)
            .unwrap();

        let expect = |h, m| Utc.with_ymd_and_hms(2024, 3, 14, h, m, 0).unwrap();

        assert_eq!(truncate(ts, Granularity::OneMinute, utc()), expect(15, 47));
        assert_eq!(truncate(ts, Granularity::FiveMinutes, utc()), expect(15, 45));
        assert_eq!(truncate(ts, Granularity::ThirtyMinutes, utc()), expect(15, 30));
        assert_eq!(truncate(ts, Granularity::OneHour, utc()), expect(15, 0));
        assert_eq!(truncate(ts, Granularity::TwelveHours, utc()), expect(12, 0));
        assert_eq!(truncate(ts, Granularity::OneDay, utc()), expect(0, 0));
    }

    #[test]
    fn day_and_half_day_follow_local_clock() {
        // 00:02Z is 02:02 at +02:00, local midnight is 22:00Z the day before
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 2, 0).unwrap();
        assert_eq!(
            truncate(ts, Granularity::OneDay, plus_two()),
            Utc.with_ymd_and_hms(2023, 12, 31, 22, 0, 0).unwrap()
        );
        assert_eq!(
            truncate(ts, Granularity::TwelveHours, plus_two()),
            Utc.with_ymd_and_hms(2023, 12, 31, 22, 0, 0).unwrap()
        );
        assert_eq!(
            truncate(ts, Granularity::FiveMinutes, plus_two()),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn half_hour_offsets_shift_hour_buckets() {
        let india = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 10, 10, 0).unwrap();
        // 15:40 local, hour starts at 15:00 local == 09:30Z
        assert_eq!(
            truncate(ts, Granularity::OneHour, india),
            Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap()
        );
    }

    #[test]
    fn truncation_is_idempotent_and_bounded() {
        let base = Utc.with_ymd_and_hms(1999, 12, 31, 23, 0, 0).unwrap();
        for step in 0..500i64 {
            let ts = base + Duration::seconds(step * 7919);
            for g in Granularity::ALL.iter() {
                for off in [utc(), plus_two(), FixedOffset::west_opt(5 * 3600).unwrap()].iter() {
                    let b = truncate(ts, *g, *off);
                    assert_eq!(truncate(b, *g, *off), b);
                    assert!(b <= ts);
                    assert!(b > ts - g.describe().bucket_width());
                }
            }
        }
    }

    #[test]
    fn handles_times_before_epoch() {
        let ts = Utc.with_ymd_and_hms(1969, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(
            truncate(ts, Granularity::OneHour, utc()),
            Utc.with_ymd_and_hms(1969, 12, 31, 23, 0, 0).unwrap()
        );
    }

    #[test]
    fn spans_overlapping_buckets() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 7, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 0, 20, 0).unwrap();
        let buckets: Vec<_> = spanned(start, end, Granularity::FiveMinutes, utc())
            .map(|b| b.minute())
            .collect();
        assert_eq!(buckets, vec![5, 10, 15]);

        // Zero length still yields the enclosing bucket
        let buckets: Vec<_> = spanned(start, start, Granularity::FiveMinutes, utc()).collect();
        assert_eq!(buckets.len(), 1);

        // Stops at the last representable bucket
        let last = DateTime::<Utc>::MAX_UTC - Duration::minutes(3);
        let buckets: Vec<_> = spanned(last, DateTime::<Utc>::MAX_UTC, Granularity::OneDay, utc()).collect();
        assert_eq!(buckets, vec![truncate(last, Granularity::OneDay, utc())]);
    }
}
