//! Flow counts and volume per bucket over all history.
//!
//! Only short flows are bucketed by the store: a flow lasting at least
//! [`Config::long_flow_bound`] would be misplaced by its single timestamp.
use crate::bucket;
use crate::config::Config;
use crate::document::{Document, RowExt};
use crate::errors::Error;
use crate::flow::fields;
use crate::granularity::Granularity;
use crate::pipeline::{Accumulator, Expr, Pipeline, SortOrder, Stage};
use crate::query::TimePoint;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use log::*;
use std::collections::BTreeMap;

pub const BUCKET: &'static str = "truncatedTime";
pub const DURATION: &'static str = "duration";

/// Longest flow apportioned: FIRST/LAST_SWITCHED are 32 bit uptime milliseconds.
pub const MAX_SPAN_MS: u64 = u32::MAX as u64;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Measure {
    Flows,
    Bytes,
}

fn duration() -> Expr {
    Expr::field(fields::FIRST_SWITCHED)
        .minus(Expr::field(fields::LAST_SWITCHED))
        .abs()
}

/// Buckets the short flows and counts them or sums their `IN_BYTES`.
///
/// Flows missing either switched field have a null duration and count as short.
pub fn pipeline(config: &Config, granularity: Granularity, measure: Measure) -> Pipeline {
    let amount = match measure {
        Measure::Flows => Accumulator::Count,
        Measure::Bytes => Accumulator::Sum(Expr::field(fields::IN_BYTES)),
    };
    Pipeline::new()
        .stage(Stage::Match(
            duration().lt(Expr::lit(config.long_flow_bound(granularity))),
        ))
        .stage(Stage::AddFields(vec![(
            BUCKET.to_owned(),
            Expr::field(fields::TIMESTAMP).date_trunc(granularity, config.utc_offset),
        )]))
        .stage(Stage::Group {
            id: Expr::field(BUCKET),
            fields: vec![("amount".to_owned(), amount)],
        })
        .stage(Stage::Sort(vec![("_id".to_owned(), SortOrder::Ascending)]))
}

/// The long flows themselves, each with its [`DURATION`] in milliseconds.
pub fn long_flows(config: &Config, granularity: Granularity) -> Pipeline {
    Pipeline::new()
        .stage(Stage::Match(
            duration().gte(Expr::lit(config.long_flow_bound(granularity))),
        ))
        .stage(Stage::AddFields(vec![(DURATION.to_owned(), duration())]))
}

pub fn reshape(rows: Vec<Document>) -> Result<Vec<TimePoint>, Error> {
    rows.iter()
        .map(|row| {
            Ok(TimePoint {
                time: row.date("_id")?,
                amount: row.amount("amount")?,
            })
        })
        .collect()
}

/// Folds the bytes of long flows into `points`.
///
/// A flow covers `[truncate(timestamp), truncate(timestamp) + duration)`;
/// each bucket it overlaps gets bytes in proportion to the overlap and the
/// last one takes the rounding remainder.
pub fn apportion(
    points: Vec<TimePoint>,
    long: &[Document],
    granularity: Granularity,
    offset: FixedOffset,
) -> Result<Vec<TimePoint>, Error> {
    let mut buckets: BTreeMap<DateTime<Utc>, u64> =
        points.into_iter().map(|p| (p.time, p.amount)).collect();

    let mut skipped = 0;
    for row in long {
        let bytes = row.amount(fields::IN_BYTES)?;
        let millis = row.amount(DURATION)?;
        if millis > MAX_SPAN_MS {
            warn!("Not apportioning flow lasting {}ms, past the exporter uptime range", millis);
            skipped += 1;
            continue;
        }
        let duration = Duration::milliseconds(millis as i64);
        let start = bucket::truncate(row.date(fields::TIMESTAMP)?, granularity, offset);
        for (time, share) in spread(bytes, start, duration, granularity, offset)? {
            *buckets.entry(time).or_insert(0) += share;
        }
    }
    debug!("Apportioned {} long flows", long.len() - skipped);

    Ok(buckets
        .into_iter()
        .map(|(time, amount)| TimePoint { time, amount })
        .collect())
}

fn spread(
    bytes: u64,
    start: DateTime<Utc>,
    duration: Duration,
    granularity: Granularity,
    offset: FixedOffset,
) -> Result<Vec<(DateTime<Utc>, u64)>, Error> {
    let total = duration.num_milliseconds();
    if total <= 0 {
        return Ok(vec![(start, bytes)]);
    }
    let end = start
        .checked_add_signed(duration)
        .ok_or_else(|| Error::UnexpectedRow {
            field: DURATION.to_owned(),
            msg: format!("{}ms from {} is out of range", total, start),
        })?;
    let width = granularity.describe().bucket_width();
    let spanned: Vec<DateTime<Utc>> = bucket::spanned(start, end, granularity, offset).collect();

    let mut given = 0u64;
    let mut shares = Vec::with_capacity(spanned.len());
    for (i, time) in spanned.iter().enumerate() {
        let share = if i + 1 == spanned.len() {
            bytes - given
        } else {
            let bucket_end = time.checked_add_signed(width).unwrap_or(end);
            let overlap = (std::cmp::min(bucket_end, end) - std::cmp::max(*time, start))
                .num_milliseconds()
                .max(0);
            (bytes as u128 * overlap as u128 / total as u128) as u64
        };
        given += share;
        shares.push((*time, share));
    }
    Ok(shares)
}
