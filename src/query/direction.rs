//! Inbound, outbound and internal traffic per bucket.
use crate::classify::Direction;
use crate::config::Config;
use crate::document::{Document, RowExt};
use crate::errors::Error;
use crate::flow::fields;
use crate::granularity::Granularity;
use crate::pipeline::{Accumulator, Expr, Pipeline, SortOrder, Stage};
use crate::query::{within, DirectionalPoint, Metric};

use chrono::{DateTime, Utc};

pub const DIRECTION: &'static str = "direction";
pub const BUCKET: &'static str = "truncatedTime";

const SERIES: [Direction; 3] = [Direction::Inbound, Direction::Outbound, Direction::Internal];

pub fn pipeline(
    config: &Config,
    granularity: Granularity,
    metric: Metric,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    address: Option<&str>,
) -> Pipeline {
    let mut pipeline = Pipeline::new().stage(Stage::Match(within(start, end)));
    if let Some(address) = address {
        let any = fields::ADDRESSES
            .iter()
            .map(|f| Expr::field(*f).eq(Expr::lit(address)))
            .collect();
        pipeline = pipeline.stage(Stage::Match(Expr::Or(any)));
    }

    let sums = SERIES
        .iter()
        .map(|d| {
            let value = Expr::cond(
                Expr::field(DIRECTION).eq(Expr::lit(d.label())),
                Expr::field(metric.field()),
                Expr::lit(0i64),
            );
            (d.label().to_owned(), Accumulator::Sum(value))
        })
        .collect();

    pipeline
        .stage(Stage::AddFields(vec![
            (DIRECTION.to_owned(), config.internal_network.direction_expr()),
            (
                BUCKET.to_owned(),
                Expr::field(fields::TIMESTAMP).date_trunc(granularity, config.utc_offset),
            ),
        ]))
        .stage(Stage::Match(
            Expr::field(DIRECTION).ne(Expr::lit(Direction::External.label())),
        ))
        .stage(Stage::Group {
            id: Expr::field(BUCKET),
            fields: sums,
        })
        .stage(Stage::Sort(vec![("_id".to_owned(), SortOrder::Ascending)]))
}

pub fn reshape(rows: Vec<Document>) -> Result<Vec<DirectionalPoint>, Error> {
    rows.iter()
        .map(|row| {
            Ok(DirectionalPoint {
                time: row.date("_id")?,
                inbound: row.amount(Direction::Inbound.label())?,
                outbound: row.amount(Direction::Outbound.label())?,
                internal: row.amount(Direction::Internal.label())?,
            })
        })
        .collect()
}
