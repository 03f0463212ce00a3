//! Busiest addresses within a window.
use crate::document::{Datum, Document, RowExt};
use crate::errors::Error;
use crate::flow::fields;
use crate::pipeline::{Accumulator, Expr, Pipeline, SortOrder, Stage};
use crate::query::{within, Metric, Talker};

use chrono::{DateTime, Utc};

pub const ADDRESS: &'static str = "address";

/// Sums `metric` per address. A flow counts towards every address it carries,
/// so source and destination are both credited.
///
/// `n` must be positive; the store rejects a zero limit.
pub fn pipeline(n: usize, metric: Metric, start: DateTime<Utc>, end: DateTime<Utc>) -> Pipeline {
    let addresses = fields::ADDRESSES.iter().map(|f| Expr::field(*f)).collect();
    Pipeline::new()
        .stage(Stage::Match(within(start, end)))
        .stage(Stage::AddFields(vec![(ADDRESS.to_owned(), Expr::Array(addresses))]))
        .stage(Stage::Unwind(ADDRESS.to_owned()))
        .stage(Stage::Match(Expr::field(ADDRESS).ne(Expr::lit(Datum::Null))))
        .stage(Stage::Group {
            id: Expr::field(ADDRESS),
            fields: vec![("amount".to_owned(), Accumulator::Sum(Expr::field(metric.field())))],
        })
        .stage(Stage::Sort(vec![
            ("amount".to_owned(), SortOrder::Descending),
            ("_id".to_owned(), SortOrder::Ascending),
        ]))
        .stage(Stage::Limit(n))
}

pub fn reshape(rows: Vec<Document>) -> Result<Vec<Talker>, Error> {
    rows.iter()
        .map(|row| {
            Ok(Talker {
                address: row.string("_id")?,
                amount: row.amount("amount")?,
            })
        })
        .collect()
}
