//! Traffic distribution by protocol label.
use crate::classify::{ProtocolTables, OTHER};
use crate::document::{Document, RowExt};
use crate::errors::Error;
use crate::flow::fields;
use crate::pipeline::{Accumulator, Expr, Pipeline, SortOrder, Stage};
use crate::query::{within, Metric, ProtocolShare, ProtocolType};

use chrono::{DateTime, Utc};
use log::*;

pub const APP_PROTOCOL: &'static str = "app_protocol";
pub const PROTOCOL_NAME: &'static str = "protocol_name";

/// Groups the flows of `[start, end]` by protocol label.
///
/// Application labels leave out flows classified [`OTHER`]. Volume sums
/// `IN_BYTES`; count counts flows rather than packets.
pub fn pipeline(
    tables: &ProtocolTables,
    kind: ProtocolType,
    metric: Metric,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Pipeline {
    let (label, classifier) = match kind {
        ProtocolType::Transport => (PROTOCOL_NAME, tables.ip_expr()),
        ProtocolType::Application => (APP_PROTOCOL, tables.application_expr()),
    };
    let value = match metric {
        Metric::Volume => Accumulator::Sum(Expr::field(fields::IN_BYTES)),
        Metric::Count => Accumulator::Count,
    };

    let mut pipeline = Pipeline::new()
        .stage(Stage::Match(within(start, end)))
        .stage(Stage::AddFields(vec![(label.to_owned(), classifier)]));
    if kind == ProtocolType::Application {
        pipeline = pipeline.stage(Stage::Match(Expr::field(label).ne(Expr::lit(OTHER))));
    }
    pipeline
        .stage(Stage::Group {
            id: Expr::field(label),
            fields: vec![("value".to_owned(), value)],
        })
        .stage(Stage::Sort(vec![("_id".to_owned(), SortOrder::Ascending)]))
}

pub fn reshape(rows: Vec<Document>) -> Result<Vec<ProtocolShare>, Error> {
    rows.iter()
        .map(|row| {
            let share = ProtocolShare {
                label: row.string("_id")?,
                value: row.amount("value")?,
            };
            trace!("{:?}", share);
            Ok(share)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowRecord;
    use crate::pipeline::eval;
    use chrono::TimeZone;

    fn flow(minute: u32, dst_port: u16, protocol: u8, bytes: u64) -> FlowRecord {
        FlowRecord {
            l4_dst_port: Some(dst_port),
            protocol: Some(protocol),
            in_bytes: Some(bytes),
            ..FlowRecord::at(Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap())
        }
    }

    fn run(kind: ProtocolType, metric: Metric, flows: &[FlowRecord]) -> Vec<ProtocolShare> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 0, 30, 0).unwrap();
        let p = pipeline(&ProtocolTables::default(), kind, metric, start, end);
        let rows = eval::run(&p, flows.iter().map(|f| f.to_document())).expect("Failed to run");
        reshape(rows).expect("Failed to reshape")
    }

    #[test]
    fn sums_transport_volume_by_label() {
        let flows = vec![
            flow(1, 53, 17, 40),
            flow(2, 443, 6, 100),
            flow(3, 80, 6, 25),
            flow(4, 9999, 250, 7),
        ];
        let shares = run(ProtocolType::Transport, Metric::Volume, &flows);
        let labels: Vec<_> = shares.iter().map(|s| (s.label.as_str(), s.value)).collect();
        assert_eq!(labels, vec![("TCP", 125), ("UDP", 40), ("Unknown", 7)]);
    }

    #[test]
    fn counts_flows_not_packets() {
        let mut flows = vec![flow(1, 443, 6, 100), flow(2, 443, 6, 100)];
        flows[0].in_pkts = Some(50);
        let shares = run(ProtocolType::Application, Metric::Count, &flows);
        assert_eq!(
            shares,
            vec![ProtocolShare {
                label: "HTTPS".into(),
                value: 2
            }]
        );
    }

    #[test]
    fn application_stats_never_report_other() {
        let flows = vec![flow(1, 9999, 6, 10), flow(2, 53, 17, 5), flow(3, 12345, 6, 1)];
        let shares = run(ProtocolType::Application, Metric::Volume, &flows);
        assert!(shares.iter().all(|s| s.label != OTHER));
        assert_eq!(shares.len(), 1);
        assert_eq!(shares[0].label, "DNS");
    }

    #[test]
    fn window_is_inclusive() {
        let flows = vec![flow(0, 53, 17, 1), flow(30, 53, 17, 2), flow(31, 53, 17, 4)];
        let shares = run(ProtocolType::Transport, Metric::Volume, &flows);
        assert_eq!(shares[0].value, 3);
    }
}
