//! Dashboard aggregations over the flow collection.
//!
//! Each query module exposes a pure `pipeline` builder and a `reshape` step
//! turning executor rows into typed results. [`FlowStats`] ties them to a
//! [`QueryExecutor`].
pub mod direction;
pub mod protocol_stats;
pub mod timeline;
pub mod top_talkers;

use crate::classify::ProtocolTables;
use crate::config::{Config, LongFlowPolicy};
use crate::document::Document;
use crate::errors::Error;
use crate::flow::fields;
use crate::granularity::Granularity;
use crate::pipeline::{Expr, Pipeline};
use crate::store::QueryExecutor;

use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::str::FromStr;
use std::sync::Arc;

/// Measurement basis of an aggregate.
///
/// `Count` means flows in protocol stats and packets everywhere else.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Metric {
    Volume,
    Count,
}

impl Metric {
    /// Raw field summed by the directional and top talker queries.
    pub fn field(&self) -> &'static str {
        match self {
            Metric::Volume => fields::IN_BYTES,
            Metric::Count => fields::IN_PKTS,
        }
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "volume" | "bytes" => Ok(Metric::Volume),
            "count" | "packets" => Ok(Metric::Count),
            _ => Err(Error::InvalidMetric(s.to_owned())),
        }
    }
}

/// Protocol layer a distribution is computed over.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ProtocolType {
    /// IP protocol numbers
    Transport,
    /// Well-known ports
    Application,
}

impl TryFrom<String> for Metric {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl FromStr for ProtocolType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transport" | "low" => Ok(ProtocolType::Transport),
            "application" | "app" => Ok(ProtocolType::Application),
            _ => Err(Error::InvalidProtocolType(s.to_owned())),
        }
    }
}

impl TryFrom<String> for ProtocolType {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProtocolShare {
    pub label: String,
    pub value: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TimePoint {
    pub time: DateTime<Utc>,
    pub amount: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DirectionalPoint {
    pub time: DateTime<Utc>,
    pub inbound: u64,
    pub outbound: u64,
    pub internal: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Talker {
    pub address: String,
    pub amount: u64,
}

/// `timestamp` within `[start, end]`, both ends inclusive.
pub(crate) fn within(start: DateTime<Utc>, end: DateTime<Utc>) -> Expr {
    Expr::And(vec![
        Expr::field(fields::TIMESTAMP).gte(Expr::lit(start)),
        Expr::field(fields::TIMESTAMP).lte(Expr::lit(end)),
    ])
}

/// Runs the dashboard queries against one store handle.
///
/// Queries share nothing but the handle and the read-only tables, so any
/// number of them may be in flight at once.
pub struct FlowStats<E> {
    executor: E,
    config: Config,
    tables: Arc<ProtocolTables>,
}

impl<E: QueryExecutor> FlowStats<E> {
    /// Loads the protocol tables named by `config` and wraps `executor`.
    pub fn new(executor: E, config: Config) -> Result<Self, Error> {
        let tables = config.load_protocol_tables()?;
        Ok(Self::with_tables(executor, config, tables))
    }

    pub fn with_tables(executor: E, config: Config, tables: Arc<ProtocolTables>) -> Self {
        FlowStats {
            executor,
            config,
            tables,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tables(&self) -> &ProtocolTables {
        &self.tables
    }

    pub fn into_executor(self) -> E {
        self.executor
    }

    async fn submit(&self, name: &str, pipeline: Pipeline) -> Result<Vec<Document>, Error> {
        debug!(
            "{} on {}.{}: {}",
            name,
            self.config.database,
            self.config.collection,
            pipeline.to_json()
        );
        let rows = self
            .executor
            .aggregate(&self.config.collection, &pipeline)
            .await?;
        debug!("{} returned {} rows", name, rows.len());
        Ok(rows)
    }

    /// Traffic share per protocol label, sorted by label.
    ///
    /// The window defaults to everything from the epoch until now.
    pub async fn protocol_stats(
        &self,
        kind: ProtocolType,
        metric: Metric,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<ProtocolShare>, Error> {
        let start = start.unwrap_or_else(|| DateTime::<Utc>::from(std::time::UNIX_EPOCH));
        let end = end.unwrap_or_else(Utc::now);
        let pipeline = protocol_stats::pipeline(&self.tables, kind, metric, start, end);
        let rows = self.submit("protocol_stats", pipeline).await?;
        protocol_stats::reshape(rows)
    }

    /// Short flows per bucket over all history.
    pub async fn aggregated_count(&self, granularity: Granularity) -> Result<Vec<TimePoint>, Error> {
        let pipeline = timeline::pipeline(&self.config, granularity, timeline::Measure::Flows);
        let rows = self.submit("aggregated_count", pipeline).await?;
        timeline::reshape(rows)
    }

    /// Short flow bytes per bucket over all history.
    ///
    /// With [`LongFlowPolicy::Apportion`] the bytes of long flows are spread
    /// over the buckets they span as well.
    pub async fn aggregated_volume(&self, granularity: Granularity) -> Result<Vec<TimePoint>, Error> {
        let pipeline = timeline::pipeline(&self.config, granularity, timeline::Measure::Bytes);
        let rows = self.submit("aggregated_volume", pipeline).await?;
        let points = timeline::reshape(rows)?;

        match self.config.long_flow_policy {
            LongFlowPolicy::Exclude => Ok(points),
            LongFlowPolicy::Apportion => {
                let pipeline = timeline::long_flows(&self.config, granularity);
                let long = self.submit("long_flows", pipeline).await?;
                timeline::apportion(points, &long, granularity, self.config.utc_offset)
            }
        }
    }

    /// Inbound, outbound and internal traffic per bucket within `[start, end]`.
    ///
    /// A non-empty `address` keeps only flows where it appears in any address field.
    pub async fn volume_over_time(
        &self,
        granularity: Granularity,
        metric: Metric,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        address: Option<&str>,
    ) -> Result<Vec<DirectionalPoint>, Error> {
        let address = address.filter(|a| !a.is_empty());
        let pipeline = direction::pipeline(&self.config, granularity, metric, start, end, address);
        let rows = self.submit("volume_over_time", pipeline).await?;
        direction::reshape(rows)
    }

    /// The `n` busiest addresses within `[start, end]`.
    pub async fn top_talkers(
        &self,
        n: usize,
        metric: Metric,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Talker>, Error> {
        if n == 0 {
            return Ok(vec![]);
        }
        let pipeline = top_talkers::pipeline(n, metric, start, end);
        let rows = self.submit("top_talkers", pipeline).await?;
        top_talkers::reshape(rows)
    }
}
