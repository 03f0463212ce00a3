//! # netflow-stats
//!
//! Time-bucketed, protocol and direction classified aggregates of NetFlow
//! records, shaped for dashboard charts.
//!
//! ```rust,no_run
//! # use netflow_stats::prelude::*;
//! # use chrono::{Duration, Utc};
//!
//! fn main() {
//!     let config = Config::from_env().expect("Invalid configuration");
//!
//!     smol::block_on(async move {
//!         let store = store::connect(&config).await.expect("Failed to connect");
//!         let stats = FlowStats::new(store, config).expect("Failed to load protocol tables");
//!
//!         let end = Utc::now();
//!         let start = end - Duration::hours(1);
//!         let (talkers, volume) = futures::future::join(
//!             stats.top_talkers(10, Metric::Volume, start, end),
//!             stats.aggregated_volume(Granularity::FiveMinutes),
//!         )
//!         .await;
//!
//!         for t in talkers.expect("Failed to rank talkers") {
//!             println!("{} {}", t.address, t.amount);
//!         }
//!         for p in volume.expect("Failed to aggregate volume") {
//!             println!("{} {}", p.time, p.amount);
//!         }
//!     })
//! }
//! ```
#![deny(unused_must_use, unused_imports, bare_trait_objects)]
pub mod bucket;
pub mod classify;
pub mod config;
pub mod document;
mod errors;
pub mod flow;
pub mod granularity;
pub mod pipeline;
pub mod query;
pub mod store;

pub mod prelude {
    pub use super::classify::{Direction, InternalNetwork, ProtocolTables};
    pub use super::config::{Config, LongFlowPolicy};
    pub use super::errors::Error;
    pub use super::flow::{FlowReader, FlowRecord};
    pub use super::granularity::{Granularity, GranularityDescriptor, TimeUnit};
    pub use super::query::{
        DirectionalPoint, FlowStats, Metric, ProtocolShare, ProtocolType, Talker, TimePoint,
    };
    pub use super::store::{self, MemoryStore, QueryExecutor};

    pub use chrono;
}
