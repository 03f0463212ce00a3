use crate::classify::{InternalNetwork, ProtocolTables, DEFAULT_TABLES};
use crate::errors::Error;
use crate::granularity::Granularity;

use chrono::FixedOffset;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use std::convert::TryFrom;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

pub const STORE_URI_VAR: &'static str = "NETFLOW_STORE_URI";
/// Largest accepted NETFLOW_LONG_FLOW_FACTOR.
pub const MAX_LONG_FLOW_FACTOR: u64 = u32::MAX as u64;

lazy_static! {
    static ref OFFSET_REGEX: Regex =
        Regex::new(r"^([+-])(\d{2})(?::?(\d{2}))?$").expect("Bad regex");
}

/// What the volume timeline does with flows lasting longer than the
/// long-flow bound.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LongFlowPolicy {
    /// Long flows are left out of the volume timeline.
    Exclude,
    /// Long flow bytes are spread over the buckets they span.
    Apportion,
}

impl Default for LongFlowPolicy {
    fn default() -> Self {
        Self::Exclude
    }
}

impl FromStr for LongFlowPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exclude" => Ok(Self::Exclude),
            "apportion" => Ok(Self::Apportion),
            _ => Err(Error::configuration(format!("Unknown long flow policy: {}", s))),
        }
    }
}

/// Configuration options for the flow statistics
#[derive(Clone, Debug)]
pub struct Config {
    /// Connection URI of the flow store, required. Read from NETFLOW_STORE_URI
    pub store_uri: Option<String>,
    /// Database holding the flow collection, defaults to netflow_db
    pub database: String,
    /// Collection of flow records, defaults to netflow_records
    pub collection: String,
    /// Wall clock offset buckets are aligned to, defaults to +02:00
    pub utc_offset: FixedOffset,
    /// Addresses treated as internal when classifying direction, defaults to 10.0.1.*
    pub internal_network: InternalNetwork,
    /// Flows lasting `bucket seconds * factor` milliseconds or more are long flows
    pub long_flow_factor: u64,
    /// Handling of long flows in the volume timeline
    pub long_flow_policy: LongFlowPolicy,
    /// JSON file replacing the built-in protocol tables
    pub protocol_tables: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            store_uri: std::env::var(STORE_URI_VAR).ok(),
            database: String::from("netflow_db"),
            collection: String::from("netflow_records"),
            utc_offset: FixedOffset::east_opt(2 * 3600).expect("Bad offset"),
            internal_network: InternalNetwork::default(),
            long_flow_factor: 200,
            long_flow_policy: LongFlowPolicy::Exclude,
            protocol_tables: None,
        }
    }
}

impl Config {
    /// Builds the configuration from the process environment.
    ///
    /// Fails when NETFLOW_STORE_URI is missing or an override is malformed.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_vars(|k| std::env::var(k).ok())
    }

    pub fn from_vars<F>(var: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store_uri = var(STORE_URI_VAR)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::configuration(format!("{} is not set", STORE_URI_VAR)))?;

        let mut config = Config {
            store_uri: Some(store_uri),
            ..Config::default()
        };
        if let Some(v) = var("NETFLOW_DATABASE") {
            config.database = v;
        }
        if let Some(v) = var("NETFLOW_COLLECTION") {
            config.collection = v;
        }
        if let Some(v) = var("NETFLOW_UTC_OFFSET") {
            config.utc_offset = parse_offset(&v)?;
        }
        if let Some(v) = var("NETFLOW_INTERNAL_PREFIX") {
            config.internal_network = InternalNetwork::new(v)?;
        }
        if let Some(v) = var("NETFLOW_LONG_FLOW_FACTOR") {
            let factor: u64 = v.parse().map_err(|e| {
                Error::configuration(format!("NETFLOW_LONG_FLOW_FACTOR={}: {}", v, e))
            })?;
            if factor > MAX_LONG_FLOW_FACTOR {
                return Err(Error::configuration(format!(
                    "NETFLOW_LONG_FLOW_FACTOR={} exceeds {}",
                    v, MAX_LONG_FLOW_FACTOR
                )));
            }
            config.long_flow_factor = factor;
        }
        if let Some(v) = var("NETFLOW_LONG_FLOWS") {
            config.long_flow_policy = v.parse()?;
        }
        if let Some(v) = var("NETFLOW_PROTOCOL_TABLES") {
            config.protocol_tables = Some(PathBuf::from(v));
        }
        debug!("Configuration from environment: {:?}", config);
        Ok(config)
    }

    /// Flows with `|LAST_SWITCHED - FIRST_SWITCHED|` at or above this are long.
    /// Saturates at `i64::MAX`.
    pub fn long_flow_bound(&self, granularity: Granularity) -> i64 {
        let factor = i64::try_from(self.long_flow_factor).unwrap_or(i64::MAX);
        (granularity.describe().minutes as i64 * 60).saturating_mul(factor)
    }

    pub fn load_protocol_tables(&self) -> Result<Arc<ProtocolTables>, Error> {
        match self.protocol_tables {
            Some(ref path) => ProtocolTables::from_path(path).map(Arc::new),
            None => Ok(DEFAULT_TABLES.clone()),
        }
    }
}

/// Parses `+HH:MM`, `-HHMM` or `+HH`.
pub fn parse_offset(s: &str) -> Result<FixedOffset, Error> {
    let invalid = || Error::configuration(format!("Invalid utc offset: {}", s));
    let caps = OFFSET_REGEX.captures(s.trim()).ok_or_else(invalid)?;
    let hours: i32 = caps[2].parse().map_err(|_| invalid())?;
    let minutes: i32 = match caps.get(3) {
        Some(m) => m.as_str().parse().map_err(|_| invalid())?,
        None => 0,
    };
    if minutes >= 60 {
        return Err(invalid());
    }
    let seconds = (hours * 3600 + minutes * 60) * if &caps[1] == "-" { -1 } else { 1 };
    FixedOffset::east_opt(seconds).ok_or_else(invalid)
}
