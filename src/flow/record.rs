use crate::document::{Datum, Document};
use crate::errors::Error;
use crate::flow::date_format;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

/// Document field names of a stored flow record.
pub mod fields {
    pub const TIMESTAMP: &'static str = "timestamp";
    pub const FIRST_SWITCHED: &'static str = "FIRST_SWITCHED";
    pub const LAST_SWITCHED: &'static str = "LAST_SWITCHED";
    pub const IN_BYTES: &'static str = "IN_BYTES";
    pub const IN_PKTS: &'static str = "IN_PKTS";
    pub const OUT_BYTES: &'static str = "OUT_BYTES";
    pub const OUT_PKTS: &'static str = "OUT_PKTS";
    pub const PROTOCOL: &'static str = "PROTOCOL";
    pub const L4_SRC_PORT: &'static str = "L4_SRC_PORT";
    pub const L4_DST_PORT: &'static str = "L4_DST_PORT";
    pub const IPV4_SRC_ADDR: &'static str = "IPV4_SRC_ADDR";
    pub const IPV4_DST_ADDR: &'static str = "IPV4_DST_ADDR";
    pub const IPV6_SRC_ADDR: &'static str = "IPV6_SRC_ADDR";
    pub const IPV6_DST_ADDR: &'static str = "IPV6_DST_ADDR";

    /// Every address field, source before destination.
    pub const ADDRESSES: [&'static str; 4] =
        [IPV4_SRC_ADDR, IPV4_DST_ADDR, IPV6_SRC_ADDR, IPV6_DST_ADDR];
}

/// One exported NetFlow record as the collector stores it.
///
/// FIRST_SWITCHED and LAST_SWITCHED are exporter uptime in milliseconds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct FlowRecord {
    #[serde(rename = "timestamp", with = "date_format")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_switched: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_switched: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_pkts: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_pkts: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l4_src_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l4_dst_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_src_addr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_dst_addr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6_src_addr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6_dst_addr: Option<String>,
}

impl FlowRecord {
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        FlowRecord {
            timestamp,
            ..FlowRecord::default()
        }
    }

    /// Document form handed to an executor. Absent fields stay absent.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert(fields::TIMESTAMP.into(), Datum::Date(self.timestamp));

        let ints = [
            (fields::FIRST_SWITCHED, self.first_switched),
            (fields::LAST_SWITCHED, self.last_switched),
            (fields::PROTOCOL, self.protocol.map(i64::from)),
            (fields::L4_SRC_PORT, self.l4_src_port.map(i64::from)),
            (fields::L4_DST_PORT, self.l4_dst_port.map(i64::from)),
        ];
        for (name, value) in ints.iter() {
            if let Some(v) = value {
                doc.insert((*name).into(), Datum::Int(*v));
            }
        }

        let counters = [
            (fields::IN_BYTES, self.in_bytes),
            (fields::IN_PKTS, self.in_pkts),
            (fields::OUT_BYTES, self.out_bytes),
            (fields::OUT_PKTS, self.out_pkts),
        ];
        for (name, value) in counters.iter() {
            if let Some(v) = value {
                doc.insert((*name).into(), Datum::from(*v));
            }
        }

        let addresses = [
            (fields::IPV4_SRC_ADDR, &self.ipv4_src_addr),
            (fields::IPV4_DST_ADDR, &self.ipv4_dst_addr),
            (fields::IPV6_SRC_ADDR, &self.ipv6_src_addr),
            (fields::IPV6_DST_ADDR, &self.ipv6_dst_addr),
        ];
        for (name, value) in addresses.iter() {
            if let Some(v) = value {
                doc.insert((*name).into(), Datum::Str(v.clone()));
            }
        }

        doc
    }
}

impl TryFrom<&[u8]> for FlowRecord {
    type Error = Error;
    fn try_from(v: &[u8]) -> Result<Self, Self::Error> {
        log::trace!("Deserializing {}", String::from_utf8_lossy(v));
        serde_json::from_slice(v).map_err(|e| {
            log::debug!("Failed to deserialize: {}", String::from_utf8_lossy(v));
            Error::from(e)
        })
    }
}
