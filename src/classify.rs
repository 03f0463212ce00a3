//! Protocol and direction classification.
//!
//! The classifier tables are plain data: loaded once, shared read-only, and
//! used both for client-side classification and to build pushed-down
//! expressions.
use crate::document::Datum;
use crate::errors::Error;
use crate::flow::fields;
use crate::pipeline::Expr;

use lazy_static::lazy_static;
use log::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

pub const OTHER: &'static str = "Other";
pub const UNKNOWN: &'static str = "Unknown";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApplicationProtocol {
    pub name: String,
    pub ports: Vec<u16>,
}

/// Application table (ordered, first match wins) and IP protocol names.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProtocolTables {
    pub application: Vec<ApplicationProtocol>,
    pub ip: BTreeMap<u8, String>,
}

fn app(name: &str, ports: &[u16]) -> ApplicationProtocol {
    ApplicationProtocol {
        name: name.to_owned(),
        ports: ports.to_vec(),
    }
}

lazy_static! {
    pub static ref DEFAULT_TABLES: Arc<ProtocolTables> = Arc::new(ProtocolTables {
        application: vec![
            app("HTTP", &[80, 8080]),
            app("HTTPS", &[443, 8443]),
            app("DNS", &[53]),
            app("SSH", &[22]),
            app("FTP", &[20, 21]),
            app("SMTP", &[25, 465, 587]),
            app("POP3", &[110, 995]),
            app("IMAP", &[143, 993]),
            app("NTP", &[123]),
            app("DHCP", &[67, 68]),
            app("SNMP", &[161, 162]),
            app("Telnet", &[23]),
            app("LDAP", &[389, 636]),
            app("SMB", &[445]),
            app("RDP", &[3389]),
            app("MySQL", &[3306]),
            app("PostgreSQL", &[5432]),
        ],
        ip: [
            (1, "ICMP"),
            (2, "IGMP"),
            (6, "TCP"),
            (17, "UDP"),
            (41, "IPv6"),
            (47, "GRE"),
            (50, "ESP"),
            (51, "AH"),
            (58, "ICMPv6"),
            (89, "OSPF"),
            (132, "SCTP"),
        ]
        .iter()
        .map(|(k, v)| (*k, (*v).to_owned()))
        .collect(),
    });
}

impl Default for ProtocolTables {
    fn default() -> Self {
        (**DEFAULT_TABLES).clone()
    }
}

impl ProtocolTables {
    /// Reads replacement tables from a JSON file.
    pub fn from_path<T: AsRef<Path>>(path: T) -> Result<Self, Error> {
        let path = path.as_ref();
        let f = std::fs::File::open(path).map_err(Error::Io)?;
        let tables: ProtocolTables = serde_json::from_reader(std::io::BufReader::new(f))?;
        if let Some(p) = tables.application.iter().find(|p| p.name == OTHER) {
            return Err(Error::configuration(format!(
                "'{}' is reserved for unclassified flows, rename it in {:?}",
                p.name, path
            )));
        }
        info!(
            "Loaded {} application and {} ip protocols from {:?}",
            tables.application.len(),
            tables.ip.len(),
            path
        );
        Ok(tables)
    }

    /// First application protocol owning either port, else [`OTHER`].
    pub fn classify_application(&self, src_port: Option<u16>, dst_port: Option<u16>) -> &str {
        self.application
            .iter()
            .find(|p| {
                dst_port.map(|d| p.ports.contains(&d)).unwrap_or(false)
                    || src_port.map(|s| p.ports.contains(&s)).unwrap_or(false)
            })
            .map(|p| p.name.as_str())
            .unwrap_or(OTHER)
    }

    pub fn classify_ip(&self, protocol: Option<u8>) -> &str {
        protocol
            .and_then(|p| self.ip.get(&p))
            .map(|n| n.as_str())
            .unwrap_or(UNKNOWN)
    }

    pub fn application_expr(&self) -> Expr {
        let branches = self
            .application
            .iter()
            .map(|p| {
                let ports: Vec<Datum> = p.ports.iter().map(|port| Datum::Int(*port as i64)).collect();
                let case = Expr::Or(vec![
                    Expr::field(fields::L4_DST_PORT).is_in(ports.clone()),
                    Expr::field(fields::L4_SRC_PORT).is_in(ports),
                ]);
                (case, Expr::lit(p.name.as_str()))
            })
            .collect();
        Expr::Switch {
            branches,
            default: Box::new(Expr::lit(OTHER)),
        }
    }

    pub fn ip_expr(&self) -> Expr {
        let branches = self
            .ip
            .iter()
            .map(|(number, name)| {
                (
                    Expr::field(fields::PROTOCOL).eq(Expr::lit(*number as i64)),
                    Expr::lit(name.as_str()),
                )
            })
            .collect();
        Expr::Switch {
            branches,
            default: Box::new(Expr::lit(UNKNOWN)),
        }
    }
}

/// Traffic direction relative to the internal network.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Direction {
    Inbound,
    Outbound,
    Internal,
    External,
}

impl Direction {
    pub fn label(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
            Direction::Internal => "internal",
            Direction::External => "external",
        }
    }

    pub fn classify(src: Option<&str>, dst: Option<&str>, network: &InternalNetwork) -> Self {
        let src = src.map(|a| network.contains(a)).unwrap_or(false);
        let dst = dst.map(|a| network.contains(a)).unwrap_or(false);
        match (src, dst) {
            (true, true) => Direction::Internal,
            (true, false) => Direction::Outbound,
            (false, true) => Direction::Inbound,
            (false, false) => Direction::External,
        }
    }
}

/// Addresses starting with a fixed prefix, e.g. `10.0.1.`.
#[derive(Clone, Debug)]
pub struct InternalNetwork {
    prefix: String,
    regex: Regex,
}

impl InternalNetwork {
    pub fn new<T: Into<String>>(prefix: T) -> Result<Self, Error> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(Error::configuration("internal network prefix is empty"));
        }
        let regex = Regex::new(&format!("^{}", regex::escape(&prefix)))?;
        Ok(InternalNetwork { prefix, regex })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn contains(&self, address: &str) -> bool {
        self.regex.is_match(address)
    }

    /// Labels each document with its [`Direction`] from the IPv4 addresses.
    pub fn direction_expr(&self) -> Expr {
        let src = Expr::field(fields::IPV4_SRC_ADDR).matches(self.regex.clone());
        let dst = Expr::field(fields::IPV4_DST_ADDR).matches(self.regex.clone());
        Expr::Switch {
            branches: vec![
                (
                    Expr::And(vec![src.clone(), dst.clone()]),
                    Expr::lit(Direction::Internal.label()),
                ),
                (src, Expr::lit(Direction::Outbound.label())),
                (dst, Expr::lit(Direction::Inbound.label())),
            ],
            default: Box::new(Expr::lit(Direction::External.label())),
        }
    }
}

impl Default for InternalNetwork {
    fn default() -> Self {
        DEFAULT_NETWORK.clone()
    }
}

lazy_static! {
    static ref DEFAULT_NETWORK: InternalNetwork = InternalNetwork {
        prefix: "10.0.1.".to_owned(),
        regex: Regex::new(r"^10\.0\.1\.").expect("Bad regex"),
    };
}
