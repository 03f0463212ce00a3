//! Values exchanged with a query executor.
//!
//! Mirrors the subset of document-database types flow records and
//! aggregation rows use, with the same cross-type ordering a document store
//! applies when sorting or comparing mixed values.
use crate::errors::Error;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub type Document = BTreeMap<String, Datum>;

#[derive(Clone, Debug)]
pub enum Datum {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(DateTime<Utc>),
    Array(Vec<Datum>),
}

impl Datum {
    fn type_rank(&self) -> u8 {
        match self {
            Datum::Null => 0,
            Datum::Int(_) | Datum::Float(_) => 1,
            Datum::Str(_) => 2,
            Datum::Array(_) => 3,
            Datum::Bool(_) => 4,
            Datum::Date(_) => 5,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Int(i) => Some(*i as f64),
            Datum::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    pub fn truthy(&self) -> bool {
        match self {
            Datum::Null => false,
            Datum::Bool(b) => *b,
            Datum::Int(i) => *i != 0,
            Datum::Float(f) => *f != 0.0,
            _ => true,
        }
    }

    /// Total order used by sort stages and comparison operators.
    pub fn compare(&self, other: &Datum) -> Ordering {
        match (self, other) {
            (Datum::Int(a), Datum::Int(b)) => a.cmp(b),
            (Datum::Str(a), Datum::Str(b)) => a.cmp(b),
            (Datum::Bool(a), Datum::Bool(b)) => a.cmp(b),
            (Datum::Date(a), Datum::Date(b)) => a.cmp(b),
            (Datum::Array(a), Datum::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y) {
                        Ordering::Equal => continue,
                        o => return o,
                    }
                }
                a.len().cmp(&b.len())
            }
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                _ => a.type_rank().cmp(&b.type_rank()),
            },
        }
    }

    pub fn same_as(&self, other: &Datum) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Datum::Str(v.to_owned())
    }
}

impl From<String> for Datum {
    fn from(v: String) -> Self {
        Datum::Str(v)
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Datum::Int(v)
    }
}

impl From<u64> for Datum {
    fn from(v: u64) -> Self {
        if v > i64::MAX as u64 {
            Datum::Float(v as f64)
        } else {
            Datum::Int(v as i64)
        }
    }
}

impl From<DateTime<Utc>> for Datum {
    fn from(v: DateTime<Utc>) -> Self {
        Datum::Date(v)
    }
}

impl<T: Into<Datum>> From<Option<T>> for Datum {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Datum::Null)
    }
}

/// Renders dates in Extended JSON, `{"$date": "..."}`.
impl Serialize for Datum {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Datum::Null => serializer.serialize_unit(),
            Datum::Bool(b) => serializer.serialize_bool(*b),
            Datum::Int(i) => serializer.serialize_i64(*i),
            Datum::Float(f) => serializer.serialize_f64(*f),
            Datum::Str(s) => serializer.serialize_str(s),
            Datum::Date(d) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("$date", &d.to_rfc3339_opts(SecondsFormat::Millis, true))?;
                map.end()
            }
            Datum::Array(values) => {
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for v in values {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
        }
    }
}

/// Typed accessors for aggregation rows.
pub trait RowExt {
    fn datum(&self, field: &str) -> &Datum;
    fn date(&self, field: &str) -> Result<DateTime<Utc>, Error>;
    fn string(&self, field: &str) -> Result<String, Error>;
    /// Numeric field as a non-negative integer; missing reads as zero.
    fn amount(&self, field: &str) -> Result<u64, Error>;
}

impl RowExt for Document {
    fn datum(&self, field: &str) -> &Datum {
        self.get(field).unwrap_or(&Datum::Null)
    }

    fn date(&self, field: &str) -> Result<DateTime<Utc>, Error> {
        match self.datum(field) {
            Datum::Date(d) => Ok(*d),
            other => Err(unexpected(field, "date", other)),
        }
    }

    fn string(&self, field: &str) -> Result<String, Error> {
        match self.datum(field) {
            Datum::Str(s) => Ok(s.clone()),
            other => Err(unexpected(field, "string", other)),
        }
    }

    fn amount(&self, field: &str) -> Result<u64, Error> {
        match self.datum(field) {
            Datum::Null => Ok(0),
            Datum::Int(i) if *i >= 0 => Ok(*i as u64),
            Datum::Float(f) if *f >= 0.0 && f.is_finite() => Ok(f.round() as u64),
            other => Err(unexpected(field, "non-negative number", other)),
        }
    }
}

fn unexpected(field: &str, wanted: &str, got: &Datum) -> Error {
    Error::UnexpectedRow {
        field: field.to_owned(),
        msg: format!("expected {}, found {:?}", wanted, got),
    }
}
