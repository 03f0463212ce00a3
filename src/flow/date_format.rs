use chrono::{DateTime, ParseError, SecondsFormat, TimeZone, Utc};
use serde::{self, Deserialize, Deserializer, Serializer};

/// Offset form written by collectors that do not emit RFC 3339.
pub const FORMAT: &'static str = "%Y-%m-%dT%H:%M:%S%.f%z";

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDate {
    Text(String),
    Extended {
        #[serde(rename = "$date")]
        date: ExtendedDate,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExtendedDate {
    Text(String),
    Millis(i64),
}

pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&date.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// Accepts RFC 3339 text or Extended JSON (`{"$date": "..."}` / `{"$date": millis}`).
pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    match RawDate::deserialize(deserializer)? {
        RawDate::Text(s)
        | RawDate::Extended {
            date: ExtendedDate::Text(s),
        } => parse_date_time(&s).map_err(serde::de::Error::custom),
        RawDate::Extended {
            date: ExtendedDate::Millis(ms),
        } => Utc
            .timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {}", ms))),
    }
}

pub fn parse_date_time(s: &str) -> Result<DateTime<Utc>, ParseError> {
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, FORMAT))
        .map(|dt| dt.with_timezone(&Utc))
}
