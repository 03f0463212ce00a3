use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("IO Error: {0:?}")]
    Io(#[from] std::io::Error),
    #[error("Serde json conversion error: {0:?}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Regex error: {0:?}")]
    Regex(#[from] regex::Error),
    #[error("Date parse error: {0:?}")]
    DateParse(#[from] chrono::ParseError),
    #[error("Invalid granularity: {0}")]
    InvalidGranularity(String),
    #[error("Invalid metric: {0}")]
    InvalidMetric(String),
    #[error("Invalid protocol type: {0}")]
    InvalidProtocolType(String),
    #[error("Configuration error: {}", msg)]
    Configuration { msg: String },
    #[error("Query execution failed: {}", msg)]
    QueryExecution { msg: String },
    #[error("Unexpected row, field {}: {}", field, msg)]
    UnexpectedRow { field: String, msg: String },
    #[error("Flow dump ended inside a document ({0}B unread)")]
    TruncatedDump(usize),
}

impl Error {
    pub(crate) fn configuration<T: Into<String>>(msg: T) -> Self {
        Error::Configuration { msg: msg.into() }
    }

    pub(crate) fn query<T: Into<String>>(msg: T) -> Self {
        Error::QueryExecution { msg: msg.into() }
    }
}
