mod date_format;
mod json;
mod reader;
mod record;

pub use date_format::parse_date_time;
pub use json::split_documents;
pub use reader::FlowReader;
pub use record::{fields, FlowRecord};
