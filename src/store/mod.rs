//! The document store boundary.
//!
//! Queries only ever see a [`QueryExecutor`]. A handle is opened once with
//! [`connect`], shared by every query and dropped to shut it down.
mod memory;

pub use memory::MemoryStore;

use crate::config::Config;
use crate::document::Document;
use crate::errors::Error;
use crate::flow::{FlowReader, FlowRecord};
use crate::pipeline::Pipeline;

use async_trait::async_trait;
use futures::TryStreamExt;
use log::*;
use std::path::Path;
use std::sync::Arc;

pub const MEMORY_SCHEME: &'static str = "memory://";
pub const FILE_SCHEME: &'static str = "file://";

/// Runs an aggregation pipeline against one collection.
///
/// Failures are returned as-is; callers get either every row or an error.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> Result<Vec<Document>, Error>;
}

#[async_trait]
impl<T: QueryExecutor + ?Sized> QueryExecutor for Arc<T> {
    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> Result<Vec<Document>, Error> {
        (**self).aggregate(collection, pipeline).await
    }
}

/// Opens the store named by `config.store_uri`.
///
/// `memory://` starts empty, `file:///path` loads a JSON flow dump into the
/// configured collection.
pub async fn connect(config: &Config) -> Result<MemoryStore, Error> {
    let uri = config
        .store_uri
        .as_deref()
        .ok_or_else(|| Error::configuration("No store uri configured"))?;

    if uri == MEMORY_SCHEME {
        info!("Using empty in-memory flow store");
        Ok(MemoryStore::new())
    } else if let Some(path) = uri.strip_prefix(FILE_SCHEME) {
        let records = load_dump(path).await?;
        info!("Loaded {} flow records from {}", records.len(), path);
        let mut store = MemoryStore::new();
        store.insert_many(&config.collection, records);
        Ok(store)
    } else {
        Err(Error::configuration(format!("Unsupported store uri: {}", uri)))
    }
}

/// Reads every flow record of a newline-delimited or concatenated JSON dump.
pub async fn load_dump<P: AsRef<Path>>(path: P) -> Result<Vec<FlowRecord>, Error> {
    let file = smol::fs::File::open(path.as_ref()).await.map_err(Error::Io)?;
    let batches: Vec<Vec<FlowRecord>> = FlowReader::new(file).try_collect().await?;
    Ok(batches.into_iter().flatten().collect())
}
