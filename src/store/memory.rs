use crate::document::Document;
use crate::errors::Error;
use crate::flow::FlowRecord;
use crate::pipeline::{eval, Pipeline};
use crate::store::QueryExecutor;

use async_trait::async_trait;
use log::*;
use std::collections::HashMap;
use std::sync::Arc;

/// Collections of documents held in process.
///
/// Pipelines run on the blocking pool against a snapshot of the collection,
/// so concurrent queries never wait on each other.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    collections: HashMap<String, Arc<Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn with_records<I>(collection: &str, records: I) -> Self
    where
        I: IntoIterator<Item = FlowRecord>,
    {
        let mut store = MemoryStore::new();
        store.insert_many(collection, records);
        store
    }

    pub fn insert_many<I>(&mut self, collection: &str, records: I)
    where
        I: IntoIterator<Item = FlowRecord>,
    {
        let docs = self
            .collections
            .entry(collection.to_owned())
            .or_insert_with(|| Arc::new(vec![]));
        Arc::make_mut(docs).extend(records.into_iter().map(|r| r.to_document()));
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl QueryExecutor for MemoryStore {
    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> Result<Vec<Document>, Error> {
        let docs = match self.collections.get(collection) {
            Some(docs) => docs.clone(),
            None => {
                debug!("Collection {} does not exist, nothing to aggregate", collection);
                return Ok(vec![]);
            }
        };
        let pipeline = pipeline.clone();
        let rows = smol::unblock(move || eval::run(&pipeline, docs.iter().cloned())).await?;
        trace!("Pipeline over {} produced {} rows", collection, rows.len());
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Accumulator, Expr, Stage};
    use chrono::{TimeZone, Utc};

    #[test]
    fn aggregates_named_collection() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut store = MemoryStore::new();
        store.insert_many(
            "flows",
            vec![
                FlowRecord {
                    in_bytes: Some(10),
                    ..FlowRecord::at(ts)
                },
                FlowRecord {
                    in_bytes: Some(32),
                    ..FlowRecord::at(ts)
                },
            ],
        );
        let pipeline = Pipeline::new().stage(Stage::Group {
            id: Expr::lit(crate::document::Datum::Null),
            fields: vec![("total".into(), Accumulator::Sum(Expr::field("IN_BYTES")))],
        });

        let rows = smol::block_on(store.aggregate("flows", &pipeline)).expect("Failed to aggregate");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("total"), Some(&crate::document::Datum::Int(42)));

        let rows = smol::block_on(store.aggregate("other", &pipeline)).expect("Failed to aggregate");
        assert!(rows.is_empty());
    }
}
