//! In-memory time-series store
//!
//! Backs both capability traits for tests, the way a real instance would:
//! queries come back in the annotated-CSV row shape so the streaming parser
//! path is exercised end to end. Also records call counts and supports
//! injected query failures for failure-isolation tests.

use anyhow::{Result, anyhow};
use chrono::SecondsFormat;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use super::{
    ClientFactory, MirrorClients, QueryClient, RangeQuery, RangeStart, RowStream, WriteClient,
};
use crate::models::{FieldValue, Point};
use config::Settings;

/// In-memory implementation of the query and write capabilities
#[derive(Default)]
pub struct InMemoryTsdb {
    buckets: RwLock<HashMap<String, Vec<Point>>>,
    query_calls: RwLock<usize>,
    write_calls: RwLock<usize>,
    fail_bucket: RwLock<Option<String>>,
}

impl InMemoryTsdb {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a point directly, bypassing the write capability
    pub fn insert(&self, bucket: &str, point: Point) {
        let mut buckets = self.buckets.write().unwrap();
        buckets.entry(bucket.to_string()).or_default().push(point);
    }

    /// Snapshot of a bucket's points
    pub fn points(&self, bucket: &str) -> Vec<Point> {
        let buckets = self.buckets.read().unwrap();
        buckets.get(bucket).cloned().unwrap_or_default()
    }

    /// Number of `query` invocations so far
    pub fn query_calls(&self) -> usize {
        *self.query_calls.read().unwrap()
    }

    /// Number of `write` invocations so far
    pub fn write_calls(&self) -> usize {
        *self.write_calls.read().unwrap()
    }

    /// Make queries against one bucket fail (None clears the injection)
    pub fn fail_queries_for(&self, bucket: Option<&str>) {
        *self.fail_bucket.write().unwrap() = bucket.map(str::to_string);
    }

    /// Render matching points as annotated-CSV shaped rows
    fn rows_for(&self, query: &RangeQuery) -> Vec<Vec<String>> {
        let now = chrono::Utc::now();
        let start = match query.start {
            RangeStart::Relative(lookback) => now - lookback,
            // Flux range starts are inclusive
            RangeStart::Absolute(instant) => instant,
        };

        let buckets = self.buckets.read().unwrap();
        let mut matches: Vec<&Point> = buckets
            .get(&query.bucket)
            .map(|points| points.iter().filter(|p| p.timestamp >= start).collect())
            .unwrap_or_default();
        matches.sort_by_key(|p| p.timestamp);
        if query.latest_only && matches.len() > 1 {
            matches.drain(..matches.len() - 1);
        }
        if matches.is_empty() {
            return Vec::new();
        }

        let tag_names: BTreeSet<&str> = matches
            .iter()
            .flat_map(|p| p.tags.keys().map(String::as_str))
            .collect();

        let mut annotation = vec![
            "#datatype".to_string(),
            "dateTime:RFC3339".to_string(),
            "string".to_string(),
            "string".to_string(),
            "string".to_string(),
        ];
        let mut header = vec![
            "_time".to_string(),
            "_value".to_string(),
            "_field".to_string(),
            "_measurement".to_string(),
        ];
        for name in &tag_names {
            annotation.push("string".to_string());
            header.push(name.to_string());
        }

        let mut rows = vec![annotation, header];
        for point in matches {
            let mut row = vec![
                point
                    .timestamp
                    .to_rfc3339_opts(SecondsFormat::Nanos, true),
                match &point.value {
                    FieldValue::Float(number) => number.to_string(),
                    FieldValue::Text(text) => text.clone(),
                },
                point.field.clone(),
                point.measurement.clone(),
            ];
            for name in &tag_names {
                row.push(point.tags.get(*name).cloned().unwrap_or_default());
            }
            rows.push(row);
        }
        rows
    }
}

impl QueryClient for InMemoryTsdb {
    fn query(&self, query: &RangeQuery) -> Result<RowStream> {
        *self.query_calls.write().unwrap() += 1;
        if self.fail_bucket.read().unwrap().as_deref() == Some(query.bucket.as_str()) {
            return Err(anyhow!(
                "injected query failure for bucket {}",
                query.bucket
            ));
        }
        let rows = self.rows_for(query);
        Ok(Box::new(rows.into_iter().map(Ok)))
    }
}

impl WriteClient for InMemoryTsdb {
    fn write(&self, bucket: &str, _org: &str, points: &[Point]) -> Result<()> {
        *self.write_calls.write().unwrap() += 1;
        let mut buckets = self.buckets.write().unwrap();
        let entry = buckets.entry(bucket.to_string()).or_default();
        entry.extend_from_slice(points);
        Ok(())
    }
}

/// Shared handle to an [`InMemoryTsdb`], so one store can serve as both the
/// query and write side of a factory-built client set
#[derive(Clone)]
pub struct SharedTsdb(pub Arc<InMemoryTsdb>);

impl QueryClient for SharedTsdb {
    fn query(&self, query: &RangeQuery) -> Result<RowStream> {
        self.0.query(query)
    }
}

impl WriteClient for SharedTsdb {
    fn write(&self, bucket: &str, org: &str, points: &[Point]) -> Result<()> {
        self.0.write(bucket, org, points)
    }
}

/// Factory wiring an in-memory local and remote store, both kept accessible
/// for assertions
#[derive(Default)]
pub struct InMemoryFactory {
    pub local: Arc<InMemoryTsdb>,
    pub remote: Arc<InMemoryTsdb>,
}

impl InMemoryFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClientFactory for InMemoryFactory {
    fn connect(&self, _settings: &Settings) -> Result<MirrorClients> {
        Ok(MirrorClients {
            local_query: Box::new(SharedTsdb(self.local.clone())),
            local_write: Box::new(SharedTsdb(self.local.clone())),
            remote_query: Box::new(SharedTsdb(self.remote.clone())),
        })
    }
}
