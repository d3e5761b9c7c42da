//! Mirror crate - incremental time-series mirroring
//!
//! This crate provides the logic for mirroring time-series data from a
//! remote InfluxDB instance into a local one:
//! - Domain model (Point, FieldValue)
//! - Streaming annotated-CSV response parser
//! - Watermark resolution (adaptive widening lookback search)
//! - Per-bucket sync engine and cycle controller
//! - Single-instance guard and reachability probe
//! - Capability traits with an HTTP implementation and an in-memory store
//!
//! The binary in `crates/apps/mirrord` wires these together; everything
//! here is testable without network or filesystem access.

pub mod db;
pub mod guard;
pub mod logging;
pub mod models;
pub mod net;
pub mod parse;
pub mod sync;

pub use db::{
    ClientFactory, InMemoryFactory, InMemoryTsdb, InfluxDb, InfluxFactory, MirrorClients,
    QueryClient, RangeQuery, RangeStart, RowStream, SharedTsdb, WriteClient,
};
pub use guard::InstanceGuard;
pub use logging::{EventLog, LOG_BUCKET, LOG_MEASUREMENT};
pub use models::{FieldValue, Point};
pub use net::{Reachability, SystemPing, strip_port};
pub use parse::{ParseError, parse};
pub use sync::{CycleController, CycleOutcome, Watermark, resolve, sync_bucket};
