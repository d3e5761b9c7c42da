//! Database capability traits and client implementations

mod influx;
mod memory;
mod traits;

pub use influx::{InfluxDb, InfluxFactory};
pub use memory::{InMemoryFactory, InMemoryTsdb, SharedTsdb};
pub use traits::{
    ClientFactory, MirrorClients, QueryClient, RangeQuery, RangeStart, RowStream, WriteClient,
};
