//! Capability trait definitions
//!
//! These traits abstract the two time-series databases down to exactly what
//! the sync engine needs: a range query returning streamed tabular rows, and
//! an all-or-nothing batch write. Tests swap in the in-memory store.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::models::Point;
use config::Settings;

/// Lower bound of a range query
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeStart {
    /// Lookback relative to now
    Relative(Duration),
    /// Absolute instant
    Absolute(DateTime<Utc>),
}

/// A range query over one bucket, open-ended toward now
#[derive(Debug, Clone, PartialEq)]
pub struct RangeQuery {
    pub bucket: String,
    pub start: RangeStart,
    /// Sort by time and keep only the single most recent record
    pub latest_only: bool,
}

impl RangeQuery {
    /// Everything since an absolute instant, up to now
    pub fn since(bucket: &str, start: DateTime<Utc>) -> Self {
        Self {
            bucket: bucket.to_string(),
            start: RangeStart::Absolute(start),
            latest_only: false,
        }
    }

    /// The single most recent record within a relative lookback window
    pub fn latest_within(bucket: &str, lookback: Duration) -> Self {
        Self {
            bucket: bucket.to_string(),
            start: RangeStart::Relative(lookback),
            latest_only: true,
        }
    }
}

/// Streamed tabular rows: a single forward pass, not restartable
pub type RowStream = Box<dyn Iterator<Item = Result<Vec<String>>>>;

/// Query capability against either database
pub trait QueryClient {
    /// Submit a range query and stream back tabular rows
    fn query(&self, query: &RangeQuery) -> Result<RowStream>;
}

/// Write capability against the local database
pub trait WriteClient {
    /// Write a batch of points to a bucket; all-or-nothing failure signal
    fn write(&self, bucket: &str, org: &str, points: &[Point]) -> Result<()>;
}

/// The per-cycle client set
///
/// Rebuilt from freshly loaded settings at the top of every cycle so
/// endpoint or credential changes take effect without a restart.
pub struct MirrorClients {
    pub local_query: Box<dyn QueryClient>,
    pub local_write: Box<dyn WriteClient>,
    pub remote_query: Box<dyn QueryClient>,
}

/// Builds clients from settings
pub trait ClientFactory {
    fn connect(&self, settings: &Settings) -> Result<MirrorClients>;
}
