//! Watermark resolution
//!
//! Finds the newest timestamp already mirrored for a bucket without scanning
//! the whole local dataset: range queries over a monotonically widening set
//! of lookback windows, stopping at the first window that holds data. A
//! database with recent data answers from the cheapest window; an idle or
//! freshly provisioned one widens until the configured recovery instant
//! takes over.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use log::debug;

use crate::db::{QueryClient, RangeQuery, RowStream};

/// Lookback windows, cheapest first
fn lookback_windows() -> [Duration; 7] {
    [
        Duration::minutes(1),
        Duration::hours(1),
        Duration::hours(6),
        Duration::hours(12),
        Duration::days(1),
        Duration::days(7),
        Duration::days(14),
    ]
}

/// Outcome of a watermark search
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Watermark {
    /// Newest timestamp found in the local database
    Local(DateTime<Utc>),
    /// No local data in any window; the configured recovery lower bound
    Recovery(DateTime<Utc>),
}

impl Watermark {
    pub fn instant(&self) -> DateTime<Utc> {
        match self {
            Watermark::Local(instant) | Watermark::Recovery(instant) => *instant,
        }
    }
}

/// Resolve the watermark for `bucket` against the local database
///
/// No retries here; transient query failures propagate so the cycle
/// controller applies its retry policy.
pub fn resolve(
    local: &dyn QueryClient,
    bucket: &str,
    recovery_since: DateTime<Utc>,
) -> Result<Watermark> {
    for window in lookback_windows() {
        let rows = local.query(&RangeQuery::latest_within(bucket, window))?;
        if let Some(instant) = latest_timestamp(rows) {
            return Ok(Watermark::Local(instant));
        }
        debug!(
            "No local data for {} within the last {}s, widening",
            bucket,
            window.num_seconds()
        );
    }
    Ok(Watermark::Recovery(recovery_since))
}

/// Extract the `_time` cell of the first data row after the header
///
/// A headerless or malformed result counts as "no data in this window" so
/// the search widens instead of failing.
fn latest_timestamp(rows: RowStream) -> Option<DateTime<Utc>> {
    let mut time_index = None;
    for row in rows {
        let Ok(row) = row else { return None };
        match time_index {
            None => time_index = row.iter().position(|cell| cell == "_time"),
            Some(index) => {
                let cell = row.get(index)?;
                return DateTime::parse_from_rfc3339(cell)
                    .ok()
                    .map(|ts| ts.with_timezone(&Utc));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryTsdb;
    use crate::models::{FieldValue, Point};
    use anyhow::anyhow;

    fn recovery() -> DateTime<Utc> {
        "2021-01-01T00:00:00Z".parse().unwrap()
    }

    fn point_at(instant: DateTime<Utc>) -> Point {
        Point::new("temperature", "celsius", FieldValue::Float(20.0), instant)
    }

    #[test]
    fn test_recent_data_found_in_first_window() {
        let store = InMemoryTsdb::new();
        let newest = Utc::now() - Duration::seconds(30);
        store.insert("sensors", point_at(newest));

        let watermark = resolve(&store, "sensors", recovery()).unwrap();
        assert_eq!(watermark, Watermark::Local(newest));
        // The 1-minute window answered; no widening happened
        assert_eq!(store.query_calls(), 1);
    }

    #[test]
    fn test_widening_finds_older_data() {
        let store = InMemoryTsdb::new();
        let newest = Utc::now() - Duration::hours(8);
        store.insert("sensors", point_at(newest));
        store.insert("sensors", point_at(newest - Duration::days(3)));

        let watermark = resolve(&store, "sensors", recovery()).unwrap();
        assert_eq!(watermark, Watermark::Local(newest));
        // 1m, 1h, 6h found nothing; 12h hit
        assert_eq!(store.query_calls(), 4);
    }

    #[test]
    fn test_watermark_is_the_latest_regardless_of_window() {
        let store = InMemoryTsdb::new();
        let newest = Utc::now() - Duration::minutes(20);
        store.insert("sensors", point_at(newest - Duration::minutes(10)));
        store.insert("sensors", point_at(newest));

        let watermark = resolve(&store, "sensors", recovery()).unwrap();
        assert_eq!(watermark, Watermark::Local(newest));
    }

    #[test]
    fn test_empty_bucket_falls_back_to_recovery_instant() {
        let store = InMemoryTsdb::new();
        let watermark = resolve(&store, "sensors", recovery()).unwrap();
        assert_eq!(watermark, Watermark::Recovery(recovery()));
        // All seven windows were tried
        assert_eq!(store.query_calls(), 7);
    }

    #[test]
    fn test_query_failure_propagates() {
        let store = InMemoryTsdb::new();
        store.fail_queries_for(Some("sensors"));
        assert!(resolve(&store, "sensors", recovery()).is_err());
    }

    #[test]
    fn test_malformed_rows_count_as_no_data() {
        fn rows(cells: Vec<Vec<&'static str>>) -> RowStream {
            Box::new(cells.into_iter().map(|row| {
                Ok(row.into_iter().map(str::to_string).collect::<Vec<String>>())
            }))
        }

        // Headerless
        assert_eq!(latest_timestamp(rows(vec![vec!["a", "b"]])), None);
        // Header but no data row
        assert_eq!(
            latest_timestamp(rows(vec![vec!["_time", "_value"]])),
            None
        );
        // Data row too short for the _time index
        assert_eq!(
            latest_timestamp(rows(vec![vec!["x", "_time"], vec!["only-one"]])),
            None
        );
        // Unparseable timestamp
        assert_eq!(
            latest_timestamp(rows(vec![vec!["_time"], vec!["not-a-time"]])),
            None
        );
        // Stream error mid-window
        let broken: RowStream = Box::new(
            vec![Err(anyhow!("connection reset"))].into_iter(),
        );
        assert_eq!(latest_timestamp(broken), None);
    }
}
