//! Per-bucket sync engine

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use log::info;

use super::watermark::{self, Watermark};
use crate::db::{MirrorClients, RangeQuery};
use crate::logging::EventLog;
use crate::models::Point;
use crate::parse;

/// Mirror one bucket from the remote database into the local one
///
/// Returns the number of points written; zero means "already caught up" and
/// is not an error. The write is a single batch call; a failed batch fails
/// the whole bucket's cycle.
pub fn sync_bucket(
    clients: &MirrorClients,
    log: &EventLog<'_>,
    bucket: &str,
    local_org: &str,
    recovery_since: DateTime<Utc>,
) -> Result<usize> {
    log.debug(format!("Starting mirror of bucket: {bucket}"));

    // 1. Newest timestamp already mirrored locally
    let watermark = watermark::resolve(clients.local_query.as_ref(), bucket, recovery_since)
        .with_context(|| format!("Failed to resolve watermark for bucket {bucket}"))?;

    // Flux range starts are inclusive; pulling from the raw watermark would
    // re-copy the newest local point every cycle
    let since = match watermark {
        Watermark::Local(instant) => instant + Duration::nanoseconds(1),
        Watermark::Recovery(instant) => instant,
    };
    log.debug(format!("Querying {bucket} from: {}", since.to_rfc3339()));

    // 2. Everything the remote gained since then, open-ended toward now
    let rows = clients
        .remote_query
        .query(&RangeQuery::since(bucket, since))
        .with_context(|| format!("Remote query failed for bucket {bucket}"))?;

    // 3. Parse the streamed response; any malformed row fails the bucket
    let points: Vec<Point> = parse::parse(rows)
        .collect::<Result<_>>()
        .with_context(|| format!("Malformed query response for bucket {bucket}"))?;

    // 4. One batch write to the same bucket locally
    clients
        .local_write
        .write(bucket, local_org, &points)
        .with_context(|| format!("Local write failed for bucket {bucket}"))?;

    info!("Mirrored {} data points into bucket {}", points.len(), bucket);
    log.debug(format!(
        "Finished mirroring {} data points in the bucket: {bucket}",
        points.len()
    ));
    Ok(points.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ClientFactory, InMemoryFactory};
    use crate::logging::{EventLog, LOG_BUCKET};
    use crate::models::FieldValue;
    use config::Settings;

    fn settings() -> Settings {
        Settings {
            local_url: "http://localhost:8086".to_string(),
            local_token: "t".to_string(),
            local_org: "local-org".to_string(),
            remote_url: "http://192.168.1.20:8086".to_string(),
            remote_token: "t".to_string(),
            remote_org: "remote-org".to_string(),
            buckets: vec!["sensors".to_string()],
            refresh_rate: "00:00:01".to_string(),
            recover_since: "2021-01-01T00:00:00Z".parse().unwrap(),
        }
    }

    fn point(age_minutes: i64, value: f64) -> Point {
        Point::new(
            "temperature",
            "celsius",
            FieldValue::Float(value),
            Utc::now() - Duration::minutes(age_minutes),
        )
        .with_tag("host", "rig-7")
    }

    #[test]
    fn test_pulls_only_newer_points() {
        let factory = InMemoryFactory::new();
        let shared = point(30, 1.0);
        factory.local.insert("sensors", shared.clone());
        factory.remote.insert("sensors", shared);
        factory.remote.insert("sensors", point(10, 2.0));
        factory.remote.insert("sensors", point(5, 3.0));

        let clients = factory.connect(&settings()).unwrap();
        let log = EventLog::new(clients.local_write.as_ref(), "local-org");
        let written = sync_bucket(
            &clients,
            &log,
            "sensors",
            "local-org",
            settings().recover_since,
        )
        .unwrap();

        assert_eq!(written, 2);
        assert_eq!(factory.local.points("sensors").len(), 3);
    }

    #[test]
    fn test_second_sync_writes_nothing() {
        let factory = InMemoryFactory::new();
        factory.remote.insert("sensors", point(10, 2.0));
        factory.remote.insert("sensors", point(5, 3.0));

        let clients = factory.connect(&settings()).unwrap();
        let log = EventLog::new(clients.local_write.as_ref(), "local-org");

        let first = sync_bucket(
            &clients,
            &log,
            "sensors",
            "local-org",
            settings().recover_since,
        )
        .unwrap();
        assert_eq!(first, 2);

        let second = sync_bucket(
            &clients,
            &log,
            "sensors",
            "local-org",
            settings().recover_since,
        )
        .unwrap();
        assert_eq!(second, 0);
        assert_eq!(factory.local.points("sensors").len(), 2);
    }

    #[test]
    fn test_empty_remote_is_not_an_error() {
        let factory = InMemoryFactory::new();
        let clients = factory.connect(&settings()).unwrap();
        let log = EventLog::new(clients.local_write.as_ref(), "local-org");
        let written = sync_bucket(
            &clients,
            &log,
            "sensors",
            "local-org",
            settings().recover_since,
        )
        .unwrap();
        assert_eq!(written, 0);
    }

    #[test]
    fn test_tags_survive_the_round_trip() {
        let factory = InMemoryFactory::new();
        factory.remote.insert("sensors", point(5, 3.0));

        let clients = factory.connect(&settings()).unwrap();
        let log = EventLog::new(clients.local_write.as_ref(), "local-org");
        sync_bucket(
            &clients,
            &log,
            "sensors",
            "local-org",
            settings().recover_since,
        )
        .unwrap();

        let mirrored = factory.local.points("sensors");
        assert_eq!(mirrored[0].tags.get("host").unwrap(), "rig-7");
        assert_eq!(mirrored[0].value, FieldValue::Float(3.0));
    }

    #[test]
    fn test_engine_emits_log_events() {
        let factory = InMemoryFactory::new();
        let clients = factory.connect(&settings()).unwrap();
        let log = EventLog::new(clients.local_write.as_ref(), "local-org");
        sync_bucket(
            &clients,
            &log,
            "sensors",
            "local-org",
            settings().recover_since,
        )
        .unwrap();

        let events = factory.local.points(LOG_BUCKET);
        // start, since-instant, completion
        assert_eq!(events.len(), 3);
    }
}
