//! Dual-channel operational logging
//!
//! Every notable state transition is reported twice: to the console through
//! the `log` macros, and as a point in the local `Logging` bucket
//! (measurement `Logs`, tag `LOG_LEVEL`, field `Message`) so dashboards can
//! read the service's own history. Log events are written, never read back.

use chrono::Utc;
use log::{debug, error, info, warn};

use crate::db::WriteClient;
use crate::models::{FieldValue, Point};

/// Bucket that receives log events
pub const LOG_BUCKET: &str = "Logging";
/// Measurement name for log events
pub const LOG_MEASUREMENT: &str = "Logs";

/// Cycle-scoped event logger over the local write capability
pub struct EventLog<'a> {
    writer: &'a dyn WriteClient,
    org: &'a str,
}

impl<'a> EventLog<'a> {
    pub fn new(writer: &'a dyn WriteClient, org: &'a str) -> Self {
        Self { writer, org }
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.event("DEBUG", message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.event("WARNING", message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.event("ERROR", message);
    }

    /// Log under an arbitrary level string
    ///
    /// The well-known levels map onto the matching console macros; anything
    /// else is reported at info level and tagged verbatim in the database.
    pub fn event(&self, level: &str, message: impl Into<String>) {
        let message = message.into();
        match level {
            "DEBUG" => debug!("{message}"),
            "WARNING" => warn!("{message}"),
            "ERROR" => error!("{message}"),
            _ => info!("{message}"),
        }
        self.emit(level, message);
    }

    /// Write one log point
    ///
    /// Failures degrade to a console warning: a dead local database must not
    /// turn logging itself into another cycle fault.
    fn emit(&self, level: &str, message: String) {
        let point = Point::new(
            LOG_MEASUREMENT,
            "Message",
            FieldValue::Text(message),
            Utc::now(),
        )
        .with_tag("LOG_LEVEL", level);
        if let Err(e) = self.writer.write(LOG_BUCKET, self.org, &[point]) {
            warn!("Failed to write log event: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryTsdb;

    #[test]
    fn test_log_event_shape() {
        let store = InMemoryTsdb::new();
        let log = EventLog::new(&store, "local-org");
        log.debug("Started mirror service.");

        let events = store.points(LOG_BUCKET);
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.measurement, LOG_MEASUREMENT);
        assert_eq!(event.field, "Message");
        assert_eq!(
            event.value,
            FieldValue::Text("Started mirror service.".to_string())
        );
        assert_eq!(event.tags.get("LOG_LEVEL").unwrap(), "DEBUG");
    }

    #[test]
    fn test_levels_map_to_tag_values() {
        let store = InMemoryTsdb::new();
        let log = EventLog::new(&store, "local-org");
        log.warning("w");
        log.error("e");

        let events = store.points(LOG_BUCKET);
        assert_eq!(events[0].tags.get("LOG_LEVEL").unwrap(), "WARNING");
        assert_eq!(events[1].tags.get("LOG_LEVEL").unwrap(), "ERROR");
    }

    #[test]
    fn test_custom_level_is_tagged_verbatim() {
        let store = InMemoryTsdb::new();
        let log = EventLog::new(&store, "local-org");
        log.event("AUDIT", "operator reset the lock");

        let events = store.points(LOG_BUCKET);
        assert_eq!(events[0].tags.get("LOG_LEVEL").unwrap(), "AUDIT");
    }
}
