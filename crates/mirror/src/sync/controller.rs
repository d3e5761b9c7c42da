//! Sync cycle control loop
//!
//! One long-lived, single-threaded loop per process: load settings fresh,
//! probe remote reachability, sync each configured bucket strictly in list
//! order, then wait out the refresh interval. Failures are contained at the
//! cycle boundary; only a shutdown request ends the loop, and that is the
//! only path that releases the single-instance guard.

use anyhow::Result;
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::bucket::sync_bucket;
use crate::db::{ClientFactory, MirrorClients};
use crate::guard::InstanceGuard;
use crate::logging::EventLog;
use crate::net::{Reachability, strip_port};
use config::{Settings, SettingsSource};

/// Wait used when settings cannot be loaded and no interval is available
const FALLBACK_WAIT: Duration = Duration::from_secs(30);
/// Poll granularity during the wait; bounds shutdown latency
const WAIT_POLL: Duration = Duration::from_millis(200);

/// Outcome of one sync cycle
#[derive(Debug)]
pub enum CycleOutcome {
    /// Every configured bucket synced
    Synced { buckets: usize, points: usize },
    /// Remote unreachable; an expected transient condition, not an error
    Skipped,
    /// A stage failed; the remaining buckets were not attempted this cycle
    Failed(anyhow::Error),
}

/// The sync cycle controller
pub struct CycleController<S, F, P> {
    settings: S,
    factory: F,
    ping: P,
    guard: InstanceGuard,
    announced: bool,
}

impl<S, F, P> CycleController<S, F, P>
where
    S: SettingsSource,
    F: ClientFactory,
    P: Reachability,
{
    pub fn new(settings: S, factory: F, ping: P, guard: InstanceGuard) -> Self {
        Self {
            settings,
            factory,
            ping,
            guard,
            announced: false,
        }
    }

    /// Run cycles until `shutdown` is set
    ///
    /// Never returns early because of a cycle failure; the retry unit is
    /// "wait one full interval, try the whole cycle again".
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        while !shutdown.load(Ordering::Relaxed) {
            let interval = self.cycle_once();
            self.wait(interval, shutdown);
        }
        self.shutdown_cleanup()
    }

    /// One settings-load + sync pass; returns the interval to wait afterward
    fn cycle_once(&mut self) -> Duration {
        let settings = match self.settings.load() {
            Ok(settings) => settings,
            Err(e) => {
                // No writer can exist without settings; console-only
                error!("Failed to load settings: {e:#}");
                return FALLBACK_WAIT;
            }
        };
        let interval = match settings.refresh_interval() {
            Ok(interval) => interval,
            Err(e) => {
                error!("{e:#}");
                FALLBACK_WAIT
            }
        };

        match self.factory.connect(&settings) {
            Ok(clients) => {
                let log = EventLog::new(clients.local_write.as_ref(), &settings.local_org);
                if !self.announced {
                    log.debug("Started mirror service.");
                    self.announced = true;
                }
                match self.run_cycle(&settings, &clients, &log) {
                    CycleOutcome::Synced { buckets, points } => {
                        info!("Cycle complete: {points} points across {buckets} buckets");
                    }
                    CycleOutcome::Skipped => {}
                    CycleOutcome::Failed(e) => {
                        error!("{e:?}");
                        log.error(format!("Mirror error occurred: {e:#}"));
                    }
                }
                log.debug(format!(
                    "Waiting for {} before trying to mirror.",
                    settings.refresh_rate
                ));
            }
            Err(e) => error!("Failed to build database clients: {e:#}"),
        }
        interval
    }

    /// One reachability-gated pass over the configured buckets
    pub fn run_cycle(
        &self,
        settings: &Settings,
        clients: &MirrorClients,
        log: &EventLog<'_>,
    ) -> CycleOutcome {
        let host = strip_port(&settings.remote_url);
        if !self.ping.is_reachable(&host) {
            log.debug("Unable to ping the remote database.");
            return CycleOutcome::Skipped;
        }
        log.debug("Successfully pinged the remote database.");

        let mut points = 0;
        for bucket in &settings.buckets {
            // The first failure aborts the rest of the list for this cycle
            match sync_bucket(
                clients,
                log,
                bucket,
                &settings.local_org,
                settings.recover_since,
            ) {
                Ok(written) => points += written,
                Err(e) => return CycleOutcome::Failed(e),
            }
        }
        CycleOutcome::Synced {
            buckets: settings.buckets.len(),
            points,
        }
    }

    /// Sleep until the deadline, polling so shutdown is observed promptly
    fn wait(&self, interval: Duration, shutdown: &AtomicBool) {
        let deadline = Instant::now() + interval;
        loop {
            if shutdown.load(Ordering::Relaxed) {
                return;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            std::thread::sleep(remaining.min(WAIT_POLL));
        }
    }

    /// Release the guard and report the clean shutdown
    fn shutdown_cleanup(&self) -> Result<()> {
        debug!("Shutdown requested");
        self.guard.release()?;
        // Best effort: the local database may be unreachable at shutdown
        if let Ok(settings) = self.settings.load() {
            if let Ok(clients) = self.factory.connect(&settings) {
                EventLog::new(clients.local_write.as_ref(), &settings.local_org)
                    .debug("Mirror service shutdown manually.");
            }
        }
        info!("Mirror service shutdown.");
        Ok(())
    }
}
