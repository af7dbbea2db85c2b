use std::str::FromStr;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tracing::{debug, info, warn};

use crate::error::MirrorError;
use crate::feed::FeedClient;
use crate::importer::Importer;
use crate::rdf::RdfConverter;

/// Seconds-resolution cron expression: every five minutes.
pub const DEFAULT_CRON_PATTERN: &str = "0 */5 * * * *";

#[derive(Debug, Clone)]
pub struct Scheduler {
    schedule: Schedule,
}

impl Scheduler {
    pub fn new(schedule: Schedule) -> Self {
        Self { schedule }
    }

    pub fn parse(pattern: &str) -> Result<Self, MirrorError> {
        let schedule = Schedule::from_str(pattern)
            .map_err(|err| MirrorError::InvalidSchedule(format!("{pattern}: {err}")))?;
        Ok(Self::new(schedule))
    }

    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&now).next()
    }

    /// Triggers an import at every tick until the handle is stopped. A tick that
    /// finds a run in progress is skipped.
    pub fn spawn<F, C>(self, importer: Arc<Importer<F, C>>) -> SchedulerHandle
    where
        F: FeedClient + 'static,
        C: RdfConverter + 'static,
    {
        let (stop, stopped) = mpsc::channel::<()>();
        let join = thread::spawn(move || {
            loop {
                let now = Utc::now();
                let Some(next) = self.next_after(now) else {
                    warn!("schedule has no upcoming ticks; polling stopped");
                    return;
                };
                let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
                debug!(next = %next, "waiting for next scheduled import");
                match stopped.recv_timeout(wait) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                }

                match importer.trigger() {
                    Ok(report) => {
                        info!(cursor = %report.cursor, pages = report.pages.len(), "scheduled import done");
                    }
                    Err(MirrorError::ImportInProgress) => {
                        info!("import already running; scheduled tick skipped");
                    }
                    // already logged by the importer
                    Err(_) => {}
                }
            }
        });
        SchedulerHandle { stop, join }
    }
}

pub struct SchedulerHandle {
    stop: Sender<()>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stops future ticks and waits for a tick in flight to finish.
    pub fn stop(self) {
        let _ = self.stop.send(());
        self.wait();
    }

    /// Blocks until the scheduler thread exits, which only happens after `stop`
    /// or when the schedule runs out of ticks.
    pub fn wait(self) {
        if self.join.join().is_err() {
            warn!("scheduler thread panicked");
        }
    }
}
