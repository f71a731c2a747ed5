//! The backup cycle.
//!
//! Every tick backs up all databases of the [BackupPlan] one after another, then
//! the [Scheduler] sleeps for the interval. The interval is therefore the pause
//! between the end of a tick and the start of the next one.

use std::num::NonZeroUsize;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use chrono::{Local, NaiveDateTime};

use super::command::{timestamp, BackupCommand};
use super::executor::{execute, CommandError, Outcome};
use super::Connection;
use crate::config::BackupConfig;
use crate::driver::Session;

/// What to back up and how often.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPlan {
    /// Directory the server writes the backups to.
    pub directory: String,
    /// Databases in backup order.
    pub databases: Vec<String>,
    pub interval: Duration,
}

impl From<&BackupConfig> for BackupPlan {
    fn from(config: &BackupConfig) -> Self {
        Self {
            directory: config.backup_directory.clone(),
            databases: config.databases().map(String::from).to_vec(),
            interval: config.interval(),
        }
    }
}

/// Signal to stop the [Scheduler].
///
/// Clones share the signal, so it can be triggered from another thread.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        let (stopped, condvar) = &*self.inner;
        *stopped.lock().unwrap_or_else(PoisonError::into_inner) = true;
        condvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleeps for `timeout` unless stopped earlier. Returns whether it was stopped.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (stopped, condvar) = &*self.inner;
        let guard = stopped.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = condvar
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);

        *guard
    }
}

/// Result of backing up a single database.
#[derive(Debug)]
pub struct BackupReport {
    pub command: BackupCommand,
    pub result: Result<Outcome, CommandError>,
}

/// Results of one tick.
#[derive(Debug)]
pub struct CycleReport {
    pub timestamp: String,
    /// Reports in backup order.
    pub backups: Vec<BackupReport>,
}

/// Repeatedly backs up the databases of a [BackupPlan] over a single [Connection].
pub struct Scheduler<S: Session> {
    connection: Connection<S>,
    plan: BackupPlan,
}

impl<S: Session> Scheduler<S> {
    pub fn new(connection: Connection<S>, plan: BackupPlan) -> Self {
        Self { connection, plan }
    }

    pub fn plan(&self) -> &BackupPlan {
        &self.plan
    }

    pub fn connection(&self) -> &Connection<S> {
        &self.connection
    }

    /// Runs ticks until `stop` is triggered or `max_cycles` ticks are done.
    ///
    /// Returns the number of completed ticks.
    pub fn run(&mut self, stop: &StopToken, max_cycles: Option<NonZeroUsize>) -> usize {
        let mut cycles = 0;

        while !stop.is_stopped() {
            self.tick();
            cycles += 1;

            if max_cycles.is_some_and(|max| cycles >= max.get()) {
                log::info!(target: "backup::scheduler", "Finished {cycles} backup cycle(s)");
                return cycles;
            }

            log::info!(
                target: "backup::scheduler",
                "Waiting for {} before next backup...",
                display_interval(self.plan.interval)
            );
            if stop.wait(self.plan.interval) {
                break;
            }
        }

        log::info!(target: "backup::scheduler", "Stopped after {cycles} backup cycle(s)");
        cycles
    }

    /// Backs up every database once.
    pub fn tick(&mut self) -> CycleReport {
        self.tick_at(Local::now().naive_local())
    }

    /// Backs up every database once, naming the backups after `at`.
    pub fn tick_at(&mut self, at: NaiveDateTime) -> CycleReport {
        let timestamp = timestamp(at);
        let commands: Vec<_> = self
            .plan
            .databases
            .iter()
            .map(|database| BackupCommand::new(&self.plan.directory, database, &timestamp))
            .collect();

        for command in &commands {
            log::info!(target: "backup::scheduler", "Executing SQL: {}", command.statement());
        }

        let backups = commands
            .into_iter()
            .map(|command| {
                let database = command.database();
                log::info!(target: "backup::scheduler", "Starting backup for {database}...");

                let result = execute(&mut self.connection, &command.statement()).into_result(database);
                match &result {
                    Ok(Outcome::SuccessWithWarnings) => {
                        log::info!(target: "backup::scheduler", "Backup succeeded with warnings for {database}")
                    }
                    Ok(_) => log::info!(target: "backup::scheduler", "Backup succeeded for {database}"),
                    Err(e) => log::error!(target: "backup::scheduler", "{e}"),
                }

                BackupReport { command, result }
            })
            .collect();

        CycleReport { timestamp, backups }
    }
}

fn display_interval(interval: Duration) -> String {
    let secs = interval.as_secs();
    if secs > 0 && secs % 60 == 0 && interval.subsec_nanos() == 0 {
        format!("{} minute(s)", secs / 60)
    } else {
        format!("{interval:?}")
    }
}
