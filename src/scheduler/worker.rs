//! The single worker that executes every scheduled and forced job

use std::collections::BTreeMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Local, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::backup::BackupOutcome;
use crate::error::VaultResult;
use crate::models::BackupType;
use crate::notify::{BackupEvent, Notifier};
use crate::service::BackupService;

/// A unit of work for the worker thread
pub enum Job {
    /// Time-triggered backup
    Scheduled(BackupType),
    /// Periodic health check
    Health,
    /// Ad-hoc backup whose result goes back to the caller
    Force {
        backup_type: BackupType,
        reply: mpsc::Sender<VaultResult<BackupOutcome>>,
    },
    Shutdown,
}

/// Point-in-time scheduler statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStats {
    pub running: bool,
    pub successes: u64,
    pub failures: u64,
    pub last_run: BTreeMap<BackupType, DateTime<Utc>>,
    pub last_success: BTreeMap<BackupType, DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_health_check: Option<DateTime<Utc>>,
    pub archive_count: usize,
    pub archive_bytes: u64,
    pub next_daily: Option<DateTime<Local>>,
    pub next_weekly: Option<DateTime<Local>>,
    pub next_health_check: Option<DateTime<Local>>,
}

/// Everything a job needs; cheap to clone across threads
#[derive(Clone)]
pub struct WorkerContext {
    pub service: Arc<BackupService>,
    pub notifier: Arc<dyn Notifier>,
    pub stats: Arc<Mutex<SchedulerStats>>,
    pub overdue_after: Duration,
}

impl WorkerContext {
    pub fn stats(&self) -> MutexGuard<'_, SchedulerStats> {
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run one backup and record the outcome; failures are reported, never raised past here
    pub fn run_backup(&self, backup_type: BackupType) -> VaultResult<BackupOutcome> {
        let result = self.service.create_backup(backup_type);
        let now = Utc::now();

        let mut stats = self.stats();
        stats.last_run.insert(backup_type, now);
        match &result {
            Ok(outcome) => {
                stats.successes += 1;
                stats.last_success.insert(backup_type, now);
                debug!(%backup_type, path = %outcome.snapshot.path.display(), "scheduled job succeeded");
            }
            Err(e) => {
                stats.failures += 1;
                stats.last_error = Some(format!("{}: {}", backup_type, e));
                drop(stats);
                error!(%backup_type, error = %e, "backup job failed");
                self.notifier.notify(&BackupEvent::BackupFailed {
                    backup_type,
                    error: e.to_string(),
                });
            }
        }

        result
    }

    /// Refresh totals, then force backups the state calls for
    ///
    /// A store failing its integrity check gets an emergency backup; a
    /// healthy store without a recent daily success gets a daily one.
    pub fn health_check(&self) {
        let now = Utc::now();

        match self.service.archives().status() {
            Ok(status) => {
                let mut stats = self.stats();
                stats.archive_count = status.total_count;
                stats.archive_bytes = status.total_bytes;
            }
            Err(e) => warn!(error = %e, "health check could not read archive status"),
        }
        self.stats().last_health_check = Some(now);

        if !self.service.check_store_integrity() {
            let store = self.service.paths().store_file();
            warn!(path = %store.display(), "health check: live store failed integrity check");
            self.notifier
                .notify(&BackupEvent::CorruptionDetected { store });
            let _ = self.run_backup(BackupType::Emergency);
            return;
        }

        let last_daily = self.stats().last_success.get(&BackupType::Daily).copied();
        let overdue = match last_daily {
            Some(at) => now - at > self.overdue_after,
            None => true,
        };

        if overdue {
            let hours_since_last = last_daily.map(|at| (now - at).num_hours());
            info!(?hours_since_last, "daily backup overdue, forcing one");
            self.notifier
                .notify(&BackupEvent::DailyOverdue { hours_since_last });
            let _ = self.run_backup(BackupType::Daily);
        }
    }
}

/// Drain the queue until shutdown or until every sender is gone
pub fn run(ctx: WorkerContext, jobs: mpsc::Receiver<Job>) {
    info!("backup worker started");
    for job in jobs {
        match job {
            Job::Scheduled(backup_type) => {
                let _ = ctx.run_backup(backup_type);
            }
            Job::Health => ctx.health_check(),
            Job::Force { backup_type, reply } => {
                let result = ctx.run_backup(backup_type);
                if reply.send(result).is_err() {
                    debug!(%backup_type, "forced backup caller went away");
                }
            }
            Job::Shutdown => break,
        }
    }
    info!("backup worker stopped");
}
