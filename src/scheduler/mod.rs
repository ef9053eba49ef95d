//! Backup scheduler
//!
//! Two threads: a timer that only decides *when* and enqueues jobs, and a
//! single worker that drains the queue. Every scheduled, overdue, corruption
//! triggered and forced backup goes through that one worker.

mod schedule;
mod worker;

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::backup::BackupOutcome;
use crate::error::{VaultError, VaultResult};
use crate::models::BackupType;
use crate::notify::Notifier;
use crate::service::BackupService;

pub use schedule::{next_daily, next_weekly, Schedule};
pub use worker::SchedulerStats;

use worker::{Job, WorkerContext};

/// Longest the timer sleeps before re-reading the clock
const MAX_TIMER_SLEEP: std::time::Duration = std::time::Duration::from_secs(60);

/// Lifecycle state of the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

struct Threads {
    jobs: mpsc::Sender<Job>,
    stop_timer: mpsc::Sender<()>,
    timer: JoinHandle<()>,
    worker: JoinHandle<()>,
}

/// Drives scheduled backups and health checks in the background
pub struct Scheduler {
    ctx: WorkerContext,
    schedule: Schedule,
    threads: Option<Threads>,
}

impl Scheduler {
    /// Create a stopped scheduler for `service`
    pub fn new(service: Arc<BackupService>, notifier: Arc<dyn Notifier>) -> VaultResult<Self> {
        let schedule = Schedule::from_settings(&service.settings().schedule)?;
        Ok(Self {
            ctx: WorkerContext {
                service,
                notifier,
                stats: Arc::new(Mutex::new(SchedulerStats::default())),
                overdue_after: schedule.overdue_after,
            },
            schedule,
            threads: None,
        })
    }

    pub fn state(&self) -> SchedulerState {
        if self.threads.is_some() {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    /// Start the timer and worker threads; a second call only warns
    pub fn start(&mut self) -> VaultResult<()> {
        if self.threads.is_some() {
            warn!("scheduler already running");
            return Ok(());
        }

        self.seed_last_daily();

        let (jobs_tx, jobs_rx) = mpsc::channel();
        let (stop_tx, stop_rx) = mpsc::channel();

        let worker_ctx = self.ctx.clone();
        let worker = thread::Builder::new()
            .name("streakvault-worker".into())
            .spawn(move || worker::run(worker_ctx, jobs_rx))
            .map_err(|e| VaultError::Scheduler(format!("Failed to spawn worker: {}", e)))?;

        let timer_jobs = jobs_tx.clone();
        let timer_stats = Arc::clone(&self.ctx.stats);
        let schedule = self.schedule;
        let timer = match thread::Builder::new()
            .name("streakvault-timer".into())
            .spawn(move || run_timer(schedule, timer_jobs, stop_rx, timer_stats))
        {
            Ok(handle) => handle,
            Err(e) => {
                let _ = jobs_tx.send(Job::Shutdown);
                let _ = worker.join();
                return Err(VaultError::Scheduler(format!("Failed to spawn timer: {}", e)));
            }
        };

        self.ctx.stats().running = true;
        self.threads = Some(Threads {
            jobs: jobs_tx,
            stop_timer: stop_tx,
            timer,
            worker,
        });
        info!("scheduler started");
        Ok(())
    }

    /// Cancel pending timers, let the worker finish its current job, and join both threads
    pub fn stop(&mut self) -> VaultResult<()> {
        let Some(threads) = self.threads.take() else {
            debug!("scheduler already stopped");
            return Ok(());
        };

        drop(threads.stop_timer);
        let _ = threads.jobs.send(Job::Shutdown);

        let timer = threads.timer.join();
        let worker = threads.worker.join();
        {
            let mut stats = self.ctx.stats();
            stats.running = false;
            stats.next_daily = None;
            stats.next_weekly = None;
            stats.next_health_check = None;
        }

        if timer.is_err() || worker.is_err() {
            return Err(VaultError::Scheduler(
                "a scheduler thread panicked".into(),
            ));
        }
        info!("scheduler stopped");
        Ok(())
    }

    /// Run a backup now, through the worker queue when running
    pub fn force_backup(&self, backup_type: BackupType) -> VaultResult<BackupOutcome> {
        match &self.threads {
            Some(threads) => {
                let (reply_tx, reply_rx) = mpsc::channel();
                threads
                    .jobs
                    .send(Job::Force {
                        backup_type,
                        reply: reply_tx,
                    })
                    .map_err(|_| VaultError::Scheduler("worker is not accepting jobs".into()))?;
                reply_rx
                    .recv()
                    .map_err(|_| VaultError::Scheduler("worker stopped before replying".into()))?
            }
            None => self.ctx.run_backup(backup_type),
        }
    }

    /// Run the health check now: queued when running, inline when stopped
    pub fn health_check(&self) -> VaultResult<()> {
        match &self.threads {
            Some(threads) => threads
                .jobs
                .send(Job::Health)
                .map_err(|_| VaultError::Scheduler("worker is not accepting jobs".into())),
            None => {
                self.ctx.health_check();
                Ok(())
            }
        }
    }

    /// Snapshot of the current statistics
    pub fn stats(&self) -> SchedulerStats {
        self.ctx.stats().clone()
    }

    /// Treat the newest daily archive as the last daily success
    fn seed_last_daily(&self) {
        match self.ctx.service.archives().latest_of(BackupType::Daily) {
            Ok(Some(latest)) => {
                let mut stats = self.ctx.stats();
                let seeded = stats
                    .last_success
                    .get(&BackupType::Daily)
                    .map_or(latest.created_at, |known| (*known).max(latest.created_at));
                stats.last_success.insert(BackupType::Daily, seeded);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "could not read daily archives at startup"),
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.threads.is_some() {
            let _ = self.stop();
        }
    }
}

fn run_timer(
    schedule: Schedule,
    jobs: mpsc::Sender<Job>,
    stop: mpsc::Receiver<()>,
    stats: Arc<Mutex<SchedulerStats>>,
) {
    let mut next = match Deadlines::first(&schedule, Local::now()) {
        Ok(next) => next,
        Err(e) => {
            warn!(error = %e, "timer could not compute its schedule");
            return;
        }
    };
    next.publish(&stats);

    loop {
        let wait = (next.earliest() - Local::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
            .min(MAX_TIMER_SLEEP);

        match stop.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        let now = Local::now();
        let mut due = Vec::new();
        if next.daily <= now {
            due.push(Job::Scheduled(BackupType::Daily));
        }
        if next.weekly <= now {
            due.push(Job::Scheduled(BackupType::Weekly));
        }
        if next.health <= now {
            due.push(Job::Health);
        }
        if due.is_empty() {
            continue;
        }

        for job in due {
            if jobs.send(job).is_err() {
                return;
            }
        }
        if let Err(e) = next.advance(&schedule, now) {
            warn!(error = %e, "timer could not compute its next deadline");
            return;
        }
        next.publish(&stats);
    }
    debug!("timer stopped");
}

struct Deadlines {
    daily: DateTime<Local>,
    weekly: DateTime<Local>,
    health: DateTime<Local>,
}

impl Deadlines {
    fn first(schedule: &Schedule, now: DateTime<Local>) -> VaultResult<Self> {
        Ok(Self {
            daily: next_daily(now, schedule.daily_at)?,
            weekly: next_weekly(now, schedule.weekly_day, schedule.weekly_at)?,
            health: now + schedule.health_every,
        })
    }

    fn earliest(&self) -> DateTime<Local> {
        self.daily.min(self.weekly).min(self.health)
    }

    fn advance(&mut self, schedule: &Schedule, now: DateTime<Local>) -> VaultResult<()> {
        if self.daily <= now {
            self.daily = next_daily(now, schedule.daily_at)?;
        }
        if self.weekly <= now {
            self.weekly = next_weekly(now, schedule.weekly_day, schedule.weekly_at)?;
        }
        if self.health <= now {
            self.health = now + schedule.health_every;
        }
        Ok(())
    }

    fn publish(&self, stats: &Mutex<SchedulerStats>) {
        let mut stats = stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        stats.next_daily = Some(self.daily);
        stats.next_weekly = Some(self.weekly);
        stats.next_health_check = Some(self.health);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::BackupEvent;
    use crate::test_support::{sample_env, truncate_in_half};
    use std::time::Duration as StdDuration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingNotifier {
        events: Mutex<Vec<BackupEvent>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, event: &BackupEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn scheduler_for(
        users: u32,
        entries: u32,
    ) -> (Scheduler, Arc<BackupService>, Arc<RecordingNotifier>, TempDir) {
        let (paths, settings, temp) = sample_env(users, entries);
        let service = Arc::new(BackupService::new(paths, settings));
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = Scheduler::new(Arc::clone(&service), notifier.clone()).unwrap();
        (scheduler, service, notifier, temp)
    }

    #[test]
    fn test_start_is_idempotent_and_stop_joins() {
        let (mut scheduler, _service, _notifier, _temp) = scheduler_for(1, 1);
        assert_eq!(scheduler.state(), SchedulerState::Stopped);

        scheduler.start().unwrap();
        scheduler.start().unwrap();
        assert!(scheduler.is_running());

        std::thread::sleep(StdDuration::from_millis(50));
        let stats = scheduler.stats();
        assert!(stats.running);
        assert!(stats.next_daily.is_some());
        assert!(stats.next_weekly.is_some());

        scheduler.stop().unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert!(!scheduler.stats().running);
        scheduler.stop().unwrap();
    }

    #[test]
    fn test_force_backup_through_worker() {
        let (mut scheduler, service, _notifier, _temp) = scheduler_for(3, 5);
        scheduler.start().unwrap();

        let outcome = scheduler.force_backup(BackupType::Manual).unwrap();
        assert!(outcome.snapshot.path.exists());
        scheduler.stop().unwrap();

        let stats = scheduler.stats();
        assert_eq!(stats.successes, 1);
        assert!(stats.last_success.contains_key(&BackupType::Manual));
        assert_eq!(service.archives().list(None).unwrap().len(), 1);
    }

    #[test]
    fn test_health_check_forces_overdue_daily() {
        let (scheduler, service, notifier, _temp) = scheduler_for(2, 2);

        scheduler.health_check().unwrap();

        let daily = service.archives().list(Some(BackupType::Daily)).unwrap();
        assert_eq!(daily.len(), 1);
        let events = notifier.events.lock().unwrap();
        assert!(matches!(
            events[0],
            BackupEvent::DailyOverdue {
                hours_since_last: None
            }
        ));
        assert!(scheduler.stats().last_health_check.is_some());
    }

    #[test]
    fn test_recent_daily_archive_is_not_overdue() {
        let (mut scheduler, service, notifier, _temp) = scheduler_for(2, 2);
        service.create_backup(BackupType::Daily).unwrap();

        scheduler.start().unwrap();
        scheduler.stop().unwrap();
        scheduler.health_check().unwrap();

        assert_eq!(service.archives().list(Some(BackupType::Daily)).unwrap().len(), 1);
        assert!(notifier.events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_corruption_forces_emergency_backup() {
        let (scheduler, service, notifier, _temp) = scheduler_for(3, 5);
        truncate_in_half(&service.paths().store_file());

        scheduler.health_check().unwrap();

        let emergency = service.archives().list(Some(BackupType::Emergency)).unwrap();
        assert_eq!(emergency.len(), 1);
        assert!(!emergency[0].integrity_verified());
        assert!(service
            .archives()
            .list(Some(BackupType::Daily))
            .unwrap()
            .is_empty());
        let events = notifier.events.lock().unwrap();
        assert!(matches!(events[0], BackupEvent::CorruptionDetected { .. }));
    }

    #[test]
    fn test_failures_are_counted_and_notified() {
        let (scheduler, service, notifier, _temp) = scheduler_for(1, 1);
        truncate_in_half(&service.paths().store_file());

        assert!(scheduler.force_backup(BackupType::Manual).is_err());

        let stats = scheduler.stats();
        assert_eq!(stats.failures, 1);
        assert!(stats.last_error.unwrap().starts_with("manual"));
        assert!(matches!(
            notifier.events.lock().unwrap()[0],
            BackupEvent::BackupFailed {
                backup_type: BackupType::Manual,
                ..
            }
        ));
    }
}
