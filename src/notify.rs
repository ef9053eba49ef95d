//! Operator notifications
//!
//! Escalations leave the crate through the `Notifier` trait; delivery (chat
//! message, mail, pager) belongs to the embedding application.

use std::fmt;
use std::path::PathBuf;

use tracing::error;

use crate::models::BackupType;

/// Something an operator should hear about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupEvent {
    /// A scheduled or forced backup failed
    BackupFailed { backup_type: BackupType, error: String },
    /// No daily backup succeeded within the grace period
    DailyOverdue { hours_since_last: Option<i64> },
    /// The live store failed its integrity check
    CorruptionDetected { store: PathBuf },
}

impl fmt::Display for BackupEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BackupFailed { backup_type, error } => {
                write!(f, "{} backup failed: {}", backup_type, error)
            }
            Self::DailyOverdue {
                hours_since_last: Some(hours),
            } => write!(f, "Daily backup overdue: last success {}h ago", hours),
            Self::DailyOverdue {
                hours_since_last: None,
            } => write!(f, "Daily backup overdue: no successful daily backup on record"),
            Self::CorruptionDetected { store } => {
                write!(f, "Live store failed integrity check: {}", store.display())
            }
        }
    }
}

/// Delivery channel for operator escalations
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &BackupEvent);
}

/// Notifier that only writes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &BackupEvent) {
        error!(event = %event, "operator attention needed");
    }
}
