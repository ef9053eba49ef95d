//! Display formatting for terminal output
//!
//! Plain-text tables and summaries for archives, status and recovery results.

pub mod recovery;
pub mod snapshot;

pub use recovery::{format_diagnosis, format_rebuild, format_repair, format_restore};
pub use snapshot::{format_backup_outcome, format_snapshot_list, format_status};

/// Format a duration in human-readable form
pub fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }

    format!("{}mo", days / 30)
}

/// Format a file size in human-readable form
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BackupType, SnapshotMeta};
    use chrono::{Duration, Utc};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::seconds(42)), "42s");
        assert_eq!(format_duration(Duration::minutes(5)), "5m");
        assert_eq!(format_duration(Duration::hours(3)), "3h");
        assert_eq!(format_duration(Duration::days(2)), "2d");
        assert_eq!(format_duration(Duration::days(65)), "2mo");
        assert_eq!(format_duration(Duration::seconds(-3)), "0s");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_empty_listing() {
        let grouped: BTreeMap<BackupType, Vec<SnapshotMeta>> =
            BackupType::ALL.iter().map(|t| (*t, Vec::new())).collect();
        assert!(format_snapshot_list(&grouped, Utc::now()).starts_with("No backups found."));
    }

    #[test]
    fn test_listing_flags_unverified() {
        let now = Utc::now();
        let meta = SnapshotMeta {
            filename: "snapshot_emergency_x.zip".into(),
            path: PathBuf::from("/tmp/snapshot_emergency_x.zip"),
            backup_type: BackupType::Emergency,
            created_at: now - Duration::hours(2),
            size_bytes: 4096,
            manifest: None,
        };
        let mut grouped = BTreeMap::new();
        grouped.insert(BackupType::Emergency, vec![meta]);

        let text = format_snapshot_list(&grouped, now);
        assert!(text.contains("emergency (1)"));
        assert!(text.contains("NO"));
        assert!(text.contains("2h"));
        assert!(text.ends_with("Total: 1 backup(s)"));
    }
}
