//! Snapshot display formatting
//!
//! Formats archive listings and status for terminal output.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::{format_duration, format_size};
use crate::backup::BackupOutcome;
use crate::models::{BackupType, SnapshotMeta};
use crate::service::BackupStatus;

/// Format every archive as one table per type
pub fn format_snapshot_list(
    grouped: &BTreeMap<BackupType, Vec<SnapshotMeta>>,
    now: DateTime<Utc>,
) -> String {
    let total: usize = grouped.values().map(Vec::len).sum();
    if total == 0 {
        return "No backups found.\nCreate one with: streakvault create".to_string();
    }

    let name_width = grouped
        .values()
        .flatten()
        .map(|s| s.filename.len())
        .max()
        .unwrap_or(4)
        .max(4);

    let mut output = String::new();
    for (backup_type, snapshots) in grouped {
        if snapshots.is_empty() {
            continue;
        }
        output.push_str(&format!("{} ({})\n", backup_type, snapshots.len()));
        output.push_str(&format!(
            "  {:<name_width$}  {:>8}  {:>10}  {:>6}  {}\n",
            "File",
            "Age",
            "Size",
            "Users",
            "Verified",
            name_width = name_width,
        ));
        output.push_str(&format!(
            "  {:-<name_width$}  {:->8}  {:->10}  {:->6}  {:-<8}\n",
            "",
            "",
            "",
            "",
            "",
            name_width = name_width,
        ));

        for snapshot in snapshots {
            let users = snapshot
                .manifest
                .as_ref()
                .map(|m| m.user_count.to_string())
                .unwrap_or_else(|| "?".to_string());
            output.push_str(&format!(
                "  {:<name_width$}  {:>8}  {:>10}  {:>6}  {}\n",
                snapshot.filename,
                format_duration(snapshot.age(now)),
                format_size(snapshot.size_bytes),
                users,
                if snapshot.integrity_verified() { "yes" } else { "NO" },
                name_width = name_width,
            ));
        }
        output.push('\n');
    }

    output.push_str(&format!("Total: {} backup(s)", total));
    output
}

/// Format the result of a backup request
pub fn format_backup_outcome(outcome: &BackupOutcome) -> String {
    let snapshot = &outcome.snapshot;
    let mut output = format!(
        "Backup created: {}\nLocation: {}\nSize: {}\n",
        snapshot.filename,
        snapshot.path.display(),
        format_size(snapshot.size_bytes)
    );

    if let Some(manifest) = &snapshot.manifest {
        output.push_str(&format!(
            "Users: {}  Entries: {}\n",
            manifest.user_count, manifest.entry_count
        ));
        if !manifest.integrity_verified {
            output.push_str("Captured WITHOUT a passing integrity check\n");
        }
        for warning in &manifest.warnings {
            output.push_str(&format!("  warning: {}\n", warning));
        }
    }

    if !outcome.retention.removed.is_empty() {
        output.push_str(&format!(
            "Retention removed {} old archive(s)\n",
            outcome.retention.removed.len()
        ));
    }
    for (path, error) in &outcome.retention.failed {
        output.push_str(&format!(
            "  could not remove {}: {}\n",
            path.display(),
            error
        ));
    }

    output.trim_end().to_string()
}

/// Format live store health and archive totals
pub fn format_status(status: &BackupStatus, now: DateTime<Utc>) -> String {
    let mut output = String::new();
    output.push_str("Backup Status\n");
    output.push_str("=============\n");
    output.push_str(&format!("Store:   {}\n", status.store_path.display()));

    let health = if !status.store_exists {
        "missing".to_string()
    } else if status.store_healthy {
        format!("healthy ({})", format_size(status.store_size_bytes))
    } else {
        format!("FAILED integrity check ({})", format_size(status.store_size_bytes))
    };
    output.push_str(&format!("Health:  {}\n", health));
    output.push('\n');

    let archives = &status.archives;
    output.push_str(&format!(
        "Archives: {} ({})\n",
        archives.total_count,
        format_size(archives.total_bytes)
    ));
    for (backup_type, count) in &archives.per_type {
        output.push_str(&format!("  {:<10} {}\n", backup_type.as_str(), count));
    }

    match &archives.most_recent {
        Some(latest) => output.push_str(&format!(
            "Most recent: {} ({} ago)",
            latest.filename,
            format_duration(latest.age(now))
        )),
        None => output.push_str("Most recent: none"),
    }

    output
}
