//! Recovery display formatting

use crate::backup::RestoreOperation;
use crate::recovery::{DiagnosisReport, RebuildOutcome, RepairOutcome, RepairTier};

/// Format a diagnosis for the terminal
pub fn format_diagnosis(report: &DiagnosisReport) -> String {
    let mut output = String::new();
    output.push_str("Store Diagnosis\n");
    output.push_str("===============\n");
    output.push_str(&format!("Path:       {}\n", report.store_path.display()));
    output.push_str(&format!("Exists:     {}\n", yes_no(report.exists)));
    output.push_str(&format!("Accessible: {}\n", yes_no(report.accessible)));
    output.push_str(&format!("Integrity:  {}\n", if report.integrity_ok { "ok" } else { "FAILED" }));

    if !report.schema.is_empty() {
        output.push_str("\nTables:\n");
        let width = report.schema.keys().map(String::len).max().unwrap_or(5);
        for (table, columns) in &report.schema {
            output.push_str(&format!(
                "  {:<width$}  {} column(s)\n",
                table,
                columns.len(),
                width = width
            ));
        }
    }

    let c = &report.consistency;
    let stats = [
        ("Users", c.user_rows),
        ("Duplicate user keys", c.duplicate_user_keys),
        ("Entries", c.entry_rows),
        ("Empty entries", c.empty_entries),
        ("Orphaned entries", c.orphaned_entries),
        ("Foreign key violations", c.foreign_key_violations),
    ];
    if stats.iter().any(|(_, v)| v.is_some()) {
        output.push_str("\nConsistency:\n");
        for (label, value) in stats {
            if let Some(value) = value {
                output.push_str(&format!("  {:<23} {}\n", label, value));
            }
        }
    }

    if !report.corruption_indicators.is_empty() {
        output.push_str("\nProblems:\n");
        for indicator in &report.corruption_indicators {
            output.push_str(&format!("  - {}\n", indicator));
        }
    }

    if !report.repair_recommendations.is_empty() {
        output.push_str("\nRecommended:\n");
        for (i, step) in report.repair_recommendations.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", i + 1, step));
        }
    }

    output.trim_end().to_string()
}

pub fn format_repair(outcome: &RepairOutcome) -> String {
    let mut output = String::new();
    let what = match outcome.tier {
        RepairTier::Transcribed => "Recovered store written",
        RepairTier::Exported => "Table export written",
    };
    output.push_str(&format!("{}: {}\n", what, outcome.output.display()));
    if let Some(copy) = &outcome.safety_copy {
        output.push_str(&format!("Safety copy: {}\n", copy.display()));
    }
    output.push_str(&format!(
        "Recovered {} row(s) from {} table(s)\n",
        outcome.rows_recovered, outcome.tables_recovered
    ));

    if outcome.is_partial() {
        output.push_str("Partial recovery:\n");
        for loss in &outcome.losses {
            output.push_str(&format!(
                "  {} ({} row(s) kept): {}\n",
                loss.table, loss.recovered_rows, loss.reason
            ));
        }
    }
    output.push_str("The live store was not modified.");
    output
}

pub fn format_rebuild(outcome: &RebuildOutcome) -> String {
    let mut output = format!("Live store rebuilt from {}\n", outcome.source.filename);
    if let Some(copy) = &outcome.side_copy {
        output.push_str(&format!("Previous store kept at: {}\n", copy.display()));
    }
    for (table, rows) in &outcome.table_counts {
        output.push_str(&format!("  {:<20} {}\n", table, rows));
    }
    output.trim_end().to_string()
}

pub fn format_restore(operation: &RestoreOperation) -> String {
    let mut output = format!("Restore complete!\n{}\n", operation.summary());
    output.push_str(&format!(
        "Pre-restore snapshot: {}\n",
        operation.pre_restore_snapshot.path.display()
    ));
    if let Some(copy) = &operation.side_copy {
        output.push_str(&format!("Previous store kept at: {}\n", copy.display()));
    }
    for file in &operation.restored_files {
        output.push_str(&format!("  restored {}\n", file.display()));
    }
    for warning in &operation.warnings {
        output.push_str(&format!("  warning: {}\n", warning));
    }
    output.trim_end().to_string()
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
