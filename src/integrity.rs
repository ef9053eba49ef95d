//! Store integrity checks
//!
//! Runs SQLite's own structural self-test against a store file. The verdict
//! is pessimistic: anything other than a clean `ok` counts as unhealthy.

use std::path::Path;

use tracing::{debug, warn};

use crate::error::VaultResult;
use crate::storage::sqlite::open_read_only;

/// Run `PRAGMA integrity_check` and return every message it reports
///
/// A healthy store yields exactly `["ok"]`. Open or query failures are
/// returned as errors.
pub fn integrity_messages(path: &Path) -> VaultResult<Vec<String>> {
    let conn = open_read_only(path)?;
    let mut stmt = conn.prepare("PRAGMA integrity_check")?;
    let messages = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(messages)
}

/// Check whether the store at `path` is structurally sound
///
/// Never fails: a missing file, an unopenable file and a failed check all
/// return `false`.
pub fn check_integrity(path: &Path) -> bool {
    if !path.is_file() {
        debug!(path = %path.display(), "integrity check: store file missing");
        return false;
    }

    match integrity_messages(path) {
        Ok(messages) if messages.len() == 1 && messages[0] == "ok" => true,
        Ok(messages) => {
            warn!(
                path = %path.display(),
                problems = messages.len(),
                first = messages.first().map(String::as_str).unwrap_or(""),
                "integrity check reported problems"
            );
            false
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "integrity check could not run");
            false
        }
    }
}
