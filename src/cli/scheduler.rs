//! Foreground scheduler command

use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread;

use tracing::info;

use crate::display::format_size;
use crate::error::VaultResult;
use crate::notify::LogNotifier;
use crate::scheduler::Scheduler;
use crate::service::BackupService;

/// Why the foreground wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The operator pressed Enter
    Line,
    /// stdin is closed or detached, as under a service manager
    InputClosed,
}

/// Block until a line arrives on `input` or it reaches end of input
pub fn wait_for_stop<R: BufRead>(mut input: R) -> io::Result<StopReason> {
    let mut line = String::new();
    match input.read_line(&mut line)? {
        0 => Ok(StopReason::InputClosed),
        _ => Ok(StopReason::Line),
    }
}

/// Run the scheduler until Enter on stdin
///
/// With no terminal attached (stdin at end of input) the scheduler keeps
/// running until the process is terminated.
pub fn run_scheduler(service: Arc<BackupService>) -> VaultResult<()> {
    let mut scheduler = Scheduler::new(service, Arc::new(LogNotifier))?;
    scheduler.start()?;

    let stats = scheduler.stats();
    println!("Scheduler running. Press Enter to stop.");
    if let Some(next) = stats.next_daily {
        println!("  next daily:  {}", next.format("%Y-%m-%d %H:%M"));
    }
    if let Some(next) = stats.next_weekly {
        println!("  next weekly: {}", next.format("%Y-%m-%d %H:%M"));
    }

    if wait_for_stop(io::stdin().lock())? == StopReason::InputClosed {
        info!("stdin closed, scheduler runs until the process is terminated");
        loop {
            thread::park();
        }
    }

    scheduler.stop()?;
    let stats = scheduler.stats();
    println!(
        "Scheduler stopped: {} succeeded, {} failed, {} archive(s) ({})",
        stats.successes,
        stats.failures,
        stats.archive_count,
        format_size(stats.archive_bytes)
    );
    if let Some(error) = stats.last_error {
        println!("Last error: {}", error);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_stops() {
        assert_eq!(wait_for_stop(&b"\n"[..]).unwrap(), StopReason::Line);
        assert_eq!(wait_for_stop(&b"q\nmore"[..]).unwrap(), StopReason::Line);
    }

    #[test]
    fn test_closed_input_is_not_a_stop_request() {
        assert_eq!(wait_for_stop(&b""[..]).unwrap(), StopReason::InputClosed);
        assert_eq!(
            wait_for_stop(io::Cursor::new(Vec::new())).unwrap(),
            StopReason::InputClosed
        );
    }
}
