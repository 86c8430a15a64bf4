//! Background timeout scan.

use std::sync::Arc;
use std::time::Duration;

use roundtable_coordination::application::timeouts::{ScanOptions, TimeoutScanner};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Runs one scan, logging the outcome. Returns the number of sessions
/// processed.
pub async fn run_once(scanner: &TimeoutScanner, max_sessions: usize) -> usize {
    let options = ScanOptions {
        max_sessions,
        ..ScanOptions::default()
    };
    match scanner.scan(&options).await {
        Ok(scan) => {
            let processed = scan.report.as_ref().map_or(0, |r| r.processed);
            debug!(
                candidates = scan.candidates.len(),
                processed, "background timeout scan complete"
            );
            processed
        }
        Err(e) => {
            error!(error = %e, "background timeout scan failed");
            0
        }
    }
}

/// Spawns the periodic scan. The first tick fires immediately.
pub fn spawn(scanner: Arc<TimeoutScanner>, period: Duration, max_sessions: usize) -> JoinHandle<()> {
    info!(period_secs = period.as_secs(), max_sessions, "starting timeout scan loop");
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            run_once(&scanner, max_sessions).await;
        }
    })
}
