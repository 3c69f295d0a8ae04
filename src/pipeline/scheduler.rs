//! Periodic runner: fetch and process on a fixed interval until shut down.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::pipeline::coordinator::Pipeline;
use crate::pipeline::types::BatchReport;
use crate::source::{FetchCriteria, MailSource};

/// How often an idle scheduler looks at the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// Spawn a background task that runs the pipeline every `interval`.
///
/// The first run starts immediately. Setting the returned flag stops the
/// loop after the current run; the task resolves to the accumulated report.
pub fn spawn_scheduler(
    pipeline: Arc<Pipeline>,
    source: Arc<dyn MailSource>,
    criteria: FetchCriteria,
    interval: Duration,
) -> (JoinHandle<BatchReport>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(
            source = source.name(),
            "Scheduler started, running every {}s",
            interval.as_secs_f64()
        );

        let mut total = BatchReport::default();
        let mut runs = 0u64;
        let mut tick = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = wait_for_shutdown(&shutdown) => {}
            }

            if shutdown.load(Ordering::Relaxed) {
                info!(runs, processed = total.processed, failed = total.failed, "Scheduler shutting down");
                return total;
            }

            runs += 1;
            match pipeline.run_once(source.as_ref(), &criteria, Utc::now()).await {
                Ok(report) => {
                    if report.aborted {
                        warn!(run = runs, "Scheduled run aborted by a store failure");
                    }
                    total.absorb(report);
                }
                Err(e) => error!(run = runs, error = %e, "Scheduled run failed"),
            }
        }
    });

    (handle, shutdown_flag)
}

async fn wait_for_shutdown(flag: &AtomicBool) {
    while !flag.load(Ordering::Relaxed) {
        tokio::time::sleep(SHUTDOWN_POLL).await;
    }
}
