//! Periodic embedding trigger
//!
//! Optional background loop that sweeps pending documents on an
//! interval. A consecutive-failure circuit breaker pauses the loop when
//! the provider or store is unhealthy.

use crate::pipeline::EmbeddingPipeline;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Failures before the circuit opens
const MAX_FAILURES: u32 = 5;

/// Pause while the circuit is open
const CIRCUIT_BREAK_DURATION: Duration = Duration::from_secs(30);

/// Run the periodic sweep until cancelled
pub async fn run_periodic(
    pipeline: Arc<EmbeddingPipeline>,
    interval_secs: u64,
    cancel: CancellationToken,
) {
    let interval = Duration::from_secs(interval_secs.max(1));
    info!(interval_secs = interval.as_secs(), "Periodic embedding trigger started");

    let mut consecutive_failures = 0u32;

    loop {
        // Circuit breaker check
        if consecutive_failures >= MAX_FAILURES {
            warn!(
                failures = consecutive_failures,
                "Circuit breaker open, pausing..."
            );
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(CIRCUIT_BREAK_DURATION) => {}
            }
            consecutive_failures = 0;
            info!("Circuit breaker reset, resuming...");
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {
                match pipeline.process_pending(None).await {
                    Ok(report) => {
                        consecutive_failures = 0;
                        if report.processed > 0 {
                            info!(
                                processed = report.processed,
                                failed_chunks = report.failed_chunks,
                                "Periodic embedding sweep complete"
                            );
                        }
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        error!(
                            error = %e,
                            failures = consecutive_failures,
                            "Periodic embedding sweep failed"
                        );
                    }
                }
            }
        }
    }

    info!("Periodic embedding trigger stopped");
}
