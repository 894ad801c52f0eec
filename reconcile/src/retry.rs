//! Exponential backoff for retryable AWS calls within one reconciliation's
//! deadline (spec.md §4.5 step 5, §5 "Timeout"). A call that is still
//! retryable when the deadline passes becomes [`ReconcileError::DeadlineExceeded`],
//! which the engine re-enqueues rather than treats as a hard failure.

use crate::error::ReconcileError;
use elbv2_controller_aws::ClientError;
use std::future::Future;
use std::time::{Duration, Instant};

const INITIAL_BACKOFF: Duration = Duration::from_millis(200);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

pub async fn with_backoff<T, F, Fut>(deadline: Instant, operation: &'static str, mut f: F) -> Result<T, ReconcileError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() => {
                if Instant::now() >= deadline {
                    return Err(ReconcileError::DeadlineExceeded(operation));
                }
                let sleep_for = backoff.min(MAX_BACKOFF);
                tracing::debug!(operation, ?sleep_for, %e, "retrying after transient AWS error");
                tokio::time::sleep(sleep_for).await;
                backoff *= 2;
            }
            Err(e) => return Err(e.into()),
        }
    }
}
