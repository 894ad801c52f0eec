//! Error taxonomy for the Reconciliation Engine and Target Synchronizer
//! (spec.md §7). Every fallible step returns a [`ReconcileError`]; the
//! driver in [`crate::engine`] inspects the variant to decide whether to
//! retry locally, surface a status condition, or fail the controller.

use elbv2_controller_aws::ClientError;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Cloud(#[from] ClientError),

    #[error(transparent)]
    Graph(#[from] elbv2_controller_core::GraphError),

    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("reconciliation deadline exceeded before {0} converged")]
    DeadlineExceeded(&'static str),

    /// Sentinel carrying the framework's requeue instruction (spec.md §7
    /// "RequeueNeeded / RequeueNeededAfter"): not counted as an error in
    /// metrics, inspected by the driver instead of propagated like other
    /// variants.
    #[error("requeue requested")]
    Requeue(Requeue),
}

#[derive(Debug, Clone, Copy)]
pub enum Requeue {
    Immediate,
    After(Duration),
}

impl ReconcileError {
    /// Whether local retry-with-backoff applies (spec.md §7 "Retryable
    /// transient"). `DeadlineExceeded` is itself produced only after
    /// retries within the deadline are exhausted, so it is not retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReconcileError::Cloud(e) if e.is_retryable())
    }

    pub fn is_requeue(&self) -> bool {
        matches!(self, ReconcileError::Requeue(_))
    }
}
