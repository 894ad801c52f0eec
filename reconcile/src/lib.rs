//! The Reconciliation Engine and Target Synchronizer (spec.md §4.5, §4.6):
//! everything downstream of the Model Builder's [`core::Graph`] that talks
//! to AWS and to Kubernetes Pod/Endpoints objects.
//!
//! [`engine::Engine`] drives one Gateway's desired graph to match live ELBv2
//! state: partition the cluster-wide graph down to one Gateway, diff against
//! tagged live resources, apply creates/modifies with retry, hold orphaned
//! target groups for a stabilization window, then delete. [`sync::TargetSynchronizer`]
//! runs independently against the same reconciled graph, keeping each
//! `TargetGroupBinding`'s AWS target registrations in step with the bound
//! Service's endpoints and flipping Pod readiness gates as target health
//! settles. [`global_accelerator::GlobalAcceleratorReconciler`] runs off its
//! own watch of `GlobalAccelerator` custom resources, since an accelerator
//! isn't part of any one Gateway's owned-resource graph.

pub mod apply;
pub mod diff;
pub mod engine;
pub mod error;
pub mod gc;
pub mod global_accelerator;
pub mod live;
pub mod retry;
pub mod sync;
pub mod tags;

pub use engine::Engine;
pub use error::{ReconcileError, Requeue};
pub use global_accelerator::GlobalAcceleratorReconciler;
pub use sync::TargetSynchronizer;
