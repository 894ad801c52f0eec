//! Wires the Model Builder, Reconciliation Engine, Target Synchronizer and
//! status writer into one binary: CLI parsing, leader election, and the
//! admission webhook server are this crate's job; every other concern is
//! delegated to the crate it's named after (spec.md §6 "Out of scope: the
//! thin CLI/flag loader, leader election, CRD scaffolding, webhook TLS
//! bootstrap, metrics export plumbing, logging setup").

pub use elbv2_controller_aws as aws;
pub use elbv2_controller_core as core;
pub use elbv2_controller_k8s_api as k8s;
pub use elbv2_controller_k8s_index as index;
pub use elbv2_controller_k8s_status as status;
pub use elbv2_controller_reconcile as reconcile;

mod admission;
mod args;
mod lease;
mod validation;

pub use self::args::Args;
