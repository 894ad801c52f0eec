//! AWS Gateway API Load Balancer Controller — Model Builder
//!
//! Watches the Gateway API and this controller's CRDs, maintains an
//! in-memory snapshot of cluster state, and turns it into a desired
//! [`core::Graph`] plus the status updates that belong on Gateways and
//! Routes (spec.md §4.4). Reconciliation against live AWS state is the
//! `elbv2-controller-reconcile` crate's job; this crate never talks to AWS.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod attach;
pub mod builder;
mod convert;
mod index;
mod refgrant;
pub mod snapshot;
pub mod status;

pub use self::builder::{build, BuildError, BuildOutput};
pub use self::index::{index, Index, SharedIndex, Watches};
pub use self::snapshot::{
    GatewayListenerSpec, GatewayProtocol, GatewaySnapshot, ReferenceGrant, ServiceSnapshot,
    Snapshot,
};
pub use self::status::{GatewayStatusUpdate, RouteParentStatus, RouteStatusUpdate, StatusReason};

pub use elbv2_controller_core as core;
pub use elbv2_controller_k8s_api as k8s;
