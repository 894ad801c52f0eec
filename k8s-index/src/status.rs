//! Per-object status outcomes the Model Builder records while it works
//! (spec.md §4.4 step 4, §7). `elbv2-controller-k8s-status` turns these
//! into `metav1.Condition`s and applies them with optimistic concurrency;
//! the Model Builder itself never talks to the K8s API.

use elbv2_controller_core::ParentRef;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteStatusUpdate {
    pub namespace: String,
    pub name: String,
    pub kind: &'static str,
    pub parents: Vec<RouteParentStatus>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteParentStatus {
    pub parent_ref: ParentRef,
    pub accepted: bool,
    pub resolved_refs: bool,
    pub reason: StatusReason,
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusReason {
    Accepted,
    NoMatchingParent,
    NoMatchingListenerHostname,
    NotAllowedByListeners,
    RefNotPermitted,
    Overlapping,
    InvalidProtocolPort,
}

impl StatusReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusReason::Accepted => "Accepted",
            StatusReason::NoMatchingParent => "NoMatchingParent",
            StatusReason::NoMatchingListenerHostname => "NoMatchingListenerHostname",
            StatusReason::NotAllowedByListeners => "NotAllowedByListeners",
            StatusReason::RefNotPermitted => "RefNotPermitted",
            StatusReason::Overlapping => "Overlapping",
            StatusReason::InvalidProtocolPort => "InvalidProtocolPort",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayStatusUpdate {
    pub namespace: String,
    pub name: String,
    pub accepted: bool,
    pub reason: StatusReason,
    pub message: String,
}
