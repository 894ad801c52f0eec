//! The plain-value input to the Model Builder (spec.md §4.4 "Input").
//!
//! Every type here is a pure, already-decoded value — no `kube`/`k8s-openapi`
//! types leak past the `index` module that watches the K8s API and builds a
//! `Snapshot` on each reconciliation. Keeping the builder's input free of API
//! machinery is what makes P1/P2 (determinism, ordering-independence)
//! checkable with plain unit tests.

use ahash::AHashMap as HashMap;
use elbv2_controller_k8s_api::crd::{
    ListenerRuleConfigurationSpec, LoadBalancerConfigurationSpec, TargetGroupConfigurationSpec,
};
use std::collections::BTreeSet;

#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub cluster: String,
    /// The `controllerName` this installation of the controller reconciles
    /// `GatewayClass`es for (spec.md §4.4 step 1).
    pub controller_name: String,
    pub gateways: Vec<GatewaySnapshot>,
    pub routes: Vec<elbv2_controller_core::Route>,
    pub reference_grants: Vec<ReferenceGrant>,
    /// Keyed by `(namespace, service name)`.
    pub target_group_configurations: HashMap<(String, String), TargetGroupConfigurationSpec>,
    /// Gateway-level default `TargetGroupConfiguration`, keyed by
    /// `(gateway namespace, gateway name)` — the fallback tier below a
    /// service's own `TargetGroupConfiguration` and above the hardcoded
    /// default (spec.md §4.4 step 6).
    pub gateway_target_group_configurations: HashMap<(String, String), TargetGroupConfigurationSpec>,
    /// Keyed by `(namespace, ListenerRuleConfiguration name)`.
    pub listener_rule_configurations: HashMap<(String, String), ListenerRuleConfigurationSpec>,
    /// Keyed by `(namespace, Service name)`.
    pub services: HashMap<(String, String), ServiceSnapshot>,
}

#[derive(Clone, Debug)]
pub struct GatewaySnapshot {
    pub namespace: String,
    pub name: String,
    pub gateway_class_name: String,
    pub gateway_class_controller_name: String,
    /// `LoadBalancerConfiguration` attached to the `GatewayClass` via
    /// `parametersRef`, if any.
    pub class_lbc: Option<LoadBalancerConfigurationSpec>,
    /// `LoadBalancerConfiguration` attached to this `Gateway` directly,
    /// overriding `class_lbc` per field (spec.md §4.4 step 2).
    pub gateway_lbc: Option<LoadBalancerConfigurationSpec>,
    /// `(namespace, name)` of the `LoadBalancerConfiguration` `gateway_lbc`
    /// was resolved from, carried through so the Reconciliation Engine can
    /// write the load balancer ARN back onto it once one exists. The
    /// `GatewayClass`-level configuration is shared by every Gateway that
    /// class serves, so it has no single owner to receive a status write and
    /// is intentionally left untracked here.
    pub gateway_lbc_ref: Option<(String, String)>,
    pub listeners: Vec<GatewayListenerSpec>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayListenerSpec {
    pub name: String,
    pub port: u16,
    pub protocol: GatewayProtocol,
    pub hostname: Option<String>,
    /// Already-resolved certificate ARNs (secret → ACM resolution is a
    /// Cloud Client Facade concern, out of the Model Builder's scope).
    pub certificate_refs: Vec<String>,
    /// `true` when the listener's `UDP`/`TCP` protocol should upgrade to
    /// `QUIC`/`TCP_QUIC` (spec.md §4.4 step 9's supplemented feature).
    pub quic_enabled: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GatewayProtocol {
    Http,
    Https,
    Tls,
    Tcp,
    Udp,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceGrant {
    /// The namespace the grant object itself lives in — this is the
    /// namespace being granted *into* (the backend's namespace).
    pub namespace: String,
    pub from_group: String,
    pub from_kind: String,
    pub from_namespace: String,
    pub to_group: String,
    pub to_kind: String,
    /// `None` authorizes every name of `to_kind`.
    pub to_name: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ServiceSnapshot {
    pub ports: BTreeSet<u16>,
}
