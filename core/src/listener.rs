use crate::graph::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Desired state of a load balancer node (spec.md §3).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerSpec {
    pub cluster: String,
    pub gateway_namespace: String,
    pub gateway_name: String,
    pub scheme: Scheme,
    pub ip_address_type: crate::targetgroup::IpAddressType,
    pub kind: LoadBalancerKind,
    pub subnets: Vec<String>,
    pub security_groups: Vec<NodeId>,
    pub attributes: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scheme {
    Internal,
    InternetFacing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadBalancerKind {
    Application,
    Network,
}

impl LoadBalancerSpec {
    #[cfg(test)]
    pub fn test_fixture(name: &str) -> Self {
        Self {
            cluster: "test-cluster".into(),
            gateway_namespace: "default".into(),
            gateway_name: name.into(),
            scheme: Scheme::InternetFacing,
            ip_address_type: crate::targetgroup::IpAddressType::Ipv4,
            kind: LoadBalancerKind::Application,
            subnets: vec![],
            security_groups: vec![],
            attributes: BTreeMap::new(),
            tags: BTreeMap::new(),
        }
    }
}

/// Protocol a listener speaks. `Quic`/`TcpQuic` are the result of the QUIC
/// upgrade described in spec.md §4.4 step 9.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListenerProtocol {
    Http,
    Https,
    Tls,
    Tcp,
    Udp,
    Quic,
    TcpQuic,
}

impl ListenerProtocol {
    /// Whether `self` and `other` belong to the same protocol family for
    /// the purposes of route attachment (spec.md §4.4 step 4, P3).
    pub fn compatible_with(self, other: ListenerProtocol) -> bool {
        use ListenerProtocol::*;
        match (self, other) {
            (Http, Http) | (Https, Https) | (Tls, Tls) => true,
            (Tcp, Tcp) | (Tcp, TcpQuic) | (TcpQuic, Tcp) | (TcpQuic, TcpQuic) => true,
            (Udp, Udp) | (Udp, Quic) | (Quic, Udp) | (Quic, Quic) => true,
            _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlpnPolicy {
    None,
    Http1Only,
    Http2Only,
    Http2Optional,
    Http2Preferred,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutualAuthenticationMode {
    Off,
    Passthrough,
    Verify,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutualAuthentication {
    pub mode: MutualAuthenticationMode,
    pub trust_store: Option<String>,
    pub ignore_client_certificate_expiry: bool,
    pub advertise_trust_store_ca_names: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerAttribute {
    pub key: String,
    pub value: String,
}

/// Desired state of a listener node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerSpec {
    pub load_balancer: NodeId,
    pub protocol: ListenerProtocol,
    pub port: u16,
    pub certificates: Vec<String>,
    pub default_certificate: Option<String>,
    pub ssl_policy: Option<String>,
    pub alpn_policy: Option<AlpnPolicy>,
    pub mutual_authentication: Option<MutualAuthentication>,
    pub attributes: Vec<ListenerAttribute>,
    /// Target groups a listener forwards to directly when it has no
    /// attached rules (e.g. an NLB TCP listener with a single default
    /// action). Populated by §4.4 step 8's NLB→ALB chaining as well.
    pub default_target_groups: Vec<NodeId>,
}

impl ListenerSpec {
    #[cfg(test)]
    pub fn test_fixture(load_balancer: NodeId, port: u16) -> Self {
        Self {
            load_balancer,
            protocol: ListenerProtocol::Http,
            port,
            certificates: vec![],
            default_certificate: None,
            ssl_policy: None,
            alpn_policy: None,
            mutual_authentication: None,
            attributes: vec![],
            default_target_groups: vec![],
        }
    }
}
