use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetType {
    Ip,
    Instance,
    /// Targets an Application Load Balancer (spec.md §4.4 step 8's
    /// NLB→ALB chaining).
    Alb,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpAddressType {
    Ipv4,
    Dualstack,
    DualstackWithoutPublicIpv4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetGroupProtocol {
    Http,
    Https,
    Tcp,
    Udp,
    Tls,
    TcpUdp,
    Quic,
    GenevE,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub protocol: TargetGroupProtocol,
    pub port: Option<u16>,
    pub path: Option<String>,
    pub interval_seconds: u32,
    pub timeout_seconds: u32,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
    pub matcher: Option<String>,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            protocol: TargetGroupProtocol::Http,
            port: None,
            path: Some("/".to_string()),
            interval_seconds: 15,
            timeout_seconds: 5,
            healthy_threshold: 3,
            unhealthy_threshold: 3,
            matcher: Some("200".to_string()),
        }
    }
}

/// Desired state of a target group node. The fingerprint fed into the
/// logical-ID hash (spec.md §4.3: "service namespace/name, servicePort,
/// target type, protocol, TGC fingerprint") is simply this struct: any
/// field change here is, by construction, a fingerprint change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetGroupSpec {
    pub service_namespace: String,
    pub service_name: String,
    pub service_port: u16,
    pub target_type: TargetType,
    pub protocol: TargetGroupProtocol,
    /// `HTTP1`/`HTTP2`/`GRPC`, for `protocol == Http`/`Https` target groups
    /// only. Follows the same fallback chain as `target_type` (spec.md
    /// §4.4 step 6).
    pub protocol_version: Option<String>,
    pub ip_address_type: IpAddressType,
    pub health_check: HealthCheck,
    pub attributes: BTreeMap<String, String>,
    /// Set when `target_type == Alb`: the logical ID of the ALB this NLB
    /// target group forwards to. Resolved to a load-balancer ARN only
    /// after that ALB reconciles (spec.md §9).
    pub alb_target: Option<crate::graph::NodeId>,
}

/// A user- or builder-created binding of a target group ARN to a Service,
/// carrying the networking rules needed to program security groups
/// (spec.md §3, §6 `TargetGroupBinding.spec`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetGroupBindingSpec {
    pub target_group: crate::graph::NodeId,
    pub service_namespace: String,
    pub service_name: String,
    pub service_port: u16,
    pub ingress_rules: Vec<crate::securitygroup::IngressRule>,
}
