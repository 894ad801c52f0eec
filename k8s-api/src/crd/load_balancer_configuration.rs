use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tunes scheme, IP address type, subnets, security groups, listener
/// attributes, mTLS trust store and tags for every load balancer the Model
/// Builder derives from a Gateway (spec.md §4.4 step 2, §6).
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "elbv2.k8s.aws",
    version = "v1beta1",
    kind = "LoadBalancerConfiguration",
    status = "LoadBalancerConfigurationStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerConfigurationSpec {
    pub scheme: Option<Scheme>,
    pub ip_address_type: Option<IpAddressType>,

    /// Mutually exclusive with `load_balancer_subnets_selector`.
    pub load_balancer_subnets: Option<Vec<SubnetConfiguration>>,
    pub load_balancer_subnets_selector: Option<BTreeMap<String, Vec<String>>>,

    pub listener_configurations: Option<Vec<ListenerConfiguration>>,

    pub security_groups: Option<Vec<String>>,
    pub security_group_prefixes: Option<Vec<String>>,
    pub source_ranges: Option<Vec<String>>,

    pub load_balancer_attributes: Option<Vec<LoadBalancerAttribute>>,
    pub tags: Option<Vec<LoadBalancerAttribute>>,

    pub enable_icmp: Option<bool>,
    pub manage_backend_security_group_rules: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerConfigurationStatus {
    pub observed_generation: Option<i64>,
    pub conditions: Option<Vec<Condition>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Scheme {
    Internal,
    InternetFacing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum IpAddressType {
    #[serde(rename = "ipv4")]
    Ipv4,
    #[serde(rename = "dualstack")]
    Dualstack,
    #[serde(rename = "dualstack-without-public-ipv4")]
    DualstackWithoutPublicIpv4,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubnetConfiguration {
    pub identifier: String,
    pub eip_allocation: Option<String>,
    pub private_ipv4_allocation: Option<String>,
    pub ipv6_allocation: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct LoadBalancerAttribute {
    pub key: String,
    pub value: String,
}

/// A per-`protocolPort` block of listener tuning, keyed by the pattern
/// `^(HTTP|HTTPS|TLS|TCP|UDP)?:(1-65535)?$` (spec.md §6). Validated by
/// `runtime`'s admission webhook, not here.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListenerConfiguration {
    pub protocol_port: String,
    pub default_certificate: Option<String>,
    pub certificates: Option<Vec<String>>,
    pub ssl_policy: Option<String>,
    pub alpn_policy: Option<AlpnPolicy>,
    pub mutual_authentication: Option<MutualAuthentication>,
    pub listener_attributes: Option<Vec<LoadBalancerAttribute>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum AlpnPolicy {
    None,
    #[serde(rename = "HTTP1Only")]
    Http1Only,
    #[serde(rename = "HTTP2Only")]
    Http2Only,
    #[serde(rename = "HTTP2Optional")]
    Http2Optional,
    #[serde(rename = "HTTP2Preferred")]
    Http2Preferred,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MutualAuthentication {
    pub mode: MutualAuthenticationMode,
    pub trust_store: Option<String>,
    pub ignore_client_certificate_expiry: Option<bool>,
    pub advertise_trust_store_ca_names: Option<OnOff>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MutualAuthenticationMode {
    Off,
    Passthrough,
    Verify,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OnOff {
    On,
    Off,
}
