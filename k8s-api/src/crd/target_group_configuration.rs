use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-service overrides consulted by the `FallbackChain` in §4.4 step 6:
/// target type, health check, attributes (spec.md §3, §6).
#[derive(Clone, Debug, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "elbv2.k8s.aws",
    version = "v1beta1",
    kind = "TargetGroupConfiguration",
    status = "TargetGroupConfigurationStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroupConfigurationSpec {
    /// The Service this configuration attaches to.
    pub target_ref: PolicyTargetReference,
    pub default_configuration: Option<TargetGroupProps>,
    pub port_configurations: Option<Vec<PortConfiguration>>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroupConfigurationStatus {
    pub observed_generation: Option<i64>,
    pub conditions: Option<Vec<Condition>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTargetReference {
    pub group: String,
    pub kind: String,
    pub name: String,
}

/// A per-`servicePort` override, falling back to `default_configuration`
/// when absent for a given port.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PortConfiguration {
    pub port: i32,
    #[serde(flatten)]
    pub props: TargetGroupProps,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroupProps {
    pub target_type: Option<TargetType>,
    pub protocol: Option<String>,
    pub protocol_version: Option<String>,
    pub ip_address_type: Option<String>,
    pub health_check: Option<HealthCheckConfiguration>,
    pub target_group_attributes: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum TargetType {
    #[serde(rename = "ip")]
    Ip,
    #[serde(rename = "instance")]
    Instance,
    #[serde(rename = "alb")]
    Alb,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckConfiguration {
    pub health_check_protocol: Option<String>,
    pub health_check_port: Option<String>,
    pub health_check_path: Option<String>,
    pub health_check_interval_seconds: Option<i32>,
    pub health_check_timeout_seconds: Option<i32>,
    pub healthy_threshold_count: Option<i32>,
    pub unhealthy_threshold_count: Option<i32>,
    pub matcher: Option<String>,
}
