use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::target_group_configuration::TargetType;

/// Associates a target group ARN with a Kubernetes Service (spec.md §3,
/// §6). Created directly by users for "bring your own target group"
/// setups, or emitted by the Model Builder for every target group it
/// derives from a Route so the Target Synchronizer has a uniform input.
#[derive(Clone, Debug, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "elbv2.k8s.aws",
    version = "v1beta1",
    kind = "TargetGroupBinding",
    status = "TargetGroupBindingStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroupBindingSpec {
    pub target_group_arn: String,
    pub target_type: Option<TargetType>,
    pub service_ref: ServiceReference,
    pub networking: Option<TargetGroupBindingNetworking>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroupBindingStatus {
    pub observed_generation: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceReference {
    pub name: String,
    pub port: IntOrString,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroupBindingNetworking {
    pub ingress: Vec<NetworkingIngress>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct NetworkingIngress {
    pub from: Vec<IngressRule>,
    pub ports: Vec<IngressRulePort>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct IngressRule {
    #[serde(flatten)]
    pub source: IngressRuleFrom,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum IngressRuleFrom {
    IpBlock { cidr: String },
    SecurityGroup { group_id: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressRulePort {
    pub port: Option<IntOrString>,
    pub protocol: IngressPortProtocol,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum IngressPortProtocol {
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "UDP")]
    Udp,
}
