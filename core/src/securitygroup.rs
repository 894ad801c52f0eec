use crate::{graph::NodeId, network_match::NetworkMatch};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortProtocol {
    Tcp,
    Udp,
}

/// One ingress rule of a managed or user-referenced security group
/// (spec.md §4.4 step 7, §6 `TargetGroupBinding.spec.networking`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IngressRule {
    pub from: IngressSource,
    pub ports: Vec<(PortProtocol, u16)>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum IngressSource {
    IpBlock(NetworkMatch),
    SecurityGroup(String),
    PrefixList(String),
}

/// A security group synthesized by the controller for one load balancer,
/// or a reference to a user-managed one (spec.md §4.4 step 7).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SecurityGroupSpec {
    pub load_balancer: NodeId,
    pub ingress: Vec<IngressRule>,
    pub user_managed_ids: Vec<String>,
}
