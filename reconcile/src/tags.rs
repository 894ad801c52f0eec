//! The AWS tagging contract (spec.md §6): every managed resource carries a
//! fixed set of ownership tags plus whatever the user configured. These
//! tags are both how resources are created (so Describe calls can later
//! recover ownership) and how the live graph is discovered (§4.5 step 3,
//! via the Resource Groups Tagging API).

use std::collections::BTreeMap;

pub const CLUSTER_TAG: &str = "elbv2.k8s.aws/cluster";
pub const GATEWAY_NAMESPACE_TAG: &str = "gateway.k8s.aws/namespace";
pub const GATEWAY_NAME_TAG: &str = "gateway.k8s.aws/name";
pub const LOGICAL_ID_TAG: &str = "gateway.k8s.aws/logical-id";
pub const GLOBAL_ACCELERATOR_NAMESPACE_TAG: &str = "elbv2.k8s.aws/globalaccelerator-namespace";
pub const GLOBAL_ACCELERATOR_NAME_TAG: &str = "elbv2.k8s.aws/globalaccelerator-name";

/// Builds the full reserved-plus-user tag set for one node. User tags never
/// overwrite a reserved key (spec.md §6): they're inserted first, then the
/// reserved keys win on collision.
pub fn ownership_tags(
    cluster: &str,
    gateway_namespace: &str,
    gateway_name: &str,
    logical_id: &str,
    user_tags: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut tags = user_tags.clone();
    tags.insert(CLUSTER_TAG.to_string(), cluster.to_string());
    tags.insert(GATEWAY_NAMESPACE_TAG.to_string(), gateway_namespace.to_string());
    tags.insert(GATEWAY_NAME_TAG.to_string(), gateway_name.to_string());
    tags.insert(LOGICAL_ID_TAG.to_string(), logical_id.to_string());
    tags
}

pub fn to_elbv2_tags(tags: &BTreeMap<String, String>) -> Vec<aws_sdk_elasticloadbalancingv2::types::Tag> {
    tags.iter()
        .map(|(k, v)| {
            aws_sdk_elasticloadbalancingv2::types::Tag::builder()
                .key(k)
                .value(v)
                .build()
                .expect("tag key is always set")
        })
        .collect()
}

pub fn to_ec2_tags(tags: &BTreeMap<String, String>) -> Vec<aws_sdk_ec2::types::Tag> {
    tags.iter()
        .map(|(k, v)| aws_sdk_ec2::types::Tag::builder().key(k).value(v).build())
        .collect()
}

/// Unlike a Gateway's ELBv2/EC2 resources, a `GlobalAccelerator` isn't
/// attached to any one Gateway, so it's tagged by its own namespace/name
/// rather than [`GATEWAY_NAMESPACE_TAG`]/[`GATEWAY_NAME_TAG`].
pub fn global_accelerator_tags(cluster: &str, namespace: &str, name: &str, user_tags: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut tags = user_tags.clone();
    tags.insert(CLUSTER_TAG.to_string(), cluster.to_string());
    tags.insert(GLOBAL_ACCELERATOR_NAMESPACE_TAG.to_string(), namespace.to_string());
    tags.insert(GLOBAL_ACCELERATOR_NAME_TAG.to_string(), name.to_string());
    tags
}

pub fn to_ga_tags(tags: &BTreeMap<String, String>) -> Vec<aws_sdk_globalaccelerator::types::Tag> {
    tags.iter()
        .map(|(k, v)| {
            aws_sdk_globalaccelerator::types::Tag::builder()
                .key(k)
                .value(v)
                .build()
                .expect("tag key and value are always set")
        })
        .collect()
}

/// Extracts the ownership tags this crate cares about from an RGT
/// `ResourceTagMapping`'s flat tag list.
pub fn logical_id_of(tags: &[aws_sdk_resourcegroupstaggingapi::types::Tag]) -> Option<String> {
    tags.iter()
        .find(|t| t.key.as_deref() == Some(LOGICAL_ID_TAG))
        .and_then(|t| t.value.clone())
}

pub fn gateway_of(tags: &[aws_sdk_resourcegroupstaggingapi::types::Tag]) -> Option<(String, String)> {
    let ns = tags
        .iter()
        .find(|t| t.key.as_deref() == Some(GATEWAY_NAMESPACE_TAG))?
        .value
        .clone()?;
    let name = tags
        .iter()
        .find(|t| t.key.as_deref() == Some(GATEWAY_NAME_TAG))?
        .value
        .clone()?;
    Some((ns, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_keys_win_over_user_tags() {
        let mut user = BTreeMap::new();
        user.insert(CLUSTER_TAG.to_string(), "user-supplied".to_string());
        let tags = ownership_tags("prod", "ns", "gw", "abc123", &user);
        assert_eq!(tags.get(CLUSTER_TAG).unwrap(), "prod");
    }
}
