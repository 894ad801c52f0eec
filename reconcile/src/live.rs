//! Fetches the live AWS state owned by one Gateway (spec.md §4.5 step 3):
//! lists every resource tagged with this Gateway's ownership tags via the
//! Resource Groups Tagging API, then indexes it by the logical-ID tag so
//! [`crate::diff`] can match it against the desired [`core::Graph`].

use crate::tags::{self, CLUSTER_TAG, GATEWAY_NAME_TAG, GATEWAY_NAMESPACE_TAG};
use ahash::AHashMap as HashMap;
use elbv2_controller_aws::{ClientError, CloudClient};
use elbv2_controller_core::NodeId;

/// One AWS resource this controller previously created, as recovered from
/// its tags. `node_id` is `None` when the logical-ID tag is missing or
/// doesn't parse — such resources are never matched by [`crate::diff`] and
/// are therefore always garbage-collection candidates, which is the safe
/// default for a resource this controller can no longer explain.
#[derive(Clone, Debug)]
pub struct LiveResource {
    pub arn: String,
    pub resource_type: String,
}

#[derive(Default, Debug)]
pub struct LiveGraph {
    pub by_logical_id: HashMap<String, LiveResource>,
}

impl LiveGraph {
    pub fn arn_for(&self, id: &NodeId) -> Option<&str> {
        self.by_logical_id.get(id.as_str()).map(|r| r.arn.as_str())
    }
}

/// AWS `ResourceTypeFilters` values for every resource kind this controller
/// manages, so `GetResources` doesn't also return unrelated tagged
/// resources in the account.
const RESOURCE_TYPE_FILTERS: &[&str] = &[
    "elasticloadbalancing:loadbalancer",
    "elasticloadbalancing:listener",
    "elasticloadbalancing:listener-rule",
    "elasticloadbalancing:targetgroup",
    "ec2:security-group",
];

/// Lists every cloud resource tagged as belonging to `(cluster,
/// gateway_namespace, gateway_name)`, regardless of whether this
/// reconciliation's desired graph still references it — that determination
/// is [`crate::diff`]'s job.
pub async fn fetch(
    client: &CloudClient,
    cluster: &str,
    gateway_namespace: &str,
    gateway_name: &str,
) -> Result<LiveGraph, ClientError> {
    let tag_filters = vec![
        (CLUSTER_TAG.to_string(), vec![cluster.to_string()]),
        (GATEWAY_NAMESPACE_TAG.to_string(), vec![gateway_namespace.to_string()]),
        (GATEWAY_NAME_TAG.to_string(), vec![gateway_name.to_string()]),
    ];
    let resource_types = RESOURCE_TYPE_FILTERS.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    let mappings = client.resources_by_tag(&resource_types, &tag_filters).await?;

    let mut graph = LiveGraph::default();
    for mapping in mappings {
        let Some(arn) = mapping.resource_arn else { continue };
        let tag_list = mapping.tags.unwrap_or_default();
        let Some(logical_id) = tags::logical_id_of(&tag_list) else {
            tracing::warn!(%arn, "tagged resource has no logical-id tag; treating as unowned");
            continue;
        };
        let resource_type = resource_type_of(&arn);
        graph.by_logical_id.insert(logical_id, LiveResource { arn, resource_type });
    }
    Ok(graph)
}

fn resource_type_of(arn: &str) -> String {
    // arn:aws:elasticloadbalancing:<region>:<account>:<type>/<rest>
    arn.rsplit(':')
        .next()
        .and_then(|s| s.split('/').next())
        .unwrap_or("unknown")
        .to_string()
}
