//! Diffs the desired [`core::Graph`] against a [`LiveGraph`] (spec.md §4.5
//! step 4): every node becomes a [`Plan`] the apply step executes in
//! topological order. Reuse is keyed purely on the logical-ID tag (P5): an
//! ARN tagged with a logical ID the desired graph produces again is never
//! recreated, regardless of how the Model Builder arrived at that ID.

use crate::live::LiveGraph;
use elbv2_controller_core::{Graph, GraphError, NodeId};
use std::collections::BTreeSet;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Plan {
    /// No live resource is tagged with this logical ID: create fresh.
    Create,
    /// A live resource already carries this logical ID's tag. Whether its
    /// attributes also match (so no `Modify` call is needed) is decided by
    /// the per-kind apply handler, which has to `Describe` the resource
    /// anyway to issue the right `Modify` call.
    Reuse { arn: String },
}

pub struct DiffResult {
    /// Desired nodes in topological (create) order, paired with their plan.
    pub creates: Vec<(NodeId, Plan)>,
    /// Live resources tagged with a logical ID the desired graph no longer
    /// produces, in delete order (reverse topological — dependents first).
    /// [`crate::gc`] is responsible for applying the stabilization window
    /// to target groups before they appear here.
    pub deletes: Vec<DeleteCandidate>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeleteCandidate {
    pub logical_id: String,
    pub arn: String,
    pub resource_type: String,
}

pub fn diff(desired: &Graph, live: &LiveGraph) -> Result<DiffResult, GraphError> {
    let order = desired.visit_topological()?;

    let creates = order
        .iter()
        .map(|id| {
            let plan = match live.arn_for(id) {
                Some(arn) => Plan::Reuse { arn: arn.to_string() },
                None => Plan::Create,
            };
            (id.clone(), plan)
        })
        .collect();

    let desired_ids: BTreeSet<&NodeId> = order.iter().collect();
    let mut deletes: Vec<DeleteCandidate> = live
        .by_logical_id
        .iter()
        .filter(|(id, _)| !desired_ids.iter().any(|d| d.as_str() == id.as_str()))
        .map(|(id, res)| DeleteCandidate {
            logical_id: id.clone(),
            arn: res.arn.clone(),
            resource_type: res.resource_type.clone(),
        })
        .collect();
    // Reverse of the create order's intent: dependents before their
    // dependencies. Since `Live` node ids don't participate in the desired
    // graph's dependency edges, we order deletes by resource kind instead
    // (rules/listeners/SG rules before target groups before load balancers),
    // matching spec.md §4.5 "Deletes reverse this order."
    deletes.sort_by_key(|c| delete_priority(&c.arn));

    Ok(DiffResult { creates, deletes })
}

/// Lower sorts first. Rules and listeners (and their associated security
/// group rules) must be gone before the target groups and load balancers
/// they reference are deleted.
fn delete_priority(arn: &str) -> u8 {
    if arn.contains(":listener-rule/") {
        0
    } else if arn.contains(":listener/") {
        1
    } else if arn.contains(":targetgroup/") {
        2
    } else if arn.contains(":security-group/") {
        3
    } else if arn.contains(":loadbalancer/") {
        4
    } else {
        5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elbv2_controller_core::{LoadBalancerSpec, LogicalId, Node};

    fn lb_graph() -> (Graph, NodeId) {
        let mut g = Graph::new();
        let id = LogicalId::of("LoadBalancer", &"a");
        g.add(id.clone(), Node::LoadBalancer(LoadBalancerSpec::test_fixture("a")))
            .unwrap();
        (g, id)
    }

    #[test]
    fn unmatched_desired_node_creates() {
        let (g, id) = lb_graph();
        let live = LiveGraph::default();
        let result = diff(&g, &live).unwrap();
        assert_eq!(result.creates, vec![(id, Plan::Create)]);
    }

    #[test]
    fn tagged_live_resource_is_reused() {
        let (g, id) = lb_graph();
        let mut live = LiveGraph::default();
        live.by_logical_id.insert(
            id.as_str().to_string(),
            crate::live::LiveResource {
                arn: "arn:aws:elasticloadbalancing:us-east-1:1:loadbalancer/app/a/abc".to_string(),
                resource_type: "loadbalancer".to_string(),
            },
        );
        let result = diff(&g, &live).unwrap();
        assert!(matches!(&result.creates[0].1, Plan::Reuse { arn } if arn.contains("loadbalancer")));
    }

    #[test]
    fn orphaned_live_resource_is_deleted() {
        let (g, _id) = lb_graph();
        let mut live = LiveGraph::default();
        live.by_logical_id.insert(
            "stale-id".to_string(),
            crate::live::LiveResource {
                arn: "arn:aws:elasticloadbalancing:us-east-1:1:loadbalancer/app/old/xyz".to_string(),
                resource_type: "loadbalancer".to_string(),
            },
        );
        let result = diff(&g, &live).unwrap();
        assert_eq!(result.deletes.len(), 1);
    }
}
