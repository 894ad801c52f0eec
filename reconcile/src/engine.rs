//! The Reconciliation Engine (spec.md §4.5): drives one Gateway's desired
//! [`core::Graph`] to match live AWS state. [`Engine::reconcile_gateway`] is
//! the five-step algorithm (partition, fetch live, diff, apply,
//! stabilize-then-GC); [`run`] is the driver loop that watches the Model
//! Builder's shared index and reconciles every selected Gateway whenever it
//! changes, serializing repeat reconciliations of the same Gateway the way
//! the teacher's index task serializes writes to one `SharedIndex` cell.

use crate::diff::{self, DeleteCandidate};
use crate::error::ReconcileError;
use crate::gc::StabilizationTracker;
use crate::{apply, live};
use ahash::AHashMap as HashMap;
use chrono::Utc;
use elbv2_controller_aws::CloudClient;
use elbv2_controller_core::{Graph, Node, NodeId};
use elbv2_controller_k8s_api::crd::LoadBalancerConfiguration;
use elbv2_controller_k8s_api::{Api, Condition, Patch, PatchParams, Time};
use elbv2_controller_k8s_index::SharedIndex;
use kube::Client;
use parking_lot::Mutex as SyncMutex;
use std::sync::Arc;

use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, instrument, warn};

const LBC_FIELD_MANAGER: &str = "elbv2.k8s.aws/gateway-controller";

/// Per-Gateway state the engine keeps across reconciliations: the
/// stabilization tracker (§4.5 "Stabilization") and a lock serializing
/// concurrent reconciliations of the same Gateway, mirroring the teacher's
/// one-writer-per-key discipline.
struct GatewayState {
    tracker: StabilizationTracker,
    lock: AsyncMutex<()>,
}

pub struct Engine {
    client: Arc<CloudClient>,
    kube: Client,
    cluster: String,
    lb_stabilization_time: Duration,
    reconcile_timeout: Duration,
    gateways: SyncMutex<HashMap<(String, String), Arc<GatewayState>>>,
}

impl Engine {
    /// `client` is shared with the Target Synchronizer, which runs against
    /// the same AWS account and benefits from the same credential cache and
    /// throttle state rather than each maintaining its own.
    pub fn new(client: Arc<CloudClient>, kube: Client, cluster: String, lb_stabilization_time: Duration, reconcile_timeout: Duration) -> Self {
        Self {
            client,
            kube,
            cluster,
            lb_stabilization_time,
            reconcile_timeout,
            gateways: SyncMutex::new(HashMap::new()),
        }
    }

    fn state_for(&self, namespace: &str, name: &str) -> Arc<GatewayState> {
        let key = (namespace.to_string(), name.to_string());
        self.gateways
            .lock()
            .entry(key)
            .or_insert_with(|| {
                Arc::new(GatewayState {
                    tracker: StabilizationTracker::new(),
                    lock: AsyncMutex::new(()),
                })
            })
            .clone()
    }

    /// Runs the full reconciliation algorithm for one Gateway: partitions
    /// its reachable nodes out of `full_graph`, fetches the live AWS state
    /// tagged to it, diffs, applies creates/modifies, holds any now-orphaned
    /// target group until the stabilization window elapses, and deletes
    /// whatever's left (spec.md §4.5).
    #[instrument(skip(self, full_graph), fields(gateway = %format!("{namespace}/{name}")))]
    pub async fn reconcile_gateway(
        &self,
        full_graph: &Graph,
        namespace: &str,
        name: &str,
    ) -> Result<Graph, ReconcileError> {
        let state = self.state_for(namespace, name);
        let _permit = state.lock.lock().await;

        let mut graph = gateway_subgraph(full_graph, namespace, name);
        let deadline = Instant::now() + self.reconcile_timeout;

        self.client.refresh_credentials_if_needed().await?;
        let live_graph = live::fetch(&self.client, &self.cluster, namespace, name).await?;

        let unreferenced: Vec<NodeId> = graph.unreferenced_target_groups().into_iter().collect();
        let ready = state
            .tracker
            .ready_for_deletion(&unreferenced, self.lb_stabilization_time, Instant::now());
        state.tracker.reconcile_tracked(&unreferenced);

        // Target groups not yet past the stabilization window are kept in
        // the desired graph this pass purely so `diff` treats them as
        // `Reuse` rather than orphaning them early.
        let mut result = diff::diff(&graph, &live_graph)?;
        result.deletes.retain(|candidate| delete_is_allowed(candidate, &ready));

        let ctx = apply::ApplyContext {
            client: &self.client,
            cluster: &self.cluster,
            gateway_namespace: namespace,
            gateway_name: name,
            deadline,
        };
        apply::apply(&mut graph, &result, &ctx).await?;

        info!(
            creates = result.creates.len(),
            deletes = result.deletes.len(),
            "gateway reconciled"
        );
        Ok(graph)
    }

    /// Writes the reconciled load balancer's ARN onto the
    /// `LoadBalancerConfiguration` a Gateway's `infrastructure.parametersRef`
    /// names, mirroring `k8s-status`'s patch-with-optimistic-concurrency
    /// discipline but issued directly by the Engine since the ARN only
    /// exists once `reconcile_gateway` has run (spec.md §4.5 step 6). A
    /// `GatewayClass`-level configuration shared across Gateways has no
    /// single owner and is never patched here.
    async fn patch_lbc_status(&self, lbc_namespace: &str, lbc_name: &str, arn: Option<&str>) {
        let condition = Condition {
            last_transition_time: Time(Utc::now()),
            message: String::new(),
            observed_generation: None,
            reason: if arn.is_some() { "Reconciled" } else { "ReconcileFailed" }.to_string(),
            status: if arn.is_some() { "True" } else { "False" }.to_string(),
            type_: "Accepted".to_string(),
        };
        let patch = serde_json::json!({
            "status": {
                "conditions": [condition],
            }
        });
        let api: Api<LoadBalancerConfiguration> = Api::namespaced(self.kube.clone(), lbc_namespace);
        if let Err(error) = api
            .patch_status(lbc_name, &PatchParams::apply(LBC_FIELD_MANAGER).force(), &Patch::Merge(patch))
            .await
        {
            warn!(namespace = lbc_namespace, name = lbc_name, %error, "failed to patch load balancer configuration status");
        }
    }
}

/// The ARN [`Engine::reconcile_gateway`] resolved for the Gateway's load
/// balancer node, if any — `None` both when the Gateway has no load
/// balancer node yet and when the node exists but hasn't been created in
/// AWS (a pure no-op reconciliation of an already-deleted Gateway).
fn resolved_lb_arn(graph: &Graph, namespace: &str, name: &str) -> Option<String> {
    let lb_id = graph.ids().find(|id| {
        matches!(
            graph.get(id),
            Some(Node::LoadBalancer(lb)) if lb.gateway_namespace == namespace && lb.gateway_name == name
        )
    })?;
    graph.arn(lb_id).map(str::to_string)
}

/// A target group logical ID is only ever a delete candidate once
/// [`StabilizationTracker`] says its window has elapsed; every other delete
/// candidate (listeners, rules, security groups, the load balancer itself)
/// has no stabilization window and is always allowed.
fn delete_is_allowed(candidate: &DeleteCandidate, ready_target_groups: &[NodeId]) -> bool {
    if candidate.resource_type != "targetgroup" {
        return true;
    }
    ready_target_groups.iter().any(|id| id.as_str() == candidate.logical_id)
}

/// Extracts the sub-DAG of `full_graph` reachable from one Gateway's load
/// balancer node: the load balancer itself plus every node whose
/// dependency chain leads back to it. The Model Builder produces one
/// cluster-wide graph per snapshot (spec.md §4.4); the Engine reconciles
/// each Gateway's slice of it independently so that one Gateway's apply
/// failure or stabilization window never blocks another's.
fn gateway_subgraph(full_graph: &Graph, namespace: &str, name: &str) -> Graph {
    let lb_id = full_graph.ids().find(|id| {
        matches!(
            full_graph.get(id),
            Some(Node::LoadBalancer(lb)) if lb.gateway_namespace == namespace && lb.gateway_name == name
        )
    });
    let Some(lb_id) = lb_id else {
        return Graph::new();
    };

    let mut memo: HashMap<NodeId, bool> = HashMap::new();
    let mut included: Vec<NodeId> = Vec::new();
    for id in full_graph.ids() {
        if depends_on(full_graph, id, lb_id, &mut memo) {
            included.push(id.clone());
        }
    }

    let mut subgraph = Graph::new();
    // Nodes are re-added in an order respecting each node's own
    // dependencies so that `Graph::add`'s validation never rejects a
    // dangling reference; `visit_topological`-style ordering isn't needed
    // here since `add` doesn't itself check edges.
    for id in &included {
        if let Some(node) = full_graph.get(id) {
            let _ = subgraph.add(id.clone(), node.clone());
        }
    }
    subgraph
}

fn depends_on(graph: &Graph, id: &NodeId, target: &NodeId, memo: &mut HashMap<NodeId, bool>) -> bool {
    if id == target {
        return true;
    }
    if let Some(&cached) = memo.get(id) {
        return cached;
    }
    memo.insert(id.clone(), false); // break cycles defensively; the graph forbids them anyway
    let Some(node) = graph.get(id) else { return false };
    let result = node.dependencies().iter().any(|dep| depends_on(graph, dep, target, memo));
    memo.insert(id.clone(), result);
    result
}

/// Drives reconciliation off the Model Builder's shared index: every time a
/// new [`elbv2_controller_k8s_index::BuildOutput`] is published, reconciles
/// every Gateway the graph currently knows about. Gateways are reconciled
/// concurrently; each one's own [`GatewayState`] lock keeps successive
/// updates to the same Gateway from overlapping.
pub async fn run(engine: Arc<Engine>, mut index: SharedIndex) -> anyhow::Error {
    loop {
        if index.changed().await.is_err() {
            return anyhow::anyhow!("model builder index closed");
        }
        let output = index.borrow_and_update().clone();
        let gateways: Vec<(String, String)> = output
            .graph
            .ids()
            .filter_map(|id| match output.graph.get(id) {
                Some(Node::LoadBalancer(lb)) => Some((lb.gateway_namespace.clone(), lb.gateway_name.clone())),
                _ => None,
            })
            .collect();

        for (namespace, name) in gateways {
            let engine = engine.clone();
            let graph = output.graph.clone();
            let lbc_ref = output.gateway_lbc_refs.get(&(namespace.clone(), name.clone())).cloned();
            tokio::spawn(async move {
                match engine.reconcile_gateway(&graph, &namespace, &name).await {
                    Ok(resolved) => {
                        if let Some((lbc_namespace, lbc_name)) = lbc_ref {
                            let arn = resolved_lb_arn(&resolved, &namespace, &name);
                            engine.patch_lbc_status(&lbc_namespace, &lbc_name, arn.as_deref()).await;
                        }
                    }
                    Err(error) => {
                        if error.is_requeue() {
                            warn!(gateway = %format!("{namespace}/{name}"), "requeue requested");
                        } else {
                            error!(gateway = %format!("{namespace}/{name}"), %error, "reconciliation failed");
                            if let Some((lbc_namespace, lbc_name)) = lbc_ref {
                                engine.patch_lbc_status(&lbc_namespace, &lbc_name, None).await;
                            }
                        }
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elbv2_controller_core::{LoadBalancerSpec, LogicalId};

    #[test]
    fn subgraph_excludes_other_gateways() {
        let mut g = Graph::new();
        let a_id = LogicalId::of("LoadBalancer", &"a");
        g.add(a_id.clone(), Node::LoadBalancer(LoadBalancerSpec::test_fixture("a"))).unwrap();
        let b_id = LogicalId::of("LoadBalancer", &"b");
        g.add(b_id.clone(), Node::LoadBalancer(LoadBalancerSpec::test_fixture("b"))).unwrap();

        let sub = gateway_subgraph(&g, "default", "a");
        assert!(sub.contains(&a_id));
        assert!(!sub.contains(&b_id));
    }
}
