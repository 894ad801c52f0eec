//! The Target Synchronizer (spec.md §4.6): for every `TargetGroupBinding`
//! node whose target group has materialized, reconciles AWS target
//! registrations against the Service's endpoints and flips each backing
//! Pod's readiness gate once its target health settles.

use crate::error::ReconcileError;
use crate::retry::with_backoff;
use ahash::AHashSet as HashSet;
use aws_sdk_elasticloadbalancingv2::types::{TargetDescription, TargetHealthStateEnum};
use elbv2_controller_aws::CloudClient;
use elbv2_controller_core::{Graph, Node, TargetGroupBindingSpec, TargetType};
use elbv2_controller_k8s_index::SharedIndex;
use k8s_openapi::api::core::v1::{Endpoints, Node as K8sNode, Pod};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

const FIELD_MANAGER: &str = "elbv2.k8s.aws/gateway-controller";
const EXCLUDE_FROM_LB_LABEL: &str = "node.kubernetes.io/exclude-from-external-load-balancers";

/// One resolved AWS target. For `ip` target groups this is a Pod's
/// address, carried so its readiness gate can be patched once health is
/// known; for `instance` target groups it's a cluster Node and `pod_name`
/// is empty since there's no Pod to gate.
#[derive(Clone, Debug)]
struct Endpoint {
    pod_namespace: String,
    pod_name: String,
    ip: String,
    port: i32,
}

pub struct TargetSynchronizer {
    client: Arc<CloudClient>,
    kube: Client,
}

impl TargetSynchronizer {
    pub fn new(client: Arc<CloudClient>, kube: Client) -> Self {
        Self { client, kube }
    }

    /// Synchronizes every `TargetGroupBinding` in `graph` whose target
    /// group has a resolved ARN. Bindings whose target group hasn't
    /// materialized yet are skipped; the next reconciliation picks them up
    /// once the Reconciliation Engine has created it.
    pub async fn sync_all(&self, graph: &Graph, deadline: Instant) -> Result<(), ReconcileError> {
        for id in graph.ids() {
            let Some(Node::TargetGroupBinding(binding)) = graph.get(id) else { continue };
            let Some(arn) = graph.arn(&binding.target_group) else {
                debug!(%id, "target group not yet created; skipping binding this pass");
                continue;
            };
            let target_type = match graph.get(&binding.target_group) {
                Some(Node::TargetGroup(tg)) => tg.target_type,
                // A TargetGroupBinding without a sibling TargetGroup node
                // is user-created and points straight at an existing ARN;
                // default to `ip`, the common case for Service backends.
                _ => TargetType::Ip,
            };
            self.sync_binding(arn, binding, target_type, deadline).await?;
        }
        Ok(())
    }

    async fn sync_binding(
        &self,
        target_group_arn: &str,
        binding: &TargetGroupBindingSpec,
        target_type: TargetType,
        deadline: Instant,
    ) -> Result<(), ReconcileError> {
        let endpoints = match target_type {
            TargetType::Instance => self.fetch_nodes(binding.service_port).await?,
            _ => self.fetch_endpoints(binding, target_group_arn).await?,
        };

        let desired: HashSet<(String, i32)> = endpoints.iter().map(|e| (e.ip.clone(), e.port)).collect();

        let health = with_backoff(deadline, "DescribeTargetHealth", || self.client.describe_target_health(target_group_arn)).await?;
        let registered: HashSet<(String, i32)> = health
            .iter()
            .filter_map(|h| h.target.as_ref())
            .filter_map(|t| t.port.map(|port| (t.id.clone(), port)))
            .collect();

        let to_register: Vec<TargetDescription> = desired
            .iter()
            .filter(|key| !registered.contains(*key))
            .map(|(ip, port)| TargetDescription::builder().id(ip).port(*port).build())
            .collect();
        let to_deregister: Vec<TargetDescription> = registered
            .iter()
            .filter(|key| !desired.contains(*key))
            .map(|(ip, port)| TargetDescription::builder().id(ip).port(*port).build())
            .collect();

        if !to_register.is_empty() {
            with_backoff(deadline, "RegisterTargets", || {
                self.client.register_targets(target_group_arn, to_register.clone())
            })
            .await?;
        }
        if !to_deregister.is_empty() {
            with_backoff(deadline, "DeregisterTargets", || {
                self.client.deregister_targets(target_group_arn, to_deregister.clone())
            })
            .await?;
        }

        let health = with_backoff(deadline, "DescribeTargetHealth", || self.client.describe_target_health(target_group_arn)).await?;
        self.apply_readiness_gates(target_group_arn, &endpoints, &health).await;
        Ok(())
    }

    /// Enumerates Pod addresses behind the bound Service (target type
    /// `ip`): every address in `subsets[].addresses` (already kubelet-ready)
    /// plus, from `subsets[].notReadyAddresses`, only those whose Pod
    /// carries a readiness gate this controller owns. kubelet leaves such a
    /// Pod's address in `notReadyAddresses` until the gate is flipped True,
    /// so without this second pass the Pod's IP would never be registered,
    /// its target health could never become `healthy`, and the gate could
    /// therefore never flip (spec.md §4.6).
    async fn fetch_endpoints(&self, binding: &TargetGroupBindingSpec, target_group_arn: &str) -> Result<Vec<Endpoint>, ReconcileError> {
        let api: Api<Endpoints> = Api::namespaced(self.kube.clone(), &binding.service_namespace);
        let endpoints = match api.get_opt(&binding.service_name).await? {
            Some(e) => e,
            None => return Ok(Vec::new()),
        };
        let condition_type = readiness_condition_type(target_group_arn);

        let mut out = Vec::new();
        for subset in endpoints.subsets.into_iter().flatten() {
            let Some(port) = subset
                .ports
                .iter()
                .flatten()
                .find(|p| p.port as u16 == binding.service_port)
                .or_else(|| subset.ports.iter().flatten().next())
                .map(|p| p.port)
            else {
                continue;
            };
            for address in subset.addresses.iter().flatten() {
                let Some(endpoint) = pod_endpoint(address, &binding.service_namespace, port) else { continue };
                out.push(endpoint);
            }
            for address in subset.not_ready_addresses.iter().flatten() {
                let Some(endpoint) = pod_endpoint(address, &binding.service_namespace, port) else { continue };
                if self
                    .pod_has_owned_readiness_gate(&endpoint.pod_namespace, &endpoint.pod_name, &condition_type)
                    .await
                {
                    out.push(endpoint);
                }
            }
        }
        Ok(out)
    }

    /// Whether `name`'s Pod in `namespace` names `condition_type` among its
    /// `readinessGates` — i.e. this controller, not kubelet, decides when
    /// it's ready.
    async fn pod_has_owned_readiness_gate(&self, namespace: &str, name: &str, condition_type: &str) -> bool {
        let api: Api<Pod> = Api::namespaced(self.kube.clone(), namespace);
        match api.get_opt(name).await {
            Ok(Some(pod)) => pod_readiness_gate(&pod, condition_type),
            _ => false,
        }
    }

    /// Enumerates eligible Nodes for target type `instance`: every Node not
    /// labeled `node.kubernetes.io/exclude-from-external-load-balancers`,
    /// registered at the binding's service port (spec.md §4.6).
    async fn fetch_nodes(&self, port: u16) -> Result<Vec<Endpoint>, ReconcileError> {
        let api: Api<K8sNode> = Api::all(self.kube.clone());
        let nodes = api.list(&Default::default()).await?;

        let mut out = Vec::new();
        for node in nodes {
            if node.labels().contains_key(EXCLUDE_FROM_LB_LABEL) {
                continue;
            }
            let Some(ip) = node
                .status
                .as_ref()
                .and_then(|s| s.addresses.as_ref())
                .and_then(|addrs| addrs.iter().find(|a| a.type_ == "InternalIP"))
                .map(|a| a.address.clone())
            else {
                continue;
            };
            out.push(Endpoint {
                pod_namespace: String::new(),
                pod_name: String::new(),
                ip,
                port: port as i32,
            });
        }
        Ok(out)
    }

    /// Patches each backing Pod's `target-health.elbv2.k8s.aws/<target
    /// group>` condition so that a `podReadinessGate` naming it blocks
    /// Pod readiness until AWS reports the target healthy (spec.md §4.6
    /// "Readiness gates").
    async fn apply_readiness_gates(
        &self,
        target_group_arn: &str,
        endpoints: &[Endpoint],
        health: &[aws_sdk_elasticloadbalancingv2::types::TargetHealthDescription],
    ) {
        let condition_type = readiness_condition_type(target_group_arn);
        for endpoint in endpoints {
            if endpoint.pod_name.is_empty() {
                continue;
            }
            let healthy = health.iter().any(|h| {
                h.target.as_ref().map(|t| t.id.as_str()) == Some(endpoint.ip.as_str())
                    && h.target_health.as_ref().and_then(|th| th.state.clone()) == Some(TargetHealthStateEnum::Healthy)
            });
            if let Err(error) = self.patch_pod_condition(&endpoint.pod_namespace, &endpoint.pod_name, &condition_type, healthy).await {
                warn!(pod = %endpoint.pod_name, namespace = %endpoint.pod_namespace, %error, "failed to patch pod readiness gate");
            }
        }
    }

    async fn patch_pod_condition(&self, namespace: &str, name: &str, condition_type: &str, healthy: bool) -> Result<(), kube::Error> {
        let api: Api<Pod> = Api::namespaced(self.kube.clone(), namespace);
        let pod = api.get(name).await?;
        if !pod_readiness_gate(&pod, condition_type) {
            return Ok(());
        }

        let status = if healthy { "True" } else { "False" };
        let patch = serde_json::json!({
            "status": {
                "conditions": [{
                    "type": condition_type,
                    "status": status,
                    "lastTransitionTime": chrono::Utc::now().to_rfc3339(),
                    "reason": if healthy { "TargetHealthy" } else { "TargetNotHealthy" },
                }]
            }
        });
        api.patch_status(&pod.name_any(), &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(patch))
            .await?;
        Ok(())
    }
}

fn pod_readiness_gate(pod: &Pod, condition_type: &str) -> bool {
    pod.spec
        .as_ref()
        .and_then(|s| s.readiness_gates.as_ref())
        .is_some_and(|gates| gates.iter().any(|g| g.condition_type == condition_type))
}

/// Builds an [`Endpoint`] from one `EndpointAddress`, if it names a Pod.
fn pod_endpoint(
    address: &k8s_openapi::api::core::v1::EndpointAddress,
    default_namespace: &str,
    port: i32,
) -> Option<Endpoint> {
    let target_ref = address.target_ref.as_ref()?;
    if target_ref.kind.as_deref() != Some("Pod") {
        return None;
    }
    let pod_name = target_ref.name.clone()?;
    let pod_namespace = target_ref.namespace.clone().unwrap_or_else(|| default_namespace.to_string());
    Some(Endpoint {
        pod_namespace,
        pod_name,
        ip: address.ip.clone(),
        port,
    })
}

fn readiness_condition_type(target_group_arn: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    target_group_arn.hash(&mut hasher);
    format!("target-health.elbv2.k8s.aws/{:x}", hasher.finish())
}

/// How often the synchronizer re-diffs target health against endpoints
/// even without a new graph, since DescribeTargetHealth transitions (e.g.
/// a target finishing AWS-side health checks) aren't pushed by any watch.
const POLL_INTERVAL: Duration = Duration::from_secs(30);
const SYNC_DEADLINE: Duration = Duration::from_secs(60);

/// Drives the synchronizer off the Model Builder's shared index: every
/// time a new graph is published, or every [`POLL_INTERVAL`] in between,
/// walks every `TargetGroupBinding` and converges its AWS registrations
/// (spec.md §4.6). Unlike the Reconciliation Engine, this loop is a single
/// serialized pass rather than one task per binding — the per-binding work
/// itself is cheap (a few SDK calls), so the coalescing the spec calls for
/// falls naturally out of driving everything from one ticking loop.
pub async fn run(synchronizer: Arc<TargetSynchronizer>, mut index: SharedIndex) -> anyhow::Error {
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    interval.tick().await;
    loop {
        tokio::select! {
            changed = index.changed() => {
                if changed.is_err() {
                    return anyhow::anyhow!("model builder index closed");
                }
            }
            _ = interval.tick() => {}
        }
        let output = index.borrow_and_update().clone();
        let deadline = Instant::now() + SYNC_DEADLINE;
        if let Err(error) = synchronizer.sync_all(&output.graph, deadline).await {
            error!(%error, "target synchronization failed");
        }
    }
}
