//! Patches Gateway and Route status conditions from the Model Builder's
//! output (spec.md §4.4 step 9, §4.5 step 6): the Builder computes
//! `Accepted`/`ResolvedRefs` decisions as plain data
//! ([`GatewayStatusUpdate`]/[`RouteStatusUpdate`]); this module is the only
//! place that turns them into `metav1.Condition`s and applies them to the
//! cluster with optimistic concurrency, mirroring how the Model Builder
//! itself never talks to the K8s API.

use chrono::Utc;
use elbv2_controller_k8s_api::{gateway, Condition, Patch, PatchParams, Time};
use elbv2_controller_k8s_index::{GatewayStatusUpdate, RouteParentStatus, RouteStatusUpdate, SharedIndex};
use kube::{Api, Client};
use tracing::{error, warn};

const FIELD_MANAGER: &str = "gateway.k8s.aws/status-controller";
const CONTROLLER_NAME: &str = "gateway.k8s.aws/gateway-controller";

pub struct Controller {
    client: Client,
    index: SharedIndex,
}

impl Controller {
    pub fn new(client: Client, index: SharedIndex) -> Self {
        Self { client, index }
    }

    /// Runs forever, applying every Gateway/Route status update each time
    /// the Model Builder publishes a new [`elbv2_controller_k8s_index::BuildOutput`].
    /// A conflict (409) on any one patch is logged and left for the next
    /// publish to retry rather than aborting the whole batch.
    pub async fn run(mut self) -> anyhow::Error {
        loop {
            if self.index.changed().await.is_err() {
                return anyhow::anyhow!("model builder index closed");
            }
            let output = self.index.borrow_and_update().clone();
            for update in &output.gateway_statuses {
                self.patch_gateway(update).await;
            }
            for update in &output.route_statuses {
                self.patch_route(update).await;
            }
        }
    }

    async fn patch_gateway(&self, update: &GatewayStatusUpdate) {
        let api: Api<gateway::Gateway> = Api::namespaced(self.client.clone(), &update.namespace);
        let condition = Condition {
            last_transition_time: Time(Utc::now()),
            message: update.message.clone(),
            observed_generation: None,
            reason: update.reason.as_str().to_string(),
            status: if update.accepted { "True" } else { "False" }.to_string(),
            type_: "Accepted".to_string(),
        };
        let patch = serde_json::json!({
            "apiVersion": "gateway.networking.k8s.io/v1",
            "kind": "Gateway",
            "status": { "conditions": [condition] },
        });
        if let Err(error) = api
            .patch_status(&update.name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Merge(patch))
            .await
        {
            log_patch_error(&update.namespace, &update.name, "Gateway", error);
        }
    }

    async fn patch_route(&self, update: &RouteStatusUpdate) {
        let parents: Vec<_> = update.parents.iter().map(route_parent_status).collect();
        let patch = serde_json::json!({
            "apiVersion": "gateway.networking.k8s.io/v1",
            "kind": update.kind,
            "status": { "parents": parents },
        });
        let result = match update.kind {
            "HTTPRoute" => {
                let api: Api<gateway::HTTPRoute> = Api::namespaced(self.client.clone(), &update.namespace);
                api.patch_status(&update.name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Merge(patch))
                    .await
                    .map(drop)
            }
            "GRPCRoute" => {
                let api: Api<gateway::GRPCRoute> = Api::namespaced(self.client.clone(), &update.namespace);
                api.patch_status(&update.name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Merge(patch))
                    .await
                    .map(drop)
            }
            "TCPRoute" => {
                let api: Api<gateway::TCPRoute> = Api::namespaced(self.client.clone(), &update.namespace);
                api.patch_status(&update.name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Merge(patch))
                    .await
                    .map(drop)
            }
            "UDPRoute" => {
                let api: Api<gateway::UDPRoute> = Api::namespaced(self.client.clone(), &update.namespace);
                api.patch_status(&update.name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Merge(patch))
                    .await
                    .map(drop)
            }
            "TLSRoute" => {
                let api: Api<gateway::TLSRoute> = Api::namespaced(self.client.clone(), &update.namespace);
                api.patch_status(&update.name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Merge(patch))
                    .await
                    .map(drop)
            }
            other => {
                warn!(kind = other, "unrecognized route kind in status update");
                return;
            }
        };
        if let Err(error) = result {
            log_patch_error(&update.namespace, &update.name, update.kind, error);
        }
    }
}

fn route_parent_status(parent: &RouteParentStatus) -> serde_json::Value {
    let accepted = Condition {
        last_transition_time: Time(Utc::now()),
        message: parent.message.clone(),
        observed_generation: None,
        reason: parent.reason.as_str().to_string(),
        status: if parent.accepted { "True" } else { "False" }.to_string(),
        type_: "Accepted".to_string(),
    };
    let resolved_refs = Condition {
        last_transition_time: Time(Utc::now()),
        message: String::new(),
        observed_generation: None,
        reason: if parent.resolved_refs { "ResolvedRefs".to_string() } else { parent.reason.as_str().to_string() },
        status: if parent.resolved_refs { "True" } else { "False" }.to_string(),
        type_: "ResolvedRefs".to_string(),
    };
    serde_json::json!({
        "parentRef": {
            "group": parent.parent_ref.group,
            "kind": parent.parent_ref.kind,
            "namespace": parent.parent_ref.namespace,
            "name": parent.parent_ref.name,
            "sectionName": parent.parent_ref.section_name,
            "port": parent.parent_ref.port,
        },
        "controllerName": CONTROLLER_NAME,
        "conditions": [accepted, resolved_refs],
    })
}

fn log_patch_error(namespace: &str, name: &str, kind: &str, error: kube::Error) {
    if is_conflict(&error) {
        warn!(%namespace, %name, kind, "status patch conflicted, will retry next update");
    } else {
        error!(%namespace, %name, kind, %error, "failed to patch status");
    }
}

fn is_conflict(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(response) if response.code == 409)
}

#[cfg(test)]
mod tests {
    use super::*;
    use elbv2_controller_core::ParentRef;
    use elbv2_controller_k8s_index::StatusReason;

    #[test]
    fn route_parent_status_carries_both_conditions() {
        let parent = RouteParentStatus {
            parent_ref: ParentRef {
                group: Some("gateway.networking.k8s.io".to_string()),
                kind: Some("Gateway".to_string()),
                namespace: None,
                name: "my-gateway".to_string(),
                section_name: Some("https".to_string()),
                port: None,
            },
            accepted: true,
            resolved_refs: true,
            reason: StatusReason::Accepted,
            message: String::new(),
        };
        let value = route_parent_status(&parent);
        let conditions = value["conditions"].as_array().unwrap();
        assert_eq!(conditions.len(), 2);
        assert_eq!(value["parentRef"]["name"], "my-gateway");
        assert_eq!(value["controllerName"], CONTROLLER_NAME);
    }
}
