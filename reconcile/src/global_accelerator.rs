//! The GlobalAccelerator reconciler (spec.md §6): converges each
//! `GlobalAccelerator` custom resource to a matching AWS Global Accelerator,
//! its listeners and endpoint groups. Unlike the Reconciliation Engine this
//! doesn't partition a shared [`core::Graph`] — an accelerator fronts a
//! Gateway's load balancer rather than being one of the resources a Gateway
//! owns, so it's driven off its own watch and uses the same tag-based
//! ownership/GC discipline as [`crate::live`] applies to Gateway resources.

use crate::error::ReconcileError;
use crate::retry::with_backoff;
use crate::tags::{self, CLUSTER_TAG, GATEWAY_NAME_TAG, GATEWAY_NAMESPACE_TAG, GLOBAL_ACCELERATOR_NAME_TAG, GLOBAL_ACCELERATOR_NAMESPACE_TAG};
use ahash::AHashMap as HashMap;
use aws_sdk_globalaccelerator::types::{
    ClientAffinity as SdkClientAffinity, EndpointConfiguration as SdkEndpointConfiguration, IpAddressType as SdkIpAddressType,
    PortOverride as SdkPortOverride, PortRange as SdkPortRange, Protocol as SdkProtocol,
};
use elbv2_controller_aws::CloudClient;
use elbv2_controller_k8s_api::crd::{ClientAffinity, EndpointType, GaIpAddressType, GaProtocol, GlobalAccelerator, GlobalAcceleratorSpec};
use elbv2_controller_k8s_api::{Api, Client, Condition, Patch, PatchParams, ResourceExt, Time, WatchEvent};
use futures::stream::StreamExt;
use kube::runtime::watcher;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

const FIELD_MANAGER: &str = "elbv2.k8s.aws/globalaccelerator-controller";
const RECONCILE_TIMEOUT: Duration = Duration::from_secs(90);
const ACCELERATOR_RESOURCE_TYPE: &str = "globalaccelerator:accelerator";
const LOAD_BALANCER_RESOURCE_TYPE: &str = "elasticloadbalancing:loadbalancer";

pub struct GlobalAcceleratorReconciler {
    client: Arc<CloudClient>,
    kube: Client,
    cluster: String,
}

impl GlobalAcceleratorReconciler {
    pub fn new(client: Arc<CloudClient>, kube: Client, cluster: String) -> Self {
        Self { client, kube, cluster }
    }

    /// Reconciles every `GlobalAccelerator` currently cached, then deletes
    /// any cluster-owned accelerator whose custom resource is gone.
    async fn reconcile_all(&self, cache: &HashMap<(String, String), GlobalAccelerator>) {
        for ga in cache.values() {
            let namespace = ga.namespace().unwrap_or_default();
            let name = ga.name_any();
            if let Err(error) = self.reconcile_one(ga).await {
                warn!(%namespace, %name, %error, "global accelerator reconciliation failed");
            }
        }

        match self.owned_accelerators().await {
            Ok(owned) => {
                for (namespace, name, arn) in owned {
                    if !cache.contains_key(&(namespace.clone(), name.clone())) {
                        info!(%namespace, %name, %arn, "global accelerator custom resource gone; deleting");
                        self.delete_cascade(&arn).await;
                    }
                }
            }
            Err(error) => error!(%error, "failed to list owned global accelerators for garbage collection"),
        }
    }

    #[instrument(skip(self, ga), fields(namespace = %ga.namespace().unwrap_or_default(), name = %ga.name_any()))]
    async fn reconcile_one(&self, ga: &GlobalAccelerator) -> Result<(), ReconcileError> {
        let namespace = ga.namespace().unwrap_or_default();
        let name = ga.name_any();
        let spec = &ga.spec;
        let deadline = Instant::now() + RECONCILE_TIMEOUT;

        let result = self.converge(&namespace, &name, spec, deadline).await;
        match &result {
            Ok((arn, dns_name)) => self.patch_status(ga, Some(arn.as_str()), Some(dns_name.as_str()), true, "Reconciled", String::new()).await,
            Err(error) => self.patch_status(ga, None, None, false, "ReconcileFailed", error.to_string()).await,
        }
        result.map(drop)
    }

    async fn converge(
        &self,
        namespace: &str,
        name: &str,
        spec: &GlobalAcceleratorSpec,
        deadline: Instant,
    ) -> Result<(String, String), ReconcileError> {
        let accelerator_arn = self.find_or_create_accelerator(namespace, name, spec, deadline).await?;
        let accelerator = with_backoff(deadline, "DescribeAccelerator", || self.client.describe_accelerator(&accelerator_arn))
            .await?
            .ok_or(ReconcileError::DeadlineExceeded("accelerator never became visible"))?;

        if accelerator.ip_address_type != Some(to_sdk_ip_address_type(spec.ip_address_type)) {
            with_backoff(deadline, "UpdateAccelerator", || {
                self.client.update_accelerator(&accelerator_arn, to_sdk_ip_address_type(spec.ip_address_type))
            })
            .await?;
        }

        let existing_listeners = with_backoff(deadline, "ListListeners", || self.client.list_listeners(&accelerator_arn)).await?;
        let mut live_listener_arns = Vec::with_capacity(spec.listeners.len());
        for (i, desired) in spec.listeners.iter().enumerate() {
            let listener_arn = match existing_listeners.get(i) {
                Some(live) if listener_matches(live, desired) => live.listener_arn.clone().unwrap_or_default(),
                Some(live) => {
                    let arn = live.listener_arn.clone().unwrap_or_default();
                    with_backoff(deadline, "UpdateListener", || {
                        self.client.update_ga_listener(&arn, to_sdk_port_ranges(desired), to_sdk_client_affinity(desired.client_affinity))
                    })
                    .await?;
                    arn
                }
                None => {
                    let token = format!("{}-listener-{i}", short_hash(&format!("{namespace}/{name}")));
                    let created = with_backoff(deadline, "CreateListener", || {
                        self.client.create_ga_listener(
                            &accelerator_arn,
                            to_sdk_protocol(desired.protocol),
                            to_sdk_port_ranges(desired),
                            to_sdk_client_affinity(desired.client_affinity),
                            &token,
                        )
                    })
                    .await?;
                    created.listener_arn.unwrap_or_default()
                }
            };
            self.converge_endpoint_groups(&listener_arn, desired, namespace, deadline).await?;
            live_listener_arns.push(listener_arn);
        }
        for stale in existing_listeners.iter().skip(spec.listeners.len()) {
            if let Some(arn) = &stale.listener_arn {
                for group in with_backoff(deadline, "ListEndpointGroups", || self.client.list_endpoint_groups(arn)).await? {
                    if let Some(group_arn) = group.endpoint_group_arn {
                        with_backoff(deadline, "DeleteEndpointGroup", || self.client.delete_endpoint_group(&group_arn)).await?;
                    }
                }
                with_backoff(deadline, "DeleteListener", || self.client.delete_ga_listener(arn)).await?;
            }
        }

        let dns_name = accelerator.dns_name.clone().unwrap_or_default();
        Ok((accelerator_arn, dns_name))
    }

    async fn converge_endpoint_groups(
        &self,
        listener_arn: &str,
        listener: &elbv2_controller_k8s_api::crd::GaListener,
        gateway_namespace: &str,
        deadline: Instant,
    ) -> Result<(), ReconcileError> {
        let existing = with_backoff(deadline, "ListEndpointGroups", || self.client.list_endpoint_groups(listener_arn)).await?;

        for desired in &listener.endpoint_groups {
            let endpoints = self.resolve_endpoints(gateway_namespace, desired).await;
            let configurations = to_sdk_endpoint_configurations(&endpoints);
            let port_overrides = to_sdk_port_overrides(desired);

            match existing.iter().find(|g| g.endpoint_group_region.as_deref() == Some(desired.region.as_str())) {
                Some(live) => {
                    let arn = live.endpoint_group_arn.clone().unwrap_or_default();
                    with_backoff(deadline, "UpdateEndpointGroup", || {
                        self.client.update_endpoint_group(
                            self.client
                                .ga
                                .update_endpoint_group()
                                .endpoint_group_arn(&arn)
                                .traffic_dial_percentage(desired.traffic_dial_percentage)
                                .set_endpoint_configurations(Some(configurations.clone()))
                                .set_port_overrides(port_overrides.clone()),
                        )
                    })
                    .await?;
                }
                None => {
                    with_backoff(deadline, "CreateEndpointGroup", || {
                        self.client.create_endpoint_group(
                            self.client
                                .ga
                                .create_endpoint_group()
                                .listener_arn(listener_arn)
                                .endpoint_group_region(&desired.region)
                                .traffic_dial_percentage(desired.traffic_dial_percentage)
                                .set_endpoint_configurations(Some(configurations.clone()))
                                .set_port_overrides(port_overrides.clone()),
                        )
                    })
                    .await?;
                }
            }
        }

        for stale in &existing {
            let region_still_wanted = listener.endpoint_groups.iter().any(|d| Some(d.region.as_str()) == stale.endpoint_group_region.as_deref());
            if !region_still_wanted {
                if let Some(arn) = &stale.endpoint_group_arn {
                    with_backoff(deadline, "DeleteEndpointGroup", || self.client.delete_endpoint_group(arn)).await?;
                }
            }
        }
        Ok(())
    }

    /// Resolves each endpoint configuration's target AWS resource ID.
    /// `endpoint_id` is used verbatim; `gateway` is resolved to the load
    /// balancer ARN tagged as belonging to the named Gateway in the
    /// accelerator's own namespace. `service`/`ingress` endpoints aren't
    /// something this Gateway API controller can resolve to an ELBv2 ARN on
    /// its own and are skipped with a warning (spec.md §9 open question:
    /// left for a future controller generation that also reconciles those
    /// kinds).
    async fn resolve_endpoints(
        &self,
        gateway_namespace: &str,
        group: &elbv2_controller_k8s_api::crd::EndpointGroup,
    ) -> Vec<(String, u16, bool)> {
        let mut resolved = Vec::with_capacity(group.endpoints.len());
        for endpoint in &group.endpoints {
            let id = match endpoint.endpoint_type {
                EndpointType::EndpointId => endpoint.endpoint_id.clone(),
                EndpointType::Gateway => match &endpoint.name {
                    Some(name) => self.resolve_gateway_load_balancer(gateway_namespace, name).await,
                    None => None,
                },
                EndpointType::Service | EndpointType::Ingress => {
                    warn!(endpoint_type = ?endpoint.endpoint_type, "endpoint type not resolvable by this controller; skipping");
                    None
                }
            };
            if let Some(id) = id {
                resolved.push((id, endpoint.weight, endpoint.client_ip_preservation_enabled));
            } else {
                warn!(?endpoint.endpoint_type, "could not resolve global accelerator endpoint; skipping");
            }
        }
        resolved
    }

    async fn resolve_gateway_load_balancer(&self, namespace: &str, gateway_name: &str) -> Option<String> {
        let tag_filters = vec![
            (CLUSTER_TAG.to_string(), vec![self.cluster.clone()]),
            (GATEWAY_NAMESPACE_TAG.to_string(), vec![namespace.to_string()]),
            (GATEWAY_NAME_TAG.to_string(), vec![gateway_name.to_string()]),
        ];
        let mappings = self
            .client
            .resources_by_tag(&[LOAD_BALANCER_RESOURCE_TYPE.to_string()], &tag_filters)
            .await
            .inspect_err(|error| warn!(%error, "failed to look up gateway load balancer for global accelerator endpoint"))
            .ok()?;
        mappings.into_iter().find_map(|m| m.resource_arn)
    }

    async fn find_or_create_accelerator(
        &self,
        namespace: &str,
        name: &str,
        spec: &GlobalAcceleratorSpec,
        deadline: Instant,
    ) -> Result<String, ReconcileError> {
        let tag_filters = vec![
            (CLUSTER_TAG.to_string(), vec![self.cluster.clone()]),
            (GLOBAL_ACCELERATOR_NAMESPACE_TAG.to_string(), vec![namespace.to_string()]),
            (GLOBAL_ACCELERATOR_NAME_TAG.to_string(), vec![name.to_string()]),
        ];
        let existing = with_backoff(deadline, "GetResources", || {
            self.client.resources_by_tag(&[ACCELERATOR_RESOURCE_TYPE.to_string()], &tag_filters)
        })
        .await?;
        if let Some(arn) = existing.into_iter().find_map(|m| m.resource_arn) {
            return Ok(arn);
        }

        let user_tags = std::collections::BTreeMap::new();
        let tags = tags::global_accelerator_tags(&self.cluster, namespace, name, &user_tags);
        let ip_addresses: Vec<String> = spec.ip_addresses.iter().map(|ip| ip.split('/').next().unwrap_or(ip).to_string()).collect();
        let token = short_hash(&format!("{namespace}/{name}"));
        let created = with_backoff(deadline, "CreateAccelerator", || {
            self.client.create_accelerator(&spec.name, to_sdk_ip_address_type(spec.ip_address_type), ip_addresses.clone(), &token, tags::to_ga_tags(&tags))
        })
        .await?;
        created.accelerator_arn.ok_or(ReconcileError::DeadlineExceeded("accelerator creation returned no arn"))
    }

    async fn delete_cascade(&self, accelerator_arn: &str) {
        let listeners = match self.client.list_listeners(accelerator_arn).await {
            Ok(listeners) => listeners,
            Err(error) => {
                warn!(%error, accelerator_arn, "failed to list listeners before deleting accelerator");
                Vec::new()
            }
        };
        for listener in &listeners {
            let Some(listener_arn) = &listener.listener_arn else { continue };
            match self.client.list_endpoint_groups(listener_arn).await {
                Ok(groups) => {
                    for group in groups {
                        if let Some(arn) = group.endpoint_group_arn {
                            if let Err(error) = self.client.delete_endpoint_group(&arn).await {
                                warn!(%error, %arn, "failed to delete endpoint group");
                            }
                        }
                    }
                }
                Err(error) => warn!(%error, listener_arn, "failed to list endpoint groups before deleting listener"),
            }
            if let Err(error) = self.client.delete_ga_listener(listener_arn).await {
                warn!(%error, listener_arn, "failed to delete listener");
            }
        }
        // A just-created accelerator can take a moment to leave `IN_PROGRESS`
        // before it accepts being disabled; the caller's next GC pass picks
        // this back up if either call below fails.
        if let Err(error) = self.client.disable_accelerator(accelerator_arn).await {
            warn!(%error, accelerator_arn, "failed to disable accelerator before delete");
        }
        if let Err(error) = self.client.delete_accelerator(accelerator_arn).await {
            warn!(%error, accelerator_arn, "failed to delete accelerator");
        }
    }

    async fn owned_accelerators(&self) -> Result<Vec<(String, String, String)>, ReconcileError> {
        let tag_filters = vec![(CLUSTER_TAG.to_string(), vec![self.cluster.clone()])];
        let mappings = self.client.resources_by_tag(&[ACCELERATOR_RESOURCE_TYPE.to_string()], &tag_filters).await?;
        let mut owned = Vec::new();
        for mapping in mappings {
            let Some(arn) = mapping.resource_arn else { continue };
            let tag_list = mapping.tags.unwrap_or_default();
            let namespace = tag_list.iter().find(|t| t.key.as_deref() == Some(GLOBAL_ACCELERATOR_NAMESPACE_TAG)).and_then(|t| t.value.clone());
            let name = tag_list.iter().find(|t| t.key.as_deref() == Some(GLOBAL_ACCELERATOR_NAME_TAG)).and_then(|t| t.value.clone());
            if let (Some(namespace), Some(name)) = (namespace, name) {
                owned.push((namespace, name, arn));
            }
        }
        Ok(owned)
    }

    async fn patch_status(&self, ga: &GlobalAccelerator, arn: Option<&str>, dns_name: Option<&str>, ready: bool, reason: &str, message: String) {
        let namespace = ga.namespace().unwrap_or_default();
        let condition = Condition {
            last_transition_time: Time(chrono::Utc::now()),
            message,
            observed_generation: ga.metadata.generation,
            reason: reason.to_string(),
            status: if ready { "True" } else { "False" }.to_string(),
            type_: "Accepted".to_string(),
        };
        let patch = serde_json::json!({
            "status": {
                "observedGeneration": ga.metadata.generation,
                "acceleratorArn": arn,
                "dnsName": dns_name,
                "conditions": [condition],
            }
        });
        let api: Api<GlobalAccelerator> = Api::namespaced(self.kube.clone(), &namespace);
        if let Err(error) = api.patch_status(&ga.name_any(), &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Merge(patch)).await {
            warn!(%namespace, name = %ga.name_any(), %error, "failed to patch global accelerator status");
        }
    }
}

fn listener_matches(live: &aws_sdk_globalaccelerator::types::Listener, desired: &elbv2_controller_k8s_api::crd::GaListener) -> bool {
    live.protocol == Some(to_sdk_protocol(desired.protocol))
        && live.client_affinity == Some(to_sdk_client_affinity(desired.client_affinity))
        && live.port_ranges.as_deref().unwrap_or_default() == to_sdk_port_ranges(desired).as_slice()
}

fn to_sdk_ip_address_type(t: GaIpAddressType) -> SdkIpAddressType {
    match t {
        GaIpAddressType::Ipv4 => SdkIpAddressType::Ipv4,
        GaIpAddressType::DualStack => SdkIpAddressType::DualStack,
    }
}

fn to_sdk_protocol(p: GaProtocol) -> SdkProtocol {
    match p {
        GaProtocol::Tcp => SdkProtocol::Tcp,
        GaProtocol::Udp => SdkProtocol::Udp,
    }
}

fn to_sdk_client_affinity(a: ClientAffinity) -> SdkClientAffinity {
    match a {
        ClientAffinity::SourceIp => SdkClientAffinity::SourceIp,
        ClientAffinity::None => SdkClientAffinity::None,
    }
}

fn to_sdk_port_ranges(listener: &elbv2_controller_k8s_api::crd::GaListener) -> Vec<SdkPortRange> {
    listener
        .port_ranges
        .iter()
        .map(|r| SdkPortRange::builder().from_port(r.from_port as i32).to_port(r.to_port as i32).build())
        .collect()
}

fn to_sdk_port_overrides(group: &elbv2_controller_k8s_api::crd::EndpointGroup) -> Option<Vec<SdkPortOverride>> {
    group.port_overrides.as_ref().map(|overrides| {
        overrides
            .iter()
            .map(|o| SdkPortOverride::builder().listener_port(o.listener_port as i32).endpoint_port(o.endpoint_port as i32).build())
            .collect()
    })
}

fn to_sdk_endpoint_configurations(endpoints: &[(String, u16, bool)]) -> Vec<SdkEndpointConfiguration> {
    endpoints
        .iter()
        .map(|(id, weight, preserve_client_ip)| {
            SdkEndpointConfiguration::builder()
                .endpoint_id(id)
                .weight(*weight as i32)
                .client_ip_preservation_enabled(*preserve_client_ip)
                .build()
        })
        .collect()
}

fn short_hash(input: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    input.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

/// Drives the reconciler off its own watch of `GlobalAccelerator` custom
/// resources, independent of the Model Builder's shared index: every watch
/// event triggers a full reconcile-and-garbage-collect pass over every
/// currently known accelerator (spec.md §6).
pub async fn run(reconciler: Arc<GlobalAcceleratorReconciler>, client: Client) -> anyhow::Error {
    let mut watch: elbv2_controller_k8s_api::Watch<GlobalAccelerator> =
        watcher::watcher(Api::all(client), watcher::Config::default()).boxed().into();
    let mut cache: HashMap<(String, String), GlobalAccelerator> = HashMap::new();
    loop {
        match watch.recv().await {
            WatchEvent::Init => cache.clear(),
            WatchEvent::InitApply(obj) | WatchEvent::Apply(obj) => {
                let key = (obj.namespace().unwrap_or_default(), obj.name_any());
                cache.insert(key, obj);
            }
            WatchEvent::Delete(obj) => {
                let key = (obj.namespace().unwrap_or_default(), obj.name_any());
                cache.remove(&key);
            }
            WatchEvent::InitDone => {}
        }
        reconciler.reconcile_all(&cache).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elbv2_controller_k8s_api::crd::{GaListener, PortRange};

    fn listener(protocol: GaProtocol, from: u16, to: u16) -> GaListener {
        GaListener {
            protocol,
            port_ranges: vec![PortRange { from_port: from, to_port: to }],
            client_affinity: ClientAffinity::None,
            endpoint_groups: Vec::new(),
        }
    }

    #[test]
    fn listener_matches_identical_protocol_and_ports() {
        let desired = listener(GaProtocol::Tcp, 80, 80);
        let live = aws_sdk_globalaccelerator::types::Listener::builder()
            .listener_arn("arn:aws:globalaccelerator::1234:listener/abc")
            .protocol(SdkProtocol::Tcp)
            .client_affinity(SdkClientAffinity::None)
            .port_ranges(SdkPortRange::builder().from_port(80).to_port(80).build())
            .build();
        assert!(listener_matches(&live, &desired));
    }

    #[test]
    fn listener_matches_rejects_different_port_range() {
        let desired = listener(GaProtocol::Tcp, 80, 80);
        let live = aws_sdk_globalaccelerator::types::Listener::builder()
            .listener_arn("arn:aws:globalaccelerator::1234:listener/abc")
            .protocol(SdkProtocol::Tcp)
            .client_affinity(SdkClientAffinity::None)
            .port_ranges(SdkPortRange::builder().from_port(443).to_port(443).build())
            .build();
        assert!(!listener_matches(&live, &desired));
    }

    #[test]
    fn to_sdk_port_ranges_carries_every_range() {
        let desired = GaListener {
            protocol: GaProtocol::Udp,
            port_ranges: vec![PortRange { from_port: 1000, to_port: 2000 }, PortRange { from_port: 3000, to_port: 3000 }],
            client_affinity: ClientAffinity::SourceIp,
            endpoint_groups: Vec::new(),
        };
        assert_eq!(to_sdk_port_ranges(&desired).len(), 2);
    }
}
