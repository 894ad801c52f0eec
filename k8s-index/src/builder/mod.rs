//! The Model Builder's top-level entry point (spec.md §4.4): turns a
//! [`Snapshot`] into a [`Graph`] plus the status updates the `k8s-status`
//! crate patches back onto Gateways and Routes.
//!
//! Submodules own one step each; this module only orders the calls and
//! wires their outputs together, mirroring the numbered algorithm in
//! spec.md §4.4.

pub mod merge;
pub mod route;
pub mod securitygroup;
pub mod targetgroup;

use crate::snapshot::{GatewayProtocol, GatewaySnapshot, Snapshot};
use crate::status::{GatewayStatusUpdate, RouteStatusUpdate, StatusReason};
use ahash::AHashMap as HashMap;
use elbv2_controller_core::{
    Graph, GraphError, ListenerAttribute, ListenerProtocol, ListenerSpec, LoadBalancerKind,
    LoadBalancerSpec, LogicalId, Node, NodeId, Scheme,
};
use elbv2_controller_k8s_api::crd::LoadBalancerConfigurationSpec as Lbc;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Graph(#[from] GraphError),
}

pub struct BuildOutput {
    pub graph: Graph,
    pub gateway_statuses: Vec<GatewayStatusUpdate>,
    pub route_statuses: Vec<RouteStatusUpdate>,
    /// `(gateway namespace, gateway name) -> (LoadBalancerConfiguration
    /// namespace, name)`, for the Reconciliation Engine to write the
    /// resulting load balancer ARN back onto once reconciled (spec.md §4.5
    /// step 6).
    pub gateway_lbc_refs: HashMap<(String, String), (String, String)>,
}

/// Runs the full Model Builder algorithm (spec.md §4.4 steps 1-9) over
/// `snapshot`. Gateway selection (step 1) is assumed to have already
/// happened in `snapshot.gateways` — whatever populates the snapshot (the
/// watch-backed index in this crate, or a test fixture) is responsible for
/// filtering to gateways whose `GatewayClass.spec.controllerName` matches
/// `snapshot.controller_name`.
pub fn build(snapshot: &Snapshot) -> Result<BuildOutput, BuildError> {
    let mut graph = Graph::new();
    let mut gateway_statuses = Vec::new();
    let mut route_statuses = Vec::new();
    let mut gateway_lbc_refs = HashMap::new();

    // listener_ids: (gateway ns, gateway name, listener name) -> (node id, protocol)
    let mut listener_ids: HashMap<(String, String, String), (NodeId, ListenerProtocol)> =
        HashMap::new();
    // ip_address_type_of: (gateway ns, gateway name) -> effective IpAddressType
    let mut ip_address_type_of = HashMap::new();
    // backend_sg_for_lb: load balancer id -> its managed security group id,
    // for NLBs that opted into ManageBackendSecurityGroupRules (spec.md §4.4
    // step 7); populated below once the gateway's effective LBC is known.
    let mut backend_sg_for_lb: HashMap<NodeId, LogicalId> = HashMap::new();

    for gateway in &snapshot.gateways {
        if gateway.gateway_class_controller_name != snapshot.controller_name {
            continue;
        }

        let lbc = merge::merge(gateway.class_lbc.as_ref(), gateway.gateway_lbc.as_ref());

        let lb_id = LogicalId::of(
            "LoadBalancer",
            &(&snapshot.cluster, &gateway.namespace, &gateway.name),
        );

        let (lb_kind, ip_address_type) = load_balancer_kind(gateway, &lbc);
        ip_address_type_of.insert((gateway.namespace.clone(), gateway.name.clone()), ip_address_type);

        let subnets = lbc.load_balancer_subnets.clone().map_or_else(Vec::new, |subnets| {
            subnets.into_iter().map(|s| s.identifier).collect()
        });

        let sg_id = LogicalId::of("SecurityGroup", &(lb_id.as_str(), "managed"));

        let lb_spec = LoadBalancerSpec {
            cluster: snapshot.cluster.clone(),
            gateway_namespace: gateway.namespace.clone(),
            gateway_name: gateway.name.clone(),
            scheme: lbc
                .scheme
                .map(convert_scheme)
                .unwrap_or(Scheme::InternetFacing),
            ip_address_type,
            kind: lb_kind,
            subnets,
            security_groups: vec![sg_id.clone()],
            attributes: lbc
                .load_balancer_attributes
                .clone()
                .unwrap_or_default()
                .into_iter()
                .map(|a| (a.key, a.value))
                .collect(),
            tags: lbc
                .tags
                .clone()
                .unwrap_or_default()
                .into_iter()
                .map(|a| (a.key, a.value))
                .collect(),
        };
        graph.add(lb_id.clone(), Node::LoadBalancer(lb_spec))?;
        if let Some(lbc_ref) = &gateway.gateway_lbc_ref {
            gateway_lbc_refs.insert((gateway.namespace.clone(), gateway.name.clone()), lbc_ref.clone());
        }

        let mut listener_ports = Vec::new();
        for listener in &gateway.listeners {
            let protocol = upgraded_protocol(listener.protocol, listener.quic_enabled);
            let listener_id = LogicalId::of(
                "Listener",
                &(lb_id.as_str(), format!("{protocol:?}"), listener.port),
            );

            let matching_config = lbc.listener_configurations.iter().flatten().find(|lc| {
                merge::protocol_port_matches(&lc.protocol_port, &protocol_name(protocol), listener.port)
            });

            let spec = ListenerSpec {
                load_balancer: lb_id.clone(),
                protocol,
                port: listener.port,
                certificates: matching_config
                    .and_then(|lc| lc.certificates.clone())
                    .unwrap_or_else(|| listener.certificate_refs.clone()),
                default_certificate: matching_config
                    .and_then(|lc| lc.default_certificate.clone())
                    .or_else(|| listener.certificate_refs.first().cloned()),
                ssl_policy: matching_config.and_then(|lc| lc.ssl_policy.clone()),
                alpn_policy: matching_config
                    .and_then(|lc| lc.alpn_policy)
                    .map(convert_alpn),
                mutual_authentication: matching_config
                    .and_then(|lc| lc.mutual_authentication.as_ref())
                    .map(convert_mtls),
                attributes: matching_config
                    .and_then(|lc| lc.listener_attributes.clone())
                    .unwrap_or_default()
                    .into_iter()
                    .map(|a| ListenerAttribute {
                        key: a.key,
                        value: a.value,
                    })
                    .collect(),
                default_target_groups: vec![],
            };
            graph.add(listener_id.clone(), Node::Listener(spec))?;
            listener_ids.insert(
                (gateway.namespace.clone(), gateway.name.clone(), listener.name.clone()),
                (listener_id, protocol),
            );
            listener_ports.push((listener.port, protocol));
        }

        let (sg_id_built, sg_spec) = securitygroup::build(lb_id.clone(), &lbc, &listener_ports);
        debug_assert_eq!(sg_id_built, sg_id);
        securitygroup::add_to_graph(&mut graph, sg_id.clone(), sg_spec)?;

        if lb_kind == LoadBalancerKind::Network && lbc.manage_backend_security_group_rules == Some(true) {
            backend_sg_for_lb.insert(lb_id.clone(), sg_id);
        }

        gateway_statuses.push(GatewayStatusUpdate {
            namespace: gateway.namespace.clone(),
            name: gateway.name.clone(),
            accepted: true,
            reason: StatusReason::Accepted,
            message: "gateway accepted".into(),
        });
    }

    let mut pending_rules = Vec::new();
    for r in &snapshot.routes {
        let outcome = route::attach_route(&mut graph, snapshot, r, &listener_ids, &ip_address_type_of)?;
        pending_rules.extend(outcome.pending_rules);
        route_statuses.push(RouteStatusUpdate {
            namespace: r.namespace.clone(),
            name: r.name.clone(),
            kind: route_kind_str(r),
            parents: outcome.parent_statuses,
        });
    }
    let overlaps = route::finalize(&mut graph, pending_rules)?;
    for overlap in overlaps {
        if let Some(status) = route_statuses
            .iter_mut()
            .find(|s| s.namespace == overlap.route_namespace && s.name == overlap.route_name)
        {
            for parent in status.parents.iter_mut().filter(|p| p.accepted) {
                parent.accepted = false;
                parent.reason = StatusReason::Overlapping;
                parent.message = "a higher-precedence rule on this listener already claims this match condition set".into();
            }
        }
    }

    for (lb_id, sg_id) in &backend_sg_for_lb {
        securitygroup::backend_bindings(&mut graph, lb_id, sg_id)?;
    }

    Ok(BuildOutput {
        graph,
        gateway_statuses,
        route_statuses,
        gateway_lbc_refs,
    })
}

fn route_kind_str(r: &elbv2_controller_core::Route) -> &'static str {
    use elbv2_controller_core::RouteKind::*;
    match r.kind {
        Http { .. } => "HTTPRoute",
        Grpc { .. } => "GRPCRoute",
        Tcp { .. } => "TCPRoute",
        Udp { .. } => "UDPRoute",
        Tls { .. } => "TLSRoute",
    }
}

fn protocol_name(p: ListenerProtocol) -> String {
    match p {
        ListenerProtocol::Http => "HTTP",
        ListenerProtocol::Https => "HTTPS",
        ListenerProtocol::Tls => "TLS",
        ListenerProtocol::Tcp | ListenerProtocol::TcpQuic => "TCP",
        ListenerProtocol::Udp | ListenerProtocol::Quic => "UDP",
    }
    .to_string()
}

/// Upgrades a `UDP`/`TCP` listener to `QUIC`/`TCP_QUIC` when the Gateway
/// listener set `quicEnabled=true` (spec.md §4.4 step 9).
fn upgraded_protocol(protocol: GatewayProtocol, quic_enabled: bool) -> ListenerProtocol {
    match (protocol, quic_enabled) {
        (GatewayProtocol::Udp, true) => ListenerProtocol::Quic,
        (GatewayProtocol::Tcp, true) => ListenerProtocol::TcpQuic,
        (GatewayProtocol::Http, _) => ListenerProtocol::Http,
        (GatewayProtocol::Https, _) => ListenerProtocol::Https,
        (GatewayProtocol::Tls, _) => ListenerProtocol::Tls,
        (GatewayProtocol::Tcp, false) => ListenerProtocol::Tcp,
        (GatewayProtocol::Udp, false) => ListenerProtocol::Udp,
    }
}

/// Infers whether `gateway` maps to an ALB or an NLB from its listener
/// protocols (HTTP/HTTPS/TLS ⇒ Application, TCP/UDP ⇒ Network), and
/// resolves the effective IP address type from the merged LBC.
fn load_balancer_kind(
    gateway: &GatewaySnapshot,
    lbc: &Lbc,
) -> (LoadBalancerKind, elbv2_controller_core::IpAddressType) {
    let is_l7 = gateway.listeners.iter().any(|l| {
        matches!(l.protocol, GatewayProtocol::Http | GatewayProtocol::Https | GatewayProtocol::Tls)
    });
    let kind = if is_l7 {
        LoadBalancerKind::Application
    } else {
        LoadBalancerKind::Network
    };
    let ip_address_type = match lbc.ip_address_type {
        Some(elbv2_controller_k8s_api::crd::IpAddressType::Dualstack) => {
            elbv2_controller_core::IpAddressType::Dualstack
        }
        Some(elbv2_controller_k8s_api::crd::IpAddressType::DualstackWithoutPublicIpv4) => {
            elbv2_controller_core::IpAddressType::DualstackWithoutPublicIpv4
        }
        _ => elbv2_controller_core::IpAddressType::Ipv4,
    };
    (kind, ip_address_type)
}

fn convert_scheme(s: elbv2_controller_k8s_api::crd::Scheme) -> Scheme {
    match s {
        elbv2_controller_k8s_api::crd::Scheme::Internal => Scheme::Internal,
        elbv2_controller_k8s_api::crd::Scheme::InternetFacing => Scheme::InternetFacing,
    }
}

fn convert_alpn(a: elbv2_controller_k8s_api::crd::AlpnPolicy) -> elbv2_controller_core::AlpnPolicy {
    use elbv2_controller_k8s_api::crd::AlpnPolicy as Crd;
    use elbv2_controller_core::AlpnPolicy as Core;
    match a {
        Crd::None => Core::None,
        Crd::Http1Only => Core::Http1Only,
        Crd::Http2Only => Core::Http2Only,
        Crd::Http2Optional => Core::Http2Optional,
        Crd::Http2Preferred => Core::Http2Preferred,
    }
}

fn convert_mtls(
    m: &elbv2_controller_k8s_api::crd::MutualAuthentication,
) -> elbv2_controller_core::MutualAuthentication {
    use elbv2_controller_k8s_api::crd::MutualAuthenticationMode as Crd;
    use elbv2_controller_core::MutualAuthenticationMode as Core;
    elbv2_controller_core::MutualAuthentication {
        mode: match m.mode {
            Crd::Off => Core::Off,
            Crd::Passthrough => Core::Passthrough,
            Crd::Verify => Core::Verify,
        },
        trust_store: m.trust_store.clone(),
        ignore_client_certificate_expiry: m.ignore_client_certificate_expiry.unwrap_or(false),
        advertise_trust_store_ca_names: matches!(
            m.advertise_trust_store_ca_names,
            Some(elbv2_controller_k8s_api::crd::OnOff::On)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{GatewayListenerSpec, GatewaySnapshot};

    fn snapshot_with_one_gateway() -> Snapshot {
        Snapshot {
            cluster: "test".into(),
            controller_name: "elbv2.k8s.aws/gateway-controller".into(),
            gateways: vec![GatewaySnapshot {
                namespace: "default".into(),
                name: "gw".into(),
                gateway_class_name: "aws".into(),
                gateway_class_controller_name: "elbv2.k8s.aws/gateway-controller".into(),
                class_lbc: None,
                gateway_lbc: None,
                gateway_lbc_ref: None,
                listeners: vec![GatewayListenerSpec {
                    name: "http".into(),
                    port: 80,
                    protocol: GatewayProtocol::Http,
                    hostname: None,
                    certificate_refs: vec![],
                    quic_enabled: false,
                }],
            }],
            ..Default::default()
        }
    }

    #[test]
    fn builds_a_load_balancer_and_listener_for_a_selected_gateway() {
        let snapshot = snapshot_with_one_gateway();
        let out = build(&snapshot).unwrap();
        let kinds: Vec<_> = out
            .graph
            .ids()
            .filter_map(|id| out.graph.get(id).map(|n| n.kind()))
            .collect();
        assert!(kinds.contains(&elbv2_controller_core::NodeKind::LoadBalancer));
        assert!(kinds.contains(&elbv2_controller_core::NodeKind::Listener));
        assert!(kinds.contains(&elbv2_controller_core::NodeKind::SecurityGroup));
    }

    #[test]
    fn gateway_with_other_controller_name_is_skipped() {
        let mut snapshot = snapshot_with_one_gateway();
        snapshot.gateways[0].gateway_class_controller_name = "other/controller".into();
        let out = build(&snapshot).unwrap();
        assert!(out.graph.is_empty());
    }

    #[test]
    fn determinism_same_snapshot_same_graph() {
        let snapshot = snapshot_with_one_gateway();
        let a = build(&snapshot).unwrap();
        let b = build(&snapshot).unwrap();
        let mut a_ids: Vec<_> = a.graph.ids().cloned().collect();
        let mut b_ids: Vec<_> = b.graph.ids().cloned().collect();
        a_ids.sort();
        b_ids.sort();
        assert_eq!(a_ids, b_ids);
    }

    fn http_route_to_backend(namespace: &str, backend_namespace: &str) -> elbv2_controller_core::Route {
        elbv2_controller_core::Route {
            namespace: namespace.into(),
            name: "r".into(),
            uid: "uid-1".into(),
            creation_timestamp: chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .unwrap()
                .into(),
            parent_refs: vec![elbv2_controller_core::ParentRef {
                group: String::new(),
                kind: String::new(),
                namespace: None,
                name: "gw".into(),
                section_name: None,
                port: None,
            }],
            hostnames: vec![],
            kind: elbv2_controller_core::RouteKind::Http {
                rules: vec![elbv2_controller_core::RouteRule {
                    matches: vec![],
                    filters: vec![],
                    backend_refs: vec![elbv2_controller_core::BackendRef {
                        namespace: Some(backend_namespace.into()),
                        name: "svc".into(),
                        port: 80,
                        weight: 1,
                    }],
                }],
            },
        }
    }

    /// spec.md §8 scenario 2: a cross-namespace backend without a matching
    /// `ReferenceGrant` attaches the route (the listener still materializes)
    /// but the rule forwards nowhere, so it becomes a fixed 503 instead.
    #[test]
    fn cross_namespace_backend_without_grant_becomes_fixed_response() {
        let mut snapshot = snapshot_with_one_gateway();
        snapshot.routes.push(http_route_to_backend("ns-a", "ns-b"));
        let out = build(&snapshot).unwrap();
        let rule = out
            .graph
            .ids()
            .filter_map(|id| out.graph.get(id))
            .find_map(|n| match n {
                elbv2_controller_core::Node::Rule(r) => Some(r),
                _ => None,
            })
            .expect("one rule generated");
        assert!(matches!(
            rule.action,
            elbv2_controller_core::RouteAction::FixedResponse { status_code: 503, .. }
        ));
        assert!(rule.target_groups.is_empty());
    }

    /// spec.md §4.4 step 9: a `UDP` listener with `quicEnabled=true` upgrades
    /// to `QUIC`, and its target groups follow (testable scenario 4).
    #[test]
    fn quic_enabled_listener_upgrades_target_group_protocol() {
        let mut snapshot = snapshot_with_one_gateway();
        snapshot.gateways[0].listeners = vec![GatewayListenerSpec {
            name: "udp".into(),
            port: 8080,
            protocol: GatewayProtocol::Udp,
            hostname: None,
            certificate_refs: vec![],
            quic_enabled: true,
        }];
        snapshot.routes.push(elbv2_controller_core::Route {
            kind: elbv2_controller_core::RouteKind::Udp {
                rules: vec![elbv2_controller_core::RouteRule {
                    matches: vec![],
                    filters: vec![],
                    backend_refs: vec![elbv2_controller_core::BackendRef {
                        namespace: None,
                        name: "svc".into(),
                        port: 8080,
                        weight: 1,
                    }],
                }],
            },
            ..http_route_to_backend("default", "default")
        });
        let out = build(&snapshot).unwrap();
        let listener = out
            .graph
            .ids()
            .filter_map(|id| out.graph.get(id))
            .find_map(|n| match n {
                elbv2_controller_core::Node::Listener(l) => Some(l),
                _ => None,
            })
            .expect("one listener generated");
        assert_eq!(listener.protocol, ListenerProtocol::Quic);

        let tg = out
            .graph
            .ids()
            .filter_map(|id| out.graph.get(id))
            .find_map(|n| match n {
                elbv2_controller_core::Node::TargetGroup(t) => Some(t),
                _ => None,
            })
            .expect("one target group generated");
        assert_eq!(tg.protocol, elbv2_controller_core::TargetGroupProtocol::Quic);
    }

    /// spec.md §4.4 "Edge cases and tie-breaks": two rules on the same
    /// listener with an identical condition set keep only the earlier
    /// route's rule; the later route's status flips to
    /// `Accepted=False, Reason=Overlapping`.
    #[test]
    fn overlapping_rule_demotes_the_later_route() {
        let mut snapshot = snapshot_with_one_gateway();
        let earlier = http_route_to_backend("default", "default");
        let mut later = http_route_to_backend("default", "default");
        later.name = "r2".into();
        later.uid = "uid-2".into();
        later.creation_timestamp = chrono::DateTime::parse_from_rfc3339("2026-01-02T00:00:00Z")
            .unwrap()
            .into();
        snapshot.routes.push(earlier);
        snapshot.routes.push(later);

        let out = build(&snapshot).unwrap();

        let losing = out.route_statuses.iter().find(|s| s.name == "r2").unwrap();
        assert!(!losing.parents[0].accepted);
        assert_eq!(losing.parents[0].reason, StatusReason::Overlapping);

        let winning = out.route_statuses.iter().find(|s| s.name == "r").unwrap();
        assert!(winning.parents[0].accepted);

        let rule_count = out
            .graph
            .ids()
            .filter_map(|id| out.graph.get(id))
            .filter(|n| matches!(n, elbv2_controller_core::Node::Rule(_)))
            .count();
        assert_eq!(rule_count, 1);
    }

    /// spec.md §4.4 step 4, P3: a route whose parentRef crosses into
    /// another namespace is rejected unless a `ReferenceGrant` authorizes
    /// route→Gateway for that namespace pair.
    #[test]
    fn cross_namespace_parent_ref_denied_without_reference_grant() {
        let mut snapshot = snapshot_with_one_gateway();
        let mut route = http_route_to_backend("other-ns", "default");
        route.parent_refs[0].namespace = Some("default".into());
        snapshot.routes.push(route);

        let out = build(&snapshot).unwrap();
        let status = out.route_statuses.iter().find(|s| s.namespace == "other-ns").unwrap();
        assert!(!status.parents[0].accepted);
        assert_eq!(status.parents[0].reason, StatusReason::RefNotPermitted);

        let rule_count = out
            .graph
            .ids()
            .filter_map(|id| out.graph.get(id))
            .filter(|n| matches!(n, elbv2_controller_core::Node::Rule(_)))
            .count();
        assert_eq!(rule_count, 0);
    }

    #[test]
    fn cross_namespace_parent_ref_allowed_with_reference_grant() {
        let mut snapshot = snapshot_with_one_gateway();
        let mut route = http_route_to_backend("other-ns", "default");
        route.parent_refs[0].namespace = Some("default".into());
        snapshot.routes.push(route);
        snapshot.reference_grants.push(crate::snapshot::ReferenceGrant {
            namespace: "default".into(),
            from_group: "gateway.networking.k8s.io".into(),
            from_kind: "HTTPRoute".into(),
            from_namespace: "other-ns".into(),
            to_group: "".into(),
            to_kind: "Gateway".into(),
            to_name: None,
        });

        let out = build(&snapshot).unwrap();
        let status = out.route_statuses.iter().find(|s| s.namespace == "other-ns").unwrap();
        assert!(status.parents[0].accepted);
    }

    /// spec.md §4.4 step 7: an NLB gateway with
    /// `manageBackendSecurityGroupRules: true` gets a `TargetGroupBinding`
    /// carrying the backend ingress rule for its target group's port,
    /// sourced from the gateway's own managed security group.
    #[test]
    fn manage_backend_security_group_rules_emits_a_target_group_binding() {
        let mut snapshot = snapshot_with_one_gateway();
        snapshot.gateways[0].listeners = vec![GatewayListenerSpec {
            name: "tcp".into(),
            port: 6000,
            protocol: GatewayProtocol::Tcp,
            hostname: None,
            certificate_refs: vec![],
            quic_enabled: false,
        }];
        snapshot.gateways[0].gateway_lbc = Some(elbv2_controller_k8s_api::crd::LoadBalancerConfigurationSpec {
            manage_backend_security_group_rules: Some(true),
            ..Default::default()
        });
        snapshot.routes.push(elbv2_controller_core::Route {
            kind: elbv2_controller_core::RouteKind::Tcp {
                rules: vec![elbv2_controller_core::RouteRule {
                    matches: vec![],
                    filters: vec![],
                    backend_refs: vec![elbv2_controller_core::BackendRef {
                        namespace: None,
                        name: "svc".into(),
                        port: 6000,
                        weight: 1,
                    }],
                }],
            },
            ..http_route_to_backend("default", "default")
        });

        let out = build(&snapshot).unwrap();

        let sg_id = out
            .graph
            .ids()
            .find(|id| matches!(out.graph.get(id), Some(elbv2_controller_core::Node::SecurityGroup(_))))
            .expect("managed security group generated")
            .clone();

        let binding = out
            .graph
            .ids()
            .filter_map(|id| out.graph.get(id))
            .find_map(|n| match n {
                elbv2_controller_core::Node::TargetGroupBinding(b) => Some(b),
                _ => None,
            })
            .expect("one target group binding generated");

        assert_eq!(binding.service_name, "svc");
        let rule = &binding.ingress_rules[0];
        assert_eq!(rule.ports, vec![(elbv2_controller_core::PortProtocol::Tcp, 6000)]);
        assert!(matches!(
            &rule.from,
            elbv2_controller_core::IngressSource::SecurityGroup(id) if id == sg_id.as_str()
        ));
    }

    /// `ManageBackendSecurityGroupRules` only ever applies to NLBs (spec.md
    /// §4.4 step 7 talks about "NLB-to-backend traffic" specifically); an
    /// ALB gateway with the flag set still gets no binding.
    #[test]
    fn alb_gateway_gets_no_backend_binding_even_with_the_flag_set() {
        let mut snapshot = snapshot_with_one_gateway();
        snapshot.gateways[0].gateway_lbc = Some(elbv2_controller_k8s_api::crd::LoadBalancerConfigurationSpec {
            manage_backend_security_group_rules: Some(true),
            ..Default::default()
        });
        let out = build(&snapshot).unwrap();
        assert!(out
            .graph
            .ids()
            .filter_map(|id| out.graph.get(id))
            .all(|n| !matches!(n, elbv2_controller_core::Node::TargetGroupBinding(_))));
    }
}
