//! Route attachment and listener rule generation (spec.md §4.4 steps 4-5):
//! for every route accepted by a listener, expand its rules' match cross
//! product into one `RuleNode` each, resolve their backends into target
//! groups, and assign ALB/NLB-unique priorities.

use crate::builder::targetgroup::{self, TargetGroupRequest};
use crate::snapshot::{GatewaySnapshot, Snapshot};
use crate::status::{RouteParentStatus, StatusReason};
use crate::{attach, refgrant};
use ahash::AHashMap as HashMap;
use elbv2_controller_core::{
    normalize_weights, rule_priority, AuthenticateConfig, Filter, Graph, GrpcRouteMatch,
    HttpPathMatchKind, HttpRouteMatch, IpAddressType, ListenerProtocol, LogicalId, Node, NodeId,
    ParentRef, Route, RouteAction, RouteKind, RoutePriorityKey, RuleConditions, RuleNode,
    TargetGroupProtocol,
};
use elbv2_controller_k8s_api::crd::ListenerRuleConfigurationSpec;

/// Everything the Model Builder learned while attaching one route: its
/// per-parent status and the rules it contributed, not yet inserted into
/// the graph because their final priority depends on every other route
/// attached to the same listener (see [`finalize`]).
pub struct RouteOutcome {
    pub parent_statuses: Vec<RouteParentStatus>,
    pub pending_rules: Vec<PendingRule>,
}

/// A rule this route contributed to some listener, with everything except
/// its final ALB/NLB priority resolved. `priority_key` is what orders it
/// against every other rule on the same listener.
pub struct PendingRule {
    pub id: NodeId,
    pub listener: NodeId,
    pub conditions: RuleConditions,
    pub action: RouteAction,
    pub target_groups: Vec<(NodeId, u16)>,
    pub priority_key: RoutePriorityKey,
}

/// A rule dropped by [`finalize`] because an earlier rule (by
/// `RoutePriorityKey` order: creation timestamp, then UID) on the same
/// listener already claims its exact condition set (spec.md §4.4 "Edge
/// cases and tie-breaks"). The owning route's `Accepted` parent status
/// should be downgraded to `Reason=Overlapping`.
pub struct OverlapLoss {
    pub route_namespace: String,
    pub route_name: String,
}

/// Assigns final priorities to every pending rule, grouped by listener
/// (spec.md §4.4 step 5: priorities are unique only within a listener), and
/// inserts the resulting `RuleNode`s into `graph`. Within a listener, a rule
/// whose condition set exactly duplicates an earlier (higher-precedence)
/// rule's is dropped instead of inserted; its loss is reported so the
/// caller can surface `Accepted=False, Reason=Overlapping` on its route.
pub fn finalize(
    graph: &mut Graph,
    pending: Vec<PendingRule>,
) -> Result<Vec<OverlapLoss>, elbv2_controller_core::GraphError> {
    let mut by_listener: HashMap<NodeId, Vec<PendingRule>> = HashMap::new();
    for rule in pending {
        by_listener.entry(rule.listener.clone()).or_default().push(rule);
    }

    let mut listeners: Vec<NodeId> = by_listener.keys().cloned().collect();
    listeners.sort();

    let mut overlaps = Vec::new();

    for listener in listeners {
        let mut rules = by_listener.remove(&listener).expect("listener key exists");
        rules.sort_by(|a, b| a.priority_key.cmp(&b.priority_key));

        let mut seen: Vec<RuleConditions> = Vec::new();
        let mut kept: Vec<PendingRule> = Vec::new();
        for rule in rules {
            if seen.iter().any(|c| *c == rule.conditions) {
                overlaps.push(OverlapLoss {
                    route_namespace: rule.priority_key.route_namespace.clone(),
                    route_name: rule.priority_key.route_name.clone(),
                });
                continue;
            }
            seen.push(rule.conditions.clone());
            kept.push(rule);
        }

        let keys: Vec<RoutePriorityKey> = kept.iter().map(|r| r.priority_key.clone()).collect();
        let priorities = rule_priority(&keys);
        for (rule, priority) in kept.into_iter().zip(priorities) {
            let node = RuleNode {
                listener: rule.listener,
                priority,
                conditions: rule.conditions,
                action: rule.action,
                target_groups: rule.target_groups,
            };
            graph.add(rule.id, Node::Rule(node))?;
        }
    }
    Ok(overlaps)
}

struct Candidate<'g> {
    gateway: &'g GatewaySnapshot,
    listener_id: NodeId,
    listener_protocol: ListenerProtocol,
    parent_ref: ParentRef,
}

/// Attaches `route` to every `Gateway` it references, generating rules on
/// each accepted listener. `listener_ids` maps `(gateway namespace, gateway
/// name, listener name)` to the already-materialized `Listener` node's ID.
/// Rules are returned as [`PendingRule`]s rather than inserted directly:
/// their final ALB/NLB priority can only be assigned once every route
/// attached to the same listener has been collected (see [`finalize`]).
pub fn attach_route(
    graph: &mut Graph,
    snapshot: &Snapshot,
    route: &Route,
    listener_ids: &HashMap<(String, String, String), (NodeId, ListenerProtocol)>,
    ip_address_type_of: &HashMap<(String, String), IpAddressType>,
) -> Result<RouteOutcome, elbv2_controller_core::GraphError> {
    let mut parent_statuses = Vec::new();
    let mut pending_rules = Vec::new();

    for parent_ref in &route.parent_refs {
        let Some(gateway) = snapshot.gateways.iter().find(|g| {
            attach::parent_ref_matches(parent_ref, &route.namespace, g)
        }) else {
            parent_statuses.push(RouteParentStatus {
                parent_ref: parent_ref.clone(),
                accepted: false,
                resolved_refs: false,
                reason: StatusReason::NoMatchingParent,
                message: "no Gateway matches this parentRef".into(),
            });
            continue;
        };

        if gateway.namespace != route.namespace
            && !refgrant::is_authorized(
                &snapshot.reference_grants,
                &gateway.namespace,
                route_group(route),
                route_kind(route),
                &route.namespace,
                "",
                "Gateway",
                &gateway.name,
            )
        {
            parent_statuses.push(RouteParentStatus {
                parent_ref: parent_ref.clone(),
                accepted: false,
                resolved_refs: false,
                reason: StatusReason::RefNotPermitted,
                message: "cross-namespace parentRef not permitted by a ReferenceGrant".into(),
            });
            continue;
        }

        let candidates = attach::candidate_listeners(route, gateway)
            .into_iter()
            .filter(|l| {
                parent_ref
                    .section_name
                    .as_deref()
                    .map(|s| s == l.name)
                    .unwrap_or(true)
            })
            .filter_map(|l| {
                listener_ids
                    .get(&(gateway.namespace.clone(), gateway.name.clone(), l.name.clone()))
                    .map(|(id, proto)| Candidate {
                        gateway,
                        listener_id: id.clone(),
                        listener_protocol: *proto,
                        parent_ref: parent_ref.clone(),
                    })
            })
            .collect::<Vec<_>>();

        if candidates.is_empty() {
            parent_statuses.push(RouteParentStatus {
                parent_ref: parent_ref.clone(),
                accepted: false,
                resolved_refs: false,
                reason: StatusReason::NoMatchingListenerHostname,
                message: "no listener accepts this route's hostnames/protocol".into(),
            });
            continue;
        }

        let mut resolved_refs = true;
        for candidate in candidates {
            let ip_address_type = ip_address_type_of
                .get(&(candidate.gateway.namespace.clone(), candidate.gateway.name.clone()))
                .copied()
                .unwrap_or(IpAddressType::Ipv4);

            match build_rules(graph, snapshot, route, &candidate, ip_address_type) {
                Ok((ok, mut rules)) => {
                    resolved_refs &= ok;
                    pending_rules.append(&mut rules);
                }
                Err(BuildRulesError::Graph(e)) => return Err(e),
            }
        }

        parent_statuses.push(RouteParentStatus {
            parent_ref: parent_ref.clone(),
            accepted: true,
            resolved_refs,
            reason: if resolved_refs {
                StatusReason::Accepted
            } else {
                StatusReason::RefNotPermitted
            },
            message: if resolved_refs {
                "route accepted".into()
            } else {
                "one or more backendRefs are not permitted by a ReferenceGrant".into()
            },
        });
    }

    let outcome = RouteOutcome {
        parent_statuses,
        pending_rules,
    };
    Ok(outcome)
}

enum BuildRulesError {
    Graph(elbv2_controller_core::GraphError),
}

impl From<elbv2_controller_core::GraphError> for BuildRulesError {
    fn from(e: elbv2_controller_core::GraphError) -> Self {
        BuildRulesError::Graph(e)
    }
}

/// Builds every [`PendingRule`] this route contributes to `candidate`'s
/// listener, without assigning final priorities (see [`finalize`]). Returns
/// whether every backend reference this route named was resolvable
/// (authorized, in the case of a cross-namespace `Service` reference).
fn build_rules(
    graph: &mut Graph,
    snapshot: &Snapshot,
    route: &Route,
    candidate: &Candidate<'_>,
    ip_address_type: IpAddressType,
) -> Result<(bool, Vec<PendingRule>), BuildRulesError> {
    let mut all_resolved = true;
    let mut pending_rules = Vec::new();

    let listener_default_protocol = match candidate.listener_protocol {
        ListenerProtocol::Http => TargetGroupProtocol::Http,
        ListenerProtocol::Https => TargetGroupProtocol::Https,
        ListenerProtocol::Tls => TargetGroupProtocol::Tls,
        ListenerProtocol::Tcp => TargetGroupProtocol::Tcp,
        ListenerProtocol::Udp => TargetGroupProtocol::Udp,
        // QUIC-upgraded listeners force their target group protocol likewise
        // (spec.md §4.4 step 9).
        ListenerProtocol::TcpQuic | ListenerProtocol::Quic => TargetGroupProtocol::Quic,
    };

    macro_rules! resolve_backends {
        ($backend_refs:expr) => {{
            let mut target_groups = Vec::new();
            for backend in $backend_refs {
                let backend_namespace = backend.namespace.as_deref().unwrap_or(&route.namespace);
                if backend_namespace != route.namespace
                    && !refgrant::is_authorized(
                        &snapshot.reference_grants,
                        backend_namespace,
                        route_group(route),
                        route_kind(route),
                        &route.namespace,
                        "",
                        "Service",
                        &backend.name,
                    )
                {
                    all_resolved = false;
                    continue;
                }
                let service_tgc = snapshot
                    .target_group_configurations
                    .get(&(backend_namespace.to_string(), backend.name.clone()));
                let gateway_tgc = snapshot.gateway_target_group_configurations.get(&(
                    candidate.gateway.namespace.clone(),
                    candidate.gateway.name.clone(),
                ));
                let tg_id = targetgroup::resolve(
                    graph,
                    TargetGroupRequest {
                        service_namespace: backend_namespace,
                        service_name: &backend.name,
                        service_port: backend.port,
                        listener_protocol: listener_default_protocol,
                        service_tgc,
                        gateway_tgc,
                        lb_ip_address_type: ip_address_type,
                    },
                )?;
                target_groups.push((tg_id, backend.weight));
            }
            let weights: Vec<u16> = target_groups.iter().map(|(_, w)| *w).collect();
            let normalized = normalize_weights(&weights);
            target_groups
                .into_iter()
                .zip(normalized)
                .map(|((id, _), w)| (id, w))
                .collect::<Vec<_>>()
        }};
    }

    match &route.kind {
        RouteKind::Http { rules } => {
            for (rule_index, rule) in rules.iter().enumerate() {
                let action = http_action(&rule.filters, snapshot, &route.namespace);
                let target_groups = resolve_backends!(&rule.backend_refs);
                let action = unreachable_forward_to_fixed_response(action, &target_groups);
                let matches = if rule.matches.is_empty() {
                    vec![None]
                } else {
                    rule.matches.iter().map(Some).collect()
                };
                for (match_index, m) in matches.into_iter().enumerate() {
                    let conditions = m.map(http_conditions).unwrap_or_default();
                    let specificity = m.map(http_specificity).unwrap_or(0);
                    pending_rules.push(pending_rule(
                        route,
                        candidate,
                        rule_index,
                        match_index,
                        specificity,
                        conditions,
                        action.clone(),
                        target_groups.clone(),
                    ));
                }
            }
        }
        RouteKind::Grpc { rules } => {
            for (rule_index, rule) in rules.iter().enumerate() {
                let action = http_action(&rule.filters, snapshot, &route.namespace);
                let target_groups = resolve_backends!(&rule.backend_refs);
                let action = unreachable_forward_to_fixed_response(action, &target_groups);
                let matches = if rule.matches.is_empty() {
                    vec![None]
                } else {
                    rule.matches.iter().map(Some).collect()
                };
                for (match_index, m) in matches.into_iter().enumerate() {
                    let conditions = m.map(grpc_conditions).unwrap_or_default();
                    let specificity = m.map(grpc_specificity).unwrap_or(0);
                    pending_rules.push(pending_rule(
                        route,
                        candidate,
                        rule_index,
                        match_index,
                        specificity,
                        conditions,
                        action.clone(),
                        target_groups.clone(),
                    ));
                }
            }
        }
        RouteKind::Tcp { rules } | RouteKind::Udp { rules } | RouteKind::Tls { rules } => {
            // AWS NLB has no native listener-rule concept; L4 routes forward
            // their single rule's backends as the listener's default action
            // (spec.md §9's decision on representing L4 routes uniformly).
            for (rule_index, rule) in rules.iter().enumerate() {
                let target_groups = resolve_backends!(&rule.backend_refs);
                let action = unreachable_forward_to_fixed_response(RouteAction::Forward, &target_groups);
                pending_rules.push(pending_rule(
                    route,
                    candidate,
                    rule_index,
                    0,
                    0,
                    RuleConditions::default(),
                    action,
                    target_groups,
                ));
            }
        }
    }

    Ok((all_resolved, pending_rules))
}

/// Builds a [`PendingRule`] carrying everything except its final priority,
/// which [`finalize`] assigns once every rule on the same listener has been
/// collected (spec.md §4.4 step 5: priorities are unique only per listener).
#[allow(clippy::too_many_arguments)]
fn pending_rule(
    route: &Route,
    candidate: &Candidate<'_>,
    rule_index: usize,
    match_index: usize,
    specificity: u32,
    conditions: RuleConditions,
    action: RouteAction,
    target_groups: Vec<(NodeId, u16)>,
) -> PendingRule {
    let priority_key = RoutePriorityKey {
        route_creation_timestamp: route.creation_timestamp,
        route_uid: route.uid.clone(),
        route_namespace: route.namespace.clone(),
        route_name: route.name.clone(),
        rule_index,
        match_index,
        specificity,
    };
    let id = LogicalId::of(
        "Rule",
        &(
            candidate.listener_id.as_str(),
            &route.namespace,
            &route.name,
            rule_index,
            match_index,
        ),
    );
    PendingRule {
        id,
        listener: candidate.listener_id.clone(),
        conditions,
        action,
        target_groups,
        priority_key,
    }
}

fn route_group(_route: &Route) -> &'static str {
    "gateway.networking.k8s.io"
}

fn route_kind(route: &Route) -> &'static str {
    match route.kind {
        RouteKind::Http { .. } => "HTTPRoute",
        RouteKind::Grpc { .. } => "GRPCRoute",
        RouteKind::Tcp { .. } => "TCPRoute",
        RouteKind::Udp { .. } => "UDPRoute",
        RouteKind::Tls { .. } => "TLSRoute",
    }
}

fn http_conditions(m: &HttpRouteMatch) -> RuleConditions {
    RuleConditions {
        path: m.path.clone(),
        method: m.method.clone(),
        headers: m.headers.clone(),
        query_params: m.query_params.clone(),
    }
}

fn http_specificity(m: &HttpRouteMatch) -> u32 {
    let path_score = match m.path.as_ref().map(|p| &p.kind) {
        Some(HttpPathMatchKind::Exact) => 300,
        Some(HttpPathMatchKind::PathPrefix) => 200,
        Some(HttpPathMatchKind::RegularExpression) => 100,
        None => 0,
    };
    path_score + m.headers.len() as u32 * 2 + m.query_params.len() as u32 + m.method.is_some() as u32
}

fn grpc_conditions(m: &GrpcRouteMatch) -> RuleConditions {
    RuleConditions {
        path: None,
        method: m.method.as_ref().and_then(|mm| mm.method.clone()),
        headers: m.headers.clone(),
        query_params: vec![],
    }
}

fn grpc_specificity(m: &GrpcRouteMatch) -> u32 {
    let method_score = match &m.method {
        Some(mm) if mm.service.is_some() && mm.method.is_some() => 300,
        Some(mm) if mm.service.is_some() || mm.method.is_some() => 200,
        _ => 0,
    };
    method_score + m.headers.len() as u32 * 2
}

/// Translates a route rule's filters into a `RuleNode` action. AWS permits
/// exactly one "terminal" action per rule (forward/redirect/fixed-response)
/// optionally preceded by one authenticate action; `ExtensionRef` filters
/// naming a `ListenerRuleConfiguration` with an `authenticate-*` action
/// supply that leading action, so this function returns only the terminal
/// one and the authenticate step is layered on by the reconciler from the
/// same `ListenerRuleConfiguration` lookup.
fn http_action(filters: &[Filter], snapshot: &Snapshot, route_namespace: &str) -> RouteAction {
    for filter in filters {
        match filter {
            Filter::RequestRedirect {
                scheme,
                hostname,
                port,
                status_code,
            } => {
                return RouteAction::Redirect {
                    scheme: scheme.clone(),
                    hostname: hostname.clone(),
                    port: *port,
                    status_code: status_code.unwrap_or(302),
                };
            }
            Filter::ExtensionRef {
                listener_rule_configuration,
            } => {
                if let Some(lrc) = snapshot
                    .listener_rule_configurations
                    .get(&(route_namespace.to_string(), listener_rule_configuration.clone()))
                {
                    if let Some(action) = fixed_response_action(lrc) {
                        return action;
                    }
                    if let Some(action) = redirect_action(lrc) {
                        return action;
                    }
                    if let Some(config) = authenticate_config(lrc) {
                        return RouteAction::Authenticate { config };
                    }
                }
            }
            Filter::RequestHeaderModifier { .. } => {}
        }
    }
    RouteAction::Forward
}

/// A `Forward` action with no target groups left after resolution (every
/// backend was cross-namespace and lacked a `ReferenceGrant`, or every
/// weight normalized to zero) can't be sent to AWS as a forward action; it
/// becomes a fixed 503 instead (spec.md §8 scenario 2, and the zero-weight
/// case `normalize_weights` documents).
fn unreachable_forward_to_fixed_response(action: RouteAction, target_groups: &[(NodeId, u16)]) -> RouteAction {
    match action {
        RouteAction::Forward if target_groups.is_empty() => RouteAction::FixedResponse {
            status_code: 503,
            message: "no resolvable backend".into(),
        },
        other => other,
    }
}

fn fixed_response_action(lrc: &ListenerRuleConfigurationSpec) -> Option<RouteAction> {
    lrc.actions.iter().find_map(|a| match a {
        elbv2_controller_k8s_api::crd::Action::FixedResponse(cfg) => Some(RouteAction::FixedResponse {
            status_code: cfg.status_code,
            message: cfg.message_body.clone().unwrap_or_default(),
        }),
        _ => None,
    })
}

fn redirect_action(lrc: &ListenerRuleConfigurationSpec) -> Option<RouteAction> {
    lrc.actions.iter().find_map(|a| match a {
        elbv2_controller_k8s_api::crd::Action::Redirect(cfg) => Some(RouteAction::Redirect {
            scheme: cfg.scheme.clone(),
            hostname: cfg.hostname.clone(),
            port: cfg.port.as_deref().and_then(|p| p.parse().ok()),
            status_code: cfg.status_code.parse().unwrap_or(302),
        }),
        _ => None,
    })
}

fn authenticate_config(lrc: &ListenerRuleConfigurationSpec) -> Option<AuthenticateConfig> {
    lrc.actions.iter().find_map(|a| match a {
        elbv2_controller_k8s_api::crd::Action::AuthenticateOidc(cfg) => Some(AuthenticateConfig::Oidc {
            issuer: cfg.issuer.clone(),
            authorization_endpoint: cfg.authorization_endpoint.clone(),
            token_endpoint: cfg.token_endpoint.clone(),
            user_info_endpoint: cfg.user_info_endpoint.clone(),
            client_id: cfg.client_id.clone(),
        }),
        elbv2_controller_k8s_api::crd::Action::AuthenticateCognito(cfg) => {
            Some(AuthenticateConfig::Cognito {
                user_pool_arn: cfg.user_pool_arn.clone(),
                user_pool_client_id: cfg.user_pool_client_id.clone(),
                user_pool_domain: cfg.user_pool_domain.clone(),
            })
        }
        _ => None,
    })
}
