//! Translates watched Gateway API / CRD objects into the plain [`Snapshot`]
//! types the Model Builder consumes (spec.md §4.4 "Input"). Every function
//! here is a pure, fallible mapping — no K8s API calls, no caching. Callers
//! in [`crate::index`] are responsible for resolving cross-object lookups
//! (a `GatewayClass`'s `parametersRef`, a `Secret`-backed certificate) before
//! handing the pieces to these conversions.

use crate::snapshot::{GatewayListenerSpec, GatewayProtocol};
use elbv2_controller_k8s_api::gateway::{
    gatewayclasses::GatewayClass, gateways::Gateway, grpcroutes::GRPCRoute,
    httproutes::HTTPRoute, referencegrants::ReferenceGrant as ApiReferenceGrant,
    tcproutes::TCPRoute, tlsroutes::TLSRoute, udproutes::UDPRoute,
};
use elbv2_controller_k8s_api::ResourceExt;
use elbv2_controller_core::{
    BackendRef, Filter, GrpcMethodMatch, GrpcRouteMatch, HeaderMatch, HeaderMatchKind,
    HttpPathMatch, HttpPathMatchKind, HttpRouteMatch, ParentRef, Route, RouteKind, RouteRule,
};

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("{0} is missing a namespace")]
    MissingNamespace(&'static str),
    #[error("{0} is missing a UID")]
    MissingUid(&'static str),
    #[error("unsupported filter on {0}: {1}")]
    UnsupportedFilter(&'static str, &'static str),
}

pub fn gateway_class_controller_name(gc: &GatewayClass) -> String {
    gc.spec.controller_name.clone()
}

/// The `(namespace, name)` of the `LoadBalancerConfiguration` a
/// `GatewayClass` points at via `parametersRef`, when it names our CRD.
/// `GatewayClass` is cluster-scoped, so the reference must carry its own
/// namespace.
pub fn class_parameters_ref(gc: &GatewayClass) -> Option<(String, String)> {
    let pr = gc.spec.parameters_ref.as_ref()?;
    if pr.group != "elbv2.k8s.aws" || pr.kind != "LoadBalancerConfiguration" {
        return None;
    }
    Some((pr.namespace.clone()?, pr.name.clone()))
}

pub fn gateway_infrastructure_parameters_ref_name(gw: &Gateway) -> Option<String> {
    let infra = gw.spec.infrastructure.as_ref()?;
    let pr = infra.parameters_ref.as_ref()?;
    (pr.group == "elbv2.k8s.aws" && pr.kind == "LoadBalancerConfiguration").then(|| pr.name.clone())
}

/// Converts one `Gateway` listener into the snapshot's plain form. TLS
/// certificate references are passed through as-is: whether a `certificateRef`
/// names an ACM ARN directly or a `Secret` carrying one is a Cloud Client
/// Facade resolution concern the Model Builder doesn't need to know about.
pub fn gateway_listener(listener: &elbv2_controller_k8s_api::gateway::gateways::GatewayListeners) -> Option<GatewayListenerSpec> {
    let protocol = match listener.protocol.as_str() {
        "HTTP" => GatewayProtocol::Http,
        "HTTPS" => GatewayProtocol::Https,
        "TLS" => GatewayProtocol::Tls,
        "TCP" => GatewayProtocol::Tcp,
        "UDP" => GatewayProtocol::Udp,
        _ => return None,
    };

    let certificate_refs = listener
        .tls
        .as_ref()
        .and_then(|tls| tls.certificate_refs.as_ref())
        .into_iter()
        .flatten()
        .map(|r| r.name.clone())
        .collect();

    Some(GatewayListenerSpec {
        name: listener.name.clone(),
        port: listener.port as u16,
        protocol,
        hostname: listener.hostname.clone(),
        certificate_refs,
        quic_enabled: false,
    })
}

fn parent_ref(
    group: Option<&str>,
    kind: Option<&str>,
    namespace: Option<&str>,
    name: &str,
    section_name: Option<&str>,
    port: Option<i32>,
) -> ParentRef {
    ParentRef {
        group: group.unwrap_or("gateway.networking.k8s.io").to_string(),
        kind: kind.unwrap_or("Gateway").to_string(),
        namespace: namespace.map(String::from),
        name: name.to_string(),
        section_name: section_name.map(String::from),
        port: port.map(|p| p as u16),
    }
}

fn require_namespace<T: ResourceExt>(obj: &T, kind: &'static str) -> Result<String, ConvertError> {
    obj.namespace().ok_or(ConvertError::MissingNamespace(kind))
}

fn require_uid<T: ResourceExt>(obj: &T, kind: &'static str) -> Result<String, ConvertError> {
    obj.uid().ok_or(ConvertError::MissingUid(kind))
}

pub fn http_route(route: &HTTPRoute) -> Result<Route, ConvertError> {
    let namespace = require_namespace(route, "HTTPRoute")?;
    let name = route.name_any();
    let uid = require_uid(route, "HTTPRoute")?;
    let creation_timestamp = route
        .creation_timestamp()
        .map(|t| t.0)
        .unwrap_or_else(chrono::Utc::now);

    let parent_refs = route
        .spec
        .parent_refs
        .iter()
        .flatten()
        .map(|p| {
            parent_ref(
                p.group.as_deref(),
                p.kind.as_deref(),
                p.namespace.as_deref(),
                &p.name,
                p.section_name.as_deref(),
                p.port,
            )
        })
        .collect();
    let hostnames = route.spec.hostnames.clone().unwrap_or_default();

    let rules = route
        .spec
        .rules
        .iter()
        .flatten()
        .map(|rule| {
            let matches = rule
                .matches
                .iter()
                .flatten()
                .map(http_match)
                .collect::<Result<Vec<_>, ConvertError>>()?;
            let filters = rule
                .filters
                .iter()
                .flatten()
                .map(http_filter)
                .collect::<Result<Vec<_>, ConvertError>>()?;
            let backend_refs = rule
                .backend_refs
                .iter()
                .flatten()
                .map(|b| backend_ref(&b.name, b.namespace.as_deref(), b.port, b.weight))
                .collect();
            Ok(RouteRule {
                matches,
                filters,
                backend_refs,
            })
        })
        .collect::<Result<Vec<_>, ConvertError>>()?;

    Ok(Route {
        namespace,
        name,
        uid,
        creation_timestamp,
        parent_refs,
        hostnames,
        kind: RouteKind::Http { rules },
    })
}

fn http_match(
    m: &elbv2_controller_k8s_api::gateway::httproutes::HTTPRouteRulesMatches,
) -> Result<HttpRouteMatch, ConvertError> {
    let path = m.path.as_ref().map(|p| HttpPathMatch {
        kind: match p.r#type {
            Some(elbv2_controller_k8s_api::gateway::httproutes::HTTPRouteRulesMatchesPathType::Exact) => {
                HttpPathMatchKind::Exact
            }
            Some(
                elbv2_controller_k8s_api::gateway::httproutes::HTTPRouteRulesMatchesPathType::RegularExpression,
            ) => HttpPathMatchKind::RegularExpression,
            _ => HttpPathMatchKind::PathPrefix,
        },
        value: p.value.clone().unwrap_or_default(),
    });

    let mut headers: Vec<HeaderMatch> = m
        .headers
        .iter()
        .flatten()
        .map(|h| HeaderMatch {
            name: h.name.clone(),
            kind: match h.r#type {
                Some(
                    elbv2_controller_k8s_api::gateway::httproutes::HTTPRouteRulesMatchesHeadersType::RegularExpression,
                ) => HeaderMatchKind::RegularExpression,
                _ => HeaderMatchKind::Exact,
            },
            value: h.value.clone(),
        })
        .collect();
    headers.sort_by(|a, b| a.name.to_ascii_lowercase().cmp(&b.name.to_ascii_lowercase()));

    let query_params = m
        .query_params
        .iter()
        .flatten()
        .map(|q| (q.name.clone(), q.value.clone()))
        .collect();

    let method = m.method.as_ref().map(|m| format!("{m:?}"));

    Ok(HttpRouteMatch {
        path,
        method,
        headers,
        query_params,
    })
}

fn http_filter(
    f: &elbv2_controller_k8s_api::gateway::httproutes::HTTPRouteRulesFilters,
) -> Result<Filter, ConvertError> {
    use elbv2_controller_k8s_api::gateway::httproutes::HTTPRouteRulesFiltersType as Ty;
    match f.r#type {
        Ty::RequestRedirect => {
            let rr = f.request_redirect.as_ref();
            Ok(Filter::RequestRedirect {
                scheme: rr.and_then(|r| r.scheme.clone()),
                hostname: rr.and_then(|r| r.hostname.clone()),
                port: rr.and_then(|r| r.port).map(|p| p as u16),
                status_code: rr.and_then(|r| r.status_code).map(|c| c as u16),
            })
        }
        Ty::RequestHeaderModifier => {
            let hm = f.request_header_modifier.as_ref();
            Ok(Filter::RequestHeaderModifier {
                set: hm
                    .and_then(|h| h.set.as_ref())
                    .into_iter()
                    .flatten()
                    .map(|kv| (kv.name.clone(), kv.value.clone()))
                    .collect(),
                add: hm
                    .and_then(|h| h.add.as_ref())
                    .into_iter()
                    .flatten()
                    .map(|kv| (kv.name.clone(), kv.value.clone()))
                    .collect(),
                remove: hm.and_then(|h| h.remove.clone()).unwrap_or_default(),
            })
        }
        Ty::ExtensionRef => {
            let er = f
                .extension_ref
                .as_ref()
                .ok_or(ConvertError::UnsupportedFilter("HTTPRoute", "extensionRef missing"))?;
            Ok(Filter::ExtensionRef {
                listener_rule_configuration: er.name.clone(),
            })
        }
        _ => Err(ConvertError::UnsupportedFilter("HTTPRoute", "RequestMirror/URLRewrite")),
    }
}

pub fn grpc_route(route: &GRPCRoute) -> Result<Route, ConvertError> {
    let namespace = require_namespace(route, "GRPCRoute")?;
    let name = route.name_any();
    let uid = require_uid(route, "GRPCRoute")?;
    let creation_timestamp = route
        .creation_timestamp()
        .map(|t| t.0)
        .unwrap_or_else(chrono::Utc::now);

    let parent_refs = route
        .spec
        .parent_refs
        .iter()
        .flatten()
        .map(|p| {
            parent_ref(
                p.group.as_deref(),
                p.kind.as_deref(),
                p.namespace.as_deref(),
                &p.name,
                p.section_name.as_deref(),
                p.port,
            )
        })
        .collect();
    let hostnames = route.spec.hostnames.clone().unwrap_or_default();

    let rules = route
        .spec
        .rules
        .iter()
        .flatten()
        .map(|rule| {
            let matches = rule
                .matches
                .iter()
                .flatten()
                .map(|m| GrpcRouteMatch {
                    method: m.method.as_ref().map(|mm| GrpcMethodMatch {
                        service: mm.service.clone(),
                        method: mm.method.clone(),
                    }),
                    headers: {
                        let mut h: Vec<HeaderMatch> = m
                            .headers
                            .iter()
                            .flatten()
                            .map(|h| HeaderMatch {
                                name: h.name.clone(),
                                kind: HeaderMatchKind::Exact,
                                value: h.value.clone(),
                            })
                            .collect();
                        h.sort_by(|a, b| a.name.to_ascii_lowercase().cmp(&b.name.to_ascii_lowercase()));
                        h
                    },
                })
                .collect();
            let backend_refs = rule
                .backend_refs
                .iter()
                .flatten()
                .map(|b| backend_ref(&b.name, b.namespace.as_deref(), b.port, b.weight))
                .collect();
            RouteRule {
                matches,
                filters: vec![],
                backend_refs,
            }
        })
        .collect();

    Ok(Route {
        namespace,
        name,
        uid,
        creation_timestamp,
        parent_refs,
        hostnames,
        kind: RouteKind::Grpc { rules },
    })
}

macro_rules! impl_l4_route {
    ($fn_name:ident, $ty:ty, $kind_label:literal, $kind_variant:ident) => {
        pub fn $fn_name(route: &$ty) -> Result<Route, ConvertError> {
            let namespace = require_namespace(route, $kind_label)?;
            let name = route.name_any();
            let uid = require_uid(route, $kind_label)?;
            let creation_timestamp = route
                .creation_timestamp()
                .map(|t| t.0)
                .unwrap_or_else(chrono::Utc::now);

            let parent_refs = route
                .spec
                .parent_refs
                .iter()
                .flatten()
                .map(|p| {
                    parent_ref(
                        p.group.as_deref(),
                        p.kind.as_deref(),
                        p.namespace.as_deref(),
                        &p.name,
                        p.section_name.as_deref(),
                        p.port,
                    )
                })
                .collect();

            let rules = route
                .spec
                .rules
                .iter()
                .flatten()
                .map(|rule| {
                    let backend_refs = rule
                        .backend_refs
                        .iter()
                        .flatten()
                        .map(|b| backend_ref(&b.name, b.namespace.as_deref(), b.port, b.weight))
                        .collect();
                    RouteRule {
                        matches: vec![()],
                        filters: vec![],
                        backend_refs,
                    }
                })
                .collect();

            Ok(Route {
                namespace,
                name,
                uid,
                creation_timestamp,
                parent_refs,
                hostnames: vec![],
                kind: RouteKind::$kind_variant { rules },
            })
        }
    };
}

impl_l4_route!(tcp_route, TCPRoute, "TCPRoute", Tcp);
impl_l4_route!(udp_route, UDPRoute, "UDPRoute", Udp);
impl_l4_route!(tls_route, TLSRoute, "TLSRoute", Tls);

fn backend_ref(name: &str, namespace: Option<&str>, port: Option<i32>, weight: Option<i32>) -> BackendRef {
    BackendRef {
        namespace: namespace.map(String::from),
        name: name.to_string(),
        port: port.unwrap_or(0) as u16,
        weight: weight.unwrap_or(1).max(0) as u16,
    }
}

pub fn reference_grant(grant: &ApiReferenceGrant) -> Result<crate::snapshot::ReferenceGrant, ConvertError> {
    let namespace = require_namespace(grant, "ReferenceGrant")?;
    let from = grant
        .spec
        .from
        .first()
        .ok_or(ConvertError::UnsupportedFilter("ReferenceGrant", "empty from"))?;
    let to = grant
        .spec
        .to
        .first()
        .ok_or(ConvertError::UnsupportedFilter("ReferenceGrant", "empty to"))?;
    Ok(crate::snapshot::ReferenceGrant {
        namespace,
        from_group: from.group.clone(),
        from_kind: from.kind.clone(),
        from_namespace: from.namespace.clone(),
        to_group: to.group.clone(),
        to_kind: to.kind.clone(),
        to_name: to.name.clone(),
    })
}
