//! Route → listener attachment (spec.md §4.4 step 4, P3):
//!
//! > a route attaches to a listener iff (parentRef match) ∧ (hostname
//! > intersects ∨ unset) ∧ (protocol compatible) ∧ (cross-namespace ⇒
//! > ReferenceGrant exists).

use crate::snapshot::{GatewayListenerSpec, GatewayProtocol, GatewaySnapshot};
use elbv2_controller_core::{ListenerProtocol, ParentRef, Route};

impl GatewayProtocol {
    fn listener_protocol(self) -> ListenerProtocol {
        match self {
            GatewayProtocol::Http => ListenerProtocol::Http,
            GatewayProtocol::Https => ListenerProtocol::Https,
            GatewayProtocol::Tls => ListenerProtocol::Tls,
            GatewayProtocol::Tcp => ListenerProtocol::Tcp,
            GatewayProtocol::Udp => ListenerProtocol::Udp,
        }
    }
}

/// Whether `parent_ref` names `gateway`, given that the reference was
/// declared by a resource living in `route_namespace`.
pub fn parent_ref_matches(parent_ref: &ParentRef, route_namespace: &str, gateway: &GatewaySnapshot) -> bool {
    if !parent_ref.group.is_empty() && parent_ref.group != "gateway.networking.k8s.io" {
        return false;
    }
    if !parent_ref.kind.is_empty() && parent_ref.kind != "Gateway" {
        return false;
    }
    if parent_ref.name != gateway.name {
        return false;
    }
    let parent_ns = parent_ref.namespace.as_deref().unwrap_or(route_namespace);
    parent_ns == gateway.namespace
}

/// Gateway API hostname intersection: exact match, or one side is a
/// `*.`-prefixed wildcard whose suffix matches the other.
pub fn hostnames_intersect(listener_hostname: Option<&str>, route_hostnames: &[String]) -> bool {
    if route_hostnames.is_empty() {
        return true;
    }
    let Some(lh) = listener_hostname else {
        return true;
    };
    route_hostnames.iter().any(|rh| hostname_matches(lh, rh))
}

fn hostname_matches(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    if let Some(suffix) = a.strip_prefix("*.") {
        if b.ends_with(suffix) && b.len() > suffix.len() {
            return true;
        }
    }
    if let Some(suffix) = b.strip_prefix("*.") {
        if a.ends_with(suffix) && a.len() > suffix.len() {
            return true;
        }
    }
    false
}

/// Every listener of `gateway` that `route` is a structural candidate for:
/// parentRef match, hostname intersection, and protocol-family
/// compatibility. Cross-namespace authorization is checked separately by
/// the caller, which has access to the `ReferenceGrant` snapshot.
pub fn candidate_listeners<'g>(
    route: &Route,
    gateway: &'g GatewaySnapshot,
) -> Vec<&'g GatewayListenerSpec> {
    let families = route.protocol_families();
    gateway
        .listeners
        .iter()
        .filter(|listener| {
            route
                .parent_refs
                .iter()
                .any(|p| parent_ref_matches(p, &route.namespace, gateway))
                && hostnames_intersect(listener.hostname.as_deref(), &route.hostnames)
                && families
                    .iter()
                    .any(|f| f.compatible_with(listener.protocol.listener_protocol()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_hostname_matches_subdomain() {
        assert!(hostname_matches("*.example.com", "api.example.com"));
        assert!(hostname_matches("api.example.com", "*.example.com"));
        assert!(!hostname_matches("*.example.com", "example.com"));
    }

    #[test]
    fn unset_hostname_matches_anything() {
        assert!(hostnames_intersect(None, &["foo.com".into()]));
        assert!(hostnames_intersect(Some("foo.com"), &[]));
    }

    #[test]
    fn mismatched_hostname_rejected() {
        assert!(!hostnames_intersect(Some("foo.com"), &["bar.com".into()]));
    }
}
