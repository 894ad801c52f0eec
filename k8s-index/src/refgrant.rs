//! `ReferenceGrant` authorization (spec.md §3, §4.4 step 4, P3): a
//! cross-namespace reference is permitted only if some grant in the
//! target namespace names the referencing resource's group/kind/namespace
//! and (optionally) the specific target name.

use crate::snapshot::ReferenceGrant;

pub fn is_authorized(
    grants: &[ReferenceGrant],
    to_namespace: &str,
    from_group: &str,
    from_kind: &str,
    from_namespace: &str,
    to_group: &str,
    to_kind: &str,
    to_name: &str,
) -> bool {
    grants.iter().any(|g| {
        g.namespace == to_namespace
            && g.from_group == from_group
            && g.from_kind == from_kind
            && g.from_namespace == from_namespace
            && g.to_group == to_group
            && g.to_kind == to_kind
            && g.to_name.as_deref().map_or(true, |name| name == to_name)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(namespace: &str, from_ns: &str, to_name: Option<&str>) -> ReferenceGrant {
        ReferenceGrant {
            namespace: namespace.into(),
            from_group: "gateway.networking.k8s.io".into(),
            from_kind: "HTTPRoute".into(),
            from_namespace: from_ns.into(),
            to_group: "".into(),
            to_kind: "Service".into(),
            to_name: to_name.map(String::from),
        }
    }

    #[test]
    fn unnamed_grant_authorizes_any_name() {
        let grants = vec![grant("ns-b", "ns-a", None)];
        assert!(is_authorized(
            &grants,
            "ns-b",
            "gateway.networking.k8s.io",
            "HTTPRoute",
            "ns-a",
            "",
            "Service",
            "anything",
        ));
    }

    #[test]
    fn named_grant_restricts_to_that_name() {
        let grants = vec![grant("ns-b", "ns-a", Some("allowed"))];
        assert!(is_authorized(
            &grants,
            "ns-b",
            "gateway.networking.k8s.io",
            "HTTPRoute",
            "ns-a",
            "",
            "Service",
            "allowed",
        ));
        assert!(!is_authorized(
            &grants,
            "ns-b",
            "gateway.networking.k8s.io",
            "HTTPRoute",
            "ns-a",
            "",
            "Service",
            "other",
        ));
    }

    #[test]
    fn no_grant_denies() {
        assert!(!is_authorized(
            &[],
            "ns-b",
            "gateway.networking.k8s.io",
            "HTTPRoute",
            "ns-a",
            "",
            "Service",
            "x",
        ));
    }
}
