//! Effective `LoadBalancerConfiguration` resolution (spec.md §4.4 step 2):
//! merge the LBC attached to the `GatewayClass` with the LBC attached to the
//! `Gateway`, the Gateway overriding per-field.

use elbv2_controller_k8s_api::crd::LoadBalancerConfigurationSpec as Lbc;

pub fn merge(class: Option<&Lbc>, gateway: Option<&Lbc>) -> Lbc {
    let class = class.cloned().unwrap_or_default();
    let gateway = gateway.cloned().unwrap_or_default();
    Lbc {
        scheme: gateway.scheme.or(class.scheme),
        ip_address_type: gateway.ip_address_type.or(class.ip_address_type),
        load_balancer_subnets: gateway.load_balancer_subnets.or(class.load_balancer_subnets),
        load_balancer_subnets_selector: gateway
            .load_balancer_subnets_selector
            .or(class.load_balancer_subnets_selector),
        listener_configurations: gateway
            .listener_configurations
            .or(class.listener_configurations),
        security_groups: gateway.security_groups.or(class.security_groups),
        security_group_prefixes: gateway
            .security_group_prefixes
            .or(class.security_group_prefixes),
        source_ranges: gateway.source_ranges.or(class.source_ranges),
        load_balancer_attributes: gateway
            .load_balancer_attributes
            .or(class.load_balancer_attributes),
        tags: gateway.tags.or(class.tags),
        enable_icmp: gateway.enable_icmp.or(class.enable_icmp),
        manage_backend_security_group_rules: gateway
            .manage_backend_security_group_rules
            .or(class.manage_backend_security_group_rules),
    }
}

/// Parses a `protocolPort` pattern (spec.md §6:
/// `^(HTTP|HTTPS|TLS|TCP|UDP)?:(1-65535)?$`) into its optional protocol and
/// port components, then tests whether it matches a materialized listener.
/// An absent component matches anything.
pub fn protocol_port_matches(pattern: &str, protocol: &str, port: u16) -> bool {
    let Some((proto_part, port_part)) = pattern.split_once(':') else {
        return false;
    };
    let protocol_ok = proto_part.is_empty() || proto_part.eq_ignore_ascii_case(protocol);
    let port_ok = port_part.is_empty() || port_part.parse::<u16>().map(|p| p == port).unwrap_or(false);
    protocol_ok && port_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_field_overrides_class_field() {
        let class = Lbc {
            enable_icmp: Some(false),
            ..Default::default()
        };
        let gateway = Lbc {
            enable_icmp: Some(true),
            ..Default::default()
        };
        let merged = merge(Some(&class), Some(&gateway));
        assert_eq!(merged.enable_icmp, Some(true));
    }

    #[test]
    fn class_field_used_when_gateway_absent() {
        let class = Lbc {
            enable_icmp: Some(false),
            ..Default::default()
        };
        let merged = merge(Some(&class), None);
        assert_eq!(merged.enable_icmp, Some(false));
    }

    #[test]
    fn exact_match() {
        assert!(protocol_port_matches("HTTPS:443", "HTTPS", 443));
        assert!(!protocol_port_matches("HTTPS:443", "HTTP", 443));
    }

    #[test]
    fn wildcard_protocol_or_port_matches_anything() {
        assert!(protocol_port_matches(":443", "HTTP", 443));
        assert!(protocol_port_matches("HTTP:", "HTTP", 8080));
    }
}
