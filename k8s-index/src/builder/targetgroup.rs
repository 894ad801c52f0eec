//! Target group generation (spec.md §4.4 step 6) and the NLB→ALB chain
//! (step 8). One `TargetGroup` node is materialized per distinct
//! `(service, servicePort, protocol, targetType)` tuple referenced by any
//! accepted rule; re-requesting the same tuple from a later rule returns
//! the same logical ID, so `Graph::add`'s collision check is the dedup
//! mechanism rather than an explicit cache here.

use elbv2_controller_core::{
    FallbackChain, Graph, HealthCheck, IpAddressType, LogicalId, Node, TargetGroupProtocol,
    TargetGroupSpec, TargetType,
};
use elbv2_controller_k8s_api::crd::{TargetGroupConfigurationSpec, TargetType as CrdTargetType};
use std::collections::BTreeMap;

pub struct TargetGroupRequest<'a> {
    pub service_namespace: &'a str,
    pub service_name: &'a str,
    pub service_port: u16,
    /// The listener protocol this target group ultimately serves, before
    /// any target-group-specific protocol override from the TGC.
    pub listener_protocol: TargetGroupProtocol,
    pub service_tgc: Option<&'a TargetGroupConfigurationSpec>,
    pub gateway_tgc: Option<&'a TargetGroupConfigurationSpec>,
    pub lb_ip_address_type: IpAddressType,
}

fn convert_target_type(t: CrdTargetType) -> TargetType {
    match t {
        CrdTargetType::Ip => TargetType::Ip,
        CrdTargetType::Instance => TargetType::Instance,
        CrdTargetType::Alb => TargetType::Alb,
    }
}

/// Resolves `request` against the graph, inserting a new `TargetGroup` node
/// if one with this exact fingerprint doesn't already exist, and returns
/// its logical ID. Implements the target-type/health-check/attribute
/// fallback chain of spec.md §4.4 step 6 via `core::FallbackChain`.
pub fn resolve(graph: &mut Graph, request: TargetGroupRequest<'_>) -> Result<LogicalId, elbv2_controller_core::GraphError> {
    let port_override = |tgc: Option<&TargetGroupConfigurationSpec>, port: u16| {
        tgc.and_then(|t| {
            t.port_configurations
                .as_ref()
                .and_then(|ports| ports.iter().find(|p| p.port as u32 == port as u32))
                .map(|p| &p.props)
                .or(t.default_configuration.as_ref())
        })
    };
    let service_props = port_override(request.service_tgc, request.service_port);
    let gateway_props = port_override(request.gateway_tgc, request.service_port);

    let target_type = FallbackChain::new()
        .or_else(|| service_props.and_then(|p| p.target_type).map(convert_target_type))
        .or_else(|| gateway_props.and_then(|p| p.target_type).map(convert_target_type))
        .resolve(TargetType::Instance);

    let ip_address_type = FallbackChain::new()
        .or_else(|| service_props.and_then(|p| p.ip_address_type.as_deref()).and_then(parse_ip_address_type))
        .or_else(|| gateway_props.and_then(|p| p.ip_address_type.as_deref()).and_then(parse_ip_address_type))
        .resolve(request.lb_ip_address_type);

    let protocol_version = FallbackChain::new()
        .or_else(|| service_props.and_then(|p| p.protocol_version.clone()))
        .or_else(|| gateway_props.and_then(|p| p.protocol_version.clone()))
        .into_option();

    let health_check = FallbackChain::new()
        .or_else(|| {
            service_props
                .and_then(|p| p.health_check.as_ref())
                .map(|hc| build_health_check(hc, request.listener_protocol))
        })
        .or_else(|| {
            gateway_props
                .and_then(|p| p.health_check.as_ref())
                .map(|hc| build_health_check(hc, request.listener_protocol))
        })
        .resolve(HealthCheck {
            protocol: request.listener_protocol,
            ..HealthCheck::default()
        });

    let attributes: BTreeMap<String, String> = FallbackChain::new()
        .or_else(|| {
            service_props
                .and_then(|p| p.target_group_attributes.clone())
        })
        .or_else(|| gateway_props.and_then(|p| p.target_group_attributes.clone()))
        .resolve(BTreeMap::new());

    let protocol = FallbackChain::new()
        .or_else(|| service_props.and_then(|p| p.protocol.as_deref()).and_then(parse_protocol))
        .or_else(|| gateway_props.and_then(|p| p.protocol.as_deref()).and_then(parse_protocol))
        .resolve(request.listener_protocol);

    let spec = TargetGroupSpec {
        service_namespace: request.service_namespace.to_string(),
        service_name: request.service_name.to_string(),
        service_port: request.service_port,
        target_type,
        protocol,
        protocol_version,
        ip_address_type,
        health_check,
        attributes,
        alb_target: None,
    };

    let id = LogicalId::of(
        "TargetGroup",
        &(
            &spec.service_namespace,
            &spec.service_name,
            spec.service_port,
            format!("{target_type:?}"),
            format!("{protocol:?}"),
            format!("{ip_address_type:?}"),
            spec.protocol_version.clone().unwrap_or_default(),
        ),
    );
    graph.add(id.clone(), Node::TargetGroup(spec))?;
    Ok(id)
}

/// An NLB target group whose target type is `alb`, forwarding to another
/// Gateway's ALB (spec.md §4.4 step 8, §9's weak reference note).
pub fn resolve_alb_chain(
    graph: &mut Graph,
    service_namespace: &str,
    service_name: &str,
    alb_logical_id: LogicalId,
) -> Result<LogicalId, elbv2_controller_core::GraphError> {
    let spec = TargetGroupSpec {
        service_namespace: service_namespace.to_string(),
        service_name: service_name.to_string(),
        service_port: 0,
        target_type: TargetType::Alb,
        protocol: TargetGroupProtocol::Tcp,
        protocol_version: None,
        ip_address_type: IpAddressType::Ipv4,
        health_check: HealthCheck::default(),
        attributes: BTreeMap::new(),
        alb_target: Some(alb_logical_id.clone()),
    };
    let id = LogicalId::of("TargetGroup", &("alb-chain", service_namespace, service_name, alb_logical_id.as_str()));
    graph.add(id.clone(), Node::TargetGroup(spec))?;
    Ok(id)
}

fn parse_ip_address_type(s: &str) -> Option<IpAddressType> {
    match s.to_ascii_lowercase().as_str() {
        "ipv4" => Some(IpAddressType::Ipv4),
        "dualstack" => Some(IpAddressType::Dualstack),
        "dualstack-without-public-ipv4" => Some(IpAddressType::DualstackWithoutPublicIpv4),
        _ => None,
    }
}

fn parse_protocol(s: &str) -> Option<TargetGroupProtocol> {
    match s.to_ascii_uppercase().as_str() {
        "HTTP" => Some(TargetGroupProtocol::Http),
        "HTTPS" => Some(TargetGroupProtocol::Https),
        "TCP" => Some(TargetGroupProtocol::Tcp),
        "UDP" => Some(TargetGroupProtocol::Udp),
        "TLS" => Some(TargetGroupProtocol::Tls),
        "TCP_UDP" => Some(TargetGroupProtocol::TcpUdp),
        "GENEVE" => Some(TargetGroupProtocol::GenevE),
        _ => None,
    }
}

fn build_health_check(
    hc: &elbv2_controller_k8s_api::crd::HealthCheckConfiguration,
    default_protocol: TargetGroupProtocol,
) -> HealthCheck {
    HealthCheck {
        protocol: hc
            .health_check_protocol
            .as_deref()
            .and_then(parse_protocol)
            .unwrap_or(default_protocol),
        port: hc.health_check_port.as_deref().and_then(|p| p.parse().ok()),
        path: hc.health_check_path.clone(),
        interval_seconds: hc.health_check_interval_seconds.unwrap_or(15) as u32,
        timeout_seconds: hc.health_check_timeout_seconds.unwrap_or(5) as u32,
        healthy_threshold: hc.healthy_threshold_count.unwrap_or(3) as u32,
        unhealthy_threshold: hc.unhealthy_threshold_count.unwrap_or(3) as u32,
        matcher: hc.matcher.clone(),
    }
}
