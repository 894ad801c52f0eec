//! Field validators for the CRDs this controller admits (spec.md §6, §7
//! "Validation"): a malformed spec is rejected here, locally, before it
//! ever reaches the Model Builder, which assumes everything it reads has
//! already passed these checks. Every error here becomes a denied
//! `AdmissionResponse`, never an AWS call.

use elbv2_controller_k8s_api::{
    EndpointConfiguration, GaListener, GlobalAcceleratorSpec, ListenerConfiguration,
    LoadBalancerConfigurationSpec, TargetGroupBindingSpec,
};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

fn protocol_port_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(HTTP|HTTPS|TLS|TCP|UDP)?:([0-9]{1,5})?$").unwrap())
}

fn accelerator_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_-]{1,64}$").unwrap())
}

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ValidationError {
    #[error(
        "protocolPort {0:?} does not match ^(HTTP|HTTPS|TLS|TCP|UDP)?:(1-65535)?$"
    )]
    BadProtocolPort(String),

    #[error("protocolPort {0:?} port is out of range 1-65535")]
    ProtocolPortOutOfRange(String),

    #[error("loadBalancerSubnets and loadBalancerSubnetsSelector are mutually exclusive")]
    SubnetsAndSelectorBothSet,

    #[error("accelerator name {0:?} does not match ^[a-zA-Z0-9_-]{{1,64}}$")]
    BadAcceleratorName(String),

    #[error("ipAddresses must contain 1 or 2 entries, got {0}")]
    BadIpAddressCount(usize),

    #[error("listeners must contain at least one entry")]
    NoListeners,

    #[error("portRanges must contain 1 to 10 entries, got {0}")]
    BadPortRangeCount(usize),

    #[error("portRange fromPort {from} is greater than toPort {to}")]
    PortRangeInverted { from: u16, to: u16 },

    #[error("endpointGroups must contain at least one entry")]
    NoEndpointGroups,

    #[error("endpointGroups[].trafficDialPercentage {0} is out of range 0-100")]
    TrafficDialOutOfRange(f32),

    #[error("endpoints must contain at least one entry")]
    NoEndpoints,

    #[error("endpoint weight {0} is out of range 0-255")]
    WeightOutOfRange(u16),

    #[error("endpoint must set exactly one of endpointId or name, got {endpoint_id_set} and {name_set}")]
    EndpointIdNameExclusive { endpoint_id_set: bool, name_set: bool },

    #[error("targetGroupArn must not be empty")]
    EmptyTargetGroupArn,

    #[error("serviceRef.name must not be empty")]
    EmptyServiceRefName,
}

/// Validates a `protocolPort` string against the `^(HTTP|HTTPS|TLS|TCP|UDP)?:(1-65535)?$`
/// pattern and, when a port is present, that it falls in the 1-65535 range
/// the regex's digit class alone can't express.
pub fn validate_protocol_port(protocol_port: &str) -> Result<(), ValidationError> {
    if !protocol_port_regex().is_match(protocol_port) {
        return Err(ValidationError::BadProtocolPort(protocol_port.to_string()));
    }
    if let Some(port) = protocol_port.rsplit(':').next().filter(|s| !s.is_empty()) {
        let port: u32 = port.parse().map_err(|_| ValidationError::BadProtocolPort(protocol_port.to_string()))?;
        if port == 0 || port > 65535 {
            return Err(ValidationError::ProtocolPortOutOfRange(protocol_port.to_string()));
        }
    }
    Ok(())
}

fn validate_listener_configuration(listener: &ListenerConfiguration) -> Result<(), ValidationError> {
    validate_protocol_port(&listener.protocol_port)
}

pub fn validate_load_balancer_configuration(spec: &LoadBalancerConfigurationSpec) -> Result<(), ValidationError> {
    if spec.load_balancer_subnets.is_some() && spec.load_balancer_subnets_selector.is_some() {
        return Err(ValidationError::SubnetsAndSelectorBothSet);
    }
    for listener in spec.listener_configurations.iter().flatten() {
        validate_listener_configuration(listener)?;
    }
    Ok(())
}

pub fn validate_global_accelerator(spec: &GlobalAcceleratorSpec) -> Result<(), ValidationError> {
    if !accelerator_name_regex().is_match(&spec.name) {
        return Err(ValidationError::BadAcceleratorName(spec.name.clone()));
    }
    if spec.ip_addresses.is_empty() || spec.ip_addresses.len() > 2 {
        return Err(ValidationError::BadIpAddressCount(spec.ip_addresses.len()));
    }
    if spec.listeners.is_empty() {
        return Err(ValidationError::NoListeners);
    }
    for listener in &spec.listeners {
        validate_ga_listener(listener)?;
    }
    Ok(())
}

fn validate_ga_listener(listener: &GaListener) -> Result<(), ValidationError> {
    if listener.port_ranges.is_empty() || listener.port_ranges.len() > 10 {
        return Err(ValidationError::BadPortRangeCount(listener.port_ranges.len()));
    }
    for range in &listener.port_ranges {
        if range.from_port > range.to_port {
            return Err(ValidationError::PortRangeInverted { from: range.from_port, to: range.to_port });
        }
    }
    if listener.endpoint_groups.is_empty() {
        return Err(ValidationError::NoEndpointGroups);
    }
    for group in &listener.endpoint_groups {
        if !(0.0..=100.0).contains(&group.traffic_dial_percentage) {
            return Err(ValidationError::TrafficDialOutOfRange(group.traffic_dial_percentage));
        }
        if group.endpoints.is_empty() {
            return Err(ValidationError::NoEndpoints);
        }
        for endpoint in &group.endpoints {
            validate_ga_endpoint(endpoint)?;
        }
    }
    Ok(())
}

fn validate_ga_endpoint(endpoint: &EndpointConfiguration) -> Result<(), ValidationError> {
    let endpoint_id_set = endpoint.endpoint_id.is_some();
    let name_set = endpoint.name.is_some();
    if endpoint_id_set == name_set {
        return Err(ValidationError::EndpointIdNameExclusive { endpoint_id_set, name_set });
    }
    if endpoint.weight > 255 {
        return Err(ValidationError::WeightOutOfRange(endpoint.weight));
    }
    Ok(())
}

pub fn validate_target_group_binding(spec: &TargetGroupBindingSpec) -> Result<(), ValidationError> {
    if spec.target_group_arn.trim().is_empty() {
        return Err(ValidationError::EmptyTargetGroupArn);
    }
    if spec.service_ref.name.trim().is_empty() {
        return Err(ValidationError::EmptyServiceRefName);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_port_accepts_bare_colon() {
        assert!(validate_protocol_port(":").is_ok());
    }

    #[test]
    fn protocol_port_accepts_protocol_and_port() {
        assert!(validate_protocol_port("HTTPS:443").is_ok());
    }

    #[test]
    fn protocol_port_rejects_missing_colon() {
        assert!(matches!(validate_protocol_port("HTTPS443"), Err(ValidationError::BadProtocolPort(_))));
    }

    #[test]
    fn protocol_port_rejects_unknown_protocol() {
        assert!(matches!(validate_protocol_port("FTP:21"), Err(ValidationError::BadProtocolPort(_))));
    }

    #[test]
    fn protocol_port_rejects_out_of_range() {
        assert!(matches!(validate_protocol_port("TCP:70000"), Err(ValidationError::ProtocolPortOutOfRange(_))));
    }

    #[test]
    fn protocol_port_rejects_zero() {
        assert!(matches!(validate_protocol_port("TCP:0"), Err(ValidationError::ProtocolPortOutOfRange(_))));
    }

    #[test]
    fn accelerator_name_regex_matches_spec() {
        assert!(accelerator_name_regex().is_match("my-accelerator_1"));
        assert!(!accelerator_name_regex().is_match("has a space"));
    }
}
