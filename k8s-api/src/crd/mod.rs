//! Typed CRDs this controller reconciles in addition to the Gateway API
//! resources re-exported at the crate root (spec.md §6).

mod global_accelerator;
mod listener_rule_configuration;
mod load_balancer_configuration;
mod target_group_binding;
mod target_group_configuration;

pub use self::{
    global_accelerator::{
        ClientAffinity, EndpointConfiguration, EndpointGroup, EndpointType, GaListener, GaProtocol,
        GlobalAccelerator, GlobalAcceleratorSpec, GlobalAcceleratorStatus, IpAddressType as GaIpAddressType,
        PortOverride, PortRange,
    },
    listener_rule_configuration::{
        Action, AuthenticateCognitoConfig, AuthenticateOidcConfig, FixedResponseConfig,
        ListenerRuleConfiguration, ListenerRuleConfigurationSpec, RedirectConfig,
    },
    load_balancer_configuration::{
        IpAddressType, ListenerAttribute, ListenerConfiguration, LoadBalancerAttribute,
        LoadBalancerConfiguration, LoadBalancerConfigurationSpec, LoadBalancerConfigurationStatus,
        MutualAuthentication, Scheme, SubnetConfiguration,
    },
    target_group_binding::{
        IngressRule, IngressRuleFrom, IngressRulePort, NetworkingIngress, TargetGroupBinding,
        TargetGroupBindingNetworking, TargetGroupBindingSpec, TargetGroupBindingStatus,
    },
    target_group_configuration::{
        HealthCheckConfiguration, PolicyTargetReference, PortConfiguration, TargetGroupConfiguration,
        TargetGroupConfigurationSpec, TargetGroupProps, TargetType,
    },
};
