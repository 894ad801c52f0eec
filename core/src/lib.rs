//! Domain types shared across the controller.
//!
//! This crate owns the declarative *Resource Graph* that the Model Builder
//! produces and the Reconciliation Engine consumes. Nothing here performs
//! I/O: every type is a pure value that can be constructed, hashed, and
//! compared deterministically from a snapshot of Kubernetes resources.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod fallback;
mod graph;
mod listener;
mod logical_id;
mod network_match;
mod priority;
mod route;
mod securitygroup;
mod targetgroup;
mod weight;

pub use self::{
    fallback::FallbackChain,
    graph::{Graph, GraphError, Node, NodeId, NodeKind},
    listener::{
        AlpnPolicy, ListenerAttribute, ListenerProtocol, ListenerSpec, LoadBalancerKind,
        LoadBalancerSpec, MutualAuthentication, MutualAuthenticationMode, Scheme,
    },
    logical_id::LogicalId,
    network_match::NetworkMatch,
    priority::{rule_priority, RoutePriorityKey},
    route::{
        AuthenticateConfig, BackendRef, Filter, GrpcMethodMatch, GrpcRouteMatch, HeaderMatch,
        HeaderMatchKind, HttpPathMatch, HttpPathMatchKind, HttpRouteMatch, ParentRef, Route,
        RouteAction, RouteKind, RouteRule, RuleConditions, RuleNode,
    },
    securitygroup::{IngressRule, IngressSource, PortProtocol, SecurityGroupSpec},
    targetgroup::{
        HealthCheck, IpAddressType, TargetGroupBindingSpec, TargetGroupProtocol, TargetGroupSpec,
        TargetType,
    },
    weight::normalize_weights,
};

pub use ipnet::{IpNet, Ipv4Net, Ipv6Net};
