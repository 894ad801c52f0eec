use crate::graph::NodeId;
use serde::{Deserialize, Serialize};

/// A reference to the Gateway (or other parent) a route attaches to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRef {
    pub group: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
    pub section_name: Option<String>,
    pub port: Option<u16>,
}

/// The polymorphic route model described in spec.md §3 and §9: a single
/// tagged enum carrying the variant-specific rule payload, with the
/// `parentRefs`/`hostnames` header shared across every variant. Builders
/// dispatch on [`RouteKind`] while attachment logic (hostname/parentRef
/// matching) is written once against the shared header.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub namespace: String,
    pub name: String,
    pub uid: String,
    pub creation_timestamp: chrono::DateTime<chrono::Utc>,
    pub parent_refs: Vec<ParentRef>,
    pub hostnames: Vec<String>,
    pub kind: RouteKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RouteKind {
    Http { rules: Vec<RouteRule<HttpRouteMatch>> },
    Grpc { rules: Vec<RouteRule<GrpcRouteMatch>> },
    Tcp { rules: Vec<RouteRule<()>> },
    Udp { rules: Vec<RouteRule<()>> },
    Tls { rules: Vec<RouteRule<()>> },
}

impl Route {
    /// The listener protocol family this route's kind expects to attach to
    /// (spec.md §4.4 step 4).
    pub fn protocol_families(&self) -> &'static [crate::ListenerProtocol] {
        use crate::ListenerProtocol::*;
        match self.kind {
            RouteKind::Http { .. } => &[Http, Https],
            RouteKind::Grpc { .. } => &[Http, Https],
            RouteKind::Tcp { .. } => &[Tcp, TcpQuic],
            RouteKind::Udp { .. } => &[Udp, Quic],
            RouteKind::Tls { .. } => &[Tls],
        }
    }
}

/// One rule of a route: a set of matches (the cross product of which
/// expands into one concrete listener rule per spec.md §4.4 step 5),
/// filters, and weighted backends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteRule<M> {
    pub matches: Vec<M>,
    pub filters: Vec<Filter>,
    pub backend_refs: Vec<BackendRef>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackendRef {
    pub namespace: Option<String>,
    pub name: String,
    pub port: u16,
    pub weight: u16,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    RequestRedirect {
        scheme: Option<String>,
        hostname: Option<String>,
        port: Option<u16>,
        status_code: Option<u16>,
    },
    RequestHeaderModifier {
        set: Vec<(String, String)>,
        add: Vec<(String, String)>,
        remove: Vec<String>,
    },
    ExtensionRef {
        listener_rule_configuration: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpPathMatchKind {
    Exact,
    PathPrefix,
    RegularExpression,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpPathMatch {
    pub kind: HttpPathMatchKind,
    pub value: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderMatchKind {
    Exact,
    RegularExpression,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderMatch {
    pub name: String,
    pub kind: HeaderMatchKind,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRouteMatch {
    pub path: Option<HttpPathMatch>,
    pub method: Option<String>,
    /// Canonicalized (sorted by header name, case-insensitively) before
    /// this struct is constructed — see spec.md §4.3 Canonicalization.
    pub headers: Vec<HeaderMatch>,
    pub query_params: Vec<(String, String)>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrpcMethodMatch {
    pub service: Option<String>,
    pub method: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrpcRouteMatch {
    pub method: Option<GrpcMethodMatch>,
    pub headers: Vec<HeaderMatch>,
}

/// The action a materialized listener rule performs. One `RuleNode` is
/// generated per element of the match cross-product (spec.md §4.4 step 5).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleNode {
    pub listener: NodeId,
    pub priority: u32,
    pub conditions: RuleConditions,
    pub action: RouteAction,
    /// Target groups this rule forwards to, with their normalized weights.
    /// Empty for actions that never forward (redirect, fixed response).
    pub target_groups: Vec<(NodeId, u16)>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConditions {
    pub path: Option<HttpPathMatch>,
    pub method: Option<String>,
    pub headers: Vec<HeaderMatch>,
    pub query_params: Vec<(String, String)>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RouteAction {
    /// A weighted forward to one or more target groups (`target_groups` on
    /// the owning [`RuleNode`] carries the tuples).
    Forward,
    Redirect {
        scheme: Option<String>,
        hostname: Option<String>,
        port: Option<u16>,
        status_code: u16,
    },
    FixedResponse {
        status_code: u16,
        message: String,
    },
    /// An `ExtensionRef → ListenerRuleConfiguration` authentication action
    /// (OIDC or Cognito) injected before the forward action (spec.md §4.4
    /// step 5).
    Authenticate {
        config: AuthenticateConfig,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AuthenticateConfig {
    Oidc {
        issuer: String,
        authorization_endpoint: String,
        token_endpoint: String,
        user_info_endpoint: String,
        client_id: String,
    },
    Cognito {
        user_pool_arn: String,
        user_pool_client_id: String,
        user_pool_domain: String,
    },
}
