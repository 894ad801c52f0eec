//! Applies a [`crate::diff::DiffResult`] against AWS in topological order
//! (spec.md §4.5 step 5): each mutation is retried within the
//! reconciliation deadline, and a mid-apply failure is safe because the
//! next reconciliation re-diffs and converges (spec.md §4.5, §7).

use crate::diff::{DeleteCandidate, DiffResult, Plan};
use crate::error::ReconcileError;
use crate::retry::with_backoff;
use crate::tags;
use aws_sdk_elasticloadbalancingv2::types as elbv2;
use elbv2_controller_aws::CloudClient;
use elbv2_controller_core::{
    AuthenticateConfig, Graph, IpAddressType, ListenerProtocol, LoadBalancerKind, Node, NodeId,
    RouteAction, Scheme, TargetGroupProtocol, TargetType,
};
use std::time::Instant;

pub struct ApplyContext<'a> {
    pub client: &'a CloudClient,
    pub cluster: &'a str,
    pub gateway_namespace: &'a str,
    pub gateway_name: &'a str,
    pub deadline: Instant,
}

/// Applies every create/reuse plan in the order [`crate::diff::diff`]
/// produced it (topological: a node's dependencies were visited, and so
/// resolved in `graph`, before the node itself), then attaches any load
/// balancer's final security groups (which cannot be known until those
/// groups have materialized), then applies deletes in the reverse order
/// the diff already sorted them into.
pub async fn apply(graph: &mut Graph, diff: &DiffResult, ctx: &ApplyContext<'_>) -> Result<(), ReconcileError> {
    for (id, plan) in &diff.creates {
        let node = graph
            .get(id)
            .expect("diff only plans nodes present in the desired graph")
            .clone();
        let arn = apply_node(&node, id, plan, graph, ctx).await?;
        if let Some(arn) = arn {
            graph.resolve(id, arn);
        }
    }

    attach_security_groups(graph, diff, ctx).await?;
    attach_backend_security_group_ingress(graph, ctx).await?;

    for candidate in &diff.deletes {
        delete_one(candidate, ctx).await?;
    }

    Ok(())
}

async fn apply_node(
    node: &Node,
    id: &NodeId,
    plan: &Plan,
    graph: &Graph,
    ctx: &ApplyContext<'_>,
) -> Result<Option<String>, ReconcileError> {
    match node {
        Node::LoadBalancer(spec) => apply_load_balancer(id, spec, plan, ctx).await.map(Some),
        Node::Listener(spec) => apply_listener(id, spec, plan, graph, ctx).await.map(Some),
        Node::Rule(spec) => apply_rule(id, spec, plan, graph, ctx).await.map(Some),
        Node::TargetGroup(spec) => apply_target_group(id, spec, plan, ctx).await.map(Some),
        Node::SecurityGroup(spec) => apply_security_group(id, spec, plan, ctx).await.map(Some),
        // A binding is a Kubernetes-side record the Target Synchronizer
        // reads (spec.md §4.6); it has no AWS-side existence of its own.
        Node::TargetGroupBinding(_) => Ok(None),
    }
}

fn owned_tags(ctx: &ApplyContext<'_>, id: &NodeId, user_tags: &std::collections::BTreeMap<String, String>) -> Vec<elbv2::Tag> {
    tags::to_elbv2_tags(&tags::ownership_tags(
        ctx.cluster,
        ctx.gateway_namespace,
        ctx.gateway_name,
        id.as_str(),
        user_tags,
    ))
}

fn ip_address_type(t: IpAddressType) -> elbv2::IpAddressType {
    match t {
        IpAddressType::Ipv4 => elbv2::IpAddressType::Ipv4,
        IpAddressType::Dualstack => elbv2::IpAddressType::Dualstack,
        IpAddressType::DualstackWithoutPublicIpv4 => elbv2::IpAddressType::DualstackWithoutPublicIpv4,
    }
}

async fn apply_load_balancer(
    id: &NodeId,
    spec: &elbv2_controller_core::LoadBalancerSpec,
    plan: &Plan,
    ctx: &ApplyContext<'_>,
) -> Result<String, ReconcileError> {
    if let Plan::Reuse { arn } = plan {
        let attrs = spec
            .attributes
            .iter()
            .map(|(k, v)| elbv2::LoadBalancerAttribute::builder().key(k).value(v).build())
            .collect();
        with_backoff(ctx.deadline, "ModifyLoadBalancerAttributes", || {
            ctx.client.modify_load_balancer_attributes(arn, attrs.clone())
        })
        .await?;
        return Ok(arn.clone());
    }

    let lb_type = match spec.kind {
        LoadBalancerKind::Application => elbv2::LoadBalancerTypeEnum::Application,
        LoadBalancerKind::Network => elbv2::LoadBalancerTypeEnum::Network,
    };
    let scheme = match spec.scheme {
        Scheme::Internal => elbv2::LoadBalancerSchemeEnum::Internal,
        Scheme::InternetFacing => elbv2::LoadBalancerSchemeEnum::InternetFacing,
    };
    let name = format!("k8s-{}-{}", short_hash(&spec.gateway_namespace), short_hash(&spec.gateway_name));
    let tags = owned_tags(ctx, id, &spec.tags);

    let lb = with_backoff(ctx.deadline, "CreateLoadBalancer", || {
        ctx.client.create_load_balancer(
            ctx.client
                .elbv2
                .create_load_balancer()
                .name(&name)
                .r#type(lb_type.clone())
                .scheme(scheme.clone())
                .ip_address_type(ip_address_type(spec.ip_address_type))
                .set_subnets(Some(spec.subnets.clone()))
                .set_tags(Some(tags.clone())),
        )
    })
    .await?;
    let arn = lb.load_balancer_arn.ok_or(ReconcileError::DeadlineExceeded("CreateLoadBalancer"))?;

    if !spec.attributes.is_empty() {
        let attrs = spec
            .attributes
            .iter()
            .map(|(k, v)| elbv2::LoadBalancerAttribute::builder().key(k).value(v).build())
            .collect();
        with_backoff(ctx.deadline, "ModifyLoadBalancerAttributes", || {
            ctx.client.modify_load_balancer_attributes(&arn, attrs.clone())
        })
        .await?;
    }
    Ok(arn)
}

/// Resolves each load balancer's desired security groups to their now-live
/// group IDs and attaches them with `SetSecurityGroups`. Runs after every
/// create in this pass has resolved, since a managed security group always
/// comes into existence after the load balancer it protects.
async fn attach_security_groups(graph: &Graph, diff: &DiffResult, ctx: &ApplyContext<'_>) -> Result<(), ReconcileError> {
    for (id, _) in &diff.creates {
        let Some(Node::LoadBalancer(spec)) = graph.get(id) else { continue };
        if spec.security_groups.is_empty() {
            continue;
        }
        let Some(lb_arn) = graph.arn(id) else { continue };
        let lb_arn = lb_arn.to_string();
        let group_ids: Vec<String> = spec
            .security_groups
            .iter()
            .filter_map(|sg_id| graph.arn(sg_id).map(str::to_string))
            .collect();
        if group_ids.len() != spec.security_groups.len() {
            tracing::warn!(%lb_arn, "not every security group resolved this pass; retrying next reconciliation");
            continue;
        }
        with_backoff(ctx.deadline, "SetSecurityGroups", || {
            ctx.client.set_security_groups(&lb_arn, group_ids.clone())
        })
        .await?;
    }
    Ok(())
}

/// Authorizes every `TargetGroupBinding`'s backend ingress rule (spec.md
/// §4.4 step 7, `ManageBackendSecurityGroupRules=true`) against the node
/// security groups of `ctx.cluster`'s worker instances. Runs every
/// reconciliation rather than only on create, since a newly joined node's
/// security group needs the same rule a long-reconciled binding already
/// carries.
async fn attach_backend_security_group_ingress(graph: &Graph, ctx: &ApplyContext<'_>) -> Result<(), ReconcileError> {
    let bindings: Vec<&elbv2_controller_core::TargetGroupBindingSpec> = graph
        .ids()
        .filter_map(|id| match graph.get(id) {
            Some(Node::TargetGroupBinding(b)) if !b.ingress_rules.is_empty() => Some(b),
            _ => None,
        })
        .collect();
    if bindings.is_empty() {
        return Ok(());
    }

    let node_security_groups = with_backoff(ctx.deadline, "DescribeInstances", || {
        ctx.client.describe_node_security_groups(ctx.cluster)
    })
    .await?;
    if node_security_groups.is_empty() {
        tracing::warn!(cluster = %ctx.cluster, "no node security groups discovered; backend ingress rules not applied this pass");
        return Ok(());
    }

    let mut permissions = Vec::new();
    for binding in bindings {
        let Some(rule) = resolve_backend_ingress_rule(graph, binding) else {
            continue;
        };
        permissions.extend(ingress_permissions(std::slice::from_ref(&rule)));
    }
    if permissions.is_empty() {
        return Ok(());
    }

    for group_id in &node_security_groups {
        with_backoff(ctx.deadline, "AuthorizeSecurityGroupIngress", || {
            ctx.client.authorize_security_group_ingress(group_id, permissions.clone())
        })
        .await?;
    }
    Ok(())
}

/// Resolves a `TargetGroupBinding`'s `IngressSource::SecurityGroup` logical
/// ID (the load balancer's managed security group, unknown until it
/// materializes) into the actual group ID, by looking up its resolved ARN
/// in `graph`. Returns `None` when that security group hasn't resolved yet
/// this pass; the next reconciliation retries.
fn resolve_backend_ingress_rule(
    graph: &Graph,
    binding: &elbv2_controller_core::TargetGroupBindingSpec,
) -> Option<elbv2_controller_core::IngressRule> {
    use elbv2_controller_core::IngressSource;
    let rule = binding.ingress_rules.first()?;
    let IngressSource::SecurityGroup(logical_id) = &rule.from else {
        return Some(rule.clone());
    };
    let sg_node_id = graph.ids().find(|id| id.as_str() == logical_id.as_str())?;
    let group_id = graph.arn(sg_node_id)?;
    Some(elbv2_controller_core::IngressRule {
        from: IngressSource::SecurityGroup(group_id.to_string()),
        ports: rule.ports.clone(),
    })
}

async fn apply_listener(
    id: &NodeId,
    spec: &elbv2_controller_core::ListenerSpec,
    plan: &Plan,
    graph: &Graph,
    ctx: &ApplyContext<'_>,
) -> Result<String, ReconcileError> {
    let lb_arn = graph
        .arn(&spec.load_balancer)
        .expect("listener's load balancer was visited, and so resolved, first")
        .to_string();
    let protocol = listener_protocol(spec.protocol);
    let default_actions = default_forward_actions(&spec.default_target_groups, graph);
    let certificates: Vec<elbv2::Certificate> = spec
        .certificates
        .iter()
        .map(|arn| elbv2::Certificate::builder().certificate_arn(arn).build())
        .collect();

    let arn = if let Plan::Reuse { arn } = plan {
        with_backoff(ctx.deadline, "ModifyListener", || {
            ctx.client.modify_listener(
                ctx.client
                    .elbv2
                    .modify_listener()
                    .listener_arn(arn)
                    .set_port(Some(spec.port as i32))
                    .protocol(protocol.clone())
                    .set_certificates(Some(certificates.clone()))
                    .set_ssl_policy(spec.ssl_policy.clone())
                    .set_default_actions(Some(default_actions.clone())),
            )
        })
        .await?;
        arn.clone()
    } else {
        let listener = with_backoff(ctx.deadline, "CreateListener", || {
            ctx.client.create_listener(
                ctx.client
                    .elbv2
                    .create_listener()
                    .load_balancer_arn(&lb_arn)
                    .protocol(protocol.clone())
                    .port(spec.port as i32)
                    .set_certificates(Some(certificates.clone()))
                    .set_ssl_policy(spec.ssl_policy.clone())
                    .set_default_actions(Some(default_actions.clone())),
            )
        })
        .await?;
        let arn = listener
            .listener_arn
            .ok_or(ReconcileError::DeadlineExceeded("CreateListener"))?;
        with_backoff(ctx.deadline, "AddTags", || {
            ctx.client.tag_elbv2_resource(&arn, owned_tags(ctx, id, &Default::default()))
        })
        .await?;
        arn
    };

    let attributes: Vec<elbv2::ListenerAttribute> = spec
        .attributes
        .iter()
        .map(|a| elbv2::ListenerAttribute::builder().key(&a.key).value(&a.value).build())
        .collect();
    with_backoff(ctx.deadline, "ModifyListenerAttributes", || {
        ctx.client.modify_listener_attributes(&arn, attributes.clone())
    })
    .await?;

    Ok(arn)
}

fn listener_protocol(p: ListenerProtocol) -> elbv2::ProtocolEnum {
    match p {
        ListenerProtocol::Http => elbv2::ProtocolEnum::Http,
        ListenerProtocol::Https => elbv2::ProtocolEnum::Https,
        ListenerProtocol::Tls => elbv2::ProtocolEnum::Tls,
        ListenerProtocol::Tcp => elbv2::ProtocolEnum::Tcp,
        ListenerProtocol::Udp => elbv2::ProtocolEnum::Udp,
        ListenerProtocol::Quic | ListenerProtocol::TcpQuic => elbv2::ProtocolEnum::TcpUdp,
    }
}

fn default_forward_actions(target_groups: &[NodeId], graph: &Graph) -> Vec<elbv2::Action> {
    if target_groups.is_empty() {
        return Vec::new();
    }
    vec![elbv2::Action::builder()
        .r#type(elbv2::ActionTypeEnum::Forward)
        .forward_config(
            elbv2::ForwardActionConfig::builder()
                .set_target_groups(Some(
                    target_groups
                        .iter()
                        .map(|id| {
                            let arn = graph.arn(id).unwrap_or_else(|| id.as_str());
                            elbv2::TargetGroupTuple::builder().target_group_arn(arn).weight(1).build()
                        })
                        .collect(),
                ))
                .build(),
        )
        .build()]
}

async fn apply_rule(
    id: &NodeId,
    spec: &elbv2_controller_core::RuleNode,
    plan: &Plan,
    graph: &Graph,
    ctx: &ApplyContext<'_>,
) -> Result<String, ReconcileError> {
    let listener_arn = graph
        .arn(&spec.listener)
        .expect("rule's listener was visited, and so resolved, first")
        .to_string();
    let conditions = rule_conditions(spec);
    let actions = rule_actions(spec, graph);

    if let Plan::Reuse { arn } = plan {
        with_backoff(ctx.deadline, "ModifyRule", || {
            ctx.client.modify_rule(
                ctx.client
                    .elbv2
                    .modify_rule()
                    .rule_arn(arn)
                    .set_conditions(Some(conditions.clone()))
                    .set_actions(Some(actions.clone())),
            )
        })
        .await?;
        return Ok(arn.clone());
    }

    let rule = with_backoff(ctx.deadline, "CreateRule", || {
        ctx.client.create_rule(
            ctx.client
                .elbv2
                .create_rule()
                .listener_arn(&listener_arn)
                .priority(spec.priority as i32)
                .set_conditions(Some(conditions.clone()))
                .set_actions(Some(actions.clone())),
        )
    })
    .await?;
    let arn = rule.rule_arn.ok_or(ReconcileError::DeadlineExceeded("CreateRule"))?;
    with_backoff(ctx.deadline, "AddTags", || {
        ctx.client.tag_elbv2_resource(&arn, owned_tags(ctx, id, &Default::default()))
    })
    .await?;
    Ok(arn)
}

fn rule_conditions(spec: &elbv2_controller_core::RuleNode) -> Vec<elbv2::RuleCondition> {
    let mut conditions = Vec::new();
    if let Some(path) = &spec.conditions.path {
        conditions.push(
            elbv2::RuleCondition::builder()
                .field("path-pattern")
                .path_pattern_config(elbv2::PathPatternConditionConfig::builder().values(&path.value).build())
                .build(),
        );
    }
    if let Some(method) = &spec.conditions.method {
        conditions.push(
            elbv2::RuleCondition::builder()
                .field("http-request-method")
                .http_request_method_config(elbv2::HttpRequestMethodConditionConfig::builder().values(method).build())
                .build(),
        );
    }
    for header in &spec.conditions.headers {
        conditions.push(
            elbv2::RuleCondition::builder()
                .field("http-header")
                .http_header_config(
                    elbv2::HttpHeaderConditionConfig::builder()
                        .http_header_name(&header.name)
                        .values(&header.value)
                        .build(),
                )
                .build(),
        );
    }
    if !spec.conditions.query_params.is_empty() {
        conditions.push(
            elbv2::RuleCondition::builder()
                .field("query-string")
                .query_string_config(
                    elbv2::QueryStringConditionConfig::builder()
                        .set_values(Some(
                            spec.conditions
                                .query_params
                                .iter()
                                .map(|(k, v)| elbv2::QueryStringKeyValuePair::builder().key(k).value(v).build())
                                .collect(),
                        ))
                        .build(),
                )
                .build(),
        );
    }
    conditions
}

fn rule_actions(spec: &elbv2_controller_core::RuleNode, graph: &Graph) -> Vec<elbv2::Action> {
    let mut actions = Vec::new();
    if let RouteAction::Authenticate { config } = &spec.action {
        actions.push(authenticate_action(config));
    }
    match &spec.action {
        RouteAction::Redirect { scheme, hostname, port, status_code } => {
            actions.push(
                elbv2::Action::builder()
                    .r#type(elbv2::ActionTypeEnum::Redirect)
                    .redirect_config(
                        elbv2::RedirectActionConfig::builder()
                            .set_protocol(scheme.clone())
                            .set_host(hostname.clone())
                            .set_port(port.map(|p| p.to_string()))
                            .status_code(match status_code {
                                301 => elbv2::RedirectActionStatusCodeEnum::Hundred301,
                                _ => elbv2::RedirectActionStatusCodeEnum::Hundred302,
                            })
                            .build(),
                    )
                    .build(),
            );
        }
        RouteAction::FixedResponse { status_code, message } => {
            actions.push(
                elbv2::Action::builder()
                    .r#type(elbv2::ActionTypeEnum::FixedResponse)
                    .fixed_response_config(
                        elbv2::FixedResponseActionConfig::builder()
                            .status_code(status_code.to_string())
                            .content_type("text/plain")
                            .message_body(message)
                            .build(),
                    )
                    .build(),
            );
        }
        RouteAction::Forward | RouteAction::Authenticate { .. } => {
            if !spec.target_groups.is_empty() {
                let weights = elbv2_controller_core::normalize_weights(
                    &spec.target_groups.iter().map(|(_, w)| *w).collect::<Vec<_>>(),
                );
                let tuples = spec
                    .target_groups
                    .iter()
                    .zip(weights)
                    .map(|((tg_id, _), weight)| {
                        let arn = graph.arn(tg_id).unwrap_or_else(|| tg_id.as_str());
                        elbv2::TargetGroupTuple::builder().target_group_arn(arn).weight(weight as i32).build()
                    })
                    .collect();
                actions.push(
                    elbv2::Action::builder()
                        .r#type(elbv2::ActionTypeEnum::Forward)
                        .forward_config(elbv2::ForwardActionConfig::builder().set_target_groups(Some(tuples)).build())
                        .build(),
                );
            }
        }
    }
    actions
}

fn authenticate_action(config: &AuthenticateConfig) -> elbv2::Action {
    match config {
        AuthenticateConfig::Oidc { issuer, authorization_endpoint, token_endpoint, user_info_endpoint, client_id } => {
            elbv2::Action::builder()
                .r#type(elbv2::ActionTypeEnum::AuthenticateOidc)
                .authenticate_oidc_config(
                    elbv2::AuthenticateOidcActionConfig::builder()
                        .issuer(issuer)
                        .authorization_endpoint(authorization_endpoint)
                        .token_endpoint(token_endpoint)
                        .user_info_endpoint(user_info_endpoint)
                        .client_id(client_id)
                        .build(),
                )
                .build()
        }
        AuthenticateConfig::Cognito { user_pool_arn, user_pool_client_id, user_pool_domain } => elbv2::Action::builder()
            .r#type(elbv2::ActionTypeEnum::AuthenticateCognito)
            .authenticate_cognito_config(
                elbv2::AuthenticateCognitoActionConfig::builder()
                    .user_pool_arn(user_pool_arn)
                    .user_pool_client_id(user_pool_client_id)
                    .user_pool_domain(user_pool_domain)
                    .build(),
            )
            .build(),
    }
}

async fn apply_target_group(
    id: &NodeId,
    spec: &elbv2_controller_core::TargetGroupSpec,
    plan: &Plan,
    ctx: &ApplyContext<'_>,
) -> Result<String, ReconcileError> {
    let protocol = target_group_protocol(spec.protocol);
    let target_type = match spec.target_type {
        TargetType::Ip => elbv2::TargetTypeEnum::Ip,
        TargetType::Instance => elbv2::TargetTypeEnum::Instance,
        TargetType::Alb => elbv2::TargetTypeEnum::Alb,
    };

    if let Plan::Reuse { arn } = plan {
        if !spec.attributes.is_empty() {
            let attrs = spec
                .attributes
                .iter()
                .map(|(k, v)| elbv2::TargetGroupAttribute::builder().key(k).value(v).build())
                .collect();
            with_backoff(ctx.deadline, "ModifyTargetGroupAttributes", || {
                ctx.client.modify_target_group_attributes(arn, attrs.clone())
            })
            .await?;
        }
        return Ok(arn.clone());
    }

    let name = format!(
        "k8s-{}-{}",
        short_hash(&spec.service_namespace),
        short_hash(&format!("{}-{}", spec.service_name, spec.service_port))
    );
    let hc = &spec.health_check;
    let tg = with_backoff(ctx.deadline, "CreateTargetGroup", || {
        ctx.client.create_target_group(
            ctx.client
                .elbv2
                .create_target_group()
                .name(&name)
                .protocol(protocol.clone())
                .port(spec.service_port as i32)
                .target_type(target_type.clone())
                .ip_address_type(match spec.ip_address_type {
                    IpAddressType::Ipv4 => elbv2::TargetGroupIpAddressTypeEnum::Ipv4,
                    IpAddressType::Dualstack | IpAddressType::DualstackWithoutPublicIpv4 => {
                        elbv2::TargetGroupIpAddressTypeEnum::Ipv6
                    }
                })
                .vpc_id(&ctx.client.vpc_id)
                .set_protocol_version(spec.protocol_version.clone())
                .health_check_protocol(target_group_protocol(hc.protocol))
                .set_health_check_port(hc.port.map(|p| p.to_string()))
                .set_health_check_path(hc.path.clone())
                .health_check_interval_seconds(hc.interval_seconds as i32)
                .health_check_timeout_seconds(hc.timeout_seconds as i32)
                .healthy_threshold_count(hc.healthy_threshold as i32)
                .unhealthy_threshold_count(hc.unhealthy_threshold as i32)
                .set_matcher(hc.matcher.clone().map(|m| elbv2::Matcher::builder().http_code(m).build())),
        )
    })
    .await?;
    let arn = tg.target_group_arn.ok_or(ReconcileError::DeadlineExceeded("CreateTargetGroup"))?;
    with_backoff(ctx.deadline, "AddTags", || {
        ctx.client.tag_elbv2_resource(&arn, owned_tags(ctx, id, &Default::default()))
    })
    .await?;
    if !spec.attributes.is_empty() {
        let attrs = spec
            .attributes
            .iter()
            .map(|(k, v)| elbv2::TargetGroupAttribute::builder().key(k).value(v).build())
            .collect();
        with_backoff(ctx.deadline, "ModifyTargetGroupAttributes", || {
            ctx.client.modify_target_group_attributes(&arn, attrs.clone())
        })
        .await?;
    }
    Ok(arn)
}

fn target_group_protocol(p: TargetGroupProtocol) -> elbv2::ProtocolEnum {
    match p {
        TargetGroupProtocol::Http => elbv2::ProtocolEnum::Http,
        TargetGroupProtocol::Https => elbv2::ProtocolEnum::Https,
        TargetGroupProtocol::Tcp => elbv2::ProtocolEnum::Tcp,
        TargetGroupProtocol::Udp => elbv2::ProtocolEnum::Udp,
        TargetGroupProtocol::Tls => elbv2::ProtocolEnum::Tls,
        TargetGroupProtocol::TcpUdp => elbv2::ProtocolEnum::TcpUdp,
        TargetGroupProtocol::Quic => elbv2::ProtocolEnum::TcpUdp,
        TargetGroupProtocol::GenevE => elbv2::ProtocolEnum::Geneve,
    }
}

async fn apply_security_group(
    id: &NodeId,
    spec: &elbv2_controller_core::SecurityGroupSpec,
    plan: &Plan,
    ctx: &ApplyContext<'_>,
) -> Result<String, ReconcileError> {
    if !spec.user_managed_ids.is_empty() {
        // User-managed: never created or mutated by the Engine (spec.md
        // §4.4 step 7). Resolved to the first ID purely so dependents have
        // something to reference; ingress rule programming is skipped.
        return Ok(spec.user_managed_ids[0].clone());
    }

    let permissions = ingress_permissions(&spec.ingress);
    if let Plan::Reuse { arn } = plan {
        with_backoff(ctx.deadline, "AuthorizeSecurityGroupIngress", || {
            ctx.client.authorize_security_group_ingress(arn, permissions.clone())
        })
        .await?;
        return Ok(arn.clone());
    }

    let group_id = with_backoff(ctx.deadline, "CreateSecurityGroup", || {
        ctx.client.create_security_group(
            &format!("k8s-{}-sg", short_hash(spec.load_balancer.as_str())),
            "Managed by the gateway load balancer controller",
            &ctx.client.vpc_id,
            tags::to_ec2_tags(&tags::ownership_tags(ctx.cluster, ctx.gateway_namespace, ctx.gateway_name, id.as_str(), &Default::default())),
        )
    })
    .await?;
    with_backoff(ctx.deadline, "AuthorizeSecurityGroupIngress", || {
        ctx.client.authorize_security_group_ingress(&group_id, permissions.clone())
    })
    .await?;
    Ok(group_id)
}

fn ingress_permissions(rules: &[elbv2_controller_core::IngressRule]) -> Vec<aws_sdk_ec2::types::IpPermission> {
    use elbv2_controller_core::{IngressSource, PortProtocol};
    rules
        .iter()
        .flat_map(|rule| {
            rule.ports.iter().map(move |(protocol, port)| {
                let proto = match protocol {
                    PortProtocol::Tcp => "tcp",
                    PortProtocol::Udp => "udp",
                };
                let mut builder = aws_sdk_ec2::types::IpPermission::builder()
                    .ip_protocol(proto)
                    .from_port(*port as i32)
                    .to_port(*port as i32);
                builder = match &rule.from {
                    IngressSource::IpBlock(net) => builder.ip_ranges(
                        aws_sdk_ec2::types::IpRange::builder().cidr_ip(net.net.to_string()).build(),
                    ),
                    IngressSource::SecurityGroup(group_id) => builder.user_id_group_pairs(
                        aws_sdk_ec2::types::UserIdGroupPair::builder().group_id(group_id).build(),
                    ),
                    IngressSource::PrefixList(prefix_list_id) => builder.prefix_list_ids(
                        aws_sdk_ec2::types::PrefixListId::builder().prefix_list_id(prefix_list_id).build(),
                    ),
                };
                builder.build()
            })
        })
        .collect()
}

async fn delete_one(candidate: &DeleteCandidate, ctx: &ApplyContext<'_>) -> Result<(), ReconcileError> {
    let op = "Delete";
    if candidate.arn.contains(":listener-rule/") {
        with_backoff(ctx.deadline, op, || ctx.client.delete_rule(&candidate.arn)).await?;
    } else if candidate.arn.contains(":listener/") {
        with_backoff(ctx.deadline, op, || ctx.client.delete_listener(&candidate.arn)).await?;
    } else if candidate.arn.contains(":targetgroup/") {
        with_backoff(ctx.deadline, op, || ctx.client.delete_target_group(&candidate.arn)).await?;
    } else if candidate.arn.contains(":loadbalancer/") {
        with_backoff(ctx.deadline, op, || ctx.client.delete_load_balancer(&candidate.arn)).await?;
    } else if candidate.resource_type == "security-group" {
        with_backoff(ctx.deadline, op, || ctx.client.delete_security_group(&candidate.arn)).await?;
    } else {
        tracing::warn!(arn = %candidate.arn, "unrecognized resource type during garbage collection; leaving in place");
    }
    Ok(())
}

/// A short, stable, DNS-label-safe fragment of an arbitrary identifier, used
/// to build AWS resource names (32-char limit for target groups and load
/// balancers) that stay under the limit regardless of how long the
/// Kubernetes namespace/name is.
fn short_hash(input: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    input.hash(&mut hasher);
    format!("{:x}", hasher.finish())[..12].to_string()
}
