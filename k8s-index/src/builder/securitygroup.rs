//! Security group synthesis (spec.md §4.4 step 7): one managed security
//! group per load balancer, unless the user supplied IDs directly.

use elbv2_controller_core::{
    IngressRule, IngressSource, Ipv4Net, ListenerProtocol, LogicalId, Node, NetworkMatch, NodeId,
    PortProtocol, SecurityGroupSpec, TargetGroupBindingSpec, TargetType,
};
use elbv2_controller_k8s_api::crd::LoadBalancerConfigurationSpec as Lbc;
use std::collections::BTreeMap;
use std::str::FromStr;

fn port_protocol(protocol: ListenerProtocol) -> PortProtocol {
    match protocol {
        ListenerProtocol::Udp | ListenerProtocol::Quic => PortProtocol::Udp,
        _ => PortProtocol::Tcp,
    }
}

/// Builds the security group node for `lb_id`. When the user configured
/// `security_groups` directly, the node carries those IDs verbatim and no
/// ingress rules (the reconciler attaches them to the LB as-is and never
/// owns their rule sets). Otherwise ingress rules are derived from the
/// listener ports and `source_ranges`/`security_group_prefixes`.
pub fn build(
    lb_id: NodeId,
    lbc: &Lbc,
    listener_ports: &[(u16, elbv2_controller_core::ListenerProtocol)],
) -> (LogicalId, SecurityGroupSpec) {
    let id = LogicalId::of("SecurityGroup", &(lb_id.as_str(), "managed"));

    if let Some(ids) = lbc.security_groups.clone().filter(|v| !v.is_empty()) {
        return (
            id,
            SecurityGroupSpec {
                load_balancer: lb_id,
                ingress: vec![],
                user_managed_ids: ids,
            },
        );
    }

    let ports: Vec<(PortProtocol, u16)> = listener_ports
        .iter()
        .map(|(port, proto)| (port_protocol(*proto), *port))
        .collect();

    let mut sources: Vec<IngressSource> = Vec::new();
    if let Some(ranges) = &lbc.source_ranges {
        for cidr in ranges {
            if let Ok(net) = Ipv4Net::from_str(cidr) {
                sources.push(IngressSource::IpBlock(NetworkMatch::from(net)));
            }
        }
    } else {
        // Default-open, matching the teacher's convention of defaulting an
        // internet-facing LB's ingress to 0.0.0.0/0 when unset.
        sources.push(IngressSource::IpBlock(NetworkMatch::from(
            Ipv4Net::from_str("0.0.0.0/0").expect("static cidr parses"),
        )));
    }
    if let Some(prefixes) = &lbc.security_group_prefixes {
        for pl in prefixes {
            sources.push(IngressSource::PrefixList(pl.clone()));
        }
    }

    let ingress = sources
        .into_iter()
        .map(|from| IngressRule {
            from,
            ports: ports.clone(),
        })
        .collect();

    (
        id,
        SecurityGroupSpec {
            load_balancer: lb_id,
            ingress,
            user_managed_ids: vec![],
        },
    )
}

pub fn add_to_graph(
    graph: &mut elbv2_controller_core::Graph,
    id: LogicalId,
    spec: SecurityGroupSpec,
) -> Result<LogicalId, elbv2_controller_core::GraphError> {
    graph.add(id.clone(), Node::SecurityGroup(spec))?;
    Ok(id)
}

/// Computes one `TargetGroupBinding` node per target group reachable from
/// `lb_id`'s listeners, carrying the ingress rule the backend security
/// group controller needs to admit traffic from the load balancer's
/// managed security group onto the matching node or pod security groups
/// (spec.md §4.4 step 7, `ManageBackendSecurityGroupRules=true`). Called
/// only for gateways that opted in; `TargetType::Alb` target groups are
/// skipped since they forward to another Gateway's ALB, not to a node or
/// pod. `sg_id` is the logical ID of `lb_id`'s own managed security group —
/// the Reconciliation Engine resolves it to an actual group ID once that
/// group has materialized (it cannot be known at Model Builder time).
pub fn backend_bindings(
    graph: &mut elbv2_controller_core::Graph,
    lb_id: &NodeId,
    sg_id: &LogicalId,
) -> Result<(), elbv2_controller_core::GraphError> {
    let listeners: Vec<(NodeId, PortProtocol, u16, Vec<NodeId>)> = graph
        .ids()
        .filter_map(|id| match graph.get(id) {
            Some(Node::Listener(l)) if &l.load_balancer == lb_id => Some((
                id.clone(),
                port_protocol(l.protocol),
                l.port,
                l.default_target_groups.clone(),
            )),
            _ => None,
        })
        .collect();

    let mut ports_by_target_group: BTreeMap<NodeId, Vec<(PortProtocol, u16)>> = BTreeMap::new();
    for (listener_id, pp, port, defaults) in &listeners {
        for tg in defaults {
            ports_by_target_group.entry(tg.clone()).or_default().push((*pp, *port));
        }
        for id in graph.ids() {
            let Some(Node::Rule(r)) = graph.get(id) else { continue };
            if &r.listener != listener_id {
                continue;
            }
            for (tg, _weight) in &r.target_groups {
                ports_by_target_group.entry(tg.clone()).or_default().push((*pp, *port));
            }
        }
    }

    for (tg_id, mut ports) in ports_by_target_group {
        let (target_type, service_namespace, service_name, service_port) = match graph.get(&tg_id) {
            Some(Node::TargetGroup(spec)) => (
                spec.target_type,
                spec.service_namespace.clone(),
                spec.service_name.clone(),
                spec.service_port,
            ),
            _ => continue,
        };
        if target_type == TargetType::Alb {
            continue;
        }
        ports.sort_by_key(|(pp, port)| (format!("{pp:?}"), *port));
        ports.dedup();

        let binding = TargetGroupBindingSpec {
            target_group: tg_id.clone(),
            service_namespace,
            service_name,
            service_port,
            ingress_rules: vec![IngressRule {
                from: IngressSource::SecurityGroup(sg_id.as_str().to_string()),
                ports,
            }],
        };
        let binding_id = LogicalId::of("TargetGroupBinding", &(lb_id.as_str(), tg_id.as_str()));
        graph.add(binding_id, Node::TargetGroupBinding(binding))?;
    }
    Ok(())
}
