use crate::{
    listener::ListenerSpec, securitygroup::SecurityGroupSpec, targetgroup::TargetGroupSpec,
    LogicalId,
};
use ahash::AHashMap as HashMap;
use std::collections::BTreeSet;

/// A stable, content-derived key for a node. Wraps [`LogicalId`] so that the
/// graph's public API never leaks the hashing scheme.
pub type NodeId = LogicalId;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("node {id} already exists with a different definition")]
    Collision { id: NodeId },

    #[error("node {id} references unknown node {referenced}")]
    DanglingReference { id: NodeId, referenced: NodeId },

    #[error("graph contains a cycle reachable from {id}")]
    Cycle { id: NodeId },
}

/// The kind of cloud object a [`Node`] describes. Mirrors the node types
/// enumerated in spec.md §3.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    LoadBalancer,
    Listener,
    Rule,
    TargetGroup,
    TargetGroupBinding,
    SecurityGroup,
}

/// Typed payload carried by a graph node. Each variant corresponds to one
/// [`NodeKind`] and owns the AWS-shaped fields the Reconciliation Engine
/// needs to diff against live state.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    LoadBalancer(crate::listener::LoadBalancerSpec),
    Listener(ListenerSpec),
    Rule(crate::route::RuleNode),
    TargetGroup(TargetGroupSpec),
    TargetGroupBinding(crate::targetgroup::TargetGroupBindingSpec),
    SecurityGroup(SecurityGroupSpec),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::LoadBalancer(_) => NodeKind::LoadBalancer,
            Node::Listener(_) => NodeKind::Listener,
            Node::Rule(_) => NodeKind::Rule,
            Node::TargetGroup(_) => NodeKind::TargetGroup,
            Node::TargetGroupBinding(_) => NodeKind::TargetGroupBinding,
            Node::SecurityGroup(_) => NodeKind::SecurityGroup,
        }
    }

    /// The other nodes this node's existence depends on. A dependency must
    /// be created before this node and deleted after it (spec.md §4.5
    /// ordering rules), except for the weak NLB→ALB target reference, which
    /// is recorded separately and resolved only after the referenced ALB
    /// has reconciled (spec.md §9).
    pub fn dependencies(&self) -> BTreeSet<NodeId> {
        match self {
            Node::LoadBalancer(_) => BTreeSet::new(),
            Node::Listener(l) => {
                let mut deps = BTreeSet::from([l.load_balancer.clone()]);
                deps.extend(l.default_target_groups.iter().cloned());
                deps
            }
            Node::Rule(r) => {
                let mut deps = BTreeSet::from([r.listener.clone()]);
                deps.extend(r.target_groups.iter().map(|(id, _)| id.clone()));
                deps
            }
            Node::TargetGroup(_) => BTreeSet::new(),
            Node::TargetGroupBinding(b) => BTreeSet::from([b.target_group.clone()]),
            Node::SecurityGroup(sg) => BTreeSet::from([sg.load_balancer.clone()]),
        }
    }
}

/// An in-memory DAG of desired cloud objects, produced fresh by the Model
/// Builder on every reconciliation and handed, immutably, to the
/// Reconciliation Engine (spec.md §5 "Shared resources").
#[derive(Debug, Default, Clone)]
pub struct Graph {
    nodes: HashMap<NodeId, Node>,
    /// Filled in by the Reconciliation Engine as nodes materialize in AWS.
    arns: HashMap<NodeId, String>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `node` under `id`. Fails if `id` is already present with a
    /// structurally different definition — this is the collision case
    /// spec.md §4.3 calls out explicitly, and it indicates two independent
    /// parts of the snapshot produced the same logical ID for different
    /// intended objects.
    pub fn add(&mut self, id: NodeId, node: Node) -> Result<(), GraphError> {
        match self.nodes.get(&id) {
            Some(existing) if existing != &node => Err(GraphError::Collision { id }),
            _ => {
                self.nodes.insert(id, node);
                Ok(())
            }
        }
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    /// Records the cloud ARN a node has materialized as. Subsequent
    /// reconciliations compare this against the tag-derived live ARN to
    /// decide whether re-use (P5) applies.
    pub fn resolve(&mut self, id: &NodeId, arn: String) {
        self.arns.insert(id.clone(), arn);
    }

    pub fn arn(&self, id: &NodeId) -> Option<&str> {
        self.arns.get(id).map(String::as_str)
    }

    /// Yields every node in a topological order: every dependency is
    /// visited before its dependents (spec.md §4.3 `visit`, P4). Ties among
    /// nodes with no ordering constraint between them are broken by
    /// `NodeId` so that the visitation order is itself deterministic, which
    /// the Reconciliation Engine relies on for reproducible dry-run diffs.
    pub fn visit_topological(&self) -> Result<Vec<NodeId>, GraphError> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Temporary,
            Permanent,
        }

        let mut marks: HashMap<NodeId, Mark> = HashMap::new();
        let mut order = Vec::with_capacity(self.nodes.len());

        let mut ids: Vec<&NodeId> = self.nodes.keys().collect();
        ids.sort();

        for id in ids {
            visit(id, self, &mut marks, &mut order)?;
        }

        return Ok(order);

        fn visit(
            id: &NodeId,
            graph: &Graph,
            marks: &mut HashMap<NodeId, Mark>,
            order: &mut Vec<NodeId>,
        ) -> Result<(), GraphError> {
            match marks.get(id) {
                Some(Mark::Permanent) => return Ok(()),
                Some(Mark::Temporary) => return Err(GraphError::Cycle { id: id.clone() }),
                None => {}
            }
            marks.insert(id.clone(), Mark::Temporary);

            if let Some(node) = graph.nodes.get(id) {
                let mut deps: Vec<NodeId> = node.dependencies().into_iter().collect();
                deps.sort();
                for dep in &deps {
                    if !graph.contains(dep) {
                        return Err(GraphError::DanglingReference {
                            id: id.clone(),
                            referenced: dep.clone(),
                        });
                    }
                    visit(dep, graph, marks, order)?;
                }
            }

            marks.insert(id.clone(), Mark::Permanent);
            order.push(id.clone());
            Ok(())
        }
    }

    /// Nodes that no accepted rule or listener references: garbage
    /// collection candidates (spec.md §3 invariant "every target group is
    /// referenced by ≥1 rule or is garbage").
    pub fn unreferenced_target_groups(&self) -> BTreeSet<NodeId> {
        let mut referenced = BTreeSet::new();
        for node in self.nodes.values() {
            if let Node::Rule(r) = node {
                referenced.extend(r.target_groups.iter().map(|(id, _)| id.clone()));
            }
            if let Node::Listener(l) = node {
                referenced.extend(l.default_target_groups.iter().cloned());
            }
            if let Node::TargetGroupBinding(b) = node {
                referenced.insert(b.target_group.clone());
            }
        }
        self.nodes
            .iter()
            .filter(|(id, n)| n.kind() == NodeKind::TargetGroup && !referenced.contains(*id))
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::LoadBalancerSpec;

    fn lb(name: &str) -> (NodeId, Node) {
        let id = LogicalId::of("LoadBalancer", &name);
        (id, Node::LoadBalancer(LoadBalancerSpec::test_fixture(name)))
    }

    #[test]
    fn topological_order_respects_dependencies() {
        let mut g = Graph::new();
        let (lb_id, lb_node) = lb("a");
        g.add(lb_id.clone(), lb_node).unwrap();

        let listener = ListenerSpec::test_fixture(lb_id.clone(), 80);
        let listener_id = LogicalId::of("Listener", &(lb_id.as_str(), 80));
        g.add(listener_id.clone(), Node::Listener(listener)).unwrap();

        let order = g.visit_topological().unwrap();
        let lb_pos = order.iter().position(|id| id == &lb_id).unwrap();
        let listener_pos = order.iter().position(|id| id == &listener_id).unwrap();
        assert!(lb_pos < listener_pos);
    }

    #[test]
    fn dangling_reference_is_an_error() {
        let mut g = Graph::new();
        let listener_id = LogicalId::of("Listener", &"orphan");
        let listener = ListenerSpec::test_fixture(LogicalId::of("LoadBalancer", &"missing"), 80);
        g.add(listener_id, Node::Listener(listener)).unwrap();
        assert!(matches!(
            g.visit_topological(),
            Err(GraphError::DanglingReference { .. })
        ));
    }

    #[test]
    fn collision_on_conflicting_redefinition() {
        let mut g = Graph::new();
        let (id, node) = lb("a");
        g.add(id.clone(), node).unwrap();
        let other = Node::LoadBalancer(LoadBalancerSpec::test_fixture("b"));
        assert!(matches!(g.add(id, other), Err(GraphError::Collision { .. })));
    }
}
