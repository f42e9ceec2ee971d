//! Cascading provisioning-status propagation over a load balancer tree.

use std::collections::HashSet;
use std::sync::Arc;

use common::ResourceId;
use domain::{EntityRef, LoadBalancerTree, PoolNode, ProvisioningStatus};
use repository::{Repository, RepositoryError, RepositoryExt};

/// What a propagation pass managed to write.
#[derive(Debug, Clone, Default)]
pub struct PropagationReport {
    /// Resources that now carry the target status, in write order.
    pub updated: Vec<EntityRef>,
    /// Resources whose write failed, with the error.
    pub failed: Vec<(EntityRef, RepositoryError)>,
}

impl PropagationReport {
    pub fn attempted(&self) -> usize {
        self.updated.len() + self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn merge(&mut self, other: PropagationReport) {
        self.updated.extend(other.updated);
        self.failed.extend(other.failed);
    }
}

/// Returns every resource below the load balancer in the order they are
/// marked.
///
/// Each listener comes first, followed by its L7 policies (each with its
/// rules, then the pool it redirects to) and its default pool. Pools not
/// reached through a listener follow at the end. A pool reached twice is
/// visited once. Parents always precede their children.
pub fn subtree_order(tree: &LoadBalancerTree) -> Vec<EntityRef> {
    let mut order = Vec::with_capacity(tree.node_count());
    let mut visited: HashSet<ResourceId> = HashSet::new();

    for node in &tree.listeners {
        order.push(EntityRef::listener(node.listener.id));
        for policy in &node.l7policies {
            order.push(EntityRef::l7policy(policy.policy.id));
            order.extend(policy.rules.iter().map(|rule| EntityRef::l7rule(rule.id)));
            if let Some(pool) = policy.policy.redirect_pool_id.and_then(|id| tree.pool(id)) {
                push_pool(&mut order, &mut visited, pool);
            }
        }
        if let Some(pool) = node.listener.default_pool_id.and_then(|id| tree.pool(id)) {
            push_pool(&mut order, &mut visited, pool);
        }
    }
    for pool in &tree.pools {
        push_pool(&mut order, &mut visited, pool);
    }
    order
}

fn push_pool(order: &mut Vec<EntityRef>, visited: &mut HashSet<ResourceId>, node: &PoolNode) {
    if !visited.insert(node.pool.id) {
        return;
    }
    order.push(EntityRef::pool(node.pool.id));
    if let Some(monitor) = &node.health_monitor {
        order.push(EntityRef::health_monitor(monitor.id));
    }
    order.extend(node.members.iter().map(|m| EntityRef::member(m.id)));
}

/// Writes one provisioning status to every node of a load balancer tree.
///
/// Each node is written as its own repository call. A failed write is
/// logged and recorded in the report, and the walk carries on with the
/// next node.
pub struct StatusPropagator<R> {
    repo: Arc<R>,
}

impl<R> Clone for StatusPropagator<R> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
        }
    }
}

impl<R: Repository> StatusPropagator<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Marks everything below the load balancer, but not the load balancer
    /// itself.
    #[tracing::instrument(skip(self, tree), fields(load_balancer_id = %tree.load_balancer.id))]
    pub async fn mark_subtree(
        &self,
        tree: &LoadBalancerTree,
        status: ProvisioningStatus,
    ) -> PropagationReport {
        self.mark_all(subtree_order(tree), status).await
    }

    /// Marks the whole tree, load balancer last.
    #[tracing::instrument(skip(self, tree), fields(load_balancer_id = %tree.load_balancer.id))]
    pub async fn mark_tree(
        &self,
        tree: &LoadBalancerTree,
        status: ProvisioningStatus,
    ) -> PropagationReport {
        let mut report = self.mark_all(subtree_order(tree), status).await;
        report.merge(
            self.mark_all(vec![EntityRef::load_balancer(tree.load_balancer.id)], status)
                .await,
        );
        report
    }

    async fn mark_all(
        &self,
        entities: Vec<EntityRef>,
        status: ProvisioningStatus,
    ) -> PropagationReport {
        let mut report = PropagationReport::default();
        for entity in entities {
            match self.repo.set_provisioning_status(entity, status).await {
                Ok(()) => {
                    tracing::debug!(%entity, %status, "marked");
                    report.updated.push(entity);
                }
                Err(error) => {
                    metrics::counter!(
                        "status_propagation_failures_total",
                        "kind" => entity.kind.as_str()
                    )
                    .increment(1);
                    tracing::warn!(%entity, %status, %error, "failed to mark resource, continuing");
                    report.failed.push((entity, error));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use common::ProjectId;
    use domain::{
        HealthMonitor, L7Policy, L7PolicyAction, L7PolicyNode, Listener, ListenerNode,
        LoadBalancer, Member, MonitorType, Pool, Protocol, ResourceKind,
    };
    use repository::InMemoryRepository;

    use super::*;

    fn project() -> ProjectId {
        ProjectId::new("tenant")
    }

    fn pool_node(lb: ResourceId, members: usize, monitored: bool) -> PoolNode {
        let pool = Pool::new(lb, project());
        let mut node = PoolNode::new(pool.clone());
        if monitored {
            node.health_monitor = Some(HealthMonitor::new(pool.id, project(), MonitorType::Http));
        }
        for i in 0..members {
            node.members.push(Member::new(
                pool.id,
                project(),
                IpAddr::V4(Ipv4Addr::new(10, 0, 0, i as u8 + 1)),
                80,
            ));
        }
        node
    }

    fn tree_with_shared_pool() -> LoadBalancerTree {
        let lb = LoadBalancer::new(project());
        let shared = pool_node(lb.id, 2, true);
        let orphan = pool_node(lb.id, 1, false);

        let mut listener = Listener::new(lb.id, project(), Protocol::Http, 80);
        listener.default_pool_id = Some(shared.pool.id);
        let mut policy = L7Policy::new(listener.id, project(), L7PolicyAction::RedirectToPool);
        policy.redirect_pool_id = Some(shared.pool.id);

        LoadBalancerTree {
            load_balancer: lb,
            amphorae: Vec::new(),
            listeners: vec![ListenerNode {
                listener,
                l7policies: vec![L7PolicyNode {
                    policy,
                    rules: Vec::new(),
                }],
            }],
            pools: vec![shared, orphan],
        }
    }

    #[test]
    fn test_subtree_order_visits_shared_pool_once() {
        let tree = tree_with_shared_pool();
        let order = subtree_order(&tree);

        assert_eq!(order.len(), tree.node_count() - 1);
        let unique: HashSet<_> = order.iter().collect();
        assert_eq!(unique.len(), order.len());
        assert_eq!(order[0].kind, ResourceKind::Listener);
        assert_eq!(order[1].kind, ResourceKind::L7Policy);
        assert_eq!(order[2], EntityRef::pool(tree.pools[0].pool.id));
    }

    #[test]
    fn test_children_follow_their_parent() {
        let tree = tree_with_shared_pool();
        let order = subtree_order(&tree);
        for node in &tree.pools {
            let parent = order
                .iter()
                .position(|e| *e == EntityRef::pool(node.pool.id))
                .unwrap();
            for member in &node.members {
                let child = order
                    .iter()
                    .position(|e| *e == EntityRef::member(member.id))
                    .unwrap();
                assert!(child > parent);
            }
        }
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_walk_continues() {
        let tree = tree_with_shared_pool();
        let repo = Arc::new(InMemoryRepository::new());
        repo.insert_load_balancer(tree.load_balancer.clone()).await;
        for node in &tree.listeners {
            repo.insert_listener(node.listener.clone()).await;
            for policy in &node.l7policies {
                repo.insert_l7policy(policy.policy.clone()).await;
            }
        }
        for node in &tree.pools {
            repo.insert_pool(node.pool.clone()).await;
            if let Some(hm) = &node.health_monitor {
                repo.insert_health_monitor(hm.clone()).await;
            }
            for member in &node.members {
                repo.insert_member(member.clone()).await;
            }
        }
        let broken = tree.pools[0].members[0].id;
        repo.set_fail_on_resource(broken, true);

        let propagator = StatusPropagator::new(repo.clone());
        let report = propagator
            .mark_tree(&tree, ProvisioningStatus::Active)
            .await;

        assert_eq!(report.attempted(), tree.node_count());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, EntityRef::member(broken));
        assert_eq!(
            report.updated.last(),
            Some(&EntityRef::load_balancer(tree.load_balancer.id))
        );
        let orphan_member = tree.pools[1].members[0].id;
        let status = repo
            .get_status(EntityRef::member(orphan_member))
            .await
            .unwrap();
        assert_eq!(status.provisioning_status, ProvisioningStatus::Active);
    }
}
