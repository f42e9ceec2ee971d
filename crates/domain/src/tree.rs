//! Read-only snapshot of a load balancer and everything beneath it.

use common::ResourceId;
use serde::{Deserialize, Serialize};

use crate::amphora::Amphora;
use crate::l7::{L7Policy, L7Rule};
use crate::listener::Listener;
use crate::load_balancer::LoadBalancer;
use crate::pool::{HealthMonitor, Member, Pool, PoolChildCount};

/// A pool with its health monitor and members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolNode {
    pub pool: Pool,
    pub health_monitor: Option<HealthMonitor>,
    pub members: Vec<Member>,
}

impl PoolNode {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            health_monitor: None,
            members: Vec::new(),
        }
    }

    pub fn child_count(&self) -> PoolChildCount {
        PoolChildCount {
            health_monitors: u32::from(self.health_monitor.is_some()),
            members: u32::try_from(self.members.len()).unwrap_or(u32::MAX),
        }
    }
}

/// An L7 policy with its rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct L7PolicyNode {
    pub policy: L7Policy,
    pub rules: Vec<L7Rule>,
}

/// A listener with its L7 policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerNode {
    pub listener: Listener,
    pub l7policies: Vec<L7PolicyNode>,
}

/// A load balancer with its amphorae, listeners and pools.
///
/// Pools hang off the load balancer; listeners and L7 policies reference
/// them through `default_pool_id` and `redirect_pool_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerTree {
    pub load_balancer: LoadBalancer,
    pub amphorae: Vec<Amphora>,
    pub listeners: Vec<ListenerNode>,
    pub pools: Vec<PoolNode>,
}

impl LoadBalancerTree {
    pub fn pool(&self, id: ResourceId) -> Option<&PoolNode> {
        self.pools.iter().find(|node| node.pool.id == id)
    }

    /// Number of status-bearing nodes, the load balancer included.
    pub fn node_count(&self) -> usize {
        let listeners: usize = self
            .listeners
            .iter()
            .map(|l| 1 + l.l7policies.iter().map(|p| 1 + p.rules.len()).sum::<usize>())
            .sum();
        let pools: usize = self
            .pools
            .iter()
            .map(|p| 1 + usize::from(p.health_monitor.is_some()) + p.members.len())
            .sum();
        1 + listeners + pools
    }
}
