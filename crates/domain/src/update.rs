//! Typed partial updates, one variant per resource kind.

use serde::{Deserialize, Serialize};

use crate::l7::{L7PolicyUpdate, L7RuleUpdate};
use crate::listener::ListenerUpdate;
use crate::load_balancer::LoadBalancerUpdate;
use crate::pool::{HealthMonitorUpdate, MemberUpdate, PoolUpdate};
use crate::resource::ResourceKind;

/// Field changes for one resource. Status columns are not part of these
/// updates; they move only through status writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "fields", rename_all = "snake_case")]
pub enum ResourceUpdate {
    LoadBalancer(LoadBalancerUpdate),
    Listener(ListenerUpdate),
    Pool(PoolUpdate),
    Member(MemberUpdate),
    HealthMonitor(HealthMonitorUpdate),
    L7Policy(L7PolicyUpdate),
    L7Rule(L7RuleUpdate),
}

impl ResourceUpdate {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceUpdate::LoadBalancer(_) => ResourceKind::LoadBalancer,
            ResourceUpdate::Listener(_) => ResourceKind::Listener,
            ResourceUpdate::Pool(_) => ResourceKind::Pool,
            ResourceUpdate::Member(_) => ResourceKind::Member,
            ResourceUpdate::HealthMonitor(_) => ResourceKind::HealthMonitor,
            ResourceUpdate::L7Policy(_) => ResourceKind::L7Policy,
            ResourceUpdate::L7Rule(_) => ResourceKind::L7Rule,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        let update = ResourceUpdate::Member(MemberUpdate {
            weight: Some(10),
            ..MemberUpdate::default()
        });
        assert_eq!(update.kind(), ResourceKind::Member);
    }

    #[test]
    fn test_serialized_form_is_tagged_by_kind() {
        let update = ResourceUpdate::Pool(PoolUpdate::default());
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["kind"], "pool");
    }
}
