//! Resource kinds and references that address any node of a load-balancer tree.

use common::ResourceId;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::status::{OperatingStatus, ProvisioningStatus};

/// Kind of a provisioned resource.
///
/// The same vocabulary names quota kinds: each resource a project owns is
/// charged against the quota of its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    LoadBalancer,
    Listener,
    Pool,
    Member,
    HealthMonitor,
    L7Policy,
    L7Rule,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::LoadBalancer,
        ResourceKind::Listener,
        ResourceKind::Pool,
        ResourceKind::Member,
        ResourceKind::HealthMonitor,
        ResourceKind::L7Policy,
        ResourceKind::L7Rule,
    ];

    /// L7 rules carry only a provisioning status.
    pub fn has_operating_status(&self) -> bool {
        !matches!(self, ResourceKind::L7Rule)
    }

    /// Returns true if going ACTIVE sets operating status from the admin flag.
    ///
    /// Load balancers, listeners, pools and members get their operating
    /// status from health reports, so provisioning leaves it alone.
    pub fn derives_operating_status(&self) -> bool {
        matches!(self, ResourceKind::HealthMonitor | ResourceKind::L7Policy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::LoadBalancer => "load_balancer",
            ResourceKind::Listener => "listener",
            ResourceKind::Pool => "pool",
            ResourceKind::Member => "member",
            ResourceKind::HealthMonitor => "health_monitor",
            ResourceKind::L7Policy => "l7policy",
            ResourceKind::L7Rule => "l7rule",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed reference to one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: ResourceKind,
    pub id: ResourceId,
}

impl EntityRef {
    pub fn new(kind: ResourceKind, id: ResourceId) -> Self {
        Self { kind, id }
    }

    pub fn load_balancer(id: ResourceId) -> Self {
        Self::new(ResourceKind::LoadBalancer, id)
    }

    pub fn listener(id: ResourceId) -> Self {
        Self::new(ResourceKind::Listener, id)
    }

    pub fn pool(id: ResourceId) -> Self {
        Self::new(ResourceKind::Pool, id)
    }

    pub fn member(id: ResourceId) -> Self {
        Self::new(ResourceKind::Member, id)
    }

    pub fn health_monitor(id: ResourceId) -> Self {
        Self::new(ResourceKind::HealthMonitor, id)
    }

    pub fn l7policy(id: ResourceId) -> Self {
        Self::new(ResourceKind::L7Policy, id)
    }

    pub fn l7rule(id: ResourceId) -> Self {
        Self::new(ResourceKind::L7Rule, id)
    }

    /// Validates a provisioning status change for this resource.
    pub fn check_transition(&self, from: ProvisioningStatus, to: ProvisioningStatus) -> Result<()> {
        if from.can_transition_to(to) {
            Ok(())
        } else {
            Err(DomainError::InvalidTransition {
                entity: *self,
                from,
                to,
            })
        }
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// Status columns of a resource as currently stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub provisioning_status: ProvisioningStatus,
    /// `None` for kinds without an operating status.
    pub operating_status: Option<OperatingStatus>,
    pub enabled: bool,
}

/// A status write: provisioning status always, operating status optionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub provisioning_status: ProvisioningStatus,
    pub operating_status: Option<OperatingStatus>,
}

impl StatusChange {
    /// Changes only the provisioning status.
    pub fn provisioning(status: ProvisioningStatus) -> Self {
        Self {
            provisioning_status: status,
            operating_status: None,
        }
    }

    /// Also sets the operating status.
    pub fn with_operating(mut self, status: OperatingStatus) -> Self {
        self.operating_status = Some(status);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_l7rule_lacks_operating_status() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.has_operating_status(), kind != ResourceKind::L7Rule);
        }
    }

    #[test]
    fn test_derived_operating_status_kinds() {
        let derived: Vec<_> = ResourceKind::ALL
            .into_iter()
            .filter(ResourceKind::derives_operating_status)
            .collect();
        assert_eq!(
            derived,
            vec![ResourceKind::HealthMonitor, ResourceKind::L7Policy]
        );
    }

    #[test]
    fn test_check_transition_reports_entity() {
        let entity = EntityRef::pool(ResourceId::new());
        let err = entity
            .check_transition(ProvisioningStatus::Deleted, ProvisioningStatus::Active)
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidTransition {
                entity,
                from: ProvisioningStatus::Deleted,
                to: ProvisioningStatus::Active,
            }
        );
        assert!(err.to_string().starts_with("pool "));
    }

    #[test]
    fn test_status_change_builder() {
        let change = StatusChange::provisioning(ProvisioningStatus::Active)
            .with_operating(OperatingStatus::Online);
        assert_eq!(change.provisioning_status, ProvisioningStatus::Active);
        assert_eq!(change.operating_status, Some(OperatingStatus::Online));
    }
}
