//! Amphorae: the virtual appliances that run a load balancer's data plane.

use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::ResourceId;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

/// VRRP priority of the MASTER amphora in an active/standby pair.
pub const ROLE_MASTER_PRIORITY: u32 = 100;

/// VRRP priority of the BACKUP amphora in an active/standby pair.
pub const ROLE_BACKUP_PRIORITY: u32 = 90;

/// Amphora lifecycle status.
///
/// State transitions:
/// ```text
/// PENDING_CREATE ──► BOOTING ──► READY ──► ALLOCATED ◄──► PENDING_UPDATE
///        │              │          ▲           ▲
///        └──────────────┴──────────┴───────────┘
///
/// every non-DELETED status ──► ERROR | PENDING_DELETE | DELETED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AmphoraStatus {
    PendingCreate,
    Booting,
    Ready,
    Allocated,
    PendingUpdate,
    PendingDelete,
    Deleted,
    Error,
}

impl AmphoraStatus {
    /// Returns true if moving from `self` to `target` is a legal transition.
    pub fn can_transition_to(&self, target: AmphoraStatus) -> bool {
        use AmphoraStatus::*;

        if *self == Deleted {
            return target == Deleted;
        }
        match target {
            Error | PendingDelete | Deleted => true,
            PendingCreate => *self == PendingCreate,
            Booting => matches!(self, PendingCreate | Booting),
            Ready => matches!(self, PendingCreate | Booting | Ready | PendingUpdate),
            Allocated => matches!(
                self,
                PendingCreate | Booting | Ready | Allocated | PendingUpdate
            ),
            PendingUpdate => matches!(self, Ready | Allocated | PendingUpdate | Error),
        }
    }

    /// Validates a status change for the given amphora.
    pub fn check_transition(&self, amphora_id: ResourceId, target: AmphoraStatus) -> Result<()> {
        if self.can_transition_to(target) {
            Ok(())
        } else {
            Err(DomainError::InvalidAmphoraTransition {
                amphora_id,
                from: *self,
                to: target,
            })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AmphoraStatus::PendingCreate => "PENDING_CREATE",
            AmphoraStatus::Booting => "BOOTING",
            AmphoraStatus::Ready => "READY",
            AmphoraStatus::Allocated => "ALLOCATED",
            AmphoraStatus::PendingUpdate => "PENDING_UPDATE",
            AmphoraStatus::PendingDelete => "PENDING_DELETE",
            AmphoraStatus::Deleted => "DELETED",
            AmphoraStatus::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for AmphoraStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AmphoraStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "PENDING_CREATE" => Ok(AmphoraStatus::PendingCreate),
            "BOOTING" => Ok(AmphoraStatus::Booting),
            "READY" => Ok(AmphoraStatus::Ready),
            "ALLOCATED" => Ok(AmphoraStatus::Allocated),
            "PENDING_UPDATE" => Ok(AmphoraStatus::PendingUpdate),
            "PENDING_DELETE" => Ok(AmphoraStatus::PendingDelete),
            "DELETED" => Ok(AmphoraStatus::Deleted),
            "ERROR" => Ok(AmphoraStatus::Error),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// Role of an amphora within its load balancer's topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AmphoraRole {
    Master,
    Backup,
    Standalone,
}

impl AmphoraRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AmphoraRole::Master => "MASTER",
            AmphoraRole::Backup => "BACKUP",
            AmphoraRole::Standalone => "STANDALONE",
        }
    }
}

impl std::fmt::Display for AmphoraRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A role together with the VRRP priority it implies.
///
/// Role and priority are always written and cleared as one value, so an
/// amphora can never carry a priority without a role or a STANDALONE role
/// with a priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleAssignment {
    Master { priority: u32 },
    Backup { priority: u32 },
    Standalone,
}

impl RoleAssignment {
    pub fn master() -> Self {
        RoleAssignment::Master {
            priority: ROLE_MASTER_PRIORITY,
        }
    }

    pub fn backup() -> Self {
        RoleAssignment::Backup {
            priority: ROLE_BACKUP_PRIORITY,
        }
    }

    pub fn standalone() -> Self {
        RoleAssignment::Standalone
    }

    pub fn role(&self) -> AmphoraRole {
        match self {
            RoleAssignment::Master { .. } => AmphoraRole::Master,
            RoleAssignment::Backup { .. } => AmphoraRole::Backup,
            RoleAssignment::Standalone => AmphoraRole::Standalone,
        }
    }

    pub fn vrrp_priority(&self) -> Option<u32> {
        match self {
            RoleAssignment::Master { priority } | RoleAssignment::Backup { priority } => {
                Some(*priority)
            }
            RoleAssignment::Standalone => None,
        }
    }
}

/// VRRP addressing attached to an amphora once the VIP is plugged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmphoraVipData {
    pub vrrp_ip: IpAddr,
    pub ha_ip: IpAddr,
    pub vrrp_port_id: String,
    pub ha_port_id: String,
    pub vrrp_id: u32,
}

/// Persisted amphora record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amphora {
    pub id: ResourceId,
    pub load_balancer_id: Option<ResourceId>,
    pub compute_id: Option<String>,
    pub status: AmphoraStatus,
    pub lb_network_ip: Option<IpAddr>,
    pub role: Option<RoleAssignment>,
    pub vip_data: Option<AmphoraVipData>,
    pub cert_busy: bool,
    pub cert_expiration: Option<DateTime<Utc>>,
    pub cached_zone: Option<String>,
    pub image_id: Option<String>,
    pub compute_flavor: Option<String>,
}

impl Amphora {
    /// Builds the record a create writes: PENDING_CREATE with no certificate
    /// rotation in progress.
    pub fn pending(load_balancer_id: Option<ResourceId>) -> Self {
        Self {
            id: ResourceId::new(),
            load_balancer_id,
            compute_id: None,
            status: AmphoraStatus::PendingCreate,
            lb_network_ip: None,
            role: None,
            vip_data: None,
            cert_busy: false,
            cert_expiration: None,
            cached_zone: None,
            image_id: None,
            compute_flavor: None,
        }
    }

    pub fn role(&self) -> Option<AmphoraRole> {
        self.role.map(|r| r.role())
    }

    pub fn vrrp_priority(&self) -> Option<u32> {
        self.role.and_then(|r| r.vrrp_priority())
    }
}

/// Partial update of an amphora. `None` leaves the column untouched; the
/// nested `Option` on nullable columns distinguishes "set to null" from
/// "leave alone".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AmphoraUpdate {
    pub status: Option<AmphoraStatus>,
    pub load_balancer_id: Option<Option<ResourceId>>,
    pub compute_id: Option<String>,
    pub lb_network_ip: Option<IpAddr>,
    pub role: Option<Option<RoleAssignment>>,
    pub vip_data: Option<AmphoraVipData>,
    pub cert_busy: Option<bool>,
    pub cert_expiration: Option<DateTime<Utc>>,
    pub cached_zone: Option<String>,
    pub image_id: Option<String>,
    pub compute_flavor: Option<String>,
}

impl AmphoraUpdate {
    pub fn status(status: AmphoraStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_compute_id(mut self, compute_id: impl Into<String>) -> Self {
        self.compute_id = Some(compute_id.into());
        self
    }

    pub fn with_lb_network_ip(mut self, ip: IpAddr) -> Self {
        self.lb_network_ip = Some(ip);
        self
    }

    pub fn with_load_balancer(mut self, load_balancer_id: Option<ResourceId>) -> Self {
        self.load_balancer_id = Some(load_balancer_id);
        self
    }

    /// Applies the set fields to `amphora`.
    pub fn apply(&self, amphora: &mut Amphora) {
        if let Some(status) = self.status {
            amphora.status = status;
        }
        if let Some(lb) = self.load_balancer_id {
            amphora.load_balancer_id = lb;
        }
        if let Some(compute_id) = &self.compute_id {
            amphora.compute_id = Some(compute_id.clone());
        }
        if let Some(ip) = self.lb_network_ip {
            amphora.lb_network_ip = Some(ip);
        }
        if let Some(role) = self.role {
            amphora.role = role;
        }
        if let Some(vip_data) = &self.vip_data {
            amphora.vip_data = Some(vip_data.clone());
        }
        if let Some(busy) = self.cert_busy {
            amphora.cert_busy = busy;
        }
        if let Some(expiration) = self.cert_expiration {
            amphora.cert_expiration = Some(expiration);
        }
        if let Some(zone) = &self.cached_zone {
            amphora.cached_zone = Some(zone.clone());
        }
        if let Some(image_id) = &self.image_id {
            amphora.image_id = Some(image_id.clone());
        }
        if let Some(flavor) = &self.compute_flavor {
            amphora.compute_flavor = Some(flavor.clone());
        }
    }
}

/// Health-manager bookkeeping for one amphora.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmphoraHealth {
    pub amphora_id: ResourceId,
    pub last_update: DateTime<Utc>,
    /// While set, the health manager must not start a failover for this amphora.
    pub busy: bool,
}

impl AmphoraHealth {
    pub fn new(amphora_id: ResourceId) -> Self {
        Self {
            amphora_id,
            last_update: Utc::now(),
            busy: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_priorities() {
        assert_eq!(RoleAssignment::master().vrrp_priority(), Some(100));
        assert_eq!(RoleAssignment::backup().vrrp_priority(), Some(90));
        assert_eq!(RoleAssignment::standalone().vrrp_priority(), None);
        assert_eq!(RoleAssignment::backup().role(), AmphoraRole::Backup);
    }

    #[test]
    fn test_clearing_role_clears_priority() {
        let mut amphora = Amphora::pending(None);
        AmphoraUpdate {
            role: Some(Some(RoleAssignment::master())),
            ..AmphoraUpdate::default()
        }
        .apply(&mut amphora);
        assert_eq!(amphora.role(), Some(AmphoraRole::Master));
        assert_eq!(amphora.vrrp_priority(), Some(ROLE_MASTER_PRIORITY));

        AmphoraUpdate {
            role: Some(None),
            ..AmphoraUpdate::default()
        }
        .apply(&mut amphora);
        assert_eq!(amphora.role(), None);
        assert_eq!(amphora.vrrp_priority(), None);
    }

    #[test]
    fn test_pending_amphora_defaults() {
        let lb = ResourceId::new();
        let amphora = Amphora::pending(Some(lb));
        assert_eq!(amphora.status, AmphoraStatus::PendingCreate);
        assert!(!amphora.cert_busy);
        assert_eq!(amphora.load_balancer_id, Some(lb));
    }

    #[test]
    fn test_update_leaves_unset_fields() {
        let mut amphora = Amphora::pending(None);
        amphora.compute_id = Some("nova-1".to_string());
        AmphoraUpdate::status(AmphoraStatus::Error).apply(&mut amphora);
        assert_eq!(amphora.status, AmphoraStatus::Error);
        assert_eq!(amphora.compute_id.as_deref(), Some("nova-1"));
    }

    #[test]
    fn test_amphora_transitions() {
        use AmphoraStatus::*;
        assert!(PendingCreate.can_transition_to(Booting));
        assert!(Booting.can_transition_to(Allocated));
        assert!(Allocated.can_transition_to(Deleted));
        assert!(!Allocated.can_transition_to(Booting));
        assert!(!Deleted.can_transition_to(Error));
        assert!(Ready.check_transition(ResourceId::new(), Booting).is_err());
    }

    #[test]
    fn test_role_assignment_serde_is_tagged() {
        let json = serde_json::to_value(RoleAssignment::master()).unwrap();
        assert_eq!(json["role"], "MASTER");
        assert_eq!(json["priority"], 100);
    }
}
