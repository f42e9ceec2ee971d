//! Provisioning and operating status vocabulary.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Provisioning status shared by load balancers and their child resources.
///
/// State transitions:
/// ```text
/// PENDING_CREATE ──► ACTIVE ◄──► PENDING_UPDATE
///        │             │               │
///        └─────────────┴───────┬───────┘
///                              ▼
///                       PENDING_DELETE ──► DELETED
///
/// every non-DELETED status ──► ERROR ──► PENDING_* | ACTIVE
/// ```
///
/// `DELETED` is terminal. `ERROR` is reachable from everywhere else and is
/// what compensation leaves behind when a prior value cannot be restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProvisioningStatus {
    PendingCreate,
    PendingUpdate,
    PendingDelete,
    Active,
    Deleted,
    Error,
}

impl ProvisioningStatus {
    /// Returns true for the three in-flight statuses.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            ProvisioningStatus::PendingCreate
                | ProvisioningStatus::PendingUpdate
                | ProvisioningStatus::PendingDelete
        )
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProvisioningStatus::Deleted)
    }

    /// Returns true if moving from `self` to `target` is a legal transition.
    ///
    /// Re-applying the current status is legal wherever the status can be
    /// entered at all, so retried flows stay idempotent.
    pub fn can_transition_to(&self, target: ProvisioningStatus) -> bool {
        use ProvisioningStatus::*;

        if self.is_terminal() {
            return target == Deleted;
        }
        match target {
            Error | PendingDelete => true,
            PendingCreate => matches!(self, PendingCreate | Error),
            PendingUpdate => matches!(self, Active | PendingUpdate | Error),
            Active => matches!(self, PendingCreate | PendingUpdate | Active | Error),
            Deleted => matches!(self, PendingDelete),
        }
    }

    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisioningStatus::PendingCreate => "PENDING_CREATE",
            ProvisioningStatus::PendingUpdate => "PENDING_UPDATE",
            ProvisioningStatus::PendingDelete => "PENDING_DELETE",
            ProvisioningStatus::Active => "ACTIVE",
            ProvisioningStatus::Deleted => "DELETED",
            ProvisioningStatus::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for ProvisioningStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProvisioningStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING_CREATE" => Ok(ProvisioningStatus::PendingCreate),
            "PENDING_UPDATE" => Ok(ProvisioningStatus::PendingUpdate),
            "PENDING_DELETE" => Ok(ProvisioningStatus::PendingDelete),
            "ACTIVE" => Ok(ProvisioningStatus::Active),
            "DELETED" => Ok(ProvisioningStatus::Deleted),
            "ERROR" => Ok(ProvisioningStatus::Error),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// Observed health of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatingStatus {
    Online,
    #[default]
    Offline,
    Degraded,
    Error,
    NoMonitor,
    Draining,
}

impl OperatingStatus {
    /// Operating status implied by the admin flag once a resource goes ACTIVE.
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            OperatingStatus::Online
        } else {
            OperatingStatus::Offline
        }
    }

    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingStatus::Online => "ONLINE",
            OperatingStatus::Offline => "OFFLINE",
            OperatingStatus::Degraded => "DEGRADED",
            OperatingStatus::Error => "ERROR",
            OperatingStatus::NoMonitor => "NO_MONITOR",
            OperatingStatus::Draining => "DRAINING",
        }
    }
}

impl std::fmt::Display for OperatingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatingStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ONLINE" => Ok(OperatingStatus::Online),
            "OFFLINE" => Ok(OperatingStatus::Offline),
            "DEGRADED" => Ok(OperatingStatus::Degraded),
            "ERROR" => Ok(OperatingStatus::Error),
            "NO_MONITOR" => Ok(OperatingStatus::NoMonitor),
            "DRAINING" => Ok(OperatingStatus::Draining),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}
