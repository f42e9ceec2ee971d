//! Pools with their members and health monitor.

use std::net::IpAddr;

use common::{ProjectId, ResourceId};
use serde::{Deserialize, Serialize};

use crate::status::{OperatingStatus, ProvisioningStatus};

/// Member selection algorithm of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LbAlgorithm {
    #[default]
    RoundRobin,
    LeastConnections,
    SourceIp,
}

/// Session persistence settings of a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPersistence {
    pub persistence_type: String,
    pub cookie_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub id: ResourceId,
    pub load_balancer_id: ResourceId,
    pub project_id: ProjectId,
    pub name: Option<String>,
    pub lb_algorithm: LbAlgorithm,
    pub session_persistence: Option<SessionPersistence>,
    pub enabled: bool,
    pub provisioning_status: ProvisioningStatus,
    pub operating_status: OperatingStatus,
}

impl Pool {
    pub fn new(load_balancer_id: ResourceId, project_id: ProjectId) -> Self {
        Self {
            id: ResourceId::new(),
            load_balancer_id,
            project_id,
            name: None,
            lb_algorithm: LbAlgorithm::default(),
            session_persistence: None,
            enabled: true,
            provisioning_status: ProvisioningStatus::PendingCreate,
            operating_status: OperatingStatus::Offline,
        }
    }
}

/// Partial update of a pool and its session persistence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolUpdate {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub lb_algorithm: Option<LbAlgorithm>,
    pub session_persistence: Option<Option<SessionPersistence>>,
}

impl PoolUpdate {
    pub fn apply(&self, pool: &mut Pool) {
        if let Some(name) = &self.name {
            pool.name = Some(name.clone());
        }
        if let Some(enabled) = self.enabled {
            pool.enabled = enabled;
        }
        if let Some(algorithm) = self.lb_algorithm {
            pool.lb_algorithm = algorithm;
        }
        if let Some(persistence) = &self.session_persistence {
            pool.session_persistence = persistence.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: ResourceId,
    pub pool_id: ResourceId,
    pub project_id: ProjectId,
    pub name: Option<String>,
    pub address: IpAddr,
    pub protocol_port: u16,
    pub weight: u32,
    pub backup: bool,
    pub enabled: bool,
    pub provisioning_status: ProvisioningStatus,
    pub operating_status: OperatingStatus,
}

impl Member {
    pub fn new(pool_id: ResourceId, project_id: ProjectId, address: IpAddr, port: u16) -> Self {
        Self {
            id: ResourceId::new(),
            pool_id,
            project_id,
            name: None,
            address,
            protocol_port: port,
            weight: 1,
            backup: false,
            enabled: true,
            provisioning_status: ProvisioningStatus::PendingCreate,
            operating_status: OperatingStatus::NoMonitor,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemberUpdate {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub weight: Option<u32>,
    pub backup: Option<bool>,
}

impl MemberUpdate {
    pub fn apply(&self, member: &mut Member) {
        if let Some(name) = &self.name {
            member.name = Some(name.clone());
        }
        if let Some(enabled) = self.enabled {
            member.enabled = enabled;
        }
        if let Some(weight) = self.weight {
            member.weight = weight;
        }
        if let Some(backup) = self.backup {
            member.backup = backup;
        }
    }
}

/// Kind of probe a health monitor sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MonitorType {
    Http,
    Https,
    Ping,
    Tcp,
    UdpConnect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthMonitor {
    pub id: ResourceId,
    pub pool_id: ResourceId,
    pub project_id: ProjectId,
    pub monitor_type: MonitorType,
    pub delay: u32,
    pub timeout: u32,
    pub max_retries: u32,
    pub enabled: bool,
    pub provisioning_status: ProvisioningStatus,
    pub operating_status: OperatingStatus,
}

impl HealthMonitor {
    pub fn new(pool_id: ResourceId, project_id: ProjectId, monitor_type: MonitorType) -> Self {
        Self {
            id: ResourceId::new(),
            pool_id,
            project_id,
            monitor_type,
            delay: 5,
            timeout: 5,
            max_retries: 3,
            enabled: true,
            provisioning_status: ProvisioningStatus::PendingCreate,
            operating_status: OperatingStatus::Offline,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthMonitorUpdate {
    pub enabled: Option<bool>,
    pub delay: Option<u32>,
    pub timeout: Option<u32>,
    pub max_retries: Option<u32>,
}

impl HealthMonitorUpdate {
    pub fn apply(&self, monitor: &mut HealthMonitor) {
        if let Some(enabled) = self.enabled {
            monitor.enabled = enabled;
        }
        if let Some(delay) = self.delay {
            monitor.delay = delay;
        }
        if let Some(timeout) = self.timeout {
            monitor.timeout = timeout;
        }
        if let Some(max_retries) = self.max_retries {
            monitor.max_retries = max_retries;
        }
    }
}

/// Children of a pool that are charged quota of their own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolChildCount {
    pub health_monitors: u32,
    pub members: u32,
}
