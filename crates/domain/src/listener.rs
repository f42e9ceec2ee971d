//! Listeners: protocol/port front ends of a load balancer.

use common::{ProjectId, ResourceId};
use serde::{Deserialize, Serialize};

use crate::status::{OperatingStatus, ProvisioningStatus};

/// Front-end protocol of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Protocol {
    Tcp,
    Udp,
    Http,
    Https,
    TerminatedHttps,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listener {
    pub id: ResourceId,
    pub load_balancer_id: ResourceId,
    pub project_id: ProjectId,
    pub name: Option<String>,
    pub protocol: Protocol,
    pub protocol_port: u16,
    pub connection_limit: Option<u32>,
    pub default_pool_id: Option<ResourceId>,
    pub enabled: bool,
    pub provisioning_status: ProvisioningStatus,
    pub operating_status: OperatingStatus,
}

impl Listener {
    pub fn new(
        load_balancer_id: ResourceId,
        project_id: ProjectId,
        protocol: Protocol,
        protocol_port: u16,
    ) -> Self {
        Self {
            id: ResourceId::new(),
            load_balancer_id,
            project_id,
            name: None,
            protocol,
            protocol_port,
            connection_limit: None,
            default_pool_id: None,
            enabled: true,
            provisioning_status: ProvisioningStatus::PendingCreate,
            operating_status: OperatingStatus::Offline,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListenerUpdate {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub connection_limit: Option<Option<u32>>,
    pub default_pool_id: Option<Option<ResourceId>>,
}

impl ListenerUpdate {
    pub fn apply(&self, listener: &mut Listener) {
        if let Some(name) = &self.name {
            listener.name = Some(name.clone());
        }
        if let Some(enabled) = self.enabled {
            listener.enabled = enabled;
        }
        if let Some(limit) = self.connection_limit {
            listener.connection_limit = limit;
        }
        if let Some(pool) = self.default_pool_id {
            listener.default_pool_id = pool;
        }
    }
}
