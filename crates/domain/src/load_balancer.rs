//! Load balancers, their VIP and VRRP group.

use std::net::IpAddr;
use std::str::FromStr;

use common::{ProjectId, ResourceId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::status::{OperatingStatus, ProvisioningStatus};

/// Virtual IP fronting a load balancer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vip {
    pub ip_address: Option<IpAddr>,
    pub port_id: Option<String>,
    pub subnet_id: Option<String>,
    pub network_id: Option<String>,
}

/// Partial update of a VIP.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VipUpdate {
    pub ip_address: Option<IpAddr>,
    pub port_id: Option<String>,
    pub subnet_id: Option<String>,
    pub network_id: Option<String>,
}

impl VipUpdate {
    pub fn apply(&self, vip: &mut Vip) {
        if let Some(ip) = self.ip_address {
            vip.ip_address = Some(ip);
        }
        if let Some(port_id) = &self.port_id {
            vip.port_id = Some(port_id.clone());
        }
        if let Some(subnet_id) = &self.subnet_id {
            vip.subnet_id = Some(subnet_id.clone());
        }
        if let Some(network_id) = &self.network_id {
            vip.network_id = Some(network_id.clone());
        }
    }
}

impl From<Vip> for VipUpdate {
    fn from(vip: Vip) -> Self {
        Self {
            ip_address: vip.ip_address,
            port_id: vip.port_id,
            subnet_id: vip.subnet_id,
            network_id: vip.network_id,
        }
    }
}

/// Root of a resource tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub id: ResourceId,
    pub project_id: ProjectId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub enabled: bool,
    pub provisioning_status: ProvisioningStatus,
    pub operating_status: OperatingStatus,
    pub server_group_id: Option<String>,
    pub vip: Vip,
}

impl LoadBalancer {
    /// A freshly requested, enabled load balancer.
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            id: ResourceId::new(),
            project_id,
            name: None,
            description: None,
            enabled: true,
            provisioning_status: ProvisioningStatus::PendingCreate,
            operating_status: OperatingStatus::Offline,
            server_group_id: None,
            vip: Vip::default(),
        }
    }
}

/// Partial update of a load balancer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
    pub server_group_id: Option<Option<String>>,
    /// Written to the VIP record rather than the load balancer row.
    pub vip: Option<VipUpdate>,
}

impl LoadBalancerUpdate {
    pub fn apply(&self, lb: &mut LoadBalancer) {
        if let Some(name) = &self.name {
            lb.name = Some(name.clone());
        }
        if let Some(description) = &self.description {
            lb.description = Some(description.clone());
        }
        if let Some(enabled) = self.enabled {
            lb.enabled = enabled;
        }
        if let Some(server_group_id) = &self.server_group_id {
            lb.server_group_id = server_group_id.clone();
        }
        if let Some(vip) = &self.vip {
            vip.apply(&mut lb.vip);
        }
    }
}

/// VRRP authentication scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VrrpAuthType {
    #[default]
    Pass,
    Ah,
}

impl VrrpAuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VrrpAuthType::Pass => "PASS",
            VrrpAuthType::Ah => "AH",
        }
    }
}

impl std::fmt::Display for VrrpAuthType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VrrpAuthType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PASS" => Ok(VrrpAuthType::Pass),
            "AH" => Ok(VrrpAuthType::Ah),
            other => Err(DomainError::UnknownAuthType(other.to_string())),
        }
    }
}

/// VRRP group shared by the amphorae of an active/standby load balancer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VrrpGroup {
    pub load_balancer_id: ResourceId,
    pub name: String,
    pub auth_type: VrrpAuthType,
    pub auth_pass: String,
    pub advert_int: u32,
}
