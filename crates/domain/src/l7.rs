//! Layer 7 policies and rules attached to listeners.

use common::{ProjectId, ResourceId};
use serde::{Deserialize, Serialize};

use crate::status::{OperatingStatus, ProvisioningStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum L7PolicyAction {
    Reject,
    RedirectToUrl,
    RedirectToPool,
    RedirectPrefix,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct L7Policy {
    pub id: ResourceId,
    pub listener_id: ResourceId,
    pub project_id: ProjectId,
    pub name: Option<String>,
    pub action: L7PolicyAction,
    pub position: u32,
    pub redirect_pool_id: Option<ResourceId>,
    pub redirect_url: Option<String>,
    pub enabled: bool,
    pub provisioning_status: ProvisioningStatus,
    pub operating_status: OperatingStatus,
}

impl L7Policy {
    pub fn new(listener_id: ResourceId, project_id: ProjectId, action: L7PolicyAction) -> Self {
        Self {
            id: ResourceId::new(),
            listener_id,
            project_id,
            name: None,
            action,
            position: 1,
            redirect_pool_id: None,
            redirect_url: None,
            enabled: true,
            provisioning_status: ProvisioningStatus::PendingCreate,
            operating_status: OperatingStatus::Offline,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct L7PolicyUpdate {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub action: Option<L7PolicyAction>,
    pub position: Option<u32>,
    pub redirect_pool_id: Option<Option<ResourceId>>,
    pub redirect_url: Option<Option<String>>,
}

impl L7PolicyUpdate {
    pub fn apply(&self, policy: &mut L7Policy) {
        if let Some(name) = &self.name {
            policy.name = Some(name.clone());
        }
        if let Some(enabled) = self.enabled {
            policy.enabled = enabled;
        }
        if let Some(action) = self.action {
            policy.action = action;
        }
        if let Some(position) = self.position {
            policy.position = position;
        }
        if let Some(pool) = self.redirect_pool_id {
            policy.redirect_pool_id = pool;
        }
        if let Some(url) = &self.redirect_url {
            policy.redirect_url = url.clone();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum L7RuleType {
    HostName,
    Path,
    FileType,
    Header,
    Cookie,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompareType {
    Regex,
    StartsWith,
    EndsWith,
    Contains,
    EqualTo,
}

/// An L7 rule. Rules have no operating status of their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct L7Rule {
    pub id: ResourceId,
    pub l7policy_id: ResourceId,
    pub project_id: ProjectId,
    pub rule_type: L7RuleType,
    pub compare_type: CompareType,
    pub key: Option<String>,
    pub value: String,
    pub invert: bool,
    pub enabled: bool,
    pub provisioning_status: ProvisioningStatus,
}

impl L7Rule {
    pub fn new(
        l7policy_id: ResourceId,
        project_id: ProjectId,
        rule_type: L7RuleType,
        compare_type: CompareType,
        value: impl Into<String>,
    ) -> Self {
        Self {
            id: ResourceId::new(),
            l7policy_id,
            project_id,
            rule_type,
            compare_type,
            key: None,
            value: value.into(),
            invert: false,
            enabled: true,
            provisioning_status: ProvisioningStatus::PendingCreate,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct L7RuleUpdate {
    pub enabled: Option<bool>,
    pub compare_type: Option<CompareType>,
    pub key: Option<Option<String>>,
    pub value: Option<String>,
    pub invert: Option<bool>,
}

impl L7RuleUpdate {
    pub fn apply(&self, rule: &mut L7Rule) {
        if let Some(enabled) = self.enabled {
            rule.enabled = enabled;
        }
        if let Some(compare_type) = self.compare_type {
            rule.compare_type = compare_type;
        }
        if let Some(key) = &self.key {
            rule.key = key.clone();
        }
        if let Some(value) = &self.value {
            rule.value = value.clone();
        }
        if let Some(invert) = self.invert {
            rule.invert = invert;
        }
    }
}
