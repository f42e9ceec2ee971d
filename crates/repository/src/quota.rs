//! Per-project quota limits and the usage ledger they are checked against.

use std::collections::BTreeMap;

use common::ProjectId;
use domain::ResourceKind;

use crate::{RepositoryError, Result};

/// Quota limits per resource kind, with optional per-project overrides.
///
/// `None` means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotaLimits {
    defaults: BTreeMap<ResourceKind, u32>,
    projects: BTreeMap<(ProjectId, ResourceKind), Option<u32>>,
}

impl QuotaLimits {
    /// Limits with no caps at all.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Loads default limits from environment variables.
    ///
    /// Reads `QUOTA_DEFAULT_<KIND>` (for example
    /// `QUOTA_DEFAULT_LOAD_BALANCER`). Negative or missing values mean
    /// unlimited.
    pub fn from_env() -> Self {
        let mut limits = Self::unlimited();
        for kind in ResourceKind::ALL {
            let var = format!("QUOTA_DEFAULT_{}", kind.as_str().to_uppercase());
            if let Some(limit) = std::env::var(&var)
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .and_then(|v| u32::try_from(v).ok())
            {
                limits.defaults.insert(kind, limit);
            }
        }
        limits
    }

    pub fn with_default(mut self, kind: ResourceKind, limit: u32) -> Self {
        self.defaults.insert(kind, limit);
        self
    }

    /// Overrides the default for one project; `None` lifts the cap.
    pub fn with_project_limit(
        mut self,
        project_id: ProjectId,
        kind: ResourceKind,
        limit: Option<u32>,
    ) -> Self {
        self.projects.insert((project_id, kind), limit);
        self
    }

    pub fn limit(&self, project_id: &ProjectId, kind: ResourceKind) -> Option<u32> {
        match self.projects.get(&(project_id.clone(), kind)) {
            Some(limit) => *limit,
            None => self.defaults.get(&kind).copied(),
        }
    }
}

/// One operation issued through a quota session, recorded for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaOperation {
    Decrement { quantity: u32 },
    CheckQuotaMet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaCall {
    pub operation: QuotaOperation,
    pub kind: ResourceKind,
    pub project_id: ProjectId,
}

/// Usage counters plus the limits they are checked against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotaLedger {
    limits: QuotaLimits,
    in_use: BTreeMap<(ProjectId, ResourceKind), i64>,
}

impl QuotaLedger {
    pub fn new(limits: QuotaLimits) -> Self {
        Self {
            limits,
            in_use: BTreeMap::new(),
        }
    }

    pub fn in_use(&self, project_id: &ProjectId, kind: ResourceKind) -> i64 {
        self.in_use
            .get(&(project_id.clone(), kind))
            .copied()
            .unwrap_or(0)
    }

    pub fn set_in_use(&mut self, project_id: ProjectId, kind: ResourceKind, in_use: i64) {
        self.in_use.insert((project_id, kind), in_use);
    }

    pub fn decrement(
        &mut self,
        kind: ResourceKind,
        project_id: &ProjectId,
        quantity: u32,
    ) -> Result<()> {
        let in_use = self.in_use(project_id, kind);
        let remaining = in_use - i64::from(quantity);
        if remaining < 0 {
            return Err(RepositoryError::QuotaUnderflow {
                kind,
                project_id: project_id.clone(),
                in_use,
                requested: quantity,
            });
        }
        self.set_in_use(project_id.clone(), kind, remaining);
        Ok(())
    }

    /// Returns `true` if the limit is met; otherwise charges one unit.
    pub fn check_quota_met(&mut self, kind: ResourceKind, project_id: &ProjectId) -> bool {
        let in_use = self.in_use(project_id, kind);
        if let Some(limit) = self.limits.limit(project_id, kind)
            && in_use >= i64::from(limit)
        {
            return true;
        }
        self.set_in_use(project_id.clone(), kind, in_use + 1);
        false
    }
}
