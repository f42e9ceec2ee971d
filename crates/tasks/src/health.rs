//! Signals to the health manager about amphorae a flow is working on.
//!
//! The health manager runs on its own schedule and may start a failover
//! of any amphora it watches. Deleting an amphora's health record stops
//! the watch; setting its busy flag asks the manager to hold off. Both are
//! advisory: a missing record counts as success, and neither is reverted.

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use common::ResourceId;
use repository::Repository;

use crate::error::Result;
use crate::task::Task;

/// Deletes the health record of an amphora. A missing record is success.
pub async fn disable_amphora_health<R>(repo: &R, amphora_id: ResourceId) -> Result<()>
where
    R: Repository + ?Sized,
{
    match repo.delete_amphora_health(amphora_id).await {
        Ok(()) => {
            tracing::debug!(%amphora_id, "health monitoring disabled");
            Ok(())
        }
        Err(error) if error.is_not_found() => {
            tracing::debug!(%amphora_id, "no health record, nothing to disable");
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}

/// Sets the busy flag on an amphora's health record. A missing record is
/// success.
pub async fn mark_amphora_health_busy<R>(repo: &R, amphora_id: ResourceId) -> Result<()>
where
    R: Repository + ?Sized,
{
    match repo.set_amphora_health_busy(amphora_id, true).await {
        Ok(()) => {
            tracing::debug!(%amphora_id, "health record marked busy");
            Ok(())
        }
        Err(error) if error.is_not_found() => {
            tracing::debug!(%amphora_id, "no health record, nothing to mark busy");
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}

pub struct DisableAmphoraHealthMonitoring<R> {
    repo: Arc<R>,
}

impl<R: Repository> DisableAmphoraHealthMonitoring<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for DisableAmphoraHealthMonitoring<R> {
    type Input = ResourceId;
    type Output = ();

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("disable-amphora-health-monitoring")
    }

    async fn execute(&self, amphora_id: &ResourceId) -> Result<()> {
        disable_amphora_health(self.repo.as_ref(), *amphora_id).await
    }
}

/// Disables health monitoring for every amphora of a load balancer.
pub struct DisableLbAmphoraeHealthMonitoring<R> {
    repo: Arc<R>,
}

impl<R: Repository> DisableLbAmphoraeHealthMonitoring<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for DisableLbAmphoraeHealthMonitoring<R> {
    type Input = ResourceId;
    type Output = ();

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("disable-load-balancer-amphorae-health-monitoring")
    }

    async fn execute(&self, lb_id: &ResourceId) -> Result<()> {
        for amphora in self.repo.list_amphorae(*lb_id).await? {
            disable_amphora_health(self.repo.as_ref(), amphora.id).await?;
        }
        Ok(())
    }
}

pub struct MarkAmphoraHealthBusy<R> {
    repo: Arc<R>,
}

impl<R: Repository> MarkAmphoraHealthBusy<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for MarkAmphoraHealthBusy<R> {
    type Input = ResourceId;
    type Output = ();

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("mark-amphora-health-busy")
    }

    async fn execute(&self, amphora_id: &ResourceId) -> Result<()> {
        mark_amphora_health_busy(self.repo.as_ref(), *amphora_id).await
    }
}

/// Marks the health records of every amphora of a load balancer busy.
pub struct MarkLbAmphoraeHealthBusy<R> {
    repo: Arc<R>,
}

impl<R: Repository> MarkLbAmphoraeHealthBusy<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for MarkLbAmphoraeHealthBusy<R> {
    type Input = ResourceId;
    type Output = ();

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("mark-load-balancer-amphorae-health-busy")
    }

    async fn execute(&self, lb_id: &ResourceId) -> Result<()> {
        for amphora in self.repo.list_amphorae(*lb_id).await? {
            mark_amphora_health_busy(self.repo.as_ref(), amphora.id).await?;
        }
        Ok(())
    }
}
