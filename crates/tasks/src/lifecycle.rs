//! Provisioning-status marks for individual resources.

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use common::ResourceId;
use domain::{EntityRef, OperatingStatus, ProvisioningStatus, ResourceKind, StatusChange};
use repository::Repository;

use crate::compensation;
use crate::error::Result;
use crate::task::Task;

/// Moves one resource to a provisioning status.
///
/// The move is checked against the legal transition table first. On
/// ACTIVE, health monitors and L7 policies also get their operating status
/// derived from the admin flag; other kinds keep the operating status the
/// health manager reports. Revert marks the resource ERROR.
pub struct MarkProvisioningStatus<R> {
    repo: Arc<R>,
    kind: ResourceKind,
    status: ProvisioningStatus,
}

impl<R: Repository> MarkProvisioningStatus<R> {
    pub fn new(repo: Arc<R>, kind: ResourceKind, status: ProvisioningStatus) -> Self {
        Self { repo, kind, status }
    }

    pub fn pending_create(repo: Arc<R>, kind: ResourceKind) -> Self {
        Self::new(repo, kind, ProvisioningStatus::PendingCreate)
    }

    pub fn pending_update(repo: Arc<R>, kind: ResourceKind) -> Self {
        Self::new(repo, kind, ProvisioningStatus::PendingUpdate)
    }

    pub fn pending_delete(repo: Arc<R>, kind: ResourceKind) -> Self {
        Self::new(repo, kind, ProvisioningStatus::PendingDelete)
    }

    pub fn active(repo: Arc<R>, kind: ResourceKind) -> Self {
        Self::new(repo, kind, ProvisioningStatus::Active)
    }

    pub fn deleted(repo: Arc<R>, kind: ResourceKind) -> Self {
        Self::new(repo, kind, ProvisioningStatus::Deleted)
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for MarkProvisioningStatus<R> {
    type Input = ResourceId;
    type Output = ();

    fn name(&self) -> Cow<'static, str> {
        Cow::Owned(format!(
            "mark-{}-{}",
            self.kind,
            self.status.as_str().to_lowercase()
        ))
    }

    #[tracing::instrument(skip(self))]
    async fn execute(&self, id: &ResourceId) -> Result<()> {
        let entity = EntityRef::new(self.kind, *id);
        let current = self.repo.get_status(entity).await?;
        entity.check_transition(current.provisioning_status, self.status)?;

        let mut change = StatusChange::provisioning(self.status);
        if self.status == ProvisioningStatus::Active && self.kind.derives_operating_status() {
            change = change.with_operating(OperatingStatus::from_enabled(current.enabled));
        }
        self.repo.set_status(entity, change).await?;
        tracing::debug!(%entity, status = %self.status, "provisioning status marked");
        Ok(())
    }

    async fn compensate(&self, id: &ResourceId, _output: &()) -> Result<()> {
        let entity = EntityRef::new(self.kind, *id);
        compensation::mark_error(self.repo.as_ref(), entity, &self.name()).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use common::ProjectId;
    use domain::{HealthMonitor, LoadBalancer, MonitorType, Pool};
    use repository::InMemoryRepository;

    use super::*;
    use crate::error::TaskError;
    use crate::task::Outcome;

    async fn repo_with_monitor(enabled: bool) -> (Arc<InMemoryRepository>, ResourceId) {
        let repo = Arc::new(InMemoryRepository::new());
        let lb = LoadBalancer::new(ProjectId::new("p"));
        let pool = Pool::new(lb.id, ProjectId::new("p"));
        let mut hm = HealthMonitor::new(pool.id, ProjectId::new("p"), MonitorType::Tcp);
        hm.enabled = enabled;
        let id = hm.id;
        repo.insert_load_balancer(lb).await;
        repo.insert_pool(pool).await;
        repo.insert_health_monitor(hm).await;
        (repo, id)
    }

    #[tokio::test]
    async fn test_active_derives_operating_status_from_enabled() {
        for (enabled, expected) in [(true, OperatingStatus::Online), (false, OperatingStatus::Offline)] {
            let (repo, id) = repo_with_monitor(enabled).await;
            let task = MarkProvisioningStatus::active(repo.clone(), ResourceKind::HealthMonitor);
            task.execute(&id).await.unwrap();

            let status = repo.get_status(EntityRef::health_monitor(id)).await.unwrap();
            assert_eq!(status.provisioning_status, ProvisioningStatus::Active);
            assert_eq!(status.operating_status, Some(expected));
        }
    }

    #[tokio::test]
    async fn test_illegal_transition_is_rejected() {
        let (repo, id) = repo_with_monitor(true).await;
        MarkProvisioningStatus::pending_delete(repo.clone(), ResourceKind::HealthMonitor)
            .execute(&id)
            .await
            .unwrap();

        let err = MarkProvisioningStatus::pending_update(repo.clone(), ResourceKind::HealthMonitor)
            .execute(&id)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Domain(_)));
    }

    #[tokio::test]
    async fn test_revert_after_success_marks_error() {
        let (repo, id) = repo_with_monitor(true).await;
        let task = MarkProvisioningStatus::active(repo.clone(), ResourceKind::HealthMonitor);
        task.execute(&id).await.unwrap();
        task.revert(&id, Outcome::Succeeded(&())).await;

        let status = repo.get_status(EntityRef::health_monitor(id)).await.unwrap();
        assert_eq!(status.provisioning_status, ProvisioningStatus::Error);
    }

    #[test]
    fn test_name_includes_kind_and_status() {
        let task = MarkProvisioningStatus::pending_delete(
            Arc::new(InMemoryRepository::new()),
            ResourceKind::L7Policy,
        );
        assert_eq!(task.name(), "mark-l7policy-pending_delete");
    }
}
