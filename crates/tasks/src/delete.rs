//! Resource deletes.
//!
//! A delete whose target is already gone counts as done. A delete cannot be
//! undone, so reverting one marks the resource ERROR when its row is still
//! there and otherwise only records that nothing could be compensated.

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use common::ResourceId;
use domain::{EntityRef, ResourceKind};
use repository::{Repository, RepositoryExt};

use crate::error::Result;
use crate::task::Task;

async fn delete_if_present<R>(repo: &R, entity: EntityRef) -> Result<()>
where
    R: Repository + ?Sized,
{
    match repo.delete_resource(entity).await {
        Ok(()) => {
            tracing::debug!(%entity, "deleted");
            Ok(())
        }
        Err(error) if error.is_not_found() => {
            tracing::debug!(%entity, "already deleted");
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}

async fn compensate_delete<R>(repo: &R, entity: EntityRef, task: &str) -> Result<()>
where
    R: Repository + ?Sized,
{
    tracing::warn!(task, %entity, "reverting delete");
    match repo.mark_error(entity).await {
        Ok(()) => Ok(()),
        Err(error) if error.is_not_found() => {
            metrics::counter!("delete_uncompensated_total", "kind" => entity.kind.as_str())
                .increment(1);
            tracing::warn!(task, %entity, "resource already removed, delete cannot be compensated");
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}

/// Deletes one resource; the storage layer removes its children with it.
pub struct DeleteResourceInDb<R> {
    repo: Arc<R>,
    kind: ResourceKind,
}

impl<R: Repository> DeleteResourceInDb<R> {
    pub fn new(repo: Arc<R>, kind: ResourceKind) -> Self {
        Self { repo, kind }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for DeleteResourceInDb<R> {
    type Input = ResourceId;
    type Output = ();

    fn name(&self) -> Cow<'static, str> {
        Cow::Owned(format!("delete-{}-in-db", self.kind))
    }

    async fn execute(&self, id: &ResourceId) -> Result<()> {
        delete_if_present(self.repo.as_ref(), EntityRef::new(self.kind, *id)).await
    }

    async fn compensate(&self, id: &ResourceId, _output: &()) -> Result<()> {
        compensate_delete(self.repo.as_ref(), EntityRef::new(self.kind, *id), &self.name()).await
    }
}

/// Deletes the health monitor of a pool, if it has one.
///
/// Returns the id of the monitor that was targeted.
pub struct DeleteHealthMonitorByPool<R> {
    repo: Arc<R>,
}

impl<R: Repository> DeleteHealthMonitorByPool<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for DeleteHealthMonitorByPool<R> {
    type Input = ResourceId;
    type Output = Option<ResourceId>;

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("delete-health-monitor-by-pool")
    }

    async fn execute(&self, pool_id: &ResourceId) -> Result<Option<ResourceId>> {
        let node = match self.repo.get_pool_node(*pool_id).await {
            Ok(node) => node,
            Err(error) if error.is_not_found() => {
                tracing::debug!(%pool_id, "pool already deleted");
                return Ok(None);
            }
            Err(error) => return Err(error.into()),
        };
        let Some(monitor) = node.health_monitor else {
            tracing::debug!(%pool_id, "pool has no health monitor");
            return Ok(None);
        };
        delete_if_present(self.repo.as_ref(), EntityRef::health_monitor(monitor.id)).await?;
        Ok(Some(monitor.id))
    }

    async fn compensate(&self, _pool_id: &ResourceId, monitor: &Option<ResourceId>) -> Result<()> {
        match monitor {
            Some(id) => {
                compensate_delete(self.repo.as_ref(), EntityRef::health_monitor(*id), &self.name())
                    .await
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use common::ProjectId;
    use domain::{HealthMonitor, MonitorType, Pool, ProvisioningStatus};
    use repository::InMemoryRepository;

    use super::*;
    use crate::task::Outcome;

    #[tokio::test]
    async fn test_delete_of_missing_resource_succeeds() {
        let repo = Arc::new(InMemoryRepository::new());
        let task = DeleteResourceInDb::new(repo, ResourceKind::Listener);
        task.execute(&ResourceId::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_pool_without_monitor_is_a_no_op() {
        let repo = Arc::new(InMemoryRepository::new());
        let pool = Pool::new(ResourceId::new(), ProjectId::new("p"));
        let pool_id = pool.id;
        repo.insert_pool(pool).await;

        let task = DeleteHealthMonitorByPool::new(repo);
        assert_eq!(task.execute(&pool_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_revert_of_completed_delete_does_not_fail() {
        let repo = Arc::new(InMemoryRepository::new());
        let pool = Pool::new(ResourceId::new(), ProjectId::new("p"));
        let hm = HealthMonitor::new(pool.id, ProjectId::new("p"), MonitorType::Ping);
        let (pool_id, hm_id) = (pool.id, hm.id);
        repo.insert_pool(pool).await;
        repo.insert_health_monitor(hm).await;

        let task = DeleteHealthMonitorByPool::new(repo.clone());
        let deleted = task.execute(&pool_id).await.unwrap();
        assert_eq!(deleted, Some(hm_id));
        assert!(!repo.contains(EntityRef::health_monitor(hm_id)).await);

        let result = task.compensate(&pool_id, &deleted).await;
        assert!(result.is_ok());
        task.revert(&pool_id, Outcome::Succeeded(&deleted)).await;
    }

    #[tokio::test]
    async fn test_revert_marks_surviving_row_error() {
        let repo = Arc::new(InMemoryRepository::new());
        let pool = Pool::new(ResourceId::new(), ProjectId::new("p"));
        let pool_id = pool.id;
        repo.insert_pool(pool).await;

        let task = DeleteResourceInDb::new(repo.clone(), ResourceKind::Pool);
        task.revert(&pool_id, Outcome::Succeeded(&())).await;

        let status = repo.get_status(EntityRef::pool(pool_id)).await.unwrap();
        assert_eq!(status.provisioning_status, ProvisioningStatus::Error);
    }
}
