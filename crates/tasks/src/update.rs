//! Field updates of existing resources.

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use common::ResourceId;
use domain::{EntityRef, OperatingStatus, ResourceKind, ResourceUpdate, StatusChange};
use repository::Repository;

use crate::compensation;
use crate::error::{Result, TaskError};
use crate::task::Task;

/// A typed update addressed to one resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceUpdateRequest {
    pub id: ResourceId,
    pub update: ResourceUpdate,
}

impl ResourceUpdateRequest {
    pub fn new(id: ResourceId, update: ResourceUpdate) -> Self {
        Self { id, update }
    }

    pub fn entity(&self) -> EntityRef {
        EntityRef::new(self.update.kind(), self.id)
    }
}

/// Applies a typed update to a resource of one kind. Revert marks the
/// resource ERROR, since the previous field values are not kept.
pub struct UpdateResourceInDb<R> {
    repo: Arc<R>,
    kind: ResourceKind,
}

impl<R: Repository> UpdateResourceInDb<R> {
    pub fn new(repo: Arc<R>, kind: ResourceKind) -> Self {
        Self { repo, kind }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for UpdateResourceInDb<R> {
    type Input = ResourceUpdateRequest;
    type Output = ();

    fn name(&self) -> Cow<'static, str> {
        Cow::Owned(format!("update-{}-in-db", self.kind))
    }

    #[tracing::instrument(skip(self, request), fields(entity = %request.entity()))]
    async fn execute(&self, request: &ResourceUpdateRequest) -> Result<()> {
        if request.update.kind() != self.kind {
            return Err(TaskError::InvalidInput(format!(
                "expected a {} update, got a {} update",
                self.kind,
                request.update.kind()
            )));
        }
        self.repo
            .update_resource(request.id, request.update.clone())
            .await?;
        tracing::debug!("resource updated");
        Ok(())
    }

    async fn compensate(&self, request: &ResourceUpdateRequest, _output: &()) -> Result<()> {
        compensation::mark_error(self.repo.as_ref(), request.entity(), &self.name()).await;
        Ok(())
    }
}

/// A member's operating status before a pool-wide update changed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorOperatingStatus {
    pub member_id: ResourceId,
    pub operating_status: OperatingStatus,
}

/// Sets the operating status of every member of a pool and returns the
/// previous status of each member it changed.
///
/// Revert puts those members back. If no member changed there is nothing
/// to put back, and the pool is marked ERROR instead.
pub struct UpdatePoolMembersOperatingStatus<R> {
    repo: Arc<R>,
    status: OperatingStatus,
}

impl<R: Repository> UpdatePoolMembersOperatingStatus<R> {
    pub fn new(repo: Arc<R>, status: OperatingStatus) -> Self {
        Self { repo, status }
    }

    async fn restore(&self, prior: PriorOperatingStatus) -> Result<()> {
        let entity = EntityRef::member(prior.member_id);
        let current = match self.repo.get_status(entity).await {
            Ok(current) => current,
            Err(error) if error.is_not_found() => return Ok(()),
            Err(error) => return Err(error.into()),
        };
        let change = StatusChange::provisioning(current.provisioning_status)
            .with_operating(prior.operating_status);
        self.repo.set_status(entity, change).await?;
        Ok(())
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for UpdatePoolMembersOperatingStatus<R> {
    type Input = ResourceId;
    type Output = Vec<PriorOperatingStatus>;

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("update-pool-members-operating-status")
    }

    async fn execute(&self, pool_id: &ResourceId) -> Result<Vec<PriorOperatingStatus>> {
        let changed: Vec<PriorOperatingStatus> = self
            .repo
            .get_pool_node(*pool_id)
            .await?
            .members
            .into_iter()
            .filter(|member| member.operating_status != self.status)
            .map(|member| PriorOperatingStatus {
                member_id: member.id,
                operating_status: member.operating_status,
            })
            .collect();
        tracing::debug!(
            %pool_id,
            status = %self.status,
            changed = changed.len(),
            "updating member operating status"
        );
        self.repo
            .update_pool_members_operating_status(*pool_id, self.status)
            .await?;
        Ok(changed)
    }

    async fn compensate(
        &self,
        pool_id: &ResourceId,
        changed: &Vec<PriorOperatingStatus>,
    ) -> Result<()> {
        let name = self.name();
        if changed.is_empty() {
            compensation::mark_error(self.repo.as_ref(), EntityRef::pool(*pool_id), &name).await;
            return Ok(());
        }
        tracing::warn!(%pool_id, members = changed.len(), "restoring member operating status");
        for prior in changed {
            compensation::best_effort(&name, self.restore(*prior)).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use common::ProjectId;
    use domain::{
        LoadBalancer, LoadBalancerUpdate, Member, MemberUpdate, Pool, ProvisioningStatus,
    };
    use repository::InMemoryRepository;

    use super::*;
    use crate::task::Outcome;

    #[tokio::test]
    async fn test_update_rejects_mismatched_kind() {
        let repo = Arc::new(InMemoryRepository::new());
        let task = UpdateResourceInDb::new(repo, ResourceKind::Pool);
        let request = ResourceUpdateRequest::new(
            ResourceId::new(),
            ResourceUpdate::LoadBalancer(LoadBalancerUpdate::default()),
        );

        let err = task.execute(&request).await.unwrap_err();
        assert!(matches!(err, TaskError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_revert_marks_updated_resource_error() {
        let repo = Arc::new(InMemoryRepository::new());
        let lb = LoadBalancer::new(ProjectId::new("p"));
        let pool = Pool::new(lb.id, ProjectId::new("p"));
        let member = Member::new(pool.id, ProjectId::new("p"), IpAddr::V4(Ipv4Addr::LOCALHOST), 8080);
        let member_id = member.id;
        repo.insert_pool(pool).await;
        repo.insert_member(member).await;

        let task = UpdateResourceInDb::new(repo.clone(), ResourceKind::Member);
        let request = ResourceUpdateRequest::new(
            member_id,
            ResourceUpdate::Member(MemberUpdate {
                weight: Some(5),
                ..MemberUpdate::default()
            }),
        );
        task.execute(&request).await.unwrap();
        task.revert(&request, Outcome::Succeeded(&())).await;

        let status = repo.get_status(EntityRef::member(member_id)).await.unwrap();
        assert_eq!(status.provisioning_status, ProvisioningStatus::Error);
    }

    #[tokio::test]
    async fn test_members_operating_status_follows_pool() {
        let repo = Arc::new(InMemoryRepository::new());
        let pool = Pool::new(ResourceId::new(), ProjectId::new("p"));
        let pool_id = pool.id;
        let member = Member::new(pool_id, ProjectId::new("p"), IpAddr::V4(Ipv4Addr::LOCALHOST), 80);
        let member_id = member.id;
        repo.insert_pool(pool).await;
        repo.insert_member(member).await;

        UpdatePoolMembersOperatingStatus::new(repo.clone(), OperatingStatus::Offline)
            .execute(&pool_id)
            .await
            .unwrap();

        let status = repo.get_status(EntityRef::member(member_id)).await.unwrap();
        assert_eq!(status.operating_status, Some(OperatingStatus::Offline));
    }

    #[tokio::test]
    async fn test_members_operating_status_revert_restores_prior_values() {
        let repo = Arc::new(InMemoryRepository::new());
        let pool = Pool::new(ResourceId::new(), ProjectId::new("p"));
        let pool_id = pool.id;
        repo.insert_pool(pool).await;
        let localhost = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let mut online = Member::new(pool_id, ProjectId::new("p"), localhost, 80);
        online.operating_status = OperatingStatus::Online;
        let mut offline = Member::new(pool_id, ProjectId::new("p"), localhost, 81);
        offline.operating_status = OperatingStatus::Offline;
        repo.insert_member(online.clone()).await;
        repo.insert_member(offline.clone()).await;

        let task = UpdatePoolMembersOperatingStatus::new(repo.clone(), OperatingStatus::Offline);
        let changed = task.execute(&pool_id).await.unwrap();
        assert_eq!(
            changed,
            vec![PriorOperatingStatus {
                member_id: online.id,
                operating_status: OperatingStatus::Online,
            }]
        );

        task.revert(&pool_id, Outcome::Succeeded(&changed)).await;
        let restored = repo.get_status(EntityRef::member(online.id)).await.unwrap();
        assert_eq!(restored.operating_status, Some(OperatingStatus::Online));
        assert_eq!(restored.provisioning_status, online.provisioning_status);
        let untouched = repo.get_status(EntityRef::member(offline.id)).await.unwrap();
        assert_eq!(untouched.operating_status, Some(OperatingStatus::Offline));
    }

    #[tokio::test]
    async fn test_members_operating_status_revert_without_changes_marks_pool_error() {
        let repo = Arc::new(InMemoryRepository::new());
        let pool = Pool::new(ResourceId::new(), ProjectId::new("p"));
        let pool_id = pool.id;
        repo.insert_pool(pool).await;

        let task = UpdatePoolMembersOperatingStatus::new(repo.clone(), OperatingStatus::Online);
        let changed = task.execute(&pool_id).await.unwrap();
        assert!(changed.is_empty());

        task.revert(&pool_id, Outcome::Succeeded(&changed)).await;
        let status = repo.get_status(EntityRef::pool(pool_id)).await.unwrap();
        assert_eq!(status.provisioning_status, ProvisioningStatus::Error);
    }
}
