//! Load balancer tasks: terminal marks, VIP and server group bookkeeping,
//! VRRP group creation and read-only lookups.

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use common::ResourceId;
use domain::{
    EntityRef, Listener, LoadBalancer, LoadBalancerUpdate, ProvisioningStatus, ResourceUpdate, Vip,
    VipUpdate, VrrpGroup,
};
use repository::{Repository, RepositoryError, RepositoryExt};
use uuid::Uuid;

use crate::compensation;
use crate::config::TaskConfig;
use crate::error::{Result, TaskError};
use crate::propagate::StatusPropagator;
use crate::task::Task;

const VRRP_AUTH_PASS_LEN: usize = 7;

/// A listener together with the load balancer that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerRef {
    pub listener_id: ResourceId,
    pub load_balancer_id: ResourceId,
}

impl From<&Listener> for ListenerRef {
    fn from(listener: &Listener) -> Self {
        Self {
            listener_id: listener.id,
            load_balancer_id: listener.load_balancer_id,
        }
    }
}

/// Marks a load balancer ACTIVE, optionally with everything below it.
///
/// With `mark_subobjects`, listeners, policies, rules, pools, health
/// monitors and members are marked first and the load balancer last. If
/// any of those writes fails, the rest of the walk still runs, but the task
/// then drives the whole tree, load balancer included, to ERROR and fails.
/// A partially ACTIVE tree is never left behind: it is all ACTIVE or all
/// ERROR.
///
/// Revert marks the load balancer ERROR, and the whole tree when
/// `mark_subobjects` is set.
pub struct MarkLbActive<R> {
    repo: Arc<R>,
    propagator: StatusPropagator<R>,
    mark_subobjects: bool,
}

impl<R: Repository> MarkLbActive<R> {
    pub fn new(repo: Arc<R>, mark_subobjects: bool) -> Self {
        Self {
            propagator: StatusPropagator::new(repo.clone()),
            repo,
            mark_subobjects,
        }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for MarkLbActive<R> {
    type Input = ResourceId;
    type Output = ();

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("mark-load-balancer-active")
    }

    #[tracing::instrument(skip(self))]
    async fn execute(&self, lb_id: &ResourceId) -> Result<()> {
        let load_balancer = EntityRef::load_balancer(*lb_id);
        if !self.mark_subobjects {
            self.repo
                .set_provisioning_status(load_balancer, ProvisioningStatus::Active)
                .await?;
            tracing::info!(load_balancer_id = %lb_id, "load balancer ACTIVE");
            return Ok(());
        }

        let tree = self.repo.get_load_balancer_tree(*lb_id).await?;
        let report = self
            .propagator
            .mark_subtree(&tree, ProvisioningStatus::Active)
            .await;
        let outcome = if report.is_complete() {
            self.repo
                .set_provisioning_status(load_balancer, ProvisioningStatus::Active)
                .await
                .map_err(TaskError::from)
        } else {
            Err(TaskError::Propagation {
                load_balancer_id: *lb_id,
                failed: report.failed.len(),
                attempted: report.attempted(),
            })
        };

        if let Err(error) = outcome {
            tracing::error!(
                load_balancer_id = %lb_id,
                %error,
                "could not mark the tree ACTIVE, marking it ERROR"
            );
            let converge = self
                .propagator
                .mark_tree(&tree, ProvisioningStatus::Error)
                .await;
            if !converge.is_complete() {
                tracing::error!(
                    load_balancer_id = %lb_id,
                    failed = converge.failed.len(),
                    "resources left without ERROR status"
                );
            }
            return Err(error);
        }
        tracing::info!(load_balancer_id = %lb_id, "load balancer and subobjects ACTIVE");
        Ok(())
    }

    async fn compensate(&self, lb_id: &ResourceId, _output: &()) -> Result<()> {
        if self.mark_subobjects {
            tracing::warn!(load_balancer_id = %lb_id, "reverting load balancer and subobjects to ERROR");
            let tree = self.repo.get_load_balancer_tree(*lb_id).await?;
            let report = self
                .propagator
                .mark_tree(&tree, ProvisioningStatus::Error)
                .await;
            if !report.is_complete() {
                return Err(TaskError::Propagation {
                    load_balancer_id: *lb_id,
                    failed: report.failed.len(),
                    attempted: report.attempted(),
                });
            }
            return Ok(());
        }
        compensation::mark_error(self.repo.as_ref(), EntityRef::load_balancer(*lb_id), &self.name())
            .await;
        Ok(())
    }
}

/// Marks the load balancer owning a listener ACTIVE. Revert marks it ERROR.
pub struct MarkLbActiveByListener<R> {
    repo: Arc<R>,
}

impl<R: Repository> MarkLbActiveByListener<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for MarkLbActiveByListener<R> {
    type Input = ListenerRef;
    type Output = ();

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("mark-load-balancer-active-by-listener")
    }

    async fn execute(&self, listener: &ListenerRef) -> Result<()> {
        self.repo
            .set_provisioning_status(
                EntityRef::load_balancer(listener.load_balancer_id),
                ProvisioningStatus::Active,
            )
            .await?;
        tracing::info!(
            load_balancer_id = %listener.load_balancer_id,
            listener_id = %listener.listener_id,
            "load balancer ACTIVE"
        );
        Ok(())
    }

    async fn compensate(&self, listener: &ListenerRef, _output: &()) -> Result<()> {
        let entity = EntityRef::load_balancer(listener.load_balancer_id);
        compensation::mark_error(self.repo.as_ref(), entity, &self.name()).await;
        Ok(())
    }
}

/// Input of [`MarkLbAndListenersActive`]. Without an explicit load balancer
/// id, the first listener's load balancer is used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LbAndListeners {
    pub load_balancer_id: Option<ResourceId>,
    pub listeners: Vec<ListenerRef>,
}

impl LbAndListeners {
    pub fn load_balancer_id(&self) -> Option<ResourceId> {
        self.load_balancer_id
            .or_else(|| self.listeners.first().map(|l| l.load_balancer_id))
    }
}

/// Marks a load balancer ACTIVE and its listeners ACTIVE unless they are
/// already ERROR. Revert marks each of them ERROR independently.
pub struct MarkLbAndListenersActive<R> {
    repo: Arc<R>,
}

impl<R: Repository> MarkLbAndListenersActive<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for MarkLbAndListenersActive<R> {
    type Input = LbAndListeners;
    type Output = ();

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("mark-load-balancer-and-listeners-active")
    }

    async fn execute(&self, input: &LbAndListeners) -> Result<()> {
        for listener in &input.listeners {
            let status = self
                .repo
                .activate_unless_error(EntityRef::listener(listener.listener_id))
                .await?;
            tracing::debug!(listener_id = %listener.listener_id, %status, "listener marked");
        }
        if let Some(lb_id) = input.load_balancer_id() {
            self.repo
                .set_provisioning_status(EntityRef::load_balancer(lb_id), ProvisioningStatus::Active)
                .await?;
            tracing::info!(load_balancer_id = %lb_id, "load balancer ACTIVE");
        }
        Ok(())
    }

    async fn compensate(&self, input: &LbAndListeners, _output: &()) -> Result<()> {
        let name = self.name();
        if let Some(lb_id) = input.load_balancer_id() {
            compensation::mark_error(self.repo.as_ref(), EntityRef::load_balancer(lb_id), &name)
                .await;
        }
        for listener in &input.listeners {
            compensation::mark_error(
                self.repo.as_ref(),
                EntityRef::listener(listener.listener_id),
                &name,
            )
            .await;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerGroupAssignment {
    pub load_balancer_id: ResourceId,
    pub server_group_id: String,
}

/// Records the compute server group of a load balancer. Revert clears it.
pub struct UpdateLbServerGroup<R> {
    repo: Arc<R>,
}

impl<R: Repository> UpdateLbServerGroup<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    async fn write(&self, lb_id: ResourceId, server_group_id: Option<String>) -> Result<()> {
        let update = LoadBalancerUpdate {
            server_group_id: Some(server_group_id),
            ..LoadBalancerUpdate::default()
        };
        self.repo
            .update_resource(lb_id, ResourceUpdate::LoadBalancer(update))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for UpdateLbServerGroup<R> {
    type Input = ServerGroupAssignment;
    type Output = ();

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("update-load-balancer-server-group")
    }

    async fn execute(&self, input: &ServerGroupAssignment) -> Result<()> {
        tracing::debug!(
            load_balancer_id = %input.load_balancer_id,
            server_group_id = %input.server_group_id,
            "setting server group"
        );
        self.write(input.load_balancer_id, Some(input.server_group_id.clone()))
            .await
    }

    async fn compensate(&self, input: &ServerGroupAssignment, _output: &()) -> Result<()> {
        tracing::warn!(load_balancer_id = %input.load_balancer_id, "clearing server group");
        self.write(input.load_balancer_id, None).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VipAllocation {
    pub load_balancer_id: ResourceId,
    pub vip: Vip,
}

/// Stores the allocated VIP and returns the reloaded load balancer.
pub struct UpdateVipAfterAllocation<R> {
    repo: Arc<R>,
}

impl<R: Repository> UpdateVipAfterAllocation<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for UpdateVipAfterAllocation<R> {
    type Input = VipAllocation;
    type Output = LoadBalancer;

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("update-vip-after-allocation")
    }

    async fn execute(&self, input: &VipAllocation) -> Result<LoadBalancer> {
        let update = LoadBalancerUpdate {
            vip: Some(VipUpdate::from(input.vip.clone())),
            ..LoadBalancerUpdate::default()
        };
        self.repo
            .update_resource(input.load_balancer_id, ResourceUpdate::LoadBalancer(update))
            .await?;
        Ok(self.repo.get_load_balancer(input.load_balancer_id).await?)
    }

    async fn compensate(&self, input: &VipAllocation, _output: &LoadBalancer) -> Result<()> {
        let entity = EntityRef::load_balancer(input.load_balancer_id);
        compensation::mark_error(self.repo.as_ref(), entity, &self.name()).await;
        Ok(())
    }
}

pub struct ReloadLoadBalancer<R> {
    repo: Arc<R>,
}

impl<R: Repository> ReloadLoadBalancer<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for ReloadLoadBalancer<R> {
    type Input = ResourceId;
    type Output = LoadBalancer;

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("reload-load-balancer")
    }

    async fn execute(&self, lb_id: &ResourceId) -> Result<LoadBalancer> {
        tracing::debug!(load_balancer_id = %lb_id, "reloading load balancer");
        Ok(self.repo.get_load_balancer(*lb_id).await?)
    }
}

pub struct GetListenersFromLoadBalancer<R> {
    repo: Arc<R>,
}

impl<R: Repository> GetListenersFromLoadBalancer<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for GetListenersFromLoadBalancer<R> {
    type Input = ResourceId;
    type Output = Vec<Listener>;

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("get-listeners-from-load-balancer")
    }

    async fn execute(&self, lb_id: &ResourceId) -> Result<Vec<Listener>> {
        let tree = self.repo.get_load_balancer_tree(*lb_id).await?;
        Ok(tree.listeners.into_iter().map(|node| node.listener).collect())
    }
}

pub struct GetVipFromLoadBalancer<R> {
    repo: Arc<R>,
}

impl<R: Repository> GetVipFromLoadBalancer<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for GetVipFromLoadBalancer<R> {
    type Input = ResourceId;
    type Output = Vip;

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("get-vip-from-load-balancer")
    }

    async fn execute(&self, lb_id: &ResourceId) -> Result<Vip> {
        Ok(self.repo.get_load_balancer(*lb_id).await?.vip)
    }
}

/// Creates the VRRP group of an active/standby load balancer.
///
/// The group is named after the load balancer id without dashes and gets
/// a fresh seven-character password. A group that already exists is left
/// alone. Returns whether this task created the group.
///
/// Revert deletes a group this task created. When the group predates the
/// task there is nothing of its own to undo, so the load balancer is
/// marked ERROR instead.
pub struct CreateVrrpGroupForLb<R> {
    repo: Arc<R>,
    config: Arc<TaskConfig>,
}

impl<R: Repository> CreateVrrpGroupForLb<R> {
    pub fn new(repo: Arc<R>, config: Arc<TaskConfig>) -> Self {
        Self { repo, config }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for CreateVrrpGroupForLb<R> {
    type Input = ResourceId;
    type Output = bool;

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("create-vrrp-group-for-load-balancer")
    }

    async fn execute(&self, lb_id: &ResourceId) -> Result<bool> {
        let group = VrrpGroup {
            load_balancer_id: *lb_id,
            name: lb_id.simple(),
            auth_type: self.config.vrrp_auth_type,
            auth_pass: Uuid::new_v4()
                .simple()
                .to_string()
                .chars()
                .take(VRRP_AUTH_PASS_LEN)
                .collect(),
            advert_int: self.config.vrrp_advert_int,
        };
        match self.repo.create_vrrp_group(group).await {
            Ok(()) => {
                tracing::debug!(load_balancer_id = %lb_id, "created VRRP group");
                Ok(true)
            }
            Err(RepositoryError::Duplicate { .. }) => {
                tracing::debug!(load_balancer_id = %lb_id, "VRRP group already exists, skipping");
                Ok(false)
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn compensate(&self, lb_id: &ResourceId, created: &bool) -> Result<()> {
        if !*created {
            compensation::mark_error(
                self.repo.as_ref(),
                EntityRef::load_balancer(*lb_id),
                &self.name(),
            )
            .await;
            return Ok(());
        }
        tracing::warn!(load_balancer_id = %lb_id, "reverting VRRP group creation, deleting group");
        match self.repo.delete_vrrp_group(*lb_id).await {
            Err(error) if !error.is_not_found() => Err(error.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use common::ProjectId;
    use domain::{Pool, Protocol, VrrpAuthType};
    use repository::InMemoryRepository;

    use super::*;
    use crate::task::Outcome;

    async fn setup() -> (Arc<InMemoryRepository>, LoadBalancer, Listener) {
        let repo = Arc::new(InMemoryRepository::new());
        let lb = LoadBalancer::new(ProjectId::new("p"));
        let listener = Listener::new(lb.id, ProjectId::new("p"), Protocol::Tcp, 443);
        repo.insert_load_balancer(lb.clone()).await;
        repo.insert_listener(listener.clone()).await;
        (repo, lb, listener)
    }

    async fn provisioning(repo: &InMemoryRepository, entity: EntityRef) -> ProvisioningStatus {
        repo.get_status(entity).await.unwrap().provisioning_status
    }

    #[tokio::test]
    async fn test_listeners_in_error_stay_in_error() {
        let (repo, lb, listener) = setup().await;
        repo.mark_error(EntityRef::listener(listener.id)).await.unwrap();

        let input = LbAndListeners {
            load_balancer_id: None,
            listeners: vec![ListenerRef::from(&listener)],
        };
        MarkLbAndListenersActive::new(repo.clone())
            .execute(&input)
            .await
            .unwrap();

        assert_eq!(
            provisioning(&repo, EntityRef::listener(listener.id)).await,
            ProvisioningStatus::Error
        );
        assert_eq!(
            provisioning(&repo, EntityRef::load_balancer(lb.id)).await,
            ProvisioningStatus::Active
        );
    }

    #[tokio::test]
    async fn test_server_group_revert_clears_it() {
        let (repo, lb, _) = setup().await;
        let task = UpdateLbServerGroup::new(repo.clone());
        let input = ServerGroupAssignment {
            load_balancer_id: lb.id,
            server_group_id: "sg-1".to_string(),
        };

        task.execute(&input).await.unwrap();
        assert_eq!(
            repo.get_load_balancer(lb.id).await.unwrap().server_group_id.as_deref(),
            Some("sg-1")
        );

        task.revert(&input, Outcome::Succeeded(&())).await;
        assert_eq!(repo.get_load_balancer(lb.id).await.unwrap().server_group_id, None);
    }

    #[tokio::test]
    async fn test_vrrp_group_uses_config_and_tolerates_duplicates() {
        let (repo, lb, _) = setup().await;
        let config = Arc::new(TaskConfig {
            vrrp_advert_int: 3,
            vrrp_auth_type: VrrpAuthType::Ah,
            ..TaskConfig::default()
        });
        let task = CreateVrrpGroupForLb::new(repo.clone(), config);

        assert!(task.execute(&lb.id).await.unwrap());
        let group = repo.vrrp_group(lb.id).await.unwrap();
        assert_eq!(group.name, lb.id.simple());
        assert!(!group.name.contains('-'));
        assert_eq!(group.auth_pass.len(), 7);
        assert_eq!(group.auth_type, VrrpAuthType::Ah);
        assert_eq!(group.advert_int, 3);

        assert!(!task.execute(&lb.id).await.unwrap());
        assert_eq!(repo.vrrp_group(lb.id).await.unwrap(), group);
    }

    #[tokio::test]
    async fn test_vrrp_group_revert_deletes_only_a_group_it_created() {
        let (repo, lb, _) = setup().await;
        let task = CreateVrrpGroupForLb::new(repo.clone(), Arc::new(TaskConfig::default()));

        let created = task.execute(&lb.id).await.unwrap();
        task.revert(&lb.id, Outcome::Succeeded(&created)).await;
        assert_eq!(repo.vrrp_group(lb.id).await, None);
        assert_eq!(
            provisioning(&repo, EntityRef::load_balancer(lb.id)).await,
            ProvisioningStatus::PendingCreate
        );

        task.execute(&lb.id).await.unwrap();
        let existing = repo.vrrp_group(lb.id).await.unwrap();
        let created = task.execute(&lb.id).await.unwrap();
        task.revert(&lb.id, Outcome::Succeeded(&created)).await;
        assert_eq!(repo.vrrp_group(lb.id).await, Some(existing));
        assert_eq!(
            provisioning(&repo, EntityRef::load_balancer(lb.id)).await,
            ProvisioningStatus::Error
        );
    }

    #[tokio::test]
    async fn test_vip_revert_marks_load_balancer_error() {
        let (repo, lb, _) = setup().await;
        let task = UpdateVipAfterAllocation::new(repo.clone());
        let input = VipAllocation {
            load_balancer_id: lb.id,
            vip: Vip {
                ip_address: Some("192.0.2.20".parse().unwrap()),
                ..Vip::default()
            },
        };

        let reloaded = task.execute(&input).await.unwrap();
        assert_eq!(reloaded.provisioning_status, ProvisioningStatus::PendingCreate);

        task.revert(&input, Outcome::Succeeded(&reloaded)).await;
        assert_eq!(
            provisioning(&repo, EntityRef::load_balancer(lb.id)).await,
            ProvisioningStatus::Error
        );
    }

    #[tokio::test]
    async fn test_failed_load_balancer_write_turns_marked_subobjects_to_error() {
        let (repo, lb, listener) = setup().await;
        let pool = Pool::new(lb.id, ProjectId::new("p"));
        repo.insert_pool(pool.clone()).await;
        repo.set_fail_on_resource(lb.id, true);

        let task = MarkLbActive::new(repo.clone(), true);
        let error = task.execute(&lb.id).await.unwrap_err();
        assert!(matches!(error, TaskError::Repository(_)));
        task.revert(&lb.id, Outcome::Failed(&error)).await;

        for entity in [EntityRef::listener(listener.id), EntityRef::pool(pool.id)] {
            assert_eq!(provisioning(&repo, entity).await, ProvisioningStatus::Error);
        }
        assert_eq!(
            provisioning(&repo, EntityRef::load_balancer(lb.id)).await,
            ProvisioningStatus::PendingCreate
        );
    }

    #[tokio::test]
    async fn test_mark_active_without_subobjects_leaves_children() {
        let (repo, lb, listener) = setup().await;
        MarkLbActive::new(repo.clone(), false)
            .execute(&lb.id)
            .await
            .unwrap();

        assert_eq!(
            provisioning(&repo, EntityRef::load_balancer(lb.id)).await,
            ProvisioningStatus::Active
        );
        assert_eq!(
            provisioning(&repo, EntityRef::listener(listener.id)).await,
            ProvisioningStatus::PendingCreate
        );
    }

    #[tokio::test]
    async fn test_get_vip_returns_stored_vip() {
        let (repo, lb, _) = setup().await;
        let vip = Vip {
            ip_address: Some("192.0.2.10".parse().unwrap()),
            port_id: Some("port-1".to_string()),
            ..Vip::default()
        };
        UpdateVipAfterAllocation::new(repo.clone())
            .execute(&VipAllocation {
                load_balancer_id: lb.id,
                vip: vip.clone(),
            })
            .await
            .unwrap();

        let stored = GetVipFromLoadBalancer::new(repo).execute(&lb.id).await.unwrap();
        assert_eq!(stored.ip_address, vip.ip_address);
        assert_eq!(stored.port_id, vip.port_id);
    }
}
