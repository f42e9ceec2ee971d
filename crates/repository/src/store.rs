use async_trait::async_trait;
use common::{ProjectId, ResourceId};
use domain::{
    Amphora, AmphoraHealth, AmphoraUpdate, EntityRef, L7PolicyNode, LoadBalancer,
    LoadBalancerTree, OperatingStatus, PoolChildCount, PoolNode, ProvisioningStatus,
    ResourceKind, ResourceUpdate, StatusChange, StatusRecord, VrrpGroup,
};

use crate::Result;

/// Core trait for repository implementations.
///
/// Every call is an independent, immediately visible unit of work: a task
/// that updates three rows makes three calls and a failure on the third
/// leaves the first two in place. The only multi-statement unit is the
/// [`QuotaSession`]. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Repository: Send + Sync {
    /// Exclusive quota session type handed out by [`Repository::begin_quota_session`].
    type Session: QuotaSession;

    /// Retrieves a load balancer with its VIP.
    async fn get_load_balancer(&self, id: ResourceId) -> Result<LoadBalancer>;

    /// Loads a load balancer together with its amphorae, listeners
    /// (with L7 policies and rules) and pools (with health monitor and
    /// members).
    async fn get_load_balancer_tree(&self, id: ResourceId) -> Result<LoadBalancerTree>;

    /// Stores the VRRP group of a load balancer.
    ///
    /// Fails with `Duplicate` if the load balancer already has one.
    async fn create_vrrp_group(&self, group: VrrpGroup) -> Result<()>;

    /// Removes the VRRP group of a load balancer.
    /// Fails with `NotFound` when it has none.
    async fn delete_vrrp_group(&self, load_balancer_id: ResourceId) -> Result<()>;

    /// Inserts an amphora record and returns it as stored.
    async fn create_amphora(&self, amphora: Amphora) -> Result<Amphora>;

    async fn get_amphora(&self, id: ResourceId) -> Result<Amphora>;

    /// Lists every amphora associated with a load balancer, in any status.
    async fn list_amphorae(&self, load_balancer_id: ResourceId) -> Result<Vec<Amphora>>;

    async fn update_amphora(&self, id: ResourceId, update: AmphoraUpdate) -> Result<()>;

    async fn delete_amphora(&self, id: ResourceId) -> Result<()>;

    async fn get_amphora_health(&self, amphora_id: ResourceId) -> Result<AmphoraHealth>;

    /// Removes the health record so the health manager stops watching the
    /// amphora. Fails with `NotFound` when there is no record.
    async fn delete_amphora_health(&self, amphora_id: ResourceId) -> Result<()>;

    /// Sets the busy flag on an amphora's health record.
    /// Fails with `NotFound` when there is no record.
    async fn set_amphora_health_busy(&self, amphora_id: ResourceId, busy: bool) -> Result<()>;

    /// Reads the status columns and admin flag of a resource.
    async fn get_status(&self, entity: EntityRef) -> Result<StatusRecord>;

    /// Writes status columns. The operating status is ignored for kinds
    /// that do not carry one.
    async fn set_status(&self, entity: EntityRef, change: StatusChange) -> Result<()>;

    /// Moves a resource to ACTIVE unless it is currently ERROR, and returns
    /// the provisioning status it ends up with.
    async fn activate_unless_error(&self, entity: EntityRef) -> Result<ProvisioningStatus>;

    /// Applies a typed partial update to the resource of the update's kind.
    async fn update_resource(&self, id: ResourceId, update: ResourceUpdate) -> Result<()>;

    /// Deletes a resource along with the children the storage layer
    /// cascades to: a listener takes its L7 policies and rules, a pool takes
    /// its members and health monitor, a load balancer takes its listeners,
    /// pools and VRRP group.
    async fn delete_resource(&self, entity: EntityRef) -> Result<()>;

    /// Loads a pool with its health monitor and members.
    async fn get_pool_node(&self, pool_id: ResourceId) -> Result<PoolNode>;

    /// Loads an L7 policy with its rules.
    async fn get_l7policy_node(&self, policy_id: ResourceId) -> Result<L7PolicyNode>;

    /// Sets the operating status of every member of a pool.
    async fn update_pool_members_operating_status(
        &self,
        pool_id: ResourceId,
        status: OperatingStatus,
    ) -> Result<()>;

    /// Opens an exclusive quota session.
    ///
    /// The session holds the quota lock until it is committed or rolled
    /// back; a second caller waits.
    async fn begin_quota_session(&self) -> Result<Self::Session>;

    /// Returns a project's committed usage of a kind.
    async fn quota_in_use(&self, project_id: &ProjectId, kind: ResourceKind) -> Result<i64>;
}

/// An exclusive, non-autocommitting view of the quota ledger.
///
/// Changes become visible to other sessions only on [`QuotaSession::commit`].
/// Dropping a session without committing discards its changes.
#[async_trait]
pub trait QuotaSession: Send + Sized {
    /// Releases `quantity` units of `kind` for a project.
    ///
    /// Fails with `QuotaUnderflow` rather than letting usage go negative.
    async fn decrement_quota(
        &mut self,
        kind: ResourceKind,
        project_id: &ProjectId,
        quantity: u32,
    ) -> Result<()>;

    /// Tries to re-admit one unit of `kind` for a project.
    ///
    /// Returns `true` when the project is already at its limit, in which
    /// case nothing changes. Returns `false` after charging one unit.
    async fn check_quota_met(&mut self, kind: ResourceKind, project_id: &ProjectId)
    -> Result<bool>;

    /// Publishes the session's changes and releases the lock.
    async fn commit(self) -> Result<()>;

    /// Discards the session's changes and releases the lock.
    async fn rollback(self) -> Result<()>;
}

/// Extension trait providing convenience methods for repositories.
#[async_trait]
pub trait RepositoryExt: Repository {
    /// Counts the quota-bearing children of a pool.
    async fn count_pool_children(&self, pool_id: ResourceId) -> Result<PoolChildCount> {
        Ok(self.get_pool_node(pool_id).await?.child_count())
    }

    async fn set_provisioning_status(
        &self,
        entity: EntityRef,
        status: ProvisioningStatus,
    ) -> Result<()> {
        self.set_status(entity, StatusChange::provisioning(status))
            .await
    }

    async fn mark_error(&self, entity: EntityRef) -> Result<()> {
        self.set_provisioning_status(entity, ProvisioningStatus::Error)
            .await
    }
}

impl<T: Repository + ?Sized> RepositoryExt for T {}
