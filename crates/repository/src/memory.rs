use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, PoisonError};

use async_trait::async_trait;
use common::{ProjectId, ResourceId};
use domain::{
    Amphora, AmphoraHealth, AmphoraUpdate, EntityRef, HealthMonitor, L7Policy, L7PolicyNode,
    L7Rule, Listener, ListenerNode, LoadBalancer, LoadBalancerTree, Member, OperatingStatus, Pool,
    PoolNode, ProvisioningStatus, ResourceKind, ResourceUpdate, StatusChange, StatusRecord,
    VrrpGroup,
};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::quota::{QuotaCall, QuotaLedger, QuotaLimits, QuotaOperation};
use crate::store::{QuotaSession, Repository};
use crate::{RepositoryError, Result};

const AMPHORA: &str = "amphora";
const AMPHORA_HEALTH: &str = "amphora_health";
const VRRP_GROUP: &str = "vrrp_group";

#[derive(Debug, Clone, Default, PartialEq)]
struct Tables {
    load_balancers: BTreeMap<ResourceId, LoadBalancer>,
    amphorae: BTreeMap<ResourceId, Amphora>,
    amphora_health: BTreeMap<ResourceId, AmphoraHealth>,
    vrrp_groups: BTreeMap<ResourceId, VrrpGroup>,
    listeners: BTreeMap<ResourceId, Listener>,
    l7policies: BTreeMap<ResourceId, L7Policy>,
    l7rules: BTreeMap<ResourceId, L7Rule>,
    pools: BTreeMap<ResourceId, Pool>,
    members: BTreeMap<ResourceId, Member>,
    health_monitors: BTreeMap<ResourceId, HealthMonitor>,
}

impl Tables {
    fn status(&self, entity: EntityRef) -> Option<StatusRecord> {
        let id = entity.id;
        match entity.kind {
            ResourceKind::LoadBalancer => self.load_balancers.get(&id).map(|r| {
                record(r.provisioning_status, Some(r.operating_status), r.enabled)
            }),
            ResourceKind::Listener => self.listeners.get(&id).map(|r| {
                record(r.provisioning_status, Some(r.operating_status), r.enabled)
            }),
            ResourceKind::Pool => self.pools.get(&id).map(|r| {
                record(r.provisioning_status, Some(r.operating_status), r.enabled)
            }),
            ResourceKind::Member => self.members.get(&id).map(|r| {
                record(r.provisioning_status, Some(r.operating_status), r.enabled)
            }),
            ResourceKind::HealthMonitor => self.health_monitors.get(&id).map(|r| {
                record(r.provisioning_status, Some(r.operating_status), r.enabled)
            }),
            ResourceKind::L7Policy => self.l7policies.get(&id).map(|r| {
                record(r.provisioning_status, Some(r.operating_status), r.enabled)
            }),
            ResourceKind::L7Rule => self
                .l7rules
                .get(&id)
                .map(|r| record(r.provisioning_status, None, r.enabled)),
        }
    }

    /// Returns mutable handles to the status columns of a resource.
    fn status_columns(
        &mut self,
        entity: EntityRef,
    ) -> Option<(&mut ProvisioningStatus, Option<&mut OperatingStatus>)> {
        let id = entity.id;
        match entity.kind {
            ResourceKind::LoadBalancer => self
                .load_balancers
                .get_mut(&id)
                .map(|r| (&mut r.provisioning_status, Some(&mut r.operating_status))),
            ResourceKind::Listener => self
                .listeners
                .get_mut(&id)
                .map(|r| (&mut r.provisioning_status, Some(&mut r.operating_status))),
            ResourceKind::Pool => self
                .pools
                .get_mut(&id)
                .map(|r| (&mut r.provisioning_status, Some(&mut r.operating_status))),
            ResourceKind::Member => self
                .members
                .get_mut(&id)
                .map(|r| (&mut r.provisioning_status, Some(&mut r.operating_status))),
            ResourceKind::HealthMonitor => self
                .health_monitors
                .get_mut(&id)
                .map(|r| (&mut r.provisioning_status, Some(&mut r.operating_status))),
            ResourceKind::L7Policy => self
                .l7policies
                .get_mut(&id)
                .map(|r| (&mut r.provisioning_status, Some(&mut r.operating_status))),
            ResourceKind::L7Rule => self
                .l7rules
                .get_mut(&id)
                .map(|r| (&mut r.provisioning_status, None)),
        }
    }

    fn pool_node(&self, pool: &Pool) -> PoolNode {
        PoolNode {
            pool: pool.clone(),
            health_monitor: self
                .health_monitors
                .values()
                .find(|hm| hm.pool_id == pool.id)
                .cloned(),
            members: self
                .members
                .values()
                .filter(|m| m.pool_id == pool.id)
                .cloned()
                .collect(),
        }
    }

    fn l7policy_node(&self, policy: &L7Policy) -> L7PolicyNode {
        L7PolicyNode {
            policy: policy.clone(),
            rules: self
                .l7rules
                .values()
                .filter(|r| r.l7policy_id == policy.id)
                .cloned()
                .collect(),
        }
    }

    fn delete_l7policy(&mut self, id: ResourceId) {
        self.l7policies.remove(&id);
        self.l7rules.retain(|_, r| r.l7policy_id != id);
    }

    fn delete_listener(&mut self, id: ResourceId) {
        self.listeners.remove(&id);
        let policies: Vec<ResourceId> = self
            .l7policies
            .values()
            .filter(|p| p.listener_id == id)
            .map(|p| p.id)
            .collect();
        for policy in policies {
            self.delete_l7policy(policy);
        }
    }

    fn delete_pool(&mut self, id: ResourceId) {
        self.pools.remove(&id);
        self.members.retain(|_, m| m.pool_id != id);
        self.health_monitors.retain(|_, hm| hm.pool_id != id);
        for listener in self.listeners.values_mut() {
            if listener.default_pool_id == Some(id) {
                listener.default_pool_id = None;
            }
        }
        for policy in self.l7policies.values_mut() {
            if policy.redirect_pool_id == Some(id) {
                policy.redirect_pool_id = None;
            }
        }
    }

    fn delete_load_balancer(&mut self, id: ResourceId) {
        self.load_balancers.remove(&id);
        self.vrrp_groups.remove(&id);
        let listeners: Vec<ResourceId> = self
            .listeners
            .values()
            .filter(|l| l.load_balancer_id == id)
            .map(|l| l.id)
            .collect();
        for listener in listeners {
            self.delete_listener(listener);
        }
        let pools: Vec<ResourceId> = self
            .pools
            .values()
            .filter(|p| p.load_balancer_id == id)
            .map(|p| p.id)
            .collect();
        for pool in pools {
            self.delete_pool(pool);
        }
    }
}

fn record(
    provisioning_status: ProvisioningStatus,
    operating_status: Option<OperatingStatus>,
    enabled: bool,
) -> StatusRecord {
    StatusRecord {
        provisioning_status,
        operating_status,
        enabled,
    }
}

fn not_found(entity: EntityRef) -> RepositoryError {
    RepositoryError::not_found(entity.kind.as_str(), entity.id)
}

#[derive(Debug, Default)]
struct Faults {
    failing_resources: HashSet<ResourceId>,
    failing_quota_checks: HashSet<ResourceKind>,
    fail_on_decrement: bool,
    fail_on_begin_session: bool,
}

/// Full copy of the repository's state, for before/after comparisons.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositorySnapshot {
    tables: Tables,
    quota: QuotaLedger,
}

/// In-memory repository implementation for testing.
///
/// Provides the same interface a database-backed adapter would, including
/// an exclusive quota lock: a quota session owns the ledger's mutex guard
/// until it commits or rolls back. Failures can be injected per resource id,
/// per quota kind, and on quota decrements.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    tables: Arc<RwLock<Tables>>,
    quota: Arc<Mutex<QuotaLedger>>,
    quota_calls: Arc<std::sync::Mutex<Vec<QuotaCall>>>,
    faults: Arc<std::sync::RwLock<Faults>>,
}

impl InMemoryRepository {
    /// Creates an empty repository with unlimited quota.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty repository that enforces the given limits.
    pub fn with_quota_limits(limits: QuotaLimits) -> Self {
        Self {
            quota: Arc::new(Mutex::new(QuotaLedger::new(limits))),
            ..Self::default()
        }
    }

    pub async fn insert_load_balancer(&self, lb: LoadBalancer) {
        self.tables.write().await.load_balancers.insert(lb.id, lb);
    }

    pub async fn insert_amphora(&self, amphora: Amphora) {
        self.tables.write().await.amphorae.insert(amphora.id, amphora);
    }

    pub async fn insert_amphora_health(&self, health: AmphoraHealth) {
        self.tables
            .write()
            .await
            .amphora_health
            .insert(health.amphora_id, health);
    }

    pub async fn insert_listener(&self, listener: Listener) {
        self.tables.write().await.listeners.insert(listener.id, listener);
    }

    pub async fn insert_l7policy(&self, policy: L7Policy) {
        self.tables.write().await.l7policies.insert(policy.id, policy);
    }

    pub async fn insert_l7rule(&self, rule: L7Rule) {
        self.tables.write().await.l7rules.insert(rule.id, rule);
    }

    pub async fn insert_pool(&self, pool: Pool) {
        self.tables.write().await.pools.insert(pool.id, pool);
    }

    pub async fn insert_member(&self, member: Member) {
        self.tables.write().await.members.insert(member.id, member);
    }

    pub async fn insert_health_monitor(&self, monitor: HealthMonitor) {
        self.tables
            .write()
            .await
            .health_monitors
            .insert(monitor.id, monitor);
    }

    /// Sets a project's committed usage of a kind.
    pub async fn set_quota_in_use(&self, project_id: ProjectId, kind: ResourceKind, in_use: i64) {
        self.quota.lock().await.set_in_use(project_id, kind, in_use);
    }

    pub async fn vrrp_group(&self, load_balancer_id: ResourceId) -> Option<VrrpGroup> {
        self.tables
            .read()
            .await
            .vrrp_groups
            .get(&load_balancer_id)
            .cloned()
    }

    /// Returns true if a row exists for the resource.
    pub async fn contains(&self, entity: EntityRef) -> bool {
        self.tables.read().await.status(entity).is_some()
    }

    /// Returns every quota call issued so far, in order.
    pub fn quota_calls(&self) -> Vec<QuotaCall> {
        self.quota_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_quota_calls(&self) {
        self.quota_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Copies the full state. Waits for any open quota session to finish.
    pub async fn snapshot(&self) -> RepositorySnapshot {
        let tables = self.tables.read().await.clone();
        let quota = self.quota.lock().await.clone();
        RepositorySnapshot { tables, quota }
    }

    /// Makes every write to the given resource (or amphora) fail.
    pub fn set_fail_on_resource(&self, id: ResourceId, fail: bool) {
        let mut faults = self.faults.write().unwrap_or_else(PoisonError::into_inner);
        if fail {
            faults.failing_resources.insert(id);
        } else {
            faults.failing_resources.remove(&id);
        }
    }

    /// Makes `check_quota_met` fail for the given kind.
    pub fn set_fail_on_quota_check(&self, kind: ResourceKind, fail: bool) {
        let mut faults = self.faults.write().unwrap_or_else(PoisonError::into_inner);
        if fail {
            faults.failing_quota_checks.insert(kind);
        } else {
            faults.failing_quota_checks.remove(&kind);
        }
    }

    /// Makes `decrement_quota` fail.
    pub fn set_fail_on_decrement(&self, fail: bool) {
        self.faults
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_on_decrement = fail;
    }

    /// Makes opening a quota session fail.
    pub fn set_fail_on_begin_session(&self, fail: bool) {
        self.faults
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_on_begin_session = fail;
    }

    fn check_write(&self, id: ResourceId) -> Result<()> {
        let faults = self.faults.read().unwrap_or_else(PoisonError::into_inner);
        if faults.failing_resources.contains(&id) {
            return Err(RepositoryError::Unavailable(format!(
                "injected write failure for {id}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    type Session = InMemoryQuotaSession;

    async fn get_load_balancer(&self, id: ResourceId) -> Result<LoadBalancer> {
        self.tables
            .read()
            .await
            .load_balancers
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(EntityRef::load_balancer(id)))
    }

    async fn get_load_balancer_tree(&self, id: ResourceId) -> Result<LoadBalancerTree> {
        let tables = self.tables.read().await;
        let load_balancer = tables
            .load_balancers
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(EntityRef::load_balancer(id)))?;

        let amphorae = tables
            .amphorae
            .values()
            .filter(|a| a.load_balancer_id == Some(id))
            .cloned()
            .collect();

        let mut listeners: Vec<ListenerNode> = tables
            .listeners
            .values()
            .filter(|l| l.load_balancer_id == id)
            .map(|listener| {
                let mut l7policies: Vec<L7PolicyNode> = tables
                    .l7policies
                    .values()
                    .filter(|p| p.listener_id == listener.id)
                    .map(|p| tables.l7policy_node(p))
                    .collect();
                l7policies.sort_by_key(|node| node.policy.position);
                ListenerNode {
                    listener: listener.clone(),
                    l7policies,
                }
            })
            .collect();
        listeners.sort_by_key(|node| node.listener.protocol_port);

        let pools = tables
            .pools
            .values()
            .filter(|p| p.load_balancer_id == id)
            .map(|p| tables.pool_node(p))
            .collect();

        Ok(LoadBalancerTree {
            load_balancer,
            amphorae,
            listeners,
            pools,
        })
    }

    async fn create_vrrp_group(&self, group: VrrpGroup) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.vrrp_groups.contains_key(&group.load_balancer_id) {
            return Err(RepositoryError::Duplicate {
                entity: VRRP_GROUP,
                id: group.load_balancer_id,
            });
        }
        tables.vrrp_groups.insert(group.load_balancer_id, group);
        Ok(())
    }

    async fn delete_vrrp_group(&self, load_balancer_id: ResourceId) -> Result<()> {
        self.check_write(load_balancer_id)?;
        self.tables
            .write()
            .await
            .vrrp_groups
            .remove(&load_balancer_id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::not_found(VRRP_GROUP, load_balancer_id))
    }

    async fn create_amphora(&self, amphora: Amphora) -> Result<Amphora> {
        self.check_write(amphora.id)?;
        let mut tables = self.tables.write().await;
        if tables.amphorae.contains_key(&amphora.id) {
            return Err(RepositoryError::Duplicate {
                entity: AMPHORA,
                id: amphora.id,
            });
        }
        tables.amphorae.insert(amphora.id, amphora.clone());
        Ok(amphora)
    }

    async fn get_amphora(&self, id: ResourceId) -> Result<Amphora> {
        self.tables
            .read()
            .await
            .amphorae
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(AMPHORA, id))
    }

    async fn list_amphorae(&self, load_balancer_id: ResourceId) -> Result<Vec<Amphora>> {
        Ok(self
            .tables
            .read()
            .await
            .amphorae
            .values()
            .filter(|a| a.load_balancer_id == Some(load_balancer_id))
            .cloned()
            .collect())
    }

    async fn update_amphora(&self, id: ResourceId, update: AmphoraUpdate) -> Result<()> {
        self.check_write(id)?;
        let mut tables = self.tables.write().await;
        let amphora = tables
            .amphorae
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::not_found(AMPHORA, id))?;
        update.apply(amphora);
        Ok(())
    }

    async fn delete_amphora(&self, id: ResourceId) -> Result<()> {
        self.check_write(id)?;
        self.tables
            .write()
            .await
            .amphorae
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::not_found(AMPHORA, id))
    }

    async fn get_amphora_health(&self, amphora_id: ResourceId) -> Result<AmphoraHealth> {
        self.tables
            .read()
            .await
            .amphora_health
            .get(&amphora_id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(AMPHORA_HEALTH, amphora_id))
    }

    async fn delete_amphora_health(&self, amphora_id: ResourceId) -> Result<()> {
        self.check_write(amphora_id)?;
        self.tables
            .write()
            .await
            .amphora_health
            .remove(&amphora_id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::not_found(AMPHORA_HEALTH, amphora_id))
    }

    async fn set_amphora_health_busy(&self, amphora_id: ResourceId, busy: bool) -> Result<()> {
        self.check_write(amphora_id)?;
        let mut tables = self.tables.write().await;
        let health = tables
            .amphora_health
            .get_mut(&amphora_id)
            .ok_or_else(|| RepositoryError::not_found(AMPHORA_HEALTH, amphora_id))?;
        health.busy = busy;
        Ok(())
    }

    async fn get_status(&self, entity: EntityRef) -> Result<StatusRecord> {
        self.tables
            .read()
            .await
            .status(entity)
            .ok_or_else(|| not_found(entity))
    }

    async fn set_status(&self, entity: EntityRef, change: StatusChange) -> Result<()> {
        self.check_write(entity.id)?;
        let mut tables = self.tables.write().await;
        let (provisioning, operating) = tables
            .status_columns(entity)
            .ok_or_else(|| not_found(entity))?;
        *provisioning = change.provisioning_status;
        if let (Some(column), Some(status)) = (operating, change.operating_status) {
            *column = status;
        }
        Ok(())
    }

    async fn activate_unless_error(&self, entity: EntityRef) -> Result<ProvisioningStatus> {
        self.check_write(entity.id)?;
        let mut tables = self.tables.write().await;
        let (provisioning, _) = tables
            .status_columns(entity)
            .ok_or_else(|| not_found(entity))?;
        if *provisioning != ProvisioningStatus::Error {
            *provisioning = ProvisioningStatus::Active;
        }
        Ok(*provisioning)
    }

    async fn update_resource(&self, id: ResourceId, update: ResourceUpdate) -> Result<()> {
        self.check_write(id)?;
        let entity = EntityRef::new(update.kind(), id);
        let mut tables = self.tables.write().await;
        let applied = match &update {
            ResourceUpdate::LoadBalancer(u) => tables.load_balancers.get_mut(&id).map(|r| u.apply(r)),
            ResourceUpdate::Listener(u) => tables.listeners.get_mut(&id).map(|r| u.apply(r)),
            ResourceUpdate::Pool(u) => tables.pools.get_mut(&id).map(|r| u.apply(r)),
            ResourceUpdate::Member(u) => tables.members.get_mut(&id).map(|r| u.apply(r)),
            ResourceUpdate::HealthMonitor(u) => {
                tables.health_monitors.get_mut(&id).map(|r| u.apply(r))
            }
            ResourceUpdate::L7Policy(u) => tables.l7policies.get_mut(&id).map(|r| u.apply(r)),
            ResourceUpdate::L7Rule(u) => tables.l7rules.get_mut(&id).map(|r| u.apply(r)),
        };
        applied.ok_or_else(|| not_found(entity))
    }

    async fn delete_resource(&self, entity: EntityRef) -> Result<()> {
        self.check_write(entity.id)?;
        let mut tables = self.tables.write().await;
        if tables.status(entity).is_none() {
            return Err(not_found(entity));
        }
        let id = entity.id;
        match entity.kind {
            ResourceKind::LoadBalancer => tables.delete_load_balancer(id),
            ResourceKind::Listener => tables.delete_listener(id),
            ResourceKind::Pool => tables.delete_pool(id),
            ResourceKind::L7Policy => tables.delete_l7policy(id),
            ResourceKind::Member => {
                tables.members.remove(&id);
            }
            ResourceKind::HealthMonitor => {
                tables.health_monitors.remove(&id);
            }
            ResourceKind::L7Rule => {
                tables.l7rules.remove(&id);
            }
        }
        tracing::debug!(%entity, "deleted resource");
        Ok(())
    }

    async fn get_pool_node(&self, pool_id: ResourceId) -> Result<PoolNode> {
        let tables = self.tables.read().await;
        let pool = tables
            .pools
            .get(&pool_id)
            .ok_or_else(|| not_found(EntityRef::pool(pool_id)))?;
        Ok(tables.pool_node(pool))
    }

    async fn get_l7policy_node(&self, policy_id: ResourceId) -> Result<L7PolicyNode> {
        let tables = self.tables.read().await;
        let policy = tables
            .l7policies
            .get(&policy_id)
            .ok_or_else(|| not_found(EntityRef::l7policy(policy_id)))?;
        Ok(tables.l7policy_node(policy))
    }

    async fn update_pool_members_operating_status(
        &self,
        pool_id: ResourceId,
        status: OperatingStatus,
    ) -> Result<()> {
        self.check_write(pool_id)?;
        let mut tables = self.tables.write().await;
        if !tables.pools.contains_key(&pool_id) {
            return Err(not_found(EntityRef::pool(pool_id)));
        }
        for member in tables.members.values_mut().filter(|m| m.pool_id == pool_id) {
            member.operating_status = status;
        }
        Ok(())
    }

    async fn begin_quota_session(&self) -> Result<Self::Session> {
        if self
            .faults
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_on_begin_session
        {
            return Err(RepositoryError::Unavailable(
                "injected failure opening quota session".to_string(),
            ));
        }
        let guard = self.quota.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(InMemoryQuotaSession {
            guard,
            staged,
            calls: self.quota_calls.clone(),
            faults: self.faults.clone(),
        })
    }

    async fn quota_in_use(&self, project_id: &ProjectId, kind: ResourceKind) -> Result<i64> {
        Ok(self.quota.lock().await.in_use(project_id, kind))
    }
}

/// Quota session over the in-memory ledger.
///
/// Holds the ledger lock for its whole lifetime and works on a staged copy
/// that replaces the ledger on commit.
pub struct InMemoryQuotaSession {
    guard: OwnedMutexGuard<QuotaLedger>,
    staged: QuotaLedger,
    calls: Arc<std::sync::Mutex<Vec<QuotaCall>>>,
    faults: Arc<std::sync::RwLock<Faults>>,
}

impl InMemoryQuotaSession {
    fn record(&self, operation: QuotaOperation, kind: ResourceKind, project_id: &ProjectId) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(QuotaCall {
                operation,
                kind,
                project_id: project_id.clone(),
            });
    }
}

#[async_trait]
impl QuotaSession for InMemoryQuotaSession {
    async fn decrement_quota(
        &mut self,
        kind: ResourceKind,
        project_id: &ProjectId,
        quantity: u32,
    ) -> Result<()> {
        self.record(QuotaOperation::Decrement { quantity }, kind, project_id);
        if self
            .faults
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_on_decrement
        {
            return Err(RepositoryError::Unavailable(format!(
                "injected failure decrementing {kind} quota"
            )));
        }
        self.staged.decrement(kind, project_id, quantity)
    }

    async fn check_quota_met(
        &mut self,
        kind: ResourceKind,
        project_id: &ProjectId,
    ) -> Result<bool> {
        self.record(QuotaOperation::CheckQuotaMet, kind, project_id);
        if self
            .faults
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .failing_quota_checks
            .contains(&kind)
        {
            return Err(RepositoryError::Unavailable(format!(
                "injected failure checking {kind} quota"
            )));
        }
        Ok(self.staged.check_quota_met(kind, project_id))
    }

    async fn commit(self) -> Result<()> {
        let Self {
            mut guard, staged, ..
        } = self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use domain::{
        CompareType, L7PolicyAction, L7RuleType, MemberUpdate, MonitorType, Protocol,
    };

    use super::*;
    use crate::RepositoryExt;

    fn project() -> ProjectId {
        ProjectId::new("tenant")
    }

    fn addr(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    /// Seeds LB -> listener(default pool) -> policy -> rule, pool -> hm + 2 members.
    async fn seed(repo: &InMemoryRepository) -> LoadBalancerTree {
        let lb = LoadBalancer::new(project());
        let pool = Pool::new(lb.id, project());
        let mut listener = Listener::new(lb.id, project(), Protocol::Http, 80);
        listener.default_pool_id = Some(pool.id);
        let policy = L7Policy::new(listener.id, project(), L7PolicyAction::Reject);
        let rule = L7Rule::new(
            policy.id,
            project(),
            L7RuleType::Path,
            CompareType::StartsWith,
            "/api",
        );
        let hm = HealthMonitor::new(pool.id, project(), MonitorType::Http);
        let lb_id = lb.id;

        repo.insert_load_balancer(lb).await;
        repo.insert_listener(listener).await;
        repo.insert_l7policy(policy).await;
        repo.insert_l7rule(rule).await;
        repo.insert_health_monitor(hm).await;
        repo.insert_member(Member::new(pool.id, project(), addr(1), 8080))
            .await;
        repo.insert_member(Member::new(pool.id, project(), addr(2), 8080))
            .await;
        repo.insert_pool(pool).await;

        repo.get_load_balancer_tree(lb_id).await.unwrap()
    }

    #[tokio::test]
    async fn test_tree_contains_every_node() {
        let repo = InMemoryRepository::new();
        let tree = seed(&repo).await;

        assert_eq!(tree.listeners.len(), 1);
        assert_eq!(tree.listeners[0].l7policies[0].rules.len(), 1);
        assert_eq!(tree.pools[0].members.len(), 2);
        assert!(tree.pools[0].health_monitor.is_some());
        assert_eq!(tree.node_count(), 8);
    }

    #[tokio::test]
    async fn test_set_status_ignores_operating_status_on_rules() {
        let repo = InMemoryRepository::new();
        let tree = seed(&repo).await;
        let rule = EntityRef::l7rule(tree.listeners[0].l7policies[0].rules[0].id);

        repo.set_status(
            rule,
            StatusChange::provisioning(ProvisioningStatus::Active)
                .with_operating(OperatingStatus::Online),
        )
        .await
        .unwrap();

        let status = repo.get_status(rule).await.unwrap();
        assert_eq!(status.provisioning_status, ProvisioningStatus::Active);
        assert_eq!(status.operating_status, None);
    }

    #[tokio::test]
    async fn test_activate_unless_error_keeps_error() {
        let repo = InMemoryRepository::new();
        let tree = seed(&repo).await;
        let listener = EntityRef::listener(tree.listeners[0].listener.id);

        assert_eq!(
            repo.activate_unless_error(listener).await.unwrap(),
            ProvisioningStatus::Active
        );
        repo.mark_error(listener).await.unwrap();
        assert_eq!(
            repo.activate_unless_error(listener).await.unwrap(),
            ProvisioningStatus::Error
        );
    }

    #[tokio::test]
    async fn test_delete_pool_cascades_and_clears_references() {
        let repo = InMemoryRepository::new();
        let tree = seed(&repo).await;
        let pool = &tree.pools[0];

        repo.delete_resource(EntityRef::pool(pool.pool.id))
            .await
            .unwrap();

        for member in &pool.members {
            assert!(!repo.contains(EntityRef::member(member.id)).await);
        }
        let hm = pool.health_monitor.as_ref().unwrap();
        assert!(!repo.contains(EntityRef::health_monitor(hm.id)).await);

        let tree = repo
            .get_load_balancer_tree(tree.load_balancer.id)
            .await
            .unwrap();
        assert_eq!(tree.listeners[0].listener.default_pool_id, None);
        assert!(tree.pools.is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_resource_is_not_found() {
        let repo = InMemoryRepository::new();
        let err = repo
            .delete_resource(EntityRef::member(ResourceId::new()))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_count_pool_children() {
        let repo = InMemoryRepository::new();
        let tree = seed(&repo).await;

        let count = repo.count_pool_children(tree.pools[0].pool.id).await.unwrap();
        assert_eq!(count.health_monitors, 1);
        assert_eq!(count.members, 2);
    }

    #[tokio::test]
    async fn test_injected_write_failure_leaves_row_alone() {
        let repo = InMemoryRepository::new();
        let tree = seed(&repo).await;
        let member = tree.pools[0].members[0].id;
        repo.set_fail_on_resource(member, true);

        let result = repo
            .update_resource(
                member,
                ResourceUpdate::Member(MemberUpdate {
                    weight: Some(5),
                    ..MemberUpdate::default()
                }),
            )
            .await;
        assert!(matches!(result, Err(RepositoryError::Unavailable(_))));
        let node = repo.get_pool_node(tree.pools[0].pool.id).await.unwrap();
        assert!(node.members.iter().all(|m| m.weight == 1));

        repo.set_fail_on_resource(member, false);
        repo.mark_error(EntityRef::member(member)).await.unwrap();
    }

    #[tokio::test]
    async fn test_amphora_health_operations_report_missing_records() {
        let repo = InMemoryRepository::new();
        let amphora_id = ResourceId::new();

        assert!(repo.delete_amphora_health(amphora_id).await.unwrap_err().is_not_found());
        assert!(
            repo.set_amphora_health_busy(amphora_id, true)
                .await
                .unwrap_err()
                .is_not_found()
        );

        repo.insert_amphora_health(AmphoraHealth::new(amphora_id)).await;
        repo.set_amphora_health_busy(amphora_id, true).await.unwrap();
        assert!(repo.get_amphora_health(amphora_id).await.unwrap().busy);
    }

    #[tokio::test]
    async fn test_quota_session_commit_and_rollback() {
        let repo = InMemoryRepository::new();
        repo.set_quota_in_use(project(), ResourceKind::Pool, 3).await;

        let mut session = repo.begin_quota_session().await.unwrap();
        session
            .decrement_quota(ResourceKind::Pool, &project(), 1)
            .await
            .unwrap();
        session.rollback().await.unwrap();
        assert_eq!(repo.quota_in_use(&project(), ResourceKind::Pool).await.unwrap(), 3);

        let mut session = repo.begin_quota_session().await.unwrap();
        session
            .decrement_quota(ResourceKind::Pool, &project(), 2)
            .await
            .unwrap();
        session.commit().await.unwrap();
        assert_eq!(repo.quota_in_use(&project(), ResourceKind::Pool).await.unwrap(), 1);

        assert_eq!(repo.quota_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_dropped_session_discards_changes() {
        let repo = InMemoryRepository::new();
        {
            let mut session = repo.begin_quota_session().await.unwrap();
            assert!(
                !session
                    .check_quota_met(ResourceKind::Member, &project())
                    .await
                    .unwrap()
            );
        }
        assert_eq!(repo.quota_in_use(&project(), ResourceKind::Member).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_detects_changes() {
        let repo = InMemoryRepository::new();
        let tree = seed(&repo).await;
        let before = repo.snapshot().await;
        assert_eq!(before, repo.snapshot().await);

        repo.mark_error(EntityRef::load_balancer(tree.load_balancer.id))
            .await
            .unwrap();
        assert_ne!(before, repo.snapshot().await);
    }
}
