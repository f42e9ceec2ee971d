//! Quota accounting for deletes.
//!
//! Deleting a resource releases its quota in one exclusive session: all
//! decrements of a task commit together or not at all, and a failure
//! fails the task. Reverting a release re-admits the units one at a time,
//! each in its own session, through the same limit check used on
//! admission. A unit that cannot be re-admitted is logged as drift and
//! left for operator reconciliation.

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use common::{ProjectId, ResourceId};
use domain::{PoolChildCount, ResourceKind};
use repository::{QuotaSession, Repository, RepositoryExt};

use crate::error::Result;
use crate::task::Task;

/// Decrements every `(kind, quantity)` charge in one session.
///
/// Rolls back and returns the error if any decrement or the commit fails.
async fn release<R>(repo: &R, project_id: &ProjectId, charges: &[(ResourceKind, u32)]) -> Result<()>
where
    R: Repository + ?Sized,
{
    let mut session = repo.begin_quota_session().await?;
    for &(kind, quantity) in charges {
        if let Err(error) = session.decrement_quota(kind, project_id, quantity).await {
            tracing::error!(%project_id, %kind, quantity, %error, "failed to decrement quota");
            if let Err(rollback_error) = session.rollback().await {
                tracing::error!(%project_id, error = %rollback_error, "quota rollback failed");
            }
            return Err(error.into());
        }
    }
    session.commit().await?;

    for &(kind, quantity) in charges {
        metrics::counter!("quota_decrements_total", "kind" => kind.as_str())
            .increment(u64::from(quantity));
    }
    tracing::debug!(%project_id, ?charges, "quota released");
    Ok(())
}

async fn readmit_one<R>(
    repo: &R,
    kind: ResourceKind,
    project_id: &ProjectId,
) -> repository::Result<bool>
where
    R: Repository + ?Sized,
{
    let mut session = repo.begin_quota_session().await?;
    match session.check_quota_met(kind, project_id).await {
        Ok(met) => {
            session.commit().await?;
            Ok(met)
        }
        Err(error) => {
            if let Err(rollback_error) = session.rollback().await {
                tracing::debug!(%project_id, error = %rollback_error, "quota rollback failed");
            }
            Err(error)
        }
    }
}

/// Re-admits `units` units of `kind`, one session per unit.
///
/// Returns how many units could not be re-admitted.
async fn readmit<R>(repo: &R, kind: ResourceKind, project_id: &ProjectId, units: u32) -> u32
where
    R: Repository + ?Sized,
{
    let mut drifted = 0;
    for _ in 0..units {
        let reason = match readmit_one(repo, kind, project_id).await {
            Ok(false) => continue,
            Ok(true) => "quota limit already met".to_string(),
            Err(error) => error.to_string(),
        };
        drifted += 1;
        metrics::counter!("quota_reapply_failures_total", "kind" => kind.as_str()).increment(1);
        tracing::warn!(
            %project_id,
            %kind,
            %reason,
            "failed to reapply quota, project quota counts may be incorrect"
        );
    }
    drifted
}

async fn readmit_all<R>(repo: &R, project_id: &ProjectId, charges: &[(ResourceKind, u32)], task: &str)
where
    R: Repository + ?Sized,
{
    tracing::warn!(task, %project_id, "reverting quota decrement, project quota counts may be incorrect");
    let mut drifted = 0;
    for &(kind, units) in charges {
        drifted += readmit(repo, kind, project_id, units).await;
    }
    if drifted > 0 {
        tracing::warn!(task, %project_id, drifted, "quota left out of sync, needs reconciliation");
    }
}

/// Releases one unit of a kind's quota when a resource is deleted.
pub struct DecrementQuota<R> {
    repo: Arc<R>,
    kind: ResourceKind,
}

impl<R: Repository> DecrementQuota<R> {
    pub fn new(repo: Arc<R>, kind: ResourceKind) -> Self {
        Self { repo, kind }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for DecrementQuota<R> {
    type Input = ProjectId;
    type Output = ();

    fn name(&self) -> Cow<'static, str> {
        Cow::Owned(format!("decrement-{}-quota", self.kind))
    }

    async fn execute(&self, project_id: &ProjectId) -> Result<()> {
        release(self.repo.as_ref(), project_id, &[(self.kind, 1)]).await
    }

    async fn compensate(&self, project_id: &ProjectId, _output: &()) -> Result<()> {
        readmit_all(self.repo.as_ref(), project_id, &[(self.kind, 1)], &self.name()).await;
        Ok(())
    }
}

/// A pool delete together with the children the storage layer removes
/// with it, counted before the delete runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolQuotaRelease {
    pub project_id: ProjectId,
    pub children: PoolChildCount,
}

impl PoolQuotaRelease {
    fn charges(&self) -> Vec<(ResourceKind, u32)> {
        let mut charges = vec![(ResourceKind::Pool, 1)];
        if self.children.health_monitors > 0 {
            charges.push((ResourceKind::HealthMonitor, self.children.health_monitors));
        }
        if self.children.members > 0 {
            charges.push((ResourceKind::Member, self.children.members));
        }
        charges
    }
}

/// Releases the quota of a pool and its cascade-deleted children in one
/// session.
pub struct DecrementPoolQuota<R> {
    repo: Arc<R>,
}

impl<R: Repository> DecrementPoolQuota<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for DecrementPoolQuota<R> {
    type Input = PoolQuotaRelease;
    type Output = ();

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("decrement-pool-quota")
    }

    async fn execute(&self, input: &PoolQuotaRelease) -> Result<()> {
        release(self.repo.as_ref(), &input.project_id, &input.charges()).await
    }

    async fn compensate(&self, input: &PoolQuotaRelease, _output: &()) -> Result<()> {
        readmit_all(self.repo.as_ref(), &input.project_id, &input.charges(), &self.name()).await;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L7PolicyQuotaRelease {
    pub project_id: ProjectId,
    pub l7policy_id: ResourceId,
}

/// Releases the quota of an L7 policy and its rules.
///
/// The rules are counted when the task executes, so it must run before the
/// policy is deleted. Returns the rule count it released.
pub struct DecrementL7PolicyQuota<R> {
    repo: Arc<R>,
}

impl<R: Repository> DecrementL7PolicyQuota<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

fn l7policy_charges(rules: u32) -> Vec<(ResourceKind, u32)> {
    let mut charges = vec![(ResourceKind::L7Policy, 1)];
    if rules > 0 {
        charges.push((ResourceKind::L7Rule, rules));
    }
    charges
}

#[async_trait]
impl<R: Repository + 'static> Task for DecrementL7PolicyQuota<R> {
    type Input = L7PolicyQuotaRelease;
    type Output = u32;

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("decrement-l7policy-quota")
    }

    async fn execute(&self, input: &L7PolicyQuotaRelease) -> Result<u32> {
        let node = self.repo.get_l7policy_node(input.l7policy_id).await?;
        let rules = u32::try_from(node.rules.len()).unwrap_or(u32::MAX);
        release(self.repo.as_ref(), &input.project_id, &l7policy_charges(rules)).await?;
        Ok(rules)
    }

    async fn compensate(&self, input: &L7PolicyQuotaRelease, rules: &u32) -> Result<()> {
        readmit_all(
            self.repo.as_ref(),
            &input.project_id,
            &l7policy_charges(*rules),
            &self.name(),
        )
        .await;
        Ok(())
    }
}

/// Counts a pool's health monitor and members for quota purposes.
///
/// Must run before the pool is deleted; afterwards the children are gone.
pub struct CountPoolChildrenForQuota<R> {
    repo: Arc<R>,
}

impl<R: Repository> CountPoolChildrenForQuota<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for CountPoolChildrenForQuota<R> {
    type Input = ResourceId;
    type Output = PoolChildCount;

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("count-pool-children-for-quota")
    }

    async fn execute(&self, pool_id: &ResourceId) -> Result<PoolChildCount> {
        let count = self.repo.count_pool_children(*pool_id).await?;
        tracing::debug!(%pool_id, ?count, "counted pool children");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use domain::{CompareType, L7Policy, L7PolicyAction, L7Rule, L7RuleType};
    use repository::{InMemoryRepository, QuotaLimits, QuotaOperation, RepositoryError};

    use super::*;
    use crate::error::TaskError;
    use crate::task::Outcome;

    fn project() -> ProjectId {
        ProjectId::new("tenant")
    }

    async fn in_use(repo: &InMemoryRepository, kind: ResourceKind) -> i64 {
        repo.quota_in_use(&project(), kind).await.unwrap()
    }

    #[tokio::test]
    async fn test_decrement_below_zero_fails_and_leaves_counter() {
        let repo = Arc::new(InMemoryRepository::new());
        let task = DecrementQuota::new(repo.clone(), ResourceKind::Listener);

        let err = task.execute(&project()).await.unwrap_err();
        assert!(matches!(
            err,
            TaskError::Repository(RepositoryError::QuotaUnderflow { .. })
        ));
        assert!(err.to_string().contains("must never go negative"));
        assert_eq!(in_use(&repo, ResourceKind::Listener).await, 0);
    }

    #[tokio::test]
    async fn test_pool_release_is_all_or_nothing() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.set_quota_in_use(project(), ResourceKind::Pool, 1).await;
        repo.set_quota_in_use(project(), ResourceKind::HealthMonitor, 1).await;
        repo.set_quota_in_use(project(), ResourceKind::Member, 2).await;

        let input = PoolQuotaRelease {
            project_id: project(),
            children: PoolChildCount {
                health_monitors: 1,
                members: 3,
            },
        };
        assert!(DecrementPoolQuota::new(repo.clone()).execute(&input).await.is_err());

        assert_eq!(in_use(&repo, ResourceKind::Pool).await, 1);
        assert_eq!(in_use(&repo, ResourceKind::HealthMonitor).await, 1);
        assert_eq!(in_use(&repo, ResourceKind::Member).await, 2);
    }

    #[tokio::test]
    async fn test_revert_readmits_each_unit_in_its_own_session() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.set_quota_in_use(project(), ResourceKind::L7Policy, 1).await;
        repo.set_quota_in_use(project(), ResourceKind::L7Rule, 2).await;
        let policy = L7Policy::new(ResourceId::new(), project(), L7PolicyAction::Reject);
        let policy_id = policy.id;
        repo.insert_l7policy(policy).await;
        for value in ["a", "b"] {
            repo.insert_l7rule(L7Rule::new(
                policy_id,
                project(),
                L7RuleType::Path,
                CompareType::StartsWith,
                value,
            ))
            .await;
        }

        let task = DecrementL7PolicyQuota::new(repo.clone());
        let input = L7PolicyQuotaRelease {
            project_id: project(),
            l7policy_id: policy_id,
        };
        let rules = task.execute(&input).await.unwrap();
        assert_eq!(rules, 2);
        assert_eq!(in_use(&repo, ResourceKind::L7Rule).await, 0);

        repo.clear_quota_calls();
        task.revert(&input, Outcome::Succeeded(&rules)).await;

        let calls = repo.quota_calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|c| c.operation == QuotaOperation::CheckQuotaMet));
        assert_eq!(in_use(&repo, ResourceKind::L7Policy).await, 1);
        assert_eq!(in_use(&repo, ResourceKind::L7Rule).await, 2);
    }

    #[tokio::test]
    async fn test_revert_respects_limit_and_never_fails() {
        let limits = QuotaLimits::unlimited().with_default(ResourceKind::Member, 0);
        let repo = Arc::new(InMemoryRepository::with_quota_limits(limits));
        repo.set_quota_in_use(project(), ResourceKind::Member, 1).await;

        let task = DecrementQuota::new(repo.clone(), ResourceKind::Member);
        task.execute(&project()).await.unwrap();
        task.revert(&project(), Outcome::Succeeded(&())).await;

        assert_eq!(in_use(&repo, ResourceKind::Member).await, 0);
    }

    #[tokio::test]
    async fn test_own_failure_revert_issues_no_quota_calls() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.set_fail_on_decrement(true);
        let task = DecrementQuota::new(repo.clone(), ResourceKind::HealthMonitor);

        let err = task.execute(&project()).await.unwrap_err();
        repo.clear_quota_calls();
        task.revert(&project(), Outcome::Failed(&err)).await;

        assert!(repo.quota_calls().is_empty());
    }
}
