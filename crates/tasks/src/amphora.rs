//! Amphora record tasks: creation, lifecycle marks, role assignment, and
//! network, compute and certificate details.

use std::borrow::Cow;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::ResourceId;
use domain::{Amphora, AmphoraStatus, AmphoraUpdate, AmphoraVipData, RoleAssignment, Vip};
use repository::Repository;

use crate::cert::CertificateInspector;
use crate::compensation;
use crate::config::TaskConfig;
use crate::error::{Result, TaskError};
use crate::task::Task;

/// VRRP id written to every amphora; one VRRP instance per amphora.
const VRRP_ID: u32 = 1;

/// Checks the lifecycle transition against the stored status, then writes
/// the update with the new status.
async fn transition<R>(repo: &R, amphora_id: ResourceId, update: AmphoraUpdate) -> Result<()>
where
    R: Repository + ?Sized,
{
    if let Some(target) = update.status {
        let current = repo.get_amphora(amphora_id).await?;
        current.status.check_transition(amphora_id, target)?;
    }
    repo.update_amphora(amphora_id, update).await?;
    Ok(())
}

async fn mark_amphora_error<R>(repo: &R, amphora_id: ResourceId, update: AmphoraUpdate, task: &str)
where
    R: Repository + ?Sized,
{
    tracing::warn!(task, %amphora_id, "marking amphora ERROR");
    let update = AmphoraUpdate {
        status: Some(AmphoraStatus::Error),
        ..update
    };
    compensation::best_effort(task, repo.update_amphora(amphora_id, update)).await;
}

/// Revert for tasks that overwrite amphora details: the prior values are
/// not kept, so the amphora goes to ERROR with the new details in place.
async fn revert_details<R>(repo: &R, amphora_id: ResourceId, task: &str)
where
    R: Repository + ?Sized,
{
    mark_amphora_error(repo, amphora_id, AmphoraUpdate::default(), task).await;
}

/// Inserts a new amphora record in PENDING_CREATE and returns it.
/// Revert deletes the record.
pub struct CreateAmphoraInDb<R> {
    repo: Arc<R>,
}

impl<R: Repository> CreateAmphoraInDb<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for CreateAmphoraInDb<R> {
    /// Load balancer the amphora is built for, if already known.
    type Input = Option<ResourceId>;
    type Output = Amphora;

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("create-amphora-in-db")
    }

    async fn execute(&self, load_balancer_id: &Option<ResourceId>) -> Result<Amphora> {
        let amphora = self
            .repo
            .create_amphora(Amphora::pending(*load_balancer_id))
            .await?;
        tracing::debug!(amphora_id = %amphora.id, "created amphora record");
        Ok(amphora)
    }

    async fn compensate(&self, _input: &Option<ResourceId>, amphora: &Amphora) -> Result<()> {
        tracing::warn!(amphora_id = %amphora.id, "reverting amphora creation, deleting record");
        match self.repo.delete_amphora(amphora.id).await {
            Ok(()) => Ok(()),
            Err(error) if error.is_not_found() => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

/// Where an amphora landed: its compute instance and management address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmphoraPlacement {
    pub amphora_id: ResourceId,
    pub compute_id: String,
    pub lb_network_ip: Option<IpAddr>,
    pub load_balancer_id: Option<ResourceId>,
}

impl AmphoraPlacement {
    pub fn new(amphora_id: ResourceId, compute_id: impl Into<String>) -> Self {
        Self {
            amphora_id,
            compute_id: compute_id.into(),
            lb_network_ip: None,
            load_balancer_id: None,
        }
    }

    pub fn with_lb_network_ip(mut self, ip: IpAddr) -> Self {
        self.lb_network_ip = Some(ip);
        self
    }

    pub fn with_load_balancer(mut self, load_balancer_id: ResourceId) -> Self {
        self.load_balancer_id = Some(load_balancer_id);
        self
    }

    fn lb_network_ip(&self) -> Result<IpAddr> {
        self.lb_network_ip.ok_or_else(|| {
            TaskError::InvalidInput(format!(
                "amphora {} has no management network address",
                self.amphora_id
            ))
        })
    }
}

/// Marks an amphora BOOTING and records its compute id.
pub struct MarkAmphoraBooting<R> {
    repo: Arc<R>,
}

impl<R: Repository> MarkAmphoraBooting<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for MarkAmphoraBooting<R> {
    type Input = AmphoraPlacement;
    type Output = ();

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("mark-amphora-booting")
    }

    async fn execute(&self, placement: &AmphoraPlacement) -> Result<()> {
        let update = AmphoraUpdate::status(AmphoraStatus::Booting)
            .with_compute_id(placement.compute_id.clone());
        transition(self.repo.as_ref(), placement.amphora_id, update).await?;
        tracing::debug!(amphora_id = %placement.amphora_id, compute_id = %placement.compute_id, "amphora BOOTING");
        Ok(())
    }

    async fn compensate(&self, placement: &AmphoraPlacement, _output: &()) -> Result<()> {
        let keep = AmphoraUpdate::default().with_compute_id(placement.compute_id.clone());
        mark_amphora_error(self.repo.as_ref(), placement.amphora_id, keep, &self.name()).await;
        Ok(())
    }
}

/// Marks an amphora ALLOCATED to a load balancer.
pub struct MarkAmphoraAllocated<R> {
    repo: Arc<R>,
}

impl<R: Repository> MarkAmphoraAllocated<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for MarkAmphoraAllocated<R> {
    type Input = AmphoraPlacement;
    type Output = ();

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("mark-amphora-allocated")
    }

    async fn execute(&self, placement: &AmphoraPlacement) -> Result<()> {
        let load_balancer_id = placement.load_balancer_id.ok_or_else(|| {
            TaskError::InvalidInput(format!(
                "amphora {} has no load balancer to be allocated to",
                placement.amphora_id
            ))
        })?;
        let update = AmphoraUpdate::status(AmphoraStatus::Allocated)
            .with_compute_id(placement.compute_id.clone())
            .with_lb_network_ip(placement.lb_network_ip()?)
            .with_load_balancer(Some(load_balancer_id));
        transition(self.repo.as_ref(), placement.amphora_id, update).await?;
        tracing::info!(
            amphora_id = %placement.amphora_id,
            compute_id = %placement.compute_id,
            %load_balancer_id,
            "amphora ALLOCATED"
        );
        Ok(())
    }

    async fn compensate(&self, placement: &AmphoraPlacement, _output: &()) -> Result<()> {
        mark_amphora_error(
            self.repo.as_ref(),
            placement.amphora_id,
            AmphoraUpdate::default(),
            &self.name(),
        )
        .await;
        Ok(())
    }
}

/// Marks a spare amphora READY.
pub struct MarkAmphoraReady<R> {
    repo: Arc<R>,
}

impl<R: Repository> MarkAmphoraReady<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for MarkAmphoraReady<R> {
    type Input = AmphoraPlacement;
    type Output = ();

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("mark-amphora-ready")
    }

    async fn execute(&self, placement: &AmphoraPlacement) -> Result<()> {
        let update = AmphoraUpdate::status(AmphoraStatus::Ready)
            .with_compute_id(placement.compute_id.clone())
            .with_lb_network_ip(placement.lb_network_ip()?);
        transition(self.repo.as_ref(), placement.amphora_id, update).await?;
        tracing::info!(
            amphora_id = %placement.amphora_id,
            compute_id = %placement.compute_id,
            "amphora READY"
        );
        Ok(())
    }

    async fn compensate(&self, placement: &AmphoraPlacement, _output: &()) -> Result<()> {
        let keep = AmphoraUpdate::default()
            .with_compute_id(placement.compute_id.clone());
        mark_amphora_error(self.repo.as_ref(), placement.amphora_id, keep, &self.name()).await;
        Ok(())
    }
}

/// Moves an amphora to PENDING_UPDATE, PENDING_DELETE or DELETED.
/// Revert marks it ERROR.
pub struct MarkAmphoraStatus<R> {
    repo: Arc<R>,
    status: AmphoraStatus,
}

impl<R: Repository> MarkAmphoraStatus<R> {
    pub fn pending_update(repo: Arc<R>) -> Self {
        Self {
            repo,
            status: AmphoraStatus::PendingUpdate,
        }
    }

    pub fn pending_delete(repo: Arc<R>) -> Self {
        Self {
            repo,
            status: AmphoraStatus::PendingDelete,
        }
    }

    pub fn deleted(repo: Arc<R>) -> Self {
        Self {
            repo,
            status: AmphoraStatus::Deleted,
        }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for MarkAmphoraStatus<R> {
    type Input = ResourceId;
    type Output = ();

    fn name(&self) -> Cow<'static, str> {
        Cow::Owned(format!("mark-amphora-{}", self.status.as_str().to_lowercase()))
    }

    async fn execute(&self, amphora_id: &ResourceId) -> Result<()> {
        transition(self.repo.as_ref(), *amphora_id, AmphoraUpdate::status(self.status)).await?;
        tracing::debug!(%amphora_id, status = %self.status, "amphora marked");
        Ok(())
    }

    async fn compensate(&self, amphora_id: &ResourceId, _output: &()) -> Result<()> {
        mark_amphora_error(self.repo.as_ref(), *amphora_id, AmphoraUpdate::default(), &self.name())
            .await;
        Ok(())
    }
}

/// Marks every amphora of a load balancer DELETED and returns their ids.
/// Revert marks each of them ERROR.
pub struct MarkLbAmphoraeDeleted<R> {
    repo: Arc<R>,
}

impl<R: Repository> MarkLbAmphoraeDeleted<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for MarkLbAmphoraeDeleted<R> {
    type Input = ResourceId;
    type Output = Vec<ResourceId>;

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("mark-load-balancer-amphorae-deleted")
    }

    async fn execute(&self, lb_id: &ResourceId) -> Result<Vec<ResourceId>> {
        let mut marked = Vec::new();
        for amphora in self.repo.list_amphorae(*lb_id).await? {
            self.repo
                .update_amphora(amphora.id, AmphoraUpdate::status(AmphoraStatus::Deleted))
                .await?;
            marked.push(amphora.id);
        }
        tracing::debug!(load_balancer_id = %lb_id, count = marked.len(), "amphorae DELETED");
        Ok(marked)
    }

    async fn compensate(&self, _lb_id: &ResourceId, marked: &Vec<ResourceId>) -> Result<()> {
        let name = self.name();
        for amphora_id in marked {
            mark_amphora_error(self.repo.as_ref(), *amphora_id, AmphoraUpdate::default(), &name)
                .await;
        }
        Ok(())
    }
}

/// Assigns a topology role, with the VRRP priority it implies.
///
/// Revert clears role and priority together.
pub struct MarkAmphoraRole<R> {
    repo: Arc<R>,
    role: RoleAssignment,
}

impl<R: Repository> MarkAmphoraRole<R> {
    pub fn new(repo: Arc<R>, role: RoleAssignment) -> Self {
        Self { repo, role }
    }

    async fn write(&self, amphora_id: ResourceId, role: Option<RoleAssignment>) -> Result<()> {
        let update = AmphoraUpdate {
            role: Some(role),
            ..AmphoraUpdate::default()
        };
        self.repo.update_amphora(amphora_id, update).await?;
        Ok(())
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for MarkAmphoraRole<R> {
    type Input = ResourceId;
    type Output = ();

    fn name(&self) -> Cow<'static, str> {
        Cow::Owned(format!(
            "mark-amphora-{}",
            self.role.role().as_str().to_lowercase()
        ))
    }

    async fn execute(&self, amphora_id: &ResourceId) -> Result<()> {
        tracing::debug!(
            %amphora_id,
            role = %self.role.role(),
            priority = ?self.role.vrrp_priority(),
            "setting amphora role"
        );
        self.write(*amphora_id, Some(self.role)).await
    }

    async fn compensate(&self, amphora_id: &ResourceId, _output: &()) -> Result<()> {
        tracing::warn!(%amphora_id, "reverting amphora role, clearing role and priority");
        self.write(*amphora_id, None).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmphoraAssociation {
    pub amphora_id: ResourceId,
    pub load_balancer_id: ResourceId,
}

/// Points a failover amphora at the load balancer it replaces an amphora
/// of. Revert clears the association.
pub struct AssociateFailoverAmphoraWithLb<R> {
    repo: Arc<R>,
}

impl<R: Repository> AssociateFailoverAmphoraWithLb<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for AssociateFailoverAmphoraWithLb<R> {
    type Input = AmphoraAssociation;
    type Output = ();

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("associate-failover-amphora-with-load-balancer")
    }

    async fn execute(&self, input: &AmphoraAssociation) -> Result<()> {
        let update = AmphoraUpdate::default().with_load_balancer(Some(input.load_balancer_id));
        self.repo.update_amphora(input.amphora_id, update).await?;
        Ok(())
    }

    async fn compensate(&self, input: &AmphoraAssociation, _output: &()) -> Result<()> {
        tracing::warn!(
            amphora_id = %input.amphora_id,
            "reverting failover association, clearing load balancer"
        );
        let update = AmphoraUpdate::default().with_load_balancer(None);
        self.repo.update_amphora(input.amphora_id, update).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeIdAssignment {
    pub amphora_id: ResourceId,
    pub compute_id: String,
}

/// Records the compute instance of an amphora. Revert marks it ERROR.
pub struct UpdateAmphoraComputeId<R> {
    repo: Arc<R>,
}

impl<R: Repository> UpdateAmphoraComputeId<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for UpdateAmphoraComputeId<R> {
    type Input = ComputeIdAssignment;
    type Output = ();

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("update-amphora-compute-id")
    }

    async fn execute(&self, input: &ComputeIdAssignment) -> Result<()> {
        let update = AmphoraUpdate::default().with_compute_id(input.compute_id.clone());
        self.repo.update_amphora(input.amphora_id, update).await?;
        Ok(())
    }

    async fn compensate(&self, input: &ComputeIdAssignment, _output: &()) -> Result<()> {
        revert_details(self.repo.as_ref(), input.amphora_id, &self.name()).await;
        Ok(())
    }
}

/// Facts about the compute instance backing an amphora.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeDetails {
    pub amphora_id: ResourceId,
    pub lb_network_ip: IpAddr,
    pub cached_zone: Option<String>,
    pub image_id: Option<String>,
    pub compute_flavor: Option<String>,
}

/// Records compute details and returns the reloaded amphora. Revert marks
/// the amphora ERROR.
pub struct UpdateAmphoraInfo<R> {
    repo: Arc<R>,
}

impl<R: Repository> UpdateAmphoraInfo<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for UpdateAmphoraInfo<R> {
    type Input = ComputeDetails;
    type Output = Amphora;

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("update-amphora-info")
    }

    async fn execute(&self, details: &ComputeDetails) -> Result<Amphora> {
        let update = AmphoraUpdate {
            lb_network_ip: Some(details.lb_network_ip),
            cached_zone: details.cached_zone.clone(),
            image_id: details.image_id.clone(),
            compute_flavor: details.compute_flavor.clone(),
            ..AmphoraUpdate::default()
        };
        self.repo.update_amphora(details.amphora_id, update).await?;
        Ok(self.repo.get_amphora(details.amphora_id).await?)
    }

    async fn compensate(&self, details: &ComputeDetails, _output: &Amphora) -> Result<()> {
        revert_details(self.repo.as_ref(), details.amphora_id, &self.name()).await;
        Ok(())
    }
}

/// VRRP addressing for one amphora.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmphoraVipAssignment {
    pub amphora_id: ResourceId,
    pub vip_data: AmphoraVipData,
}

async fn write_vip_data<R>(repo: &R, assignment: &AmphoraVipAssignment) -> Result<()>
where
    R: Repository + ?Sized,
{
    let update = AmphoraUpdate {
        vip_data: Some(AmphoraVipData {
            vrrp_id: VRRP_ID,
            ..assignment.vip_data.clone()
        }),
        ..AmphoraUpdate::default()
    };
    repo.update_amphora(assignment.amphora_id, update).await?;
    Ok(())
}

/// Records the VRRP addressing of one amphora. Revert marks it ERROR.
pub struct UpdateAmphoraVipData<R> {
    repo: Arc<R>,
}

impl<R: Repository> UpdateAmphoraVipData<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for UpdateAmphoraVipData<R> {
    type Input = AmphoraVipAssignment;
    type Output = ();

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("update-amphora-vip-data")
    }

    async fn execute(&self, assignment: &AmphoraVipAssignment) -> Result<()> {
        write_vip_data(self.repo.as_ref(), assignment).await
    }

    async fn compensate(&self, assignment: &AmphoraVipAssignment, _output: &()) -> Result<()> {
        revert_details(self.repo.as_ref(), assignment.amphora_id, &self.name()).await;
        Ok(())
    }
}

/// Records the VRRP addressing of several amphorae. Revert marks each of
/// them ERROR.
pub struct UpdateAmphoraeVipData<R> {
    repo: Arc<R>,
}

impl<R: Repository> UpdateAmphoraeVipData<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for UpdateAmphoraeVipData<R> {
    type Input = Vec<AmphoraVipAssignment>;
    type Output = ();

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("update-amphorae-vip-data")
    }

    async fn execute(&self, assignments: &Vec<AmphoraVipAssignment>) -> Result<()> {
        for assignment in assignments {
            write_vip_data(self.repo.as_ref(), assignment).await?;
        }
        Ok(())
    }

    async fn compensate(
        &self,
        assignments: &Vec<AmphoraVipAssignment>,
        _output: &(),
    ) -> Result<()> {
        let name = self.name();
        for assignment in assignments {
            revert_details(self.repo.as_ref(), assignment.amphora_id, &name).await;
        }
        Ok(())
    }
}

/// The network port an amphora is plugged into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasePort {
    pub id: String,
    pub fixed_ips: Vec<IpAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailoverDetails {
    pub amphora_id: ResourceId,
    pub base_port: BasePort,
    pub vip: Vip,
}

impl FailoverDetails {
    fn vip_data(&self) -> Result<AmphoraVipData> {
        let missing = |what: &str| {
            TaskError::InvalidInput(format!("failover of amphora {} has no {what}", self.amphora_id))
        };
        Ok(AmphoraVipData {
            vrrp_ip: *self
                .base_port
                .fixed_ips
                .first()
                .ok_or_else(|| missing("base port address"))?,
            ha_ip: self.vip.ip_address.ok_or_else(|| missing("VIP address"))?,
            vrrp_port_id: self.base_port.id.clone(),
            ha_port_id: self.vip.port_id.clone().ok_or_else(|| missing("VIP port"))?,
            vrrp_id: VRRP_ID,
        })
    }
}

/// Records the VRRP addressing of a failover amphora: the first address
/// of its base port and the load balancer's VIP. Revert marks it ERROR.
pub struct UpdateAmpFailoverDetails<R> {
    repo: Arc<R>,
}

impl<R: Repository> UpdateAmpFailoverDetails<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for UpdateAmpFailoverDetails<R> {
    type Input = FailoverDetails;
    type Output = ();

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("update-amphora-failover-details")
    }

    async fn execute(&self, details: &FailoverDetails) -> Result<()> {
        let assignment = AmphoraVipAssignment {
            amphora_id: details.amphora_id,
            vip_data: details.vip_data()?,
        };
        write_vip_data(self.repo.as_ref(), &assignment).await
    }

    async fn compensate(&self, details: &FailoverDetails, _output: &()) -> Result<()> {
        revert_details(self.repo.as_ref(), details.amphora_id, &self.name()).await;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmphoraCertificate {
    pub amphora_id: ResourceId,
    /// Encrypted server certificate bundle.
    pub server_pem: Vec<u8>,
}

/// Stores the expiration date of an amphora's server certificate. Revert
/// marks the amphora ERROR.
pub struct UpdateAmphoraCertExpiration<R> {
    repo: Arc<R>,
    inspector: Arc<dyn CertificateInspector>,
    config: Arc<TaskConfig>,
}

impl<R: Repository> UpdateAmphoraCertExpiration<R> {
    pub fn new(
        repo: Arc<R>,
        inspector: Arc<dyn CertificateInspector>,
        config: Arc<TaskConfig>,
    ) -> Self {
        Self {
            repo,
            inspector,
            config,
        }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for UpdateAmphoraCertExpiration<R> {
    type Input = AmphoraCertificate;
    type Output = DateTime<Utc>;

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("update-amphora-cert-expiration")
    }

    async fn execute(&self, cert: &AmphoraCertificate) -> Result<DateTime<Utc>> {
        let expiration = self
            .inspector
            .expiration(self.config.server_certs_key(), &cert.server_pem)?;
        let update = AmphoraUpdate {
            cert_expiration: Some(expiration),
            ..AmphoraUpdate::default()
        };
        self.repo.update_amphora(cert.amphora_id, update).await?;
        tracing::debug!(amphora_id = %cert.amphora_id, %expiration, "certificate expiration recorded");
        Ok(expiration)
    }

    async fn compensate(&self, cert: &AmphoraCertificate, _output: &DateTime<Utc>) -> Result<()> {
        revert_details(self.repo.as_ref(), cert.amphora_id, &self.name()).await;
        Ok(())
    }
}

/// Clears the flag marking an amphora's certificate rotation in progress
/// and returns whether it was set.
///
/// Revert sets the flag again. If it was already clear there is nothing to
/// restore, and the amphora is marked ERROR instead.
pub struct ClearAmphoraCertBusy<R> {
    repo: Arc<R>,
}

impl<R: Repository> ClearAmphoraCertBusy<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    async fn write(&self, amphora_id: ResourceId, busy: bool) -> Result<()> {
        let update = AmphoraUpdate {
            cert_busy: Some(busy),
            ..AmphoraUpdate::default()
        };
        self.repo.update_amphora(amphora_id, update).await?;
        Ok(())
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for ClearAmphoraCertBusy<R> {
    type Input = ResourceId;
    type Output = bool;

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("clear-amphora-cert-busy")
    }

    async fn execute(&self, amphora_id: &ResourceId) -> Result<bool> {
        let was_busy = self.repo.get_amphora(*amphora_id).await?.cert_busy;
        self.write(*amphora_id, false).await?;
        Ok(was_busy)
    }

    async fn compensate(&self, amphora_id: &ResourceId, was_busy: &bool) -> Result<()> {
        if *was_busy {
            tracing::warn!(%amphora_id, "reverting certificate busy flag");
            return self.write(*amphora_id, true).await;
        }
        revert_details(self.repo.as_ref(), *amphora_id, &self.name()).await;
        Ok(())
    }
}

pub struct ReloadAmphora<R> {
    repo: Arc<R>,
}

impl<R: Repository> ReloadAmphora<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for ReloadAmphora<R> {
    type Input = ResourceId;
    type Output = Amphora;

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("reload-amphora")
    }

    async fn execute(&self, amphora_id: &ResourceId) -> Result<Amphora> {
        Ok(self.repo.get_amphora(*amphora_id).await?)
    }
}

/// Lists the amphorae of a load balancer that are not DELETED.
pub struct GetAmphoraeFromLoadBalancer<R> {
    repo: Arc<R>,
}

impl<R: Repository> GetAmphoraeFromLoadBalancer<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: Repository + 'static> Task for GetAmphoraeFromLoadBalancer<R> {
    type Input = ResourceId;
    type Output = Vec<Amphora>;

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("get-amphorae-from-load-balancer")
    }

    async fn execute(&self, lb_id: &ResourceId) -> Result<Vec<Amphora>> {
        Ok(self
            .repo
            .list_amphorae(*lb_id)
            .await?
            .into_iter()
            .filter(|a| a.status != AmphoraStatus::Deleted)
            .collect())
    }
}
