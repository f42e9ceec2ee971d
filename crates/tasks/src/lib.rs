//! Execute/revert tasks for load-balancer provisioning flows.
//!
//! This crate provides the compensating-transaction layer between a
//! workflow engine and the provisioning repository:
//! - the [`Task`] contract and a linear [`Flow`] runner that reverts
//!   executed tasks in reverse order when a later one fails
//! - per-resource status marks, updates and deletes
//! - cascading status propagation over a load balancer tree
//! - quota release on delete and best-effort re-admission on revert
//! - amphora lifecycle, role and network bookkeeping
//! - health-manager coordination (disable monitoring, mark busy)

pub mod amphora;
pub mod cert;
pub mod compensation;
pub mod config;
pub mod delete;
pub mod error;
pub mod flow;
pub mod health;
pub mod lifecycle;
pub mod load_balancer;
pub mod propagate;
pub mod quota;
pub mod state;
pub mod task;
pub mod update;

pub use amphora::{
    AmphoraAssociation, AmphoraCertificate, AmphoraPlacement, AmphoraVipAssignment,
    AssociateFailoverAmphoraWithLb, BasePort, ClearAmphoraCertBusy, ComputeDetails,
    ComputeIdAssignment, CreateAmphoraInDb, FailoverDetails, GetAmphoraeFromLoadBalancer,
    MarkAmphoraAllocated, MarkAmphoraBooting, MarkAmphoraReady, MarkAmphoraRole,
    MarkAmphoraStatus, MarkLbAmphoraeDeleted, ReloadAmphora, UpdateAmpFailoverDetails,
    UpdateAmphoraCertExpiration, UpdateAmphoraComputeId, UpdateAmphoraInfo, UpdateAmphoraVipData,
    UpdateAmphoraeVipData,
};
pub use cert::{CertificateError, CertificateInspector};
pub use config::TaskConfig;
pub use delete::{DeleteHealthMonitorByPool, DeleteResourceInDb};
pub use error::{Result, TaskError};
pub use flow::{Binding, Flow, FlowFailure, FlowReport, Slot};
pub use health::{
    DisableAmphoraHealthMonitoring, DisableLbAmphoraeHealthMonitoring, MarkAmphoraHealthBusy,
    MarkLbAmphoraeHealthBusy,
};
pub use lifecycle::MarkProvisioningStatus;
pub use load_balancer::{
    CreateVrrpGroupForLb, GetListenersFromLoadBalancer, GetVipFromLoadBalancer, LbAndListeners,
    ListenerRef, MarkLbActive, MarkLbActiveByListener, MarkLbAndListenersActive,
    ReloadLoadBalancer, ServerGroupAssignment, UpdateLbServerGroup, UpdateVipAfterAllocation,
    VipAllocation,
};
pub use propagate::{PropagationReport, StatusPropagator};
pub use quota::{
    CountPoolChildrenForQuota, DecrementL7PolicyQuota, DecrementPoolQuota, DecrementQuota,
    L7PolicyQuotaRelease, PoolQuotaRelease,
};
pub use state::FlowState;
pub use task::{Outcome, Task};
pub use update::{
    PriorOperatingStatus, ResourceUpdateRequest, UpdatePoolMembersOperatingStatus,
    UpdateResourceInDb,
};
