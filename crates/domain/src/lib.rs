//! Domain model for load-balancer provisioning.
//!
//! This crate provides:
//! - the resource tree (load balancer, listeners, L7 policies/rules, pools,
//!   members, health monitors) and amphorae
//! - provisioning and operating status vocabulary with legal transitions
//! - typed partial updates and references addressing any resource

pub mod amphora;
pub mod error;
pub mod l7;
pub mod listener;
pub mod load_balancer;
pub mod pool;
pub mod resource;
pub mod status;
pub mod tree;
pub mod update;

pub use amphora::{
    Amphora, AmphoraHealth, AmphoraRole, AmphoraStatus, AmphoraUpdate, AmphoraVipData,
    ROLE_BACKUP_PRIORITY, ROLE_MASTER_PRIORITY, RoleAssignment,
};
pub use error::DomainError;
pub use l7::{CompareType, L7Policy, L7PolicyAction, L7PolicyUpdate, L7Rule, L7RuleType, L7RuleUpdate};
pub use listener::{Listener, ListenerUpdate, Protocol};
pub use load_balancer::{LoadBalancer, LoadBalancerUpdate, Vip, VipUpdate, VrrpAuthType, VrrpGroup};
pub use pool::{
    HealthMonitor, HealthMonitorUpdate, LbAlgorithm, Member, MemberUpdate, MonitorType, Pool,
    PoolChildCount, PoolUpdate, SessionPersistence,
};
pub use resource::{EntityRef, ResourceKind, StatusChange, StatusRecord};
pub use status::{OperatingStatus, ProvisioningStatus};
pub use tree::{L7PolicyNode, ListenerNode, LoadBalancerTree, PoolNode};
pub use update::ResourceUpdate;
