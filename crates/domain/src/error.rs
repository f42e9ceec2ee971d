//! Domain error types.

use thiserror::Error;

use crate::amphora::AmphoraStatus;
use crate::resource::EntityRef;
use crate::status::ProvisioningStatus;

/// Errors raised by domain rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// The requested provisioning status change is not a legal transition.
    #[error("{entity} cannot move from {from} to {to}")]
    InvalidTransition {
        entity: EntityRef,
        from: ProvisioningStatus,
        to: ProvisioningStatus,
    },

    /// The requested amphora status change is not a legal transition.
    #[error("amphora {amphora_id} cannot move from {from} to {to}")]
    InvalidAmphoraTransition {
        amphora_id: common::ResourceId,
        from: AmphoraStatus,
        to: AmphoraStatus,
    },

    /// A status string did not name a known status.
    #[error("Unknown status: {0}")]
    UnknownStatus(String),

    /// A string did not name a known VRRP authentication type.
    #[error("Unknown VRRP auth type: {0}")]
    UnknownAuthType(String),
}

/// Convenience type alias for domain results.
pub type Result<T> = std::result::Result<T, DomainError>;
