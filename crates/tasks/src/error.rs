//! Task error types.

use common::ResourceId;
use domain::DomainError;
use repository::RepositoryError;
use thiserror::Error;

use crate::cert::CertificateError;
use crate::state::FlowState;

/// Errors a task's execute can fail with.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Repository error.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// A domain rule rejected the change, typically an illegal status transition.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// An input the task needs was not provided by an earlier step.
    #[error("Missing input: {0}")]
    MissingInput(&'static str),

    /// An input was present but unusable.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Some resources under a load balancer could not be given the new status.
    #[error(
        "status propagation under load balancer {load_balancer_id} failed for {failed} of {attempted} resources"
    )]
    Propagation {
        load_balancer_id: ResourceId,
        failed: usize,
        attempted: usize,
    },

    /// The certificate inspector could not read a certificate.
    #[error("Certificate error: {0}")]
    Certificate(#[from] CertificateError),

    /// A flow was asked to move between states it cannot move between,
    /// such as running twice.
    #[error("Invalid flow state change: {from} -> {to}")]
    InvalidFlowState { from: FlowState, to: FlowState },
}

/// Convenience type alias for task results.
pub type Result<T> = std::result::Result<T, TaskError>;
