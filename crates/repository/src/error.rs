use common::{ProjectId, ResourceId};
use domain::ResourceKind;
use thiserror::Error;

/// Errors that can occur when interacting with the repository.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// No row exists for the requested entity.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: ResourceId },

    /// A row with the same identity already exists.
    #[error("{entity} already exists: {id}")]
    Duplicate { entity: &'static str, id: ResourceId },

    /// A decrement would take a project's usage below zero.
    #[error(
        "project quota for kind {kind} must never go negative: project {project_id} has {in_use} in use, asked to release {requested}"
    )]
    QuotaUnderflow {
        kind: ResourceKind,
        project_id: ProjectId,
        in_use: i64,
        requested: u32,
    },

    /// The backing store could not complete the operation.
    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    pub fn not_found(entity: &'static str, id: ResourceId) -> Self {
        RepositoryError::NotFound { entity, id }
    }

    /// Returns true if the error only says the row is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound { .. })
    }
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;
