//! Repository adapter for load-balancer provisioning state.
//!
//! This crate provides:
//! - the [`Repository`] trait every task talks to
//! - exclusive [`QuotaSession`]s over the per-project quota ledger
//! - [`InMemoryRepository`], a complete backend with fault injection

pub mod error;
pub mod memory;
pub mod quota;
pub mod store;

pub use error::{RepositoryError, Result};
pub use memory::{InMemoryQuotaSession, InMemoryRepository, RepositorySnapshot};
pub use quota::{QuotaCall, QuotaLedger, QuotaLimits, QuotaOperation};
pub use store::{QuotaSession, Repository, RepositoryExt};
