//! Certificate inspection consumed by the certificate-expiration task.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failure to decrypt or parse a stored certificate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CertificateError(pub String);

/// Reads the expiration date out of an encrypted certificate bundle.
///
/// Implemented outside this crate by whatever owns the certificate format.
pub trait CertificateInspector: Send + Sync {
    /// Decrypts `encrypted_pem` with `key` and returns the certificate's
    /// not-after date.
    fn expiration(
        &self,
        key: &[u8],
        encrypted_pem: &[u8],
    ) -> Result<DateTime<Utc>, CertificateError>;
}
