//! Task configuration loaded from environment variables.

use domain::VrrpAuthType;

/// Default VRRP advertisement interval, in seconds.
pub const DEFAULT_VRRP_ADVERT_INT: u32 = 1;

/// Key used to decrypt stored server certificates when none is configured.
pub const DEFAULT_SERVER_CERTS_KEY_PASSPHRASE: &str = "insecure-key-do-not-use-this-key";

/// Settings tasks need at runtime. Built once and handed to the tasks that
/// use it.
///
/// Reads from environment variables:
/// - `VRRP_ADVERT_INT`: VRRP advertisement interval in seconds (default: `1`)
/// - `VRRP_AUTH_TYPE`: `PASS` or `AH` (default: `PASS`)
/// - `SERVER_CERTS_KEY_PASSPHRASE`: symmetric key for stored amphora certificates
#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub vrrp_advert_int: u32,
    pub vrrp_auth_type: VrrpAuthType,
    pub server_certs_key_passphrase: String,
}

impl TaskConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            vrrp_advert_int: std::env::var("VRRP_ADVERT_INT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_VRRP_ADVERT_INT),
            vrrp_auth_type: std::env::var("VRRP_AUTH_TYPE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            server_certs_key_passphrase: std::env::var("SERVER_CERTS_KEY_PASSPHRASE")
                .unwrap_or_else(|_| DEFAULT_SERVER_CERTS_KEY_PASSPHRASE.to_string()),
        }
    }

    pub fn server_certs_key(&self) -> &[u8] {
        self.server_certs_key_passphrase.as_bytes()
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            vrrp_advert_int: DEFAULT_VRRP_ADVERT_INT,
            vrrp_auth_type: VrrpAuthType::default(),
            server_certs_key_passphrase: DEFAULT_SERVER_CERTS_KEY_PASSPHRASE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = TaskConfig::default();
        assert_eq!(config.vrrp_advert_int, 1);
        assert_eq!(config.vrrp_auth_type, VrrpAuthType::Pass);
        assert_eq!(config.server_certs_key(), b"insecure-key-do-not-use-this-key");
    }
}
