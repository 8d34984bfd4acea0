//! Provider configuration.
//!
//! Tunables for the default [`crate::provider::RingProvider`]. Every field
//! has a default, so a config file only needs to name what it overrides:
//!
//! ```json
//! { "kdf_iterations": 200000 }
//! ```

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::keys::MAX_KDF_ITERATIONS;

/// Default PBKDF2 iteration count used to lock private keys.
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;

/// Default number of random bytes behind each generated passphrase.
pub const DEFAULT_PASSPHRASE_BYTES: usize = 32;

/// Smallest accepted passphrase entropy, in bytes.
pub const MIN_PASSPHRASE_BYTES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// PBKDF2-HMAC-SHA256 iterations when locking a generated private key.
    pub kdf_iterations: u32,
    /// Random bytes drawn for each generated key passphrase.
    pub passphrase_bytes: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            passphrase_bytes: DEFAULT_PASSPHRASE_BYTES,
        }
    }
}

impl ProviderConfig {
    /// Parse and validate a JSON config document.
    pub fn from_json(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kdf_iterations == 0 {
            return Err(ConfigError::Invalid {
                field: "kdf_iterations",
                reason: "must be at least 1",
            });
        }
        if self.kdf_iterations > MAX_KDF_ITERATIONS {
            return Err(ConfigError::Invalid {
                field: "kdf_iterations",
                reason: "must be at most 10000000",
            });
        }
        if self.passphrase_bytes < MIN_PASSPHRASE_BYTES {
            return Err(ConfigError::Invalid {
                field: "passphrase_bytes",
                reason: "must be at least 16",
            });
        }
        Ok(())
    }

    pub(crate) fn iterations(&self) -> Result<NonZeroU32, ConfigError> {
        NonZeroU32::new(self.kdf_iterations).ok_or(ConfigError::Invalid {
            field: "kdf_iterations",
            reason: "must be at least 1",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config = ProviderConfig::from_json(r#"{ "kdf_iterations": 5000 }"#).unwrap();
        assert_eq!(config.kdf_iterations, 5000);
        assert_eq!(config.passphrase_bytes, DEFAULT_PASSPHRASE_BYTES);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(ProviderConfig::from_json(r#"{ "kdf_iterations": 0 }"#).is_err());
        assert!(ProviderConfig::from_json(r#"{ "kdf_iterations": 10000001 }"#).is_err());
        assert!(ProviderConfig::from_json(r#"{ "kdf_iterations": 10000000 }"#).is_ok());
        assert!(ProviderConfig::from_json(r#"{ "passphrase_bytes": 8 }"#).is_err());
        assert!(ProviderConfig::from_json(r#"{ "unknown": true }"#).is_err());
    }
}
