//! # vaultkey
//!
//! Client-side key hierarchy for end-to-end encrypted vaults.
//!
//! A vault is protected by three generated keys, chained under the owner's
//! address key: a signing key certified by the address key, a vault key and
//! an item key certified by the signing key. Every key passphrase is
//! encrypted to its parent, and the vault's metadata is encrypted to the
//! vault key with signatures from both the vault key and the address key.
//! The result is a [`CreateVaultRequest`] a server can store without being
//! able to read or forge any of it.
//!
//! Vaults and items are shared by re-wrapping the existing key's passphrase
//! for each recipient; see [`share`].
//!
//! ## Public API
//!
//! - [`build_create_vault_request`] / [`build_vault`]: create a vault.
//! - [`open_vault`]: verify and decrypt one.
//! - [`ShareInviteAggregator`], [`ShareKeyRewrapper`], [`prepare_invites`]:
//!   share one.
//! - [`CryptoProvider`]: the primitive operations everything above is
//!   written against, with [`RingProvider`] as the default implementation.

pub mod armor;
pub mod config;
pub(crate) mod crypto;
pub mod error;
pub mod keys;
pub mod message;
pub mod provider;
pub mod share;
pub mod signature;
pub mod vault;
pub mod wrapper;

pub use config::ProviderConfig;
pub use error::{Artifact, ConfigError, CryptoFailure, ShareError};
pub use keys::{AsymmetricKey, Fingerprint, KeyRole, Passphrase, PublicKey};
pub use provider::{ArmoredMessage, ArmoredSignature, CryptoProvider, RingProvider};
pub use share::{
    prepare_invites, InviteBatch, InviteKey, InviteeData, Inviter, ShareInviteAggregator, ShareKeyRewrapper,
    ShareRole, ShareTarget, ShareTargetKind, SharedKey, SharingInfos, SharingPlan,
};
pub use vault::{
    build_create_vault_request, build_vault, open_vault, CreateVaultRequest, CreatedVault, OpenedVault,
    VaultContent, VaultContentProvider, VaultDisplay, VaultSecrets, CONTENT_FORMAT_VERSION,
};
pub use wrapper::{FingerprintSignature, KeyWrapper, WrappedKeyNode, WrappedPassphrase};

#[cfg(test)]
pub(crate) mod testing {
    use crate::config::ProviderConfig;
    use crate::keys::{AsymmetricKey, Passphrase};
    use crate::provider::{CryptoProvider, RingProvider};

    /// A provider with a cheap key-locking KDF.
    pub(crate) fn provider() -> RingProvider {
        RingProvider::new(&ProviderConfig {
            kdf_iterations: 10,
            ..ProviderConfig::default()
        })
        .unwrap()
    }

    pub(crate) fn address(provider: &RingProvider) -> (AsymmetricKey, Passphrase) {
        provider.generate_key_pair("AddressKey").unwrap()
    }
}
