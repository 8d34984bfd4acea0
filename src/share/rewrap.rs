//! Re-wrapping an existing key for a share recipient.
//!
//! The shared key itself never changes. Its passphrase is checked against
//! the key, then encrypted to the recipient and split into packets, exactly
//! like the passphrases of a freshly built hierarchy.
//!
//! Signed invite keys additionally carry the inviter's signature over the
//! passphrase, made under [`SignatureContext::EXISTING_USER_INVITE`] and
//! encrypted to the recipient. Recipients without keys get a signature over
//! `email || 0x00 || fingerprint` made under
//! [`SignatureContext::NEW_USER_INVITE`] instead.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::armor;
use crate::error::{Artifact, CryptoFailure};
use crate::keys::{AsymmetricKey, Passphrase, PublicKey};
use crate::provider::{ArmoredSignature, CryptoProvider};
use crate::share::aggregator::ShareTargetKind;
use crate::signature::SignatureContext;
use crate::vault::VaultSecrets;
use crate::wrapper::{KeyWrapper, WrappedPassphrase};

/// The key being shared, with the passphrase that unlocks it.
#[derive(Debug, Clone, Copy)]
pub struct SharedKey<'a> {
    pub kind: ShareTargetKind,
    pub key: &'a AsymmetricKey,
    pub passphrase: &'a Passphrase,
    /// Rotation of the shared key, echoed back to the server.
    pub rotation: u64,
}

impl<'a> SharedKey<'a> {
    /// The vault key for vault shares, the item key for item shares.
    pub fn select(kind: ShareTargetKind, secrets: &'a VaultSecrets, rotation: u64) -> Self {
        let (key, passphrase) = match kind {
            ShareTargetKind::Vault => (&secrets.vault_key, &secrets.vault_passphrase),
            ShareTargetKind::Item => (&secrets.item_key, &secrets.item_passphrase),
        };
        Self {
            kind,
            key,
            passphrase,
            rotation,
        }
    }
}

/// The inviting user's address key.
#[derive(Debug, Clone, Copy)]
pub struct Inviter<'a> {
    pub key: &'a AsymmetricKey,
    pub passphrase: &'a Passphrase,
}

/// A shared key passphrase rewrapped for an existing user, with the
/// inviter's encrypted signature. All fields except the rotation are base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InviteKey {
    pub key_rotation: u64,
    pub key_packet: String,
    pub data_packet: String,
    pub encrypted_signature: String,
}

pub struct ShareKeyRewrapper<'a, P: CryptoProvider + ?Sized> {
    provider: &'a P,
}

impl<'a, P: CryptoProvider + ?Sized> ShareKeyRewrapper<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self { provider }
    }

    /// Wrap the passphrase of `existing_key` for `recipient`.
    ///
    /// Fails with `KeyUnlock(SharedKey)` when the passphrase does not unlock
    /// the key, before anything is encrypted.
    pub fn rewrap(
        &self,
        existing_key: &AsymmetricKey,
        existing_passphrase: &Passphrase,
        recipient: &PublicKey,
    ) -> Result<WrappedPassphrase, CryptoFailure> {
        self.provider
            .check_passphrase(existing_key, existing_passphrase)
            .map_err(|_| CryptoFailure::KeyUnlock(Artifact::SharedKey))?;
        let wrapped = KeyWrapper::new(self.provider).wrap_passphrase(existing_passphrase, recipient, Artifact::SharedKey)?;
        trace!(
            key = %existing_key.fingerprint(),
            recipient = %recipient.fingerprint(),
            "rewrapped shared key passphrase"
        );
        Ok(wrapped)
    }

    /// Rewrap `shared` for `recipient` and attach the inviter's signature.
    pub fn rewrap_signed(
        &self,
        shared: &SharedKey<'_>,
        recipient: &PublicKey,
        inviter: &Inviter<'_>,
    ) -> Result<InviteKey, CryptoFailure> {
        let wrapped = self.rewrap(shared.key, shared.passphrase, recipient)?;

        let signature = self
            .provider
            .sign_detached_in_context(
                shared.passphrase.as_bytes(),
                inviter.key,
                inviter.passphrase,
                Some(SignatureContext::EXISTING_USER_INVITE),
            )
            .map_err(|e| e.at(Artifact::InviteSignature))?;
        let encrypted_signature = self
            .provider
            .encrypt_to_public_key(signature.as_str().as_bytes(), recipient)
            .map_err(|e| e.at(Artifact::InviteSignature))?;
        let encrypted_signature = self
            .provider
            .unarmor_to_base64(encrypted_signature.as_str())
            .map_err(|_| CryptoFailure::ContentEncoding(Artifact::InviteSignature))?;

        Ok(InviteKey {
            key_rotation: shared.rotation,
            key_packet: wrapped.key_packet_base64(),
            data_packet: wrapped.data_packet_base64(),
            encrypted_signature,
        })
    }

    /// Recipient side of [`Self::rewrap_signed`].
    ///
    /// Recovers the passphrase, checks it unlocks `shared_key` and that one
    /// of `inviter_keys` signed it.
    pub fn accept_invite_key(
        &self,
        invite: &InviteKey,
        shared_key: &AsymmetricKey,
        recipient_key: &AsymmetricKey,
        recipient_passphrase: &Passphrase,
        inviter_keys: &[PublicKey],
    ) -> Result<Passphrase, CryptoFailure> {
        let wrapped = WrappedPassphrase::from_base64(&invite.key_packet, &invite.data_packet)
            .map_err(|e| e.at(Artifact::SharedKey))?;
        let passphrase = wrapped
            .unwrap_with(self.provider, recipient_key, recipient_passphrase)
            .map_err(|_| CryptoFailure::Decryption(Artifact::SharedKey))?;
        self.provider
            .check_passphrase(shared_key, &passphrase)
            .map_err(|_| CryptoFailure::KeyUnlock(Artifact::SharedKey))?;

        let body = armor::decode_base64(&invite.encrypted_signature).map_err(|e| e.at(Artifact::InviteSignature))?;
        let plain = self
            .provider
            .decrypt_message(&self.provider.armor_message(&body), recipient_key, recipient_passphrase)
            .map_err(|_| CryptoFailure::Decryption(Artifact::InviteSignature))?;
        let signature = std::str::from_utf8(&plain)
            .map(ArmoredSignature::new)
            .map_err(|_| CryptoFailure::ContentEncoding(Artifact::InviteSignature))?;

        let signed = inviter_keys.iter().any(|inviter| {
            self.provider.verify_detached_in_context(
                &signature,
                passphrase.as_bytes(),
                inviter,
                Some(SignatureContext::EXISTING_USER_INVITE),
            )
        });
        if !signed {
            return Err(CryptoFailure::SignatureVerification(Artifact::InviteSignature));
        }
        Ok(passphrase)
    }

    /// Inviter signature for a recipient that has no keys yet, base64.
    pub fn new_user_invite_signature(
        &self,
        email: &str,
        shared_key: &AsymmetricKey,
        inviter: &Inviter<'_>,
    ) -> Result<String, CryptoFailure> {
        let signature = self
            .provider
            .sign_detached_in_context(
                &new_user_signed_data(email, shared_key),
                inviter.key,
                inviter.passphrase,
                Some(SignatureContext::NEW_USER_INVITE),
            )
            .map_err(|e| e.at(Artifact::InviteSignature))?;
        self.provider
            .unarmor_to_base64(signature.as_str())
            .map_err(|_| CryptoFailure::ContentEncoding(Artifact::InviteSignature))
    }

    pub fn verify_new_user_invite_signature(
        &self,
        signature: &str,
        email: &str,
        shared_key: &AsymmetricKey,
        inviter: &PublicKey,
    ) -> Result<(), CryptoFailure> {
        let body = armor::decode_base64(signature).map_err(|e| e.at(Artifact::InviteSignature))?;
        let signature = self.provider.armor_signature(&body);
        if self.provider.verify_detached_in_context(
            &signature,
            &new_user_signed_data(email, shared_key),
            inviter,
            Some(SignatureContext::NEW_USER_INVITE),
        ) {
            Ok(())
        } else {
            Err(CryptoFailure::SignatureVerification(Artifact::InviteSignature))
        }
    }
}

fn new_user_signed_data(email: &str, shared_key: &AsymmetricKey) -> Vec<u8> {
    let fingerprint = shared_key.fingerprint().as_str().as_bytes();
    let mut data = Vec::with_capacity(email.len() + 1 + fingerprint.len());
    data.extend_from_slice(email.as_bytes());
    data.push(0x00);
    data.extend_from_slice(fingerprint);
    data
}
