//! The cryptographic capability the protocol is written against.
//!
//! [`CryptoProvider`] lists the operations the key hierarchy and sharing
//! code need: generate, encrypt-to-key, split, fingerprint, sign, verify,
//! decrypt and transport encoding. [`RingProvider`] implements them with
//! Ed25519 and AES-256-GCM from `ring` and X25519 from `x25519-dalek`.
//!
//! Provider errors are attributed to [`Artifact::Primitive`]; protocol code
//! re-attributes them to the artifact it was building.

use std::fmt;
use std::num::NonZeroU32;

use tracing::trace;
use zeroize::Zeroizing;

use crate::armor;
use crate::config::ProviderConfig;
use crate::error::{Artifact, ConfigError, CryptoFailure};
use crate::keys::{AsymmetricKey, Fingerprint, Passphrase, PublicKey};
use crate::message::{self, SplitMessage};
use crate::signature::{self, SignatureContext};

/// An armored hybrid-encrypted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmoredMessage(String);

impl ArmoredMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArmoredMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An armored detached signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmoredSignature(String);

impl ArmoredSignature {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArmoredSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cryptographic operations required by the vault protocol.
///
/// Every fallible operation fails with a [`CryptoFailure`]; verification
/// answers `false` for any signature that does not check out, including
/// malformed ones.
pub trait CryptoProvider: Send + Sync {
    /// Generate a keypair labelled `label` together with the fresh random
    /// passphrase that locks it.
    fn generate_key_pair(&self, label: &str) -> Result<(AsymmetricKey, Passphrase), CryptoFailure>;

    fn encrypt_to_public_key(
        &self,
        plaintext: &[u8],
        recipient: &PublicKey,
    ) -> Result<ArmoredMessage, CryptoFailure>;

    fn split_message(&self, message: &ArmoredMessage) -> Result<SplitMessage, CryptoFailure>;

    fn fingerprint(&self, key: &AsymmetricKey) -> Result<Fingerprint, CryptoFailure>;

    fn sign_detached_in_context(
        &self,
        data: &[u8],
        signer: &AsymmetricKey,
        signer_passphrase: &Passphrase,
        context: Option<SignatureContext>,
    ) -> Result<ArmoredSignature, CryptoFailure>;

    fn verify_detached_in_context(
        &self,
        signature: &ArmoredSignature,
        data: &[u8],
        signer: &PublicKey,
        context: Option<SignatureContext>,
    ) -> bool;

    /// Remove the armor from any armored blob and base64 its body.
    fn unarmor_to_base64(&self, armored: &str) -> Result<String, CryptoFailure>;

    /// Armor the binary body of a message, e.g. one received as base64.
    fn armor_message(&self, body: &[u8]) -> ArmoredMessage;

    /// Armor the binary body of a signature.
    fn armor_signature(&self, body: &[u8]) -> ArmoredSignature;

    fn decrypt_packets(
        &self,
        key_packet: &[u8],
        data_packet: &[u8],
        recipient: &AsymmetricKey,
        recipient_passphrase: &Passphrase,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoFailure>;

    /// Confirm that `passphrase` unlocks `key`.
    fn check_passphrase(&self, key: &AsymmetricKey, passphrase: &Passphrase) -> Result<(), CryptoFailure>;

    fn sign_detached(
        &self,
        data: &[u8],
        signer: &AsymmetricKey,
        signer_passphrase: &Passphrase,
    ) -> Result<ArmoredSignature, CryptoFailure> {
        self.sign_detached_in_context(data, signer, signer_passphrase, None)
    }

    fn verify_detached(&self, signature: &ArmoredSignature, data: &[u8], signer: &PublicKey) -> bool {
        self.verify_detached_in_context(signature, data, signer, None)
    }

    fn decrypt_message(
        &self,
        message: &ArmoredMessage,
        recipient: &AsymmetricKey,
        recipient_passphrase: &Passphrase,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoFailure> {
        let split = self
            .split_message(message)
            .map_err(|_| CryptoFailure::Decryption(Artifact::Primitive))?;
        self.decrypt_packets(&split.key_packet, &split.data_packet, recipient, recipient_passphrase)
    }
}

/// The default provider, backed by `ring` and `x25519-dalek`.
///
/// Stateless apart from its configuration; share it freely across threads.
#[derive(Debug, Clone)]
pub struct RingProvider {
    iterations: NonZeroU32,
    passphrase_bytes: usize,
}

impl RingProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            iterations: config.iterations()?,
            passphrase_bytes: config.passphrase_bytes,
        })
    }
}

impl Default for RingProvider {
    fn default() -> Self {
        let config = ProviderConfig::default();
        Self {
            iterations: NonZeroU32::new(config.kdf_iterations).unwrap_or(NonZeroU32::MIN),
            passphrase_bytes: config.passphrase_bytes,
        }
    }
}

impl CryptoProvider for RingProvider {
    fn generate_key_pair(&self, label: &str) -> Result<(AsymmetricKey, Passphrase), CryptoFailure> {
        let passphrase = Passphrase::generate(self.passphrase_bytes)?;
        let key = AsymmetricKey::generate(label, &passphrase, self.iterations)?;
        trace!(label, fingerprint = %key.fingerprint(), "generated key pair");
        Ok((key, passphrase))
    }

    fn encrypt_to_public_key(
        &self,
        plaintext: &[u8],
        recipient: &PublicKey,
    ) -> Result<ArmoredMessage, CryptoFailure> {
        let message = message::encrypt(plaintext, recipient)?;
        Ok(self.armor_message(&message))
    }

    fn split_message(&self, message: &ArmoredMessage) -> Result<SplitMessage, CryptoFailure> {
        let body = armor::unarmor(armor::MESSAGE_TAG, message.as_str())
            .map_err(|_| CryptoFailure::MessageSplit(Artifact::Primitive))?;
        message::split(&body)
    }

    fn fingerprint(&self, key: &AsymmetricKey) -> Result<Fingerprint, CryptoFailure> {
        // Recompute from the armored export rather than trusting the cached value.
        let parsed = AsymmetricKey::from_armored(key.armored())
            .map_err(|_| CryptoFailure::Fingerprint(Artifact::Primitive))?;
        if parsed.public_key() != key.public_key() {
            return Err(CryptoFailure::Fingerprint(Artifact::Primitive));
        }
        Ok(parsed.public_key().fingerprint())
    }

    fn sign_detached_in_context(
        &self,
        data: &[u8],
        signer: &AsymmetricKey,
        signer_passphrase: &Passphrase,
        context: Option<SignatureContext>,
    ) -> Result<ArmoredSignature, CryptoFailure> {
        let unlocked = signer
            .unlock(signer_passphrase)
            .map_err(|_| CryptoFailure::Signing(Artifact::Primitive))?;
        let body = signature::sign(&unlocked, data, context);
        Ok(self.armor_signature(&body))
    }

    fn verify_detached_in_context(
        &self,
        signature: &ArmoredSignature,
        data: &[u8],
        signer: &PublicKey,
        context: Option<SignatureContext>,
    ) -> bool {
        match armor::unarmor(armor::SIGNATURE_TAG, signature.as_str()) {
            Ok(body) => signature::verify(&body, data, signer, context),
            Err(_) => false,
        }
    }

    fn unarmor_to_base64(&self, armored: &str) -> Result<String, CryptoFailure> {
        armor::unarmor_to_base64(armored)
    }

    fn armor_message(&self, body: &[u8]) -> ArmoredMessage {
        ArmoredMessage(armor::armor(armor::MESSAGE_TAG, body))
    }

    fn armor_signature(&self, body: &[u8]) -> ArmoredSignature {
        ArmoredSignature(armor::armor(armor::SIGNATURE_TAG, body))
    }

    fn decrypt_packets(
        &self,
        key_packet: &[u8],
        data_packet: &[u8],
        recipient: &AsymmetricKey,
        recipient_passphrase: &Passphrase,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoFailure> {
        let unlocked = recipient
            .unlock(recipient_passphrase)
            .map_err(|_| CryptoFailure::Decryption(Artifact::Primitive))?;
        message::decrypt(key_packet, data_packet, &unlocked)
    }

    fn check_passphrase(&self, key: &AsymmetricKey, passphrase: &Passphrase) -> Result<(), CryptoFailure> {
        key.unlock(passphrase).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::provider;

    #[test]
    fn test_generate_produces_distinct_keys_and_passphrases() {
        let provider = provider();
        let (a, pa) = provider.generate_key_pair("VaultKey").unwrap();
        let (b, pb) = provider.generate_key_pair("VaultKey").unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_ne!(pa.expose_secret(), pb.expose_secret());
        assert!(provider.check_passphrase(&a, &pa).is_ok());
        assert!(provider.check_passphrase(&a, &pb).is_err());
    }

    #[test]
    fn test_encrypt_decrypt_message() {
        let provider = provider();
        let (key, passphrase) = provider.generate_key_pair("Recipient").unwrap();
        let message = provider.encrypt_to_public_key(b"secret", key.public_key()).unwrap();
        let plaintext = provider.decrypt_message(&message, &key, &passphrase).unwrap();
        assert_eq!(plaintext.as_slice(), b"secret");
    }

    #[test]
    fn test_detached_signature_roundtrip_through_base64() {
        let provider = provider();
        let (key, passphrase) = provider.generate_key_pair("Signer").unwrap();
        let signature = provider.sign_detached(b"data", &key, &passphrase).unwrap();
        assert!(provider.verify_detached(&signature, b"data", key.public_key()));

        let body = armor::decode_base64(&provider.unarmor_to_base64(signature.as_str()).unwrap()).unwrap();
        let rearmored = provider.armor_signature(&body);
        assert_eq!(rearmored, signature);
    }

    #[test]
    fn test_signing_with_wrong_passphrase_fails() {
        let provider = provider();
        let (key, _) = provider.generate_key_pair("Signer").unwrap();
        let result = provider.sign_detached(b"data", &key, &Passphrase::new("nope"));
        assert_eq!(result.unwrap_err(), CryptoFailure::Signing(Artifact::Primitive));
    }

    #[test]
    fn test_fingerprint_matches_public_key() {
        let provider = provider();
        let (key, _) = provider.generate_key_pair("VaultKey").unwrap();
        assert_eq!(&provider.fingerprint(&key).unwrap(), key.fingerprint());
    }
}
