//! Key wrapping.
//!
//! Produces one authenticated node of a key hierarchy:
//! 1. Generate a fresh keypair and passphrase.
//! 2. Encrypt the passphrase to the parent's public key and split the result
//!    into a key packet and a data packet.
//! 3. Sign the new key's fingerprint with the designated signer.
//!
//! Any failure aborts the whole node. Nothing partial is returned.

use tracing::trace;

use crate::armor;
use crate::error::{Artifact, CryptoFailure};
use crate::keys::{AsymmetricKey, Fingerprint, KeyRole, Passphrase, PublicKey};
use crate::provider::{ArmoredSignature, CryptoProvider};

/// A passphrase encrypted to some parent key, split into its two packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedPassphrase {
    /// The session key, encrypted to the parent key.
    pub key_packet: Vec<u8>,
    /// The passphrase, encrypted under the session key.
    pub data_packet: Vec<u8>,
}

impl WrappedPassphrase {
    pub fn key_packet_base64(&self) -> String {
        armor::encode_base64(&self.key_packet)
    }

    pub fn data_packet_base64(&self) -> String {
        armor::encode_base64(&self.data_packet)
    }

    pub fn from_base64(key_packet: &str, data_packet: &str) -> Result<Self, CryptoFailure> {
        Ok(Self {
            key_packet: armor::decode_base64(key_packet)?,
            data_packet: armor::decode_base64(data_packet)?,
        })
    }

    /// Decrypt with the parent key this passphrase was wrapped for.
    pub fn unwrap_with<P: CryptoProvider + ?Sized>(
        &self,
        provider: &P,
        parent: &AsymmetricKey,
        parent_passphrase: &Passphrase,
    ) -> Result<Passphrase, CryptoFailure> {
        let bytes = provider.decrypt_packets(&self.key_packet, &self.data_packet, parent, parent_passphrase)?;
        Passphrase::from_utf8(&bytes)
    }
}

/// A detached signature over a key's fingerprint: "the signer approves
/// this key".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintSignature {
    pub signer: Fingerprint,
    pub signature: ArmoredSignature,
}

/// A freshly generated, wrapped and certified key.
#[derive(Debug)]
pub struct WrappedKeyNode {
    pub role: KeyRole,
    pub key: AsymmetricKey,
    pub passphrase: Passphrase,
    pub wrapped_passphrase: WrappedPassphrase,
    pub fingerprint_signature: FingerprintSignature,
}

/// Generates and certifies key nodes through a [`CryptoProvider`].
pub struct KeyWrapper<'a, P: CryptoProvider + ?Sized> {
    provider: &'a P,
}

impl<'a, P: CryptoProvider + ?Sized> KeyWrapper<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self { provider }
    }

    /// Generate a key for `role`, wrap its passphrase for `parent` and sign
    /// its fingerprint with `signer`.
    pub fn wrap(
        &self,
        role: KeyRole,
        parent: &PublicKey,
        signer: &AsymmetricKey,
        signer_passphrase: &Passphrase,
    ) -> Result<WrappedKeyNode, CryptoFailure> {
        let artifact = role.artifact();

        let (key, passphrase) = self
            .provider
            .generate_key_pair(role.label())
            .map_err(|e| e.at(artifact))?;

        let wrapped_passphrase = self.wrap_passphrase(&passphrase, parent, artifact)?;

        let fingerprint = self.provider.fingerprint(&key).map_err(|e| e.at(artifact))?;
        let signature = self
            .provider
            .sign_detached(fingerprint.as_str().as_bytes(), signer, signer_passphrase)
            .map_err(|e| e.at(signature_artifact(role)))?;

        trace!(
            role = role.label(),
            fingerprint = %fingerprint,
            signer = %signer.fingerprint(),
            "wrapped key node"
        );

        Ok(WrappedKeyNode {
            role,
            key,
            passphrase,
            wrapped_passphrase,
            fingerprint_signature: FingerprintSignature {
                signer: signer.fingerprint().clone(),
                signature,
            },
        })
    }

    /// Encrypt `passphrase` to `parent` and split it into packets.
    pub fn wrap_passphrase(
        &self,
        passphrase: &Passphrase,
        parent: &PublicKey,
        artifact: Artifact,
    ) -> Result<WrappedPassphrase, CryptoFailure> {
        let message = self
            .provider
            .encrypt_to_public_key(passphrase.as_bytes(), parent)
            .map_err(|e| e.at(artifact))?;
        let split = self.provider.split_message(&message).map_err(|e| e.at(artifact))?;
        Ok(WrappedPassphrase {
            key_packet: split.key_packet,
            data_packet: split.data_packet,
        })
    }
}

/// The artifact naming the fingerprint signature of a key in `role`.
pub(crate) fn signature_artifact(role: KeyRole) -> Artifact {
    match role {
        KeyRole::Signing => Artifact::AcceptanceSignature,
        KeyRole::Vault => Artifact::VaultKeySignature,
        KeyRole::Item => Artifact::ItemKeySignature,
        KeyRole::Address => Artifact::AddressKey,
    }
}

/// Check that `signature` certifies `key`'s fingerprint under `signer`.
pub fn verify_fingerprint_signature<P: CryptoProvider + ?Sized>(
    provider: &P,
    key: &AsymmetricKey,
    signature: &ArmoredSignature,
    signer: &PublicKey,
    artifact: Artifact,
) -> Result<(), CryptoFailure> {
    let fingerprint = provider.fingerprint(key).map_err(|e| e.at(artifact))?;
    if provider.verify_detached(signature, fingerprint.as_str().as_bytes(), signer) {
        Ok(())
    } else {
        Err(CryptoFailure::SignatureVerification(artifact))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::provider;

    #[test]
    fn test_wrap_produces_verifiable_node() {
        let provider = provider();
        let (parent, parent_passphrase) = provider.generate_key_pair("Parent").unwrap();
        let (signer, signer_passphrase) = provider.generate_key_pair("Signer").unwrap();

        let node = KeyWrapper::new(&provider)
            .wrap(KeyRole::Vault, parent.public_key(), &signer, &signer_passphrase)
            .unwrap();

        assert_eq!(node.key.label(), "VaultKey");
        assert_eq!(&node.fingerprint_signature.signer, signer.fingerprint());

        let recovered = node
            .wrapped_passphrase
            .unwrap_with(&provider, &parent, &parent_passphrase)
            .unwrap();
        assert_eq!(recovered.expose_secret(), node.passphrase.expose_secret());
        assert!(provider.check_passphrase(&node.key, &recovered).is_ok());

        verify_fingerprint_signature(
            &provider,
            &node.key,
            &node.fingerprint_signature.signature,
            signer.public_key(),
            Artifact::VaultKeySignature,
        )
        .unwrap();
    }

    #[test]
    fn test_wrap_fails_atomically_on_bad_signer_passphrase() {
        let provider = provider();
        let (parent, _) = provider.generate_key_pair("Parent").unwrap();
        let (signer, _) = provider.generate_key_pair("Signer").unwrap();

        let err = KeyWrapper::new(&provider)
            .wrap(KeyRole::Item, parent.public_key(), &signer, &Passphrase::new("wrong"))
            .unwrap_err();
        assert_eq!(err, CryptoFailure::Signing(Artifact::ItemKeySignature));
    }

    #[test]
    fn test_signature_from_other_signer_is_rejected() {
        let provider = provider();
        let (parent, _) = provider.generate_key_pair("Parent").unwrap();
        let (signer, signer_passphrase) = provider.generate_key_pair("Signer").unwrap();
        let (impostor, _) = provider.generate_key_pair("Impostor").unwrap();

        let node = KeyWrapper::new(&provider)
            .wrap(KeyRole::Item, parent.public_key(), &signer, &signer_passphrase)
            .unwrap();
        let err = verify_fingerprint_signature(
            &provider,
            &node.key,
            &node.fingerprint_signature.signature,
            impostor.public_key(),
            Artifact::ItemKeySignature,
        )
        .unwrap_err();
        assert_eq!(err, CryptoFailure::SignatureVerification(Artifact::ItemKeySignature));
    }
}
