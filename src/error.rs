//! Error types for vaultkey.
//!
//! Every variant is a distinct failure mode of the key hierarchy or the
//! sharing protocol. Messages name *which* artifact failed (a key role or a
//! request field) and never carry key material, passphrases or plaintext.

use std::fmt;

use thiserror::Error;

/// The artifact a protocol step was producing or checking when it failed.
///
/// Attached to every [`CryptoFailure`] so callers can log precisely which
/// link of the hierarchy broke without inspecting secret values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    /// A bare provider operation, not yet attributed to a protocol artifact.
    Primitive,
    /// The externally supplied address key.
    AddressKey,
    SigningKey,
    VaultKey,
    ItemKey,
    /// Any key whose passphrase is being wrapped for a share recipient.
    SharedKey,
    /// The acceptance signature: the address key certifying the signing key.
    AcceptanceSignature,
    VaultKeySignature,
    ItemKeySignature,
    /// The vault key's signature over its own passphrase key packet.
    KeyPacketSignature,
    /// The serialized vault content.
    VaultContent,
    /// The vault key's signature over the encrypted content.
    ContentVaultSignature,
    /// The address key's signature over the plain content.
    ContentAddressSignature,
    /// The inviter's signature carried inside a share invite.
    InviteSignature,
    /// A recipient's public key.
    RecipientKey,
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Primitive => "primitive",
            Self::AddressKey => "address key",
            Self::SigningKey => "signing key",
            Self::VaultKey => "vault key",
            Self::ItemKey => "item key",
            Self::SharedKey => "shared key",
            Self::AcceptanceSignature => "acceptance signature",
            Self::VaultKeySignature => "vault key signature",
            Self::ItemKeySignature => "item key signature",
            Self::KeyPacketSignature => "key packet signature",
            Self::VaultContent => "vault content",
            Self::ContentVaultSignature => "content vault signature",
            Self::ContentAddressSignature => "content address signature",
            Self::InviteSignature => "invite signature",
            Self::RecipientKey => "recipient key",
        };
        f.write_str(name)
    }
}

/// The single error type for all cryptographic protocol operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CryptoFailure {
    /// Generating a keypair or locking its private half failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(Artifact),

    /// Encrypting a passphrase or payload to a public key failed.
    #[error("passphrase encryption failed: {0}")]
    PassphraseEncryption(Artifact),

    /// An encrypted message could not be split into key and data packets,
    /// or a packet was malformed.
    #[error("message split failed: {0}")]
    MessageSplit(Artifact),

    /// The fingerprint of a key could not be computed.
    #[error("fingerprint failed: {0}")]
    Fingerprint(Artifact),

    /// Producing a detached signature failed.
    #[error("signing failed: {0}")]
    Signing(Artifact),

    /// A detached signature did not verify against the expected signer.
    #[error("signature verification failed: {0}")]
    SignatureVerification(Artifact),

    /// Base64, armor or content serialization failed.
    #[error("content encoding failed: {0}")]
    ContentEncoding(Artifact),

    /// Decryption failed: wrong key, tampered packet or corrupted tag.
    #[error("decryption failed: {0}")]
    Decryption(Artifact),

    /// A passphrase did not unlock the private key it was paired with.
    #[error("key unlock failed: {0}")]
    KeyUnlock(Artifact),

    /// The system's random number generator failed to produce bytes.
    #[error("randomness source failed")]
    Randomness,
}

impl CryptoFailure {
    /// The artifact this failure is attributed to, if any.
    pub fn artifact(&self) -> Option<Artifact> {
        match *self {
            Self::KeyGeneration(a)
            | Self::PassphraseEncryption(a)
            | Self::MessageSplit(a)
            | Self::Fingerprint(a)
            | Self::Signing(a)
            | Self::SignatureVerification(a)
            | Self::ContentEncoding(a)
            | Self::Decryption(a)
            | Self::KeyUnlock(a) => Some(a),
            Self::Randomness => None,
        }
    }

    /// Re-attribute a failure to the protocol artifact being built.
    pub(crate) fn at(self, artifact: Artifact) -> Self {
        match self {
            Self::KeyGeneration(_) => Self::KeyGeneration(artifact),
            Self::PassphraseEncryption(_) => Self::PassphraseEncryption(artifact),
            Self::MessageSplit(_) => Self::MessageSplit(artifact),
            Self::Fingerprint(_) => Self::Fingerprint(artifact),
            Self::Signing(_) => Self::Signing(artifact),
            Self::SignatureVerification(_) => Self::SignatureVerification(artifact),
            Self::ContentEncoding(_) => Self::ContentEncoding(artifact),
            Self::Decryption(_) => Self::Decryption(artifact),
            Self::KeyUnlock(_) => Self::KeyUnlock(artifact),
            Self::Randomness => Self::Randomness,
        }
    }
}

/// Errors raised while turning share intent into invites.
#[derive(Debug, Error)]
pub enum ShareError {
    /// No recipients were supplied, or a recipient is missing required data.
    #[error("incomplete sharing information")]
    IncompleteInformation,

    #[error(transparent)]
    Crypto(#[from] CryptoFailure),
}

/// Errors raised while loading or validating a [`crate::config::ProviderConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}
