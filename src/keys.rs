//! Key material and ownership.
//!
//! This module owns three responsibilities:
//! 1. Generating asymmetric keypairs (Ed25519 for signing, X25519 for
//!    encryption) and exporting them as passphrase-locked armored blocks.
//! 2. Unlocking an armored key with its passphrase into an [`UnlockedKey`],
//!    a value that is not `Clone` and wipes its secrets on drop.
//! 3. Identifying public keys by a stable [`Fingerprint`].
//!
//! ## Locked private key layout
//!
//! ```text
//! [ version (1) ][ label_len (1) ][ label ][ public key (64) ]
//! [ salt (16) ][ iterations (4, BE) ][ nonce | AES-256-GCM(secret) | tag ]
//! ```
//!
//! Everything before the sealed secret is bound as additional data, so a
//! swapped public key or label makes the unlock fail rather than producing
//! a mismatched key. The sealing key is PBKDF2-HMAC-SHA256 of the passphrase,
//! with at most [`MAX_KDF_ITERATIONS`] rounds.

use std::fmt;
use std::num::NonZeroU32;

use ring::digest;
use ring::rand::SystemRandom;
use ring::signature::{self, Ed25519KeyPair, KeyPair};
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::armor;
use crate::crypto::{self, KEY_LEN};
use crate::error::{Artifact, CryptoFailure};

/// Version byte of every key encoding produced by this crate.
pub const KEY_FORMAT_VERSION: u8 = 1;

/// Length of an encoded public key: Ed25519 (32) followed by X25519 (32).
pub const PUBLIC_KEY_LEN: usize = 64;

/// Length of the short key identifier carried in packets and signatures.
pub const KEY_ID_LEN: usize = 8;

/// Length of an Ed25519 signature.
pub const SIGNATURE_LEN: usize = 64;

/// Largest PBKDF2 iteration count a locked key may declare. Headers above
/// it are rejected before any derivation runs.
pub const MAX_KDF_ITERATIONS: u32 = 10_000_000;

const SALT_LEN: usize = 16;

// ---------------------------------------------------------------------------
// Key roles
// ---------------------------------------------------------------------------

/// The role a key plays in a vault's hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyRole {
    /// Long-lived account identity key, supplied by the caller.
    Address,
    /// Vault-scoped key that certifies the vault and item keys.
    Signing,
    /// Vault-scoped key that encrypts vault content and the item key passphrase.
    Vault,
    /// Vault-scoped key that encrypts item payloads.
    Item,
}

impl KeyRole {
    /// Identity label embedded in generated keys of this role.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Address => "AddressKey",
            Self::Signing => "VaultSigningKey",
            Self::Vault => "VaultKey",
            Self::Item => "ItemKey",
        }
    }

    pub(crate) fn artifact(&self) -> Artifact {
        match self {
            Self::Address => Artifact::AddressKey,
            Self::Signing => Artifact::SigningKey,
            Self::Vault => Artifact::VaultKey,
            Self::Item => Artifact::ItemKey,
        }
    }
}

// ---------------------------------------------------------------------------
// Passphrase
// ---------------------------------------------------------------------------

/// A secret passphrase protecting one private key.
///
/// - Not `Clone`. Hand it over or borrow it.
/// - Zeroised on drop.
/// - `Debug` never prints the value.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Passphrase(String);

impl Passphrase {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Draw `len` random bytes and encode them as a base64 passphrase.
    pub fn generate(len: usize) -> Result<Self, CryptoFailure> {
        let bytes = Zeroizing::new(crypto::random_bytes(len)?);
        Ok(Self(armor::encode_base64(&bytes)))
    }

    /// Reconstruct a passphrase from decrypted bytes.
    pub(crate) fn from_utf8(bytes: &[u8]) -> Result<Self, CryptoFailure> {
        let text = std::str::from_utf8(bytes).map_err(|_| CryptoFailure::Decryption(Artifact::Primitive))?;
        Ok(Self(text.to_string()))
    }

    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// Public key and fingerprint
// ---------------------------------------------------------------------------

/// A stable, content-derived identifier of a public key.
///
/// Lowercase hex SHA-256 over the versioned public key encoding. This string
/// is the subject of fingerprint signatures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The public half of an [`AsymmetricKey`]: a verification key and an
/// encryption key.
///
/// Exchanged with external directories as base64 of the 64-byte encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey {
    signing: [u8; 32],
    encryption: [u8; 32],
}

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoFailure> {
        if bytes.len() != PUBLIC_KEY_LEN {
            return Err(CryptoFailure::ContentEncoding(Artifact::RecipientKey));
        }
        let mut signing = [0u8; 32];
        let mut encryption = [0u8; 32];
        signing.copy_from_slice(&bytes[..32]);
        encryption.copy_from_slice(&bytes[32..]);
        Ok(Self { signing, encryption })
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        let mut out = [0u8; PUBLIC_KEY_LEN];
        out[..32].copy_from_slice(&self.signing);
        out[32..].copy_from_slice(&self.encryption);
        out
    }

    pub fn from_base64(text: &str) -> Result<Self, CryptoFailure> {
        let bytes = armor::decode_base64(text).map_err(|e| e.at(Artifact::RecipientKey))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_base64(&self) -> String {
        armor::encode_base64(&self.to_bytes())
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint(hex::encode(self.digest().as_ref()))
    }

    /// The leading bytes of the fingerprint digest, used to address packets
    /// and signatures to a key without carrying the whole key.
    pub fn key_id(&self) -> [u8; KEY_ID_LEN] {
        let mut id = [0u8; KEY_ID_LEN];
        id.copy_from_slice(&self.digest().as_ref()[..KEY_ID_LEN]);
        id
    }

    pub(crate) fn signing_bytes(&self) -> &[u8; 32] {
        &self.signing
    }

    pub(crate) fn encryption_key(&self) -> X25519PublicKey {
        X25519PublicKey::from(self.encryption)
    }

    /// Check an Ed25519 signature made by this key.
    pub(crate) fn verify(&self, message: &[u8], signature_bytes: &[u8]) -> bool {
        signature::UnparsedPublicKey::new(&signature::ED25519, &self.signing)
            .verify(message, signature_bytes)
            .is_ok()
    }

    fn digest(&self) -> digest::Digest {
        let mut ctx = digest::Context::new(&digest::SHA256);
        ctx.update(&[KEY_FORMAT_VERSION]);
        ctx.update(&self.to_bytes());
        ctx.finish()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKey").field(&self.fingerprint().as_str()).finish()
    }
}

impl TryFrom<String> for PublicKey {
    type Error = CryptoFailure;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_base64(&value)
    }
}

impl From<PublicKey> for String {
    fn from(key: PublicKey) -> Self {
        key.to_base64()
    }
}

// ---------------------------------------------------------------------------
// Asymmetric key (locked)
// ---------------------------------------------------------------------------

/// A keypair whose private half is locked under a passphrase.
///
/// Safe to clone, store and transmit: using the private half requires
/// [`AsymmetricKey::unlock`] with the matching [`Passphrase`].
#[derive(Clone, PartialEq, Eq)]
pub struct AsymmetricKey {
    label: String,
    public: PublicKey,
    fingerprint: Fingerprint,
    armored: String,
}

impl AsymmetricKey {
    /// Generate a fresh keypair labelled `label` and lock it under `passphrase`.
    pub(crate) fn generate(
        label: &str,
        passphrase: &Passphrase,
        iterations: NonZeroU32,
    ) -> Result<Self, CryptoFailure> {
        let label_len =
            u8::try_from(label.len()).map_err(|_| CryptoFailure::KeyGeneration(Artifact::Primitive))?;

        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng)
            .map_err(|_| CryptoFailure::KeyGeneration(Artifact::Primitive))?;
        let signing = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref())
            .map_err(|_| CryptoFailure::KeyGeneration(Artifact::Primitive))?;

        let encryption_seed = crypto::random_key()?;
        let encryption = StaticSecret::from(*encryption_seed);

        let public = PublicKey::from_bytes(
            &[
                signing.public_key().as_ref(),
                X25519PublicKey::from(&encryption).as_bytes().as_slice(),
            ]
            .concat(),
        )
        .map_err(|_| CryptoFailure::KeyGeneration(Artifact::Primitive))?;

        let pkcs8_len = u16::try_from(pkcs8.as_ref().len())
            .map_err(|_| CryptoFailure::KeyGeneration(Artifact::Primitive))?;
        let mut secret = Zeroizing::new(Vec::with_capacity(2 + pkcs8.as_ref().len() + KEY_LEN));
        secret.extend_from_slice(&pkcs8_len.to_be_bytes());
        secret.extend_from_slice(pkcs8.as_ref());
        secret.extend_from_slice(encryption.as_bytes());

        let salt = crypto::random_bytes(SALT_LEN)?;
        let mut body = Vec::new();
        body.push(KEY_FORMAT_VERSION);
        body.push(label_len);
        body.extend_from_slice(label.as_bytes());
        body.extend_from_slice(&public.to_bytes());
        body.extend_from_slice(&salt);
        body.extend_from_slice(&iterations.get().to_be_bytes());

        let lock_key = crypto::derive_passphrase_key(passphrase.as_bytes(), &salt, iterations);
        let sealed = crypto::seal(&lock_key, &body, &secret)
            .map_err(|_| CryptoFailure::KeyGeneration(Artifact::Primitive))?;
        body.extend_from_slice(&sealed);

        Ok(Self {
            label: label.to_string(),
            fingerprint: public.fingerprint(),
            public,
            armored: armor::armor(armor::PRIVATE_KEY_TAG, &body),
        })
    }

    /// Parse an armored locked key. No passphrase is needed to read the
    /// public half, label and fingerprint.
    pub fn from_armored(text: &str) -> Result<Self, CryptoFailure> {
        let body = armor::unarmor(armor::PRIVATE_KEY_TAG, text)?;
        let header = LockedHeader::parse(&body)?;
        Ok(Self {
            label: header.label.to_string(),
            fingerprint: header.public.fingerprint(),
            public: header.public,
            armored: text.to_string(),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// The exportable armored form: public key plus passphrase-locked secret.
    pub fn armored(&self) -> &str {
        &self.armored
    }

    /// Unlock the private half with `passphrase`.
    pub fn unlock(&self, passphrase: &Passphrase) -> Result<UnlockedKey, CryptoFailure> {
        let body = armor::unarmor(armor::PRIVATE_KEY_TAG, &self.armored)
            .map_err(|_| CryptoFailure::KeyUnlock(Artifact::Primitive))?;
        let header = LockedHeader::parse(&body).map_err(|_| CryptoFailure::KeyUnlock(Artifact::Primitive))?;

        let lock_key = crypto::derive_passphrase_key(passphrase.as_bytes(), header.salt, header.iterations);
        let secret = crypto::open(&lock_key, &body[..header.len], &body[header.len..])
            .map_err(|_| CryptoFailure::KeyUnlock(Artifact::Primitive))?;

        if secret.len() < 2 {
            return Err(CryptoFailure::KeyUnlock(Artifact::Primitive));
        }
        let pkcs8_len = u16::from_be_bytes([secret[0], secret[1]]) as usize;
        if secret.len() != 2 + pkcs8_len + KEY_LEN {
            return Err(CryptoFailure::KeyUnlock(Artifact::Primitive));
        }

        let signing = Ed25519KeyPair::from_pkcs8(&secret[2..2 + pkcs8_len])
            .map_err(|_| CryptoFailure::KeyUnlock(Artifact::Primitive))?;
        let mut seed = Zeroizing::new([0u8; KEY_LEN]);
        seed.copy_from_slice(&secret[2 + pkcs8_len..]);
        let encryption = StaticSecret::from(*seed);

        // The sealed secret must belong to the public key in the header.
        if signing.public_key().as_ref() != header.public.signing_bytes().as_slice()
            || X25519PublicKey::from(&encryption) != header.public.encryption_key()
        {
            return Err(CryptoFailure::KeyUnlock(Artifact::Primitive));
        }

        Ok(UnlockedKey {
            signing,
            encryption,
            public: header.public,
        })
    }
}

impl fmt::Debug for AsymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsymmetricKey")
            .field("label", &self.label)
            .field("fingerprint", &self.fingerprint.as_str())
            .finish()
    }
}

struct LockedHeader<'a> {
    label: &'a str,
    public: PublicKey,
    salt: &'a [u8],
    iterations: NonZeroU32,
    /// Offset where the sealed secret starts.
    len: usize,
}

impl<'a> LockedHeader<'a> {
    fn parse(body: &'a [u8]) -> Result<Self, CryptoFailure> {
        let malformed = CryptoFailure::ContentEncoding(Artifact::Primitive);
        if body.len() < 2 || body[0] != KEY_FORMAT_VERSION {
            return Err(malformed);
        }
        let label_end = 2 + body[1] as usize;
        let public_end = label_end + PUBLIC_KEY_LEN;
        let salt_end = public_end + SALT_LEN;
        let len = salt_end + 4;
        if body.len() < len {
            return Err(malformed);
        }

        let label = std::str::from_utf8(&body[2..label_end]).map_err(|_| malformed)?;
        let public = PublicKey::from_bytes(&body[label_end..public_end]).map_err(|_| malformed)?;
        let iterations = u32::from_be_bytes([
            body[salt_end],
            body[salt_end + 1],
            body[salt_end + 2],
            body[salt_end + 3],
        ]);
        if iterations > MAX_KDF_ITERATIONS {
            return Err(malformed);
        }
        let iterations = NonZeroU32::new(iterations).ok_or(malformed)?;

        Ok(Self {
            label,
            public,
            salt: &body[public_end..salt_end],
            iterations,
            len,
        })
    }
}

// ---------------------------------------------------------------------------
// Unlocked key
// ---------------------------------------------------------------------------

/// The usable private half of an [`AsymmetricKey`].
///
/// - Not `Clone`. Scoped to the operation that unlocked it.
/// - The X25519 secret is zeroised on drop.
pub struct UnlockedKey {
    signing: Ed25519KeyPair,
    encryption: StaticSecret,
    public: PublicKey,
}

impl UnlockedKey {
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub(crate) fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        let mut out = [0u8; SIGNATURE_LEN];
        out.copy_from_slice(self.signing.sign(message).as_ref());
        out
    }

    /// X25519 agreement with `peer`. Fails on non-contributory (low-order)
    /// peer points.
    pub(crate) fn agree(&self, peer: &X25519PublicKey) -> Result<Zeroizing<[u8; 32]>, CryptoFailure> {
        let shared = self.encryption.diffie_hellman(peer);
        if !shared.was_contributory() {
            return Err(CryptoFailure::Decryption(Artifact::Primitive));
        }
        Ok(Zeroizing::new(*shared.as_bytes()))
    }
}

impl fmt::Debug for UnlockedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnlockedKey")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> NonZeroU32 {
        NonZeroU32::new(10).unwrap()
    }

    #[test]
    fn test_generate_unlock_roundtrip() {
        let passphrase = Passphrase::generate(32).unwrap();
        let key = AsymmetricKey::generate("VaultKey", &passphrase, fast()).unwrap();
        let unlocked = key.unlock(&passphrase).unwrap();
        assert_eq!(unlocked.public_key(), key.public_key());

        let signature = unlocked.sign(b"payload");
        assert!(key.public_key().verify(b"payload", &signature));
        assert!(!key.public_key().verify(b"other", &signature));
    }

    #[test]
    fn test_unlock_fails_with_wrong_passphrase() {
        let passphrase = Passphrase::new("correct");
        let key = AsymmetricKey::generate("ItemKey", &passphrase, fast()).unwrap();
        assert!(matches!(
            key.unlock(&Passphrase::new("wrong")),
            Err(CryptoFailure::KeyUnlock(_))
        ));
    }

    #[test]
    fn test_armored_form_reparses() {
        let passphrase = Passphrase::new("pass");
        let key = AsymmetricKey::generate("VaultSigningKey", &passphrase, fast()).unwrap();
        let parsed = AsymmetricKey::from_armored(key.armored()).unwrap();
        assert_eq!(parsed, key);
        assert_eq!(parsed.label(), "VaultSigningKey");
        assert!(parsed.unlock(&passphrase).is_ok());
    }

    #[test]
    fn test_fingerprint_is_stable_hex() {
        let passphrase = Passphrase::new("pass");
        let key = AsymmetricKey::generate("VaultKey", &passphrase, fast()).unwrap();
        let fingerprint = key.public_key().fingerprint();
        assert_eq!(fingerprint.as_str().len(), 64);
        assert_eq!(&fingerprint, key.fingerprint());
        assert_eq!(&key.public_key().key_id()[..], &hex::decode(fingerprint.as_str()).unwrap()[..KEY_ID_LEN]);
    }

    #[test]
    fn test_oversized_iteration_count_is_rejected_before_unlock() {
        let passphrase = Passphrase::new("pass");
        let key = AsymmetricKey::generate("VaultKey", &passphrase, fast()).unwrap();
        let mut body = armor::unarmor(armor::PRIVATE_KEY_TAG, key.armored()).unwrap();
        let offset = 2 + body[1] as usize + PUBLIC_KEY_LEN + SALT_LEN;
        body[offset..offset + 4].copy_from_slice(&u32::MAX.to_be_bytes());
        let tampered = armor::armor(armor::PRIVATE_KEY_TAG, &body);

        assert_eq!(
            AsymmetricKey::from_armored(&tampered).unwrap_err(),
            CryptoFailure::ContentEncoding(Artifact::Primitive)
        );
    }

    #[test]
    fn test_public_key_base64_roundtrip() {
        let passphrase = Passphrase::new("pass");
        let key = AsymmetricKey::generate("VaultKey", &passphrase, fast()).unwrap();
        let encoded = key.public_key().to_base64();
        assert_eq!(PublicKey::from_base64(&encoded).unwrap(), *key.public_key());
        assert!(PublicKey::from_base64("AAAA").is_err());
    }
}
