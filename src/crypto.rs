//! Low-level cryptographic operations.
//!
//! Symmetric building blocks shared by key locking and the message format.
//! Protocol modules never call these directly; they reach encryption
//! through the [`crate::provider::CryptoProvider`] trait.
//!
//! Primitive choices:
//! - **Cipher**: AES-256-GCM (authenticated encryption)
//! - **Nonce**: 96-bit (12 bytes), generated fresh per operation via `SystemRandom`
//! - **Key size**: 256 bits (32 bytes)
//! - **KDFs**: HKDF-SHA256 for ECDH output, PBKDF2-HMAC-SHA256 for passphrases

use std::num::NonZeroU32;

use ring::aead::{self, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use ring::{hkdf, pbkdf2};
use zeroize::Zeroizing;

use crate::error::{Artifact, CryptoFailure};

/// The AEAD algorithm used throughout vaultkey.
const ALGORITHM: &aead::Algorithm = &AES_256_GCM;

/// Size of the nonce in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Size of a symmetric key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Size of the GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Fill a fresh buffer with bytes from the system RNG.
pub fn random_bytes(len: usize) -> Result<Vec<u8>, CryptoFailure> {
    let rng = SystemRandom::new();
    let mut buf = vec![0u8; len];
    rng.fill(&mut buf).map_err(|_| CryptoFailure::Randomness)?;
    Ok(buf)
}

/// Generate a random 256-bit key.
pub fn random_key() -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoFailure> {
    let rng = SystemRandom::new();
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    rng.fill(&mut key[..]).map_err(|_| CryptoFailure::Randomness)?;
    Ok(key)
}

fn generate_nonce() -> Result<Nonce, CryptoFailure> {
    let rng = SystemRandom::new();
    let mut buf = [0u8; NONCE_LEN];
    rng.fill(&mut buf).map_err(|_| CryptoFailure::Randomness)?;
    Ok(Nonce::assume_unique_for_key(buf))
}

/// Encrypt with AES-256-GCM, binding `aad` into the tag.
///
/// # Layout of returned bytes
/// ```text
/// [ nonce (12 bytes) ][ ciphertext + GCM tag ]
/// ```
pub fn seal(key_bytes: &[u8; KEY_LEN], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoFailure> {
    let unbound = UnboundKey::new(ALGORITHM, key_bytes)
        .map_err(|_| CryptoFailure::PassphraseEncryption(Artifact::Primitive))?;
    let key = LessSafeKey::new(unbound);

    let nonce = generate_nonce()?;
    let mut output = Vec::with_capacity(NONCE_LEN + plaintext.len() + TAG_LEN);
    output.extend_from_slice(nonce.as_ref());
    output.extend_from_slice(plaintext);

    let tag = key
        .seal_in_place_separate_tag(nonce, aead::Aad::from(aad), &mut output[NONCE_LEN..])
        .map_err(|_| CryptoFailure::PassphraseEncryption(Artifact::Primitive))?;
    output.extend_from_slice(tag.as_ref());

    Ok(output)
}

/// Decrypt bytes produced by [`seal`] with the same key and `aad`.
///
/// A wrong key, different `aad` or any modified byte fails the GCM check.
/// The caller receives no partial plaintext.
pub fn open(
    key_bytes: &[u8; KEY_LEN],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoFailure> {
    if ciphertext.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoFailure::Decryption(Artifact::Primitive));
    }

    let nonce_bytes: [u8; NONCE_LEN] = ciphertext[..NONCE_LEN]
        .try_into()
        .map_err(|_| CryptoFailure::Decryption(Artifact::Primitive))?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let unbound = UnboundKey::new(ALGORITHM, key_bytes)
        .map_err(|_| CryptoFailure::Decryption(Artifact::Primitive))?;
    let key = LessSafeKey::new(unbound);

    let mut payload = Zeroizing::new(ciphertext[NONCE_LEN..].to_vec());
    let plaintext_len = key
        .open_in_place(nonce, aead::Aad::from(aad), payload.as_mut_slice())
        .map_err(|_| CryptoFailure::Decryption(Artifact::Primitive))?
        .len();
    payload.truncate(plaintext_len);

    Ok(payload)
}

/// Derive a 256-bit key from ECDH output with HKDF-SHA256.
///
/// `salt` binds the derivation to the exchanged public keys, `info` to the
/// purpose of the derived key.
pub fn derive_key(ikm: &[u8], salt: &[u8], info: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoFailure> {
    let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, salt).extract(ikm);
    let info_slices = [info];
    let okm = prk
        .expand(&info_slices, hkdf::HKDF_SHA256)
        .map_err(|_| CryptoFailure::PassphraseEncryption(Artifact::Primitive))?;

    let mut derived = Zeroizing::new([0u8; KEY_LEN]);
    okm.fill(&mut derived[..])
        .map_err(|_| CryptoFailure::PassphraseEncryption(Artifact::Primitive))?;
    Ok(derived)
}

/// Stretch a passphrase into a 256-bit key with PBKDF2-HMAC-SHA256.
pub fn derive_passphrase_key(
    passphrase: &[u8],
    salt: &[u8],
    iterations: NonZeroU32,
) -> Zeroizing<[u8; KEY_LEN]> {
    let mut derived = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        passphrase,
        &mut derived[..],
    );
    derived
}
