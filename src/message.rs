//! Hybrid message format.
//!
//! A message is a random session key encrypted to a recipient (the *key
//! packet*) followed by the payload encrypted under that session key (the
//! *data packet*). The two packets can be stored and transmitted apart.
//!
//! ```text
//! key packet:  [ 0x01 ][ version ][ recipient key id (8) ][ ephemeral X25519 (32) ]
//!              [ nonce | AES-256-GCM(session key) | tag ]
//! data packet: [ 0x02 ][ version ][ nonce | AES-256-GCM(payload) | tag ]
//! ```
//!
//! The key-encryption key is HKDF-SHA256 over the X25519 agreement between
//! a fresh ephemeral key and the recipient's encryption key. Each packet's
//! header is bound as additional data to its own ciphertext.

use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::crypto::{self, KEY_LEN, NONCE_LEN, TAG_LEN};
use crate::error::{Artifact, CryptoFailure};
use crate::keys::{PublicKey, UnlockedKey, KEY_FORMAT_VERSION, KEY_ID_LEN};

const KEY_PACKET_TAG: u8 = 0x01;
const DATA_PACKET_TAG: u8 = 0x02;

const KEY_PACKET_HEADER_LEN: usize = 2 + KEY_ID_LEN + 32;

/// Total length of a key packet.
pub const KEY_PACKET_LEN: usize = KEY_PACKET_HEADER_LEN + NONCE_LEN + KEY_LEN + TAG_LEN;

const DATA_PACKET_HEADER_LEN: usize = 2;

const SESSION_KEY_INFO: &[u8] = b"vaultkey/v1 session key";

/// An encrypted message split into its two packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitMessage {
    pub key_packet: Vec<u8>,
    pub data_packet: Vec<u8>,
}

/// Encrypt `plaintext` to `recipient`, returning the joined binary message.
pub(crate) fn encrypt(plaintext: &[u8], recipient: &PublicKey) -> Result<Vec<u8>, CryptoFailure> {
    let session_key = crypto::random_key()?;

    let ephemeral = StaticSecret::from(*crypto::random_key()?);
    let ephemeral_public = X25519PublicKey::from(&ephemeral);
    let recipient_encryption = recipient.encryption_key();
    let shared = ephemeral.diffie_hellman(&recipient_encryption);
    if !shared.was_contributory() {
        return Err(CryptoFailure::PassphraseEncryption(Artifact::RecipientKey));
    }
    let kek = session_kek(shared.as_bytes(), &ephemeral_public, &recipient_encryption)?;

    let mut message = Vec::with_capacity(KEY_PACKET_LEN + DATA_PACKET_HEADER_LEN + NONCE_LEN + plaintext.len() + TAG_LEN);
    message.push(KEY_PACKET_TAG);
    message.push(KEY_FORMAT_VERSION);
    message.extend_from_slice(&recipient.key_id());
    message.extend_from_slice(ephemeral_public.as_bytes());
    let wrapped_session_key = crypto::seal(&kek, &message[..KEY_PACKET_HEADER_LEN], session_key.as_slice())?;
    message.extend_from_slice(&wrapped_session_key);

    let data_header = [DATA_PACKET_TAG, KEY_FORMAT_VERSION];
    message.extend_from_slice(&data_header);
    message.extend_from_slice(&crypto::seal(&session_key, &data_header, plaintext)?);

    Ok(message)
}

/// Split a joined binary message into its key and data packets.
pub fn split(message: &[u8]) -> Result<SplitMessage, CryptoFailure> {
    let malformed = CryptoFailure::MessageSplit(Artifact::Primitive);
    if message.len() <= KEY_PACKET_LEN + DATA_PACKET_HEADER_LEN {
        return Err(malformed);
    }
    let (key_packet, data_packet) = message.split_at(KEY_PACKET_LEN);
    if key_packet[0] != KEY_PACKET_TAG || data_packet[0] != DATA_PACKET_TAG {
        return Err(malformed);
    }
    Ok(SplitMessage {
        key_packet: key_packet.to_vec(),
        data_packet: data_packet.to_vec(),
    })
}

/// Join two packets back into a binary message.
pub fn join(key_packet: &[u8], data_packet: &[u8]) -> Vec<u8> {
    [key_packet, data_packet].concat()
}

/// Decrypt a key/data packet pair with the recipient's unlocked key.
pub(crate) fn decrypt(
    key_packet: &[u8],
    data_packet: &[u8],
    recipient: &UnlockedKey,
) -> Result<Zeroizing<Vec<u8>>, CryptoFailure> {
    let failed = CryptoFailure::Decryption(Artifact::Primitive);
    if key_packet.len() != KEY_PACKET_LEN
        || key_packet[0] != KEY_PACKET_TAG
        || key_packet[1] != KEY_FORMAT_VERSION
    {
        return Err(failed);
    }
    if data_packet.len() < DATA_PACKET_HEADER_LEN + NONCE_LEN + TAG_LEN
        || data_packet[0] != DATA_PACKET_TAG
        || data_packet[1] != KEY_FORMAT_VERSION
    {
        return Err(failed);
    }
    if key_packet[2..2 + KEY_ID_LEN] != recipient.public_key().key_id() {
        return Err(failed);
    }

    let mut ephemeral_bytes = [0u8; 32];
    ephemeral_bytes.copy_from_slice(&key_packet[2 + KEY_ID_LEN..KEY_PACKET_HEADER_LEN]);
    let ephemeral_public = X25519PublicKey::from(ephemeral_bytes);

    let shared = recipient.agree(&ephemeral_public)?;
    let kek = session_kek(&shared, &ephemeral_public, &recipient.public_key().encryption_key())?;
    let session_key = crypto::open(&kek, &key_packet[..KEY_PACKET_HEADER_LEN], &key_packet[KEY_PACKET_HEADER_LEN..])?;
    if session_key.len() != KEY_LEN {
        return Err(failed);
    }
    let mut session = Zeroizing::new([0u8; KEY_LEN]);
    session.copy_from_slice(&session_key);

    crypto::open(
        &session,
        &data_packet[..DATA_PACKET_HEADER_LEN],
        &data_packet[DATA_PACKET_HEADER_LEN..],
    )
}

fn session_kek(
    shared: &[u8; 32],
    ephemeral: &X25519PublicKey,
    recipient: &X25519PublicKey,
) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoFailure> {
    let salt = [ephemeral.as_bytes().as_slice(), recipient.as_bytes().as_slice()].concat();
    crypto::derive_key(shared, &salt, SESSION_KEY_INFO)
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use super::*;
    use crate::keys::{AsymmetricKey, Passphrase};

    fn recipient() -> (AsymmetricKey, Passphrase) {
        let passphrase = Passphrase::new("recipient");
        let key = AsymmetricKey::generate("Recipient", &passphrase, NonZeroU32::new(10).unwrap()).unwrap();
        (key, passphrase)
    }

    #[test]
    fn test_encrypt_split_decrypt() {
        let (key, passphrase) = recipient();
        let message = encrypt(b"hello", key.public_key()).unwrap();
        let split = split(&message).unwrap();
        assert_eq!(split.key_packet.len(), KEY_PACKET_LEN);
        assert_eq!(join(&split.key_packet, &split.data_packet), message);

        let unlocked = key.unlock(&passphrase).unwrap();
        let plaintext = decrypt(&split.key_packet, &split.data_packet, &unlocked).unwrap();
        assert_eq!(plaintext.as_slice(), b"hello");
    }

    #[test]
    fn test_every_byte_is_tamper_sensitive() {
        let (key, passphrase) = recipient();
        let unlocked = key.unlock(&passphrase).unwrap();
        let message = split(&encrypt(b"hi", key.public_key()).unwrap()).unwrap();

        for i in 0..message.key_packet.len() {
            let mut packet = message.key_packet.clone();
            packet[i] ^= 0x01;
            assert!(decrypt(&packet, &message.data_packet, &unlocked).is_err(), "key packet byte {i}");
        }
        for i in 0..message.data_packet.len() {
            let mut packet = message.data_packet.clone();
            packet[i] ^= 0x01;
            assert!(decrypt(&message.key_packet, &packet, &unlocked).is_err(), "data packet byte {i}");
        }
    }

    #[test]
    fn test_other_recipient_cannot_decrypt() {
        let (key, _) = recipient();
        let (other, other_passphrase) = recipient();
        let message = split(&encrypt(b"hi", key.public_key()).unwrap()).unwrap();
        let unlocked = other.unlock(&other_passphrase).unwrap();
        assert!(decrypt(&message.key_packet, &message.data_packet, &unlocked).is_err());
    }

    #[test]
    fn test_split_rejects_short_or_mislabelled_input() {
        assert!(split(&[0x01; 10]).is_err());
        assert!(split(&vec![0x03; KEY_PACKET_LEN + 40]).is_err());
    }
}
