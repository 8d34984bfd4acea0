//! Transport encodings.
//!
//! Binary artifacts leave the crate either as PEM-style armored text or as
//! standard base64. Internal computation always works on raw bytes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::{Artifact, CryptoFailure};

/// Armor tag of a passphrase-locked private key export.
pub const PRIVATE_KEY_TAG: &str = "VAULTKEY PRIVATE KEY";
/// Armor tag of a hybrid-encrypted message.
pub const MESSAGE_TAG: &str = "VAULTKEY MESSAGE";
/// Armor tag of a detached signature.
pub const SIGNATURE_TAG: &str = "VAULTKEY SIGNATURE";

/// Wrap raw bytes in an armored block carrying `tag`.
pub fn armor(tag: &str, bytes: &[u8]) -> String {
    pem::encode(&pem::Pem::new(tag, bytes.to_vec()))
}

/// Strip the armor from `text`, requiring the block to carry `tag`.
pub fn unarmor(expected_tag: &str, text: &str) -> Result<Vec<u8>, CryptoFailure> {
    let block = pem::parse(text).map_err(|_| CryptoFailure::ContentEncoding(Artifact::Primitive))?;
    if block.tag() != expected_tag {
        return Err(CryptoFailure::ContentEncoding(Artifact::Primitive));
    }
    Ok(block.into_contents())
}

/// Strip the armor from any block and return its body as base64.
pub fn unarmor_to_base64(text: &str) -> Result<String, CryptoFailure> {
    let block = pem::parse(text).map_err(|_| CryptoFailure::ContentEncoding(Artifact::Primitive))?;
    Ok(encode_base64(block.contents()))
}

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_base64(text: &str) -> Result<Vec<u8>, CryptoFailure> {
    STANDARD
        .decode(text)
        .map_err(|_| CryptoFailure::ContentEncoding(Artifact::Primitive))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unarmor_checks_tag() {
        let armored = armor(MESSAGE_TAG, b"payload");
        assert_eq!(unarmor(MESSAGE_TAG, &armored).unwrap(), b"payload");
        assert!(unarmor(SIGNATURE_TAG, &armored).is_err());
    }

    #[test]
    fn test_unarmor_to_base64_matches_body() {
        let armored = armor(SIGNATURE_TAG, &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(unarmor_to_base64(&armored).unwrap(), "3q2+7w==");
        assert!(unarmor_to_base64("not armored").is_err());
    }
}
