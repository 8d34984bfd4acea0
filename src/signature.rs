//! Detached signatures.
//!
//! ```text
//! [ version ][ context flag ][ signer key id (8) ][ Ed25519 signature (64) ]
//! ```
//!
//! When a signature context is given, the signed bytes are
//! `len(context) (2, BE) || context || data` and the flag is set. A
//! signature made in a context only verifies in that same context, and a
//! context-free signature never verifies where a context is required.

use crate::keys::{PublicKey, UnlockedKey, KEY_FORMAT_VERSION, KEY_ID_LEN, SIGNATURE_LEN};

/// Length of an encoded detached signature.
pub const DETACHED_SIGNATURE_LEN: usize = 2 + KEY_ID_LEN + SIGNATURE_LEN;

/// A purpose string bound into signed bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureContext(&'static str);

impl SignatureContext {
    /// Inviter signature over a key passphrase rewrapped for an existing user.
    pub const EXISTING_USER_INVITE: Self = Self("vaultkey.invite.vault.existing-user");
    /// Inviter signature addressed to a user who has no keys yet.
    pub const NEW_USER_INVITE: Self = Self("vaultkey.invite.vault.new-user");

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

fn signed_bytes(data: &[u8], context: Option<SignatureContext>) -> Vec<u8> {
    match context {
        None => data.to_vec(),
        Some(context) => {
            let context = context.as_str().as_bytes();
            let mut out = Vec::with_capacity(2 + context.len() + data.len());
            out.extend_from_slice(&(context.len() as u16).to_be_bytes());
            out.extend_from_slice(context);
            out.extend_from_slice(data);
            out
        }
    }
}

pub(crate) fn sign(signer: &UnlockedKey, data: &[u8], context: Option<SignatureContext>) -> Vec<u8> {
    let signature = signer.sign(&signed_bytes(data, context));
    let mut out = Vec::with_capacity(DETACHED_SIGNATURE_LEN);
    out.push(KEY_FORMAT_VERSION);
    out.push(u8::from(context.is_some()));
    out.extend_from_slice(&signer.public_key().key_id());
    out.extend_from_slice(&signature);
    out
}

pub(crate) fn verify(
    signature: &[u8],
    data: &[u8],
    signer: &PublicKey,
    context: Option<SignatureContext>,
) -> bool {
    if signature.len() != DETACHED_SIGNATURE_LEN
        || signature[0] != KEY_FORMAT_VERSION
        || signature[1] != u8::from(context.is_some())
        || signature[2..2 + KEY_ID_LEN] != signer.key_id()
    {
        return false;
    }
    signer.verify(&signed_bytes(data, context), &signature[2 + KEY_ID_LEN..])
}
