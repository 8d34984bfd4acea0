//! Vault key hierarchy construction and verification.
//!
//! Building a vault chains three wrapped keys and binds the vault content
//! into the hierarchy:
//!
//! ```text
//! AddressKey ──signs──▶ SigningKey ──signs──▶ VaultKey, ItemKey
//! AddressKey ──wraps──▶ SigningKey passphrase, VaultKey passphrase
//! VaultKey   ──wraps──▶ ItemKey passphrase
//! ```
//!
//! The content envelope is encrypted to the vault key and carries two
//! signatures: the vault key over the encrypted envelope, the address key
//! over the plain envelope. Both signatures are themselves encrypted to the
//! vault key. The vault key additionally signs its own passphrase key packet.
//!
//! [`open_vault`] walks the same chain in the other direction and refuses
//! the vault at the first link that does not verify or decrypt.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use crate::armor;
use crate::error::{Artifact, CryptoFailure};
use crate::keys::{AsymmetricKey, KeyRole, Passphrase};
use crate::provider::{ArmoredMessage, ArmoredSignature, CryptoProvider};
use crate::wrapper::{verify_fingerprint_signature, KeyWrapper, WrappedPassphrase};

/// Version of the serialized vault content format.
pub const CONTENT_FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Vault content
// ---------------------------------------------------------------------------

/// How a vault is presented to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultDisplay {
    pub icon: u32,
    pub color: u32,
}

/// The metadata of a vault, encrypted under its vault key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultContent {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub display: VaultDisplay,
}

impl VaultContent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoFailure> {
        serde_json::from_slice(bytes).map_err(|_| CryptoFailure::ContentEncoding(Artifact::VaultContent))
    }
}

/// Anything that can serialize itself as vault content.
pub trait VaultContentProvider {
    fn data(&self) -> Result<Vec<u8>, CryptoFailure>;
}

impl VaultContentProvider for VaultContent {
    fn data(&self) -> Result<Vec<u8>, CryptoFailure> {
        serde_json::to_vec(self).map_err(|_| CryptoFailure::ContentEncoding(Artifact::VaultContent))
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// The complete, self-verifying payload for creating a vault.
///
/// Key fields hold armored locked keys. Every other binary field is base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateVaultRequest {
    #[serde(rename = "AddressID")]
    pub address_id: String,
    /// Encrypted content envelope.
    pub content: String,
    pub content_format_version: u32,
    /// Address key signature over the plain envelope, encrypted to the vault key.
    pub content_encrypted_address_signature: String,
    /// Vault key signature over the encrypted envelope, encrypted to the vault key.
    pub content_encrypted_vault_signature: String,
    pub vault_key: String,
    /// Data packet of the vault key passphrase, wrapped for the address key.
    pub vault_key_passphrase: String,
    /// Signing key signature over the vault key fingerprint.
    pub vault_key_signature: String,
    /// Key packet of the vault key passphrase.
    pub key_packet: String,
    /// Vault key signature over its own passphrase key packet.
    pub key_packet_signature: String,
    pub signing_key: String,
    pub signing_key_passphrase: String,
    pub signing_key_passphrase_key_packet: String,
    /// Address key signature over the signing key fingerprint.
    pub acceptance_signature: String,
    pub item_key: String,
    /// Data packet of the item key passphrase, wrapped for the vault key.
    pub item_key_passphrase: String,
    pub item_key_passphrase_key_packet: String,
    /// Signing key signature over the item key fingerprint.
    pub item_key_signature: String,
}

/// The generated keys and their passphrases, handed to the caller for
/// secure storage. Dropping it zeroizes the passphrases.
#[derive(Debug)]
pub struct VaultSecrets {
    pub signing_key: AsymmetricKey,
    pub signing_passphrase: Passphrase,
    pub vault_key: AsymmetricKey,
    pub vault_passphrase: Passphrase,
    pub item_key: AsymmetricKey,
    pub item_passphrase: Passphrase,
}

/// A built vault: the request to submit and the secrets behind it.
#[derive(Debug)]
pub struct CreatedVault {
    pub request: CreateVaultRequest,
    pub secrets: VaultSecrets,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Build the request for a brand-new vault owned by `address_id`.
///
/// The generated passphrases are wiped before returning. Use [`build_vault`]
/// to keep them.
pub fn build_create_vault_request<P, C>(
    provider: &P,
    address_id: &str,
    address_key: &AsymmetricKey,
    address_passphrase: &Passphrase,
    vault_content: &C,
) -> Result<CreateVaultRequest, CryptoFailure>
where
    P: CryptoProvider + ?Sized,
    C: VaultContentProvider + ?Sized,
{
    build_vault(provider, address_id, address_key, address_passphrase, vault_content).map(|vault| vault.request)
}

/// Build the request for a brand-new vault and return the generated secrets
/// alongside it.
#[instrument(skip_all, fields(address_id = %address_id))]
pub fn build_vault<P, C>(
    provider: &P,
    address_id: &str,
    address_key: &AsymmetricKey,
    address_passphrase: &Passphrase,
    vault_content: &C,
) -> Result<CreatedVault, CryptoFailure>
where
    P: CryptoProvider + ?Sized,
    C: VaultContentProvider + ?Sized,
{
    let wrapper = KeyWrapper::new(provider);

    // Step 1: signing key. Its fingerprint signature, made by the address
    // key, is the acceptance signature anchoring the whole hierarchy.
    let signing = wrapper.wrap(
        KeyRole::Signing,
        address_key.public_key(),
        address_key,
        address_passphrase,
    )?;
    debug!(fingerprint = %signing.key.fingerprint(), "signing key ready");

    // Step 2: vault key, passphrase wrapped for the address key.
    let vault = wrapper.wrap(
        KeyRole::Vault,
        address_key.public_key(),
        &signing.key,
        &signing.passphrase,
    )?;
    debug!(fingerprint = %vault.key.fingerprint(), "vault key ready");

    // Step 3: item key, passphrase wrapped for the vault key.
    let item = wrapper.wrap(
        KeyRole::Item,
        vault.key.public_key(),
        &signing.key,
        &signing.passphrase,
    )?;
    debug!(fingerprint = %item.key.fingerprint(), "item key ready");

    // Step 4: plain envelope.
    let plain_envelope = Zeroizing::new(armor::encode_base64(&vault_content.data()?));

    // Step 5: encrypted envelope.
    let encrypted_envelope = provider
        .encrypt_to_public_key(plain_envelope.as_bytes(), vault.key.public_key())
        .map_err(|e| e.at(Artifact::VaultContent))?;

    // Step 6: content-integrity signature over the encrypted envelope.
    let vault_signature = provider
        .sign_detached(encrypted_envelope.as_str().as_bytes(), &vault.key, &vault.passphrase)
        .map_err(|e| e.at(Artifact::ContentVaultSignature))?;

    // Step 7: bind the vault key passphrase key packet to the vault key.
    let key_packet_signature = provider
        .sign_detached(&vault.wrapped_passphrase.key_packet, &vault.key, &vault.passphrase)
        .map_err(|e| e.at(Artifact::KeyPacketSignature))?;

    // Step 8: creator signature over the plain envelope.
    let address_signature = provider
        .sign_detached(plain_envelope.as_bytes(), address_key, address_passphrase)
        .map_err(|e| e.at(Artifact::ContentAddressSignature))?;

    // Step 9: keep both content signatures confidential to vault key holders.
    let encrypted_address_signature = provider
        .encrypt_to_public_key(address_signature.as_str().as_bytes(), vault.key.public_key())
        .map_err(|e| e.at(Artifact::ContentAddressSignature))?;
    let encrypted_vault_signature = provider
        .encrypt_to_public_key(vault_signature.as_str().as_bytes(), vault.key.public_key())
        .map_err(|e| e.at(Artifact::ContentVaultSignature))?;

    // Step 10: transport encoding.
    let unarmor = |text: &str, artifact: Artifact| {
        provider
            .unarmor_to_base64(text)
            .map_err(|_| CryptoFailure::ContentEncoding(artifact))
    };

    let request = CreateVaultRequest {
        address_id: address_id.to_string(),
        content: unarmor(encrypted_envelope.as_str(), Artifact::VaultContent)?,
        content_format_version: CONTENT_FORMAT_VERSION,
        content_encrypted_address_signature: unarmor(
            encrypted_address_signature.as_str(),
            Artifact::ContentAddressSignature,
        )?,
        content_encrypted_vault_signature: unarmor(
            encrypted_vault_signature.as_str(),
            Artifact::ContentVaultSignature,
        )?,
        vault_key: vault.key.armored().to_string(),
        vault_key_passphrase: vault.wrapped_passphrase.data_packet_base64(),
        vault_key_signature: unarmor(
            vault.fingerprint_signature.signature.as_str(),
            Artifact::VaultKeySignature,
        )?,
        key_packet: vault.wrapped_passphrase.key_packet_base64(),
        key_packet_signature: unarmor(key_packet_signature.as_str(), Artifact::KeyPacketSignature)?,
        signing_key: signing.key.armored().to_string(),
        signing_key_passphrase: signing.wrapped_passphrase.data_packet_base64(),
        signing_key_passphrase_key_packet: signing.wrapped_passphrase.key_packet_base64(),
        acceptance_signature: unarmor(
            signing.fingerprint_signature.signature.as_str(),
            Artifact::AcceptanceSignature,
        )?,
        item_key: item.key.armored().to_string(),
        item_key_passphrase: item.wrapped_passphrase.data_packet_base64(),
        item_key_passphrase_key_packet: item.wrapped_passphrase.key_packet_base64(),
        item_key_signature: unarmor(
            item.fingerprint_signature.signature.as_str(),
            Artifact::ItemKeySignature,
        )?,
    };

    debug!("vault request assembled");

    Ok(CreatedVault {
        request,
        secrets: VaultSecrets {
            signing_key: signing.key,
            signing_passphrase: signing.passphrase,
            vault_key: vault.key,
            vault_passphrase: vault.passphrase,
            item_key: item.key,
            item_passphrase: item.passphrase,
        },
    })
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// A vault whose whole chain of trust verified.
#[derive(Debug)]
pub struct OpenedVault {
    pub address_id: String,
    /// The serialized vault content, as produced by the content provider.
    pub content: Zeroizing<Vec<u8>>,
    pub secrets: VaultSecrets,
}

impl OpenedVault {
    /// Decode the content as [`VaultContent`].
    pub fn vault_content(&self) -> Result<VaultContent, CryptoFailure> {
        VaultContent::from_bytes(&self.content)
    }
}

/// Verify and decrypt a vault request with the owner's address key.
///
/// Checks, in order: acceptance signature, signing key passphrase, vault
/// key signature, key packet signature, vault key passphrase, item key
/// signature, item key passphrase, vault content self-signature, content
/// decryption, creator signature.
#[instrument(skip_all, fields(address_id = %request.address_id))]
pub fn open_vault<P: CryptoProvider + ?Sized>(
    provider: &P,
    request: &CreateVaultRequest,
    address_key: &AsymmetricKey,
    address_passphrase: &Passphrase,
) -> Result<OpenedVault, CryptoFailure> {
    // Signing key, certified by the address key.
    let signing_key = parse_key(&request.signing_key, Artifact::SigningKey)?;
    let acceptance = decode_signature(provider, &request.acceptance_signature, Artifact::AcceptanceSignature)?;
    verify_fingerprint_signature(
        provider,
        &signing_key,
        &acceptance,
        address_key.public_key(),
        Artifact::AcceptanceSignature,
    )?;
    let signing_passphrase = unwrap_passphrase(
        provider,
        &request.signing_key_passphrase_key_packet,
        &request.signing_key_passphrase,
        (&signing_key, Artifact::SigningKey),
        (address_key, address_passphrase),
    )?;
    debug!(fingerprint = %signing_key.fingerprint(), "signing key verified");

    // Vault key, certified by the signing key and bound to its key packet.
    let vault_key = parse_key(&request.vault_key, Artifact::VaultKey)?;
    let vault_key_signature = decode_signature(provider, &request.vault_key_signature, Artifact::VaultKeySignature)?;
    verify_fingerprint_signature(
        provider,
        &vault_key,
        &vault_key_signature,
        signing_key.public_key(),
        Artifact::VaultKeySignature,
    )?;
    let key_packet = decode(&request.key_packet, Artifact::VaultKey)?;
    let key_packet_signature = decode_signature(provider, &request.key_packet_signature, Artifact::KeyPacketSignature)?;
    if !provider.verify_detached(&key_packet_signature, &key_packet, vault_key.public_key()) {
        return Err(CryptoFailure::SignatureVerification(Artifact::KeyPacketSignature));
    }
    let vault_passphrase = unwrap_passphrase(
        provider,
        &request.key_packet,
        &request.vault_key_passphrase,
        (&vault_key, Artifact::VaultKey),
        (address_key, address_passphrase),
    )?;
    debug!(fingerprint = %vault_key.fingerprint(), "vault key verified");

    // Item key, certified by the signing key and wrapped for the vault key.
    let item_key = parse_key(&request.item_key, Artifact::ItemKey)?;
    let item_key_signature = decode_signature(provider, &request.item_key_signature, Artifact::ItemKeySignature)?;
    verify_fingerprint_signature(
        provider,
        &item_key,
        &item_key_signature,
        signing_key.public_key(),
        Artifact::ItemKeySignature,
    )?;
    let item_passphrase = unwrap_passphrase(
        provider,
        &request.item_key_passphrase_key_packet,
        &request.item_key_passphrase,
        (&item_key, Artifact::ItemKey),
        (&vault_key, &vault_passphrase),
    )?;
    debug!(fingerprint = %item_key.fingerprint(), "item key verified");

    // Content: vault key self-signature over the encrypted envelope first.
    let encrypted_envelope = provider.armor_message(&decode(&request.content, Artifact::VaultContent)?);
    let vault_signature = decrypt_signature(
        provider,
        &request.content_encrypted_vault_signature,
        (&vault_key, &vault_passphrase),
        Artifact::ContentVaultSignature,
    )?;
    if !provider.verify_detached(&vault_signature, encrypted_envelope.as_str().as_bytes(), vault_key.public_key()) {
        return Err(CryptoFailure::SignatureVerification(Artifact::ContentVaultSignature));
    }

    let plain_envelope = provider
        .decrypt_message(&encrypted_envelope, &vault_key, &vault_passphrase)
        .map_err(|_| CryptoFailure::Decryption(Artifact::VaultContent))?;
    let address_signature = decrypt_signature(
        provider,
        &request.content_encrypted_address_signature,
        (&vault_key, &vault_passphrase),
        Artifact::ContentAddressSignature,
    )?;
    if !provider.verify_detached(&address_signature, &plain_envelope, address_key.public_key()) {
        return Err(CryptoFailure::SignatureVerification(Artifact::ContentAddressSignature));
    }

    let envelope_text =
        std::str::from_utf8(&plain_envelope).map_err(|_| CryptoFailure::ContentEncoding(Artifact::VaultContent))?;
    let content = Zeroizing::new(decode(envelope_text, Artifact::VaultContent)?);
    debug!("vault content verified");

    Ok(OpenedVault {
        address_id: request.address_id.clone(),
        content,
        secrets: VaultSecrets {
            signing_key,
            signing_passphrase,
            vault_key,
            vault_passphrase,
            item_key,
            item_passphrase,
        },
    })
}

fn parse_key(armored: &str, artifact: Artifact) -> Result<AsymmetricKey, CryptoFailure> {
    AsymmetricKey::from_armored(armored).map_err(|e| e.at(artifact))
}

fn decode(text: &str, artifact: Artifact) -> Result<Vec<u8>, CryptoFailure> {
    armor::decode_base64(text).map_err(|e| e.at(artifact))
}

fn decode_signature<P: CryptoProvider + ?Sized>(
    provider: &P,
    text: &str,
    artifact: Artifact,
) -> Result<ArmoredSignature, CryptoFailure> {
    Ok(provider.armor_signature(&decode(text, artifact)?))
}

/// Unwrap a passphrase for `target` with `parent` and check it unlocks `target`.
fn unwrap_passphrase<P: CryptoProvider + ?Sized>(
    provider: &P,
    key_packet: &str,
    data_packet: &str,
    (target, artifact): (&AsymmetricKey, Artifact),
    (parent, parent_passphrase): (&AsymmetricKey, &Passphrase),
) -> Result<Passphrase, CryptoFailure> {
    let wrapped = WrappedPassphrase::from_base64(key_packet, data_packet).map_err(|e| e.at(artifact))?;
    let passphrase = wrapped
        .unwrap_with(provider, parent, parent_passphrase)
        .map_err(|_| CryptoFailure::Decryption(artifact))?;
    provider
        .check_passphrase(target, &passphrase)
        .map_err(|_| CryptoFailure::KeyUnlock(artifact))?;
    Ok(passphrase)
}

/// Decrypt a base64 encrypted signature with the vault key.
fn decrypt_signature<P: CryptoProvider + ?Sized>(
    provider: &P,
    text: &str,
    (key, passphrase): (&AsymmetricKey, &Passphrase),
    artifact: Artifact,
) -> Result<ArmoredSignature, CryptoFailure> {
    let message: ArmoredMessage = provider.armor_message(&decode(text, artifact)?);
    let plain = provider
        .decrypt_message(&message, key, passphrase)
        .map_err(|_| CryptoFailure::Decryption(artifact))?;
    let armored = std::str::from_utf8(&plain).map_err(|_| CryptoFailure::ContentEncoding(artifact))?;
    Ok(ArmoredSignature::new(armored))
}
