use std::collections::BTreeSet;

use vaultkey::wrapper::verify_fingerprint_signature;
use vaultkey::{
    armor, build_vault, open_vault, Artifact, AsymmetricKey, CryptoProvider, Passphrase, ProviderConfig,
    RingProvider, VaultContent, WrappedPassphrase, CONTENT_FORMAT_VERSION,
};

fn provider() -> RingProvider {
    RingProvider::new(&ProviderConfig {
        kdf_iterations: 10,
        ..ProviderConfig::default()
    })
    .unwrap()
}

fn address(provider: &RingProvider) -> (AsymmetricKey, Passphrase) {
    provider.generate_key_pair("AddressKey").unwrap()
}

#[test]
fn test_each_passphrase_decrypts_with_its_parent_only() {
    let provider = provider();
    let (address_key, address_passphrase) = address(&provider);
    let created = build_vault(
        &provider,
        "addr-1",
        &address_key,
        &address_passphrase,
        &VaultContent::new("Personal"),
    )
    .unwrap();
    let request = &created.request;
    let secrets = &created.secrets;

    // 1. Signing key passphrase: parent is the address key.
    let signing = WrappedPassphrase::from_base64(
        &request.signing_key_passphrase_key_packet,
        &request.signing_key_passphrase,
    )
    .unwrap();
    let passphrase = signing.unwrap_with(&provider, &address_key, &address_passphrase).unwrap();
    provider.check_passphrase(&secrets.signing_key, &passphrase).unwrap();

    // 2. Vault key passphrase: parent is the address key.
    let vault = WrappedPassphrase::from_base64(&request.key_packet, &request.vault_key_passphrase).unwrap();
    let passphrase = vault.unwrap_with(&provider, &address_key, &address_passphrase).unwrap();
    provider.check_passphrase(&secrets.vault_key, &passphrase).unwrap();

    // 3. Item key passphrase: parent is the vault key, not the address key.
    let item = WrappedPassphrase::from_base64(
        &request.item_key_passphrase_key_packet,
        &request.item_key_passphrase,
    )
    .unwrap();
    let passphrase = item
        .unwrap_with(&provider, &secrets.vault_key, &secrets.vault_passphrase)
        .unwrap();
    provider.check_passphrase(&secrets.item_key, &passphrase).unwrap();
    assert!(item.unwrap_with(&provider, &address_key, &address_passphrase).is_err());

    // 4. No generated key can stand in for the address key.
    assert!(vault
        .unwrap_with(&provider, &secrets.signing_key, &secrets.signing_passphrase)
        .is_err());
}

#[test]
fn test_signature_chain_verifies() {
    let provider = provider();
    let (address_key, address_passphrase) = address(&provider);
    let created = build_vault(
        &provider,
        "addr-1",
        &address_key,
        &address_passphrase,
        &VaultContent::new("Personal"),
    )
    .unwrap();
    let request = &created.request;
    let secrets = &created.secrets;

    let signature = |field: &str| provider.armor_signature(&armor::decode_base64(field).unwrap());

    // 1. Acceptance signature: address key over the signing key fingerprint.
    verify_fingerprint_signature(
        &provider,
        &secrets.signing_key,
        &signature(&request.acceptance_signature),
        address_key.public_key(),
        Artifact::AcceptanceSignature,
    )
    .unwrap();

    // 2. Vault and item keys: signing key over their fingerprints.
    verify_fingerprint_signature(
        &provider,
        &secrets.vault_key,
        &signature(&request.vault_key_signature),
        secrets.signing_key.public_key(),
        Artifact::VaultKeySignature,
    )
    .unwrap();
    verify_fingerprint_signature(
        &provider,
        &secrets.item_key,
        &signature(&request.item_key_signature),
        secrets.signing_key.public_key(),
        Artifact::ItemKeySignature,
    )
    .unwrap();

    // 3. Key packet signature: vault key over its own passphrase key packet.
    let key_packet = armor::decode_base64(&request.key_packet).unwrap();
    assert!(provider.verify_detached(
        &signature(&request.key_packet_signature),
        &key_packet,
        secrets.vault_key.public_key()
    ));

    // 4. The signing key did not sign itself into the chain.
    assert!(verify_fingerprint_signature(
        &provider,
        &secrets.signing_key,
        &signature(&request.acceptance_signature),
        secrets.signing_key.public_key(),
        Artifact::AcceptanceSignature,
    )
    .is_err());
}

#[test]
fn test_content_is_authentic() {
    let provider = provider();
    let (address_key, address_passphrase) = address(&provider);
    let content = VaultContent::new("Personal");
    let created = build_vault(&provider, "addr-1", &address_key, &address_passphrase, &content).unwrap();
    let request = &created.request;
    let vault_key = &created.secrets.vault_key;
    let vault_passphrase = &created.secrets.vault_passphrase;

    // 1. Decrypt the envelope with the vault key.
    let envelope = provider.armor_message(&armor::decode_base64(&request.content).unwrap());
    let plain = provider.decrypt_message(&envelope, vault_key, vault_passphrase).unwrap();
    let json = armor::decode_base64(std::str::from_utf8(&plain).unwrap()).unwrap();
    assert_eq!(VaultContent::from_bytes(&json).unwrap(), content);

    // 2. Vault key signature covers the encrypted envelope.
    let encrypted = provider.armor_message(&armor::decode_base64(&request.content_encrypted_vault_signature).unwrap());
    let vault_signature = provider.decrypt_message(&encrypted, vault_key, vault_passphrase).unwrap();
    let vault_signature = vaultkey::ArmoredSignature::new(std::str::from_utf8(&vault_signature).unwrap());
    assert!(provider.verify_detached(&vault_signature, envelope.as_str().as_bytes(), vault_key.public_key()));

    // 3. Address key signature covers the plain envelope.
    let encrypted =
        provider.armor_message(&armor::decode_base64(&request.content_encrypted_address_signature).unwrap());
    let address_signature = provider.decrypt_message(&encrypted, vault_key, vault_passphrase).unwrap();
    let address_signature = vaultkey::ArmoredSignature::new(std::str::from_utf8(&address_signature).unwrap());
    assert!(provider.verify_detached(&address_signature, &plain, address_key.public_key()));
    assert!(!provider.verify_detached(&address_signature, &plain, vault_key.public_key()));

    // 4. The whole chain opens.
    let opened = open_vault(&provider, request, &address_key, &address_passphrase).unwrap();
    assert_eq!(opened.vault_content().unwrap(), content);
}

#[test]
fn test_request_uses_wire_field_names() {
    let provider = provider();
    let (address_key, address_passphrase) = address(&provider);
    let created = build_vault(
        &provider,
        "addr-1",
        &address_key,
        &address_passphrase,
        &VaultContent::new("Personal"),
    )
    .unwrap();

    let value = serde_json::to_value(&created.request).unwrap();
    let fields: BTreeSet<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
    let expected: BTreeSet<&str> = [
        "AddressID",
        "Content",
        "ContentFormatVersion",
        "ContentEncryptedAddressSignature",
        "ContentEncryptedVaultSignature",
        "VaultKey",
        "VaultKeyPassphrase",
        "VaultKeySignature",
        "KeyPacket",
        "KeyPacketSignature",
        "SigningKey",
        "SigningKeyPassphrase",
        "SigningKeyPassphraseKeyPacket",
        "AcceptanceSignature",
        "ItemKey",
        "ItemKeyPassphrase",
        "ItemKeyPassphraseKeyPacket",
        "ItemKeySignature",
    ]
    .into_iter()
    .collect();
    assert_eq!(fields, expected);
    assert_eq!(value["ContentFormatVersion"], CONTENT_FORMAT_VERSION);
    assert_eq!(value["AddressID"], "addr-1");

    // Round trip through JSON still opens.
    let request = serde_json::from_value(value).unwrap();
    open_vault(&provider, &request, &address_key, &address_passphrase).unwrap();
}
