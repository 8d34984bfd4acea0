//! Create a vault, verify it, and share it with a second user.
//!
//! Run with: `RUST_LOG=vaultkey=debug cargo run --example share_vault_demo`

use tracing::info;
use tracing_subscriber::EnvFilter;
use vaultkey::{
    build_vault, open_vault, prepare_invites, CryptoProvider, InviteeData, Inviter, ProviderConfig, RingProvider,
    ShareInviteAggregator, ShareKeyRewrapper, ShareRole, ShareTarget, ShareTargetKind, SharedKey, VaultContent,
};

const CONFIG: &str = r#"{ "kdf_iterations": 20000 }"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 1. Setup
    let provider = RingProvider::new(&ProviderConfig::from_json(CONFIG)?)?;
    let (alice_key, alice_passphrase) = provider.generate_key_pair("AddressKey")?;
    let (bob_key, bob_passphrase) = provider.generate_key_pair("AddressKey")?;

    // 2. Alice creates a vault
    let mut content = VaultContent::new("Personal");
    content.description = "Things only Alice and Bob should see".into();
    let created = build_vault(&provider, "addr-alice", &alice_key, &alice_passphrase, &content)?;
    info!(
        signing_key = %created.secrets.signing_key.fingerprint(),
        vault_key = %created.secrets.vault_key.fingerprint(),
        "vault built"
    );
    println!("{}", serde_json::to_string_pretty(&created.request)?);

    // 3. Anyone holding Alice's address key can verify the whole chain
    let opened = open_vault(&provider, &created.request, &alice_key, &alice_passphrase)?;
    info!(name = %opened.vault_content()?.name, "vault verified");

    // 4. Alice invites Bob
    let mut aggregator = ShareInviteAggregator::new();
    aggregator.set_target(
        ShareTarget::Vault {
            vault_id: "vault-personal".into(),
        },
        0,
    );
    aggregator.set_recipient_keys([("bob@example.com".to_string(), Some(vec![*bob_key.public_key()]))]);
    aggregator.set_recipient_roles([("bob@example.com".to_string(), ShareRole::Write)]);

    let batch = prepare_invites(
        &provider,
        &aggregator.build_sharing_infos(),
        &SharedKey::select(ShareTargetKind::Vault, &created.secrets, 1),
        &Inviter {
            key: &alice_key,
            passphrase: &alice_passphrase,
        },
    )?;
    aggregator.reset();

    // 5. Bob accepts
    let rewrapper = ShareKeyRewrapper::new(&provider);
    for invitee in &batch.invitees {
        if let InviteeData::Existing { invite_key, .. } = invitee {
            let passphrase = rewrapper.accept_invite_key(
                invite_key,
                &created.secrets.vault_key,
                &bob_key,
                &bob_passphrase,
                &[*alice_key.public_key()],
            )?;
            provider.check_passphrase(&created.secrets.vault_key, &passphrase)?;
            info!(email = invitee.email(), role = invitee.role().id(), "invite accepted");
        }
    }

    Ok(())
}
