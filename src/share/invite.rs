//! Invite preparation.
//!
//! Turns the [`SharingInfos`] collected by the aggregator into one payload
//! per recipient. Recipients with a resolved public key get the shared key
//! rewrapped for them; recipients without one get a new-user signature the
//! server can hold until they create keys.

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::error::ShareError;
use crate::provider::CryptoProvider;
use crate::share::aggregator::{ShareRole, ShareTarget, SharingInfos};
use crate::share::rewrap::{InviteKey, Inviter, ShareKeyRewrapper, SharedKey};

/// What one recipient receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteeData {
    Existing {
        email: String,
        invite_key: InviteKey,
        role: ShareRole,
    },
    New {
        email: String,
        /// Base64 inviter signature over the email and shared key fingerprint.
        signature: String,
        role: ShareRole,
    },
}

impl InviteeData {
    pub fn email(&self) -> &str {
        match self {
            Self::Existing { email, .. } | Self::New { email, .. } => email,
        }
    }

    pub fn role(&self) -> ShareRole {
        match self {
            Self::Existing { role, .. } | Self::New { role, .. } => *role,
        }
    }
}

/// Every invite for one target, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteBatch {
    pub target: ShareTarget,
    pub invitees: Vec<InviteeData>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Build one invite per entry of `infos`.
///
/// All entries must name the same target, and `shared` must be the key of
/// that target's kind. Otherwise, or when `infos` is empty, this fails with
/// [`ShareError::IncompleteInformation`]. The first cryptographic failure
/// aborts the whole batch.
#[instrument(skip_all, fields(recipients = infos.len()))]
pub fn prepare_invites<P: CryptoProvider + ?Sized>(
    provider: &P,
    infos: &[SharingInfos],
    shared: &SharedKey<'_>,
    inviter: &Inviter<'_>,
) -> Result<InviteBatch, ShareError> {
    let first = infos.first().ok_or(ShareError::IncompleteInformation)?;
    if shared.kind != first.target.kind() || infos.iter().any(|info| info.target != first.target) {
        return Err(ShareError::IncompleteInformation);
    }

    let rewrapper = ShareKeyRewrapper::new(provider);
    let mut invitees = Vec::with_capacity(infos.len());
    for info in infos {
        let recipient = info.receiver_public_keys.as_deref().and_then(|keys| keys.first());
        let invitee = match recipient {
            Some(public_key) => InviteeData::Existing {
                email: info.email.clone(),
                invite_key: rewrapper.rewrap_signed(shared, public_key, inviter)?,
                role: info.role,
            },
            None => InviteeData::New {
                email: info.email.clone(),
                signature: rewrapper.new_user_invite_signature(&info.email, shared.key, inviter)?,
                role: info.role,
            },
        };
        debug!(
            email = %info.email,
            role = info.role.id(),
            existing = recipient.is_some(),
            "prepared invite"
        );
        invitees.push(invitee);
    }

    Ok(InviteBatch {
        target: first.target.clone(),
        invitees,
        expires_at: first.expires_at,
    })
}
