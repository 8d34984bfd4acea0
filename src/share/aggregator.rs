//! Share invite session state.
//!
//! An owned, explicitly reset record of one in-progress share operation:
//! the target, the recipients' resolved public keys and their roles. No
//! validation and no cryptography happen here; the aggregator never fails.
//!
//! Mutation goes through `&mut self`, so one flow owns one aggregator.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::keys::PublicKey;

/// Whether a share exposes a whole vault or a single item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShareTargetKind {
    Vault,
    Item,
}

impl ShareTargetKind {
    /// Numeric identifier used on the wire.
    pub fn wire_id(&self) -> u8 {
        match self {
            Self::Vault => 1,
            Self::Item => 2,
        }
    }
}

/// What is being shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShareTarget {
    Vault { vault_id: String },
    Item { vault_id: String, item_id: String },
}

impl ShareTarget {
    pub fn kind(&self) -> ShareTargetKind {
        match self {
            Self::Vault { .. } => ShareTargetKind::Vault,
            Self::Item { .. } => ShareTargetKind::Item,
        }
    }

    pub fn vault_id(&self) -> &str {
        match self {
            Self::Vault { vault_id } | Self::Item { vault_id, .. } => vault_id,
        }
    }

    pub fn item_id(&self) -> Option<&str> {
        match self {
            Self::Vault { .. } => None,
            Self::Item { item_id, .. } => Some(item_id),
        }
    }
}

/// Permission level granted to a share recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShareRole {
    #[serde(rename = "1")]
    Admin,
    #[serde(rename = "2")]
    Write,
    #[serde(rename = "3")]
    Read,
}

impl ShareRole {
    pub fn id(&self) -> &'static str {
        match self {
            Self::Admin => "1",
            Self::Write => "2",
            Self::Read => "3",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "1" => Some(Self::Admin),
            "2" => Some(Self::Write),
            "3" => Some(Self::Read),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        *self == Self::Admin
    }

    pub fn can_edit(&self) -> bool {
        *self != Self::Read
    }
}

/// One recipient's invite, ready for key re-wrapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharingInfos {
    pub target: ShareTarget,
    pub email: String,
    pub role: ShareRole,
    /// `None` when no key was resolved for the address: a new user, or an
    /// address the server must resolve.
    pub receiver_public_keys: Option<Vec<PublicKey>>,
    pub item_count: usize,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Result of [`ShareInviteAggregator::build_sharing_plan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharingPlan {
    pub infos: Vec<SharingInfos>,
    /// Emails with resolved keys but no role. They get no invite.
    pub skipped: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ShareInviteAggregator {
    current_target: Option<ShareTarget>,
    item_count: usize,
    email_to_public_keys: BTreeMap<String, Option<Vec<PublicKey>>>,
    email_to_role: HashMap<String, ShareRole>,
    expires_at: Option<DateTime<Utc>>,
}

impl ShareInviteAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_target(&mut self, target: ShareTarget, item_count: usize) {
        self.current_target = Some(target);
        self.item_count = item_count;
    }

    pub fn set_recipient_keys(&mut self, keys: impl IntoIterator<Item = (String, Option<Vec<PublicKey>>)>) {
        self.email_to_public_keys = keys.into_iter().collect();
    }

    pub fn set_recipient_roles(&mut self, roles: impl IntoIterator<Item = (String, ShareRole)>) {
        self.email_to_role = roles.into_iter().collect();
    }

    pub fn set_expiry(&mut self, expires_at: Option<DateTime<Utc>>) {
        self.expires_at = expires_at;
    }

    pub fn target(&self) -> Option<&ShareTarget> {
        self.current_target.as_ref()
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    /// Every email with a key entry, in sorted order.
    pub fn all_emails(&self) -> Vec<String> {
        self.email_to_public_keys.keys().cloned().collect()
    }

    /// One entry per email present in both the key map and the role map.
    /// Emails without a role are left out; see [`Self::build_sharing_plan`]
    /// to learn which.
    pub fn build_sharing_infos(&self) -> Vec<SharingInfos> {
        self.build_sharing_plan().infos
    }

    /// Like [`Self::build_sharing_infos`], also reporting skipped emails.
    ///
    /// With no target set there is nothing to share, and every email is
    /// reported as skipped.
    pub fn build_sharing_plan(&self) -> SharingPlan {
        let mut plan = SharingPlan::default();
        for (email, keys) in &self.email_to_public_keys {
            match (&self.current_target, self.email_to_role.get(email)) {
                (Some(target), Some(role)) => plan.infos.push(SharingInfos {
                    target: target.clone(),
                    email: email.clone(),
                    role: *role,
                    receiver_public_keys: keys.clone(),
                    item_count: self.item_count,
                    expires_at: self.expires_at,
                }),
                _ => plan.skipped.push(email.clone()),
            }
        }
        plan
    }

    /// Forget the target, recipients, roles and expiry.
    pub fn reset(&mut self) {
        self.current_target = None;
        self.item_count = 0;
        self.email_to_public_keys.clear();
        self.email_to_role.clear();
        self.expires_at = None;
    }
}
