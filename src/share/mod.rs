//! Vault and item sharing.
//!
//! - [`aggregator`]: session bookkeeping of who is invited, with which role.
//! - [`rewrap`]: re-encrypting an existing key's passphrase for a recipient.
//! - [`invite`]: turning the collected intent into per-recipient payloads.
//!
//! Sharing never regenerates keys. Recipients receive a new wrapped
//! passphrase for the same key, so they verify the same fingerprint
//! signatures as the vault's creator.

pub mod aggregator;
pub mod invite;
pub mod rewrap;

pub use aggregator::{ShareInviteAggregator, ShareRole, ShareTarget, ShareTargetKind, SharingInfos, SharingPlan};
pub use invite::{prepare_invites, InviteBatch, InviteeData};
pub use rewrap::{InviteKey, Inviter, ShareKeyRewrapper, SharedKey};
