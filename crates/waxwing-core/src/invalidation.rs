//! Invalidation cascade.
//!
//! When a principal's identity changes or goes stale, everything that was
//! derived from trusting the old identity has to go:
//!
//! - shared symmetric keys naming the principal get the principal added to
//!   their `invalid` set (monotonic; the key keeps its history and its other
//!   members)
//! - friendships with the principal are deleted outright, so the next
//!   exchange has to run KAP against the new identity
//!
//! The cached public identity is replaced (changed) or dropped (stale).

use std::collections::BTreeMap;

use tracing::{info, warn};
use waxwing_crypto::{AesKey, EccPubKey};

use crate::{
    CoreError, FriendshipStore, KeyStore, StorageName, env::Environment, naming::TYP_PUBLIC,
    storage::Storage,
};

/// Outcome of re-verifying one principal's published identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStatus {
    /// Matches what was cached
    Unchanged,
    /// Expired or no longer published
    Stale,
    /// A different identity is now published
    Changed(EccPubKey),
}

impl KeyStatus {
    /// Whether downstream keys must be invalidated.
    pub fn requires_invalidation(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// What a cascade touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    /// Shared keys that gained an `invalid` entry
    pub keys_invalidated: usize,
    /// Friendships removed
    pub friendships_deleted: usize,
}

/// Apply `verdicts` to every stored key and friendship.
pub fn cascade<S: Storage, E: Environment>(
    store: &KeyStore<S, E>,
    verdicts: &BTreeMap<String, KeyStatus>,
) -> Result<CascadeReport, CoreError> {
    let affected: Vec<&str> = verdicts
        .iter()
        .filter(|(_, status)| status.requires_invalidation())
        .map(|(user, _)| user.as_str())
        .collect();
    if affected.is_empty() {
        return Ok(CascadeReport::default());
    }

    let mut report = CascadeReport::default();

    for (name, mut key) in store.typed_records::<AesKey>(StorageName::any_keyring_prefix())? {
        let mut changed = false;
        for user in &affected {
            if key.has_principal(user) {
                changed |= key.invalidate(*user);
            }
        }
        if changed {
            store.store(&name, key)?;
            report.keys_invalidated += 1;
        }
    }

    let friendships = FriendshipStore::new(store.clone());
    for user in &affected {
        report.friendships_deleted += friendships.clear_for_user(user)?;
    }

    for (user, status) in verdicts {
        let name = StorageName::global(TYP_PUBLIC, user);
        match status {
            KeyStatus::Unchanged => {},
            KeyStatus::Changed(key) => store.store(&name, key.clone())?,
            KeyStatus::Stale => store.delete(&name)?,
        }
        if status.requires_invalidation() {
            warn!(user = %user, status = ?status, "identity no longer trusted");
        }
    }

    info!(
        keys_invalidated = report.keys_invalidated,
        friendships_deleted = report.friendships_deleted,
        "invalidation cascade complete"
    );
    Ok(report)
}
