//! Periodic identity upkeep.
//!
//! Two jobs run on their own periods:
//!
//! - distribute: make sure each local identity is published and fresh
//! - validate: re-fetch every friend's identity and feed the verdicts to the
//!   invalidation cascade

use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use tracing::{debug, info, warn};
use waxwing_proto::PublicationRecord;

use crate::{
    CoreError, FriendshipStore, IdentityVault, KeyStore,
    directory::{BulletinBoard, PublicKeyDirectory},
    env::Environment,
    invalidation::{self, CascadeReport, KeyStatus},
    storage::Storage,
};

/// Result of one distribute check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistributeOutcome {
    /// The published identity is ours and fresh
    Current,
    /// A new publication was posted
    Published {
        /// What was posted
        record: PublicationRecord,
        /// Why
        reason: RepublishReason,
    },
}

/// Why an identity was republished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepublishReason {
    /// Nothing verifiable was published
    Absent,
    /// The publication expired
    Stale,
    /// The publication is older than the maximum post age
    Aged,
}

/// When each job last ran.
#[derive(Debug, Clone, Copy)]
pub struct Schedule<I> {
    last_distribute: Option<I>,
    last_validate: Option<I>,
}

impl<I> Default for Schedule<I> {
    fn default() -> Self {
        Self { last_distribute: None, last_validate: None }
    }
}

/// Identity upkeep for the local principals.
pub struct Maintenance<S, E: Environment, B> {
    store: KeyStore<S, E>,
    vault: IdentityVault<S, E>,
    friendships: FriendshipStore<S, E>,
    directory: PublicKeyDirectory<S, E, B>,
}

impl<S: Storage, E: Environment, B: BulletinBoard> Maintenance<S, E, B> {
    /// Upkeep over a shared key store and directory.
    pub fn new(store: KeyStore<S, E>, directory: PublicKeyDirectory<S, E, B>) -> Self {
        Self {
            vault: IdentityVault::new(store.clone()),
            friendships: FriendshipStore::new(store.clone()),
            store,
            directory,
        }
    }

    /// Publish `user`'s identity if it is absent, stale or too old.
    ///
    /// # Errors
    ///
    /// - `NoIdent`: `user` has no local identity
    /// - `InvalidKey`: someone else's identity is published for `user`
    /// - publish errors (`NoEnt`, `PubSub`, `Generic`)
    pub async fn distribute_once(&self, user: &str) -> Result<DistributeOutcome, CoreError> {
        let identity = self.vault.load(user)?;
        let now = self.store.env().wall_clock_ms();

        let reason = match self.directory.check_own(user, &identity).await {
            Ok(fetched) if fetched.record.is_stale(now) => RepublishReason::Stale,
            Ok(fetched) if fetched.record.age_ms(now) > self.store.config().max_key_post_age_ms() => {
                RepublishReason::Aged
            },
            Ok(_) => return Ok(DistributeOutcome::Current),
            Err(CoreError::NoIdent { .. }) => RepublishReason::Absent,
            Err(err) => return Err(err),
        };

        let record = self.directory.publish(user, &identity).await?;
        info!(user, reason = ?reason, "republished identity");
        Ok(DistributeOutcome::Published { record, reason })
    }

    /// Re-verify every friend's identity and run the invalidation cascade.
    ///
    /// Friends whose lookup fails for reasons other than `NoIdent` are
    /// skipped until the next run.
    pub async fn validate_once(&self) -> Result<(BTreeMap<String, KeyStatus>, CascadeReport), CoreError> {
        let peers: BTreeSet<String> =
            self.friendships.list_all()?.iter().map(|f| f.other().to_string()).collect();
        let now = self.store.env().wall_clock_ms();
        let mut verdicts = BTreeMap::new();

        for peer in peers {
            let status = match self.directory.fetch(&peer).await {
                Ok(fetched) if fetched.record.is_stale(now) => KeyStatus::Stale,
                Ok(fetched) => match self.directory.cached(&peer)? {
                    Some(cached) if cached.same_key(&fetched.key) => KeyStatus::Unchanged,
                    Some(_) => KeyStatus::Changed(fetched.key),
                    None => {
                        debug!(peer = %peer, "no cached identity to compare");
                        KeyStatus::Unchanged
                    },
                },
                Err(CoreError::NoIdent { .. }) => KeyStatus::Stale,
                Err(err) => {
                    warn!(peer = %peer, error = %err, "skipping validation");
                    continue;
                },
            };
            verdicts.insert(peer, status);
        }

        let report = invalidation::cascade(&self.store, &verdicts)?;
        Ok((verdicts, report))
    }

    /// Run whichever jobs are due at `now`.
    pub async fn tick(&self, schedule: &mut Schedule<E::Instant>) {
        let now = self.store.env().now();
        let config = self.store.config();
        let due = |last: Option<E::Instant>, period: Duration| last.is_none_or(|last| now - last >= period);

        if due(schedule.last_distribute, config.distribute_period) {
            schedule.last_distribute = Some(now);
            match self.vault.principals() {
                Ok(users) => {
                    for user in users {
                        if let Err(err) = self.distribute_once(&user).await {
                            warn!(user = %user, error = %err, "distribute failed");
                        }
                    }
                },
                Err(err) => warn!(error = %err, "could not list identities"),
            }
        }

        if due(schedule.last_validate, config.validate_period) {
            schedule.last_validate = Some(now);
            if let Err(err) = self.validate_once().await {
                warn!(error = %err, "validate failed");
            }
        }

        let evicted = self.store.sweep();
        if evicted > 0 {
            debug!(evicted, "swept key cache");
        }
    }

    /// Run forever, waking every [`CoreConfig::maintenance_tick`](crate::CoreConfig::maintenance_tick).
    pub async fn run(&self) {
        let mut schedule = Schedule::default();
        loop {
            self.tick(&mut schedule).await;
            self.store.env().sleep(self.store.config().maintenance_tick()).await;
        }
    }
}
