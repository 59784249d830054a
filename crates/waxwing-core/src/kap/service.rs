//! Async driver around [`KapEngine`].
//!
//! Resolves peer identities, sends outbound messages, persists established
//! friendships and resolves waiting callers. Concurrent requests for the
//! same peer share one `watch` channel, so they observe one run and one
//! outcome.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, warn};
use waxwing_crypto::{EccKeyPair, Friendship};
use waxwing_proto::{KapMessage, KapType};

use super::engine::{KapAction, KapEngine};
use crate::{
    CoreError, FriendshipStore, KeyStore, directory::IdentityResolver, env::Environment,
    storage::Storage,
};

/// Delivers KAP messages to their recipients.
///
/// Timeouts and retries are the transport's business.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send `msg` to `msg.hdr.to`.
    async fn send(&self, msg: KapMessage) -> Result<(), CoreError>;
}

type Outcome = Option<Result<Friendship, CoreError>>;

struct Inner<S, E: Environment, T, R> {
    owner: String,
    env: E,
    engine: Mutex<KapEngine>,
    friendships: FriendshipStore<S, E>,
    transport: Arc<T>,
    resolver: Arc<R>,
    pending: Mutex<HashMap<String, watch::Sender<Outcome>>>,
}

/// Friendship establishment for one local principal.
///
/// Clones share the session table.
pub struct KapService<S, E: Environment, T, R> {
    inner: Arc<Inner<S, E, T, R>>,
}

impl<S, E: Environment, T, R> Clone for KapService<S, E, T, R> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<S, E, T, R> KapService<S, E, T, R>
where
    S: Storage,
    E: Environment,
    T: Transport,
    R: IdentityResolver,
{
    /// Service for `owner`, whose identity is `identity`.
    pub fn new(
        owner: impl Into<String>,
        identity: EccKeyPair,
        store: KeyStore<S, E>,
        transport: Arc<T>,
        resolver: Arc<R>,
    ) -> Self {
        let owner = owner.into();
        Self {
            inner: Arc::new(Inner {
                engine: Mutex::new(KapEngine::new(owner.clone(), identity)),
                owner,
                env: store.env().clone(),
                friendships: FriendshipStore::new(store),
                transport,
                resolver,
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Local principal.
    pub fn owner(&self) -> &str {
        &self.inner.owner
    }

    /// Existing friendship id with `peer`, without running KAP.
    pub fn is_friend(&self, peer: &str) -> Result<Option<String>, CoreError> {
        Ok(self.inner.friendships.find(&self.inner.owner, peer)?.map(|f| f.id()))
    }

    /// Existing friendship with `peer`, or a new one from a KAP run.
    pub async fn get_friend(&self, peer: &str) -> Result<Friendship, CoreError> {
        if let Some(friendship) = self.inner.friendships.find(&self.inner.owner, peer)? {
            return Ok(friendship);
        }
        self.request_friendship(peer).await
    }

    /// Run KAP with `peer`.
    ///
    /// Joins the run already in flight for `peer` if there is one. Resolves
    /// once the friendship is persisted or the run fails.
    ///
    /// # Errors
    ///
    /// - `KapError`: a verification step failed
    /// - resolver errors (`NoIdent`, `Stale`) for `peer`
    /// - `Generic`: transport or storage failure
    pub async fn request_friendship(&self, peer: &str) -> Result<Friendship, CoreError> {
        let (mut outcome, leader) = self.subscribe(peer);
        let _guard = leader.then(|| LeaderGuard { service: self, peer, outcome: outcome.clone() });

        if leader {
            match self.inner.resolver.resolve(peer).await {
                Ok(peer_key) => {
                    let actions = self.with_engine(|engine| engine.initiate(&self.inner.env, peer, peer_key));
                    self.dispatch(actions).await;
                },
                Err(err) => self.finish(peer, Err(err)),
            }
        } else {
            debug!(peer, "joining key agreement in flight");
        }

        let resolved = outcome
            .wait_for(Option::is_some)
            .await
            .map_err(|_| CoreError::Generic(format!("key agreement with {peer} abandoned")))?;
        match &*resolved {
            Some(result) => result.clone(),
            None => unreachable!("wait_for only returns resolved outcomes"),
        }
    }

    /// Abandon the run with `peer`.
    ///
    /// Drops the engine session and fails every waiting caller with
    /// `KapError`, so the next request starts over from MSG1. Returns
    /// whether a session or waiting callers existed.
    pub fn abort(&self, peer: &str) -> bool {
        let had_session = self.with_engine(|engine| engine.abort(peer));
        let waiters = self.take_pending(peer);
        let had_waiters = waiters.is_some();
        if let Some(sender) = waiters {
            sender.send_replace(Some(Err(CoreError::kap(peer, "aborted"))));
        }
        if had_session || had_waiters {
            debug!(peer, "key agreement aborted");
        }
        had_session || had_waiters
    }

    /// Process an inbound message.
    ///
    /// # Errors
    ///
    /// Boundary rejections from [`KapEngine::handle`], and resolver errors
    /// for the sender of a MSG1. Verification failures are not errors
    /// here: they resolve the waiting callers.
    pub async fn receive(&self, msg: KapMessage) -> Result<(), CoreError> {
        let sender_key = match msg.kind {
            KapType::Msg1 => Some(self.inner.resolver.resolve(&msg.hdr.from).await?),
            _ => None,
        };

        let actions = self.with_engine(|engine| engine.handle(&self.inner.env, &msg, sender_key))?;
        self.dispatch(actions).await;
        Ok(())
    }

    async fn dispatch(&self, actions: Vec<KapAction>) {
        for action in actions {
            match action {
                KapAction::Send(msg) => {
                    let peer = msg.hdr.to.clone();
                    if let Err(err) = self.inner.transport.send(msg).await {
                        warn!(peer = %peer, error = %err, "transport failed, aborting session");
                        self.with_engine(|engine| engine.abort(&peer));
                        self.finish(&peer, Err(err));
                        return;
                    }
                },
                KapAction::Established(friendship) => {
                    let peer = friendship.other().to_string();
                    match self.inner.friendships.store(&friendship) {
                        Ok(()) => self.finish(&peer, Ok(friendship)),
                        Err(err) => {
                            warn!(peer = %peer, error = %err, "could not persist friendship");
                            self.finish(&peer, Err(err));
                            return;
                        },
                    }
                },
                KapAction::Failed { peer, error } => self.finish(&peer, Err(error)),
            }
        }
    }

    /// Join or create the outcome channel for `peer`. The caller that
    /// creates it leads the run.
    #[allow(clippy::expect_used)]
    fn subscribe(&self, peer: &str) -> (watch::Receiver<Outcome>, bool) {
        let mut pending = self.inner.pending.lock().expect("Mutex poisoned");
        if let Some(sender) = pending.get(peer) {
            return (sender.subscribe(), false);
        }
        let (sender, receiver) = watch::channel(None);
        pending.insert(peer.to_string(), sender);
        (receiver, true)
    }

    /// Resolve every caller waiting on `peer`, exactly once.
    fn finish(&self, peer: &str, result: Result<Friendship, CoreError>) {
        if let Some(sender) = self.take_pending(peer) {
            sender.send_replace(Some(result));
        }
    }

    #[allow(clippy::expect_used)]
    fn take_pending(&self, peer: &str) -> Option<watch::Sender<Outcome>> {
        self.inner.pending.lock().expect("Mutex poisoned").remove(peer)
    }

    /// Abort the run behind `outcome` if it is still the one registered
    /// for `peer`.
    #[allow(clippy::expect_used)]
    fn abandon(&self, peer: &str, outcome: &watch::Receiver<Outcome>) {
        let sender = {
            let mut pending = self.inner.pending.lock().expect("Mutex poisoned");
            match pending.get(peer) {
                Some(sender) if sender.subscribe().same_channel(outcome) => pending.remove(peer),
                _ => None,
            }
        };
        if let Some(sender) = sender {
            warn!(peer, "leader dropped before key agreement resolved, aborting session");
            self.with_engine(|engine| engine.abort(peer));
            sender.send_replace(Some(Err(CoreError::kap(peer, "aborted"))));
        }
    }

    #[allow(clippy::expect_used)]
    fn with_engine<O>(&self, f: impl FnOnce(&mut KapEngine) -> O) -> O {
        let mut engine = self.inner.engine.lock().expect("Mutex poisoned");
        f(&mut engine)
    }
}

/// Aborts the leader's run if its future is dropped before the outcome
/// resolves.
struct LeaderGuard<'a, S, E: Environment, T, R>
where
    S: Storage,
    T: Transport,
    R: IdentityResolver,
{
    service: &'a KapService<S, E, T, R>,
    peer: &'a str,
    outcome: watch::Receiver<Outcome>,
}

impl<S, E, T, R> Drop for LeaderGuard<'_, S, E, T, R>
where
    S: Storage,
    E: Environment,
    T: Transport,
    R: IdentityResolver,
{
    fn drop(&mut self) {
        if self.outcome.borrow().is_some() {
            return;
        }
        self.service.abandon(self.peer, &self.outcome);
    }
}
