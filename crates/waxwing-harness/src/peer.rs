//! One simulated principal.

use std::sync::Arc;

use tracing::debug;
use waxwing_core::{
    CoreConfig, CoreError, Conversations, IdentityVault, InviteFlow, KapService, KeyStore,
    KeyringStore, Maintenance, MemoryStorage, PublicKeyDirectory,
};
use waxwing_crypto::EccKeyPair;

use crate::{LoopbackTransport, MemoryBoard, ScriptedConsent, SimEnv, SimNetwork};

/// Directory as wired in simulation.
pub type SimDirectory = PublicKeyDirectory<MemoryStorage, SimEnv, MemoryBoard>;

/// KAP service as wired in simulation.
pub type SimKap = KapService<MemoryStorage, SimEnv, LoopbackTransport, SimDirectory>;

/// A principal with its own storage, sharing the clock, board and network
/// with everyone else.
pub struct SimPeer {
    /// Principal name
    pub name: String,
    /// Shared simulation environment
    pub env: SimEnv,
    /// This peer's device storage
    pub storage: MemoryStorage,
    /// Cached key store over `storage`
    pub store: KeyStore<MemoryStorage, SimEnv>,
    /// Long-term identity
    pub identity: EccKeyPair,
    /// Board handle signed in as this peer
    pub board: MemoryBoard,
    /// Directory over this peer's store
    pub directory: Arc<SimDirectory>,
    /// Key agreement service
    pub kap: SimKap,
    /// Consent answers for invite flows
    pub consent: ScriptedConsent,
}

impl SimPeer {
    /// Create `name` with a fresh identity, without publishing it.
    pub fn new(name: &str, env: &SimEnv, board: &MemoryBoard, network: &SimNetwork) -> Result<Self, CoreError> {
        Self::with_config(name, env, board, network, CoreConfig::default())
    }

    /// Like [`new`](Self::new) with explicit timing configuration.
    pub fn with_config(
        name: &str,
        env: &SimEnv,
        board: &MemoryBoard,
        network: &SimNetwork,
        config: CoreConfig,
    ) -> Result<Self, CoreError> {
        let storage = MemoryStorage::new();
        let store = KeyStore::new(storage.clone(), env.clone(), config);
        let identity = IdentityVault::new(store.clone()).create(name)?;
        let board = board.as_account(name, &format!("id-{name}"));
        let directory = Arc::new(PublicKeyDirectory::new(store.clone(), Arc::new(board.clone())));
        let kap = KapService::new(
            name,
            identity.clone(),
            store.clone(),
            network.transport(),
            Arc::clone(&directory),
        );

        Ok(Self {
            name: name.to_string(),
            env: env.clone(),
            storage,
            store,
            identity,
            board,
            directory,
            kap,
            consent: ScriptedConsent::accepting(),
        })
    }

    /// Create and publish `name`.
    pub async fn join(name: &str, env: &SimEnv, board: &MemoryBoard, network: &SimNetwork) -> Result<Self, CoreError> {
        let peer = Self::new(name, env, board, network)?;
        peer.publish().await?;
        Ok(peer)
    }

    /// Publish the current identity.
    pub async fn publish(&self) -> Result<(), CoreError> {
        self.directory.publish(&self.name, &self.identity).await?;
        Ok(())
    }

    /// Identity vault over this peer's store.
    pub fn vault(&self) -> IdentityVault<MemoryStorage, SimEnv> {
        IdentityVault::new(self.store.clone())
    }

    /// Keyrings over this peer's store.
    pub fn keyrings(&self) -> KeyringStore<MemoryStorage, SimEnv> {
        KeyringStore::new(self.store.clone())
    }

    /// Conversations over this peer's store.
    pub fn conversations(&self) -> Conversations<MemoryStorage, SimEnv> {
        Conversations::new(self.store.clone())
    }

    /// Invite flow answering prompts from `self.consent`.
    pub fn invites(&self) -> InviteFlow<MemoryStorage, SimEnv, SimDirectory, ScriptedConsent> {
        InviteFlow::new(self.store.clone(), Arc::clone(&self.directory), Arc::new(self.consent.clone()))
    }

    /// Maintenance jobs for this peer.
    pub fn maintenance(&self) -> Maintenance<MemoryStorage, SimEnv, MemoryBoard> {
        Maintenance::new(self.store.clone(), (*self.directory).clone())
    }
}

/// Idle polls tolerated before [`run_until_idle`] returns.
const IDLE_POLLS: usize = 16;

/// Deliver queued messages to `peers` until the network stays empty.
///
/// Yields between deliveries so that concurrently joined futures (for
/// example pending `request_friendship` calls) make progress. Returns the
/// errors reported by `receive`, in delivery order.
pub async fn run_until_idle(network: &SimNetwork, peers: &[&SimPeer]) -> Vec<CoreError> {
    let mut errors = Vec::new();
    let mut idle = 0;

    while idle < IDLE_POLLS {
        let Some(msg) = network.pop() else {
            idle += 1;
            tokio::task::yield_now().await;
            continue;
        };
        idle = 0;

        let Some(peer) = peers.iter().find(|peer| peer.name == msg.hdr.to) else {
            debug!(to = %msg.hdr.to, "dropping message for unknown peer");
            continue;
        };
        if let Err(err) = peer.kap.receive(msg).await {
            errors.push(err);
        }
    }
    errors
}
