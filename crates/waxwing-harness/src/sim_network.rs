//! Loopback message queue.

use std::{
    collections::{HashSet, VecDeque},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use waxwing_core::{CoreError, Transport};
use waxwing_proto::KapMessage;

type Interceptor = Box<dyn Fn(&mut KapMessage) + Send + Sync>;

#[derive(Default)]
struct NetworkState {
    queue: VecDeque<KapMessage>,
    delivered: Vec<KapMessage>,
    unreachable: HashSet<String>,
    interceptor: Option<Interceptor>,
}

/// Shared in-order queue of KAP messages.
///
/// Every peer's [`LoopbackTransport`] pushes here; the scenario pops and
/// delivers. Messages pass through the interceptor, if one is set, on
/// their way in.
#[derive(Clone, Default)]
pub struct SimNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl SimNetwork {
    /// Empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport handle for a peer.
    pub fn transport(&self) -> Arc<LoopbackTransport> {
        Arc::new(LoopbackTransport { network: self.clone() })
    }

    /// Next message to deliver.
    pub fn pop(&self) -> Option<KapMessage> {
        self.lock().queue.pop_front()
    }

    /// Number of queued messages.
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Every message accepted so far, in send order.
    pub fn transcript(&self) -> Vec<KapMessage> {
        self.lock().delivered.clone()
    }

    /// Rewrite messages as they are sent.
    pub fn intercept(&self, f: impl Fn(&mut KapMessage) + Send + Sync + 'static) {
        self.lock().interceptor = Some(Box::new(f));
    }

    /// Make sends to `peer` fail.
    pub fn disconnect(&self, peer: &str) {
        self.lock().unreachable.insert(peer.to_string());
    }

    fn push(&self, mut msg: KapMessage) -> Result<(), CoreError> {
        let mut state = self.lock();
        if state.unreachable.contains(&msg.hdr.to) {
            return Err(CoreError::Generic(format!("{} unreachable", msg.hdr.to)));
        }
        if let Some(interceptor) = &state.interceptor {
            interceptor(&mut msg);
        }
        state.delivered.push(msg.clone());
        state.queue.push_back(msg);
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, NetworkState> {
        self.state.lock().expect("Mutex poisoned")
    }
}

/// [`Transport`] that enqueues on a [`SimNetwork`].
pub struct LoopbackTransport {
    network: SimNetwork,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, msg: KapMessage) -> Result<(), CoreError> {
        self.network.push(msg)
    }
}
