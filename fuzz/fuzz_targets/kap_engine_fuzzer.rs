//! Fuzz target for the KAP engine under a hostile network
//!
//! # Strategy
//!
//! Two engines run the exchange while the fuzzer decides, per step, whether
//! to deliver the next message, drop it, replay an earlier one, or deliver
//! a mutated copy.
//!
//! # Invariants
//!
//! - `handle` never panics; bad input is an `Err` or a `Failed` action
//! - at most one session per peer
//! - when both sides establish, they agree on id and channel keys

#![no_main]

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use waxwing_core::{Environment, KapAction, KapEngine};
use waxwing_crypto::{EccKeyPair, Friendship};
use waxwing_proto::KapMessage;

#[derive(Clone)]
struct CountingEnv {
    counter: Arc<AtomicU64>,
}

impl Environment for CountingEnv {
    type Instant = Duration;

    fn now(&self) -> Duration {
        Duration::from_millis(self.counter.load(Ordering::Relaxed))
    }

    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        for chunk in buffer.chunks_mut(8) {
            let bytes = self.counter.fetch_add(1, Ordering::Relaxed).to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn wall_clock_ms(&self) -> u64 {
        1_700_000_000_000
    }
}

#[derive(Debug, Arbitrary)]
enum Step {
    Deliver,
    Drop,
    Replay { index: u8 },
    Mutate { field: Field, text: String },
    Restart,
}

#[derive(Debug, Arbitrary)]
enum Field {
    To,
    From,
    Afid,
    Bfid,
    Payload,
    Signature,
    Hmac,
}

fn mutate(msg: &mut KapMessage, field: &Field, text: String) {
    match field {
        Field::To => msg.hdr.to = text,
        Field::From => msg.hdr.from = text,
        Field::Afid => msg.hdr.afid = text,
        Field::Bfid => msg.hdr.bfid = Some(text),
        Field::Payload => msg.payload = Some(text),
        Field::Signature => msg.signature = Some(text),
        Field::Hmac => msg.hmac = Some(text),
    }
}

struct Side {
    engine: KapEngine,
    established: Option<Friendship>,
}

fuzz_target!(|steps: Vec<Step>| {
    let env = CountingEnv { counter: Arc::new(AtomicU64::new(1)) };
    let alice_id = EccKeyPair::from_secrets([1; 32], [2; 32]);
    let bob_id = EccKeyPair::from_secrets([3; 32], [4; 32]);
    let alice_key = alice_id.public();
    let bob_key = bob_id.public();

    let mut alice = Side { engine: KapEngine::new("alice", alice_id), established: None };
    let mut bob = Side { engine: KapEngine::new("bob", bob_id), established: None };

    let mut queue: VecDeque<KapMessage> = VecDeque::new();
    let mut history: Vec<KapMessage> = Vec::new();
    let absorb = |actions: Vec<KapAction>, side: &mut Side, queue: &mut VecDeque<KapMessage>| {
        for action in actions {
            match action {
                KapAction::Send(msg) => queue.push_back(msg),
                KapAction::Established(friendship) => side.established = Some(friendship),
                KapAction::Failed { .. } => {},
            }
        }
    };

    let actions = alice.engine.initiate(&env, "bob", bob_key.clone());
    absorb(actions, &mut alice, &mut queue);

    for step in steps.into_iter().take(64) {
        let msg = match step {
            Step::Deliver => queue.pop_front(),
            Step::Drop => {
                queue.pop_front();
                None
            },
            Step::Replay { index } if !history.is_empty() => {
                Some(history[usize::from(index) % history.len()].clone())
            },
            Step::Replay { .. } => None,
            Step::Mutate { field, text } => queue.pop_front().map(|mut msg| {
                mutate(&mut msg, &field, text);
                msg
            }),
            Step::Restart => {
                alice.engine.abort("bob");
                let actions = alice.engine.initiate(&env, "bob", bob_key.clone());
                absorb(actions, &mut alice, &mut queue);
                None
            },
        };
        let Some(msg) = msg else { continue };
        history.push(msg.clone());

        if msg.hdr.to == "bob" {
            if let Ok(actions) = bob.engine.handle(&env, &msg, Some(alice_key.clone())) {
                absorb(actions, &mut bob, &mut queue);
            }
        } else if let Ok(actions) = alice.engine.handle(&env, &msg, Some(bob_key.clone())) {
            absorb(actions, &mut alice, &mut queue);
        }

        assert!(alice.engine.session_count() <= 1);
        assert!(bob.engine.session_count() <= 1);
    }

    if let (Some(a), Some(b)) = (&alice.established, &bob.established) {
        if a.id() == b.id() {
            assert_eq!(a.f_mac().as_bytes(), b.f_mac().as_bytes());
            assert_eq!(a.f_enc().as_bytes(), b.f_enc().as_bytes());
        }
    }
});
