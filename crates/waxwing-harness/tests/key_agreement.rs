//! End-to-end key agreement between simulated peers.
//!
//! Every scenario runs two peers over a shared board and loopback network,
//! driving delivery with `run_until_idle` while the requesting side awaits
//! its friendship.

use waxwing_core::{CoreError, ErrorCode};
use waxwing_crypto::{Sign, sha256_hex};
use waxwing_harness::{MemoryBoard, SimEnv, SimNetwork, SimPeer, run_until_idle};
use waxwing_proto::{KapMessage, KapType};

struct World {
    network: SimNetwork,
    alice: SimPeer,
    bob: SimPeer,
}

async fn world(seed: u64) -> World {
    let env = SimEnv::with_seed(seed);
    let board = MemoryBoard::new();
    let network = SimNetwork::new();
    let alice = SimPeer::join("alice", &env, &board, &network).await.unwrap();
    let bob = SimPeer::join("bob", &env, &board, &network).await.unwrap();
    World { network, alice, bob }
}

fn summarize(transcript: &[KapMessage]) -> Vec<String> {
    transcript
        .iter()
        .map(|msg| format!("{} {} -> {}", msg.kind.as_str(), msg.hdr.from, msg.hdr.to))
        .collect()
}

#[tokio::test]
async fn friendship_established_on_both_sides() {
    let w = world(1).await;

    let peers = [&w.alice, &w.bob];
    let (friendship, errors) = tokio::join!(
        w.alice.kap.request_friendship("bob"),
        run_until_idle(&w.network, &peers),
    );
    let friendship = friendship.unwrap();
    assert!(errors.is_empty());

    assert_eq!(friendship.owner(), "alice");
    assert_eq!(friendship.other(), "bob");
    assert!(friendship.initiated());

    let id = w.bob.kap.is_friend("alice").unwrap().expect("bob stored the friendship");
    assert_eq!(id, friendship.id());
    assert_eq!(w.alice.kap.is_friend("bob").unwrap(), Some(friendship.id()));

    let theirs = w.bob.kap.get_friend("alice").await.unwrap();
    assert!(!theirs.initiated());
    assert_eq!(theirs.master_key().as_bytes(), friendship.master_key().as_bytes());
    assert_eq!(theirs.f_mac().as_bytes(), friendship.f_mac().as_bytes());
    assert_eq!(theirs.f_enc().as_bytes(), friendship.f_enc().as_bytes());

    insta::assert_debug_snapshot!(summarize(&w.network.transcript()), @r#"
    [
        "MSG1 alice -> bob",
        "MSG2 bob -> alice",
        "MSG3 alice -> bob",
        "MSG4 bob -> alice",
    ]
    "#);
}

#[tokio::test]
async fn existing_friendship_skips_key_agreement() {
    let w = world(2).await;
    let peers = [&w.alice, &w.bob];
    let (first, _) = tokio::join!(
        w.alice.kap.request_friendship("bob"),
        run_until_idle(&w.network, &peers),
    );
    let first = first.unwrap();
    let sent = w.network.transcript().len();

    let again = w.alice.kap.get_friend("bob").await.unwrap();
    assert_eq!(again.id(), first.id());
    assert_eq!(w.network.transcript().len(), sent);
}

#[tokio::test]
async fn concurrent_requests_share_one_run() {
    let w = world(3).await;

    let peers = [&w.alice, &w.bob];
    let (first, second, errors) = tokio::join!(
        w.alice.kap.request_friendship("bob"),
        w.alice.kap.request_friendship("bob"),
        run_until_idle(&w.network, &peers),
    );
    assert!(errors.is_empty());
    assert_eq!(first.unwrap().id(), second.unwrap().id());

    let transcript = w.network.transcript();
    let msg1_count = transcript.iter().filter(|msg| msg.kind == KapType::Msg1).count();
    assert_eq!(msg1_count, 1);
    assert_eq!(transcript.len(), 4);
}

#[tokio::test]
async fn forged_commitment_aborts_before_msg4() {
    let w = world(4).await;
    forge_commitment(&w.network);

    let peers = [&w.alice, &w.bob];
    let errors = tokio::select! {
        _ = w.alice.kap.request_friendship("bob") => panic!("alice must not complete"),
        errors = run_until_idle(&w.network, &peers) => errors,
    };
    assert!(errors.is_empty());

    let kinds: Vec<KapType> = w.network.transcript().iter().map(|msg| msg.kind).collect();
    assert_eq!(kinds, vec![KapType::Msg1, KapType::Msg2, KapType::Msg3]);
    assert_eq!(w.bob.kap.is_friend("alice").unwrap(), None);
    assert_eq!(w.alice.kap.is_friend("bob").unwrap(), None);
}

fn forge_commitment(network: &SimNetwork) {
    network.intercept(|msg| {
        if msg.kind == KapType::Msg1 {
            msg.payload = Some(sha256_hex(b"a different contribution"));
        }
    });
}

fn first_afids(transcript: &[KapMessage]) -> Vec<String> {
    transcript.iter().filter(|msg| msg.kind == KapType::Msg1).map(|msg| msg.hdr.afid.clone()).collect()
}

#[tokio::test]
async fn abort_releases_a_stalled_pair() {
    let w = world(41).await;
    forge_commitment(&w.network);

    let (stalled, errors) = tokio::join!(w.alice.kap.request_friendship("bob"), async {
        let errors = run_until_idle(&w.network, &[&w.alice, &w.bob]).await;
        assert!(w.alice.kap.abort("bob"));
        errors
    });
    assert!(errors.is_empty());
    let err = stalled.unwrap_err();
    assert!(matches!(&err, CoreError::Kap { peer, reason } if peer == "bob" && reason == "aborted"));
    assert!(!w.alice.kap.abort("bob"));

    w.network.intercept(|_| {});
    let peers = [&w.alice, &w.bob];
    let (retried, errors) = tokio::join!(
        w.alice.kap.request_friendship("bob"),
        run_until_idle(&w.network, &peers),
    );
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(retried.unwrap().id(), w.bob.kap.is_friend("alice").unwrap().unwrap());

    let transcript = w.network.transcript();
    let afids = first_afids(&transcript);
    assert_eq!(afids.len(), 2);
    assert_ne!(afids[0], afids[1]);
    assert_eq!(transcript.last().map(|msg| msg.kind), Some(KapType::Msg4));
}

#[tokio::test]
async fn dropped_request_releases_the_pair() {
    let w = world(42).await;
    forge_commitment(&w.network);

    let peers = [&w.alice, &w.bob];
    tokio::select! {
        _ = w.alice.kap.request_friendship("bob") => panic!("alice must not complete"),
        _ = run_until_idle(&w.network, &peers) => {},
    }
    assert!(!w.alice.kap.abort("bob"), "dropping the request already cleaned up");

    w.network.intercept(|_| {});
    let peers = [&w.alice, &w.bob];
    let (retried, errors) = tokio::join!(
        w.alice.kap.request_friendship("bob"),
        run_until_idle(&w.network, &peers),
    );
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(retried.unwrap().other(), "bob");

    let afids = first_afids(&w.network.transcript());
    assert_eq!(afids.len(), 2);
    assert_ne!(afids[0], afids[1]);
}

#[tokio::test]
async fn bad_msg2_signature_fails_the_request() {
    let w = world(5).await;
    let forger = w.bob.identity.clone();
    w.network.intercept(move |msg| {
        if msg.kind == KapType::Msg2 {
            msg.signature = Some(forger.sign(b"something else entirely"));
        }
    });

    let peers = [&w.alice, &w.bob];
    let (result, errors) = tokio::join!(
        w.alice.kap.request_friendship("bob"),
        run_until_idle(&w.network, &peers),
    );
    assert!(errors.is_empty());

    let err = result.unwrap_err();
    assert_eq!(err.code(), ErrorCode::KapError);
    assert!(matches!(&err, CoreError::Kap { peer, reason } if peer == "bob" && reason == "bad signature"));

    let kinds: Vec<KapType> = w.network.transcript().iter().map(|msg| msg.kind).collect();
    assert_eq!(kinds, vec![KapType::Msg1, KapType::Msg2]);
    assert_eq!(w.alice.kap.is_friend("bob").unwrap(), None);
}

#[tokio::test]
async fn retry_after_failure_starts_fresh() {
    let w = world(6).await;
    let forger = w.bob.identity.clone();
    w.network.intercept(move |msg| {
        if msg.kind == KapType::Msg2 {
            msg.signature = Some(forger.sign(b"tampered"));
        }
    });
    let peers = [&w.alice, &w.bob];
    let (failed, _) = tokio::join!(
        w.alice.kap.request_friendship("bob"),
        run_until_idle(&w.network, &peers),
    );
    assert!(failed.is_err());

    w.network.intercept(|_| {});
    let peers = [&w.alice, &w.bob];
    let (retried, errors) = tokio::join!(
        w.alice.kap.request_friendship("bob"),
        run_until_idle(&w.network, &peers),
    );
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(retried.unwrap().other(), "bob");
}

#[tokio::test]
async fn unpublished_peer_is_noident() {
    let env = SimEnv::with_seed(7);
    let board = MemoryBoard::new();
    let network = SimNetwork::new();
    let alice = SimPeer::join("alice", &env, &board, &network).await.unwrap();
    let _carol = SimPeer::new("carol", &env, &board, &network).unwrap();

    let err = alice.kap.request_friendship("carol").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NoIdent);
    assert_eq!(network.pending(), 0);
}

#[tokio::test]
async fn unreachable_peer_fails_without_hanging() {
    let w = world(8).await;
    w.network.disconnect("bob");

    let err = w.alice.kap.request_friendship("bob").await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(w.network.pending(), 0);
}
