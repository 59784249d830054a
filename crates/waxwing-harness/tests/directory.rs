//! Identity publication and lookup through the shared board.

use std::time::Duration;

use waxwing_core::{BoardPost, BulletinBoard, CoreConfig, ErrorCode};
use waxwing_harness::{MemoryBoard, SimEnv, SimNetwork, SimPeer};

struct World {
    env: SimEnv,
    board: MemoryBoard,
    network: SimNetwork,
}

fn world(seed: u64) -> World {
    World { env: SimEnv::with_seed(seed), board: MemoryBoard::new(), network: SimNetwork::new() }
}

#[tokio::test]
async fn publication_found_in_recent_timeline() {
    let w = world(11);
    let alice = SimPeer::join("alice", &w.env, &w.board, &w.network).await.unwrap();
    let bob = SimPeer::join("bob", &w.env, &w.board, &w.network).await.unwrap();

    assert_eq!(w.board.posts_by("alice").len(), 3);
    let fetched = bob.directory.fetch("alice").await.unwrap();
    assert!(fetched.key.same_key(&alice.identity.public()));
    assert_eq!(fetched.platform_id, "id-alice");
}

#[tokio::test]
async fn search_fallback_when_timeline_misses() {
    let w = world(12);
    let alice = SimPeer::join("alice", &w.env, &w.board, &w.network).await.unwrap();
    let bob = SimPeer::join("bob", &w.env, &w.board, &w.network).await.unwrap();
    w.board.hide_recent("alice");

    assert!(w.board.fetch_recent("alice").await.unwrap().is_empty());
    let key = bob.directory.fetch_public("alice").await.unwrap();
    assert!(key.same_key(&alice.identity.public()));
}

#[tokio::test]
async fn nothing_published_is_noident() {
    let w = world(13);
    let _alice = SimPeer::new("alice", &w.env, &w.board, &w.network).unwrap();
    let bob = SimPeer::join("bob", &w.env, &w.board, &w.network).await.unwrap();

    let err = bob.directory.fetch_public("alice").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NoIdent);
    assert!(bob.directory.cached("alice").unwrap().is_none());
}

#[tokio::test]
async fn reposted_records_do_not_verify_under_another_account() {
    let w = world(14);
    let _alice = SimPeer::join("alice", &w.env, &w.board, &w.network).await.unwrap();
    let bob = SimPeer::join("bob", &w.env, &w.board, &w.network).await.unwrap();

    // Same username and records, different platform account.
    for post in w.board.posts_by("alice") {
        w.board.inject(BoardPost { author_id: "id-mallory".into(), ..post });
    }

    let err = bob.directory.fetch_public("alice").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NoIdent);
    assert!(bob.directory.cached("alice").unwrap().is_none());
}

#[tokio::test]
async fn newest_publication_wins() {
    let w = world(15);
    let alice = SimPeer::join("alice", &w.env, &w.board, &w.network).await.unwrap();
    let bob = SimPeer::join("bob", &w.env, &w.board, &w.network).await.unwrap();

    w.env.advance(Duration::from_secs(60));
    let (fresh, _) = alice.vault().regenerate("alice").unwrap();
    alice.directory.publish("alice", &fresh).await.unwrap();

    let fetched = bob.directory.fetch("alice").await.unwrap();
    assert!(fetched.key.same_key(&fresh.public()));
    assert!(!fetched.key.same_key(&alice.identity.public()));
}

#[tokio::test]
async fn expired_publication_is_stale() {
    let w = world(16);
    let config = CoreConfig { key_lifetime: Duration::from_secs(60), ..CoreConfig::default() };
    let alice = SimPeer::with_config("alice", &w.env, &w.board, &w.network, config).unwrap();
    alice.publish().await.unwrap();
    let bob = SimPeer::join("bob", &w.env, &w.board, &w.network).await.unwrap();

    w.env.advance(Duration::from_secs(61));
    let err = bob.directory.fetch_public("alice").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Stale);
    assert!(bob.directory.cached("alice").unwrap().is_none());
}

#[tokio::test]
async fn cached_identity_survives_board_loss() {
    let w = world(17);
    let alice = SimPeer::join("alice", &w.env, &w.board, &w.network).await.unwrap();
    let bob = SimPeer::join("bob", &w.env, &w.board, &w.network).await.unwrap();

    bob.directory.fetch_public("alice").await.unwrap();
    w.board.erase("alice");

    let key = bob.directory.fetch_public("alice").await.unwrap();
    assert!(key.same_key(&alice.identity.public()));
    assert_eq!(bob.directory.fetch("alice").await.unwrap_err().code(), ErrorCode::NoIdent);
}

#[tokio::test]
async fn publishing_for_another_account_is_rejected() {
    let w = world(18);
    let alice = SimPeer::new("alice", &w.env, &w.board, &w.network).unwrap();

    let err = alice.directory.publish("bob", &alice.identity).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::PubSub);
    assert!(w.board.posts_by("alice").is_empty());
}

#[tokio::test]
async fn check_own_detects_foreign_identity() {
    let w = world(19);
    let alice = SimPeer::join("alice", &w.env, &w.board, &w.network).await.unwrap();
    let (fresh, _) = alice.vault().regenerate("alice").unwrap();

    let err = alice.directory.check_own("alice", &fresh).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidKey);
    assert!(alice.directory.check_own("alice", &alice.identity).await.is_ok());
}
