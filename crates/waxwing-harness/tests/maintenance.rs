//! Republication, counterparty validation and the invalidation cascade.

use std::time::Duration;

use waxwing_core::{
    CascadeReport, CoreConfig, DistributeOutcome, Environment, ErrorCode, KeyStatus, RepublishReason,
    Schedule,
};
use waxwing_crypto::Friendship;
use waxwing_harness::{MemoryBoard, SimEnv, SimNetwork, SimPeer, run_until_idle};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

struct World {
    env: SimEnv,
    board: MemoryBoard,
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
    World { env, board, network, alice, bob }
}

async fn befriend(w: &World) -> Friendship {
    let peers = [&w.alice, &w.bob];
    let (friendship, errors) = tokio::join!(
        w.alice.kap.request_friendship("bob"),
        run_until_idle(&w.network, &peers),
    );
    assert!(errors.is_empty(), "{errors:?}");
    friendship.unwrap()
}

#[tokio::test]
async fn fresh_publication_is_current() {
    let w = world(21).await;
    let outcome = w.alice.maintenance().distribute_once("alice").await.unwrap();
    assert_eq!(outcome, DistributeOutcome::Current);
    assert_eq!(w.board.posts_by("alice").len(), 3);
}

#[tokio::test]
async fn aged_publication_is_republished() {
    let w = world(22).await;
    w.env.advance(4 * DAY);

    let outcome = w.alice.maintenance().distribute_once("alice").await.unwrap();
    let DistributeOutcome::Published { record, reason } = outcome else {
        panic!("expected a republication, got {outcome:?}");
    };
    assert_eq!(reason, RepublishReason::Aged);
    assert_eq!(record.timestamp, w.env.wall_clock_ms());
    assert_eq!(w.board.posts_by("alice").len(), 6);

    let again = w.alice.maintenance().distribute_once("alice").await.unwrap();
    assert_eq!(again, DistributeOutcome::Current);
}

#[tokio::test]
async fn expired_and_missing_publications_are_republished() {
    let w = world(23).await;
    w.env.advance(31 * DAY);
    let outcome = w.alice.maintenance().distribute_once("alice").await.unwrap();
    assert!(matches!(outcome, DistributeOutcome::Published { reason: RepublishReason::Stale, .. }));

    w.board.erase("alice");
    let outcome = w.alice.maintenance().distribute_once("alice").await.unwrap();
    assert!(matches!(outcome, DistributeOutcome::Published { reason: RepublishReason::Absent, .. }));
    assert_eq!(w.board.posts_by("alice").len(), 3);
}

#[tokio::test]
async fn distribute_without_identity_is_noident() {
    let w = world(24).await;
    let err = w.alice.maintenance().distribute_once("nobody").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NoIdent);
}

#[tokio::test]
async fn unchanged_friends_keep_their_friendships() {
    let w = world(25).await;
    let friendship = befriend(&w).await;

    let (verdicts, report) = w.alice.maintenance().validate_once().await.unwrap();
    assert_eq!(verdicts.get("bob"), Some(&KeyStatus::Unchanged));
    assert_eq!(report, CascadeReport::default());
    assert_eq!(w.alice.kap.is_friend("bob").unwrap(), Some(friendship.id()));
}

#[tokio::test]
async fn changed_identity_invalidates_shared_state() {
    let w = world(26).await;
    let friendship = befriend(&w).await;

    let ring = w.alice.keyrings().create("chat", "main", "alice").unwrap();
    let (conv, _) = w.alice.conversations().create(&ring, "room").unwrap();
    w.alice.invites().invite(&ring, &friendship.id(), &conv.to_string()).await.unwrap();

    w.env.advance(Duration::from_secs(60));
    let (fresh, _) = w.bob.vault().regenerate("bob").unwrap();
    w.bob.directory.publish("bob", &fresh).await.unwrap();

    let (verdicts, report) = w.alice.maintenance().validate_once().await.unwrap();
    assert!(matches!(verdicts.get("bob"), Some(KeyStatus::Changed(key)) if key.same_key(&fresh.public())));
    assert_eq!(report, CascadeReport { keys_invalidated: 1, friendships_deleted: 1 });

    assert_eq!(w.alice.kap.is_friend("bob").unwrap(), None);
    let cached = w.alice.directory.cached("bob").unwrap().unwrap();
    assert!(cached.same_key(&fresh.public()));

    let key = w.alice.conversations().key(&ring, &conv.to_string()).unwrap();
    assert!(key.is_invalid());
    assert!(key.invalid().contains("bob"));
    assert!(key.has_principal("alice"));
}

#[tokio::test]
async fn vanished_identity_is_stale() {
    let w = world(27).await;
    befriend(&w).await;
    w.board.erase("bob");

    let (verdicts, report) = w.alice.maintenance().validate_once().await.unwrap();
    assert_eq!(verdicts.get("bob"), Some(&KeyStatus::Stale));
    assert_eq!(report.friendships_deleted, 1);
    assert!(w.alice.directory.cached("bob").unwrap().is_none());
}

#[tokio::test]
async fn expired_counterparty_publication_is_stale() {
    let env = SimEnv::with_seed(30);
    let board = MemoryBoard::new();
    let network = SimNetwork::new();
    let alice = SimPeer::join("alice", &env, &board, &network).await.unwrap();
    let config = CoreConfig { key_lifetime: Duration::from_secs(60), ..CoreConfig::default() };
    let bob = SimPeer::with_config("bob", &env, &board, &network, config).unwrap();
    bob.publish().await.unwrap();

    let peers = [&alice, &bob];
    let (friendship, errors) =
        tokio::join!(alice.kap.request_friendship("bob"), run_until_idle(&network, &peers));
    assert!(errors.is_empty(), "{errors:?}");
    let friendship = friendship.unwrap();

    let ring = alice.keyrings().create("chat", "main", "alice").unwrap();
    let (conv, _) = alice.conversations().create(&ring, "room").unwrap();
    alice.invites().invite(&ring, &friendship.id(), &conv.to_string()).await.unwrap();

    env.advance(Duration::from_secs(61));
    assert_eq!(board.posts_by("bob").len(), 3);

    let (verdicts, report) = alice.maintenance().validate_once().await.unwrap();
    assert_eq!(verdicts.get("bob"), Some(&KeyStatus::Stale));
    assert_eq!(report, CascadeReport { keys_invalidated: 1, friendships_deleted: 1 });

    assert_eq!(alice.kap.is_friend("bob").unwrap(), None);
    assert!(alice.directory.cached("bob").unwrap().is_none());
    let key = alice.conversations().key(&ring, &conv.to_string()).unwrap();
    assert!(key.invalid().contains("bob"));
}

#[tokio::test]
async fn regenerating_own_identity_drops_friendships() {
    let w = world(28).await;
    befriend(&w).await;

    let (fresh, report) = w.alice.vault().regenerate("alice").unwrap();
    assert_eq!(report.friendships_deleted, 1);
    assert!(w.alice.vault().load("alice").unwrap().public().same_key(&fresh.public()));
    assert_eq!(w.alice.kap.is_friend("bob").unwrap(), None);
}

#[tokio::test]
async fn tick_runs_due_jobs_once_per_period() {
    let w = world(29).await;
    let maintenance = w.alice.maintenance();
    let mut schedule = Schedule::default();

    w.board.erase("alice");
    maintenance.tick(&mut schedule).await;
    assert_eq!(w.board.posts_by("alice").len(), 3);

    // Not due again yet: an erased board stays empty.
    w.board.erase("alice");
    w.env.advance(Duration::from_secs(60));
    maintenance.tick(&mut schedule).await;
    assert!(w.board.posts_by("alice").is_empty());

    w.env.advance(CoreConfig::default().distribute_period);
    maintenance.tick(&mut schedule).await;
    assert_eq!(w.board.posts_by("alice").len(), 3);
}
