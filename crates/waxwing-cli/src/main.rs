//! Waxwing operator tool.
//!
//! # Usage
//!
//! ```bash
//! # Create an identity in the local key database
//! waxwing --db keys.redb keygen alice
//!
//! # Print the three bulletin board posts that publish it
//! waxwing --db keys.redb publish-text alice --platform-id 12345
//!
//! # Run key agreement between two in-memory principals
//! waxwing kap-demo --seed 7
//! ```

mod system_env;
mod text_board;

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{Parser, Subcommand};
use system_env::SystemEnv;
use text_board::TextBoard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use waxwing_core::{
    CoreConfig, Environment, IdentityVault, KeyStore, PublicKeyDirectory, RedbStorage, Storage,
};
use waxwing_harness::{MemoryBoard, SimEnv, SimNetwork, SimPeer, run_until_idle};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Waxwing identity and key agreement tool
#[derive(Parser, Debug)]
#[command(name = "waxwing")]
#[command(about = "Manage Waxwing identities and run key agreement")]
#[command(version)]
struct Args {
    /// Path to the key database
    #[arg(long, default_value = "waxwing.redb", global = true)]
    db: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an identity for a principal
    Keygen {
        /// Principal name
        user: String,
    },

    /// Print the bulletin board posts publishing a principal's identity
    PublishText {
        /// Principal name, also the board username
        user: String,

        /// Stable id of the board account
        #[arg(long)]
        platform_id: String,
    },

    /// List stored record names
    List {
        /// Only names starting with this prefix
        #[arg(long, default_value = "")]
        prefix: String,
    },

    /// Run key agreement between two in-memory principals
    KapDemo {
        /// Simulation seed; random when omitted
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    let mut out = io::stdout();
    match args.command {
        Command::Keygen { user } => {
            let vault = IdentityVault::new(open_store(&args.db)?);
            let identity = vault.create(&user)?;
            writeln!(out, "{}", identity.public().to_wire())?;
        },
        Command::PublishText { user, platform_id } => {
            let store = open_store(&args.db)?;
            let identity = IdentityVault::new(store.clone()).load(&user)?;
            let board = Arc::new(TextBoard::new(&user, &platform_id));
            PublicKeyDirectory::new(store, Arc::clone(&board)).publish(&user, &identity).await?;
            for post in board.posts() {
                writeln!(out, "{post}")?;
            }
        },
        Command::List { prefix } => {
            for name in RedbStorage::open(&args.db)?.list_names(&prefix)? {
                writeln!(out, "{name}")?;
            }
        },
        Command::KapDemo { seed } => {
            let seed = seed.unwrap_or_else(|| SystemEnv::new().random_u64());
            tracing::info!(seed, "running key agreement demo");
            kap_demo(seed, &mut out).await?;
        },
    }
    Ok(())
}

fn open_store(path: &Path) -> Result<KeyStore<RedbStorage, SystemEnv>> {
    let storage = RedbStorage::open(path)?;
    Ok(KeyStore::new(storage, SystemEnv::new(), CoreConfig::default()))
}

async fn kap_demo(seed: u64, out: &mut impl Write) -> Result<()> {
    let env = SimEnv::with_seed(seed);
    let board = MemoryBoard::new();
    let network = SimNetwork::new();
    let alice = SimPeer::join("alice", &env, &board, &network).await?;
    let bob = SimPeer::join("bob", &env, &board, &network).await?;

    let peers = [&alice, &bob];
    let (friendship, errors) = tokio::join!(
        alice.kap.request_friendship("bob"),
        run_until_idle(&network, &peers),
    );
    for err in errors {
        tracing::warn!(error = %err, "delivery failed");
    }
    let friendship = friendship?;

    for msg in network.transcript() {
        writeln!(out, "{} {} -> {}", msg.kind.as_str(), msg.hdr.from, msg.hdr.to)?;
    }
    writeln!(out, "friendship {}", friendship.id())?;
    writeln!(out, "master key sha256 {}", friendship.master_key().sha256())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use waxwing_core::MemoryStorage;

    use super::*;

    #[tokio::test]
    async fn kap_demo_prints_transcript_and_friendship() {
        let mut buf = Vec::new();
        kap_demo(3, &mut buf).await.unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[..4],
            ["MSG1 alice -> bob", "MSG2 bob -> alice", "MSG3 alice -> bob", "MSG4 bob -> alice"]
        );
        assert!(lines[4].starts_with("friendship "));
        assert!(lines[5].starts_with("master key sha256 "));
    }

    #[tokio::test]
    async fn publication_renders_three_posts() {
        let store = KeyStore::new(MemoryStorage::new(), SystemEnv::new(), CoreConfig::default());
        let identity = IdentityVault::new(store.clone()).create("alice").unwrap();
        let board = Arc::new(TextBoard::new("alice", "42"));

        PublicKeyDirectory::new(store, Arc::clone(&board)).publish("alice", &identity).await.unwrap();

        let posts = board.posts();
        assert_eq!(posts.len(), 3);
        assert!(posts.iter().any(|post| post.starts_with("#encryptkey ")));
        assert!(posts.iter().any(|post| post.starts_with("#signkey ")));
        assert!(posts.iter().any(|post| post.starts_with("#keysig ")));
    }
}
