//! Deterministic simulation harness for Waxwing protocol testing.
//!
//! In-memory implementations of the collaborator traits (environment,
//! transport, bulletin board, consent) so that whole key agreement and
//! directory scenarios run reproducibly in one process:
//!
//! - [`SimEnv`]: seeded ChaCha RNG and a manually advanced clock
//! - [`SimNetwork`]: loopback message queue with tamper and failure hooks
//! - [`MemoryBoard`]: shared bulletin board with per-account handles
//! - [`ScriptedConsent`]: answers prompts from a script
//! - [`SimPeer`]: one principal wired to all of the above

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod consent;
pub mod memory_board;
pub mod peer;
pub mod sim_env;
pub mod sim_network;

pub use consent::ScriptedConsent;
pub use memory_board::MemoryBoard;
pub use peer::{SimDirectory, SimKap, SimPeer, run_until_idle};
pub use sim_env::SimEnv;
pub use sim_network::{LoopbackTransport, SimNetwork};
