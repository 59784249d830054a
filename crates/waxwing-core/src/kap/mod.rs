//! Key agreement protocol.
//!
//! Four messages establish a [`Friendship`](waxwing_crypto::Friendship)
//! between two principals:
//!
//! ```text
//! A → B  MSG1  {AFID}        payload = sha256(cA)            (commit)
//! B → A  MSG2  {AFID, BFID}  payload = encap(A, cB), signed by B
//! A → B  MSG3  {AFID, BFID}  payload = encap(B, cA), signed by A
//! B → A  MSG4  {AFID, BFID}  hmac(fMac)                       (confirm)
//! ```
//!
//! Both sides compute `master = cA XOR cB` and derive `fMac`/`fEnc` from
//! it. B checks `sha256(cA)` against the MSG1 commitment before accepting.
//! Any failed check ends the session; a retry starts over from MSG1 with
//! fresh nonces.
//!
//! [`KapEngine`] is the pure state machine; [`KapService`] drives it over a
//! [`Transport`].

mod engine;
mod service;
mod session;

pub use engine::{KapAction, KapEngine};
pub use service::{KapService, Transport};
pub use session::{KapRole, KapSession, KapState};
