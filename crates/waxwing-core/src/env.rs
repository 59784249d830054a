//! Environment abstraction for deterministic testing.
//!
//! Decouples protocol logic from system resources (time, randomness). The
//! simulation harness supplies a seeded RNG and a manually advanced clock;
//! production uses the OS RNG and real time.

use std::time::Duration;

/// Abstract environment providing time, randomness, and async primitives.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - `wall_clock_ms()` is Unix time in milliseconds
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant type.
    ///
    /// Production environments use `std::time::Instant`, simulations use
    /// virtual time.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code (periodic maintenance) sleeps; protocol logic never
    /// does.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Unix time in milliseconds. Used for publication timestamps and
    /// staleness, never for ordering.
    fn wall_clock_ms(&self) -> u64;

    /// Fixed-size random array.
    fn random_array<const N: usize>(&self) -> [u8; N] {
        let mut bytes = [0u8; N];
        self.random_bytes(&mut bytes);
        bytes
    }

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        u64::from_be_bytes(self.random_array())
    }

    /// Random protocol nonce: 16 bytes, lowercase hex.
    fn random_nonce(&self) -> String {
        hex::encode(self.random_array::<16>())
    }
}
