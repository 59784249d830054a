//! Seeded simulation environment.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use waxwing_core::Environment;

/// Wall clock at simulation start (2023-11-14T22:13:20Z).
pub const SIM_EPOCH_MS: u64 = 1_700_000_000_000;

struct SimState {
    rng: ChaCha20Rng,
    elapsed: Duration,
}

/// Deterministic environment: seeded RNG, virtual time.
///
/// Clones share the clock and the RNG stream. `sleep` advances the clock
/// instead of waiting.
#[derive(Clone)]
pub struct SimEnv {
    state: Arc<Mutex<SimState>>,
}

impl SimEnv {
    /// Environment whose randomness is fully determined by `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                rng: ChaCha20Rng::seed_from_u64(seed),
                elapsed: Duration::ZERO,
            })),
        }
    }

    /// Advance virtual time.
    pub fn advance(&self, by: Duration) {
        self.lock().elapsed += by;
    }

    /// Virtual time since start.
    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().expect("Mutex poisoned")
    }
}

impl Environment for SimEnv {
    type Instant = Duration;

    fn now(&self) -> Duration {
        self.elapsed()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        tokio::task::yield_now()
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.lock().rng.fill_bytes(buffer);
    }

    fn wall_clock_ms(&self) -> u64 {
        SIM_EPOCH_MS + self.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_bytes() {
        let a = SimEnv::with_seed(7);
        let b = SimEnv::with_seed(7);
        assert_eq!(a.random_array::<32>(), b.random_array::<32>());
        assert_ne!(a.random_array::<32>(), SimEnv::with_seed(8).random_array::<32>());
    }

    #[test]
    fn clones_share_clock() {
        let env = SimEnv::with_seed(1);
        let clone = env.clone();
        clone.advance(Duration::from_secs(5));
        assert_eq!(env.now(), Duration::from_secs(5));
        assert_eq!(env.wall_clock_ms(), SIM_EPOCH_MS + 5_000);
    }
}
