//! Deterministic environment for unit tests.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::env::Environment;

#[derive(Default)]
struct TestState {
    elapsed: Duration,
    counter: u64,
}

/// Manually advanced clock and a splitmix64 byte stream.
#[derive(Clone, Default)]
pub(crate) struct TestEnv {
    state: Arc<Mutex<TestState>>,
}

/// Wall clock at `elapsed == 0`.
pub(crate) const EPOCH_MS: u64 = 1_700_000_000_000;

impl TestEnv {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn advance(&self, by: Duration) {
        self.state.lock().unwrap().elapsed += by;
    }
}

impl Environment for TestEnv {
    type Instant = Duration;

    fn now(&self) -> Duration {
        self.state.lock().unwrap().elapsed
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        let mut state = self.state.lock().unwrap();
        for chunk in buffer.chunks_mut(8) {
            state.counter = state.counter.wrapping_add(0x9e37_79b9_7f4a_7c15);
            let mut z = state.counter;
            z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
            z ^= z >> 31;
            chunk.copy_from_slice(&z.to_le_bytes()[..chunk.len()]);
        }
    }

    fn wall_clock_ms(&self) -> u64 {
        EPOCH_MS + self.now().as_millis() as u64
    }
}
