//! Turmoil-based Environment implementation for deterministic testing.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Instant,
};

use fast_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Wall-clock time the simulation starts at (2023-11-14T22:13:20Z)
pub const SIM_EPOCH_MILLIS: i64 = 1_700_000_000_000;

/// Simulation environment using Turmoil's virtual time and seeded RNG.
///
/// - **Virtual Time**: `now()` follows Turmoil's simulated clock, and
///   `unix_millis()` is [`SIM_EPOCH_MILLIS`] plus the simulated elapsed
///   time.
/// - **Seeded RNG**: `random_bytes()` draws from a `ChaCha20Rng`, so the
///   same seed yields the same session ids on every run.
///
/// Clones share one RNG stream.
#[derive(Clone)]
pub struct SimEnv {
    rng: Arc<Mutex<ChaCha20Rng>>,
}

impl SimEnv {
    /// Environment seeded with 0
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment with a specific seed
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))) }
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn unix_millis(&self) -> i64 {
        let elapsed = turmoil::sim_elapsed().unwrap_or_default();
        SIM_EPOCH_MILLIS + elapsed.as_millis() as i64
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn virtual_clock_drives_both_clocks() {
        let mut sim = turmoil::Builder::new().build();

        sim.client("test", async {
            let env = SimEnv::new();
            let start = env.now();
            let start_millis = env.unix_millis();

            tokio::time::sleep(Duration::from_secs(5)).await;

            assert_eq!(env.now() - start, Duration::from_secs(5));
            assert_eq!(env.unix_millis() - start_millis, 5_000);
            Ok(())
        });

        sim.run().unwrap();
    }

    #[test]
    fn same_seed_same_bytes() {
        let draw = |seed: u64| {
            let mut bytes = [0u8; 32];
            SimEnv::with_seed(seed).random_bytes(&mut bytes);
            bytes
        };

        assert_eq!(draw(12345), draw(12345));
        assert_ne!(draw(12345), draw(54321));
    }

    #[test]
    fn clones_share_the_rng_stream() {
        let first = SimEnv::with_seed(999);
        let second = first.clone();

        assert_ne!(first.random_u32(), second.random_u32());
    }
}
