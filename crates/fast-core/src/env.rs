//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples protocol logic from system resources
//! (clocks and randomness). Production uses the real clock and OS entropy;
//! the simulation harness uses turmoil's virtual clock and a seeded RNG, so
//! a failing run can be replayed from its seed.
//!
//! # Invariants
//!
//! - Monotonicity: `now()` never goes backwards
//! - Determinism: given the same seed, `random_bytes()` produces the same
//!   sequence
//! - Isolation: implementations do not share global state

use std::time::Instant;

/// Abstract environment providing time and randomness.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic time, used for handshake deadlines.
    fn now(&self) -> Instant;

    /// Wall-clock milliseconds since the Unix epoch, used to stamp packets.
    fn unix_millis(&self) -> i64;

    /// Fills the provided buffer with random bytes.
    ///
    /// Production implementations use OS entropy; simulation
    /// implementations use a seeded RNG.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u32`.
    fn random_u32(&self) -> u32 {
        let mut bytes = [0u8; 4];
        self.random_bytes(&mut bytes);
        u32::from_be_bytes(bytes)
    }
}
