//! Production environment: tokio clock, system wall clock, OS entropy.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use fast_core::Environment;

/// Environment backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    fn now(&self) -> Instant {
        // tokio clock: follows paused time in tests
        tokio::time::Instant::now().into_std()
    }

    fn unix_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis() as i64)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        // Session ids degrade to zeros without OS entropy
        if let Err(err) = getrandom::fill(buffer) {
            tracing::error!(%err, "OS random source unavailable");
            buffer.fill(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wall_clock_is_after_2020() {
        assert!(SystemEnv.unix_millis() > 1_577_836_800_000);
    }

    #[test]
    fn random_bytes_vary() {
        let mut first = [0u8; 16];
        let mut second = [0u8; 16];
        SystemEnv.random_bytes(&mut first);
        SystemEnv.random_bytes(&mut second);
        assert_ne!(first, second);
    }
}
