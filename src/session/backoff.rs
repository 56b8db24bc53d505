use rand::Rng;
use std::time::Duration;

/// Capped linear backoff: attempt `n` waits `min(cap, base * n)` ms, plus
/// an optional random jitter.
#[derive(Debug)]
pub struct Backoff {
    base_ms: u64,
    cap_ms: u64,
    jitter_ms: u64,
    attempt: u64,
}

impl Backoff {
    #[must_use]
    pub const fn new(base_ms: u64, cap_ms: u64) -> Self {
        Self {
            base_ms,
            cap_ms,
            jitter_ms: 0,
            attempt: 0,
        }
    }

    #[must_use]
    pub const fn with_jitter(base_ms: u64, cap_ms: u64, jitter_ms: u64) -> Self {
        Self {
            base_ms,
            cap_ms,
            jitter_ms,
            attempt: 0,
        }
    }

    /// Attempts counted so far.
    #[must_use]
    pub const fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Delay before the next attempt, advancing the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt += 1;

        let mut delay = self.cap_ms.min(self.base_ms.saturating_mul(self.attempt));

        if self.jitter_ms > 0 {
            delay += rand::thread_rng().gen_range(0..self.jitter_ms);
        }

        Duration::from_millis(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capped_sequence() {
        let mut backoff = Backoff::new(100, 5_000);

        let delays: Vec<u64> = (0..60).map(|_| backoff.next_delay().as_millis() as u64).collect();

        assert_eq!(delays[0], 100);
        assert_eq!(delays[1], 200);
        assert_eq!(delays[48], 4_900);
        assert_eq!(delays[49], 5_000);
        assert_eq!(delays[59], 5_000);

        // non-decreasing
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(backoff.attempt(), 60);
    }

    #[test]
    fn test_jitter_bounds() {
        let mut backoff = Backoff::with_jitter(300, 5_000, 250);

        for n in 1..=20u64 {
            let delay = backoff.next_delay().as_millis() as u64;
            let base = 5_000.min(300 * n);
            assert!(delay >= base);
            assert!(delay < base + 250);
        }
    }
}
