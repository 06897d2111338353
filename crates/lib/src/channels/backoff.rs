//! Bounded exponential reconnect backoff with jitter, shared by both
//! session connectors.

use std::time::Duration;

const BASE: Duration = Duration::from_secs(1);
const CAP: Duration = Duration::from_secs(60);

/// Reconnect delay state for one session loop. Reset after a successful
/// connect so transient blips recover quickly.
pub struct Backoff {
    delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

impl Backoff {
    pub fn new() -> Self {
        Self { delay: BASE }
    }

    pub fn reset(&mut self) {
        self.delay = BASE;
    }

    /// Current delay plus up to 25% jitter; doubles for next time, capped.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delay;
        self.delay = (self.delay * 2).min(CAP);
        delay + jitter(delay / 4)
    }
}

fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    let mut buf = [0u8; 8];
    if getrandom::getrandom(&mut buf).is_err() {
        return Duration::ZERO;
    }
    Duration::from_millis(u64::from_le_bytes(buf) % max_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_and_stay_bounded() {
        let mut backoff = Backoff::new();
        let mut previous = Duration::ZERO;
        for _ in 0..10 {
            let delay = backoff.next_delay();
            assert!(delay >= previous.min(CAP));
            assert!(delay <= CAP + CAP / 4);
            previous = delay;
        }
    }

    #[test]
    fn reset_returns_to_base() {
        let mut backoff = Backoff::new();
        for _ in 0..5 {
            backoff.next_delay();
        }
        backoff.reset();
        assert!(backoff.next_delay() < BASE * 2);
    }
}
