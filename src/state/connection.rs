//! Realtime connection lifecycle: state machine and reconnect backoff.

use std::time::Duration;

/// Phases the realtime connection can be in.
///
/// The only legal cycle is `Disconnected → Connecting → Connected →
/// Disconnected`; a failed connect falls straight back to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and no connect attempt in flight.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// The channel is established and dispatching messages.
    Connected,
}

/// Hard cap on consecutive reconnect attempts before giving up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;
/// Ceiling applied to the exponential reconnect delay.
const MAX_RECONNECT_DELAY_SECS: u64 = 30;

/// Exponential reconnect backoff with a hard attempt cap.
///
/// Attempt `n` waits `min(30, 2^n)` seconds. Reaching [`ConnectionState::Connected`]
/// must reset the counter so a later outage starts the sequence over.
#[derive(Debug)]
pub struct Backoff {
    attempts: u32,
    max_attempts: u32,
}

impl Backoff {
    /// Create a backoff that abandons reconnection after `max_attempts` tries.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts,
        }
    }

    /// Register the next attempt and return how long to wait before it.
    ///
    /// Returns `None` once the cap is reached; no further attempt may be
    /// scheduled for this connection lifetime.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        let exponential = 2u64.saturating_pow(self.attempts);
        Some(Duration::from_secs(exponential.min(MAX_RECONNECT_DELAY_SECS)))
    }

    /// Reset the attempt counter after a successful connection.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Number of attempts consumed so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_sequence_is_capped_exponential() {
        let mut backoff = Backoff::new(MAX_RECONNECT_ATTEMPTS);
        let expected = [2, 4, 8, 16, 30, 30, 30, 30, 30, 30];
        for (attempt, secs) in expected.iter().enumerate() {
            let delay = backoff.next_delay().unwrap();
            assert_eq!(delay, Duration::from_secs(*secs), "attempt {}", attempt + 1);
        }
    }

    #[test]
    fn no_eleventh_attempt_is_scheduled() {
        let mut backoff = Backoff::new(MAX_RECONNECT_ATTEMPTS);
        for _ in 0..MAX_RECONNECT_ATTEMPTS {
            assert!(backoff.next_delay().is_some());
        }
        assert!(backoff.next_delay().is_none());
        assert!(backoff.next_delay().is_none());
    }

    #[test]
    fn reset_restarts_the_sequence() {
        let mut backoff = Backoff::new(MAX_RECONNECT_ATTEMPTS);
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempts(), 2);

        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(2)));
    }
}
