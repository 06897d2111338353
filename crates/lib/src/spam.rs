//! Decaying-counter rate limiter for auto-responses to unmapped
//! conversations.
//!
//! Each conversation gets a counter that starts at 10 and is decremented
//! per message; the canned notice fires when the counter is freshly
//! created or wraps back to 10, so senders see at most one notice per run
//! of ten messages. Counters are never evicted; the map grows with the
//! number of distinct unmapped conversations.

use std::collections::HashMap;
use tokio::sync::Mutex;

const WINDOW: i32 = 10;

/// Per-conversation spam counters behind one lock. Safe to call from both
/// session paths concurrently.
pub struct SpamLimiter {
    counters: Mutex<HashMap<String, i32>>,
}

impl Default for SpamLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl SpamLimiter {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Record one unmapped message from the conversation and report whether
    /// the auto-response should be sent for it.
    pub async fn should_notify(&self, conversation_id: &str) -> bool {
        let mut counters = self.counters.lock().await;
        let remaining = match counters.get_mut(conversation_id) {
            Some(remaining) => {
                *remaining -= 1;
                if *remaining <= 0 {
                    *remaining = WINDOW;
                }
                *remaining
            }
            None => {
                counters.insert(conversation_id.to_string(), WINDOW);
                WINDOW
            }
        };
        remaining == WINDOW
    }
}
