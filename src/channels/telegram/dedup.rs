//! Telegram update deduplication

use std::collections::{HashSet, VecDeque};

/// How many recent update keys are remembered
const DEDUP_WINDOW: usize = 2000;

/// Remembers recently seen update keys
///
/// A retried getUpdates call can hand back updates that were already
/// forwarded. The window is bounded; the oldest key is forgotten first.
#[derive(Debug)]
pub struct UpdateDedup {
    seen: HashSet<String>,
    order: VecDeque<String>,
    window: usize,
}

impl Default for UpdateDedup {
    fn default() -> Self {
        Self::with_window(DEDUP_WINDOW)
    }
}

impl UpdateDedup {
    /// Create with a custom window size
    #[must_use]
    pub fn with_window(window: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(window),
            order: VecDeque::with_capacity(window),
            window: window.max(1),
        }
    }

    /// Returns `true` if `key` was already seen; records it otherwise
    pub fn is_duplicate(&mut self, key: &str) -> bool {
        if self.seen.contains(key) {
            return true;
        }

        if self.order.len() >= self.window
            && let Some(oldest) = self.order.pop_front()
        {
            self.seen.remove(&oldest);
        }

        self.seen.insert(key.to_string());
        self.order.push_back(key.to_string());
        false
    }
}
