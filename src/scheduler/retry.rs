//! Keyed retry timers
//!
//! At most one live timer per retry key. A finished timer no longer counts
//! as pending, so a key frees up as soon as its retry has fired.

use std::collections::HashMap;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub(crate) struct RetryTimers {
    timers: HashMap<String, JoinHandle<()>>,
}

impl RetryTimers {
    /// Whether a live timer exists for `key`
    pub(crate) fn is_pending(&self, key: &str) -> bool {
        self.timers
            .get(key)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Track a timer for `key`, replacing a finished one
    pub(crate) fn arm(&mut self, key: String, handle: JoinHandle<()>) {
        debug_assert!(!self.is_pending(&key), "retry timer already pending for {key}");
        if let Some(previous) = self.timers.insert(key, handle) {
            previous.abort();
        }
    }

    /// Forget the timer for `key` without cancelling it
    pub(crate) fn release(&mut self, key: &str) {
        self.timers.remove(key);
    }

    /// Cancel every timer, returning how many were still pending
    pub(crate) fn clear_all(&mut self) -> usize {
        let mut cancelled = 0;
        for (_, handle) in self.timers.drain() {
            if !handle.is_finished() {
                cancelled += 1;
            }
            handle.abort();
        }
        cancelled
    }

    pub(crate) fn pending(&self) -> usize {
        self.timers.values().filter(|h| !h.is_finished()).count()
    }

    pub(crate) fn pending_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .timers
            .iter()
            .filter(|(_, h)| !h.is_finished())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_pending_tracks_live_timers() {
        let mut timers = RetryTimers::default();
        timers.arm(
            "deployments".to_string(),
            tokio::spawn(tokio::time::sleep(Duration::from_secs(30))),
        );
        timers.arm(
            "devices".to_string(),
            tokio::spawn(tokio::time::sleep(Duration::from_secs(1))),
        );
        assert!(timers.is_pending("deployments"));
        assert_eq!(timers.pending(), 2);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!timers.is_pending("devices"));
        assert_eq!(timers.pending_keys(), vec!["deployments".to_string()]);

        assert_eq!(timers.clear_all(), 1);
        assert_eq!(timers.pending(), 0);
        assert_eq!(timers.clear_all(), 0);
    }
}
