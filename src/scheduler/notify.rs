//! User-facing failure notices
//!
//! The scheduler reports failures through [`Notifier`]; how they are shown
//! is up to the caller. [`LogNotifier`] writes them to the log and
//! [`NoticeBoard`] keeps the current notice for a view to render, the way a
//! snackbar would.

use std::sync::{Mutex, PoisonError};

/// Receives failure notices. Fire-and-forget.
pub trait Notifier: Send + Sync {
    /// Show `message`; a retry is expected after `suggested_delay_ms`
    fn notify(&self, message: &str, suggested_delay_ms: u64);

    /// Dismiss whatever notice is showing
    fn clear(&self) {}
}

/// Writes notices through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str, suggested_delay_ms: u64) {
        tracing::warn!(retry_in_ms = suggested_delay_ms, "{}", message);
    }
}

/// A notice as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub retry_in_ms: u64,
}

#[derive(Debug, Default)]
struct BoardState {
    current: Option<Notice>,
    shown: usize,
}

/// Holds the notice currently on screen
#[derive(Debug, Default)]
pub struct NoticeBoard {
    state: Mutex<BoardState>,
}

impl NoticeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notice currently showing, if any
    pub fn current(&self) -> Option<Notice> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .clone()
    }

    /// How many notices have been shown in total
    pub fn shown(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).shown
    }
}

impl Notifier for NoticeBoard {
    fn notify(&self, message: &str, suggested_delay_ms: u64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.current = Some(Notice {
            message: message.to_string(),
            retry_in_ms: suggested_delay_ms,
        });
        state.shown += 1;
    }

    fn clear(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_board() {
        let board = NoticeBoard::new();
        assert!(board.current().is_none());

        board.notify("Couldn't load deployments.", 30_000);
        board.notify("Couldn't load devices.", 5_000);
        assert_eq!(
            board.current(),
            Some(Notice {
                message: "Couldn't load devices.".to_string(),
                retry_in_ms: 5_000,
            })
        );

        board.clear();
        assert!(board.current().is_none());
        assert_eq!(board.shown(), 2);
    }
}
