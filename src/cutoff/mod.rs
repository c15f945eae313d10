//! Session Cutoff
//!
//! Decides which finished deployments count as "new since last visit". The
//! cutoff is the moment the previous session started; it is read once per
//! session and then pinned in the session store so every view in the same
//! session agrees on it.

use crate::store::{read_json, write_json, KeyValueStore};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Durable key holding the last-checked timestamp
pub const DEFAULT_CUTOFF_KEY: &str = "deploymentChecker";

/// Session key marking that this session already advanced the cutoff
pub const DEFAULT_SESSION_KEY: &str = "sessionDeploymentChecker";

/// Value stored under the session key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMarker {
    /// When this session first established its cutoff
    pub started_at: DateTime<Utc>,
    /// Cutoff handed out for the rest of the session
    pub cutoff: DateTime<Utc>,
}

/// Establishes the per-session "last checked" cutoff
pub struct CutoffEstablisher {
    durable: Arc<dyn KeyValueStore>,
    session: Arc<dyn KeyValueStore>,
    durable_key: String,
    session_key: String,
    max_session_age: Option<Duration>,
}

impl CutoffEstablisher {
    pub fn new(durable: Arc<dyn KeyValueStore>, session: Arc<dyn KeyValueStore>) -> Self {
        Self {
            durable,
            session,
            durable_key: DEFAULT_CUTOFF_KEY.to_string(),
            session_key: DEFAULT_SESSION_KEY.to_string(),
            max_session_age: None,
        }
    }

    /// Override the storage keys
    pub fn keys(mut self, durable_key: impl Into<String>, session_key: impl Into<String>) -> Self {
        self.durable_key = durable_key.into();
        self.session_key = session_key.into();
        self
    }

    /// Treat sessions older than `age` as finished, so long-lived processes
    /// still advance the durable cutoff periodically.
    pub fn max_session_age(mut self, age: Option<Duration>) -> Self {
        self.max_session_age = age;
        self
    }

    /// Return the cutoff for the current session.
    ///
    /// The first call of a session returns the durable record (or `now` if
    /// there is none or it is unreadable) and moves the durable record to
    /// `now`. Later calls in the same session return the same value.
    pub fn establish_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        if let Some(marker) = self.current_session(now) {
            return marker.cutoff;
        }

        let cutoff = match read_json::<DateTime<Utc>>(self.durable.as_ref(), &self.durable_key) {
            Ok(Some(last_check)) => last_check,
            Ok(None) => now,
            Err(e) => {
                tracing::warn!(key = %self.durable_key, error = %e, "Ignoring unreadable cutoff");
                now
            }
        };

        if let Err(e) = write_json(self.durable.as_ref(), &self.durable_key, &now) {
            tracing::warn!(key = %self.durable_key, error = %e, "Failed to persist cutoff");
        }
        let marker = SessionMarker {
            started_at: now,
            cutoff,
        };
        if let Err(e) = write_json(self.session.as_ref(), &self.session_key, &marker) {
            tracing::warn!(key = %self.session_key, error = %e, "Failed to write session marker");
        }

        tracing::debug!(%cutoff, "Established session cutoff");
        cutoff
    }

    fn current_session(&self, now: DateTime<Utc>) -> Option<SessionMarker> {
        let marker = match read_json::<SessionMarker>(self.session.as_ref(), &self.session_key) {
            Ok(marker) => marker?,
            Err(e) => {
                tracing::warn!(key = %self.session_key, error = %e, "Ignoring unreadable session marker");
                return None;
            }
        };

        match self.max_session_age {
            Some(age) if now - marker.started_at >= age => {
                tracing::debug!(started_at = %marker.started_at, "Session marker expired");
                None
            }
            _ => Some(marker),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 2, h, m, 0).unwrap()
    }

    #[test]
    fn test_first_ever_session_uses_now() {
        let durable = Arc::new(MemoryStore::new());
        let establisher = CutoffEstablisher::new(durable.clone(), Arc::new(MemoryStore::new()));

        assert_eq!(establisher.establish_cutoff(at(9, 0)), at(9, 0));
        let stored: Option<DateTime<Utc>> = read_json(&*durable, DEFAULT_CUTOFF_KEY).unwrap();
        assert_eq!(stored, Some(at(9, 0)));
    }

    #[test]
    fn test_stable_within_session() {
        let durable = Arc::new(MemoryStore::new());
        write_json(&*durable, DEFAULT_CUTOFF_KEY, &at(7, 0)).unwrap();
        let establisher = CutoffEstablisher::new(durable.clone(), Arc::new(MemoryStore::new()));

        assert_eq!(establisher.establish_cutoff(at(9, 0)), at(7, 0));
        assert_eq!(establisher.establish_cutoff(at(9, 30)), at(7, 0));
        assert_eq!(establisher.establish_cutoff(at(11, 0)), at(7, 0));

        let stored: Option<DateTime<Utc>> = read_json(&*durable, DEFAULT_CUTOFF_KEY).unwrap();
        assert_eq!(stored, Some(at(9, 0)));
    }

    #[test]
    fn test_new_session_advances_once() {
        let durable: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

        let first = CutoffEstablisher::new(durable.clone(), Arc::new(MemoryStore::new()));
        assert_eq!(first.establish_cutoff(at(8, 0)), at(8, 0));

        let second = CutoffEstablisher::new(durable.clone(), Arc::new(MemoryStore::new()));
        assert_eq!(second.establish_cutoff(at(10, 0)), at(8, 0));
        assert_eq!(second.establish_cutoff(at(12, 0)), at(8, 0));

        let third = CutoffEstablisher::new(durable, Arc::new(MemoryStore::new()));
        assert_eq!(third.establish_cutoff(at(14, 0)), at(10, 0));
    }

    #[test]
    fn test_corrupt_durable_record_falls_back_to_now() {
        let durable = Arc::new(MemoryStore::new());
        durable.set(DEFAULT_CUTOFF_KEY, "\"yesterday-ish\"").unwrap();
        let establisher = CutoffEstablisher::new(durable, Arc::new(MemoryStore::new()));

        assert_eq!(establisher.establish_cutoff(at(9, 15)), at(9, 15));
    }

    #[test]
    fn test_expired_session_re_advances() {
        let durable: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let establisher = CutoffEstablisher::new(durable, Arc::new(MemoryStore::new()))
            .max_session_age(Some(Duration::hours(2)));

        assert_eq!(establisher.establish_cutoff(at(8, 0)), at(8, 0));
        assert_eq!(establisher.establish_cutoff(at(9, 59)), at(8, 0));
        assert_eq!(establisher.establish_cutoff(at(10, 0)), at(8, 0));
        // The 10:00 call started a new session, so durable now holds 10:00
        assert_eq!(establisher.establish_cutoff(at(12, 30)), at(10, 0));
    }

    #[test]
    fn test_custom_keys() {
        let durable = Arc::new(MemoryStore::new());
        let establisher = CutoffEstablisher::new(durable.clone(), Arc::new(MemoryStore::new()))
            .keys("lastCheck", "sessionLastCheck");

        establisher.establish_cutoff(at(6, 0));
        assert!(durable.get("lastCheck").unwrap().is_some());
        assert!(durable.get(DEFAULT_CUTOFF_KEY).unwrap().is_none());
    }
}
