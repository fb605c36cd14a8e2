use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;

use crate::models::now_ms;

/// Oldest entries are evicted beyond this.
pub const SYNC_LOG_CAP: usize = 30;

#[derive(Debug, Clone, Serialize)]
pub struct SyncLogEntry {
    pub ok: bool,
    pub conflicts: Vec<String>,
    pub timestamp: i64,
    pub detail: Value,
}

/// Bounded history of sync attempts. The engine appends; everything else
/// only reads.
#[derive(Clone, Default)]
pub struct SyncLog {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    entries: VecDeque<SyncLogEntry>,
    last_success: Option<i64>,
    last_failure: Option<i64>,
}

impl SyncLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, ok: bool, conflicts: Vec<String>, detail: Value) {
        let entry = SyncLogEntry {
            ok,
            conflicts,
            timestamp: now_ms(),
            detail,
        };
        let mut inner = self.inner.lock().unwrap();
        if ok {
            inner.last_success = Some(entry.timestamp);
        } else {
            inner.last_failure = Some(entry.timestamp);
        }
        inner.entries.push_back(entry);
        while inner.entries.len() > SYNC_LOG_CAP {
            inner.entries.pop_front();
        }
    }

    pub fn last_success(&self) -> Option<i64> {
        self.inner.lock().unwrap().last_success
    }

    pub fn last_failure(&self) -> Option<i64> {
        self.inner.lock().unwrap().last_failure
    }

    /// Most recent attempt of either kind.
    pub fn last_attempt(&self) -> Option<i64> {
        let inner = self.inner.lock().unwrap();
        inner.last_success.max(inner.last_failure)
    }

    /// Snapshot, newest first.
    pub fn entries(&self) -> Vec<SyncLogEntry> {
        let inner = self.inner.lock().unwrap();
        inner.entries.iter().rev().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn caps_at_thirty_keeping_newest() {
        let log = SyncLog::new();
        for i in 0..35 {
            log.record(true, Vec::new(), json!({ "attempt": i }));
        }
        let entries = log.entries();
        assert_eq!(entries.len(), SYNC_LOG_CAP);
        // Newest first; the five oldest attempts were evicted.
        assert_eq!(entries[0].detail["attempt"], 34);
        assert_eq!(entries.last().unwrap().detail["attempt"], 5);
    }

    #[test]
    fn tracks_last_success_and_failure() {
        let log = SyncLog::new();
        assert!(log.last_success().is_none());
        assert!(log.last_failure().is_none());
        assert!(log.last_attempt().is_none());

        log.record(true, Vec::new(), Value::Null);
        assert!(log.last_success().is_some());
        assert!(log.last_failure().is_none());

        log.record(false, Vec::new(), json!({ "error": "boom" }));
        assert!(log.last_failure().is_some());
        assert_eq!(log.last_attempt(), log.last_failure());
    }

    #[test]
    fn keeps_conflict_ids_with_the_entry() {
        let log = SyncLog::new();
        log.record(true, vec!["a".into(), "b".into()], Value::Null);
        let entries = log.entries();
        assert_eq!(entries[0].conflicts, vec!["a", "b"]);
    }
}
