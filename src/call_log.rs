use crate::storage::{KeyValueStore, CALL_LOG_KEY};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default number of retained call log entries
pub const DEFAULT_MAX_ENTRIES: usize = 50;

/// Kind of call recorded in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallKind {
    #[serde(rename = "call_attempt")]
    Attempt,
    #[serde(rename = "emergency_call")]
    Emergency,
}

/// A single immutable call log record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallLogEntry {
    pub phone_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: CallKind,
}

impl CallLogEntry {
    pub fn attempt(phone_number: &str) -> Self {
        Self {
            phone_number: phone_number.to_string(),
            contact_name: None,
            timestamp: Utc::now(),
            kind: CallKind::Attempt,
        }
    }

    pub fn emergency(phone_number: &str, contact_name: &str) -> Self {
        Self {
            phone_number: phone_number.to_string(),
            contact_name: Some(contact_name.to_string()),
            timestamp: Utc::now(),
            kind: CallKind::Emergency,
        }
    }
}

/// Capped, append-only call log persisted under [`CALL_LOG_KEY`].
///
/// The in-memory sequence is authoritative for the process lifetime; the
/// store is a best-effort mirror of it.
pub struct CallLog {
    store: Arc<dyn KeyValueStore>,
    entries: Mutex<Vec<CallLogEntry>>,
    max_entries: usize,
}

impl CallLog {
    /// Load the persisted log, falling back to an empty one when the key is
    /// absent, unreadable or malformed.
    pub fn load(store: Arc<dyn KeyValueStore>, max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        let mut entries = match store.get(CALL_LOG_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<CallLogEntry>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Discarding malformed call log: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Call log unavailable, starting empty: {}", e);
                Vec::new()
            }
        };

        trim_to(&mut entries, max_entries);
        debug!("Loaded call log with {} entries", entries.len());

        Self {
            store,
            entries: Mutex::new(entries),
            max_entries,
        }
    }

    /// Append an entry, trim to the cap and persist.
    ///
    /// Persistence failures are logged and swallowed; the entry stays in the
    /// in-memory view.
    pub fn append(&self, entry: CallLogEntry) {
        let mut entries = self.entries.lock();
        entries.push(entry);
        trim_to(&mut entries, self.max_entries);

        match serde_json::to_string(&*entries) {
            Ok(json) => {
                if let Err(e) = self.store.set(CALL_LOG_KEY, &json) {
                    warn!("Call log entry not durably recorded: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize call log: {}", e),
        }
    }

    pub fn log_attempt(&self, phone_number: &str) {
        self.append(CallLogEntry::attempt(phone_number));
    }

    pub fn log_emergency(&self, phone_number: &str, contact_name: &str) {
        self.append(CallLogEntry::emergency(phone_number, contact_name));
    }

    /// Every retained entry in insertion order
    pub fn all(&self) -> Vec<CallLogEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Pretty JSON export for diagnostics
    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&*self.entries.lock())
    }
}

fn trim_to(entries: &mut Vec<CallLogEntry>, max_entries: usize) {
    if entries.len() > max_entries {
        let excess = entries.len() - max_entries;
        entries.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn numbered(i: usize) -> CallLogEntry {
        CallLogEntry::attempt(&format!("555000{:04}", i))
    }

    #[test]
    fn test_append_preserves_order() {
        let store = Arc::new(MemoryStore::new());
        let log = CallLog::load(store, DEFAULT_MAX_ENTRIES);

        log.log_attempt("911");
        log.log_emergency("+15553456789", "David Johnson");

        let entries = log.all();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].phone_number, "911");
        assert_eq!(entries[0].kind, CallKind::Attempt);
        assert_eq!(entries[1].contact_name.as_deref(), Some("David Johnson"));
        assert_eq!(entries[1].kind, CallKind::Emergency);
    }

    #[test]
    fn test_sixty_appends_keep_last_fifty() {
        let store = Arc::new(MemoryStore::new());
        let log = CallLog::load(store.clone(), DEFAULT_MAX_ENTRIES);

        for i in 1..=60 {
            log.append(numbered(i));
            assert!(log.len() <= 50);
        }

        let entries = log.all();
        assert_eq!(entries.len(), 50);
        assert_eq!(entries[0].phone_number, numbered(11).phone_number);
        assert_eq!(entries[49].phone_number, numbered(60).phone_number);
        for window in entries.windows(2) {
            assert!(window[0].phone_number < window[1].phone_number);
        }

        // The persisted copy is capped too
        let reloaded = CallLog::load(store, DEFAULT_MAX_ENTRIES);
        assert_eq!(reloaded.all(), entries);
    }

    #[test]
    fn test_cap_applies_to_emergency_entries() {
        let store = Arc::new(MemoryStore::new());
        let log = CallLog::load(store, 3);

        log.log_emergency("911", "Emergency Services");
        log.log_attempt("1");
        log.log_attempt("2");
        log.log_attempt("3");

        let numbers: Vec<_> = log.all().into_iter().map(|e| e.phone_number).collect();
        assert_eq!(numbers, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_malformed_log_loads_empty() {
        let store = Arc::new(MemoryStore::new());
        store.set(CALL_LOG_KEY, "{not json").unwrap();

        let log = CallLog::load(store, DEFAULT_MAX_ENTRIES);
        assert!(log.is_empty());
    }

    #[test]
    fn test_oversized_persisted_log_is_trimmed_on_load() {
        let store = Arc::new(MemoryStore::new());
        let entries: Vec<_> = (1..=5).map(numbered).collect();
        store
            .set(CALL_LOG_KEY, &serde_json::to_string(&entries).unwrap())
            .unwrap();

        let log = CallLog::load(store, 2);
        let loaded = log.all();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].phone_number, entries[3].phone_number);
    }

    #[test]
    fn test_write_failure_is_silent() {
        let store = Arc::new(MemoryStore::with_quota(8));
        let log = CallLog::load(store.clone(), DEFAULT_MAX_ENTRIES);

        log.log_attempt("911");

        assert_eq!(log.len(), 1);
        assert!(store.get(CALL_LOG_KEY).unwrap().is_none());
    }

    #[test]
    fn test_unavailable_store_on_load() {
        let store = Arc::new(MemoryStore::new());
        store.set_unavailable(true);

        let log = CallLog::load(store, DEFAULT_MAX_ENTRIES);
        log.log_attempt("911");
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_json_layout() {
        let store = Arc::new(MemoryStore::new());
        let log = CallLog::load(store.clone(), DEFAULT_MAX_ENTRIES);
        log.log_emergency("911", "Emergency Services");

        let raw = store.get(CALL_LOG_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[0]["phoneNumber"], "911");
        assert_eq!(value[0]["contactName"], "Emergency Services");
        assert_eq!(value[0]["type"], "emergency_call");
        assert!(value[0]["timestamp"].is_string());

        assert!(log.export_json().unwrap().contains("emergency_call"));
    }
}
