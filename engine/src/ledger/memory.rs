use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{in_range, KeyModification, LedgerEntry, LedgerError, LedgerGateway, LedgerStore};
use crate::clock::{Clock, SystemClock};
use crate::ids::{IdSource, UuidSource};

/// In-process versioned key/value ledger with per-key history.
#[derive(Clone)]
pub struct MemoryLedger {
    state: Arc<RwLock<WorldState>>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdSource>,
}

#[derive(Default)]
struct WorldState {
    current: BTreeMap<String, Versioned>,
    history: HashMap<String, Vec<KeyModification>>,
}

struct Versioned {
    value: Vec<u8>,
    version: u64,
}

impl WorldState {
    fn version_of(&self, key: &str) -> u64 {
        self.current.get(key).map(|v| v.version).unwrap_or(0)
    }

    fn commit(&mut self, key: &str, value: Vec<u8>, modification: KeyModification) -> u64 {
        let version = self.version_of(key) + 1;
        self.history
            .entry(key.to_string())
            .or_default()
            .push(modification);
        self.current
            .insert(key.to_string(), Versioned { value, version });
        version
    }
}

impl MemoryLedger {
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<dyn IdSource>) -> Self {
        Self {
            state: Arc::new(RwLock::new(WorldState::default())),
            clock,
            ids,
        }
    }

    pub fn session(&self) -> MemorySession {
        MemorySession {
            ledger: self.clone(),
            tx_id: self.ids.next_id(),
            observed: HashMap::new(),
        }
    }

    /// Number of keys currently holding a value.
    pub async fn len(&self) -> usize {
        self.state.read().await.current.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stores raw bytes under `key` outside any session, bypassing the codec.
    pub async fn insert_raw(&self, key: &str, value: Vec<u8>) {
        let modification = KeyModification {
            value: Some(value.clone()),
            timestamp: self.clock.now(),
            tx_id: self.ids.next_id(),
        };
        self.state.write().await.commit(key, value, modification);
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), Arc::new(UuidSource))
    }
}

impl LedgerStore for MemoryLedger {
    type Session = MemorySession;

    fn open_session(&self) -> Self::Session {
        self.session()
    }
}

/// One operation against a [`MemoryLedger`].
pub struct MemorySession {
    ledger: MemoryLedger,
    tx_id: String,
    /// Version each key had when this session first read it, or last wrote
    /// it; 0 means absent.
    observed: HashMap<String, u64>,
}

impl LedgerGateway for MemorySession {
    fn tx_id(&self) -> &str {
        &self.tx_id
    }

    async fn get_state(&mut self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        let state = self.ledger.state.read().await;
        let entry = state.current.get(key);
        self.observed
            .entry(key.to_string())
            .or_insert_with(|| entry.map(|v| v.version).unwrap_or(0));
        Ok(entry.map(|v| v.value.clone()))
    }

    async fn put_state(&mut self, key: &str, value: Vec<u8>) -> Result<(), LedgerError> {
        let mut state = self.ledger.state.write().await;
        let current = state.version_of(key);
        if let Some(&seen) = self.observed.get(key) {
            if seen != current {
                tracing::warn!(key, tx_id = %self.tx_id, seen, current, "rejecting stale write");
                return Err(LedgerError::Conflict {
                    key: key.to_string(),
                });
            }
        }

        let modification = KeyModification {
            value: Some(value.clone()),
            timestamp: self.ledger.clock.now(),
            tx_id: self.tx_id.clone(),
        };
        let version = state.commit(key, value, modification);
        self.observed.insert(key.to_string(), version);
        Ok(())
    }

    async fn state_by_range(
        &mut self,
        start_key: &str,
        end_key: &str,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let state = self.ledger.state.read().await;
        Ok(state
            .current
            .iter()
            .filter(|(key, _)| in_range(key, start_key, end_key))
            .map(|(key, v)| LedgerEntry {
                key: key.clone(),
                value: v.value.clone(),
            })
            .collect())
    }

    async fn history_for_key(&mut self, key: &str) -> Result<Vec<KeyModification>, LedgerError> {
        let state = self.ledger.state.read().await;
        Ok(state.history.get(key).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::ids::SequentialIds;
    use chrono::{TimeZone, Utc};
    use tokio_test::{assert_err, assert_ok};

    fn ledger() -> MemoryLedger {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap());
        MemoryLedger::new(Arc::new(clock), Arc::new(SequentialIds::new("tx")))
    }

    #[tokio::test]
    async fn test_get_absent_key_is_none() {
        let ledger = ledger();
        let mut session = ledger.session();
        assert_eq!(session.get_state("P1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_session_reads_its_own_writes() {
        let ledger = ledger();
        let mut session = ledger.session();
        assert_ok!(session.get_state("P1").await);
        assert_ok!(session.put_state("P1", b"one".to_vec()).await);
        assert_eq!(session.get_state("P1").await.unwrap(), Some(b"one".to_vec()));
        assert_ok!(session.put_state("P1", b"two".to_vec()).await);
        assert_eq!(ledger.len().await, 1);
    }

    #[tokio::test]
    async fn test_stale_write_is_rejected() {
        let ledger = ledger();
        let mut first = ledger.session();
        let mut second = ledger.session();

        assert_ok!(first.get_state("P1").await);
        assert_ok!(second.get_state("P1").await);
        assert_ok!(first.put_state("P1", b"first".to_vec()).await);

        let err = assert_err!(second.put_state("P1", b"second".to_vec()).await);
        assert!(matches!(err, LedgerError::Conflict { key } if key == "P1"));

        let mut reader = ledger.session();
        assert_eq!(reader.get_state("P1").await.unwrap(), Some(b"first".to_vec()));
    }

    #[tokio::test]
    async fn test_rereading_does_not_refresh_the_read_version() {
        let ledger = ledger();
        let mut slow = ledger.session();
        assert_ok!(slow.get_state("P1").await);

        let mut fast = ledger.session();
        assert_ok!(fast.put_state("P1", b"fast".to_vec()).await);

        assert_eq!(slow.get_state("P1").await.unwrap(), Some(b"fast".to_vec()));
        assert_err!(slow.put_state("P1", b"slow".to_vec()).await);
    }

    #[tokio::test]
    async fn test_range_scan_is_key_ordered() {
        let ledger = ledger();
        ledger.insert_raw("P3", b"c".to_vec()).await;
        ledger.insert_raw("P1", b"a".to_vec()).await;
        ledger.insert_raw("P2", b"b".to_vec()).await;

        let mut session = ledger.session();
        let keys: Vec<_> = session
            .state_by_range("", "")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.key)
            .collect();
        assert_eq!(keys, vec!["P1", "P2", "P3"]);

        let bounded = session.state_by_range("P2", "P3").await.unwrap();
        assert_eq!(bounded.len(), 1);
        assert_eq!(bounded[0].key, "P2");
    }

    #[tokio::test]
    async fn test_history_keeps_insertion_order_and_tx_ids() {
        let ledger = ledger();
        let mut first = ledger.session();
        assert_ok!(first.put_state("P1", b"v1".to_vec()).await);
        let mut second = ledger.session();
        assert_ok!(second.get_state("P1").await);
        assert_ok!(second.put_state("P1", b"v2".to_vec()).await);

        let history = ledger.session().history_for_key("P1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].value.as_deref(), Some(&b"v1"[..]));
        assert_eq!(history[0].tx_id, first.tx_id());
        assert_eq!(history[1].value.as_deref(), Some(&b"v2"[..]));
        assert_eq!(history[1].tx_id, second.tx_id());
    }
}
