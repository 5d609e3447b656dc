//! The ledger capability the engine runs against.
//!
//! Storage, ordering and commit are owned by the ledger implementation. The
//! engine only sees one [`LedgerGateway`] session per logical operation.

use chrono::{DateTime, Utc};
use std::error::Error as StdError;
use std::future::Future;
use thiserror::Error;

pub mod memory;

pub use memory::{MemoryLedger, MemorySession};

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Another writer committed the key after this session read it.
    #[error("write conflict on key {key}: value changed since it was read")]
    Conflict { key: String },

    #[error("ledger backend failure: {0}")]
    Backend(#[source] Box<dyn StdError + Send + Sync>),
}

impl LedgerError {
    pub fn backend(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        LedgerError::Backend(err.into())
    }
}

/// A current key/value pair returned by a range scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub key: String,
    pub value: Vec<u8>,
}

/// One committed write to a key. `value` is `None` for a deletion marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyModification {
    pub value: Option<Vec<u8>>,
    pub timestamp: DateTime<Utc>,
    pub tx_id: String,
}

/// A single operation's view of the ledger.
///
/// Reads observe the session's own earlier writes. A `put_state` for a key the
/// session has read fails with [`LedgerError::Conflict`] when someone else
/// committed that key since the session first read it; every accepted write
/// is committed at once.
pub trait LedgerGateway: Send {
    /// Transaction id stamped on everything this session writes.
    fn tx_id(&self) -> &str;

    fn get_state(
        &mut self,
        key: &str,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, LedgerError>> + Send;

    fn put_state(
        &mut self,
        key: &str,
        value: Vec<u8>,
    ) -> impl Future<Output = Result<(), LedgerError>> + Send;

    /// Current entries with `start_key <= key < end_key` in ascending key
    /// order. An empty bound is open.
    fn state_by_range(
        &mut self,
        start_key: &str,
        end_key: &str,
    ) -> impl Future<Output = Result<Vec<LedgerEntry>, LedgerError>> + Send;

    /// Every committed write to `key`, oldest first.
    fn history_for_key(
        &mut self,
        key: &str,
    ) -> impl Future<Output = Result<Vec<KeyModification>, LedgerError>> + Send;
}

/// Something that can open ledger sessions.
pub trait LedgerStore: Clone + Send + Sync + 'static {
    type Session: LedgerGateway + 'static;

    fn open_session(&self) -> Self::Session;
}

/// Whether `key` falls inside the half-open scan range.
pub fn in_range(key: &str, start_key: &str, end_key: &str) -> bool {
    (start_key.is_empty() || key >= start_key) && (end_key.is_empty() || key < end_key)
}
