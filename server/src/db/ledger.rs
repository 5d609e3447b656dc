use chrono::{DateTime, Utc};
use prescription_engine::ids::IdSource;
use prescription_engine::ledger::{
    KeyModification, LedgerEntry, LedgerError, LedgerGateway, LedgerStore,
};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::collections::HashMap;
use std::sync::Arc;

/// Versioned key/value ledger stored in `ledger_state` and `ledger_history`.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
    ids: Arc<dyn IdSource>,
}

impl PgLedger {
    pub fn new(pool: PgPool, ids: Arc<dyn IdSource>) -> Self {
        Self { pool, ids }
    }
}

impl LedgerStore for PgLedger {
    type Session = PgSession;

    fn open_session(&self) -> Self::Session {
        PgSession {
            pool: self.pool.clone(),
            tx_id: self.ids.next_id(),
            observed: HashMap::new(),
        }
    }
}

pub struct PgSession {
    pool: PgPool,
    tx_id: String,
    observed: HashMap<String, i64>,
}

fn backend(err: sqlx::Error) -> LedgerError {
    LedgerError::backend(err)
}

impl PgSession {
    /// Writes `value` under `key` inside `tx`, honouring the version this
    /// session read. Returns the new version, or `None` when the row moved on.
    async fn write_versioned(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        key: &str,
        value: &[u8],
    ) -> Result<Option<i64>, sqlx::Error> {
        let row = match self.observed.get(key) {
            Some(0) => {
                sqlx::query(
                    "INSERT INTO ledger_state (key, value, version, tx_id, updated_at)
                     VALUES ($1, $2, 1, $3, NOW())
                     ON CONFLICT (key) DO NOTHING
                     RETURNING version",
                )
                .bind(key)
                .bind(value)
                .bind(self.tx_id.as_str())
                .fetch_optional(&mut **tx)
                .await?
            }
            Some(&seen) => {
                sqlx::query(
                    "UPDATE ledger_state
                     SET value = $2, version = version + 1, tx_id = $3, updated_at = NOW()
                     WHERE key = $1 AND version = $4
                     RETURNING version",
                )
                .bind(key)
                .bind(value)
                .bind(self.tx_id.as_str())
                .bind(seen)
                .fetch_optional(&mut **tx)
                .await?
            }
            None => {
                sqlx::query(
                    "INSERT INTO ledger_state (key, value, version, tx_id, updated_at)
                     VALUES ($1, $2, 1, $3, NOW())
                     ON CONFLICT (key) DO UPDATE
                     SET value = EXCLUDED.value,
                         version = ledger_state.version + 1,
                         tx_id = EXCLUDED.tx_id,
                         updated_at = NOW()
                     RETURNING version",
                )
                .bind(key)
                .bind(value)
                .bind(self.tx_id.as_str())
                .fetch_optional(&mut **tx)
                .await?
            }
        };

        row.map(|row| row.try_get::<i64, _>("version")).transpose()
    }
}

impl LedgerGateway for PgSession {
    fn tx_id(&self) -> &str {
        &self.tx_id
    }

    async fn get_state(&mut self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        let row = sqlx::query("SELECT value, version FROM ledger_state WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        let (value, version) = match row {
            Some(row) => (
                Some(row.try_get::<Vec<u8>, _>("value").map_err(backend)?),
                row.try_get::<i64, _>("version").map_err(backend)?,
            ),
            None => (None, 0),
        };
        self.observed.entry(key.to_string()).or_insert(version);
        Ok(value)
    }

    async fn put_state(&mut self, key: &str, value: Vec<u8>) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let Some(version) = self
            .write_versioned(&mut tx, key, &value)
            .await
            .map_err(backend)?
        else {
            tracing::warn!(key, tx_id = %self.tx_id, "rejecting stale write");
            return Err(LedgerError::Conflict {
                key: key.to_string(),
            });
        };

        sqlx::query(
            "INSERT INTO ledger_history (key, value, tx_id, committed_at)
             VALUES ($1, $2, $3, NOW())",
        )
        .bind(key)
        .bind(value.as_slice())
        .bind(self.tx_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        self.observed.insert(key.to_string(), version);
        Ok(())
    }

    async fn state_by_range(
        &mut self,
        start_key: &str,
        end_key: &str,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let rows = sqlx::query(
            r#"SELECT key, value FROM ledger_state
               WHERE ($1 = '' OR key COLLATE "C" >= $1)
                 AND ($2 = '' OR key COLLATE "C" < $2)
               ORDER BY key COLLATE "C""#,
        )
        .bind(start_key)
        .bind(end_key)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter()
            .map(|row| {
                Ok(LedgerEntry {
                    key: row.try_get("key").map_err(backend)?,
                    value: row.try_get("value").map_err(backend)?,
                })
            })
            .collect()
    }

    async fn history_for_key(&mut self, key: &str) -> Result<Vec<KeyModification>, LedgerError> {
        let rows = sqlx::query(
            "SELECT value, tx_id, committed_at FROM ledger_history
             WHERE key = $1
             ORDER BY id",
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter()
            .map(|row| {
                Ok(KeyModification {
                    value: row.try_get::<Option<Vec<u8>>, _>("value").map_err(backend)?,
                    tx_id: row.try_get("tx_id").map_err(backend)?,
                    timestamp: row
                        .try_get::<DateTime<Utc>, _>("committed_at")
                        .map_err(backend)?,
                })
            })
            .collect()
    }
}
