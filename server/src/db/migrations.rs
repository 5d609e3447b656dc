use sqlx::postgres::PgPool;

/// Schema changes in the order they must be applied.
pub const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_ledger_state",
        r#"
        CREATE TABLE IF NOT EXISTS ledger_state (
            key TEXT PRIMARY KEY,
            value BYTEA NOT NULL,
            version BIGINT NOT NULL,
            tx_id TEXT NOT NULL,
            updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "0002_ledger_history",
        r#"
        CREATE TABLE IF NOT EXISTS ledger_history (
            id BIGSERIAL PRIMARY KEY,
            key TEXT NOT NULL,
            value BYTEA,
            tx_id TEXT NOT NULL,
            committed_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "0003_ledger_history_key_idx",
        "CREATE INDEX IF NOT EXISTS ledger_history_key_idx ON ledger_history (key, id)",
    ),
];

/// Applies every migration not yet recorded in `ledger_migrations`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    init_migrations_tracker(pool).await?;

    for &(name, sql) in MIGRATIONS {
        if is_applied(pool, name).await? {
            tracing::debug!(migration = name, "already applied");
            continue;
        }

        tracing::info!(migration = name, "running migration");
        let mut tx = pool.begin().await?;
        sqlx::query(sql).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO ledger_migrations (name) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    Ok(())
}

async fn init_migrations_tracker(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ledger_migrations (
            id SERIAL PRIMARY KEY,
            name VARCHAR(255) NOT NULL UNIQUE,
            applied_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn is_applied(pool: &PgPool, name: &str) -> Result<bool, sqlx::Error> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT id FROM ledger_migrations WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}
