use anyhow::{Context, Result};
use async_trait::async_trait;
use auto_trade_core::events::{Decision, ExecutionResult, LedgerRecord};
use auto_trade_core::traits::LedgerStore;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;

/// `SQLite` ledger for per-cycle trade records.
///
/// The database serializes concurrent writers per connection, and the upsert
/// keyed on `(asset_id, cycle_ts)` makes `record_cycle` idempotent under
/// scheduler retries. Distinct assets share the pool without coordination.
#[derive(Clone)]
pub struct LedgerDatabase {
    pool: SqlitePool,
}

impl LedgerDatabase {
    /// Creates a new ledger connection pool and applies migrations.
    ///
    /// # Arguments
    ///
    /// * `database_url` - `SQLite` database path (e.g., `sqlite://trades.db`)
    /// * `max_connections` - Pool size
    ///
    /// # Errors
    ///
    /// Returns error if connection fails or migrations fail.
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("invalid ledger database url")?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("failed to open ledger database")?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Creates an in-memory ledger for testing.
    ///
    /// # Errors
    ///
    /// Returns error if connection fails.
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<LedgerRecord> {
        let decision_json: String = row.try_get("decision_json")?;
        let result_json: String = row.try_get("result_json")?;
        let decision: Decision = serde_json::from_str(&decision_json)
            .context("corrupt decision_json in ledger row")?;
        let result: ExecutionResult =
            serde_json::from_str(&result_json).context("corrupt result_json in ledger row")?;

        let crypto_balance: String = row.try_get("crypto_balance")?;
        let quote_balance: String = row.try_get("quote_balance")?;
        let price: String = row.try_get("price")?;

        Ok(LedgerRecord {
            asset_id: row.try_get("asset_id")?,
            cycle_ts: row.try_get("cycle_ts")?,
            decision,
            result,
            crypto_balance: Decimal::from_str_exact(&crypto_balance)?,
            quote_balance: Decimal::from_str_exact(&quote_balance)?,
            price: Decimal::from_str_exact(&price)?,
        })
    }
}

#[async_trait]
impl LedgerStore for LedgerDatabase {
    async fn record_cycle(&self, record: &LedgerRecord) -> Result<()> {
        let decision_json = serde_json::to_string(&record.decision)?;
        let result_json = serde_json::to_string(&record.result)?;

        // The record lands as one row in one statement, so a reader never
        // observes a decision without its execution result.
        sqlx::query(
            r"
            INSERT INTO cycle_records
                (asset_id, cycle_ts, decision_json, result_json,
                 crypto_balance, quote_balance, price, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(asset_id, cycle_ts) DO UPDATE SET
                decision_json = excluded.decision_json,
                result_json = excluded.result_json,
                crypto_balance = excluded.crypto_balance,
                quote_balance = excluded.quote_balance,
                price = excluded.price,
                recorded_at = excluded.recorded_at
            ",
        )
        .bind(&record.asset_id)
        .bind(record.cycle_ts)
        .bind(decision_json)
        .bind(result_json)
        .bind(record.crypto_balance.to_string())
        .bind(record.quote_balance.to_string())
        .bind(record.price.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("failed to persist cycle record")?;

        Ok(())
    }

    async fn read_recent(&self, asset_id: &str, limit: u32) -> Result<Vec<LedgerRecord>> {
        let rows = sqlx::query(
            r"
            SELECT asset_id, cycle_ts, decision_json, result_json,
                   crypto_balance, quote_balance, price
            FROM cycle_records
            WHERE asset_id = ?1
            ORDER BY cycle_ts DESC
            LIMIT ?2
            ",
        )
        .bind(asset_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn last_timestamp(&self, asset_id: &str) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT cycle_ts FROM cycle_records WHERE asset_id = ?1 ORDER BY cycle_ts DESC LIMIT 1",
        )
        .bind(asset_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("cycle_ts")?)),
            None => Ok(None),
        }
    }
}
