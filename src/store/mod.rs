//! Bid Store (spec.md §4.7): the durable local log of every coprocessor bid
//! submission attempt. This is the crate's one source of truth for fund
//! recovery — every row is append-only except for the single
//! `retracted`/`retracted_at`/`retract_tx_hash` mutation performed by
//! [`BidStore::mark_retracted`].
//!
//! Grounded in the `sqlx` connection-pool pattern used for the retrieved
//! pack's own durable stores (`db::Database` in the accompanying exchange
//! codebase), adapted from Postgres to an embedded SQLite file per spec.md
//! §6 ("default `${cwd}/.filler-data/bids.db`").

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use std::path::Path;
use tracing::{debug, info, instrument};

/// A new bid submission attempt (spec.md §4.7 `insert(BidInsert)`).
#[derive(Debug, Clone)]
pub struct BidInsert {
    pub commitment: [u8; 32],
    pub submit_tx_hash: Option<[u8; 32]>,
    pub submit_block_hash: Option<[u8; 32]>,
    pub success: bool,
    pub error: Option<String>,
}

/// A durable row in the bid store (spec.md §3 `BidRecord`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidRecord {
    pub id: i64,
    pub commitment: [u8; 32],
    pub submit_tx_hash: Option<[u8; 32]>,
    pub submit_block_hash: Option<[u8; 32]>,
    pub success: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub retracted: bool,
    pub retracted_at: Option<DateTime<Utc>>,
    pub retract_tx_hash: Option<[u8; 32]>,
}

/// Aggregate counts for operational visibility (spec.md §4.7 `stats()`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BidStoreStats {
    pub total: i64,
    pub successful: i64,
    pub failed: i64,
    pub retracted: i64,
    pub pending_retraction: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("bid store I/O error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

fn bytes32(bytes: &[u8], field: &'static str) -> [u8; 32] {
    bytes.try_into().unwrap_or_else(|_| panic!("bid store column '{field}' is not 32 bytes"))
}

fn row_to_record(row: SqliteRow) -> BidRecord {
    BidRecord {
        id: row.get("id"),
        commitment: bytes32(row.get::<Vec<u8>, _>("commitment").as_slice(), "commitment"),
        submit_tx_hash: row
            .get::<Option<Vec<u8>>, _>("submit_tx_hash")
            .map(|b| bytes32(&b, "submit_tx_hash")),
        submit_block_hash: row
            .get::<Option<Vec<u8>>, _>("submit_block_hash")
            .map(|b| bytes32(&b, "submit_block_hash")),
        success: row.get::<i64, _>("success") != 0,
        error: row.get("error"),
        created_at: row.get("created_at"),
        retracted: row.get::<i64, _>("retracted") != 0,
        retracted_at: row.get("retracted_at"),
        retract_tx_hash: row
            .get::<Option<Vec<u8>>, _>("retract_tx_hash")
            .map(|b| bytes32(&b, "retract_tx_hash")),
    }
}

/// Durable log of coprocessor bid submissions, backed by an embedded SQLite
/// database. Shared across every strategy that bids (spec.md §5
/// "Shared-resource policy" — all writes serialize through this API; `sqlx`'s
/// pool serializes at the connection layer for SQLite).
#[derive(Clone)]
pub struct BidStore {
    pool: SqlitePool,
}

impl BidStore {
    /// Open (creating if absent) the bid store database at `path`, running
    /// the schema migration (spec.md §4.7) if the `bids` table does not yet
    /// exist.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    sqlx::Error::Io(e)
                })?;
            }
        }

        let url = format!("sqlite://{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new().max_connections(8).connect(&url).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bids (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                commitment          BLOB NOT NULL,
                submit_tx_hash      BLOB,
                submit_block_hash   BLOB,
                success             INTEGER NOT NULL,
                error               TEXT,
                created_at          TEXT NOT NULL,
                retracted           INTEGER NOT NULL DEFAULT 0,
                retracted_at        TEXT,
                retract_tx_hash     BLOB
            )
            "#,
        )
        .execute(&pool)
        .await?;

        for (name, column) in [
            ("idx_bids_commitment", "commitment"),
            ("idx_bids_success", "success"),
            ("idx_bids_retracted", "retracted"),
            ("idx_bids_created_at", "created_at"),
        ] {
            sqlx::query(&format!("CREATE INDEX IF NOT EXISTS {name} ON bids({column})"))
                .execute(&pool)
                .await?;
        }

        info!("bid store ready");
        Ok(Self { pool })
    }

    /// Insert a row for one submission attempt (success or failure). Every
    /// call to `bid_client.submit_bid` inserts exactly one row here,
    /// regardless of outcome (spec.md §8 P5).
    #[instrument(skip_all, fields(commitment = %hex::encode(insert.commitment), success = insert.success))]
    pub async fn insert(&self, insert: BidInsert) -> Result<i64, StoreError> {
        let now = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO bids (commitment, submit_tx_hash, submit_block_hash, success, error, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(insert.commitment.to_vec())
        .bind(insert.submit_tx_hash.map(|h| h.to_vec()))
        .bind(insert.submit_block_hash.map(|h| h.to_vec()))
        .bind(insert.success as i64)
        .bind(insert.error)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = row.get("id");
        debug!(id, "bid row inserted");
        Ok(id)
    }

    /// The most recent row for `commitment`, if any.
    pub async fn latest_by_commitment(
        &self,
        commitment: [u8; 32],
    ) -> Result<Option<BidRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM bids WHERE commitment = ? ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(commitment.to_vec())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_record))
    }

    /// Every successful, not-yet-retracted row — the fund-recovery feed
    /// (spec.md §4.7).
    pub async fn successful_unretracted(&self) -> Result<Vec<BidRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM bids WHERE success = 1 AND retracted = 0 ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_record).collect())
    }

    /// Mark the latest row for `commitment` as retracted. Idempotent: once
    /// `retracted = true`, a second call returns `false` and changes nothing
    /// (spec.md §8 P6).
    #[instrument(skip_all, fields(commitment = %hex::encode(commitment)))]
    pub async fn mark_retracted(
        &self,
        commitment: [u8; 32],
        retract_tx: [u8; 32],
    ) -> Result<bool, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE bids
            SET retracted = 1, retracted_at = ?, retract_tx_hash = ?
            WHERE id = (
                SELECT id FROM bids
                WHERE commitment = ? AND retracted = 0
                ORDER BY created_at DESC, id DESC
                LIMIT 1
            )
            "#,
        )
        .bind(now)
        .bind(retract_tx.to_vec())
        .bind(commitment.to_vec())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Aggregate counts across the whole store (spec.md §4.7 `stats()`).
    pub async fn stats(&self) -> Result<BidStoreStats, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(success), 0) AS successful,
                COALESCE(SUM(1 - success), 0) AS failed,
                COALESCE(SUM(retracted), 0) AS retracted,
                COALESCE(SUM(CASE WHEN success = 1 AND retracted = 0 THEN 1 ELSE 0 END), 0)
                    AS pending_retraction
            FROM bids
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(BidStoreStats {
            total: row.get("total"),
            successful: row.get("successful"),
            failed: row.get("failed"),
            retracted: row.get("retracted"),
            pending_retraction: row.get("pending_retraction"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> (BidStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = BidStore::open(dir.path().join("bids.db")).await.unwrap();
        (store, dir)
    }

    fn sample_insert(commitment: [u8; 32], success: bool) -> BidInsert {
        BidInsert {
            commitment,
            submit_tx_hash: success.then_some([7u8; 32]),
            submit_block_hash: success.then_some([8u8; 32]),
            success,
            error: (!success).then(|| "simulated failure".to_string()),
        }
    }

    #[tokio::test]
    async fn insert_then_read_back_round_trips() {
        let (store, _dir) = temp_store().await;
        let commitment = [1u8; 32];
        store.insert(sample_insert(commitment, true)).await.unwrap();

        let record = store.latest_by_commitment(commitment).await.unwrap().unwrap();
        assert_eq!(record.commitment, commitment);
        assert!(record.success);
        assert!(!record.retracted);
        assert_eq!(record.submit_tx_hash, Some([7u8; 32]));
    }

    #[tokio::test]
    async fn successful_unretracted_excludes_failures_and_retracted() {
        let (store, _dir) = temp_store().await;
        store.insert(sample_insert([1u8; 32], true)).await.unwrap();
        store.insert(sample_insert([2u8; 32], false)).await.unwrap();
        store.insert(sample_insert([3u8; 32], true)).await.unwrap();
        store.mark_retracted([3u8; 32], [9u8; 32]).await.unwrap();

        let feed = store.successful_unretracted().await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].commitment, [1u8; 32]);
    }

    #[tokio::test]
    async fn mark_retracted_is_idempotent() {
        let (store, _dir) = temp_store().await;
        let commitment = [4u8; 32];
        store.insert(sample_insert(commitment, true)).await.unwrap();

        assert!(store.mark_retracted(commitment, [5u8; 32]).await.unwrap());
        assert!(!store.mark_retracted(commitment, [6u8; 32]).await.unwrap());

        let record = store.latest_by_commitment(commitment).await.unwrap().unwrap();
        assert!(record.retracted);
        assert_eq!(record.retract_tx_hash, Some([5u8; 32]));
    }

    #[tokio::test]
    async fn stats_counts_every_bucket() {
        let (store, _dir) = temp_store().await;
        store.insert(sample_insert([1u8; 32], true)).await.unwrap();
        store.insert(sample_insert([2u8; 32], false)).await.unwrap();
        store.insert(sample_insert([3u8; 32], true)).await.unwrap();
        store.mark_retracted([3u8; 32], [9u8; 32]).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.successful, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.retracted, 1);
        assert_eq!(stats.pending_retraction, 1);
    }
}
