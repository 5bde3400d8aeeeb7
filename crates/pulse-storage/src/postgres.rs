//! Postgres backend: upsert-on-conflict rows, one transaction per batch.

use std::collections::HashMap;

use async_trait::async_trait;
use pulse_proto::{format_gauge, parse_gauge_text, Metric, MetricKind};
use sqlx::postgres::PgPool;
use sqlx::{QueryBuilder, Row};
use tracing::debug;

use crate::{Result, Storage};

const CREATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS metrics (
    id        TEXT PRIMARY KEY,
    mtype     TEXT NOT NULL,
    ivalue    BIGINT DEFAULT 0,
    grawvalue TEXT DEFAULT ''
);
";

const UPSERT_TAIL: &str = "
 ON CONFLICT (id) DO UPDATE SET
    mtype = EXCLUDED.mtype,
    ivalue = CASE WHEN EXCLUDED.mtype = 'counter'
                  THEN metrics.ivalue + EXCLUDED.ivalue
                  ELSE metrics.ivalue END,
    grawvalue = CASE WHEN EXCLUDED.mtype = 'gauge'
                  THEN EXCLUDED.grawvalue
                  ELSE metrics.grawvalue END
";

/// One deduplicated row headed for the upsert statement.
#[derive(Debug, PartialEq)]
struct UpsertRow {
    id: String,
    kind: MetricKind,
    ivalue: i64,
    grawvalue: String,
}

/// Collapses a batch to one row per `(id, kind)`: counter deltas sum,
/// gauges keep the last value in input order.
fn dedup_batch(batch: &[Metric]) -> Vec<UpsertRow> {
    let mut rows: Vec<UpsertRow> = Vec::new();
    let mut index: HashMap<(String, MetricKind), usize> = HashMap::new();

    for metric in batch {
        let key = (metric.id.clone(), metric.kind);
        let pos = *index.entry(key).or_insert_with(|| {
            rows.push(UpsertRow {
                id: metric.id.clone(),
                kind: metric.kind,
                ivalue: 0,
                grawvalue: String::new(),
            });
            rows.len() - 1
        });
        match metric.kind {
            MetricKind::Counter => {
                if let Some(delta) = metric.delta {
                    rows[pos].ivalue = rows[pos].ivalue.wrapping_add(delta);
                }
            }
            MetricKind::Gauge => {
                if let Some(value) = metric.value {
                    rows[pos].grawvalue = format_gauge(value);
                }
            }
        }
    }
    rows
}

/// Storage backend over a shared Postgres pool.
///
/// The pool itself is owned by the process lifecycle; `shutdown` here is
/// a no-op so the pool can serve `/ping` until the very end.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Creates the backend, ensuring the metrics table exists.
    ///
    /// # Errors
    ///
    /// Returns the database error when the schema cannot be created.
    pub async fn new(pool: PgPool) -> Result<Self> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn put_gauge_raw(&self, name: &str, raw: &str) -> Result<()> {
        parse_gauge_text(raw)?;
        pulse_retry::retry(|| async {
            sqlx::query(
                "INSERT INTO metrics (id, mtype, grawvalue) VALUES ($1, 'gauge', $2)
                 ON CONFLICT (id) DO UPDATE SET mtype = 'gauge', grawvalue = EXCLUDED.grawvalue",
            )
            .bind(name)
            .bind(raw)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn gauge_raw(&self, name: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT grawvalue FROM metrics WHERE id = $1 AND mtype = 'gauge'")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    async fn add_counter(&self, name: &str, delta: i64) -> Result<()> {
        pulse_retry::retry(|| async {
            sqlx::query(
                "INSERT INTO metrics (id, mtype, ivalue) VALUES ($1, 'counter', $2)
                 ON CONFLICT (id) DO UPDATE SET mtype = 'counter',
                     ivalue = metrics.ivalue + EXCLUDED.ivalue",
            )
            .bind(name)
            .bind(delta)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn counter(&self, name: &str) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT ivalue FROM metrics WHERE id = $1 AND mtype = 'counter'")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<i64, _>(0)))
    }

    async fn all_gauges(&self) -> Result<HashMap<String, String>> {
        let rows = sqlx::query("SELECT id, grawvalue FROM metrics WHERE mtype = 'gauge'")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>(0), r.get::<String, _>(1)))
            .collect())
    }

    async fn all_counters(&self) -> Result<HashMap<String, i64>> {
        let rows = sqlx::query("SELECT id, ivalue FROM metrics WHERE mtype = 'counter'")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>(0), r.get::<i64, _>(1)))
            .collect())
    }

    async fn apply_batch(&self, batch: &[Metric]) -> Result<()> {
        let rows = dedup_batch(batch);
        if rows.is_empty() {
            return Ok(());
        }
        debug!(records = batch.len(), rows = rows.len(), "applying metric batch");

        pulse_retry::retry(|| async {
            let mut builder: QueryBuilder<sqlx::Postgres> =
                QueryBuilder::new("INSERT INTO metrics (id, mtype, ivalue, grawvalue) ");
            builder.push_values(&rows, |mut b, row| {
                b.push_bind(row.id.as_str())
                    .push_bind(row.kind.as_str())
                    .push_bind(row.ivalue)
                    .push_bind(row.grawvalue.as_str());
            });
            builder.push(UPSERT_TAIL);

            let mut tx = self.pool.begin().await?;
            builder.build().execute(&mut *tx).await?;
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
