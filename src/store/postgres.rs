/// PostgreSQL-backed profile and document store
///
/// Uses sqlx with PgPool for connection pooling. The same database holds the
/// relational profile rows and the pgvector documents table, so one pool
/// serves all three subcommands. Supports optional migration execution on
/// startup.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::{
    postgres::{PgPool, PgPoolOptions, PgRow},
    Column, Row, TypeInfo,
};

use crate::errors::ArgoError;
use crate::store::{DocHit, NewProfile, ProfileRow, ProfileStore, TrajectoryPoint};

/// PostgreSQL-backed store using a sqlx connection pool.
pub struct PostgresProfileStore {
    pool: PgPool,
}

impl PostgresProfileStore {
    /// Connect to the PostgreSQL database at database_url.
    ///
    /// Configures a small connection pool suited to single-process batch jobs
    /// and a lightly loaded HTTP service. If run_migrations is true, pending
    /// migrations (profile table, vector extension, documents table) run on
    /// startup.
    pub async fn new(database_url: &str, run_migrations: bool) -> Result<Self, ArgoError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await
            .map_err(|e| ArgoError::Storage(format!("Failed to connect to database: {}", e)))?;

        if run_migrations {
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| ArgoError::Storage(format!("Migration failed: {}", e)))?;
        }

        Ok(PostgresProfileStore { pool })
    }
}

#[async_trait]
impl ProfileStore for PostgresProfileStore {
    /// Insert one profile row and return its assigned id.
    ///
    /// Each call commits independently — the ingestor relies on that to keep
    /// one cycle's failure from rolling back its neighbors. No duplicate
    /// detection: re-ingesting a file inserts the same cycles again.
    async fn insert_profile(&self, input: &NewProfile) -> Result<i64, ArgoError> {
        let row = sqlx::query(
            "INSERT INTO argo_profiles \
             (platform_id, cycle_number, observed_at, latitude, longitude, pressure, temperature, salinity) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id",
        )
        .bind(&input.platform_id)
        .bind(input.cycle_number)
        .bind(input.observed_at)
        .bind(input.latitude)
        .bind(input.longitude)
        .bind(input.pressure)
        .bind(input.temperature)
        .bind(input.salinity)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| ArgoError::Storage(format!("Failed to insert profile: {}", e)))?;

        row.try_get("id")
            .map_err(|e| ArgoError::Storage(e.to_string()))
    }

    /// Count all profile rows (used to compute the pipeline's page total).
    async fn count_profiles(&self) -> Result<i64, ArgoError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM argo_profiles")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ArgoError::Storage(e.to_string()))?;

        row.try_get("count")
            .map_err(|e| ArgoError::Storage(e.to_string()))
    }

    /// Fetch one page of profile rows ordered by observation time, newest
    /// first. Pages are 1-based; OFFSET/LIMIT pagination as the pipeline
    /// expects.
    async fn fetch_page(&self, page: i64, page_size: i64) -> Result<Vec<ProfileRow>, ArgoError> {
        let offset = (page - 1) * page_size;
        let rows = sqlx::query(
            "SELECT id, platform_id, cycle_number, observed_at, latitude, longitude, \
                    pressure, temperature, salinity \
             FROM argo_profiles ORDER BY observed_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(page_size)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ArgoError::Storage(format!("Failed to fetch page {}: {}", page, e)))?;

        rows.iter().map(row_to_profile).collect()
    }

    /// All trajectory points ordered by (platform_id, observed_at ascending),
    /// so the caller can group by float while preserving temporal order.
    async fn trajectory_points(&self) -> Result<Vec<TrajectoryPoint>, ArgoError> {
        let rows = sqlx::query(
            "SELECT platform_id, latitude, longitude \
             FROM argo_profiles ORDER BY platform_id, observed_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ArgoError::Storage(e.to_string()))?;

        let mut points = Vec::with_capacity(rows.len());
        for row in &rows {
            points.push(TrajectoryPoint {
                platform_id: row.try_get("platform_id").map_err(|e| ArgoError::Storage(e.to_string()))?,
                latitude: row.try_get("latitude").map_err(|e| ArgoError::Storage(e.to_string()))?,
                longitude: row.try_get("longitude").map_err(|e| ArgoError::Storage(e.to_string()))?,
            });
        }
        Ok(points)
    }

    /// Execute a caller-supplied SQL query verbatim and return the rows as
    /// JSON objects.
    ///
    /// This runs model-generated SQL as-is — an inherited, deliberately
    /// preserved risk of the retrieval-plan design. The database role the
    /// service connects with should be read-only.
    async fn raw_query(&self, sql: &str) -> Result<Vec<serde_json::Value>, ArgoError> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ArgoError::Storage(format!("Query failed: {}", e)))?;

        rows.iter().map(row_to_json).collect()
    }

    /// Upsert a summary document with its embedding and row metadata.
    ///
    /// Keyed by the stringified profile row id: reprocessing a page after a
    /// crash overwrites the same documents instead of duplicating them.
    async fn upsert_doc(
        &self,
        id: &str,
        summary: &str,
        embedding: &pgvector::Vector,
        metadata: &serde_json::Value,
    ) -> Result<(), ArgoError> {
        sqlx::query(
            "INSERT INTO argo_docs (id, summary, embedding, metadata, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, NOW(), NOW()) \
             ON CONFLICT (id) DO UPDATE SET \
                 summary = EXCLUDED.summary, \
                 embedding = EXCLUDED.embedding, \
                 metadata = EXCLUDED.metadata, \
                 updated_at = NOW()",
        )
        .bind(id)
        .bind(summary)
        .bind(embedding)
        .bind(metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| ArgoError::Storage(format!("Failed to upsert document {}: {}", id, e)))?;

        Ok(())
    }

    /// Nearest-neighbor search over the documents table by cosine distance,
    /// returning the top `limit` documents.
    async fn search_docs(
        &self,
        embedding: &pgvector::Vector,
        limit: i64,
    ) -> Result<Vec<DocHit>, ArgoError> {
        let rows = sqlx::query(
            "SELECT id, summary, metadata FROM argo_docs \
             ORDER BY embedding <=> $1 LIMIT $2",
        )
        .bind(embedding)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ArgoError::Storage(format!("Vector search failed: {}", e)))?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            hits.push(DocHit {
                id: row.try_get("id").map_err(|e| ArgoError::Storage(e.to_string()))?,
                summary: row.try_get("summary").map_err(|e| ArgoError::Storage(e.to_string()))?,
                metadata: row.try_get("metadata").map_err(|e| ArgoError::Storage(e.to_string()))?,
            });
        }
        Ok(hits)
    }
}

/// Map a sqlx PgRow to a ProfileRow.
fn row_to_profile(row: &PgRow) -> Result<ProfileRow, ArgoError> {
    Ok(ProfileRow {
        id: row.try_get("id").map_err(|e| ArgoError::Storage(e.to_string()))?,
        platform_id: row.try_get("platform_id").map_err(|e| ArgoError::Storage(e.to_string()))?,
        cycle_number: row.try_get("cycle_number").map_err(|e| ArgoError::Storage(e.to_string()))?,
        observed_at: row.try_get("observed_at").map_err(|e| ArgoError::Storage(e.to_string()))?,
        latitude: row.try_get("latitude").map_err(|e| ArgoError::Storage(e.to_string()))?,
        longitude: row.try_get("longitude").map_err(|e| ArgoError::Storage(e.to_string()))?,
        pressure: row.try_get("pressure").map_err(|e| ArgoError::Storage(e.to_string()))?,
        temperature: row.try_get("temperature").map_err(|e| ArgoError::Storage(e.to_string()))?,
        salinity: row.try_get("salinity").map_err(|e| ArgoError::Storage(e.to_string()))?,
    })
}

/// Convert an arbitrary PgRow to a JSON object, decoding each column by its
/// PostgreSQL type name. Types outside the supported set decode as null.
fn row_to_json(row: &PgRow) -> Result<serde_json::Value, ArgoError> {
    let mut object = serde_json::Map::with_capacity(row.columns().len());

    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let value = match column.type_info().name() {
            "BOOL" => row
                .try_get::<Option<bool>, _>(i)
                .map(|v| serde_json::json!(v)),
            "INT2" => row
                .try_get::<Option<i16>, _>(i)
                .map(|v| serde_json::json!(v)),
            "INT4" => row
                .try_get::<Option<i32>, _>(i)
                .map(|v| serde_json::json!(v)),
            "INT8" => row
                .try_get::<Option<i64>, _>(i)
                .map(|v| serde_json::json!(v)),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(i)
                .map(|v| serde_json::json!(v)),
            "FLOAT8" => row
                .try_get::<Option<f64>, _>(i)
                .map(|v| serde_json::json!(v)),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => row
                .try_get::<Option<String>, _>(i)
                .map(|v| serde_json::json!(v)),
            "TIMESTAMPTZ" => row
                .try_get::<Option<DateTime<Utc>>, _>(i)
                .map(|v| serde_json::json!(v.map(|t| t.to_rfc3339()))),
            "TIMESTAMP" => row
                .try_get::<Option<NaiveDateTime>, _>(i)
                .map(|v| serde_json::json!(v.map(|t| t.to_string()))),
            "DATE" => row
                .try_get::<Option<NaiveDate>, _>(i)
                .map(|v| serde_json::json!(v.map(|d| d.to_string()))),
            "JSON" | "JSONB" => row.try_get::<Option<serde_json::Value>, _>(i).map(
                |v| v.unwrap_or(serde_json::Value::Null),
            ),
            other => {
                tracing::debug!(column = %name, pg_type = %other, "Unsupported column type in raw query, returning null");
                Ok(serde_json::Value::Null)
            }
        }
        .map_err(|e| ArgoError::Storage(format!("Failed to decode column '{}': {}", name, e)))?;

        object.insert(name, value);
    }

    Ok(serde_json::Value::Object(object))
}
