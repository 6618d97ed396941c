/// Profile store trait and row types
///
/// Row types shared by the ingestor, the summarization pipeline, and the
/// query service, plus the `ProfileStore` trait they all consume. The one
/// production implementation is PostgresProfileStore; the vector documents
/// live in the same database (pgvector column).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ArgoError;

pub mod postgres;

/// A stored ARGO profile row: one measurement cycle of one float, with the
/// per-cycle scalar means computed at ingest time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRow {
    /// Auto-assigned relational id (BIGSERIAL)
    pub id: i64,
    /// Float identifier (fixed-width string in the source files)
    pub platform_id: String,
    pub cycle_number: i32,
    /// Observation timestamp decoded from JULD
    pub observed_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    /// Mean of the valid pressure measurements, None when the whole profile is fill
    pub pressure: Option<f64>,
    pub temperature: Option<f64>,
    pub salinity: Option<f64>,
}

/// Input type for inserting a profile row. The store assigns the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProfile {
    pub platform_id: String,
    pub cycle_number: i32,
    pub observed_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub pressure: Option<f64>,
    pub temperature: Option<f64>,
    pub salinity: Option<f64>,
}

/// One point of a float's trajectory, in storage order.
#[derive(Debug, Clone)]
pub struct TrajectoryPoint {
    pub platform_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// A vector-search hit from the documents table.
#[derive(Debug, Clone, Serialize)]
pub struct DocHit {
    pub id: String,
    pub summary: String,
    pub metadata: serde_json::Value,
}

/// Persistence seam shared by the ingestor, the pipeline, and the query
/// service. Implementations must be Send + Sync (shared as Arc<dyn
/// ProfileStore> across handlers and tasks).
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Insert one profile row and return its assigned id. Each call commits
    /// independently; no duplicate detection.
    async fn insert_profile(&self, input: &NewProfile) -> Result<i64, ArgoError>;

    /// Count all profile rows.
    async fn count_profiles(&self) -> Result<i64, ArgoError>;

    /// Fetch one 1-based page of profile rows, newest observations first.
    async fn fetch_page(&self, page: i64, page_size: i64) -> Result<Vec<ProfileRow>, ArgoError>;

    /// All trajectory points ordered by (platform_id, observed_at ascending).
    async fn trajectory_points(&self) -> Result<Vec<TrajectoryPoint>, ArgoError>;

    /// Execute a caller-supplied SQL query verbatim, rows as JSON objects.
    async fn raw_query(&self, sql: &str) -> Result<Vec<serde_json::Value>, ArgoError>;

    /// Upsert a summary document with its embedding and row metadata, keyed
    /// by id.
    async fn upsert_doc(
        &self,
        id: &str,
        summary: &str,
        embedding: &pgvector::Vector,
        metadata: &serde_json::Value,
    ) -> Result<(), ArgoError>;

    /// Nearest-neighbor search over the documents table by cosine distance.
    async fn search_docs(
        &self,
        embedding: &pgvector::Vector,
        limit: i64,
    ) -> Result<Vec<DocHit>, ArgoError>;
}
