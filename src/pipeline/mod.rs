/// Summarization & indexing pipeline
///
/// Walks the profile table in pages (newest observations first), asks the
/// language model for a structured summary of every row, embeds the summary
/// texts, and upserts them into the vector documents table keyed by row id.
/// Progress is checkpointed per page so a failed run resumes at the failed
/// page.
///
/// Recovery semantics are at-least-once: a crash between upsert and
/// checkpoint reprocesses one page, which the keyed upsert absorbs. A single
/// row's bad model reply never aborts its page — the row is indexed with a
/// placeholder summary instead. A page-level failure (database, embedding)
/// stops the run.

pub mod checkpoint;

use std::path::PathBuf;
use std::sync::Arc;

use indicatif::ProgressBar;
use serde::Deserialize;

use crate::embedding::EmbeddingProvider;
use crate::errors::ArgoError;
use crate::llm::{strip_code_fences, strip_null_bytes, GenerativeProvider};
use crate::prompts::build_summary_prompt;
use crate::store::{ProfileRow, ProfileStore};

/// The structured envelope the summary prompt asks the model to emit.
///
/// Field types are deliberately loose (the model occasionally emits numbers
/// where strings were asked for); only `summary` is load-bearing, the rest
/// is logged at debug level.
#[derive(Debug, Deserialize)]
pub struct SummaryEnvelope {
    #[serde(default)]
    pub platform_id: serde_json::Value,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub time_range: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub oceanographic_features: serde_json::Value,
}

/// Sequential page-by-page summarization and indexing driver.
pub struct IndexingPipeline {
    store: Arc<dyn ProfileStore>,
    llm: Arc<dyn GenerativeProvider>,
    embedder: Arc<dyn EmbeddingProvider>,
    page_size: i64,
    checkpoint_path: PathBuf,
}

impl IndexingPipeline {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        llm: Arc<dyn GenerativeProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        page_size: i64,
        checkpoint_path: PathBuf,
    ) -> Self {
        IndexingPipeline {
            store,
            llm,
            embedder,
            page_size: page_size.max(1),
            checkpoint_path,
        }
    }

    /// Run the pipeline from the checkpointed resume point to the last page.
    ///
    /// Stops (returning the error) on the first page-level failure; the
    /// checkpoint is not advanced past the failed page, so the next run
    /// retries it.
    pub async fn run(&self) -> Result<(), ArgoError> {
        let total_rows = self.store.count_profiles().await?;
        if total_rows == 0 {
            tracing::info!("Profile table is empty, nothing to process");
            return Ok(());
        }

        let total = total_pages(total_rows, self.page_size);
        let start = match checkpoint::load(&self.checkpoint_path) {
            Some(last_completed) => {
                tracing::info!(last_completed, "Resuming from checkpoint");
                i64::from(last_completed) + 1
            }
            None => 1,
        };

        if start > total {
            tracing::info!(total_pages = total, "All pages already processed");
            return Ok(());
        }

        tracing::info!(
            rows = total_rows,
            total_pages = total,
            start_page = start,
            page_size = self.page_size,
            model = %self.llm.model_name(),
            "Starting summarization pipeline"
        );

        let progress = ProgressBar::new((total - start + 1) as u64);

        for page in start..=total {
            if let Err(e) = self.process_page(page).await {
                progress.abandon();
                tracing::error!(
                    page,
                    error = %e,
                    "Page failed, stopping run; rerun to resume from this page"
                );
                return Err(e);
            }

            checkpoint::store(&self.checkpoint_path, checkpoint_page(page)?)?;
            tracing::info!(page, "Page completed and checkpointed");
            progress.inc(1);
        }

        progress.finish();
        tracing::info!(total_pages = total, "All pages processed");
        Ok(())
    }

    /// Summarize, embed, and index one page. Any error here is page-fatal.
    async fn process_page(&self, page: i64) -> Result<(), ArgoError> {
        let rows = self.store.fetch_page(page, self.page_size).await?;
        if rows.is_empty() {
            tracing::info!(page, "Page came back empty, nothing to index");
            return Ok(());
        }
        tracing::debug!(page, rows = rows.len(), "Fetched page");

        let mut summaries = Vec::with_capacity(rows.len());
        for row in &rows {
            summaries.push(self.summarize_row(row).await);
        }

        let vectors = self.embedder.embed_batch(summaries.clone()).await?;

        for ((row, summary), vector) in rows.iter().zip(&summaries).zip(vectors) {
            let metadata = serde_json::to_value(row)
                .map_err(|e| ArgoError::Internal(format!("Failed to serialize row {}: {}", row.id, e)))?;
            let embedding = pgvector::Vector::from(vector);
            self.store
                .upsert_doc(&row.id.to_string(), summary, &embedding, &metadata)
                .await?;
        }

        Ok(())
    }

    /// Produce the summary text for one row. Never fails: model or parse
    /// trouble is logged and replaced with the placeholder so the rest of
    /// the page proceeds.
    async fn summarize_row(&self, row: &ProfileRow) -> String {
        let record_json = match serde_json::to_string(row) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(row_id = row.id, error = %e, "Could not serialize row for summary");
                return placeholder_summary(row.id);
            }
        };

        let prompt = build_summary_prompt(&record_json);
        let reply = match self.llm.generate(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(row_id = row.id, error = %e, "Summary generation failed");
                return placeholder_summary(row.id);
            }
        };

        match parse_summary_reply(&reply) {
            Some(envelope) => {
                tracing::debug!(
                    row_id = row.id,
                    region = envelope.region.as_deref().unwrap_or("unknown"),
                    time_range = envelope.time_range.as_deref().unwrap_or("unknown"),
                    "Parsed summary envelope"
                );
                match envelope.summary {
                    Some(summary) if !summary.trim().is_empty() => strip_null_bytes(&summary),
                    _ => {
                        tracing::warn!(row_id = row.id, "Model reply had no summary field");
                        placeholder_summary(row.id)
                    }
                }
            }
            None => {
                tracing::warn!(row_id = row.id, "Model reply was not a valid summary envelope");
                placeholder_summary(row.id)
            }
        }
    }
}

/// Parse a sanitized model reply into the summary envelope.
pub fn parse_summary_reply(reply: &str) -> Option<SummaryEnvelope> {
    let cleaned = strip_code_fences(&strip_null_bytes(reply));
    serde_json::from_str(&cleaned).ok()
}

/// Placeholder stored when a row's summary could not be generated.
pub fn placeholder_summary(row_id: i64) -> String {
    format!("Documentation failed for record {}.", row_id)
}

/// Page count for a table of `total_rows` rows at `page_size` rows per page.
pub fn total_pages(total_rows: i64, page_size: i64) -> i64 {
    (total_rows + page_size - 1) / page_size
}

/// Narrow a page number to the checkpoint file's integer range.
fn checkpoint_page(page: i64) -> Result<u32, ArgoError> {
    u32::try_from(page)
        .map_err(|_| ArgoError::Internal(format!("Page number {} does not fit the checkpoint format", page)))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::embedding::EmbeddingError;
    use crate::llm::LlmError;
    use crate::store::{DocHit, NewProfile, TrajectoryPoint};

    /// Provider returning the same canned reply for every prompt.
    struct ScriptedLlm(String);

    #[async_trait]
    impl GenerativeProvider for ScriptedLlm {
        async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
            Ok(self.0.clone())
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![0.0; 4])
        }

        async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|_| vec![0.0; 4]).collect())
        }

        fn model_name(&self) -> &str {
            "fixed"
        }

        fn dimension(&self) -> usize {
            4
        }
    }

    /// In-memory store: pages over a fixed row list, records fetches and
    /// upserts, and can be told to fail one page's fetch.
    #[derive(Default)]
    struct MemoryStore {
        rows: Vec<ProfileRow>,
        failing_page: Mutex<Option<i64>>,
        fetched_pages: Mutex<Vec<i64>>,
        upserts: Mutex<Vec<(String, String)>>,
    }

    impl MemoryStore {
        fn with_rows(rows: Vec<ProfileRow>) -> Self {
            MemoryStore {
                rows,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl ProfileStore for MemoryStore {
        async fn insert_profile(&self, _input: &NewProfile) -> Result<i64, ArgoError> {
            Ok(0)
        }

        async fn count_profiles(&self) -> Result<i64, ArgoError> {
            Ok(self.rows.len() as i64)
        }

        async fn fetch_page(&self, page: i64, page_size: i64) -> Result<Vec<ProfileRow>, ArgoError> {
            if *self.failing_page.lock().unwrap() == Some(page) {
                return Err(ArgoError::Storage(format!("simulated failure on page {}", page)));
            }
            self.fetched_pages.lock().unwrap().push(page);
            let start = ((page - 1) * page_size) as usize;
            let end = (start + page_size as usize).min(self.rows.len());
            Ok(self.rows.get(start..end).unwrap_or(&[]).to_vec())
        }

        async fn trajectory_points(&self) -> Result<Vec<TrajectoryPoint>, ArgoError> {
            Ok(Vec::new())
        }

        async fn raw_query(&self, _sql: &str) -> Result<Vec<serde_json::Value>, ArgoError> {
            Ok(Vec::new())
        }

        async fn upsert_doc(
            &self,
            id: &str,
            summary: &str,
            _embedding: &pgvector::Vector,
            _metadata: &serde_json::Value,
        ) -> Result<(), ArgoError> {
            self.upserts.lock().unwrap().push((id.to_string(), summary.to_string()));
            Ok(())
        }

        async fn search_docs(
            &self,
            _embedding: &pgvector::Vector,
            _limit: i64,
        ) -> Result<Vec<DocHit>, ArgoError> {
            Ok(Vec::new())
        }
    }

    fn row(id: i64) -> ProfileRow {
        ProfileRow {
            id,
            platform_id: "2902746".to_string(),
            cycle_number: id as i32,
            observed_at: DateTime::<Utc>::from_timestamp(1_520_000_000 + id, 0).unwrap(),
            latitude: 10.0,
            longitude: 65.0,
            pressure: Some(10.0),
            temperature: Some(27.0),
            salinity: Some(35.0),
        }
    }

    fn pipeline_over(
        store: Arc<MemoryStore>,
        reply: &str,
        page_size: i64,
        checkpoint_path: PathBuf,
    ) -> IndexingPipeline {
        IndexingPipeline::new(
            store,
            Arc::new(ScriptedLlm(reply.to_string())),
            Arc::new(FixedEmbedder),
            page_size,
            checkpoint_path,
        )
    }

    #[tokio::test]
    async fn bad_model_reply_indexes_placeholder_instead_of_aborting() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::with_rows(vec![row(1), row(2)]));
        let pipeline = pipeline_over(
            Arc::clone(&store),
            "I am unable to produce JSON today.",
            100,
            dir.path().join("progress.log"),
        );

        pipeline.run().await.unwrap();

        let upserts = store.upserts.lock().unwrap();
        assert_eq!(upserts.len(), 2);
        assert_eq!(upserts[0], ("1".to_string(), placeholder_summary(1)));
        assert_eq!(upserts[1], ("2".to_string(), placeholder_summary(2)));
    }

    #[tokio::test]
    async fn valid_reply_summary_is_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::with_rows(vec![row(1)]));
        let pipeline = pipeline_over(
            Arc::clone(&store),
            r#"{"summary": "Float 2902746 sampled warm surface water."}"#,
            100,
            dir.path().join("progress.log"),
        );

        pipeline.run().await.unwrap();

        let upserts = store.upserts.lock().unwrap();
        assert_eq!(
            upserts[0],
            (
                "1".to_string(),
                "Float 2902746 sampled warm surface water.".to_string()
            )
        );
    }

    #[tokio::test]
    async fn failed_page_is_retried_on_the_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.log");
        let reply = r#"{"summary": "fine"}"#;

        let store = Arc::new(MemoryStore::with_rows(vec![row(1), row(2), row(3)]));
        *store.failing_page.lock().unwrap() = Some(2);

        let pipeline = pipeline_over(Arc::clone(&store), reply, 1, path.clone());
        assert!(pipeline.run().await.is_err());
        // Page 1 completed; the failed page 2 was not checkpointed.
        assert_eq!(checkpoint::load(&path), Some(1));

        *store.failing_page.lock().unwrap() = None;
        store.fetched_pages.lock().unwrap().clear();

        let pipeline = pipeline_over(Arc::clone(&store), reply, 1, path.clone());
        pipeline.run().await.unwrap();

        // The second run resumed at the failed page, never refetching page 1.
        assert_eq!(*store.fetched_pages.lock().unwrap(), vec![2, 3]);
        assert_eq!(checkpoint::load(&path), Some(3));
    }

    #[test]
    fn page_math_rounds_up() {
        assert_eq!(total_pages(1, 100), 1);
        assert_eq!(total_pages(100, 100), 1);
        assert_eq!(total_pages(101, 100), 2);
        assert_eq!(total_pages(250, 100), 3);
    }

    #[test]
    fn page_numbers_outside_checkpoint_range_error() {
        assert_eq!(checkpoint_page(5).unwrap(), 5);
        assert!(checkpoint_page(i64::from(u32::MAX) + 1).is_err());
    }

    #[test]
    fn parses_full_envelope() {
        let reply = r#"```json
        {
          "platform_id": "2902746",
          "region": "Arabian Sea",
          "time_range": "2018-03-01 to 2018-03-01",
          "summary": "Float 2902746 sampled warm, saline surface water.",
          "oceanographic_features": {
            "max_temperature_celsius": 28.4,
            "min_salinity_psu": 35.1,
            "significant_anomalies": "normal conditions"
          }
        }
        ```"#;
        let envelope = parse_summary_reply(reply).unwrap();
        assert_eq!(envelope.region.as_deref(), Some("Arabian Sea"));
        assert_eq!(
            envelope.summary.as_deref(),
            Some("Float 2902746 sampled warm, saline surface water.")
        );
    }

    #[test]
    fn envelope_tolerates_missing_fields() {
        let envelope = parse_summary_reply(r#"{"summary": "short"}"#).unwrap();
        assert_eq!(envelope.summary.as_deref(), Some("short"));
        assert!(envelope.region.is_none());
    }

    #[test]
    fn prose_reply_is_rejected() {
        assert!(parse_summary_reply("The float drifted west.").is_none());
    }

    #[test]
    fn placeholder_names_the_record() {
        assert_eq!(placeholder_summary(42), "Documentation failed for record 42.");
    }
}
