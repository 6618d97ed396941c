/// Local embedding provider using fastembed
///
/// Offline embedding generation with all-MiniLM-L6-v2 (384 dimensions).
/// Model weights are downloaded on first use and cached locally; after that
/// no network calls are needed. fastembed is synchronous and CPU-bound, so
/// all inference runs under spawn_blocking.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::task;

use super::{EmbeddingError, EmbeddingProvider};

/// Local embedding provider backed by fastembed.
pub struct LocalEmbeddingProvider {
    // TextEmbedding::embed takes &mut self; the Mutex serializes inference
    // calls across blocking tasks.
    model: Arc<Mutex<TextEmbedding>>,
    name: String,
    dim: usize,
}

impl LocalEmbeddingProvider {
    /// Create a new LocalEmbeddingProvider, downloading model weights into
    /// `cache_dir` if they are not already cached.
    pub async fn new(cache_dir: &str) -> Result<Self, EmbeddingError> {
        let cache_path = PathBuf::from(cache_dir);

        let model = task::spawn_blocking(move || {
            std::fs::create_dir_all(&cache_path)
                .map_err(|e| EmbeddingError::ModelInit(format!("Failed to create cache dir: {}", e)))?;

            TextEmbedding::try_new(
                InitOptions::new(EmbeddingModel::AllMiniLML6V2)
                    .with_cache_dir(cache_path)
                    .with_show_download_progress(false),
            )
            .map_err(|e| EmbeddingError::ModelInit(format!("Failed to initialize fastembed: {}", e)))
        })
        .await
        .map_err(|e| EmbeddingError::ModelInit(e.to_string()))??;

        Ok(LocalEmbeddingProvider {
            model: Arc::new(Mutex::new(model)),
            name: "all-MiniLM-L6-v2".to_string(),
            dim: 384,
        })
    }

    async fn run_inference(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let model = Arc::clone(&self.model);
        task::spawn_blocking(move || {
            let mut guard = model
                .lock()
                .map_err(|e| EmbeddingError::Generation(format!("Embedding model lock poisoned: {}", e)))?;
            guard
                .embed(texts, None)
                .map_err(|e| EmbeddingError::Generation(e.to_string()))
        })
        .await
        .map_err(|e| EmbeddingError::Generation(e.to_string()))?
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.run_inference(vec![text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Generation("fastembed returned no vector".to_string()))
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();
        let vectors = self.run_inference(texts).await?;
        if vectors.len() != expected {
            return Err(EmbeddingError::Generation(format!(
                "fastembed returned {} vectors for {} inputs",
                vectors.len(),
                expected
            )));
        }
        Ok(vectors)
    }

    fn model_name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}
