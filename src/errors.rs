/// Domain-specific error types for argopipe
///
/// One crate-level enum with per-subsystem variants; subsystem error enums
/// (LlmError, EmbeddingError, PlanError) convert into it at the boundaries
/// where they cross into shared code.

#[derive(Debug, thiserror::Error)]
pub enum ArgoError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Ingest error: {0}")]
    Ingest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for ArgoError {
    fn from(e: sqlx::Error) -> Self {
        ArgoError::Storage(e.to_string())
    }
}

impl From<crate::embedding::EmbeddingError> for ArgoError {
    fn from(e: crate::embedding::EmbeddingError) -> Self {
        ArgoError::Internal(e.to_string())
    }
}

impl From<crate::llm::LlmError> for ArgoError {
    fn from(e: crate::llm::LlmError) -> Self {
        ArgoError::Internal(e.to_string())
    }
}
