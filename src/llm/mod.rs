/// Generative-language provider trait and reply sanitizers
///
/// One trait seam over the external LLM: the pipeline asks it for per-row
/// summaries, the query service for retrieval plans and answer synthesis.
/// Replies come back as free text and are sanitized here before any parsing.

pub mod gemini;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur when calling the generative-language API.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Request construction or transport failure
    #[error("LLM request error: {0}")]
    Request(String),

    /// API returned an HTTP error
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Reply arrived but carried no usable text
    #[error("LLM reply error: {0}")]
    Reply(String),

    /// Provider not configured (e.g., missing API key)
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// Core trait for free-text generation against an external language model.
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    /// Send a prompt and return the model's text reply.
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;

    /// Return the model name identifier used by this provider.
    fn model_name(&self) -> &str;
}

/// Strip markdown code-fence markers from a model reply.
///
/// Models regularly wrap JSON output in ```json ... ``` fences even when told
/// not to; parsing happens on the fence-free body.
pub fn strip_code_fences(text: &str) -> String {
    text.trim()
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Remove NUL characters from a model reply.
///
/// NUL bytes are unsafe downstream (PostgreSQL TEXT rejects them and they
/// corrupt JSON encodings), so every reply is cleaned before further use.
pub fn strip_null_bytes(text: &str) -> String {
    text.replace('\0', "")
}
