/// Gemini generative-language provider
///
/// Calls the generateContent REST endpoint with a single user turn and joins
/// the text parts of the first candidate. Requires ARGOPIPE_GEMINI__API_KEY.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{GenerativeProvider, LlmError};

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Gemini-backed generative provider.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    /// Create a new GeminiProvider.
    ///
    /// # Errors
    /// Returns `LlmError::NotConfigured` if api_key is empty — a missing key
    /// is a fatal startup condition for the callers.
    pub fn new(api_key: String, model: String, base_url: String) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::NotConfigured(
                "Gemini API key is required. \
                 Set ARGOPIPE_GEMINI__API_KEY or gemini.api_key in argopipe.toml"
                    .to_string(),
            ));
        }

        Ok(GeminiProvider {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url,
        })
    }
}

#[async_trait]
impl GenerativeProvider for GeminiProvider {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Request(format!("HTTP request failed: {}", e)))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(LlmError::Api { status, message: body });
        }

        let reply: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Reply(format!("Failed to parse Gemini response: {}", e)))?;

        let candidate = reply
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Reply("Gemini returned no candidates".to_string()))?;

        let text = candidate
            .content
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(LlmError::Reply("Gemini candidate carried no text parts".to_string()));
        }

        Ok(text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
