pub mod config;
pub mod embedding;
pub mod errors;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod plan;
pub mod prompts;
pub mod server;
pub mod store;
