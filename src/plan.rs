/// Retrieval plan parsing and validation
///
/// The planning call returns free text that should be a JSON object with one
/// key, "queries": a list of {tool, query} pairs. The external reply is never
/// trusted for shape — it is parsed into a tagged variant per tool, with
/// explicit validation. A reply that is not a JSON object carrying a
/// "queries" list fails the request; an individual entry with an unknown
/// tool tag or a missing query string is logged and skipped.

use serde::Deserialize;
use thiserror::Error;

use crate::llm::{strip_code_fences, strip_null_bytes};

/// Errors that make the whole plan unusable.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The reply was not valid JSON at all
    #[error("Plan reply is not valid JSON: {0}")]
    InvalidJson(String),

    /// The reply parsed but carried no "queries" list
    #[error("Plan reply has no 'queries' list")]
    MissingQueries,
}

/// One validated retrieval action.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedQuery {
    /// SQL to run verbatim against the relational store
    Postgres { query: String },
    /// Text to nearest-neighbor search in the vector collection
    Vector { query: String },
}

/// An ordered list of retrieval actions, produced fresh per request.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalPlan {
    pub queries: Vec<PlannedQuery>,
}

#[derive(Deserialize)]
struct RawEntry {
    tool: String,
    query: String,
}

/// Parse a model reply into a validated RetrievalPlan.
///
/// Sanitizes the reply first (NUL bytes, code fences). Returns an error when
/// the reply is not a JSON object with a "queries" array; skips entries whose
/// tool tag is unknown or whose shape is wrong.
pub fn parse_plan(reply: &str) -> Result<RetrievalPlan, PlanError> {
    let cleaned = strip_code_fences(&strip_null_bytes(reply));

    let value: serde_json::Value =
        serde_json::from_str(&cleaned).map_err(|e| PlanError::InvalidJson(e.to_string()))?;

    let entries = value
        .get("queries")
        .and_then(|q| q.as_array())
        .ok_or(PlanError::MissingQueries)?;

    let mut queries = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let raw: RawEntry = match serde_json::from_value(entry.clone()) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(index = i, error = %e, "Skipping malformed plan entry");
                continue;
            }
        };

        match raw.tool.as_str() {
            "postgres" => queries.push(PlannedQuery::Postgres { query: raw.query }),
            "vector" => queries.push(PlannedQuery::Vector { query: raw.query }),
            other => {
                tracing::warn!(index = i, tool = %other, "Skipping plan entry with unknown tool");
            }
        }
    }

    Ok(RetrievalPlan { queries })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_tool_plan() {
        let reply = r#"{"queries": [
            {"tool": "postgres", "query": "SELECT * FROM argo_profiles LIMIT 5"},
            {"tool": "vector", "query": "floats in the Arabian Sea"}
        ]}"#;
        let plan = parse_plan(reply).unwrap();
        assert_eq!(plan.queries.len(), 2);
        assert_eq!(
            plan.queries[0],
            PlannedQuery::Postgres {
                query: "SELECT * FROM argo_profiles LIMIT 5".to_string()
            }
        );
        assert_eq!(
            plan.queries[1],
            PlannedQuery::Vector {
                query: "floats in the Arabian Sea".to_string()
            }
        );
    }

    #[test]
    fn parses_fenced_plan() {
        let reply = "```json\n{\"queries\": [{\"tool\": \"vector\", \"query\": \"anomalies\"}]}\n```";
        let plan = parse_plan(reply).unwrap();
        assert_eq!(plan.queries.len(), 1);
    }

    #[test]
    fn non_json_reply_is_an_error() {
        let err = parse_plan("I would query the postgres table for you.").unwrap_err();
        assert!(matches!(err, PlanError::InvalidJson(_)));
    }

    #[test]
    fn missing_queries_key_is_an_error() {
        let err = parse_plan(r#"{"plan": []}"#).unwrap_err();
        assert!(matches!(err, PlanError::MissingQueries));
    }

    #[test]
    fn unknown_tool_is_skipped_not_fatal() {
        let reply = r#"{"queries": [
            {"tool": "mongodb", "query": "db.profiles.find()"},
            {"tool": "postgres", "query": "SELECT 1"}
        ]}"#;
        let plan = parse_plan(reply).unwrap();
        assert_eq!(plan.queries.len(), 1);
        assert!(matches!(plan.queries[0], PlannedQuery::Postgres { .. }));
    }

    #[test]
    fn malformed_entry_is_skipped() {
        let reply = r#"{"queries": [{"tool": "postgres"}, {"tool": "vector", "query": "x"}]}"#;
        let plan = parse_plan(reply).unwrap();
        assert_eq!(plan.queries.len(), 1);
    }

    #[test]
    fn null_bytes_are_stripped_before_parsing() {
        let reply = "\0{\"queries\": [{\"tool\": \"postgres\", \"query\": \"SELECT 1\"}]}\0";
        let plan = parse_plan(reply).unwrap();
        assert_eq!(plan.queries.len(), 1);
    }
}
