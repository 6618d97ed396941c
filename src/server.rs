/// HTTP query service
///
/// Two endpoints over the shared stores:
///
/// | Method | Path | Description |
/// |--------|------|-------------|
/// | `GET`  | `/trajectories` | Every float's coordinate trail, in temporal order |
/// | `POST` | `/analyze` | Plan (LLM) → execute (SQL + vector search) → synthesize (LLM) |
///
/// Failures surface as status 500 with `{"detail": <error text>}`; the
/// process itself never crashes on a request. CORS is fully open (any
/// origin, method, header) for browser dashboards.
///
/// All resources (store, LLM provider, embedding provider) are constructed
/// at startup and passed in via AppState — handlers share them read-only and
/// requests do not coordinate.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::embedding::EmbeddingProvider;
use crate::errors::ArgoError;
use crate::llm::{strip_null_bytes, GenerativeProvider, LlmError};
use crate::plan::{parse_plan, PlannedQuery};
use crate::prompts::{build_planning_prompt, build_synthesis_prompt};
use crate::store::{ProfileStore, TrajectoryPoint};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ProfileStore>,
    pub llm: Arc<dyn GenerativeProvider>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    /// Documents returned per vector-search plan step
    pub search_top_k: i64,
}

/// Request body for POST /analyze.
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub query: String,
}

/// Response body for POST /analyze. `data_for_charts` carries only the
/// relational results — vector documents feed the synthesis step but are
/// not echoed to the client.
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub insight_text: String,
    pub data_for_charts: serde_json::Map<String, serde_json::Value>,
}

/// Error type for request handlers: everything maps to status 500 with the
/// error's text under "detail".
pub struct ApiError(String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "detail": self.0 })),
        )
            .into_response()
    }
}

impl From<ArgoError> for ApiError {
    fn from(e: ArgoError) -> Self {
        ApiError(e.to_string())
    }
}

impl From<LlmError> for ApiError {
    fn from(e: LlmError) -> Self {
        ApiError(e.to_string())
    }
}

impl From<crate::embedding::EmbeddingError> for ApiError {
    fn from(e: crate::embedding::EmbeddingError) -> Self {
        ApiError(e.to_string())
    }
}

/// Start the query service on `bind` and serve until the process stops.
pub async fn run_server(state: AppState, bind: &str) -> Result<(), ArgoError> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/trajectories", get(get_trajectories))
        .route("/analyze", post(post_analyze))
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| ArgoError::Internal(format!("Failed to bind {}: {}", bind, e)))?;

    tracing::info!(%bind, "Query service listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| ArgoError::Internal(e.to_string()))
}

/// GET /trajectories — every stored trajectory grouped by float, each as an
/// ordered list of [latitude, longitude] pairs.
async fn get_trajectories(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, Vec<[f64; 2]>>>, ApiError> {
    let points = state.store.trajectory_points().await?;
    Ok(Json(group_trajectories(points)))
}

/// Group trajectory points by platform id, preserving the incoming
/// (temporal) order within each float.
fn group_trajectories(points: Vec<TrajectoryPoint>) -> BTreeMap<String, Vec<[f64; 2]>> {
    let mut trajectories: BTreeMap<String, Vec<[f64; 2]>> = BTreeMap::new();
    for point in points {
        trajectories
            .entry(point.platform_id)
            .or_default()
            .push([point.latitude, point.longitude]);
    }
    trajectories
}

/// POST /analyze — plan a two-tool retrieval with the LLM, execute it, and
/// synthesize a one-paragraph insight from whatever came back.
async fn post_analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    // Step 1: ask the model for a retrieval plan. A reply that is not a
    // valid JSON plan fails the request before any query runs.
    let planning_prompt = build_planning_prompt(&request.query);
    let plan_reply = state.llm.generate(&planning_prompt).await?;
    let plan = parse_plan(&plan_reply).map_err(|e| {
        tracing::warn!(error = %e, "Planning reply rejected");
        ApiError("LLM did not return valid JSON plan.".to_string())
    })?;

    tracing::debug!(steps = plan.queries.len(), "Executing retrieval plan");

    // Step 2: execute the plan in order. A failing step fails the request.
    let mut data_for_charts = serde_json::Map::new();
    let mut retrieved = serde_json::Map::new();

    for step in plan.queries {
        match step {
            PlannedQuery::Postgres { query } => {
                // Model-generated SQL runs verbatim — inherited design; the
                // database role this service connects with must be read-only.
                tracing::debug!(sql = %query, "Running planned SQL");
                let rows = state.store.raw_query(&query).await?;
                data_for_charts.insert(
                    format!("sql_result_{}", data_for_charts.len()),
                    serde_json::Value::Array(rows),
                );
            }
            PlannedQuery::Vector { query } => {
                tracing::debug!(text = %query, "Running planned vector search");
                let embedding = state.embedder.embed(&query).await?;
                let hits = state
                    .store
                    .search_docs(&pgvector::Vector::from(embedding), state.search_top_k)
                    .await?;
                let summaries: Vec<String> = hits.into_iter().map(|h| h.summary).collect();
                retrieved.insert(
                    format!("vector_result_{}", retrieved.len()),
                    serde_json::json!(summaries),
                );
            }
        }
    }

    retrieved.insert(
        "structured_data".to_string(),
        serde_json::Value::Object(data_for_charts.clone()),
    );

    // Step 3: synthesize the answer over everything retrieved.
    let retrieved_json = serde_json::to_string_pretty(&retrieved)
        .map_err(|e| ApiError(format!("Failed to serialize retrieved data: {}", e)))?;
    let synthesis_prompt = build_synthesis_prompt(&request.query, &retrieved_json);
    let insight_reply = state.llm.generate(&synthesis_prompt).await?;
    let insight_text = strip_null_bytes(insight_reply.trim());

    // Step 4: the client gets the insight plus the relational results only.
    Ok(Json(AnalyzeResponse {
        insight_text,
        data_for_charts,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(platform_id: &str, lat: f64, lon: f64) -> TrajectoryPoint {
        TrajectoryPoint {
            platform_id: platform_id.to_string(),
            latitude: lat,
            longitude: lon,
        }
    }

    #[test]
    fn grouping_preserves_temporal_order_within_a_float() {
        // Points arrive ordered by (platform_id, observed_at) — t1 < t2 < t3.
        let points = vec![
            point("2902746", 10.0, 60.0),
            point("2902746", 11.0, 61.0),
            point("2902746", 12.0, 62.0),
            point("59041", -5.0, 80.0),
        ];

        let grouped = group_trajectories(points);
        assert_eq!(
            grouped["2902746"],
            vec![[10.0, 60.0], [11.0, 61.0], [12.0, 62.0]]
        );
        assert_eq!(grouped["59041"], vec![[-5.0, 80.0]]);
    }

    #[test]
    fn analyze_response_shape() {
        let mut data_for_charts = serde_json::Map::new();
        data_for_charts.insert("sql_result_0".to_string(), serde_json::json!([{"id": 1}]));

        let response = AnalyzeResponse {
            insight_text: "Warm surface water near the equator.".to_string(),
            data_for_charts,
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["insight_text"], "Warm surface water near the equator.");
        assert!(json["data_for_charts"].get("sql_result_0").is_some());
        // Vector results never appear in the chart payload.
        assert!(json["data_for_charts"].get("vector_result_0").is_none());
    }
}
