use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use crmquery_agent::QueryPipeline;
use crmquery_core::{ExecutionResult, ResponseEnvelope};
use serde_json::Value;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

const INDEX_HTML: &str = include_str!("../../../templates/index.html");
const NO_QUERY_MESSAGE: &str = "No query provided";

#[derive(Clone)]
pub struct QueryState {
    pipeline: QueryPipeline,
}

pub fn router(pipeline: QueryPipeline) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/query", post(query))
        .with_state(QueryState { pipeline })
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// `POST /query` with `{"query": "..."}`.
///
/// 400 when no usable query text is present, 500 when orchestration or the
/// nested execution failed, 200 otherwise. Only a 200 carries `queryDetails`
/// and `results`; every failure body is `{"status":"error","message":...}`.
pub async fn query(
    State(state): State<QueryState>,
    body: Bytes,
) -> (StatusCode, Json<ResponseEnvelope>) {
    let correlation_id = Uuid::new_v4().to_string();
    let Some(natural_query) = extract_query(&body) else {
        warn!(
            event_name = "http.query.rejected",
            correlation_id = %correlation_id,
            "request carried no query text"
        );
        return (StatusCode::BAD_REQUEST, Json(ResponseEnvelope::error(NO_QUERY_MESSAGE)));
    };

    let span = info_span!("query_request", correlation_id = %correlation_id);
    let envelope = state.pipeline.process(&natural_query).instrument(span).await;

    let (status, envelope) = http_response(envelope);
    info!(
        event_name = "http.query.completed",
        correlation_id = %correlation_id,
        http_status = status.as_u16(),
        "query request completed"
    );
    (status, Json(envelope))
}

fn http_response(envelope: ResponseEnvelope) -> (StatusCode, ResponseEnvelope) {
    if let Some(ExecutionResult::Error { message }) = &envelope.results {
        return (StatusCode::INTERNAL_SERVER_ERROR, ResponseEnvelope::error(message.clone()));
    }
    let status =
        if envelope.is_error() { StatusCode::INTERNAL_SERVER_ERROR } else { StatusCode::OK };
    (status, envelope)
}

fn extract_query(body: &[u8]) -> Option<String> {
    let payload: Value = serde_json::from_slice(body).ok()?;
    let text = payload.get("query")?.as_str()?.trim();
    (!text.is_empty()).then(|| text.to_string())
}
