use std::sync::Arc;

use axum::{
    extract::rejection::JsonRejection,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use botkeeper_core::{BotkeeperError, BotkeeperResult, CommandError};
use botkeeper_commands::{Command, CommandBus, CommandContext, CommandSource};

use crate::problem::ProblemDocument;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Debug, Deserialize)]
struct CommandRequest {
    name: String,
    #[serde(default)]
    args: Vec<String>,
}

/// Router for the HTTP command source: a single POST endpoint that feeds the
/// dispatch pipeline and echoes the correlation id on every response.
pub fn command_router(bus: Arc<CommandBus>) -> Router {
    Router::new()
        .route("/command", post(dispatch_command))
        .with_state(bus)
}

/// Binds the listener and serves the command endpoint until the token fires.
pub async fn serve_http(
    bind_address: &str,
    bus: Arc<CommandBus>,
    cancel: CancellationToken,
) -> BotkeeperResult<()> {
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .map_err(|e| {
            BotkeeperError::config_error(format!("Cannot bind HTTP source to {bind_address}: {e}"))
        })?;
    info!("HTTP command source listening on {bind_address}");

    axum::serve(listener, command_router(bus))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| BotkeeperError::Internal(format!("HTTP source failed: {e}")))
}

async fn dispatch_command(
    State(bus): State<Arc<CommandBus>>,
    headers: HeaderMap,
    payload: Result<Json<CommandRequest>, JsonRejection>,
) -> Response {
    let correlation_id = headers
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut response = match payload {
        Ok(Json(request)) => {
            let token = bearer_token(&headers);
            let command = Command::new(request.name, request.args, CommandSource::Http, "http");
            let ctx = CommandContext::new(command, token, correlation_id.clone());

            match bus.dispatch(&ctx).await {
                Ok(Some(value)) => (StatusCode::OK, Json(value)).into_response(),
                Ok(None) => StatusCode::ACCEPTED.into_response(),
                Err(e) => problem_response(&e, &correlation_id),
            }
        }
        // a body the extractor cannot parse still gets a problem document
        // and the correlation echo
        Err(rejection) => {
            let error = BotkeeperError::Command(CommandError::invalid(format!(
                "Request body is not a valid command: {rejection}"
            )));
            problem_response(&error, &correlation_id)
        }
    };

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

fn problem_response(error: &BotkeeperError, correlation_id: &str) -> Response {
    let problem = ProblemDocument::from_error(error, correlation_id);
    let status =
        StatusCode::from_u16(problem.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(problem)).into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use botkeeper_commands::{handlers, CommandAuthorizer, CommandRateLimiter, CommandRegistry};
    use botkeeper_core::StorageKind;
    use botkeeper_datastore::{DataAccess, MemoryStore};
    use botkeeper_engine::BotEngine;

    fn bus_with(tokens: HashMap<CommandSource, String>) -> Arc<CommandBus> {
        let data = DataAccess::new(Arc::new(MemoryStore::new()), None, StorageKind::InMemory);
        let engine = Arc::new(BotEngine::new(data, CancellationToken::new()));
        let registry: CommandRegistry =
            handlers::standard_registry(engine, CancellationToken::new());
        Arc::new(CommandBus::new(
            Arc::new(registry),
            CommandAuthorizer::new(tokens),
            CommandRateLimiter::new(5, Duration::from_millis(500)),
        ))
    }

    fn post(body: Value, extra_headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/command")
            .header("content-type", "application/json");
        for (name, value) in extra_headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_full_report_returns_200_with_json() {
        let app = command_router(bus_with(HashMap::new()));
        let response = app
            .oneshot(post(json!({ "name": "full-report" }), &[]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(CORRELATION_HEADER));
        assert_eq!(body_json(response).await, json!([]));
    }

    #[tokio::test]
    async fn test_no_content_result_returns_202() {
        let app = command_router(bus_with(HashMap::new()));
        let response = app
            .oneshot(post(json!({ "name": "shutdown" }), &[]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(response.headers().contains_key(CORRELATION_HEADER));
    }

    #[tokio::test]
    async fn test_unknown_command_renders_problem_document() {
        let app = command_router(bus_with(HashMap::new()));
        let response = app
            .oneshot(post(
                json!({ "name": "bogus" }),
                &[(CORRELATION_HEADER, "corr-42")],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(CORRELATION_HEADER).unwrap(),
            "corr-42"
        );
        let problem = body_json(response).await;
        assert_eq!(
            problem["type"],
            crate::problem::problem_type::INVALID_COMMAND
        );
        assert_eq!(problem["correlation_id"], "corr-42");
    }

    #[tokio::test]
    async fn test_missing_bearer_token_is_unauthorized() {
        let mut tokens = HashMap::new();
        tokens.insert(CommandSource::Http, "secret".to_string());
        let app = command_router(bus_with(tokens));

        let response = app
            .oneshot(post(json!({ "name": "full-report" }), &[]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let problem = body_json(response).await;
        assert_eq!(problem["type"], crate::problem::problem_type::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_bearer_token_is_accepted() {
        let mut tokens = HashMap::new();
        tokens.insert(CommandSource::Http, "secret".to_string());
        let app = command_router(bus_with(tokens));

        let response = app
            .oneshot(post(
                json!({ "name": "full-report" }),
                &[("authorization", "Bearer secret")],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_malformed_body_gets_problem_and_correlation_echo() {
        let app = command_router(bus_with(HashMap::new()));
        let request = Request::builder()
            .method("POST")
            .uri("/command")
            .header("content-type", "application/json")
            .header(CORRELATION_HEADER, "corr-7")
            .body(Body::from("{not json"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(CORRELATION_HEADER).unwrap(),
            "corr-7"
        );
        let problem = body_json(response).await;
        assert_eq!(
            problem["type"],
            crate::problem::problem_type::INVALID_COMMAND
        );
        assert_eq!(problem["correlation_id"], "corr-7");
    }

    #[tokio::test]
    async fn test_correlation_id_is_generated_when_absent() {
        let app = command_router(bus_with(HashMap::new()));
        let response = app
            .oneshot(post(json!({ "name": "full-report" }), &[]))
            .await
            .unwrap();

        let header = response
            .headers()
            .get(CORRELATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(!header.is_empty());
    }
}
