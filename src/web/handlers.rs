//! HTTP handlers

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EchoError, Result};
use crate::registry::SessionSnapshot;
use crate::state::AppState;

/// SDP offer request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferRequest {
    #[serde(rename = "type")]
    pub kind: String,
    /// SDP content
    pub sdp: String,
}

/// SDP answer response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResponse {
    #[serde(rename = "type")]
    pub kind: String,
    /// SDP content, candidates included
    pub sdp: String,
}

/// Negotiate one echo session from an SDP offer.
///
/// The body is read raw so a missing or malformed payload maps to 400
/// before any session exists.
pub async fn offer(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<AnswerResponse>> {
    if body.trim().is_empty() {
        return Err(EchoError::InvalidOffer("empty request body".to_string()));
    }
    let request: OfferRequest = serde_json::from_str(&body)
        .map_err(|e| EchoError::InvalidOffer(format!("malformed offer body: {e}")))?;

    debug!(sdp_len = request.sdp.len(), "offer received");
    let answer = state.bridge.negotiate(&request.kind, &request.sdp).await?;

    Ok(Json(AnswerResponse {
        kind: answer.kind.to_string(),
        sdp: answer.sdp,
    }))
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub sessions: usize,
}

/// Health check endpoint
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        sessions: state.registry.count().await,
    })
}

/// List live sessions (diagnostics)
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<SessionSnapshot>> {
    Json(state.registry.list().await)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use super::*;
    use crate::bridge::SignalingBridge;
    use crate::config::EchoConfig;
    use crate::engine::mock::{MockFactory, MockScript, StepOutcome};
    use crate::registry::ConnectionRegistry;

    fn app_state(script: MockScript) -> Arc<AppState> {
        let config = EchoConfig::default();
        let factory = MockFactory::new(script);
        let registry = Arc::new(ConnectionRegistry::new(config.max_sessions));
        let bridge = Arc::new(SignalingBridge::new(
            factory,
            Arc::clone(&registry),
            Duration::from_secs(1),
        ));
        AppState::new(config, registry, bridge)
    }

    const OFFER_BODY: &str = r#"{"type":"offer","sdp":"v=0\r\ns=test offer\r\n"}"#;

    #[tokio::test]
    async fn test_offer_returns_answer() {
        let state = app_state(MockScript::default());

        let Json(answer) = offer(State(Arc::clone(&state)), OFFER_BODY.to_string())
            .await
            .unwrap();
        assert_eq!(answer.kind, "answer");
        assert!(answer.sdp.contains("mock answer"));
        assert_eq!(state.registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_empty_body_is_bad_request() {
        let state = app_state(MockScript::default());

        let err = offer(State(Arc::clone(&state)), String::new())
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
        // No session was created for the rejected request.
        assert_eq!(state.registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let state = app_state(MockScript::default());

        let err = offer(State(Arc::clone(&state)), "not json".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err = offer(
            State(Arc::clone(&state)),
            r#"{"type":"answer","sdp":"v=0"}"#.to_string(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_engine_rejection_is_server_error() {
        let state = app_state(MockScript {
            set_remote: StepOutcome::Fail,
            ..Default::default()
        });

        let err = offer(State(Arc::clone(&state)), OFFER_BODY.to_string())
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
        assert_eq!(state.registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_health_reports_session_count() {
        let state = app_state(MockScript::default());

        let Json(body) = health(State(Arc::clone(&state))).await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.sessions, 0);

        offer(State(Arc::clone(&state)), OFFER_BODY.to_string())
            .await
            .unwrap();
        let Json(body) = health(State(state)).await;
        assert_eq!(body.sessions, 1);
    }

    #[tokio::test]
    async fn test_sessions_listing() {
        let state = app_state(MockScript::default());
        offer(State(Arc::clone(&state)), OFFER_BODY.to_string())
            .await
            .unwrap();

        let Json(sessions) = list_sessions(State(state)).await;
        assert_eq!(sessions.len(), 1);
    }
}
