use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// A step of the offer/answer sequence, named in `NegotiationFailed` errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationStep {
    SetRemoteDescription,
    CreateAnswer,
    SetLocalDescription,
    GatherCandidates,
}

impl std::fmt::Display for NegotiationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NegotiationStep::SetRemoteDescription => write!(f, "SetRemoteDescription"),
            NegotiationStep::CreateAnswer => write!(f, "CreateAnswer"),
            NegotiationStep::SetLocalDescription => write!(f, "SetLocalDescription"),
            NegotiationStep::GatherCandidates => write!(f, "GatherCandidates"),
        }
    }
}

/// Application-wide error type
#[derive(Error, Debug)]
pub enum EchoError {
    #[error("Invalid offer: {0}")]
    InvalidOffer(String),

    #[error("Negotiation failed at {step}: {reason}")]
    NegotiationFailed {
        step: NegotiationStep,
        reason: String,
    },

    #[error("Negotiation timed out after {0:?}")]
    NegotiationTimeout(Duration),

    #[error("Negotiation engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Session limit reached ({0} active)")]
    SessionLimit(usize),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EchoError {
    fn status_code(&self) -> StatusCode {
        match self {
            EchoError::InvalidOffer(_) => StatusCode::BAD_REQUEST,
            EchoError::NegotiationFailed { .. } => StatusCode::BAD_GATEWAY,
            EchoError::NegotiationTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            EchoError::EngineUnavailable(_) | EchoError::SessionLimit(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            EchoError::Internal(_) | EchoError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for EchoError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        if status.is_client_error() {
            tracing::warn!(status = %status, error = %message, "Request rejected");
        } else {
            tracing::error!(status = %status, error = %message, "Request failed");
        }

        // Errors go out as plain text; only a successful answer is JSON.
        (status, message).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, EchoError>;
