//! API error types and JSON error response formatting.
//!
//! Every `ChatError` maps onto one HTTP status so the dashboard can tell
//! validation problems from state conflicts.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use aquamind_chat::ChatError;

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "not_found").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - missing or invalid input.
    BadRequest(String),
    /// 404 Not Found - unknown session or role.
    NotFound(String),
    /// 409 Conflict - turn or voice capture state does not allow the call.
    Conflict(String),
    /// 422 Unprocessable Entity - well-formed but unusable content.
    UnprocessableEntity(String),
    /// 500 Internal Server Error - unexpected server error.
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_code, message) = match self {
            ApiError::BadRequest(msg) => ("bad_request", msg),
            ApiError::NotFound(msg) => ("not_found", msg),
            ApiError::Conflict(msg) => ("conflict", msg),
            ApiError::UnprocessableEntity(msg) => ("unprocessable_entity", msg),
            ApiError::Internal(msg) => ("internal_error", msg),
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        let message = err.to_string();
        match err {
            ChatError::EmptyInput | ChatError::MessageTooLong(_) => ApiError::BadRequest(message),
            ChatError::UnknownRole(_) | ChatError::SessionNotFound(_) => {
                ApiError::NotFound(message)
            }
            ChatError::TurnInProgress
            | ChatError::CaptureAlreadyActive
            | ChatError::CaptureNotActive(_)
            | ChatError::InvalidCaptureTransition { .. } => ApiError::Conflict(message),
            ChatError::NoSpeechDetected | ChatError::InvalidMessage(_) => {
                ApiError::UnprocessableEntity(message)
            }
            _ => {
                tracing::error!(error = %message, "Unexpected chat error");
                ApiError::Internal(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aquamind_chat::{CaptureState, ResponderError};
    use aquamind_core::types::{CaptureId, SessionId};

    #[test]
    fn test_chat_error_status_mapping() {
        let cases = [
            (ChatError::EmptyInput, StatusCode::BAD_REQUEST),
            (ChatError::MessageTooLong(10), StatusCode::BAD_REQUEST),
            (ChatError::UnknownRole("pirate".into()), StatusCode::NOT_FOUND),
            (ChatError::SessionNotFound(SessionId::new()), StatusCode::NOT_FOUND),
            (ChatError::TurnInProgress, StatusCode::CONFLICT),
            (ChatError::CaptureAlreadyActive, StatusCode::CONFLICT),
            (ChatError::CaptureNotActive(CaptureId::new()), StatusCode::CONFLICT),
            (
                ChatError::InvalidCaptureTransition {
                    from: CaptureState::Idle,
                    to: CaptureState::Transcribing,
                },
                StatusCode::CONFLICT,
            ),
            (ChatError::NoSpeechDetected, StatusCode::UNPROCESSABLE_ENTITY),
            (ChatError::InvalidMessage("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (
                ChatError::Responder(ResponderError::NoAnswer),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_into_response_status() {
        let resp = ApiError::Conflict("busy".into()).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }
}
