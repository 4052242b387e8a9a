//! Error types shared by the generator, the session store and the HTTP layer.

use axum::{extract::rejection::JsonRejection, http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Failures of a generation round. The `Display` text is the message shown to the user.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OfferError {
    #[error("AI did not return offers in the expected format.")]
    GenerationFormat,
    #[error("Failed to generate post text. The model may be unavailable or the request was malformed.")]
    GenerationFailure,
    #[error("No image data found in the response.")]
    ImageMissing,
    #[error("Failed to generate an image for one of the offers.")]
    ImageGenerationFailure,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormError {
    #[error("required field `{0}` is empty")]
    MissingField(&'static str),
    #[error("keyword richness must be between 1 and 10, got {0}")]
    RichnessOutOfRange(u8),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("GEMINI_API_KEY environment variable is not set")]
    MissingCredential,
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("offer {0} is not part of this session")]
    UnknownOffer(Uuid),
}

/// Errors returned by the HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("session {0} not found")]
    SessionNotFound(Uuid),
    #[error("offer {0} not found")]
    OfferNotFound(Uuid),
    #[error("a generation round is already running for this session")]
    RoundInProgress,
    #[error(transparent)]
    Json(#[from] JsonRejection),
    #[error(transparent)]
    Form(#[from] FormError),
    #[error(transparent)]
    Offer(#[from] OfferError),
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::UnknownOffer(id) => ApiError::OfferNotFound(id),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::SessionNotFound(_) | ApiError::OfferNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RoundInProgress => StatusCode::CONFLICT,
            ApiError::Json(_) | ApiError::Form(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Offer(_) => StatusCode::BAD_GATEWAY,
        };
        if status.is_server_error() {
            tracing::error!("❌ {}", self);
        } else {
            tracing::info!("Rejected request: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
