use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::converter::ConvertResponse;

pub const NO_SOURCE_MESSAGE: &str = "No ColdFusion code provided";
pub const NO_TARGET_MESSAGE: &str = "No target language specified";

/// Failure of the outbound completion call
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("OpenAI API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed completion response: {0}")]
    Decode(String),

    #[error("completion response contained no choices")]
    EmptyResponse,
}

/// Everything that can end a `/convert` request without a converted result
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("{0}")]
    Unexpected(String),
}

impl ConvertError {
    pub fn no_source() -> Self {
        Self::Validation(NO_SOURCE_MESSAGE.to_string())
    }

    pub fn no_target() -> Self {
        Self::Validation(NO_TARGET_MESSAGE.to_string())
    }
}

impl From<MultipartError> for ConvertError {
    fn from(err: MultipartError) -> Self {
        Self::Unexpected(err.body_text())
    }
}

impl From<std::io::Error> for ConvertError {
    fn from(err: std::io::Error) -> Self {
        Self::Unexpected(err.to_string())
    }
}

// Failures are reported in the body, the status stays 200.
impl IntoResponse for ConvertError {
    fn into_response(self) -> Response {
        match &self {
            Self::Validation(message) => tracing::debug!("Rejected conversion request: {}", message),
            other => error!("Error in convert route: {}", other),
        }
        (StatusCode::OK, Json(ConvertResponse::failure(self.to_string()))).into_response()
    }
}

/// Start-up failures while assembling settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid settings: {0}")]
    Invalid(String),

    #[error("OPENAI_API_KEY not found in environment")]
    MissingApiKey,
}
