use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::{model::ModelError, store::StoreError};

const NO_IMAGE_UPLOADED: &str = "No image uploaded";

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Model not loaded")]
    ModelUnavailable,
    #[error("Database connection not available")]
    StoreUnavailable,
    #[error("{0}")]
    Validation(String),
    #[error("Uploaded image is too large")]
    PayloadTooLarge,
    #[error(transparent)]
    Decode(#[from] image::ImageError),
    #[error(transparent)]
    Inference(#[from] ModelError),
    #[error(transparent)]
    Persistence(#[from] StoreError),
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn missing_image() -> Self {
        ServiceError::Validation(NO_IMAGE_UPLOADED.to_string())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::ModelUnavailable => "model_unavailable",
            ServiceError::StoreUnavailable => "store_unavailable",
            ServiceError::Validation(_) => "validation",
            ServiceError::PayloadTooLarge => "payload_too_large",
            ServiceError::Decode(_) => "decode",
            ServiceError::Inference(_) => "inference",
            ServiceError::Persistence(_) => "persistence",
            ServiceError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), "Request failed: {}", message);
        } else {
            tracing::warn!(kind = self.kind(), "Rejected request: {}", message);
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_messages_are_preserved() {
        assert_eq!(ServiceError::ModelUnavailable.to_string(), "Model not loaded");
        assert_eq!(
            ServiceError::StoreUnavailable.to_string(),
            "Database connection not available"
        );
        assert_eq!(ServiceError::missing_image().to_string(), "No image uploaded");
    }

    #[test]
    fn only_request_faults_are_client_errors() {
        assert_eq!(ServiceError::missing_image().status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ServiceError::PayloadTooLarge.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ServiceError::ModelUnavailable.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServiceError::Inference(ModelError::NonFinite).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
