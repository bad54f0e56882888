//! Error handling

use axum::{
    response::{Html, IntoResponse, Response},
    http::StatusCode,
    Json,
};
use serde_json::json;

use crate::inference::PipelineError;
use crate::views::{self, ResponseFormat};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    // Request errors
    MethodNotAllowed,
    MissingImageField,
    InvalidImage(String),
    PayloadTooLarge,

    // Pipeline errors
    UploadFailed(String),
    ModelUnavailable(String),
    PredictionFailed(String),

    // Resource errors
    NotFound(String),

    // Validation errors
    ValidationError(String),

    // Database errors
    DatabaseError(String),

    // Generic errors
    InternalError(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MissingImageField
            | AppError::InvalidImage(_)
            | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::UploadFailed(_)
            | AppError::ModelUnavailable(_)
            | AppError::PredictionFailed(_)
            | AppError::DatabaseError(_)
            | AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// User-facing message and optional details
    fn parts(&self) -> (&str, Option<&str>) {
        match self {
            AppError::MethodNotAllowed => ("POST required", None),
            AppError::MissingImageField => ("Missing file field \"image\"", None),
            AppError::InvalidImage(d) => ("Invalid image file", Some(d.as_str())),
            AppError::PayloadTooLarge => ("Upload too large", None),
            AppError::NotFound(msg) => (msg.as_str(), None),
            AppError::UploadFailed(d) => ("Failed to save upload", Some(d.as_str())),
            AppError::ModelUnavailable(d) => ("Model unavailable", Some(d.as_str())),
            AppError::PredictionFailed(d) => ("Prediction failed", Some(d.as_str())),
            AppError::ValidationError(msg) => (msg.as_str(), None),
            AppError::DatabaseError(_) => ("Database error occurred", None),
            AppError::InternalError(_) => ("Internal server error", None),
        }
    }

    fn log(&self) {
        match self {
            AppError::DatabaseError(msg) => tracing::error!("Database error: {}", msg),
            AppError::InternalError(msg) => tracing::error!("Internal error: {}", msg),
            AppError::UploadFailed(msg) => tracing::error!("Failed to save uploaded file: {}", msg),
            AppError::ModelUnavailable(msg) => tracing::error!("Model unavailable: {}", msg),
            AppError::PredictionFailed(msg) => tracing::error!("Prediction failed: {}", msg),
            AppError::InvalidImage(msg) => tracing::warn!("Failed to preprocess image: {}", msg),
            _ => {}
        }
    }

    /// Render as JSON or as a plain HTML error page.
    pub fn respond(self, format: ResponseFormat) -> Response {
        match format {
            ResponseFormat::Json => self.into_response(),
            ResponseFormat::Html => {
                self.log();
                let status = self.status();
                let (message, _) = self.parts();
                (status, Html(views::error_page(status, message))).into_response()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();
        let status = self.status();
        let (message, details) = self.parts();

        let body = match details {
            Some(details) => json!({ "error": message, "details": details }),
            None => json!({ "error": message }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::ImageDecode { .. } => AppError::InvalidImage(err.to_string()),
            PipelineError::ModelUnavailable { .. } | PipelineError::Configuration { .. } => {
                AppError::ModelUnavailable(err.to_string())
            }
            PipelineError::Storage(_) => AppError::UploadFailed(err.to_string()),
            PipelineError::Inference(_) => AppError::PredictionFailed(err.to_string()),
            PipelineError::Persistence(_) => AppError::InternalError(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_pipeline_error_mapping() {
        let decode = PipelineError::ImageDecode { path: PathBuf::from("a.png"), message: "bad".into() };
        assert_eq!(AppError::from(decode).status(), StatusCode::BAD_REQUEST);

        let unavailable = PipelineError::ModelUnavailable { model: "classifier", reason: "missing".into() };
        let err = AppError::from(unavailable);
        assert!(matches!(err, AppError::ModelUnavailable(_)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let inference = PipelineError::inference("boom");
        assert!(matches!(AppError::from(inference), AppError::PredictionFailed(_)));
    }

    #[test]
    fn test_messages() {
        assert_eq!(AppError::MissingImageField.parts().0, "Missing file field \"image\"");
        assert_eq!(AppError::MethodNotAllowed.status(), StatusCode::METHOD_NOT_ALLOWED);
        // Database internals stay out of the response body
        assert_eq!(AppError::DatabaseError("secret".into()).parts(), ("Database error occurred", None));
    }
}
