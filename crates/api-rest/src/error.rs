//! Mapping from domain errors to HTTP responses.

use api_shared::AuthError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use nadym_core::{FieldError, PracticeError};
use serde::Serialize;

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub error: String,
    /// Per-field messages for rejected forms.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

#[derive(Debug)]
pub enum ApiError {
    Practice(PracticeError),
    Auth(AuthError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<PracticeError> for ApiError {
    fn from(err: PracticeError) -> Self {
        ApiError::Practice(err)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

impl From<nadym_core::TextError> for ApiError {
    fn from(err: nadym_core::TextError) -> Self {
        ApiError::Practice(err.into())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(e) if e.is_unauthenticated() => StatusCode::UNAUTHORIZED,
            ApiError::Auth(_) => StatusCode::FORBIDDEN,
            ApiError::Practice(e) => match e {
                PracticeError::NotFound { .. } => StatusCode::NOT_FOUND,
                PracticeError::InvalidInput(_)
                | PracticeError::Validation(_)
                | PracticeError::Uuid(_)
                | PracticeError::Text(_) => StatusCode::BAD_REQUEST,
                PracticeError::Conflict(_) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn body(&self) -> ErrorBody {
        let error = match self {
            ApiError::Practice(PracticeError::Validation(_)) => "validation failed".to_owned(),
            _ if self.status().is_server_error() => "internal server error".to_owned(),
            ApiError::Practice(e) => e.to_string(),
            ApiError::Auth(e) => e.to_string(),
        };
        let fields = match self {
            ApiError::Practice(PracticeError::Validation(fields)) => fields.clone(),
            _ => Vec::new(),
        };
        ErrorBody { error, fields }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Practice(e) if status.is_server_error() => {
                tracing::error!("request failed: {:?}", e);
            }
            ApiError::Practice(e) => tracing::warn!("request rejected ({}): {}", status, e),
            ApiError::Auth(e) => tracing::warn!("request refused ({}): {}", status, e),
        }
        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_shared::Role;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (PracticeError::not_found("patient", "x"), StatusCode::NOT_FOUND),
            (PracticeError::field("email", "invalid"), StatusCode::BAD_REQUEST),
            (PracticeError::InvalidInput("bad".into()), StatusCode::BAD_REQUEST),
            (PracticeError::Conflict("dup".into()), StatusCode::CONFLICT),
            (
                PracticeError::FileRead(std::io::Error::other("disk")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
        assert_eq!(
            ApiError::from(AuthError::MissingRole).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(AuthError::Forbidden { role: Role::Patient }).status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_server_errors_hide_details() {
        let err = ApiError::from(PracticeError::FileRead(std::io::Error::other(
            "/srv/practice_data/patients is unreadable",
        )));
        assert_eq!(err.body().error, "internal server error");
    }

    #[test]
    fn test_validation_lists_fields() {
        let err = ApiError::from(PracticeError::Validation(vec![
            FieldError::new("first_name", "this field is required"),
            FieldError::new("email", "invalid email address"),
        ]));
        let body = err.body();
        assert_eq!(body.error, "validation failed");
        assert_eq!(body.fields.len(), 2);
        assert_eq!(body.fields[1].field, "email");
    }
}
