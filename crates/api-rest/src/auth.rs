//! API key middleware and the caller-role extractor.

use crate::error::ApiError;
use crate::AppState;
use api_shared::auth::{parse_role, require_role, validate_api_key, API_KEY_HEADER, ROLE_HEADER};
use api_shared::Role;
use axum::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;

pub const STAFF: &[Role] = &[Role::Doctor, Role::Nurse];
pub const DOCTORS: &[Role] = &[Role::Doctor];
pub const CARE_TEAM_AND_PATIENT: &[Role] = &[Role::Doctor, Role::Nurse, Role::Patient];
pub const DOCTOR_OR_PATIENT: &[Role] = &[Role::Doctor, Role::Patient];
pub const PATIENT_OR_NURSE: &[Role] = &[Role::Patient, Role::Nurse];
pub const PATIENTS: &[Role] = &[Role::Patient];

/// Rejects `/api` requests without the configured `x-api-key`.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    validate_api_key(state.api_key.as_deref(), provided)?;
    Ok(next.run(request).await)
}

/// Role of the caller, read from `x-user-role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub Role);

impl Caller {
    pub fn require(&self, allowed: &[Role]) -> Result<(), ApiError> {
        require_role(self.0, allowed)?;
        Ok(())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(ROLE_HEADER)
            .and_then(|v| v.to_str().ok());
        Ok(Caller(parse_role(header)?))
    }
}
