//! Route handlers, one module per feature.

pub mod appointments;
pub mod dcc;
pub mod observance;
pub mod patients;
pub mod prescriptions;
pub mod rcp;
pub mod statistics;
pub mod teleexpertise;
pub mod telemedicine;
pub mod transcription;

use crate::error::ApiError;
use nadym_core::{PageRequest, PracticeError, RecordId};
use serde::{Deserialize, Serialize};

/// `page` (zero based) and `size` query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageParams {
    pub page: Option<usize>,
    pub size: Option<usize>,
}

impl From<PageParams> for PageRequest {
    fn from(p: PageParams) -> Self {
        PageRequest::new(p.page, p.size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CountRes {
    pub count: usize,
}

/// Parses a record identifier taken from the path.
pub(crate) fn record_id(raw: &str) -> Result<RecordId, ApiError> {
    RecordId::parse(raw).map_err(|e| PracticeError::from(e).into())
}
