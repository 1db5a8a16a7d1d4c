use crate::AppState;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use nadym_core::statistics::PracticeStatistics;

#[utoipa::path(
    get,
    path = "/api/statistics",
    responses((status = 200, description = "Dashboard figures; zeroes when the data cannot be read", body = PracticeStatistics))
)]
pub async fn dashboard(State(state): State<AppState>) -> Json<PracticeStatistics> {
    Json(state.statistics.dashboard(Utc::now()))
}
