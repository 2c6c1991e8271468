//! Assignment table endpoints

use axum::{
    Json,
    extract::{Path, State},
};

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{AssignmentsResponse, DistributionResponse, HostLoad},
};

/// GET /api/v1/distribution
pub async fn get_distribution(State(state): State<ApiState>) -> Json<DistributionResponse> {
    let hosts = state
        .store
        .distribution()
        .into_iter()
        .map(|(host, configs)| HostLoad { host, configs })
        .collect();

    Json(DistributionResponse { hosts })
}

/// GET /api/v1/assignments/:host
pub async fn get_assignments(
    State(state): State<ApiState>,
    Path(host): Path<String>,
) -> ApiResult<Json<AssignmentsResponse>> {
    let mut configs = state.store.list(&host);
    if configs.is_empty() {
        return Err(ApiError::NotFound(format!("no configs assigned to '{host}'")));
    }
    configs.sort();

    Ok(Json(AssignmentsResponse { host, configs }))
}
