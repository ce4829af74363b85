use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::{api_error, ApiError};
use crate::domains::analysis::{build_run_report, enqueue_run, RunReport, RunRequest};
use crate::domains::analysis::models::AnalysisRun;
use crate::kernel::jobs::WorkerInvocation;
use crate::server::app::AppState;

/// `POST /runs` - enqueue a run and kick off a worker.
pub async fn create_run_handler(
    Extension(state): Extension<AppState>,
    Json(request): Json<RunRequest>,
) -> Result<(StatusCode, Json<AnalysisRun>), ApiError> {
    if let Err(e) = request.validate() {
        return Err(api_error(StatusCode::BAD_REQUEST, e));
    }

    match enqueue_run(&request, &state.deps, WorkerInvocation::default()).await {
        Ok(run) => Ok((StatusCode::CREATED, Json(run))),
        Err(e) => {
            tracing::error!(error = %e, "failed to start analysis run");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))
        }
    }
}

/// `GET /runs/{id}` - progress counters and result summary.
pub async fn get_run_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunReport>, ApiError> {
    match build_run_report(&state.deps, id).await {
        Ok(Some(report)) => Ok(Json(report)),
        Ok(None) => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("analysis run {} not found", id),
        )),
        Err(e) => {
            tracing::error!(run_id = %id, error = %e, "failed to build run report");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))
        }
    }
}
