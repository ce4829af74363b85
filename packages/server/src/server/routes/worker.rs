use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;

use crate::kernel::jobs::WorkerInvocation;
use crate::server::app::AppState;

#[derive(Debug, Serialize)]
pub struct WorkerAccepted {
    pub accepted: bool,
    pub invocation: WorkerInvocation,
}

/// `POST /worker` - start a worker invocation in the background.
///
/// Used both for the initial kick-off and for continuation calls. The body is
/// optional; missing fields fall back to the worker's configuration.
pub async fn worker_handler(
    Extension(state): Extension<AppState>,
    body: Option<Json<WorkerInvocation>>,
) -> (StatusCode, Json<WorkerAccepted>) {
    let invocation = body.map(|Json(invocation)| invocation).unwrap_or_default();

    let worker = state.worker.clone();
    tokio::spawn(async move {
        match worker.run(invocation).await {
            Ok(report) => tracing::info!(
                claimed = report.claimed,
                completed = report.completed,
                failed = report.failed,
                continued = report.continued,
                "worker invocation finished"
            ),
            Err(e) => tracing::error!(error = %e, "worker invocation aborted"),
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(WorkerAccepted {
            accepted: true,
            invocation,
        }),
    )
}
