// HTTP routes
pub mod health;
pub mod runs;
pub mod worker;

pub use health::*;
pub use runs::*;
pub use worker::*;

use axum::{http::StatusCode, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorBody>);

pub(crate) fn api_error(status: StatusCode, error: impl std::fmt::Display) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
        }),
    )
}
