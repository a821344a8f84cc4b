//! Response bodies shared by the HTTP handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::control::DispatchOutcome;

/// `{ "data": T }` envelope used by the read endpoints.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

/// Result of a control command.
///
/// Serialises as `{ "status", "message", ...detail }`. A command stored for
/// an offline device answers 202 with status `warning`.
#[derive(Debug, Serialize)]
pub struct CommandResponse<T: Serialize> {
    #[serde(skip)]
    code: StatusCode,
    pub status: &'static str,
    pub message: &'static str,
    #[serde(flatten)]
    pub detail: T,
}

impl<T: Serialize> CommandResponse<T> {
    pub fn new(outcome: DispatchOutcome, message: &'static str, detail: T) -> Self {
        let code = match outcome {
            DispatchOutcome::Delivered => StatusCode::OK,
            DispatchOutcome::Queued => StatusCode::ACCEPTED,
        };
        Self {
            code,
            status: outcome.status(),
            message,
            detail,
        }
    }
}

impl<T: Serialize> IntoResponse for CommandResponse<T> {
    fn into_response(self) -> Response {
        (self.code, Json(&self)).into_response()
    }
}
