//! Wire types of the control API.
//!
//! Every response, success or failure, is wrapped in an [`Envelope`]:
//!
//! ```json
//! {"result": {...}, "status": "OK", "status-code": 200, "type": "sync"}
//! ```
//!
//! Failures carry an [`ErrorResult`] as their `result`.

use hyper::StatusCode;
use serde::{Deserialize, Serialize};

/// Configuration resource path.
pub const CONFIGURATION_PATH: &str = "/v1/configuration";
/// Status resource path.
pub const STATUS_PATH: &str = "/v1/status";

/// The only action `POST /v1/status` accepts.
pub const ACTION_RESTART_AP: &str = "restart-ap";
/// `kind` of every error result.
pub const ERROR_KIND_INTERNAL: &str = "internal-error";

/// Whether an envelope reports a completed request or a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Sync,
    Error,
}

/// Response wrapper shared by all endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T = serde_json::Value> {
    pub result: T,
    pub status: String,
    #[serde(rename = "status-code")]
    pub status_code: u16,
    #[serde(rename = "type")]
    pub kind: ResponseType,
}

impl<T> Envelope<T> {
    /// A `200 OK` envelope around `result`.
    pub fn sync(result: T) -> Self {
        Self::with_status(StatusCode::OK, ResponseType::Sync, result)
    }

    fn with_status(code: StatusCode, kind: ResponseType, result: T) -> Self {
        Self {
            result,
            status: code.canonical_reason().unwrap_or_default().to_string(),
            status_code: code.as_u16(),
            kind,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == ResponseType::Error
    }
}

impl Envelope<ErrorResult> {
    /// An error envelope carrying `message`.
    pub fn error(code: StatusCode, message: impl Into<String>) -> Self {
        Self::with_status(
            code,
            ResponseType::Error,
            ErrorResult {
                message: message.into(),
                kind: ERROR_KIND_INTERNAL.to_string(),
            },
        )
    }
}

/// The `result` of a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResult {
    pub message: String,
    pub kind: String,
}

/// An empty `{}` result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyResult {}

/// `GET /v1/status` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResult {
    #[serde(rename = "ap.active")]
    pub ap_active: bool,
}

/// `POST /v1/status` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusAction {
    pub action: String,
}

impl StatusAction {
    pub fn restart_ap() -> Self {
        Self {
            action: ACTION_RESTART_AP.to_string(),
        }
    }
}
