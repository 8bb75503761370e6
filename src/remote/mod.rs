// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The remote leads API, consumed as a black box.
//!
//! [`LeadsApi`] is the seam the engine talks through; [`HttpLeadsApi`] is
//! the production implementation. Responses are handed back as raw JSON
//! because the server's shapes are not consistent: list payloads may or may
//! not be wrapped, and the status after a PATCH can sit under several
//! different paths (see [`resolve_status`]).

mod http;

pub use http::HttpLeadsApi;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::lead::LeadStatus;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Transport failure: DNS, refused connection, timeout, offline.
    #[error("Network error: {0}")]
    Network(String),
    /// HTTP 401. The session is gone.
    #[error("Session expired or invalid (HTTP 401)")]
    Unauthorized,
    /// Any other 4xx.
    #[error("Request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    /// 5xx.
    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },
    /// 2xx with a body we could not read.
    #[error("Malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// Classify an HTTP status code that is not a success.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => Self::Unauthorized,
            400..=499 => Self::Rejected { status, message },
            _ => Self::Server { status, message },
        }
    }
}

#[async_trait]
pub trait LeadsApi: Send + Sync {
    /// `GET /leads`. Raw records, unwrapped from any envelope.
    async fn list_leads(&self) -> Result<Vec<Value>, ApiError>;

    /// `PATCH /leads/{id}` with `{status}`. Raw response body.
    async fn patch_status(&self, id: &str, status: LeadStatus) -> Result<Value, ApiError>;

    /// `DELETE /leads/{id}`. Idempotent.
    async fn delete_lead(&self, id: &str) -> Result<(), ApiError>;
}

/// Pull the record array out of a list response.
///
/// Accepts a bare array or an array under `leads`, `data`, `items` or
/// `data.leads`.
pub fn extract_lead_list(body: Value) -> Result<Vec<Value>, ApiError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut obj) => {
            for key in ["leads", "data", "items"] {
                match obj.remove(key) {
                    Some(Value::Array(items)) => return Ok(items),
                    Some(Value::Object(mut inner)) if key == "data" => {
                        if let Some(Value::Array(items)) = inner.remove("leads") {
                            return Ok(items);
                        }
                    }
                    _ => {}
                }
            }
            Err(ApiError::Decode("list response has no lead array".into()))
        }
        other => Err(ApiError::Decode(format!(
            "unexpected list response type: {}",
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

const STATUS_PATHS: [&[&str]; 4] = [
    &["status"],
    &["lead", "status"],
    &["data", "status"],
    &["data", "lead", "status"],
];

/// Status the server actually applied after a PATCH.
///
/// Probes `status`, `lead.status`, `data.status`, `data.lead.status` in
/// that order and takes the first recognizable value. Falls back to the
/// requested status.
#[must_use]
pub fn resolve_status(response: &Value, requested: LeadStatus) -> LeadStatus {
    STATUS_PATHS
        .iter()
        .find_map(|path| {
            path.iter()
                .try_fold(response, |node, key| node.get(key))
                .and_then(Value::as_str)
                .and_then(LeadStatus::parse)
        })
        .unwrap_or(requested)
}
