// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Lead records as held by the local replica.
//!
//! The remote API is loosely typed, so everything that comes off the wire
//! goes through [`Lead::from_remote`] before the engine touches it.
//!
//! # Example
//!
//! ```
//! use leads_sync::{Lead, LeadStatus};
//! use serde_json::json;
//!
//! let lead = Lead::from_remote(&json!({
//!     "id": 42,
//!     "name": "Ivan",
//!     "status": "SUCCESS",
//! })).unwrap();
//!
//! assert_eq!(lead.id, "42");
//! assert_eq!(lead.status, LeadStatus::Success);
//! assert_eq!(lead.city, "");
//! ```

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Pipeline status of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    #[default]
    New,
    Success,
    Failed,
}

impl LeadStatus {
    /// Wire representation (`"new"`, `"success"`, `"failed"`).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Case-insensitive parse. Returns `None` for anything unrecognized.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "new" => Some(Self::New),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sales lead. Identity is `id`, assigned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub request: String,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: LeadStatus,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub stage_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(rename = "lastClientMessageAt", default, skip_serializing_if = "Option::is_none")]
    pub last_client_message_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments_count: Option<u64>,
}

impl Lead {
    /// Minimal lead with the given id and status. Handy for tests and fixtures.
    #[must_use]
    pub fn new(id: impl Into<String>, status: LeadStatus) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            phone: String::new(),
            city: String::new(),
            request: String::new(),
            created_at: None,
            status,
            category: String::new(),
            stage_key: String::new(),
            score: None,
            last_client_message_at: None,
            comments_count: None,
        }
    }

    /// Normalize a raw record from the remote API.
    ///
    /// Returns `None` when the record has no usable id.
    #[must_use]
    pub fn from_remote(raw: &Value) -> Option<Self> {
        let obj = raw.as_object()?;

        let id = match obj.get("id") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                warn!("Dropping remote lead record without id");
                return None;
            }
        };

        let text = |key: &str| -> String {
            match obj.get(key) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => String::new(),
            }
        };

        let status = obj
            .get("status")
            .and_then(Value::as_str)
            .and_then(LeadStatus::parse)
            .unwrap_or_default();

        let created_at = obj
            .get("createdAt")
            .or_else(|| obj.get("created_at"))
            .and_then(parse_timestamp);

        let last_client_message_at = obj
            .get("lastClientMessageAt")
            .or_else(|| obj.get("last_client_message_at"))
            .and_then(parse_timestamp);

        Some(Self {
            id,
            name: text("name"),
            phone: text("phone"),
            city: text("city"),
            request: text("request"),
            created_at,
            status,
            category: text("category"),
            stage_key: text("stage_key"),
            score: obj.get("score").and_then(Value::as_f64),
            last_client_message_at,
            comments_count: obj.get("comments_count").and_then(Value::as_u64),
        })
    }
}

/// Accepts RFC 3339 strings or epoch milliseconds.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok(),
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

/// Current time as epoch millis.
pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
