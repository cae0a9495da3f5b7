// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The wire envelopes of spec section 6 — `RequestEnvelope`/`ResponseEnvelope`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScfError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub role: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub correlation_id: String,
    pub method: String,
    pub endpoint: String,
    #[serde(default = "serde_json::Value::default")]
    pub data: serde_json::Value,
    pub user_context: UserContext,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub correlation_id: String,
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
    pub timestamp: DateTime<Utc>,
}

impl ResponseEnvelope {
    pub fn success(correlation_id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            status: ResponseStatus::Success,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Wrap an [`ScfError`] into an error response; the error's stable
    /// `kind` string becomes the wire-level `type` (spec section 4.2: "the
    /// exception class name is the stable `type`").
    pub fn error(correlation_id: impl Into<String>, err: &ScfError) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            status: ResponseStatus::Error,
            data: None,
            error: Some(ResponseError { kind: err.kind.as_str().to_owned(), message: err.message.clone() }),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_through_json() {
        let req = RequestEnvelope {
            correlation_id: "c-1".into(),
            method: "POST".into(),
            endpoint: "trips/create".into(),
            data: serde_json::json!({"name": "morning run"}),
            user_context: UserContext { user_id: "u1".into(), role: "dispatcher".into(), permissions: vec![] },
            timestamp: Utc::now(),
        };
        let encoded = serde_json::to_string(&req).unwrap();
        let decoded: RequestEnvelope = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.correlation_id, req.correlation_id);
        assert_eq!(decoded.endpoint, req.endpoint);
        assert_eq!(decoded.data, req.data);
    }

    #[test]
    fn response_round_trips_through_json() {
        let resp = ResponseEnvelope::success("c-1", serde_json::json!({"id": "abc"}));
        let encoded = serde_json::to_string(&resp).unwrap();
        let decoded: ResponseEnvelope = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.status, ResponseStatus::Success);
        assert_eq!(decoded.data, resp.data);
    }

    #[test]
    fn error_response_carries_stable_type() {
        let err = ScfError::validation("missing field 'name'");
        let resp = ResponseEnvelope::error("c-2", &err);
        assert_eq!(resp.status, ResponseStatus::Error);
        assert_eq!(resp.error.unwrap().kind, "Validation");
    }
}
