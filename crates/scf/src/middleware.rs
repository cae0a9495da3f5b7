// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [C7] Error & Correlation Middleware — assigns correlation/request ids
//! and renders the fixed error-response body shape (spec section 9).

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::ScfError;

/// Per-request identifiers: reuses an incoming correlation id if present,
/// otherwise mints both ids fresh.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: String,
    pub request_id: String,
    pub method: String,
    pub endpoint: String,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, endpoint: impl Into<String>, incoming_correlation_id: Option<String>) -> Self {
        Self {
            correlation_id: incoming_correlation_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            request_id: Uuid::new_v4().to_string(),
            method: method.into(),
            endpoint: endpoint.into(),
        }
    }

    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "request",
            correlation_id = %self.correlation_id,
            request_id = %self.request_id,
            method = %self.method,
            endpoint = %self.endpoint,
        )
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBodyRequest {
    pub method: String,
    pub endpoint: String,
    pub request_id: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBodyDetail {
    pub code: String,
    pub message: String,
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    pub request: ErrorBodyRequest,
}

/// The fixed response envelope spec section 9 mandates:
/// `{success:false, error:{...}}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: ErrorBodyDetail,
}

/// Render `err` into the fixed error body, attaching a stack trace only
/// for server-class errors and only when `dev_mode` is set (spec section
/// 9, `ScfConfig.dev_mode`).
pub fn render_error(ctx: &RequestContext, err: &ScfError, dev_mode: bool, stack_trace: Option<String>) -> ErrorBody {
    let redacted = err.redacted(dev_mode);
    let stack_trace = if dev_mode && err.kind.is_server_class() { stack_trace } else { None };

    ErrorBody {
        success: false,
        error: ErrorBodyDetail {
            code: redacted.kind.as_str().to_owned(),
            message: redacted.message,
            correlation_id: ctx.correlation_id.clone(),
            timestamp: Utc::now(),
            details: redacted.details,
            stack_trace,
            request: ErrorBodyRequest {
                method: ctx.method.clone(),
                endpoint: ctx.endpoint.clone(),
                request_id: ctx.request_id.clone(),
            },
        },
    }
}
