// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The stable error taxonomy shared by every SAMFMS service.
//!
//! Every fallible SCF operation returns [`ScfError`], which carries the
//! error's stable `kind` (the `type` string quoted back to callers),
//! a human message, and an optional correlation id and structured details.
//! The taxonomy and its HTTP/gRPC mappings are fixed by contract — adding a
//! variant here is a wire-format change.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable error kinds. The `Display`/`as_str` form is the wire-level `type`
/// string quoted in [`ResponseEnvelope`](crate::rpc::ResponseEnvelope) and in
/// the correlation middleware's error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    Authentication,
    Authorization,
    NotFound,
    Conflict,
    RateLimit,
    BusinessRule,
    Timeout,
    ServiceUnavailable,
    ServiceDiscovery,
    Broker,
    Storage,
    Upstream,
    Internal,
}

impl ErrorKind {
    /// HTTP-equivalent status code per the fixed table in spec section 7.
    /// No HTTP surface is served by this crate; the mapping exists so the
    /// error taxonomy test matrix and any future gateway share one source
    /// of truth.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::Authentication => 401,
            Self::Authorization => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::RateLimit => 429,
            Self::BusinessRule => 422,
            Self::Internal => 500,
            Self::ServiceUnavailable | Self::ServiceDiscovery => 503,
            Self::Timeout => 504,
            Self::Upstream => 502,
            Self::Broker | Self::Storage => 500,
        }
    }

    pub fn grpc_code(&self) -> tonic::Code {
        match self {
            Self::Validation => tonic::Code::InvalidArgument,
            Self::Authentication => tonic::Code::Unauthenticated,
            Self::Authorization => tonic::Code::PermissionDenied,
            Self::NotFound => tonic::Code::NotFound,
            Self::Conflict => tonic::Code::AlreadyExists,
            Self::RateLimit => tonic::Code::ResourceExhausted,
            Self::BusinessRule => tonic::Code::FailedPrecondition,
            Self::Timeout => tonic::Code::DeadlineExceeded,
            Self::ServiceUnavailable | Self::ServiceDiscovery => tonic::Code::Unavailable,
            Self::Broker | Self::Storage | Self::Upstream => tonic::Code::Unavailable,
            Self::Internal => tonic::Code::Internal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "Validation",
            Self::Authentication => "Authentication",
            Self::Authorization => "Authorization",
            Self::NotFound => "NotFound",
            Self::Conflict => "Conflict",
            Self::RateLimit => "RateLimit",
            Self::BusinessRule => "BusinessRule",
            Self::Timeout => "Timeout",
            Self::ServiceUnavailable => "ServiceUnavailable",
            Self::ServiceDiscovery => "ServiceDiscovery",
            Self::Broker => "Broker",
            Self::Storage => "Storage",
            Self::Upstream => "Upstream",
            Self::Internal => "Internal",
        }
    }

    /// True for 5xx-equivalent kinds — the only class that may carry a
    /// stack trace, and only in non-production mode (spec section 7).
    pub fn is_server_class(&self) -> bool {
        self.http_status() >= 500
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error as it travels through SCF: a stable kind, a message, and the
/// correlation id of the request that produced it (when known).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScfError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ScfError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), correlation_id: None, details: None }
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(resource: &str, id: &str) -> Self {
        Self::new(ErrorKind::NotFound, format!("{resource} '{id}' not found"))
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authorization, message)
    }

    pub fn business_rule(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BusinessRule, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceUnavailable, message)
    }

    pub fn service_discovery(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceDiscovery, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn broker(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Broker, message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Upstream, message)
    }

    /// Redact to a generic internal message unless `dev_mode` is set — per
    /// spec section 7, unclassified exceptions never leak internals in
    /// production.
    pub fn redacted(&self, dev_mode: bool) -> Self {
        if dev_mode || !matches!(self.kind, ErrorKind::Internal) {
            return self.clone();
        }
        Self {
            kind: self.kind,
            message: "an internal error occurred".to_owned(),
            correlation_id: self.correlation_id.clone(),
            details: None,
        }
    }

    pub fn to_grpc_status(&self) -> tonic::Status {
        tonic::Status::new(self.kind.grpc_code(), self.message.clone())
    }
}

impl fmt::Display for ScfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ScfError {}

pub type ScfResult<T> = Result<T, ScfError>;
