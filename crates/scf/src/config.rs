// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment-driven configuration for the Service Communication Fabric.
//!
//! Every tunable named in spec section 6 is represented here with the same
//! `#[arg(long, env = "...")]` shape the rest of the fleet uses, so a
//! service picks up its configuration from either CLI flags or environment
//! variables without a separate parsing pass.

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "scf", version, about)]
pub struct ScfConfig {
    /// This service's name, used to derive its request queue and RPC
    /// routing key (`<service>_service_requests` / `<service>.requests`).
    #[arg(long, env = "SERVICE_NAME")]
    pub service_name: String,

    /// Broker connection URL (NATS in this implementation).
    #[arg(long, env = "BROKER_URL", default_value = "nats://127.0.0.1:4222")]
    pub broker_url: String,

    /// Broker heartbeat interval in seconds.
    #[arg(long, env = "BROKER_HEARTBEAT", default_value = "30")]
    pub broker_heartbeat: u64,

    /// Maximum connect attempts before giving up (exponential backoff).
    #[arg(long, env = "BROKER_MAX_RETRIES", default_value = "5")]
    pub broker_max_retries: u32,

    /// Default per-endpoint RPC timeout in seconds.
    #[arg(long, env = "REQUEST_TIMEOUT_DEFAULT", default_value = "25")]
    pub request_timeout_default: u64,

    /// Whether dead-lettering is enabled on the event bus.
    #[arg(long, env = "DLQ_ENABLED", default_value = "true")]
    pub dlq_enabled: bool,

    /// Token cache TTL in seconds.
    #[arg(long, env = "TOKEN_CACHE_TTL", default_value = "300")]
    pub token_cache_ttl: u64,

    /// Circuit breaker consecutive-failure threshold.
    #[arg(long, env = "CIRCUIT_BREAKER_THRESHOLD", default_value = "5")]
    pub circuit_breaker_threshold: u32,

    /// Circuit breaker recovery timeout in seconds.
    #[arg(long, env = "CIRCUIT_BREAKER_RECOVERY", default_value = "60")]
    pub circuit_breaker_recovery: u64,

    /// Maximum concurrent calls allowed while half-open.
    #[arg(long, env = "CIRCUIT_BREAKER_HALF_OPEN_MAX", default_value = "3")]
    pub circuit_breaker_half_open_max: u32,

    /// Security service base URL (token verification).
    #[arg(long, env = "SECURITY_SERVICE_URL")]
    pub security_service_url: Option<String>,

    /// Security service health-check URL.
    #[arg(long, env = "SECURITY_SERVICE_HEALTH_URL")]
    pub security_service_health_url: Option<String>,

    /// Log format: "json" or "text".
    #[arg(long, env = "SCF_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level filter, e.g. "info" or "debug".
    #[arg(long, env = "SCF_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Non-production mode — enables stack traces on server-class errors.
    #[arg(long, env = "SCF_DEV_MODE", default_value = "false")]
    pub dev_mode: bool,
}

impl ScfConfig {
    pub fn requests_queue(&self) -> String {
        format!("{}_service_requests", self.service_name)
    }

    pub fn requests_routing_key(&self) -> String {
        format!("{}.requests", self.service_name)
    }

    pub fn dlx_exchange(&self) -> String {
        format!("{}_dlx", self.service_name)
    }

    pub fn dlq_queue(&self) -> String {
        format!("{}_dlq", self.service_name)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_default)
    }

    pub fn token_cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.token_cache_ttl)
    }

    pub fn circuit_breaker_recovery(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.circuit_breaker_recovery)
    }

    /// Install a `tracing` subscriber matching `log_format`/`log_level`.
    pub fn init_tracing(&self) {
        let filter = tracing_subscriber::EnvFilter::try_new(&self.log_level)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
        if self.log_format == "json" {
            let _ = subscriber.json().try_init();
        } else {
            let _ = subscriber.try_init();
        }
    }
}
