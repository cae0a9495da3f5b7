// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trip-service-specific tunables layered on top of [`ScfConfig`], the same
//! env-or-flag shape the fabric's own config uses.

use clap::Parser;
use samfms_scf::config::ScfConfig;

#[derive(Debug, Clone, Parser)]
#[command(name = "trip-service", version, about)]
pub struct TripServiceConfig {
    #[command(flatten)]
    pub scf: ScfConfig,

    /// Interval between traffic re-evaluation passes, in seconds.
    #[arg(long, env = "TRAFFIC_CHECK_INTERVAL", default_value = "300")]
    pub traffic_check_interval: u64,

    /// Base time savings, in seconds, a reroute candidate must clear before
    /// the per-severity fraction is applied.
    #[arg(long, env = "MINIMUM_TIME_SAVINGS", default_value = "600")]
    pub minimum_time_savings: u64,

    /// Fraction of `MINIMUM_TIME_SAVINGS` a reroute must save under heavy
    /// traffic to be recommended (0.0-1.0).
    #[arg(long, env = "MINIMUM_TIME_SAVINGS_HEAVY", default_value = "0.50")]
    pub minimum_time_savings_heavy: f64,

    /// Same fraction under severe traffic, relaxed per spec section 14.
    #[arg(long, env = "MINIMUM_TIME_SAVINGS_SEVERE", default_value = "0.30")]
    pub minimum_time_savings_severe: f64,

    /// Expected interval between driver pings, in seconds.
    #[arg(long, env = "PING_INTERVAL", default_value = "30")]
    pub ping_interval: u64,

    /// Grace period past the expected ping before a watchdog pass flags a
    /// missed ping, in seconds.
    #[arg(long, env = "PING_GRACE", default_value = "30")]
    pub ping_grace: u64,

    /// Watchdog pass interval, in seconds.
    #[arg(long, env = "PING_WATCHDOG_INTERVAL", default_value = "30")]
    pub ping_watchdog_interval: u64,

    /// Location-history retention in days before the purge task drops it.
    #[arg(long, env = "LOCATION_HISTORY_RETENTION_DAYS", default_value = "90")]
    pub location_history_retention_days: i64,
}

impl TripServiceConfig {
    pub fn traffic_check_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.traffic_check_interval)
    }

    pub fn minimum_time_savings(&self) -> f64 {
        self.minimum_time_savings as f64
    }

    pub fn ping_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ping_interval as i64)
    }

    pub fn ping_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ping_grace as i64)
    }

    pub fn ping_watchdog_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ping_watchdog_interval)
    }

    pub fn location_history_retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.location_history_retention_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = TripServiceConfig::parse_from(["trip-service", "--service-name", "trip_planning"]);
        assert_eq!(cfg.traffic_check_interval, 300);
        assert_eq!(cfg.minimum_time_savings, 600);
        assert_eq!(cfg.ping_interval, 30);
        assert_eq!(cfg.ping_grace, 30);
        assert_eq!(cfg.location_history_retention_days, 90);
        assert_eq!(cfg.scf.requests_queue(), "trip_planning_service_requests");
    }
}
