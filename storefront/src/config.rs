//! Configuration management for the storefront application.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application server configuration
    pub server: ServerConfig,
    /// Reservation hold windows and sweep cadence
    pub holds: HoldConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Metrics server host (for Prometheus scraping)
    pub metrics_host: String,
    /// Metrics server port
    pub metrics_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
}

/// Reservation hold configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldConfig {
    /// Hold window for single-item cart adds, in minutes
    pub cart_hold_minutes: i64,
    /// Hold window for bundle holds, in hours; bundles need a manual
    /// admin-to-customer handoff so the window is much longer
    pub bundle_hold_hours: i64,
    /// How often the expiry sweep runs, in seconds
    pub sweep_interval_secs: u64,
}

impl HoldConfig {
    /// Cart hold window as a chrono duration
    #[must_use]
    pub const fn cart_hold(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.cart_hold_minutes)
    }

    /// Bundle hold window as a chrono duration
    #[must_use]
    pub const fn bundle_hold(&self) -> chrono::Duration {
        chrono::Duration::hours(self.bundle_hold_hours)
    }

    /// Sweep cadence as a std duration
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(8080),
                log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
                metrics_host: env::var("METRICS_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                metrics_port: env::var("METRICS_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(9090),
                shutdown_timeout: env::var("SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            },
            holds: HoldConfig {
                cart_hold_minutes: env::var("CART_HOLD_MINUTES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(15),
                bundle_hold_hours: env::var("BUNDLE_HOLD_HOURS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(24),
                sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hold_config_duration_helpers() {
        let holds = HoldConfig {
            cart_hold_minutes: 15,
            bundle_hold_hours: 24,
            sweep_interval_secs: 60,
        };
        assert_eq!(holds.cart_hold(), chrono::Duration::minutes(15));
        assert_eq!(holds.bundle_hold(), chrono::Duration::hours(24));
        assert_eq!(holds.sweep_interval(), Duration::from_secs(60));
    }
}
