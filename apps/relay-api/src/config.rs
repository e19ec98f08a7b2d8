use std::time::Duration;

use crate::gateway::session::OverflowPolicy;

const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 41250;
/// Upper bound on the advertised heartbeat interval (one hour).
const MAX_HEARTBEAT_INTERVAL_MS: u64 = 3_600_000;

/// Relay configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared HMAC secret used to verify access tokens.
    pub jwt_secret: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Maximum number of undelivered messages held per session.
    pub outbox_capacity: usize,
    /// Which message to discard when a session's outbox is full.
    pub overflow_policy: OverflowPolicy,
    /// Highest page number a page-move may target. Unbounded when unset.
    pub max_page: Option<i32>,
    /// Heartbeat interval advertised to clients in READY (ms).
    pub heartbeat_interval_ms: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            jwt_secret: required_var("RELAY_JWT_SECRET"),
            port: parsed_var("PORT").unwrap_or(4100),
            outbox_capacity: parsed_var("OUTBOX_CAPACITY").filter(|c| *c > 0).unwrap_or(256),
            overflow_policy: std::env::var("OUTBOX_OVERFLOW")
                .ok()
                .and_then(|v| OverflowPolicy::parse(&v))
                .unwrap_or_default(),
            max_page: parsed_var("MAX_PAGE"),
            heartbeat_interval_ms: parsed_var("HEARTBEAT_INTERVAL_MS")
                .filter(|ms| (1..=MAX_HEARTBEAT_INTERVAL_MS).contains(ms))
                .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_MS),
        }
    }

    /// How long a connection may stay silent before it is closed: 1.5× the
    /// heartbeat interval, never zero.
    pub fn heartbeat_deadline(&self) -> Duration {
        let interval = self
            .heartbeat_interval_ms
            .clamp(1, MAX_HEARTBEAT_INTERVAL_MS);
        Duration::from_millis((interval.saturating_mul(3) / 2).max(1))
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_interval(heartbeat_interval_ms: u64) -> Config {
        Config {
            jwt_secret: "secret".to_string(),
            port: 0,
            outbox_capacity: 8,
            overflow_policy: OverflowPolicy::DropOldest,
            max_page: None,
            heartbeat_interval_ms,
        }
    }

    #[test]
    fn heartbeat_deadline_is_one_and_a_half_intervals() {
        assert_eq!(
            config_with_interval(1000).heartbeat_deadline(),
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn heartbeat_deadline_is_never_zero_or_overflowing() {
        assert_eq!(
            config_with_interval(0).heartbeat_deadline(),
            Duration::from_millis(1)
        );
        assert_eq!(
            config_with_interval(u64::MAX).heartbeat_deadline(),
            Duration::from_millis(MAX_HEARTBEAT_INTERVAL_MS * 3 / 2)
        );
    }

    // The only test in this crate that touches the process environment.
    #[test]
    fn from_env_ignores_out_of_range_heartbeat_interval() {
        std::env::set_var("RELAY_JWT_SECRET", "secret");

        for raw in ["0", "18446744073709551615", "soon"] {
            std::env::set_var("HEARTBEAT_INTERVAL_MS", raw);
            assert_eq!(
                Config::from_env().heartbeat_interval_ms,
                DEFAULT_HEARTBEAT_INTERVAL_MS,
                "HEARTBEAT_INTERVAL_MS={raw}"
            );
        }

        std::env::set_var("HEARTBEAT_INTERVAL_MS", "250");
        assert_eq!(Config::from_env().heartbeat_interval_ms, 250);

        std::env::remove_var("HEARTBEAT_INTERVAL_MS");
    }
}
