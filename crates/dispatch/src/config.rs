//! Dispatch configuration

use std::time::Duration;

/// Dispatch tunables
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    /// Minimum spacing between two dispatches for the same plate and panel
    pub cooldown: Duration,
    /// TTL for success and backend-rejection outcomes
    pub cache_ttl: Duration,
    /// TTL for transport failures (kept separately tunable)
    pub connection_error_ttl: Duration,
    /// Whether the global rate limit applies
    pub rate_limit_enabled: bool,
    /// Dispatch ceiling per rolling 60s window
    pub max_requests_per_minute: usize,
    /// Per-dispatch network timeout
    pub request_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(300),
            connection_error_ttl: Duration::from_secs(300),
            rate_limit_enabled: true,
            max_requests_per_minute: 30,
            request_timeout: Duration::from_secs(10),
        }
    }
}
