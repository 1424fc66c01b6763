use std::env;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Page size limits and rolling-window geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryConfig {
    pub default_limit: usize,
    pub max_limit: usize,
    /// First window width, nanoseconds.
    pub initial_window: u64,
    /// Widest a single window may grow, nanoseconds.
    pub max_window: u64,
    /// Lowest timestamp any query reaches back to, nanoseconds.
    pub genesis_ts: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: 25,
            max_limit: 250,
            initial_window: 3_600 * NANOS_PER_SEC,
            max_window: 30 * 86_400 * NANOS_PER_SEC,
            genesis_ts: 0,
        }
    }
}

impl QueryConfig {
    /// Load configuration from environment variables
    ///
    /// `QUERY_DEFAULT_LIMIT`, `QUERY_MAX_LIMIT`, `QUERY_INITIAL_WINDOW_SECS`,
    /// `QUERY_MAX_WINDOW_SECS`, `QUERY_GENESIS_TS` (nanoseconds).
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_limit = env::var("QUERY_MAX_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_limit)
            .max(1);
        let initial_window = env::var("QUERY_INITIAL_WINDOW_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(|s| s.saturating_mul(NANOS_PER_SEC))
            .unwrap_or(defaults.initial_window)
            .max(1);

        Self {
            default_limit: env::var("QUERY_DEFAULT_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_limit)
                .clamp(1, max_limit),
            max_limit,
            initial_window,
            max_window: env::var("QUERY_MAX_WINDOW_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(|s| s.saturating_mul(NANOS_PER_SEC))
                .unwrap_or(defaults.max_window)
                .max(initial_window),
            genesis_ts: env::var("QUERY_GENESIS_TS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.genesis_ts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_config_from_env() {
        env::set_var("QUERY_MAX_LIMIT", "50");
        env::set_var("QUERY_DEFAULT_LIMIT", "80");
        env::set_var("QUERY_INITIAL_WINDOW_SECS", "60");
        env::set_var("QUERY_MAX_WINDOW_SECS", "10");

        let config = QueryConfig::from_env();
        assert_eq!(config.max_limit, 50);
        assert_eq!(config.default_limit, 50);
        assert_eq!(config.initial_window, 60 * NANOS_PER_SEC);
        // never narrower than the first window
        assert_eq!(config.max_window, 60 * NANOS_PER_SEC);

        for var in [
            "QUERY_MAX_LIMIT",
            "QUERY_DEFAULT_LIMIT",
            "QUERY_INITIAL_WINDOW_SECS",
            "QUERY_MAX_WINDOW_SECS",
        ] {
            env::remove_var(var);
        }
        assert_eq!(QueryConfig::from_env(), QueryConfig::default());
    }
}
