//! Configuration for the notification inbox engine.
//!
//! Settings are loaded from environment variables with typed fallbacks,
//! so deployments can tune polling cadence and timeouts without code
//! changes. Unparseable values fall back to the default (never panic).
//!
//! Note: in Rust 2024 `std::env::set_var` is `unsafe` and this workspace
//! forbids `unsafe_code`, so tests exercise [`EngineConfig::from_lookup`]
//! with an explicit map instead of mutating the process environment.

use std::env;
use std::time::Duration;

/// Engine configuration.
///
/// Construct with [`EngineConfig::from_env`] in deployments, or start from
/// `EngineConfig::default()` and override fields in tests.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the notification API, e.g. `http://erp.internal:8080`.
    pub api_base_url: String,
    /// Cadence of the shared poll timer while any subscriber is active.
    pub poll_interval: Duration,
    /// Page size requested from the list endpoint.
    pub page_size: u32,
    /// Client-side bound on every remote call.
    pub request_timeout: Duration,
    /// Age threshold, in days, for the clear-old maintenance action.
    pub clear_old_days: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8080".to_string(),
            poll_interval: Duration::from_secs(10),
            page_size: 20,
            request_timeout: Duration::from_secs(10),
            clear_old_days: 7,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the process environment.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `NOTIFY_API_BASE_URL` | `http://127.0.0.1:8080` |
    /// | `NOTIFY_POLL_INTERVAL_SECONDS` | 10 |
    /// | `NOTIFY_PAGE_SIZE` | 20 |
    /// | `NOTIFY_REQUEST_TIMEOUT_SECONDS` | 10 |
    /// | `NOTIFY_CLEAR_OLD_DAYS` | 7 |
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset. Intervals and sizes are clamped
    /// to at least 1 so a misconfigured deployment cannot spin-loop the
    /// scheduler or request empty pages.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            api_base_url: get(&lookup, "NOTIFY_API_BASE_URL")
                .unwrap_or(defaults.api_base_url),
            poll_interval: Duration::from_secs(
                get_parse(&lookup, "NOTIFY_POLL_INTERVAL_SECONDS", 10u64).max(1),
            ),
            page_size: get_parse(&lookup, "NOTIFY_PAGE_SIZE", defaults.page_size).max(1),
            request_timeout: Duration::from_secs(
                get_parse(&lookup, "NOTIFY_REQUEST_TIMEOUT_SECONDS", 10u64).max(1),
            ),
            clear_old_days: get_parse(&lookup, "NOTIFY_CLEAR_OLD_DAYS", defaults.clear_old_days)
                .max(1),
        }
    }
}

/// Read a variable through the lookup, treating empty values as unset.
fn get<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str) -> Option<String> {
    lookup(key).filter(|v| !v.trim().is_empty())
}

/// Read and parse a variable, falling back to `default` on absence or
/// parse failure (a warning is logged for the latter).
fn get_parse<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    get(lookup, key).map_or(default, |raw| match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            tracing::warn!(key, value = %raw, "unparseable config value, using default");
            default
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.poll_interval, Duration::from_secs(10));
        assert_eq!(cfg.page_size, 20);
        assert_eq!(cfg.clear_old_days, 7);
    }

    #[test]
    fn lookup_overrides_are_applied() {
        let cfg = EngineConfig::from_lookup(lookup_from(&[
            ("NOTIFY_POLL_INTERVAL_SECONDS", "30"),
            ("NOTIFY_PAGE_SIZE", "50"),
            ("NOTIFY_API_BASE_URL", "http://erp.internal:9000"),
        ]));
        assert_eq!(cfg.poll_interval, Duration::from_secs(30));
        assert_eq!(cfg.page_size, 50);
        assert_eq!(cfg.api_base_url, "http://erp.internal:9000");
        // Untouched keys keep their defaults.
        assert_eq!(cfg.clear_old_days, 7);
    }

    #[test]
    fn garbage_values_fall_back_to_defaults() {
        let cfg = EngineConfig::from_lookup(lookup_from(&[("NOTIFY_PAGE_SIZE", "lots")]));
        assert_eq!(cfg.page_size, 20);
    }

    #[test]
    fn empty_values_are_treated_as_unset() {
        let cfg = EngineConfig::from_lookup(lookup_from(&[("NOTIFY_API_BASE_URL", "  ")]));
        assert_eq!(cfg.api_base_url, "http://127.0.0.1:8080");
    }

    #[test]
    fn zero_interval_is_clamped() {
        let cfg =
            EngineConfig::from_lookup(lookup_from(&[("NOTIFY_POLL_INTERVAL_SECONDS", "0")]));
        assert_eq!(cfg.poll_interval, Duration::from_secs(1));
    }
}
