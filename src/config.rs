use std::path::PathBuf;
use std::time::Duration;

use crate::model::Reserver;
use crate::scheduler::RefreshPolicy;

/// Display name used when nothing better is known.
const FALLBACK_DISPLAY_NAME: &str = "You";

/// Process configuration, read from `SLOTBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub user: Reserver,
    pub refresh: RefreshPolicy,
    /// JSON instrument catalog; the built-in fleet when unset.
    pub instruments_path: Option<PathBuf>,
    /// Local hour (0-23) at which the daily rollover runs.
    pub rollover_hour: u32,
    pub metrics_port: Option<u16>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |key: &str| var(key).and_then(|s| s.trim().parse::<u64>().ok());
        let defaults = RefreshPolicy::default();

        let user_id = var("SLOTBOOK_USER_ID").filter(|s| !s.trim().is_empty());
        let display_name = var("SLOTBOOK_DISPLAY_NAME")
            .filter(|s| !s.trim().is_empty())
            .or_else(|| user_id.clone())
            .unwrap_or_else(|| FALLBACK_DISPLAY_NAME.into());

        let refresh = RefreshPolicy {
            interval: parse("SLOTBOOK_REFRESH_INTERVAL_SECS")
                .filter(|&s| s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.interval),
            max_retries: parse("SLOTBOOK_REFRESH_MAX_RETRIES")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(defaults.max_retries),
            backoff: parse("SLOTBOOK_REFRESH_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff),
        };

        Self {
            user: Reserver::new(user_id.unwrap_or_else(|| "local".into()), display_name),
            refresh,
            instruments_path: var("SLOTBOOK_INSTRUMENTS").map(PathBuf::from),
            rollover_hour: parse("SLOTBOOK_ROLLOVER_HOUR")
                .filter(|&h| h < 24)
                .map(|h| h as u32)
                .unwrap_or(0),
            metrics_port: var("SLOTBOOK_METRICS_PORT").and_then(|s| s.trim().parse().ok()),
        }
    }
}
