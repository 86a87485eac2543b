//! Application-level configuration loading: refresh timing, trial length,
//! broadcast sizing and the categories outside callers may invalidate.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};
use tracing::{info, warn};

use crate::state::{invalidation::RefreshCategory, refresh::RefreshTiming};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "DUES_BACK_CONFIG_PATH";
/// Days an `on_trial` player keeps that status before it reads as `trial_ended`.
pub const DEFAULT_TRIAL_PERIOD_DAYS: u32 = 30;
/// Capacity of the SSE broadcast channels.
pub const DEFAULT_SSE_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    refresh: RefreshTiming,
    trial_period_days: u32,
    sse_capacity: usize,
    external_categories: Vec<RefreshCategory>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        debounce_ms = app_config.refresh.debounce.as_millis() as u64,
                        trial_period_days = app_config.trial_period_days,
                        "loaded config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a configuration document. Absent keys keep their defaults.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    /// Timing used by every debounced refresh subscriber.
    pub fn refresh(&self) -> RefreshTiming {
        self.refresh
    }

    /// Trial length used by the read-time `on_trial` expiry.
    pub fn trial_period(&self) -> time::Duration {
        time::Duration::days(i64::from(self.trial_period_days))
    }

    /// Capacity of the SSE broadcast channels.
    pub fn sse_capacity(&self) -> usize {
        self.sse_capacity
    }

    /// Whether outside callers may bump `category`: the built-in categories
    /// plus those listed under `external_categories`.
    pub fn accepts_external_bump(&self, category: &RefreshCategory) -> bool {
        RefreshCategory::KNOWN.contains(category) || self.external_categories.contains(category)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            refresh: RefreshTiming::default(),
            trial_period_days: DEFAULT_TRIAL_PERIOD_DAYS,
            sse_capacity: DEFAULT_SSE_CAPACITY,
            external_categories: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    refresh: RawRefresh,
    trial_period_days: Option<u32>,
    sse_capacity: Option<usize>,
    external_categories: Vec<String>,
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRefresh {
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    min_interval_ms: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    debounce_ms: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    poll_interval_ms: Option<Duration>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = RefreshTiming::default();
        let refresh = RefreshTiming {
            min_interval: value.refresh.min_interval_ms.unwrap_or(defaults.min_interval),
            debounce: value.refresh.debounce_ms.unwrap_or(defaults.debounce),
            // A zero period would make the poll spin.
            poll_interval: value
                .refresh
                .poll_interval_ms
                .filter(|period| !period.is_zero())
                .unwrap_or(defaults.poll_interval),
        };

        Self {
            refresh,
            trial_period_days: value.trial_period_days.unwrap_or(DEFAULT_TRIAL_PERIOD_DAYS),
            sse_capacity: value.sse_capacity.unwrap_or(DEFAULT_SSE_CAPACITY).max(1),
            external_categories: value
                .external_categories
                .into_iter()
                .map(|name| name.trim().to_owned())
                .filter(|name| !name.is_empty())
                .map(RefreshCategory::named)
                .collect(),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
