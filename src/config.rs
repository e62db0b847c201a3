use std::env;
use std::time::Duration;

use crate::error::{DashboardError, Result};
use crate::refresh::{RefreshPolicy, DEFAULT_DEDUPE_WINDOW, DEFAULT_INTERVAL};

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub database_url: Option<String>,
    pub metrics_api_url: Option<String>,
    pub actor_email: Option<String>,
    pub actor_password: Option<String>,
    pub refresh: RefreshPolicy,
    pub fetch_timeout: Duration,
    pub log_level: String,
}

impl DashboardConfig {
    /// Loads configuration from the process environment (and `.env`, if any).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let refresh = RefreshPolicy {
            interval: seconds("DASHBOARD_REFRESH_SECS")?.unwrap_or(DEFAULT_INTERVAL),
            dedupe_window: seconds("DASHBOARD_DEDUPE_SECS")?.unwrap_or(DEFAULT_DEDUPE_WINDOW),
        };
        if refresh.interval.is_zero() {
            return Err(DashboardError::Config(
                "DASHBOARD_REFRESH_SECS must be positive".to_string(),
            ));
        }

        Ok(Self {
            database_url: non_empty("DATABASE_URL"),
            metrics_api_url: non_empty("METRICS_API_URL"),
            actor_email: non_empty("DASHBOARD_ACTOR"),
            actor_password: non_empty("DASHBOARD_PASSWORD"),
            refresh,
            fetch_timeout: seconds("DASHBOARD_FETCH_TIMEOUT_SECS")?.unwrap_or(DEFAULT_FETCH_TIMEOUT),
            log_level: non_empty("DASHBOARD_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }

    pub fn database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| DashboardError::Config("DATABASE_URL must be set".to_string()))
    }

    pub fn metrics_api_url(&self) -> Result<&str> {
        self.metrics_api_url.as_deref().ok_or_else(|| {
            DashboardError::Config("METRICS_API_URL must be set to fetch live data".to_string())
        })
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn seconds(key: &str) -> Result<Option<Duration>> {
    non_empty(key)
        .map(|raw| {
            raw.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| DashboardError::Config(format!("{key} must be a whole number of seconds")))
        })
        .transpose()
}
