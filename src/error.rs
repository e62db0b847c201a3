use thiserror::Error;

pub type Result<T> = std::result::Result<T, DashboardError>;

/// Errors surfaced to whoever is driving the dashboard.
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("metrics fetch failed: {0}")]
    FetchFailed(String),

    #[error("sign in required to {0}")]
    Unauthenticated(&'static str),

    #[error("exclusion store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("could not decode metrics payload: {0}")]
    Decode(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("could not write {0}")]
    Io(String),
}

impl From<sqlx::Error> for DashboardError {
    fn from(err: sqlx::Error) -> Self {
        DashboardError::StoreUnavailable(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for DashboardError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DashboardError::StoreUnavailable(err.to_string())
    }
}

impl From<reqwest::Error> for DashboardError {
    fn from(err: reqwest::Error) -> Self {
        DashboardError::FetchFailed(err.to_string())
    }
}

impl From<serde_json::Error> for DashboardError {
    fn from(err: serde_json::Error) -> Self {
        DashboardError::Decode(err.to_string())
    }
}
