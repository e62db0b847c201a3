use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{Duration as Days, NaiveDate};
use serde::Deserialize;
use url::Url;

use crate::error::{DashboardError, Result};
use crate::metrics::MetricsInput;
use crate::models::{CallRecord, HoursRecord, ScorecardRecord, StlRecord};

pub const CUSTOM_DATES: &str = "Custom Dates";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Reporting window as understood by the metrics endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateWindow {
    pub range: String,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    pub fn new(range: &str, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self> {
        let range = range.trim();
        if range.is_empty() {
            return Err(DashboardError::ValidationFailed(
                "date range is required".to_string(),
            ));
        }
        if range == CUSTOM_DATES {
            match (start, end) {
                (Some(start), Some(end)) if start <= end => {}
                (Some(_), Some(_)) => {
                    return Err(DashboardError::ValidationFailed(
                        "start date must not be after end date".to_string(),
                    ))
                }
                _ => {
                    return Err(DashboardError::ValidationFailed(
                        "custom dates need both a start and an end date".to_string(),
                    ))
                }
            }
        }
        Ok(Self {
            range: range.to_string(),
            start,
            end,
        })
    }

    pub fn label(&self) -> String {
        match (self.is_custom(), self.start, self.end) {
            (true, Some(start), Some(end)) => format!("{start} to {end}"),
            _ => self.range.clone(),
        }
    }

    pub fn is_custom(&self) -> bool {
        self.range == CUSTOM_DATES
    }

    /// Query parameters, keyed `dateRange`/`startDate`/`endDate` or their
    /// `secondary*` counterparts. The end date is sent exclusive.
    fn query_pairs(&self, secondary: bool) -> Vec<(String, String)> {
        let key = |name: &str| {
            if secondary {
                let mut chars = name.chars();
                let head = chars.next().map(|c| c.to_ascii_uppercase());
                format!("secondary{}{}", head.unwrap_or_default(), chars.as_str())
            } else {
                name.to_string()
            }
        };

        let mut pairs = vec![(key("dateRange"), self.range.clone())];
        if self.is_custom() {
            if let (Some(start), Some(end)) = (self.start, self.end) {
                let exclusive_end = end + Days::days(1);
                pairs.push((key("startDate"), start.format(DATE_FORMAT).to_string()));
                pairs.push((key("endDate"), exclusive_end.format(DATE_FORMAT).to_string()));
            }
        }
        pairs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Team {
    #[default]
    Setters,
    Confirmers,
}

impl FromStr for Team {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "setters" | "setter" => Ok(Team::Setters),
            "confirmers" | "confirmer" => Ok(Team::Confirmers),
            other => Err(format!("unknown team `{other}`")),
        }
    }
}

/// Body of the metrics endpoint. Missing arrays decode as empty.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsPayload {
    pub setters_calls: Vec<CallRecord>,
    pub confirmers_calls: Vec<CallRecord>,
    pub hours: Vec<HoursRecord>,
    pub setters_scorecards: Vec<ScorecardRecord>,
    pub confirmers_scorecards: Vec<ScorecardRecord>,
    pub stl: Vec<StlRecord>,
    pub secondary_setters_calls: Vec<CallRecord>,
    pub secondary_confirmers_calls: Vec<CallRecord>,
    pub secondary_hours: Vec<HoursRecord>,
    pub secondary_setters_scorecards: Vec<ScorecardRecord>,
    pub secondary_confirmers_scorecards: Vec<ScorecardRecord>,
    pub secondary_stl: Vec<StlRecord>,
}

impl MetricsPayload {
    pub fn input(&self, team: Team, secondary: bool) -> MetricsInput<'_> {
        match (team, secondary) {
            (Team::Setters, false) => MetricsInput {
                calls: &self.setters_calls,
                hours: &self.hours,
                scorecards: &self.setters_scorecards,
                latency: &self.stl,
            },
            (Team::Confirmers, false) => MetricsInput {
                calls: &self.confirmers_calls,
                hours: &self.hours,
                scorecards: &self.confirmers_scorecards,
                latency: &self.stl,
            },
            (Team::Setters, true) => MetricsInput {
                calls: &self.secondary_setters_calls,
                hours: &self.secondary_hours,
                scorecards: &self.secondary_setters_scorecards,
                latency: &self.secondary_stl,
            },
            (Team::Confirmers, true) => MetricsInput {
                calls: &self.secondary_confirmers_calls,
                hours: &self.secondary_hours,
                scorecards: &self.secondary_confirmers_scorecards,
                latency: &self.secondary_stl,
            },
        }
    }
}

/// Client for the single GET endpoint serving dashboard data.
#[derive(Clone)]
pub struct MetricsClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl MetricsClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|err| DashboardError::Config(format!("invalid metrics url `{endpoint}`: {err}")))?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, endpoint })
    }

    pub fn request_url(&self, primary: &DateWindow, secondary: Option<&DateWindow>) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in primary.query_pairs(false) {
                query.append_pair(&key, &value);
            }
            if let Some(window) = secondary {
                for (key, value) in window.query_pairs(true) {
                    query.append_pair(&key, &value);
                }
            }
        }
        url
    }

    pub async fn fetch(
        &self,
        primary: &DateWindow,
        secondary: Option<&DateWindow>,
    ) -> Result<MetricsPayload> {
        let url = self.request_url(primary, secondary);
        tracing::debug!(%url, "fetching metrics");

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DashboardError::FetchFailed(format!(
                "metrics endpoint answered {status}"
            )));
        }

        let body = response.text().await?;
        let payload: MetricsPayload = serde_json::from_str(&body)?;
        tracing::info!(
            setters = payload.setters_calls.len(),
            confirmers = payload.confirmers_calls.len(),
            hours = payload.hours.len(),
            stl = payload.stl.len(),
            "metrics fetched"
        );
        Ok(payload)
    }
}

/// Where a dashboard run gets its payload from.
#[derive(Clone)]
pub enum PayloadSource {
    File(PathBuf),
    Remote {
        client: MetricsClient,
        primary: DateWindow,
        secondary: Option<DateWindow>,
    },
}

impl PayloadSource {
    pub async fn load(&self) -> Result<MetricsPayload> {
        match self {
            PayloadSource::File(path) => load_payload_file(path),
            PayloadSource::Remote {
                client,
                primary,
                secondary,
            } => client.fetch(primary, secondary.as_ref()).await,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            PayloadSource::File(path) => path.display().to_string(),
            PayloadSource::Remote {
                primary, secondary, ..
            } => match secondary {
                Some(secondary) => format!("{}, secondary {}", primary.label(), secondary.label()),
                None => primary.label(),
            },
        }
    }
}

/// Reads a payload saved from the endpoint, for offline runs.
pub fn load_payload_file(path: &Path) -> Result<MetricsPayload> {
    let body = std::fs::read_to_string(path)
        .map_err(|err| DashboardError::FetchFailed(format!("{}: {err}", path.display())))?;
    Ok(serde_json::from_str(&body)?)
}
