use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::de;

/// One dialed call as delivered by the metrics endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    #[serde(default, deserialize_with = "de::opt_id")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "de::text")]
    pub employee: String,
    #[serde(default, deserialize_with = "de::opt_timestamp")]
    pub date: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "de::flag")]
    pub connected: u8,
    #[serde(default, deserialize_with = "de::flag")]
    pub pitched: u8,
    #[serde(default, deserialize_with = "de::flag")]
    pub positive: u8,
    #[serde(default, deserialize_with = "de::tri_state")]
    pub qualified: Option<bool>,
    #[serde(rename = "ApptSet", default, deserialize_with = "de::opt_count")]
    pub appt_set: Option<i64>,
    #[serde(rename = "Issued", default, deserialize_with = "de::opt_count")]
    pub issued: Option<i64>,
    #[serde(rename = "NetIssued", default, deserialize_with = "de::opt_count")]
    pub net_issued: Option<i64>,
}

impl CallRecord {
    /// Identifier used for exclusion; records without one can never be excluded.
    pub fn exclusion_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HoursRecord {
    #[serde(default, deserialize_with = "de::text")]
    pub employee: String,
    #[serde(default, deserialize_with = "de::number")]
    pub hours: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScorecardRecord {
    #[serde(default, deserialize_with = "de::text")]
    pub employee: String,
    #[serde(default, deserialize_with = "de::number")]
    pub actual_total: f64,
    #[serde(default, deserialize_with = "de::number")]
    pub max_total: f64,
}

/// Checkout-to-dial latency sample for a single lead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StlRecord {
    #[serde(default, deserialize_with = "de::opt_id")]
    pub lead_id: Option<String>,
    #[serde(default, deserialize_with = "de::text")]
    pub employee: String,
    #[serde(default, deserialize_with = "de::number")]
    pub stl: f64,
    #[serde(default, deserialize_with = "de::opt_timestamp")]
    pub checkout_time: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "de::opt_timestamp")]
    pub first_call_time: Option<NaiveDateTime>,
}

/// Table views that can carry their own exclusions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TableType {
    Stl,
    Conversion,
    Pitch,
    Connection,
    DialsPerHour,
    GrossIssue,
    ConversionQualified,
    ConversionUnqualified,
}

impl TableType {
    pub const ALL: [TableType; 8] = [
        TableType::Stl,
        TableType::Conversion,
        TableType::Pitch,
        TableType::Connection,
        TableType::DialsPerHour,
        TableType::GrossIssue,
        TableType::ConversionQualified,
        TableType::ConversionUnqualified,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TableType::Stl => "stl",
            TableType::Conversion => "conversion",
            TableType::Pitch => "pitch",
            TableType::Connection => "connection",
            TableType::DialsPerHour => "dialsPerHour",
            TableType::GrossIssue => "grossIssue",
            TableType::ConversionQualified => "conversionQualified",
            TableType::ConversionUnqualified => "conversionUnqualified",
        }
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        TableType::ALL
            .into_iter()
            .find(|table| table.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| format!("unknown table type `{value}`"))
    }
}

/// One active exclusion. At most one exists per `(table_type, record_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExclusionEntry {
    pub id: Uuid,
    pub table_type: TableType,
    pub record_id: String,
    pub excluded_at: DateTime<Utc>,
    pub excluded_by: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(format!("unknown role `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub lp_id: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeStats {
    pub employee: String,
    pub dials: usize,
    pub connected: usize,
    pub pitched: usize,
    pub positive: usize,
    pub qualified: usize,
    pub unqualified_positive: usize,
    pub hours: f64,
    pub horsepower: i64,
    pub connection_rate: u32,
    pub pitch_rate: u32,
    pub conversion_rate: u32,
    pub gross_issue: u32,
    pub issue_rate: u32,
    pub net_issue_rate: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMetrics {
    pub dials: usize,
    pub connected: usize,
    pub pitched: usize,
    pub positive: usize,
    pub qualified: usize,
    pub unqualified_positive: usize,
    pub total_hours: f64,
    pub dials_per_hour: u32,
    pub horsepower: i64,
    pub connection_rate: u32,
    pub pitch_rate: u32,
    pub conversion_rate: u32,
    pub conversion_qualified: u32,
    pub conversion_unqualified: u32,
    pub gross_issue: u32,
    pub issue_rate: u32,
    pub net_issue_rate: u32,
    /// Average seconds from lead checkout to first dial.
    pub checkout_to_dial: f64,
    pub score_card: u32,
    pub skill_score: u32,
    pub has_data: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub employees: Vec<EmployeeStats>,
    pub team: TeamMetrics,
}
