//! Lenient field decoders for the metrics payload.
//!
//! The upstream report mixes numbers, numeric strings, booleans and nulls for
//! the same column depending on how the row was produced, so each decoder goes
//! through `serde_json::Value` and normalises instead of rejecting the row.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub fn opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(raw) => {
            let trimmed = raw.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}

pub fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(raw) => raw.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => String::new(),
    })
}

pub fn opt_timestamp<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(raw) => parse_timestamp(raw.trim()),
        _ => None,
    })
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_utc());
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// 0/1 funnel flag. Anything truthy collapses to 1.
pub fn flag<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(flag) => u8::from(flag),
        Value::Number(number) => u8::from(number.as_f64().is_some_and(|n| n > 0.0)),
        Value::String(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => 1,
            other => u8::from(finite(other).is_some_and(|n| n > 0.0)),
        },
        _ => 0,
    })
}

pub fn tri_state<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(flag) => Some(flag),
        Value::Number(number) => number.as_f64().map(|n| n > 0.0),
        Value::String(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

pub fn opt_count<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|n| n.round() as i64)),
        Value::String(raw) => finite(&raw).map(|n| n.round() as i64),
        _ => None,
    })
}

pub fn number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(number) => number.as_f64().unwrap_or(0.0),
        Value::String(raw) => finite(&raw).unwrap_or(0.0),
        _ => 0.0,
    })
}

/// `"NaN"` and `"inf"` parse as floats but are never usable quantities.
fn finite(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use crate::metrics::{aggregate, EmployeeFilter, MetricsInput};
    use crate::models::{CallRecord, HoursRecord};

    #[test]
    fn call_record_accepts_mixed_column_types() {
        let call: CallRecord = serde_json::from_str(
            r#"{"id": 42, "employee": " Dana ", "date": "2026-03-02 09:15:00",
                "connected": "1", "pitched": true, "positive": 0,
                "qualified": null, "ApptSet": "2", "Issued": 1.0}"#,
        )
        .unwrap();

        assert_eq!(call.id.as_deref(), Some("42"));
        assert_eq!(call.employee, "Dana");
        assert!(call.date.is_some());
        assert_eq!((call.connected, call.pitched, call.positive), (1, 1, 0));
        assert_eq!(call.qualified, None);
        assert_eq!(call.appt_set, Some(2));
        assert_eq!(call.issued, Some(1));
        assert_eq!(call.net_issued, None);
    }

    #[test]
    fn blank_id_is_treated_as_missing() {
        let call: CallRecord = serde_json::from_str(r#"{"id": "  ", "employee": "Dana"}"#).unwrap();
        assert_eq!(call.id, None);
        assert_eq!(call.exclusion_id(), None);
    }

    #[test]
    fn hours_parse_from_strings() {
        let row: HoursRecord = serde_json::from_str(r#"{"employee": "Dana", "hours": "7.5"}"#).unwrap();
        assert_eq!(row.hours, 7.5);
    }

    #[test]
    fn non_finite_strings_read_as_missing() {
        for raw in ["NaN", "inf", "-infinity"] {
            let row: HoursRecord =
                serde_json::from_str(&format!(r#"{{"employee": "Eli", "hours": "{raw}"}}"#)).unwrap();
            assert_eq!(row.hours, 0.0);

            let call: CallRecord =
                serde_json::from_str(&format!(r#"{{"employee": "Eli", "ApptSet": "{raw}"}}"#)).unwrap();
            assert_eq!(call.appt_set, None);
        }
    }

    #[test]
    fn one_bad_hours_row_leaves_team_throughput_intact() {
        let hours: Vec<HoursRecord> = serde_json::from_str(
            r#"[{"employee": "Dana", "hours": 3}, {"employee": "Eli", "hours": "NaN"}]"#,
        )
        .unwrap();
        let calls: Vec<CallRecord> = serde_json::from_str(
            r#"[{"id": 1, "employee": "Dana", "connected": 1, "pitched": 1, "positive": 1},
                {"id": 2, "employee": "Dana"}, {"id": 3, "employee": "Dana"}]"#,
        )
        .unwrap();
        let input = MetricsInput {
            calls: &calls,
            hours: &hours,
            scorecards: &[],
            latency: &[],
        };
        let metrics = aggregate(&input, &EmployeeFilter::All, &BTreeSet::new());

        assert_eq!(metrics.team.total_hours, 3.0);
        assert_eq!(metrics.team.dials_per_hour, 1);
        assert_eq!(metrics.team.horsepower, 4);
    }

    #[test]
    fn timestamps_accept_common_shapes() {
        assert!(super::parse_timestamp("2026-03-02T09:15:00Z").is_some());
        assert!(super::parse_timestamp("2026-03-02T09:15:00.250").is_some());
        assert!(super::parse_timestamp("2026-03-02").is_some());
        assert!(super::parse_timestamp("yesterday").is_none());
    }
}
