use std::fmt::Write;
use std::path::Path;

use crate::error::{DashboardError, Result};
use crate::gauge::{self, Gauge};
use crate::models::{EmployeeStats, Metrics, TeamMetrics};

/// Team KPIs paired with the gauge that colours them.
pub fn gauge_readings(team: &TeamMetrics) -> Vec<(Gauge, f64)> {
    vec![
        (gauge::DIALS_PER_HOUR, team.dials_per_hour as f64),
        (gauge::HORSEPOWER, team.horsepower as f64),
        (gauge::CONNECTION_RATE, team.connection_rate as f64),
        (gauge::PITCH_RATE, team.pitch_rate as f64),
        (gauge::CONVERSION_RATE, team.conversion_rate as f64),
        (gauge::GROSS_ISSUE, team.gross_issue as f64),
        (gauge::SCORECARD, team.score_card as f64),
        (gauge::SKILL_SCORE, team.skill_score as f64),
        (gauge::CHECKOUT_TO_DIAL, team.checkout_to_dial),
    ]
}

pub fn format_reading(gauge: &Gauge, value: f64) -> String {
    if gauge.lower_is_better {
        format!("{value:.0}{}", gauge.unit)
    } else {
        format!("{value}{}", gauge.unit)
    }
}

pub fn build_report(scope: &str, window: &str, metrics: &Metrics, excluded: usize) -> String {
    let team = &metrics.team;
    let mut output = String::new();

    let _ = writeln!(output, "# Call Center Performance");
    let _ = writeln!(output, "Generated for {scope} ({window})");
    if excluded > 0 {
        let _ = writeln!(output, "{excluded} record exclusions applied.");
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "## Team Gauges");

    if !team.has_data {
        let _ = writeln!(output, "No calls or scorecards recorded for this window.");
    } else {
        let _ = writeln!(output, "| Metric | Value | Band |");
        let _ = writeln!(output, "|---|---|---|");
        for (gauge, value) in gauge_readings(team) {
            let color = gauge.color(value);
            let _ = writeln!(
                output,
                "| {} | {} | {} ({}) |",
                gauge.label,
                format_reading(&gauge, value),
                color,
                color.hex()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Funnel");
    let _ = writeln!(
        output,
        "- {} dials, {} connected, {} pitched, {} positive over {:.1} hours (dials per hour view)",
        team.dials, team.connected, team.pitched, team.positive, team.total_hours
    );
    let _ = writeln!(
        output,
        "- qualified conversion {}%, unqualified conversion {}%",
        team.conversion_qualified, team.conversion_unqualified
    );
    if team.issue_rate > 0 || team.net_issue_rate > 0 {
        let _ = writeln!(
            output,
            "- issue rate {}%, net issue rate {}%",
            team.issue_rate, team.net_issue_rate
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Employees");

    if metrics.employees.is_empty() {
        let _ = writeln!(output, "No employees dialed in this window.");
    } else {
        let _ = writeln!(
            output,
            "| Employee | Dials | Hours | Horsepower | Connect % | Pitch % | Conversion % |"
        );
        let _ = writeln!(output, "|---|---|---|---|---|---|---|");
        for employee in &metrics.employees {
            let _ = writeln!(
                output,
                "| {} | {} | {:.1} | {} | {} | {} | {} |",
                employee.employee,
                employee.dials,
                employee.hours,
                employee.horsepower,
                employee.connection_rate,
                employee.pitch_rate,
                employee.conversion_rate
            );
        }
    }

    output
}

pub fn write_employee_csv(path: &Path, employees: &[EmployeeStats]) -> Result<usize> {
    let at_path = |err: &dyn std::fmt::Display| DashboardError::Io(format!("{}: {err}", path.display()));
    let mut writer = csv::Writer::from_path(path).map_err(|err| at_path(&err))?;
    for employee in employees {
        writer.serialize(employee).map_err(|err| at_path(&err))?;
    }
    writer.flush().map_err(|err| at_path(&err))?;
    Ok(employees.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> Metrics {
        Metrics {
            employees: vec![EmployeeStats {
                employee: "Dana".to_string(),
                dials: 3,
                connected: 2,
                pitched: 1,
                positive: 1,
                hours: 3.0,
                horsepower: 4,
                connection_rate: 67,
                pitch_rate: 50,
                conversion_rate: 100,
                gross_issue: 33,
                ..EmployeeStats::default()
            }],
            team: TeamMetrics {
                dials: 3,
                connected: 2,
                pitched: 1,
                positive: 1,
                total_hours: 3.0,
                dials_per_hour: 1,
                horsepower: 4,
                connection_rate: 67,
                checkout_to_dial: 45.0,
                has_data: true,
                ..TeamMetrics::default()
            },
        }
    }

    #[test]
    fn report_lists_gauges_and_employees() {
        let report = build_report("all employees", "This Week", &metrics(), 2);

        assert!(report.contains("Generated for all employees (This Week)"));
        assert!(report.contains("2 record exclusions applied."));
        assert!(report.contains("| Connection rate | 67% | blue (#1e88e5) |"));
        assert!(report.contains("| Checkout to dial | 45s | blue (#1e88e5) |"));
        assert!(report.contains("| Dana | 3 | 3.0 | 4 | 67 | 50 | 100 |"));
    }

    #[test]
    fn empty_windows_say_so() {
        let report = build_report("Dana", "Today", &Metrics::default(), 0);
        assert!(report.contains("No calls or scorecards recorded"));
        assert!(report.contains("No employees dialed"));
        assert!(!report.contains("exclusions applied"));
    }

    #[test]
    fn employee_csv_has_a_row_per_employee() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("employees.csv");

        let written = write_employee_csv(&path, &metrics().employees).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();

        assert_eq!(written, 1);
        let mut lines = contents.lines();
        assert!(lines.next().unwrap().starts_with("employee,dials,connected"));
        assert!(lines.next().unwrap().starts_with("Dana,3,2,1,1"));
    }

    #[test]
    fn unwritable_csv_paths_are_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("employees.csv");

        let err = write_employee_csv(&path, &metrics().employees).unwrap_err();
        assert!(matches!(err, DashboardError::Io(_)));
        assert!(err.to_string().contains("employees.csv"));
    }
}
