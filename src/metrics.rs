use std::collections::{BTreeMap, BTreeSet};

use crate::exclusions::ExclusionIndex;
use crate::models::{
    CallRecord, EmployeeStats, HoursRecord, Metrics, ScorecardRecord, StlRecord, TableType,
    TeamMetrics,
};

pub const ALL_EMPLOYEES: &str = "all";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EmployeeFilter {
    #[default]
    All,
    Named(String),
}

impl EmployeeFilter {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(ALL_EMPLOYEES) {
            EmployeeFilter::All
        } else {
            EmployeeFilter::Named(trimmed.to_string())
        }
    }

    pub fn matches(&self, employee: &str) -> bool {
        match self {
            EmployeeFilter::All => true,
            EmployeeFilter::Named(name) => name == employee,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            EmployeeFilter::All => "all employees",
            EmployeeFilter::Named(name) => name,
        }
    }
}

/// Raw arrays for one team and one reporting window.
#[derive(Debug, Clone, Copy)]
pub struct MetricsInput<'a> {
    pub calls: &'a [CallRecord],
    pub hours: &'a [HoursRecord],
    pub scorecards: &'a [ScorecardRecord],
    pub latency: &'a [StlRecord],
}

#[derive(Debug, Clone, Copy, Default)]
struct Funnel {
    dials: usize,
    connected: usize,
    pitched: usize,
    positive: usize,
    qualified: usize,
    unqualified_positive: usize,
    appt_set: i64,
    issued: i64,
    net_issued: i64,
}

impl Funnel {
    fn add(&mut self, call: &CallRecord) {
        self.dials += 1;
        self.connected += usize::from(call.connected == 1);
        self.pitched += usize::from(call.pitched == 1);
        self.positive += usize::from(call.positive == 1);
        match call.qualified {
            Some(true) => self.qualified += 1,
            Some(false) if call.positive == 1 => self.unqualified_positive += 1,
            _ => {}
        }
        if let Some(set) = call.appt_set.filter(|set| *set > 0) {
            self.appt_set += set;
            self.issued += call.issued.unwrap_or(0);
            self.net_issued += call.net_issued.unwrap_or(0);
        }
    }

    fn horsepower(&self, hours: f64) -> i64 {
        horsepower(self.dials, self.connected, self.pitched, self.positive, hours)
    }

    fn issue_rate(&self) -> u32 {
        percentage(self.issued as f64, self.appt_set as f64)
    }

    fn net_issue_rate(&self) -> u32 {
        percentage(self.net_issued as f64, self.appt_set as f64)
    }
}

/// Derives per-employee and team KPIs with a single exclusion set applied to
/// every calculation.
pub fn aggregate(
    input: &MetricsInput<'_>,
    filter: &EmployeeFilter,
    excluded: &BTreeSet<String>,
) -> Metrics {
    let calls: Vec<&CallRecord> = input
        .calls
        .iter()
        .filter(|call| {
            call.exclusion_id()
                .map_or(true, |id| !excluded.contains(id))
        })
        .filter(|call| filter.matches(&call.employee))
        .collect();
    let hours: Vec<&HoursRecord> = input
        .hours
        .iter()
        .filter(|row| filter.matches(&row.employee))
        .collect();
    let scorecards: Vec<&ScorecardRecord> = input
        .scorecards
        .iter()
        .filter(|row| filter.matches(&row.employee))
        .collect();

    let mut team = Funnel::default();
    let mut groups: BTreeMap<&str, Funnel> = BTreeMap::new();
    for call in &calls {
        team.add(call);
        groups.entry(call.employee.as_str()).or_default().add(call);
    }

    let mut employees: Vec<EmployeeStats> = groups
        .into_iter()
        .map(|(employee, funnel)| {
            let employee_hours: f64 = hours
                .iter()
                .filter(|row| row.employee == employee)
                .map(|row| row.hours)
                .sum();
            EmployeeStats {
                employee: employee.to_string(),
                dials: funnel.dials,
                connected: funnel.connected,
                pitched: funnel.pitched,
                positive: funnel.positive,
                qualified: funnel.qualified,
                unqualified_positive: funnel.unqualified_positive,
                hours: employee_hours,
                horsepower: funnel.horsepower(employee_hours),
                connection_rate: percentage(funnel.connected as f64, funnel.dials as f64),
                pitch_rate: percentage(funnel.pitched as f64, funnel.connected as f64),
                conversion_rate: percentage(funnel.positive as f64, funnel.pitched as f64),
                gross_issue: percentage(funnel.positive as f64, funnel.dials as f64),
                issue_rate: funnel.issue_rate(),
                net_issue_rate: funnel.net_issue_rate(),
            }
        })
        .collect();
    employees.sort_by(|a, b| {
        b.horsepower
            .cmp(&a.horsepower)
            .then_with(|| a.employee.cmp(&b.employee))
    });

    let total_hours: f64 = hours.iter().map(|row| row.hours).sum();
    let has_data = !calls.is_empty() || !scorecards.is_empty();

    let mut metrics = TeamMetrics {
        dials: team.dials,
        connected: team.connected,
        pitched: team.pitched,
        positive: team.positive,
        qualified: team.qualified,
        unqualified_positive: team.unqualified_positive,
        total_hours,
        dials_per_hour: dials_per_hour(team.dials, total_hours),
        horsepower: team.horsepower(total_hours),
        connection_rate: percentage(team.connected as f64, team.dials as f64),
        pitch_rate: percentage(team.pitched as f64, team.connected as f64),
        conversion_rate: percentage(team.positive as f64, team.pitched as f64),
        conversion_qualified: percentage(team.qualified as f64, team.pitched as f64),
        conversion_unqualified: percentage(team.unqualified_positive as f64, team.pitched as f64),
        gross_issue: percentage(team.positive as f64, team.dials as f64),
        issue_rate: team.issue_rate(),
        net_issue_rate: team.net_issue_rate(),
        checkout_to_dial: checkout_to_dial(input.latency),
        score_card: scorecard_percentage(scorecards.iter().copied()),
        skill_score: 0,
        has_data,
    };
    metrics.skill_score = team_skill_score(&metrics);

    Metrics {
        employees,
        team: metrics,
    }
}

/// Same as [`aggregate`], except each KPI only honours the exclusions recorded
/// against its own table view, for the team and for every employee row.
///
/// Counts, hours, horsepower and issue rates come from the `dialsPerHour` view.
pub fn aggregate_scoped(
    input: &MetricsInput<'_>,
    filter: &EmployeeFilter,
    index: &ExclusionIndex,
) -> Metrics {
    let mut metrics = aggregate(input, filter, index.ids(TableType::DialsPerHour));
    let view = |table: TableType| aggregate(input, filter, index.ids(table));

    let connection = view(TableType::Connection);
    let pitch = view(TableType::Pitch);
    let conversion = view(TableType::Conversion);
    let gross_issue = view(TableType::GrossIssue);

    metrics.team.connection_rate = connection.team.connection_rate;
    metrics.team.pitch_rate = pitch.team.pitch_rate;
    metrics.team.conversion_rate = conversion.team.conversion_rate;
    metrics.team.conversion_qualified =
        view(TableType::ConversionQualified).team.conversion_qualified;
    metrics.team.conversion_unqualified =
        view(TableType::ConversionUnqualified).team.conversion_unqualified;
    metrics.team.gross_issue = gross_issue.team.gross_issue;

    for row in &mut metrics.employees {
        row.connection_rate = employee_rate(&connection, &row.employee, |e| e.connection_rate);
        row.pitch_rate = employee_rate(&pitch, &row.employee, |e| e.pitch_rate);
        row.conversion_rate = employee_rate(&conversion, &row.employee, |e| e.conversion_rate);
        row.gross_issue = employee_rate(&gross_issue, &row.employee, |e| e.gross_issue);
    }

    let stl_excluded = index.ids(TableType::Stl);
    let latency: Vec<StlRecord> = input
        .latency
        .iter()
        .filter(|sample| {
            sample
                .lead_id
                .as_deref()
                .map_or(true, |id| !stl_excluded.contains(id))
        })
        .cloned()
        .collect();
    metrics.team.checkout_to_dial = checkout_to_dial(&latency);
    metrics.team.skill_score = team_skill_score(&metrics.team);
    metrics
}

/// An employee whose calls are all excluded from a view reads 0 there.
fn employee_rate(view: &Metrics, employee: &str, rate: fn(&EmployeeStats) -> u32) -> u32 {
    view.employees
        .iter()
        .find(|row| row.employee == employee)
        .map_or(0, rate)
}

/// Funnel-weighted throughput per hour.
pub fn horsepower(dials: usize, connected: usize, pitched: usize, positive: usize, hours: f64) -> i64 {
    if dials == 0 || hours <= 0.0 || !hours.is_finite() {
        return 0;
    }
    let (dials, connected, pitched, positive) =
        (dials as f64, connected as f64, pitched as f64, positive as f64);
    let weighted = (dials - connected)
        + (connected - pitched) * 1.5
        + (pitched - positive) * 4.0
        + positive * 10.0;
    (weighted / hours).round() as i64
}

/// `round(numerator / denominator * 100)`, or 0 when the denominator is empty.
pub fn percentage(numerator: f64, denominator: f64) -> u32 {
    if denominator <= 0.0 || !denominator.is_finite() || !numerator.is_finite() {
        return 0;
    }
    (numerator / denominator * 100.0).round().max(0.0) as u32
}

pub fn dials_per_hour(dials: usize, hours: f64) -> u32 {
    if dials == 0 || hours <= 0.0 || !hours.is_finite() {
        return 0;
    }
    (dials as f64 / hours).round() as u32
}

/// Mean latency over samples with a positive value; zero samples are missing
/// measurements rather than instant dials.
pub fn checkout_to_dial(samples: &[StlRecord]) -> f64 {
    let (total, count) = samples
        .iter()
        .map(|sample| sample.stl)
        .filter(|stl| *stl > 0.0 && stl.is_finite())
        .fold((0.0, 0usize), |(total, count), stl| (total + stl, count + 1));
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

pub fn scorecard_percentage<'a>(rows: impl IntoIterator<Item = &'a ScorecardRecord>) -> u32 {
    let (actual, max) = rows
        .into_iter()
        .fold((0.0, 0.0), |(actual, max), row| {
            (actual + row.actual_total, max + row.max_total)
        });
    percentage(actual, max)
}

pub fn skill_score(
    score_card: u32,
    conversion_qualified: u32,
    conversion_unqualified: u32,
    gross_issue: u32,
) -> u32 {
    let normalize = |value: u32, ceiling: f64| (value as f64 / ceiling).min(1.0);
    let blended = 0.40 * normalize(score_card, 100.0)
        + 0.10 * normalize(conversion_qualified, 100.0)
        + 0.30 * normalize(conversion_unqualified, 40.0)
        + 0.20 * normalize(gross_issue, 85.0);
    ((100.0 * blended).round() as u32).min(100)
}

fn team_skill_score(team: &TeamMetrics) -> u32 {
    if !team.has_data {
        return 0;
    }
    skill_score(
        team.score_card,
        team.conversion_qualified,
        team.conversion_unqualified,
        team.gross_issue,
    )
}
