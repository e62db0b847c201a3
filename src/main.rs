use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use sqlx::PgPool;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use uuid::Uuid;

mod config;
mod db;
mod de;
mod error;
mod exclusions;
mod gauge;
mod logging;
mod metrics;
mod models;
mod refresh;
mod report;
mod source;
mod users;

use config::DashboardConfig;
use error::DashboardError;
use exclusions::{ExclusionIndex, ExclusionRepository, ExclusionStore, MemoryExclusionRepository};
use metrics::EmployeeFilter;
use models::{Metrics, Role, TableType, UserData};
use refresh::{FetchGate, FetchTicket, RefreshTrigger};
use source::{DateWindow, MetricsClient, MetricsPayload, PayloadSource, Team};

#[derive(Parser)]
#[command(name = "kpi-dashboard")]
#[command(about = "Call center KPI dashboard with shared record exclusions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Print team KPIs and the top employees
    Score {
        #[command(flatten)]
        data: DataArgs,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Print the full metrics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        data: DataArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Export per-employee stats as CSV
    Export {
        #[command(flatten)]
        data: DataArgs,
        #[arg(long, default_value = "employees.csv")]
        out: PathBuf,
    },
    /// Refetch on an interval and re-render whenever exclusions change
    Watch {
        #[command(flatten)]
        data: DataArgs,
    },
    /// Exclude records from one table's calculations
    Exclude {
        #[arg(long)]
        table: TableType,
        #[arg(required = true, value_delimiter = ',')]
        ids: Vec<String>,
    },
    /// Bring excluded records back into one table's calculations
    Restore {
        #[arg(long)]
        table: TableType,
        #[arg(required = true, value_delimiter = ',')]
        ids: Vec<String>,
    },
    /// Restore exclusions by their entry id
    RestoreEntry {
        #[arg(required = true, value_delimiter = ',')]
        entry_ids: Vec<Uuid>,
    },
    /// List active exclusions, or check whether given records are excluded
    Excluded {
        #[arg(long)]
        table: Option<TableType>,
        #[arg(requires = "table", value_delimiter = ',')]
        ids: Vec<String>,
    },
    /// Manage dashboard accounts
    Users {
        #[command(subcommand)]
        command: UsersCommand,
    },
}

#[derive(Subcommand)]
enum UsersCommand {
    Add {
        #[arg(long)]
        email: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        lp_id: String,
        #[arg(long, default_value = "user")]
        role: Role,
        #[arg(long, env = "NEW_USER_PASSWORD")]
        password: String,
    },
    List,
    Delete {
        id: Uuid,
    },
}

#[derive(Args, Clone)]
struct DataArgs {
    /// Read a saved payload instead of calling METRICS_API_URL
    #[arg(long)]
    from_file: Option<PathBuf>,
    #[arg(long, default_value = "Today")]
    date_range: String,
    #[arg(long)]
    start_date: Option<NaiveDate>,
    #[arg(long)]
    end_date: Option<NaiveDate>,
    #[arg(long)]
    secondary_date_range: Option<String>,
    #[arg(long)]
    secondary_start_date: Option<NaiveDate>,
    #[arg(long)]
    secondary_end_date: Option<NaiveDate>,
    /// Aggregate the secondary window instead of the primary one
    #[arg(long)]
    secondary: bool,
    #[arg(long, default_value = "setters")]
    team: Team,
    #[arg(long, default_value = metrics::ALL_EMPLOYEES)]
    employee: String,
}

impl DataArgs {
    fn payload_source(&self, config: &DashboardConfig) -> anyhow::Result<PayloadSource> {
        if let Some(path) = &self.from_file {
            return Ok(PayloadSource::File(path.clone()));
        }
        let primary = DateWindow::new(&self.date_range, self.start_date, self.end_date)?;
        let secondary = self
            .secondary_date_range
            .as_deref()
            .map(|range| DateWindow::new(range, self.secondary_start_date, self.secondary_end_date))
            .transpose()?;
        if self.secondary && secondary.is_none() {
            return Err(DashboardError::ValidationFailed(
                "--secondary needs --secondary-date-range".to_string(),
            )
            .into());
        }
        let client = MetricsClient::new(config.metrics_api_url()?, config.fetch_timeout)?;
        Ok(PayloadSource::Remote {
            client,
            primary,
            secondary,
        })
    }

    fn compute(&self, payload: &MetricsPayload, index: &ExclusionIndex) -> Metrics {
        let input = payload.input(self.team, self.secondary);
        metrics::aggregate_scoped(&input, &EmployeeFilter::parse(&self.employee), index)
    }
}

type Store = ExclusionStore<Box<dyn ExclusionRepository>>;
type FetchResult = (FetchTicket, error::Result<MetricsPayload>);

/// Trimmed, non-blank, de-duplicated record ids as the store sees them.
fn distinct_ids(ids: &[String]) -> BTreeSet<&str> {
    ids.iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .collect()
}

async fn open_store(config: &DashboardConfig) -> anyhow::Result<Store> {
    match config.database_url.as_deref() {
        Some(url) => {
            let pool = db::connect(url)
                .await
                .context("failed to connect to Postgres")?;
            let repository: Box<dyn ExclusionRepository> =
                Box::new(db::PgExclusionRepository::new(pool));
            Ok(ExclusionStore::open(repository).await?)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; running without shared exclusions");
            let repository: Box<dyn ExclusionRepository> =
                Box::new(MemoryExclusionRepository::default());
            Ok(ExclusionStore::open(repository).await?)
        }
    }
}

async fn require_pool(config: &DashboardConfig) -> anyhow::Result<PgPool> {
    let url = config.database_url()?;
    db::connect(url)
        .await
        .context("failed to connect to Postgres")
}

/// Signs in with DASHBOARD_ACTOR / DASHBOARD_PASSWORD, if both are set.
async fn sign_in(pool: &PgPool, config: &DashboardConfig) -> anyhow::Result<Option<UserData>> {
    let (Some(email), Some(password)) = (&config.actor_email, &config.actor_password) else {
        return Ok(None);
    };
    let user = db::authenticate(pool, email, password).await?;
    if user.is_none() {
        tracing::warn!(email = %email, "sign in failed");
    }
    Ok(user)
}

async fn require_admin(pool: &PgPool, config: &DashboardConfig) -> anyhow::Result<UserData> {
    match sign_in(pool, config).await? {
        Some(user) if user.role == Role::Admin => Ok(user),
        _ => Err(DashboardError::Unauthenticated("manage users").into()),
    }
}

fn print_summary(scope: &str, metrics: &Metrics, limit: usize) {
    let team = &metrics.team;
    if !team.has_data {
        println!("No calls or scorecards found for {scope}.");
        return;
    }

    println!("Team KPIs for {scope}:");
    for (gauge, value) in report::gauge_readings(team) {
        println!(
            "- {}: {} [{}]",
            gauge.label,
            report::format_reading(&gauge, value),
            gauge.color(value)
        );
    }

    if metrics.employees.is_empty() {
        return;
    }
    println!("Top employees by horsepower:");
    for employee in metrics.employees.iter().take(limit) {
        println!(
            "- {} horsepower {} across {} dials ({:.1}h, {}% connect, {}% pitch, {}% conversion)",
            employee.employee,
            employee.horsepower,
            employee.dials,
            employee.hours,
            employee.connection_rate,
            employee.pitch_rate,
            employee.conversion_rate
        );
    }
}

fn start_fetch(
    gate: &mut FetchGate,
    trigger: RefreshTrigger,
    source: &PayloadSource,
    results: &mpsc::Sender<FetchResult>,
) {
    let Some(ticket) = gate.request(trigger, Instant::now()) else {
        return;
    };
    let source = source.clone();
    let results = results.clone();
    tokio::spawn(async move {
        let outcome = source.load().await;
        let _ = results.send((ticket, outcome)).await;
    });
}

async fn watch(data: DataArgs, config: DashboardConfig) -> anyhow::Result<()> {
    let source = data.payload_source(&config)?;
    let store = open_store(&config).await?;
    let mut exclusions = store.subscribe();
    let mut gate = FetchGate::new(&config.refresh);
    let mut ticker = tokio::time::interval(config.refresh.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let (results, mut finished) = mpsc::channel::<FetchResult>(4);
    let mut operator = BufReader::new(tokio::io::stdin()).lines();
    let mut operator_open = true;
    let mut latest: Option<Arc<MetricsPayload>> = None;
    let scope = format!("{} ({})", EmployeeFilter::parse(&data.employee).label(), source.describe());

    tracing::info!(interval = ?config.refresh.interval, "watching metrics; press Enter to refresh now");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = store.reload().await {
                    tracing::error!(error = %err, "could not refresh exclusions");
                }
                start_fetch(&mut gate, RefreshTrigger::Interval, &source, &results);
            }
            line = operator.next_line(), if operator_open => {
                match line {
                    Ok(Some(_)) => {
                        if let Err(err) = store.reload().await {
                            tracing::error!(error = %err, "could not refresh exclusions");
                        }
                        start_fetch(&mut gate, RefreshTrigger::Resume, &source, &results);
                    }
                    // stdin closed or unreadable; keep refreshing on the interval
                    _ => operator_open = false,
                }
            }
            Some((ticket, outcome)) = finished.recv() => {
                if !gate.is_current(ticket) {
                    tracing::debug!("discarding superseded fetch");
                    continue;
                }
                match outcome {
                    Ok(payload) => {
                        let payload = Arc::new(payload);
                        print_summary(&scope, &data.compute(&payload, &store.index()), 10);
                        latest = Some(payload);
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "metrics fetch failed; retrying on next refresh");
                    }
                }
            }
            changed = exclusions.changed() => {
                if changed.is_err() {
                    break;
                }
                let index = ExclusionIndex::from_entries(&exclusions.borrow_and_update());
                if let Some(payload) = &latest {
                    if index.is_empty() {
                        tracing::info!("all exclusions restored");
                    } else {
                        tracing::info!(exclusions = index.len(), "exclusions changed");
                    }
                    print_summary(&scope, &data.compute(payload, &index), 10);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("stopping");
                break;
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = DashboardConfig::from_env().context("invalid configuration")?;
    logging::init_tracing(&config.log_level).context("failed to initialise logging")?;

    match cli.command {
        Commands::InitDb => {
            let pool = require_pool(&config).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Score { data, limit, json } => {
            let source = data.payload_source(&config)?;
            let payload = source.load().await.context("failed to load metrics")?;
            let store = open_store(&config).await?;
            let metrics = data.compute(&payload, &store.index());

            if json {
                println!("{}", serde_json::to_string_pretty(&metrics)?);
            } else {
                let scope = EmployeeFilter::parse(&data.employee);
                print_summary(scope.label(), &metrics, limit);
            }
        }
        Commands::Report { data, out } => {
            let source = data.payload_source(&config)?;
            let payload = source.load().await.context("failed to load metrics")?;
            let store = open_store(&config).await?;
            let index = store.index();
            let metrics = data.compute(&payload, &index);
            let scope = EmployeeFilter::parse(&data.employee);

            let report = report::build_report(scope.label(), &source.describe(), &metrics, index.len());
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { data, out } => {
            let source = data.payload_source(&config)?;
            let payload = source.load().await.context("failed to load metrics")?;
            let store = open_store(&config).await?;
            let metrics = data.compute(&payload, &store.index());

            let written = report::write_employee_csv(&out, &metrics.employees)?;
            println!("Wrote {written} employees to {}.", out.display());
        }
        Commands::Watch { data } => {
            watch(data, config).await?;
        }
        Commands::Exclude { table, ids } => {
            let pool = require_pool(&config).await?;
            let actor = sign_in(&pool, &config).await?;
            let store = ExclusionStore::open(db::PgExclusionRepository::new(pool)).await?;
            let added = store
                .exclude_records(actor.as_ref().map(|user| user.email.as_str()), table, &ids)
                .await?;
            let skipped = distinct_ids(&ids).len().saturating_sub(added);
            println!("Excluded {added} records from {table} ({skipped} already excluded).");
        }
        Commands::Restore { table, ids } => {
            let pool = require_pool(&config).await?;
            let actor = sign_in(&pool, &config).await?;
            let store = ExclusionStore::open(db::PgExclusionRepository::new(pool)).await?;
            let restored = store
                .restore_records(actor.as_ref().map(|user| user.email.as_str()), table, &ids)
                .await?;
            println!("Restored {restored} records to {table}.");
        }
        Commands::RestoreEntry { entry_ids } => {
            let pool = require_pool(&config).await?;
            let actor = sign_in(&pool, &config).await?;
            let store = ExclusionStore::open(db::PgExclusionRepository::new(pool)).await?;
            let actor = actor.as_ref().map(|user| user.email.as_str());
            let restored = match entry_ids.as_slice() {
                [single] => store.restore_by_doc_id(actor, *single).await?,
                many => store.restore_by_doc_ids(actor, many).await?,
            };
            println!("Restored {restored} exclusion entries.");
        }
        Commands::Excluded { table, ids } => {
            let pool = require_pool(&config).await?;
            let store = ExclusionStore::open(db::PgExclusionRepository::new(pool)).await?;
            if let (Some(table), false) = (table, ids.is_empty()) {
                for id in distinct_ids(&ids) {
                    let state = if store.is_excluded(table, id) { "excluded" } else { "included" };
                    println!("- {id}: {state} in {table}");
                }
                return Ok(());
            }
            let snapshot = store.snapshot();
            let entries: Vec<_> = snapshot
                .iter()
                .filter(|entry| table.map_or(true, |table| entry.table_type == table))
                .collect();

            if entries.is_empty() {
                println!("No active exclusions.");
                return Ok(());
            }
            for entry in entries {
                println!(
                    "- {} {} record {} by {} at {}",
                    entry.id,
                    entry.table_type,
                    entry.record_id,
                    entry.excluded_by,
                    entry.excluded_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        Commands::Users { command } => {
            let pool = require_pool(&config).await?;
            match command {
                UsersCommand::Add {
                    email,
                    first_name,
                    last_name,
                    lp_id,
                    role,
                    password,
                } => {
                    if db::list_users(&pool).await?.is_empty() {
                        tracing::info!("user directory is empty; creating the first account");
                    } else {
                        require_admin(&pool, &config).await?;
                    }
                    let user = db::create_user(
                        &pool,
                        users::NewUser {
                            email,
                            first_name,
                            last_name,
                            lp_id,
                            role,
                            password,
                        },
                    )
                    .await?;
                    println!("Created {} ({}) as {}.", user.email, user.id, user.role.as_str());
                }
                UsersCommand::List => {
                    let users = db::list_users(&pool).await?;
                    if users.is_empty() {
                        println!("No users.");
                    }
                    for user in users {
                        println!(
                            "- {} {} <{}> lp {} [{}] {}",
                            user.first_name,
                            user.last_name,
                            user.email,
                            user.lp_id,
                            user.role.as_str(),
                            user.id
                        );
                    }
                }
                UsersCommand::Delete { id } => {
                    let actor = require_admin(&pool, &config).await?;
                    db::delete_user(&pool, &actor, id).await?;
                    println!("Deleted user {id}.");
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::refresh::RefreshPolicy;

    fn data_args(args: &[&str]) -> DataArgs {
        let mut argv = vec!["kpi-dashboard", "score"];
        argv.extend_from_slice(args);
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Commands::Score { data, .. } => data,
            _ => unreachable!(),
        }
    }

    fn config() -> DashboardConfig {
        DashboardConfig {
            database_url: None,
            metrics_api_url: Some("https://metrics.example.com/api/dashboard".to_string()),
            actor_email: None,
            actor_password: None,
            refresh: RefreshPolicy::default(),
            fetch_timeout: Duration::from_secs(5),
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn secondary_needs_a_secondary_window() {
        let err = data_args(&["--secondary"])
            .payload_source(&config())
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<DashboardError>(),
            Some(DashboardError::ValidationFailed(_))
        ));

        let source = data_args(&["--secondary", "--secondary-date-range", "Last Week"])
            .payload_source(&config())
            .unwrap();
        assert_eq!(source.describe(), "Today, secondary Last Week");
    }

    #[test]
    fn saved_payloads_ignore_the_secondary_window() {
        let source = data_args(&["--secondary", "--from-file", "demos/payload.json"])
            .payload_source(&config())
            .unwrap();
        assert!(matches!(source, PayloadSource::File(_)));
    }

    #[test]
    fn distinct_ids_drop_blanks_and_repeats() {
        let ids: Vec<String> = ["7", " 7 ", "", "  ", "9"]
            .into_iter()
            .map(String::from)
            .collect();
        let distinct: Vec<&str> = distinct_ids(&ids).into_iter().collect();
        assert_eq!(distinct, vec!["7", "9"]);
    }

    #[test]
    fn checking_ids_requires_a_table() {
        assert!(Cli::try_parse_from(["kpi-dashboard", "excluded", "7"]).is_err());
        let cli = Cli::try_parse_from(["kpi-dashboard", "excluded", "--table", "pitch", "7,9"]).unwrap();
        match cli.command {
            Commands::Excluded { table, ids } => {
                assert_eq!(table, Some(TableType::Pitch));
                assert_eq!(ids, vec!["7", "9"]);
            }
            _ => unreachable!(),
        }
    }
}
