use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{DashboardError, Result};
use crate::exclusions::ExclusionRepository;
use crate::models::{ExclusionEntry, Role, TableType, UserData};
use crate::users::{self, NewUser};

pub async fn connect(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn init_db(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Clone)]
pub struct PgExclusionRepository {
    pool: PgPool,
}

impl PgExclusionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn exclusion_from_row(row: &PgRow) -> Result<ExclusionEntry> {
    let table_type: String = row.try_get("table_type")?;
    Ok(ExclusionEntry {
        id: row.try_get("id")?,
        table_type: table_type
            .parse::<TableType>()
            .map_err(DashboardError::StoreUnavailable)?,
        record_id: row.try_get("record_id")?,
        excluded_at: row.try_get("excluded_at")?,
        excluded_by: row.try_get("excluded_by")?,
    })
}

#[async_trait]
impl ExclusionRepository for PgExclusionRepository {
    async fn list(&self) -> Result<Vec<ExclusionEntry>> {
        let rows = sqlx::query(
            "SELECT id, table_type, record_id, excluded_at, excluded_by \
             FROM kpi_dashboard.exclusions \
             ORDER BY excluded_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(exclusion_from_row).collect()
    }

    async fn insert_batch(&self, entries: &[ExclusionEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO kpi_dashboard.exclusions
                (id, table_type, record_id, excluded_at, excluded_by)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (table_type, record_id) DO NOTHING
                "#,
            )
            .bind(entry.id)
            .bind(entry.table_type.as_str())
            .bind(&entry.record_id)
            .bind(entry.excluded_at)
            .bind(&entry.excluded_by)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_batch(&self, ids: &[Uuid]) -> Result<u64> {
        let result = sqlx::query("DELETE FROM kpi_dashboard.exclusions WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn user_from_row(row: &PgRow) -> Result<UserData> {
    let role: String = row.try_get("role")?;
    Ok(UserData {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        lp_id: row.try_get("lp_id")?,
        role: role.parse::<Role>().map_err(DashboardError::StoreUnavailable)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

const USER_COLUMNS: &str = "id, email, first_name, last_name, lp_id, role, created_at, updated_at";

pub async fn list_users(pool: &PgPool) -> Result<Vec<UserData>> {
    let rows = sqlx::query(&format!(
        "SELECT {USER_COLUMNS} FROM kpi_dashboard.users ORDER BY last_name, first_name"
    ))
    .fetch_all(pool)
    .await?;

    rows.iter().map(user_from_row).collect()
}

/// Creates the directory entry and its credential together.
pub async fn create_user(pool: &PgPool, form: NewUser) -> Result<UserData> {
    let form = form.validated()?;
    let password_hash = users::hash_password(&form.password)?;
    let id = Uuid::new_v4();

    let mut tx = pool.begin().await?;
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO kpi_dashboard.users (id, email, first_name, last_name, lp_id, role)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (email) DO NOTHING
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(&form.email)
    .bind(&form.first_name)
    .bind(&form.last_name)
    .bind(&form.lp_id)
    .bind(form.role.as_str())
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        return Err(DashboardError::ValidationFailed(format!(
            "a user with email {} already exists",
            form.email
        )));
    };

    sqlx::query(
        "INSERT INTO kpi_dashboard.user_credentials (user_id, password_hash) VALUES ($1, $2)",
    )
    .bind(id)
    .bind(&password_hash)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    let user = user_from_row(&row)?;
    tracing::info!(user = %user.id, email = %user.email, "user created");
    Ok(user)
}

/// Revokes the credential and removes the directory entry in one transaction.
pub async fn delete_user(pool: &PgPool, actor: &UserData, target: Uuid) -> Result<()> {
    users::ensure_not_self(actor.id, target)?;

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM kpi_dashboard.user_credentials WHERE user_id = $1")
        .bind(target)
        .execute(&mut *tx)
        .await?;
    let removed = sqlx::query("DELETE FROM kpi_dashboard.users WHERE id = $1")
        .bind(target)
        .execute(&mut *tx)
        .await?;
    if removed.rows_affected() == 0 {
        return Err(DashboardError::ValidationFailed(format!(
            "no user with id {target}"
        )));
    }
    tx.commit().await?;

    tracing::info!(user = %target, actor = %actor.email, "user deleted");
    Ok(())
}

/// Resolves an email/password pair to a signed-in user.
pub async fn authenticate(pool: &PgPool, email: &str, password: &str) -> Result<Option<UserData>> {
    let row = sqlx::query(&format!(
        r#"
        SELECT u.{}, c.password_hash
        FROM kpi_dashboard.users u
        JOIN kpi_dashboard.user_credentials c ON c.user_id = u.id
        WHERE u.email = $1
        "#,
        USER_COLUMNS.replace(", ", ", u.")
    ))
    .bind(email.trim().to_ascii_lowercase())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let hash: String = row.try_get("password_hash")?;
    if !users::verify_password(password, &hash) {
        tracing::warn!(email, "password rejected");
        return Ok(None);
    }
    user_from_row(&row).map(Some)
}
