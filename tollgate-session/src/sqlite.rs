//! SQLite-backed session persistence

use crate::provider::SessionProvider;
use crate::types::{PersistenceId, SessionRecord};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Row, SqlitePool,
};
use std::collections::HashMap;
use tollgate_core::{persistence_error, TollgateResult};
use tracing::{debug, error, info, warn};

/// Session provider storing one row per live session
#[derive(Debug, Clone)]
pub struct SqliteSessionProvider {
    pool: SqlitePool,
}

// Fixed-width UTC timestamps compare correctly as strings.
fn to_db_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn from_db_time(value: &str) -> TollgateResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| persistence_error!(format!("Invalid timestamp '{}'", value), "sqlite_provider", e))
}

impl SqliteSessionProvider {
    /// Connect to `database_url` and make sure the schema exists.
    ///
    /// `sqlite::memory:` gets a single-connection pool so every query sees the
    /// same database.
    pub async fn connect(database_url: &str) -> TollgateResult<Self> {
        info!("Connecting session database: {}", database_url);

        let connected = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect(database_url)
                .await
        } else {
            let db_path = database_url.strip_prefix("sqlite:").unwrap_or(database_url);
            let db_path = db_path.strip_prefix("//").unwrap_or(db_path);

            if let Some(parent) = std::path::Path::new(db_path).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    info!("Creating database directory: {}", parent.display());
                    std::fs::create_dir_all(parent)?;
                }
            }

            let options = SqliteConnectOptions::new()
                .filename(db_path)
                .create_if_missing(true);
            SqlitePoolOptions::new().connect_with(options).await
        };

        let pool = connected.map_err(|e| {
            error!("Session database connection failed: {}", e);
            persistence_error!("Failed to connect to session database", "sqlite_provider", e)
        })?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, creating the table if needed
    pub async fn from_pool(pool: SqlitePool) -> TollgateResult<Self> {
        let provider = Self { pool };
        provider.create_tables().await?;
        Ok(provider)
    }

    async fn create_tables(&self) -> TollgateResult<()> {
        let query = r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                token TEXT UNIQUE NOT NULL,
                user_id INTEGER NOT NULL,
                creation_time TEXT NOT NULL,
                expiration_time TEXT NOT NULL,
                last_access_time TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_expiration ON sessions(expiration_time);
        "#;

        sqlx::raw_sql(query).execute(&self.pool).await.map_err(|e| {
            error!("Failed to create sessions table: {}", e);
            persistence_error!("Failed to create sessions table", "sqlite_provider", e)
        })?;

        debug!("Sessions table ready");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SessionProvider for SqliteSessionProvider {
    async fn load_snapshot(&self) -> TollgateResult<HashMap<String, SessionRecord>> {
        let rows = sqlx::query(
            "SELECT id, token, user_id, creation_time, expiration_time, last_access_time FROM sessions",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| persistence_error!("Failed to load sessions", "sqlite_provider", e))?;

        let mut snapshot = HashMap::with_capacity(rows.len());
        for row in rows {
            let token: String = row.get("token");
            let creation_time: String = row.get("creation_time");
            let expiration_time: String = row.get("expiration_time");
            let last_access_time: String = row.get("last_access_time");

            let record = match (
                from_db_time(&creation_time),
                from_db_time(&expiration_time),
                from_db_time(&last_access_time),
            ) {
                (Ok(creation_time), Ok(expiration_time), Ok(last_access_time)) => SessionRecord {
                    user_id: row.get("user_id"),
                    creation_time,
                    expiration_time,
                    last_access_time,
                    token: token.clone(),
                    persistence_id: Some(row.get("id")),
                },
                _ => {
                    let id: i64 = row.get("id");
                    warn!("Skipping session row {} with unreadable timestamps", id);
                    continue;
                }
            };
            snapshot.insert(token, record);
        }

        info!("Loaded {} sessions from database", snapshot.len());
        Ok(snapshot)
    }

    async fn create_session(&self, record: &SessionRecord) -> TollgateResult<PersistenceId> {
        let result = sqlx::query(
            r#"
            INSERT INTO sessions (token, user_id, creation_time, expiration_time, last_access_time)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.token)
        .bind(record.user_id)
        .bind(to_db_time(record.creation_time))
        .bind(to_db_time(record.expiration_time))
        .bind(to_db_time(record.last_access_time))
        .execute(&self.pool)
        .await
        .map_err(|e| persistence_error!("Failed to insert session", "sqlite_provider", e))?;

        Ok(result.last_insert_rowid())
    }

    async fn update_session_time(
        &self,
        id: PersistenceId,
        expiration_time: DateTime<Utc>,
        last_access_time: DateTime<Utc>,
    ) -> TollgateResult<()> {
        let expiration_time = to_db_time(expiration_time);
        sqlx::query(
            r#"
            UPDATE sessions SET expiration_time = ?, last_access_time = ?
            WHERE id = ? AND expiration_time < ?
            "#,
        )
        .bind(&expiration_time)
        .bind(to_db_time(last_access_time))
        .bind(id)
        .bind(&expiration_time)
        .execute(&self.pool)
        .await
        .map_err(|e| persistence_error!("Failed to update session time", "sqlite_provider", e))?;
        Ok(())
    }

    async fn remove_session(&self, record: &SessionRecord) -> TollgateResult<()> {
        let query = match record.persistence_id {
            Some(id) => sqlx::query("DELETE FROM sessions WHERE id = ?").bind(id),
            None => sqlx::query("DELETE FROM sessions WHERE token = ?").bind(&record.token),
        };

        query
            .execute(&self.pool)
            .await
            .map_err(|e| persistence_error!("Failed to remove session", "sqlite_provider", e))?;
        Ok(())
    }

    async fn shrink(&self) -> TollgateResult<()> {
        let result = sqlx::query("DELETE FROM sessions WHERE expiration_time < ?")
            .bind(to_db_time(Utc::now()))
            .execute(&self.pool)
            .await
            .map_err(|e| persistence_error!("Failed to shrink sessions", "sqlite_provider", e))?;

        info!("Shrink removed {} expired sessions", result.rows_affected());
        Ok(())
    }
}
