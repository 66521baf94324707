use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::info;

use crate::agent::{AgentRecord, AgentUpdate};
use crate::error::DirectoryError;
use crate::registry::{updated_record, validated, AgentDirectory};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS agents (
    name TEXT PRIMARY KEY NOT NULL,
    credential TEXT NOT NULL,
    system_prompt TEXT NOT NULL,
    endpoint TEXT NOT NULL,
    endpoint_info TEXT NOT NULL,
    example_query TEXT NOT NULL,
    test_scenarios TEXT NOT NULL,
    created_at TEXT NOT NULL
)";

const COLUMNS: &str =
    "name, credential, system_prompt, endpoint, endpoint_info, example_query, test_scenarios, created_at";

/// Durable agent directory backed by SQLite.
#[derive(Clone)]
pub struct SqliteRegistry {
    pool: SqlitePool,
}

impl SqliteRegistry {
    pub async fn connect(url: &str) -> Result<Self, DirectoryError> {
        // An in-memory database lives and dies with its connection.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        info!("Agent store ready at {}", url);
        Ok(Self { pool })
    }

    async fn insert(&self, record: &AgentRecord) -> Result<(), DirectoryError> {
        let sql = format!("INSERT INTO agents ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)");
        let created_at = record.created_at.unwrap_or_else(Utc::now).to_rfc3339();

        sqlx::query(&sql)
            .bind(&record.name)
            .bind(&record.credential)
            .bind(&record.system_prompt)
            .bind(&record.endpoint)
            .bind(&record.endpoint_info)
            .bind(serde_json::to_string(&record.example_query)?)
            .bind(&record.test_scenarios)
            .bind(created_at)
            .execute(&self.pool)
            .await
            .map_err(|err| conflict_or(err, &record.name))?;
        Ok(())
    }
}

fn conflict_or(err: sqlx::Error, name: &str) -> DirectoryError {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            DirectoryError::Conflict(name.to_string())
        }
        other => other.into(),
    }
}

fn from_row(row: &SqliteRow) -> Result<AgentRecord, DirectoryError> {
    let example_query: String = row.try_get("example_query")?;
    let created_at: String = row.try_get("created_at")?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| DirectoryError::Storage(format!("malformed created_at: {e}")))?;

    Ok(AgentRecord {
        name: row.try_get("name")?,
        credential: row.try_get("credential")?,
        system_prompt: row.try_get("system_prompt")?,
        endpoint: row.try_get("endpoint")?,
        endpoint_info: row.try_get("endpoint_info")?,
        example_query: serde_json::from_str(&example_query)?,
        test_scenarios: row.try_get("test_scenarios")?,
        created_at: Some(created_at),
    })
}

#[async_trait]
impl AgentDirectory for SqliteRegistry {
    async fn get_record(&self, name: &str) -> Result<Option<AgentRecord>, DirectoryError> {
        let sql = format!("SELECT {COLUMNS} FROM agents WHERE name = ?");
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(from_row).transpose()
    }

    async fn list_records(&self) -> Result<Vec<AgentRecord>, DirectoryError> {
        let sql = format!("SELECT {COLUMNS} FROM agents ORDER BY name");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(from_row).collect()
    }

    async fn create(&self, record: AgentRecord) -> Result<AgentRecord, DirectoryError> {
        let record = validated(record)?;
        self.insert(&record).await?;
        Ok(record)
    }

    async fn update(&self, name: &str, update: AgentUpdate) -> Result<AgentRecord, DirectoryError> {
        let mut tx = self.pool.begin().await?;

        let select = format!("SELECT {COLUMNS} FROM agents WHERE name = ?");
        let existing = sqlx::query(&select)
            .bind(name)
            .fetch_optional(&mut *tx)
            .await?
            .as_ref()
            .map(from_row)
            .transpose()?
            .ok_or_else(|| DirectoryError::NotFound(name.to_string()))?;
        let record = updated_record(existing, update)?;

        let result = sqlx::query(
            "UPDATE agents SET name = ?, credential = ?, system_prompt = ?, endpoint = ?, \
             endpoint_info = ?, example_query = ?, test_scenarios = ? WHERE name = ?",
        )
        .bind(&record.name)
        .bind(&record.credential)
        .bind(&record.system_prompt)
        .bind(&record.endpoint)
        .bind(&record.endpoint_info)
        .bind(serde_json::to_string(&record.example_query)?)
        .bind(&record.test_scenarios)
        .bind(name)
        .execute(&mut *tx)
        .await
        .map_err(|err| conflict_or(err, &record.name))?;
        if result.rows_affected() == 0 {
            return Err(DirectoryError::NotFound(name.to_string()));
        }
        tx.commit().await?;

        Ok(record)
    }

    async fn delete(&self, name: &str) -> Result<(), DirectoryError> {
        let result = sqlx::query("DELETE FROM agents WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DirectoryError::NotFound(name.to_string()));
        }
        Ok(())
    }

    /// Replaces every field except `created_at`, which keeps its first value.
    async fn upsert(&self, record: AgentRecord) -> Result<AgentRecord, DirectoryError> {
        let record = validated(record)?;
        let sql = format!(
            "INSERT INTO agents ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(name) DO UPDATE SET credential = excluded.credential, \
             system_prompt = excluded.system_prompt, endpoint = excluded.endpoint, \
             endpoint_info = excluded.endpoint_info, example_query = excluded.example_query, \
             test_scenarios = excluded.test_scenarios"
        );
        let created_at = record.created_at.unwrap_or_else(Utc::now).to_rfc3339();

        sqlx::query(&sql)
            .bind(&record.name)
            .bind(&record.credential)
            .bind(&record.system_prompt)
            .bind(&record.endpoint)
            .bind(&record.endpoint_info)
            .bind(serde_json::to_string(&record.example_query)?)
            .bind(&record.test_scenarios)
            .bind(created_at)
            .execute(&self.pool)
            .await?;

        self.get_record(&record.name)
            .await?
            .ok_or_else(|| DirectoryError::NotFound(record.name.clone()))
    }
}
