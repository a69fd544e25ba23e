//! PostgreSQL-backed `StateStore`, for deployments sharing one execution
//! history across multiple orchestrator instances.

use crate::models::{ExecutionSnapshot, StepRecord};
use crate::{Result, StateError, StateStore};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

pub struct PostgresStateStore {
    pool: PgPool,
}

impl PostgresStateStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS executions (
                execution_id TEXT PRIMARY KEY,
                schema_key TEXT NOT NULL,
                total_steps INTEGER NOT NULL,
                status TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS execution_steps (
                execution_id TEXT NOT NULL,
                step_number INTEGER NOT NULL,
                step_name TEXT NOT NULL,
                status TEXT NOT NULL,
                output_data JSONB NOT NULL,
                error_message TEXT,
                started_at_ms BIGINT NOT NULL,
                completed_at_ms BIGINT NOT NULL,
                PRIMARY KEY (execution_id, step_number)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for PostgresStateStore {
    async fn record_execution_started(&self, execution_id: &str, schema_key: &str, total_steps: u32) -> Result<()> {
        sqlx::query(
            "INSERT INTO executions (execution_id, schema_key, total_steps, status) VALUES ($1, $2, $3, 'running')",
        )
        .bind(execution_id)
        .bind(schema_key)
        .bind(total_steps as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_step(&self, execution_id: &str, step: &StepRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO execution_steps \
             (execution_id, step_number, step_name, status, output_data, error_message, started_at_ms, completed_at_ms) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(execution_id)
        .bind(step.step_number as i32)
        .bind(&step.step_name)
        .bind(&step.status)
        .bind(&step.output_data)
        .bind(&step.error_message)
        .bind(step.started_at_ms as i64)
        .bind(step.completed_at_ms as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_execution_finished(&self, execution_id: &str, status: &str) -> Result<()> {
        sqlx::query("UPDATE executions SET status = $1 WHERE execution_id = $2")
            .bind(status)
            .bind(execution_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_snapshot(&self, execution_id: &str) -> Result<ExecutionSnapshot> {
        let exec_row = sqlx::query("SELECT schema_key, total_steps, status FROM executions WHERE execution_id = $1")
            .bind(execution_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StateError::NotFound(execution_id.to_string()))?;

        let step_rows = sqlx::query(
            "SELECT step_number, step_name, status, output_data, error_message, started_at_ms, completed_at_ms \
             FROM execution_steps WHERE execution_id = $1 ORDER BY step_number",
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;

        let steps = step_rows
            .into_iter()
            .map(|row| StepRecord {
                step_number: row.get::<i32, _>("step_number") as u32,
                step_name: row.get("step_name"),
                status: row.get("status"),
                output_data: row.get("output_data"),
                error_message: row.get("error_message"),
                started_at_ms: row.get::<i64, _>("started_at_ms") as u64,
                completed_at_ms: row.get::<i64, _>("completed_at_ms") as u64,
            })
            .collect();

        Ok(ExecutionSnapshot {
            execution_id: execution_id.to_string(),
            schema_key: exec_row.get("schema_key"),
            total_steps: exec_row.get::<i32, _>("total_steps") as u32,
            status: exec_row.get("status"),
            steps,
        })
    }

    async fn list_incomplete(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT execution_id FROM executions WHERE status = 'running'")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.get("execution_id")).collect())
    }
}
