//! SQLite-backed `StateStore`, for local and single-node deployments.

use crate::models::{ExecutionSnapshot, StepRecord};
use crate::{Result, StateError, StateStore};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new().max_connections(5).connect(url).await?;
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
                output_data TEXT NOT NULL,
                error_message TEXT,
                started_at_ms INTEGER NOT NULL,
                completed_at_ms INTEGER NOT NULL,
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
impl StateStore for SqliteStateStore {
    async fn record_execution_started(&self, execution_id: &str, schema_key: &str, total_steps: u32) -> Result<()> {
        sqlx::query(
            "INSERT INTO executions (execution_id, schema_key, total_steps, status) VALUES (?, ?, ?, 'running')",
        )
        .bind(execution_id)
        .bind(schema_key)
        .bind(total_steps as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_step(&self, execution_id: &str, step: &StepRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO execution_steps \
             (execution_id, step_number, step_name, status, output_data, error_message, started_at_ms, completed_at_ms) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(execution_id)
        .bind(step.step_number as i64)
        .bind(&step.step_name)
        .bind(&step.status)
        .bind(step.output_data.to_string())
        .bind(&step.error_message)
        .bind(step.started_at_ms as i64)
        .bind(step.completed_at_ms as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_execution_finished(&self, execution_id: &str, status: &str) -> Result<()> {
        sqlx::query("UPDATE executions SET status = ? WHERE execution_id = ?")
            .bind(status)
            .bind(execution_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_snapshot(&self, execution_id: &str) -> Result<ExecutionSnapshot> {
        let exec_row = sqlx::query("SELECT schema_key, total_steps, status FROM executions WHERE execution_id = ?")
            .bind(execution_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StateError::NotFound(execution_id.to_string()))?;

        let step_rows = sqlx::query(
            "SELECT step_number, step_name, status, output_data, error_message, started_at_ms, completed_at_ms \
             FROM execution_steps WHERE execution_id = ? ORDER BY step_number",
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;

        let steps = step_rows
            .into_iter()
            .map(|row| {
                let output_data: String = row.get("output_data");
                StepRecord {
                    step_number: row.get::<i64, _>("step_number") as u32,
                    step_name: row.get("step_name"),
                    status: row.get("status"),
                    output_data: serde_json::from_str(&output_data).unwrap_or(serde_json::Value::Null),
                    error_message: row.get("error_message"),
                    started_at_ms: row.get::<i64, _>("started_at_ms") as u64,
                    completed_at_ms: row.get::<i64, _>("completed_at_ms") as u64,
                }
            })
            .collect();

        Ok(ExecutionSnapshot {
            execution_id: execution_id.to_string(),
            schema_key: exec_row.get("schema_key"),
            total_steps: exec_row.get::<i64, _>("total_steps") as u32,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_and_reloads_a_snapshot() {
        let store = SqliteStateStore::connect("sqlite::memory:").await.unwrap();
        store.record_execution_started("exec-1", "wf-a", 2).await.unwrap();
        store
            .record_step(
                "exec-1",
                &StepRecord {
                    step_number: 1,
                    step_name: "first".into(),
                    status: "completed".into(),
                    output_data: serde_json::json!({"ok": true}),
                    error_message: None,
                    started_at_ms: 0,
                    completed_at_ms: 5,
                },
            )
            .await
            .unwrap();
        store.record_execution_finished("exec-1", "completed").await.unwrap();

        let snapshot = store.load_snapshot("exec-1").await.unwrap();
        assert_eq!(snapshot.status, "completed");
        assert_eq!(snapshot.steps.len(), 1);
        assert_eq!(snapshot.steps[0].output_data, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn unknown_execution_is_not_found() {
        let store = SqliteStateStore::connect("sqlite::memory:").await.unwrap();
        assert!(matches!(
            store.load_snapshot("missing").await,
            Err(StateError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_incomplete_excludes_finished_runs() {
        let store = SqliteStateStore::connect("sqlite::memory:").await.unwrap();
        store.record_execution_started("exec-done", "wf-a", 1).await.unwrap();
        store.record_execution_finished("exec-done", "completed").await.unwrap();
        store.record_execution_started("exec-running", "wf-a", 1).await.unwrap();

        let incomplete = store.list_incomplete().await.unwrap();
        assert_eq!(incomplete, vec!["exec-running".to_string()]);
    }
}
