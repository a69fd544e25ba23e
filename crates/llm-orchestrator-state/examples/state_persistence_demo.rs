//! Demonstrates recording a workflow run's steps to an in-memory SQLite
//! database and reading the snapshot back, as an operator tool would
//! after a crash.

use llm_orchestrator_state::models::StepRecord;
use llm_orchestrator_state::{SqliteStateStore, StateStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let store = SqliteStateStore::connect("sqlite::memory:").await?;

    store
        .record_execution_started("demo-exec-1", "deliverable.cost_estimate", 2)
        .await?;

    store
        .record_step(
            "demo-exec-1",
            &StepRecord {
                step_number: 1,
                step_name: "gather_inputs".into(),
                status: "completed".into(),
                output_data: serde_json::json!({"lineItems": 12}),
                error_message: None,
                started_at_ms: 0,
                completed_at_ms: 120,
            },
        )
        .await?;

    store
        .record_step(
            "demo-exec-1",
            &StepRecord {
                step_number: 2,
                step_name: "estimate_cost".into(),
                status: "completed".into(),
                output_data: serde_json::json!({"totalCost": 184_250.0}),
                error_message: None,
                started_at_ms: 120,
                completed_at_ms: 980,
            },
        )
        .await?;

    store.record_execution_finished("demo-exec-1", "completed").await?;

    let snapshot = store.load_snapshot("demo-exec-1").await?;
    println!(
        "execution {} finished with status {} across {} recorded step(s)",
        snapshot.execution_id,
        snapshot.status,
        snapshot.steps.len()
    );
    for step in &snapshot.steps {
        println!("  step {} ({}): {} -> {}", step.step_number, step.step_name, step.status, step.output_data);
    }

    Ok(())
}
