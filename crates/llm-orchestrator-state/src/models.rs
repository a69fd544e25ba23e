//! Row shapes shared by the sqlite and postgres backends.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_number: u32,
    pub step_name: String,
    pub status: String,
    pub output_data: serde_json::Value,
    pub error_message: Option<String>,
    pub started_at_ms: u64,
    pub completed_at_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    pub execution_id: String,
    pub schema_key: String,
    pub total_steps: u32,
    pub status: String,
    pub steps: Vec<StepRecord>,
}
