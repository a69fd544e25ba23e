// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider trait definitions, plus the `StepExecutor` port the Parallel
//! Executor (component H) dispatches against by `Step.kind` (spec §6).

use crate::context::StepResult;
use crate::workflow::Step;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// LLM provider trait.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate a completion.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError>;

    /// Get provider name.
    fn name(&self) -> &str;

    /// Check if provider is healthy.
    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model name.
    pub model: String,

    /// Prompt or messages.
    pub prompt: String,

    /// System prompt (optional).
    pub system: Option<String>,

    /// Temperature (0.0 - 2.0).
    pub temperature: Option<f32>,

    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,

    /// Additional parameters.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated text.
    pub text: String,

    /// Model used.
    pub model: String,

    /// Tokens used.
    pub tokens_used: Option<u32>,

    /// Additional metadata.
    #[serde(flatten)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Provider error.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// Authentication error.
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Invalid request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Provider-specific error.
    #[error("Provider error: {0}")]
    ProviderSpecific(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Timeout error.
    #[error("Request timed out")]
    Timeout,

    /// Unknown error.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// A step implementation, looked up by `Step.kind` (spec §3/§6). The
/// Parallel Executor resolves `inputMapping` into a plain JSON object
/// before calling `execute`, and wraps the call in timeout + retry;
/// implementations return a plain error string so `retry::classify_error`
/// can classify it without a second error type to thread through.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// The `Step.kind` value this executor handles (e.g. `"llm_call"`).
    fn kind(&self) -> &str;

    /// Runs the step against its already-resolved input object.
    async fn execute(&self, step: &Step, resolved_input: Value) -> Result<Value, String>;
}

/// Adapts any [`LLMProvider`] into a `StepExecutor` for steps of kind
/// `"llm_call"`: `resolved_input` supplies `model`/`prompt`/`system`/
/// `temperature`/`maxTokens`, the response is returned as a JSON object.
pub struct LLMStepExecutor<P: LLMProvider> {
    provider: P,
}

impl<P: LLMProvider> LLMStepExecutor<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: LLMProvider> StepExecutor for LLMStepExecutor<P> {
    fn kind(&self) -> &str {
        "llm_call"
    }

    async fn execute(&self, _step: &Step, resolved_input: Value) -> Result<Value, String> {
        let model = resolved_input
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or("default")
            .to_string();
        let prompt = resolved_input
            .get("prompt")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing required field: prompt".to_string())?
            .to_string();
        let system = resolved_input
            .get("system")
            .and_then(Value::as_str)
            .map(|s| s.to_string());
        let temperature = resolved_input.get("temperature").and_then(Value::as_f64).map(|v| v as f32);
        let max_tokens = resolved_input.get("maxTokens").and_then(Value::as_u64).map(|v| v as u32);

        let request = CompletionRequest {
            model,
            prompt,
            system,
            temperature,
            max_tokens,
            extra: HashMap::new(),
        };
        let response = self
            .provider
            .complete(request)
            .await
            .map_err(|e| e.to_string())?;
        serde_json::to_value(response).map_err(|e| e.to_string())
    }
}

/// Looks up a `StepExecutor` by `Step.kind`. Built explicitly by callers
/// (the Workflow Orchestrator, spec §4.10) rather than discovered via a
/// global registry, per the "no singletons" design note.
#[derive(Default)]
pub struct StepExecutorRegistry {
    executors: HashMap<String, Box<dyn StepExecutor>>,
}

impl StepExecutorRegistry {
    pub fn new() -> Self {
        Self { executors: HashMap::new() }
    }

    pub fn register(&mut self, executor: Box<dyn StepExecutor>) -> &mut Self {
        self.executors.insert(executor.kind().to_string(), executor);
        self
    }

    pub fn get(&self, kind: &str) -> Option<&dyn StepExecutor> {
        self.executors.get(kind).map(|e| e.as_ref())
    }
}

/// Builds a fresh `StepResult` for a step that was skipped by its
/// `condition` gate (no `StepExecutor` invocation occurs).
pub fn skipped_step_result(step: &Step, started_at_ms: u64, completed_at_ms: u64) -> StepResult {
    StepResult {
        step_number: step.step_number,
        step_name: step.step_name.clone(),
        status: crate::context::StepStatus::Skipped,
        output_data: Value::Null,
        error_message: None,
        retry_metadata: None,
        started_at_ms,
        completed_at_ms,
    }
}
