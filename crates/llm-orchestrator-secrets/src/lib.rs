// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Secret management for provider API keys, database credentials, and
//! other sensitive configuration the orchestrator and its ambient crates
//! need at startup.
//!
//! Backends are plugged in behind the [`SecretProvider`] port: an
//! [`EnvSecretProvider`] for local development, a [`VaultSecretProvider`]
//! for HashiCorp Vault, and an [`AwsSecretsManagerProvider`] for AWS
//! Secrets Manager. [`SecretCache`] wraps any provider with a short-lived
//! in-memory cache so a busy step executor doesn't round-trip to the
//! backend on every call.

pub mod aws;
pub mod cache;
pub mod env;
pub mod vault;

use async_trait::async_trait;
use thiserror::Error;

pub use aws::AwsSecretsManagerProvider;
pub use cache::SecretCache;
pub use env::EnvSecretProvider;
pub use vault::VaultSecretProvider;

/// Crate version, exposed for diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret not found: {0}")]
    NotFound(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("invalid secret value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// A backend capable of resolving a named secret to its current value.
///
/// Implementations must not cache internally — callers wrap a provider in
/// [`SecretCache`] if caching is desired, so the TTL policy lives in one
/// place rather than being duplicated per backend.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn get_secret(&self, key: &str) -> Result<String>;

    /// Fetch several secrets at once. The default implementation calls
    /// `get_secret` sequentially; backends with a native batch API should
    /// override this.
    async fn get_secrets(&self, keys: &[&str]) -> Result<std::collections::HashMap<String, String>> {
        let mut out = std::collections::HashMap::with_capacity(keys.len());
        for key in keys {
            out.insert((*key).to_string(), self.get_secret(key).await?);
        }
        Ok(out)
    }
}
