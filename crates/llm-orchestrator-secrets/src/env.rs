//! Environment-variable-backed secret provider, used for local
//! development and CI where a real secrets backend is unavailable.

use crate::{Result, SecretError, SecretProvider};
use async_trait::async_trait;

/// Resolves `key` by looking up `{prefix}{key}` (upper-cased) in the
/// process environment. `prefix` defaults to `""`.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretProvider {
    prefix: String,
}

impl EnvSecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    fn env_name(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key).to_uppercase()
    }
}

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn get_secret(&self, key: &str) -> Result<String> {
        let name = self.env_name(key);
        std::env::var(&name).map_err(|_| SecretError::NotFound(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_uppercased_prefixed_name() {
        std::env::set_var("ORCH_TEST_SECRET_KEY", "shh");
        let provider = EnvSecretProvider::with_prefix("ORCH_TEST_");
        assert_eq!(provider.get_secret("secret_key").await.unwrap(), "shh");
        std::env::remove_var("ORCH_TEST_SECRET_KEY");
    }

    #[tokio::test]
    async fn missing_variable_is_not_found() {
        let provider = EnvSecretProvider::new();
        assert!(matches!(
            provider.get_secret("definitely_not_set_xyz").await,
            Err(SecretError::NotFound(_))
        ));
    }
}
