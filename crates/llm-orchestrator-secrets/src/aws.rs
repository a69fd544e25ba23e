//! AWS Secrets Manager-backed secret provider.

use crate::{Result, SecretError, SecretProvider};
use async_trait::async_trait;
use aws_sdk_secretsmanager::Client;

pub struct AwsSecretsManagerProvider {
    client: Client,
}

impl AwsSecretsManagerProvider {
    pub async fn from_env() -> Self {
        let config = aws_config::load_from_env().await;
        Self {
            client: Client::new(&config),
        }
    }

    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretProvider for AwsSecretsManagerProvider {
    async fn get_secret(&self, key: &str) -> Result<String> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(key)
            .send()
            .await
            .map_err(|e| SecretError::Backend(e.to_string()))?;
        output
            .secret_string()
            .map(|s| s.to_string())
            .ok_or_else(|| SecretError::NotFound(key.to_string()))
    }
}
