//! HashiCorp Vault-backed secret provider using the KV v2 engine.

use crate::{Result, SecretError, SecretProvider};
use async_trait::async_trait;
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::kv2;

/// Reads secrets from a Vault KV v2 mount. `key` is interpreted as
/// `{path}#{field}`; if no `#field` suffix is given, the field defaults
/// to `value`.
pub struct VaultSecretProvider {
    client: VaultClient,
    mount: String,
}

impl VaultSecretProvider {
    pub fn new(address: impl Into<String>, token: impl Into<String>, mount: impl Into<String>) -> Result<Self> {
        let settings = VaultClientSettingsBuilder::default()
            .address(address.into())
            .token(token.into())
            .build()
            .map_err(|e| SecretError::Backend(e.to_string()))?;
        let client = VaultClient::new(settings).map_err(|e| SecretError::Backend(e.to_string()))?;
        Ok(Self {
            client,
            mount: mount.into(),
        })
    }

    fn split_key(key: &str) -> (&str, &str) {
        match key.split_once('#') {
            Some((path, field)) => (path, field),
            None => (key, "value"),
        }
    }
}

#[async_trait]
impl SecretProvider for VaultSecretProvider {
    async fn get_secret(&self, key: &str) -> Result<String> {
        let (path, field) = Self::split_key(key);
        let secret: std::collections::HashMap<String, String> =
            kv2::read(&self.client, &self.mount, path)
                .await
                .map_err(|e| SecretError::Backend(e.to_string()))?;
        secret
            .get(field)
            .cloned()
            .ok_or_else(|| SecretError::NotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_path_and_field() {
        assert_eq!(VaultSecretProvider::split_key("secret/foo#api_key"), ("secret/foo", "api_key"));
        assert_eq!(VaultSecretProvider::split_key("secret/foo"), ("secret/foo", "value"));
    }
}
