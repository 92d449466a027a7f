//! API-key capability injected into every remote client.

use crate::error::{Result, VoiceBoltError};

/// Source of an API key for one remote service.
///
/// Clients call [`ApiKeySource::api_key`] before every request, so a missing
/// key surfaces as [`VoiceBoltError::Auth`] without touching the network.
pub trait ApiKeySource: Send + Sync {
    /// Return the key, or an authentication error naming the remediation.
    fn api_key(&self) -> Result<String>;
}

/// Reads the key from an environment variable on each call.
#[derive(Debug, Clone)]
pub struct EnvKeySource {
    service: String,
    var_name: String,
}

impl EnvKeySource {
    pub fn new(service: impl Into<String>, var_name: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            var_name: var_name.into(),
        }
    }
}

impl ApiKeySource for EnvKeySource {
    fn api_key(&self) -> Result<String> {
        match std::env::var(&self.var_name) {
            Ok(val) if !val.trim().is_empty() => Ok(val.trim().to_string()),
            _ => Err(VoiceBoltError::auth(
                &self.service,
                format!(
                    "API key not found. Set the {} environment variable.",
                    self.var_name
                ),
            )),
        }
    }
}

/// Fixed key, mostly for tests. An empty key behaves like a missing one.
#[derive(Debug, Clone)]
pub struct StaticKey {
    service: String,
    key: String,
}

impl StaticKey {
    pub fn new(service: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            key: key.into(),
        }
    }
}

impl ApiKeySource for StaticKey {
    fn api_key(&self) -> Result<String> {
        if self.key.is_empty() {
            return Err(VoiceBoltError::auth(&self.service, "API key is empty"));
        }
        Ok(self.key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_env_key_is_auth_error() {
        let source = EnvKeySource::new("voice platform", "VB_TEST_NONEXISTENT_KEY_12345");
        let err = source.api_key().unwrap_err();
        assert!(err.is_fatal_auth());
        assert!(err.to_string().contains("VB_TEST_NONEXISTENT_KEY_12345"));
    }

    #[test]
    fn static_key() {
        assert_eq!(StaticKey::new("x", "sk_1").api_key().unwrap(), "sk_1");
        assert!(StaticKey::new("x", "").api_key().unwrap_err().is_fatal_auth());
    }
}
