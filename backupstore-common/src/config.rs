use std::collections::HashMap;

use crate::error::ConfigError;

/// Provider configuration as handed over by the host: string keys to string
/// values.
pub type ConfigMap = HashMap<String, String>;

/// Keys a host may pass to any provider. Adapters accept and ignore them.
pub const HOST_RESERVED_KEYS: &[&str] = &["bucket", "prefix", "caCert"];

/// Check `config` against a provider's key set.
///
/// Every key in `required` must be present with a non-blank value. Keys that
/// are not required, optional or host-reserved are rejected.
pub fn validate_config_keys(
    config: &ConfigMap,
    required: &[&str],
    optional: &[&str],
) -> Result<(), ConfigError> {
    let mut keys: Vec<&String> = config.keys().collect();
    keys.sort();
    for key in keys {
        let known = required.contains(&key.as_str())
            || optional.contains(&key.as_str())
            || HOST_RESERVED_KEYS.contains(&key.as_str());
        if !known {
            return Err(ConfigError::UnknownKey(key.clone()));
        }
    }

    for key in required {
        require(config, key)?;
    }
    Ok(())
}

/// Value of a required key, trimmed.
pub fn require<'a>(config: &'a ConfigMap, key: &str) -> Result<&'a str, ConfigError> {
    optional(config, key).ok_or_else(|| ConfigError::MissingKey(key.to_string()))
}

/// Value of an optional key, trimmed. Blank values count as absent.
pub fn optional<'a>(config: &'a ConfigMap, key: &str) -> Option<&'a str> {
    config
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Where adapters look up secrets named in their config.
pub trait SecretSource: Send + Sync {
    fn lookup(&self, name: &str) -> Option<String>;
}

/// Reads secrets from the process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecrets;

impl SecretSource for EnvSecrets {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl SecretSource for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}
