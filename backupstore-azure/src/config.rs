use url::Url;

use backupstore_common::config::{optional, require, validate_config_keys};
use backupstore_common::{ConfigError, ConfigMap, SecretSource};

pub const RESOURCE_GROUP_KEY: &str = "resource-group";
pub const STORAGE_ACCOUNT_KEY: &str = "storage-account";
pub const SUBSCRIPTION_ID_KEY: &str = "subscription-id";
pub const STORAGE_ACCOUNT_KEY_ENV_VAR_KEY: &str = "storage-account-key-env-var";
/// Full endpoint override, e.g. an Azurite emulator or a private endpoint.
pub const STORAGE_ACCOUNT_URI_KEY: &str = "storage-account-uri";
/// Endpoint suffix override for sovereign clouds.
pub const STORAGE_DOMAIN_KEY: &str = "storage-domain";

pub const DEFAULT_STORAGE_DOMAIN: &str = "blob.core.windows.net";

const REQUIRED_KEYS: &[&str] = &[
    RESOURCE_GROUP_KEY,
    STORAGE_ACCOUNT_KEY,
    SUBSCRIPTION_ID_KEY,
    STORAGE_ACCOUNT_KEY_ENV_VAR_KEY,
];
const OPTIONAL_KEYS: &[&str] = &[STORAGE_ACCOUNT_URI_KEY, STORAGE_DOMAIN_KEY];

/// Validated adapter configuration.
#[derive(Debug, Clone)]
pub struct AzureConfig {
    pub resource_group: String,
    pub storage_account: String,
    pub subscription_id: String,
    pub account_key_env_var: String,
    pub endpoint: Url,
}

impl AzureConfig {
    pub fn from_map(config: &ConfigMap) -> Result<Self, ConfigError> {
        validate_config_keys(config, REQUIRED_KEYS, OPTIONAL_KEYS)?;

        let storage_account = require(config, STORAGE_ACCOUNT_KEY)?;
        validate_account_name(storage_account)?;

        let endpoint = match optional(config, STORAGE_ACCOUNT_URI_KEY) {
            Some(uri) => uri.to_string(),
            None => format!(
                "https://{}.{}",
                storage_account,
                optional(config, STORAGE_DOMAIN_KEY).unwrap_or(DEFAULT_STORAGE_DOMAIN)
            ),
        };
        let endpoint = parse_endpoint(&endpoint)?;

        Ok(Self {
            resource_group: require(config, RESOURCE_GROUP_KEY)?.to_string(),
            storage_account: storage_account.to_string(),
            subscription_id: require(config, SUBSCRIPTION_ID_KEY)?.to_string(),
            account_key_env_var: require(config, STORAGE_ACCOUNT_KEY_ENV_VAR_KEY)?.to_string(),
            endpoint,
        })
    }

    /// Look up the account key in the variable named by
    /// `storage-account-key-env-var`.
    pub fn resolve_account_key(&self, secrets: &dyn SecretSource) -> Result<String, ConfigError> {
        secrets
            .lookup(&self.account_key_env_var)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ConfigError::MissingSecret(self.account_key_env_var.clone()))
    }
}

/// Storage account names are 3-24 lowercase letters and digits.
fn validate_account_name(name: &str) -> Result<(), ConfigError> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if (3..=24).contains(&name.len()) && valid_chars {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            key: STORAGE_ACCOUNT_KEY.to_string(),
            reason: format!(
                "'{}' must be 3-24 lowercase letters and digits",
                name
            ),
        })
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(endpoint).map_err(|source| ConfigError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        source,
    })?;
    let scheme_ok = matches!(url.scheme(), "http" | "https");
    if !scheme_ok || url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(ConfigError::InvalidValue {
            key: STORAGE_ACCOUNT_URI_KEY.to_string(),
            reason: format!("'{}' is not an http(s) endpoint", endpoint),
        });
    }
    if url.query().is_some() {
        return Err(ConfigError::InvalidValue {
            key: STORAGE_ACCOUNT_URI_KEY.to_string(),
            reason: format!("'{}' must not carry a query string", endpoint),
        });
    }
    Ok(url)
}
