use std::path::Path;

use serde::Deserialize;

use backupstore_common::ConfigMap;

/// Store definition read from a TOML file:
///
/// ```toml
/// provider = "azure"
///
/// [config]
/// storage-account = "acct1"
/// storage-account-key-env-var = "AZURE_STORAGE_KEY"
/// subscription-id = "sub1"
/// resource-group = "rg1"
/// ```
///
/// The `[config]` table is handed to the provider untouched; the provider
/// validates its own keys.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreFile {
    pub provider: String,
    #[serde(default)]
    pub config: ConfigMap,
}

impl StoreFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let file: StoreFile = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.provider.trim().is_empty() {
            anyhow::bail!("provider must not be empty");
        }
        Ok(())
    }
}
