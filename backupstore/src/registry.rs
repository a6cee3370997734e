use std::collections::BTreeMap;

use anyhow::Context;
use tracing::info;

use backupstore_azure::AzureObjectStore;
use backupstore_common::{ConfigMap, ObjectStore};

/// Builds a fresh, uninitialized adapter.
pub type StoreFactory = fn() -> Box<dyn ObjectStore>;

/// Provider name to adapter factory.
pub struct Registry {
    factories: BTreeMap<&'static str, StoreFactory>,
}

impl Registry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry holding every adapter compiled into this binary.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("azure", azure);
        registry
    }

    pub fn register(&mut self, provider: &'static str, factory: StoreFactory) {
        self.factories.insert(provider, factory);
    }

    pub fn providers(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    /// Instantiate `provider` and initialize it with `config`.
    pub fn open(&self, provider: &str, config: &ConfigMap) -> anyhow::Result<Box<dyn ObjectStore>> {
        let factory = self.factories.get(provider).with_context(|| {
            format!(
                "unknown object store provider '{}' (known: {})",
                provider,
                self.providers().collect::<Vec<_>>().join(", ")
            )
        })?;

        let mut store = factory();
        store
            .init(config)
            .with_context(|| format!("failed to initialize '{}' object store", provider))?;
        info!(provider, "Object store ready");
        Ok(store)
    }
}

fn azure() -> Box<dyn ObjectStore> {
    Box::new(AzureObjectStore::new())
}
