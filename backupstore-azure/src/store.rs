use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use tracing::{debug, info};

use backupstore_common::{
    ConfigError, ConfigMap, EnvSecrets, ObjectBody, ObjectStore, ObjectStream, SecretSource,
    StoreError,
};

use crate::client::BlobServiceClient;
use crate::config::AzureConfig;
use crate::credential::SharedKeyCredential;
use crate::sas::signed_blob_url;
use crate::upload::{upload_stream, DEFAULT_BLOCK_SIZE};

/// Object store backed by one Azure storage account.
///
/// Buckets map to blob containers and keys to blob names, both passed
/// through verbatim.
pub struct AzureObjectStore {
    secrets: Box<dyn SecretSource>,
    block_size: usize,
    client: Option<BlobServiceClient>,
}

impl AzureObjectStore {
    /// Adapter that reads the account key from the process environment.
    pub fn new() -> Self {
        Self::with_secrets(EnvSecrets)
    }

    pub fn with_secrets(secrets: impl SecretSource + 'static) -> Self {
        Self {
            secrets: Box::new(secrets),
            block_size: DEFAULT_BLOCK_SIZE,
            client: None,
        }
    }

    /// Uploads at least this large are staged as blocks of this size.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.client.is_some()
    }

    fn client(&self) -> Result<&BlobServiceClient, StoreError> {
        self.client.as_ref().ok_or(StoreError::NotInitialized)
    }

    /// Walk every page of a listing, collecting what `collect` picks from
    /// each one.
    async fn list_all<F>(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        mut collect: F,
    ) -> Result<(), StoreError>
    where
        F: FnMut(&crate::xml::EnumerationResults) + Send,
    {
        let client = self.client()?;
        let mut marker: Option<String> = None;
        let mut pages = 0usize;
        loop {
            let page = client
                .list_blobs(bucket, prefix, delimiter, marker.as_deref())
                .await?;
            pages += 1;
            collect(&page);
            match page.next_marker() {
                Some(next) => marker = Some(next.to_string()),
                None => break,
            }
        }
        debug!(bucket, prefix, pages, "Listing complete");
        Ok(())
    }
}

impl Default for AzureObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for AzureObjectStore {
    fn init(&mut self, config: &ConfigMap) -> Result<(), ConfigError> {
        if self.client.is_some() {
            return Err(ConfigError::AlreadyInitialized);
        }

        let config = AzureConfig::from_map(config)?;
        let account_key = config.resolve_account_key(&*self.secrets)?;
        let credential = SharedKeyCredential::new(&config.storage_account, &account_key)?;
        let client = BlobServiceClient::new(config.endpoint.clone(), credential)?;

        info!(
            storage_account = %config.storage_account,
            resource_group = %config.resource_group,
            subscription_id = %config.subscription_id,
            endpoint = %config.endpoint,
            "Azure object store initialized"
        );
        self.client = Some(client);
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        mut body: ObjectBody,
    ) -> Result<(), StoreError> {
        let client = self.client()?;
        upload_stream(client, bucket, key, &mut body, self.block_size).await?;
        debug!(bucket, key, "Azure upload complete");
        Ok(())
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        match self.client()?.get_blob_properties(bucket, key).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectStream, StoreError> {
        let response = self.client()?.get_blob(bucket, key).await?;
        debug!(bucket, key, content_length = ?response.content_length(), "Azure download opened");
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(StoreError::from))
            .boxed())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        self.list_all(bucket, prefix, None, |page| {
            names.extend(page.blob_names().map(str::to_string));
        })
        .await?;
        Ok(names)
    }

    async fn list_common_prefixes(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
    ) -> Result<Vec<String>, StoreError> {
        if delimiter.is_empty() {
            return Err(StoreError::InvalidArgument(
                "delimiter must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut prefixes = Vec::new();
        self.list_all(bucket, prefix, Some(delimiter), |page| {
            for p in page.prefixes() {
                if seen.insert(p.to_string()) {
                    prefixes.push(p.to_string());
                }
            }
        })
        .await?;
        Ok(prefixes)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.client()?.delete_blob(bucket, key).await?;
        debug!(bucket, key, "Azure delete complete");
        Ok(())
    }

    async fn create_signed_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<String, StoreError> {
        let url = signed_blob_url(self.client()?, bucket, key, ttl, Utc::now())?;
        debug!(bucket, key, ttl_secs = ttl.as_secs(), "Issued signed URL");
        Ok(url.to_string())
    }
}
