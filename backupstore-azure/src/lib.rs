//! Azure Blob Storage adapter for backupstore.
//!
//! Talks to the Blob service REST API directly with reqwest, signing requests
//! with the storage account's Shared Key, so no vendor SDK is needed.

mod client;
pub mod config;
pub mod credential;
pub mod sas;
mod store;
mod upload;
mod xml;

pub use client::BlobServiceClient;
pub use credential::SharedKeyCredential;
pub use store::AzureObjectStore;
pub use upload::DEFAULT_BLOCK_SIZE;
