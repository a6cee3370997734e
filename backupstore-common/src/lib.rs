//! Shared contract for backupstore object-store adapters.
//!
//! A backup pipeline talks to every storage provider through the
//! [`ObjectStore`] trait. Provider crates implement it; the host binary picks
//! one by name, calls [`ObjectStore::init`] with the operator's config map and
//! then drives the data operations.

pub mod config;
pub mod error;
pub mod object_store;

pub use config::{ConfigMap, EnvSecrets, SecretSource};
pub use error::{ConfigError, StoreError};
pub use object_store::{body_from_bytes, collect_object, ObjectBody, ObjectStore, ObjectStream};
