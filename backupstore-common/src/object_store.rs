use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::io::AsyncRead;

use crate::config::ConfigMap;
use crate::error::{ConfigError, StoreError};

/// Byte source for an upload. Read once, front to back.
pub type ObjectBody = Box<dyn AsyncRead + Send + Unpin>;

/// Lazily consumed object content returned by [`ObjectStore::get_object`].
///
/// Single pass: reading the object again requires another `get_object` call.
pub type ObjectStream = BoxStream<'static, Result<Bytes, StoreError>>;

/// Trait implemented by all object-store adapters.
///
/// An adapter starts out uninitialized. The host calls [`ObjectStore::init`]
/// exactly once; until it succeeds every other operation fails with
/// [`StoreError::NotInitialized`]. After that the adapter only reads its
/// state, so a single instance can serve concurrent callers.
///
/// Adapters do not retry. Every remote failure reaches the caller, with one
/// exception: `object_exists` reports a missing object as `Ok(false)`.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Validate `config`, resolve credentials and build the client handle.
    fn init(&mut self, config: &ConfigMap) -> Result<(), ConfigError>;

    /// Create or overwrite `bucket/key` with the full contents of `body`.
    async fn put_object(&self, bucket: &str, key: &str, body: ObjectBody)
        -> Result<(), StoreError>;

    /// Whether `bucket/key` exists. Only a not-found answer maps to `false`.
    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError>;

    /// Open a read of the whole object.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectStream, StoreError>;

    /// All keys in `bucket` starting with `prefix`, in service order.
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Distinct key prefixes one `delimiter` segment below `prefix`.
    ///
    /// Each returned prefix includes the trailing delimiter.
    async fn list_common_prefixes(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
    ) -> Result<Vec<String>, StoreError>;

    /// Permanently delete `bucket/key`. Deleting a missing object is an error.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError>;

    /// A URL granting read access to `bucket/key` for `ttl`.
    async fn create_signed_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<String, StoreError>;
}

/// Wrap in-memory content as an upload body.
pub fn body_from_bytes(data: impl Into<Bytes>) -> ObjectBody {
    Box::new(std::io::Cursor::new(data.into()))
}

/// Drain an object stream into a single buffer.
pub async fn collect_object(mut stream: ObjectStream) -> Result<Bytes, StoreError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}
