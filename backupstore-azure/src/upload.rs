//! Streaming upload of a block blob.
//!
//! Bodies that fit in one block go out as a single Put Blob. Larger bodies
//! are cut into fixed-size blocks, staged one after another with Put Block
//! and committed with Put Block List. Blocks are staged sequentially and
//! nothing is resumed after a failure: uncommitted blocks are discarded by
//! the service.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;
use uuid::Uuid;

use backupstore_common::StoreError;

use crate::client::BlobServiceClient;

pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024 * 1024;

pub async fn upload_stream<R>(
    client: &BlobServiceClient,
    container: &str,
    blob: &str,
    body: &mut R,
    block_size: usize,
) -> Result<(), StoreError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    // Reject unaddressable names before any of the body is consumed.
    client.blob_url(container, blob)?;

    let first = read_block(body, block_size).await?;
    if first.len() < block_size {
        debug!(container, blob, size = first.len(), "Uploading blob in one request");
        return client.put_blob(container, blob, first).await;
    }

    // Block IDs must all have the same length within a blob.
    let upload_id = Uuid::new_v4().simple().to_string();
    let mut block_ids = Vec::new();
    let mut block = first;
    let mut total = 0usize;
    while !block.is_empty() {
        let id = block_id(&upload_id, block_ids.len());
        let len = block.len();
        client.put_block(container, blob, &id, block).await?;
        block_ids.push(id);
        total += len;
        if len < block_size {
            break;
        }
        block = read_block(body, block_size).await?;
    }

    client.put_block_list(container, blob, &block_ids).await?;
    debug!(container, blob, blocks = block_ids.len(), size = total, "Committed block list");
    Ok(())
}

/// Read until `size` bytes are buffered or the body ends.
async fn read_block<R>(body: &mut R, size: usize) -> Result<Bytes, StoreError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = BytesMut::with_capacity(size);
    while buf.len() < size {
        let read = (&mut *body)
            .take((size - buf.len()) as u64)
            .read_buf(&mut buf)
            .await
            .map_err(StoreError::Body)?;
        if read == 0 {
            break;
        }
    }
    Ok(buf.freeze())
}

fn block_id(upload_id: &str, index: usize) -> String {
    STANDARD.encode(format!("{}-{:06}", upload_id, index))
}
