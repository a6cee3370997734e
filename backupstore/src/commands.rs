use std::io;
use std::time::Duration;

use anyhow::Context;
use futures::TryStreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tracing::info;

use backupstore_common::{ObjectBody, ObjectStore, ObjectStream};

use crate::cli::Command;

/// Run one CLI command against an initialized store, writing any output
/// to `out`.
pub async fn run<W>(store: &dyn ObjectStore, command: Command, out: &mut W) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    match command {
        Command::Put {
            bucket,
            key,
            source,
        } => {
            let body = open_source(&source).await?;
            store
                .put_object(&bucket, &key, body)
                .await
                .with_context(|| format!("upload of {}/{} failed", bucket, key))?;
            info!(bucket = %bucket, key = %key, source = %source, "Uploaded object");
        }
        Command::Get { bucket, key, dest } => {
            let stream = store
                .get_object(&bucket, &key)
                .await
                .with_context(|| format!("download of {}/{} failed", bucket, key))?;
            let written = match dest {
                Some(path) => {
                    let mut file = tokio::fs::File::create(&path)
                        .await
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    let n = copy_object(stream, &mut file).await?;
                    file.flush().await?;
                    n
                }
                None => copy_object(stream, out).await?,
            };
            info!(bucket = %bucket, key = %key, bytes = written, "Downloaded object");
        }
        Command::Exists { bucket, key } => {
            let exists = store.object_exists(&bucket, &key).await?;
            write_line(out, if exists { "true" } else { "false" }).await?;
        }
        Command::Ls { bucket, prefix } => {
            for name in store.list_objects(&bucket, &prefix).await? {
                write_line(out, &name).await?;
            }
        }
        Command::Prefixes {
            bucket,
            prefix,
            delimiter,
        } => {
            for p in store.list_common_prefixes(&bucket, &prefix, &delimiter).await? {
                write_line(out, &p).await?;
            }
        }
        Command::Rm { bucket, key } => {
            store
                .delete_object(&bucket, &key)
                .await
                .with_context(|| format!("delete of {}/{} failed", bucket, key))?;
            info!(bucket = %bucket, key = %key, "Deleted object");
        }
        Command::Sign {
            bucket,
            key,
            ttl_secs,
        } => {
            let url = store
                .create_signed_url(&bucket, &key, Duration::from_secs(ttl_secs))
                .await?;
            write_line(out, &url).await?;
        }
    }
    Ok(())
}

async fn open_source(source: &str) -> anyhow::Result<ObjectBody> {
    if source == "-" {
        return Ok(Box::new(tokio::io::stdin()));
    }
    let file = tokio::fs::File::open(source)
        .await
        .with_context(|| format!("Failed to open {}", source))?;
    Ok(Box::new(file))
}

/// Stream an object into `out`, returning the number of bytes written.
async fn copy_object<W>(stream: ObjectStream, out: &mut W) -> anyhow::Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut reader = StreamReader::new(stream.map_err(io::Error::other));
    Ok(tokio::io::copy(&mut reader, out).await?)
}

async fn write_line<W>(out: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    out.write_all(line.as_bytes()).await?;
    out.write_all(b"\n").await
}
