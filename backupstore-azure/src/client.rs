//! Minimal Blob service REST client.
//!
//! Signs each request with the account's Shared Key and maps non-2xx
//! answers to [`StoreError::Service`]. No retries, no timeouts beyond what
//! reqwest applies by default.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response};
use tracing::debug;
use url::Url;

use backupstore_common::{ConfigError, StoreError};

use crate::credential::{SharedKeyCredential, SERVICE_VERSION, X_MS_DATE, X_MS_VERSION};
use crate::xml::{block_list_body, EnumerationResults, ErrorBody};

const X_MS_BLOB_TYPE: &str = "x-ms-blob-type";
const X_MS_DELETE_SNAPSHOTS: &str = "x-ms-delete-snapshots";
const X_MS_ERROR_CODE: &str = "x-ms-error-code";

/// Handle to one storage account's Blob service. Cheap to clone; clones share
/// the connection pool.
#[derive(Clone, Debug)]
pub struct BlobServiceClient {
    http: Client,
    endpoint: Url,
    credential: Arc<SharedKeyCredential>,
}

impl BlobServiceClient {
    pub fn new(endpoint: Url, credential: SharedKeyCredential) -> Result<Self, ConfigError> {
        let http = Client::builder().build().map_err(ConfigError::HttpClient)?;
        Ok(Self {
            http,
            endpoint,
            credential: Arc::new(credential),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn credential(&self) -> &SharedKeyCredential {
        &self.credential
    }

    pub fn container_url(&self, container: &str) -> Result<Url, StoreError> {
        check_name("container", container)?;
        Ok(self.url_with_path(&urlencoding::encode(container)))
    }

    /// Blob names keep their `/` separators; every segment is percent-encoded.
    pub fn blob_url(&self, container: &str, blob: &str) -> Result<Url, StoreError> {
        check_name("container", container)?;
        check_name("blob", blob)?;
        let blob: Vec<String> = blob
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        Ok(self.url_with_path(&format!(
            "{}/{}",
            urlencoding::encode(container),
            blob.join("/")
        )))
    }

    fn url_with_path(&self, path: &str) -> Url {
        let mut url = self.endpoint.clone();
        let base = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}/{}", base, path));
        url
    }

    /// Put Blob: single-shot upload of a block blob.
    pub async fn put_blob(&self, container: &str, blob: &str, data: Bytes) -> Result<(), StoreError> {
        let request = self
            .http
            .put(self.blob_url(container, blob)?)
            .header(X_MS_BLOB_TYPE, "BlockBlob")
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(data);
        self.send(request).await?;
        Ok(())
    }

    /// Put Block: stage one uncommitted block.
    pub async fn put_block(
        &self,
        container: &str,
        blob: &str,
        block_id: &str,
        data: Bytes,
    ) -> Result<(), StoreError> {
        let url = with_query(
            self.blob_url(container, blob)?,
            &[("comp", "block"), ("blockid", block_id)],
        );
        self.send(self.http.put(url).body(data)).await?;
        Ok(())
    }

    /// Put Block List: commit staged blocks as the blob's content.
    pub async fn put_block_list(
        &self,
        container: &str,
        blob: &str,
        block_ids: &[String],
    ) -> Result<(), StoreError> {
        let url = with_query(self.blob_url(container, blob)?, &[("comp", "blocklist")]);
        let body = block_list_body(block_ids)?;
        let request = self
            .http
            .put(url)
            .header(CONTENT_TYPE, "application/xml")
            .body(Bytes::from(body));
        self.send(request).await?;
        Ok(())
    }

    /// Get Blob Properties.
    pub async fn get_blob_properties(&self, container: &str, blob: &str) -> Result<(), StoreError> {
        self.send(self.http.head(self.blob_url(container, blob)?)).await?;
        Ok(())
    }

    /// Get Blob over the full range. The body is left unread.
    pub async fn get_blob(&self, container: &str, blob: &str) -> Result<Response, StoreError> {
        self.send(self.http.get(self.blob_url(container, blob)?)).await
    }

    /// Delete Blob together with its snapshots.
    pub async fn delete_blob(&self, container: &str, blob: &str) -> Result<(), StoreError> {
        let request = self
            .http
            .delete(self.blob_url(container, blob)?)
            .header(X_MS_DELETE_SNAPSHOTS, "include");
        self.send(request).await?;
        Ok(())
    }

    /// List Blobs: one page, flat or grouped by `delimiter`.
    pub async fn list_blobs(
        &self,
        container: &str,
        prefix: &str,
        delimiter: Option<&str>,
        marker: Option<&str>,
    ) -> Result<EnumerationResults, StoreError> {
        let mut params = vec![("restype", "container"), ("comp", "list")];
        if !prefix.is_empty() {
            params.push(("prefix", prefix));
        }
        if let Some(delimiter) = delimiter {
            params.push(("delimiter", delimiter));
        }
        if let Some(marker) = marker {
            params.push(("marker", marker));
        }
        let url = with_query(self.container_url(container)?, &params);

        let response = self.send(self.http.get(url)).await?;
        let body = response.text().await?;
        EnumerationResults::parse(&body)
    }

    /// Stamp, sign and execute a request. Non-2xx answers become errors.
    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let mut request = request
            .header(X_MS_DATE, rfc1123(Utc::now()))
            .header(X_MS_VERSION, SERVICE_VERSION)
            .build()?;

        // Content-Length is part of the signature, so it has to be present
        // before signing rather than added by the transport.
        let body_len = request
            .body()
            .and_then(|body| body.as_bytes())
            .map(|bytes| bytes.len());
        if let Some(len) = body_len {
            request
                .headers_mut()
                .insert(CONTENT_LENGTH, HeaderValue::from(len));
        }

        self.credential.sign(&mut request);

        let method = request.method().clone();
        let url = request.url().clone();
        let response = self.http.execute(request).await?;
        let status = response.status();
        debug!(%method, url = %url.path(), status = status.as_u16(), "Blob service response");

        if status.is_success() {
            Ok(response)
        } else {
            Err(service_error(&method, response).await)
        }
    }
}

/// URL path resolution collapses `.` and `..` segments, so a name holding
/// one would address a different blob than the one asked for.
fn check_name(kind: &str, name: &str) -> Result<(), StoreError> {
    if name.is_empty() {
        return Err(StoreError::InvalidArgument(format!(
            "{} name must not be empty",
            kind
        )));
    }
    if name.split('/').any(|segment| segment == "." || segment == "..") {
        return Err(StoreError::InvalidArgument(format!(
            "{} name {:?} contains a '.' or '..' path segment",
            kind, name
        )));
    }
    Ok(())
}

async fn service_error(method: &Method, response: Response) -> StoreError {
    let status = response.status();
    let header_code = response
        .headers()
        .get(X_MS_ERROR_CODE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    // HEAD responses never carry a body.
    let body = if method == Method::HEAD {
        String::new()
    } else {
        response.text().await.unwrap_or_default()
    };
    let parsed = ErrorBody::parse(&body).unwrap_or_default();

    let message = parsed
        .message
        .or_else(|| status.canonical_reason().map(str::to_string))
        .unwrap_or_default();

    StoreError::Service {
        status: status.as_u16(),
        code: header_code.or(parsed.code),
        message,
    }
}

/// Append `params` as the URL's query, percent-encoding values (spaces
/// become `%20`, not `+`).
fn with_query(mut url: Url, params: &[(&str, &str)]) -> Url {
    let query: Vec<String> = params
        .iter()
        .map(|(name, value)| format!("{}={}", name, urlencoding::encode(value)))
        .collect();
    url.set_query(Some(&query.join("&")));
    url
}

/// `x-ms-date` format, e.g. `Fri, 14 Nov 2025 09:22:00 GMT`.
pub fn rfc1123(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
